use crate::{
    image::ImageLoader,
    models::ViewpointLabel,
    utils::error::ValidatorError,
    validation::{Verdict, ViewpointValidator},
    web::{
        extractors::{RequestId, ValidatedJson},
        AppState,
    },
    Result,
};
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// JSON请求体（base64模式）
#[derive(Debug, Deserialize)]
pub struct ValidateJsonRequest {
    /// Base64编码的图像数据，可带 data URL 前缀
    pub image: String,

    /// 视角标签
    #[serde(alias = "label")]
    pub angle: String,
}

/// 校验响应
#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    #[serde(flatten)]
    pub verdict: Verdict,
    pub label: ViewpointLabel,
    pub request_id: String,
    /// 处理耗时（秒）
    pub processing_time: f32,
    pub timestamp: String,
}

/// Multipart上传处理器：字段 `image` 与 `angle`
pub async fn validate_upload_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    mut multipart: Multipart,
) -> Result<Json<ValidateResponse>> {
    let start_time = Instant::now();
    tracing::info!("Processing multipart validation request: request_id={}", request_id);

    let mut image_data: Option<Bytes> = None;
    let mut angle: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(&state, "Failed to read multipart field", e))?
    {
        let field_name = field.name().unwrap_or("unknown").to_string();

        match field_name.as_str() {
            "image" | "file" => {
                if let Some(content_type) = field.content_type() {
                    if !content_type.starts_with("image/")
                        && content_type != "application/octet-stream"
                    {
                        return Err(ValidatorError::UnsupportedFormat(content_type.to_string()));
                    }
                }

                let data = field
                    .bytes()
                    .await
                    .map_err(|e| multipart_error(&state, "Failed to read file data", e))?;

                tracing::debug!("Received file: {} bytes", data.len());
                image_data = Some(data);
            }
            "angle" | "label" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| multipart_error(&state, "Failed to read angle", e))?;
                angle = Some(value.trim().to_string());
            }
            _ => {
                tracing::debug!("Ignoring unknown field: {}", field_name);
            }
        }
    }

    let angle = angle
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ValidatorError::InvalidInput("No angle provided".to_string()))?;
    let label = state.validator.registry().resolve(&angle)?;

    let image_data = image_data
        .filter(|data| !data.is_empty())
        .ok_or_else(|| ValidatorError::InvalidInput("No image provided".to_string()))?;

    let verdict = run_validation(&state, image_data, label).await?;

    Ok(Json(respond(verdict, label, request_id, start_time)))
}

/// JSON base64上传处理器
pub async fn validate_json_handler(
    State(state): State<AppState>,
    RequestId(request_id): RequestId,
    ValidatedJson(request): ValidatedJson<ValidateJsonRequest>,
) -> Result<Json<ValidateResponse>> {
    let start_time = Instant::now();
    tracing::info!("Processing JSON validation request: request_id={}", request_id);

    let label = state.validator.registry().resolve(request.angle.trim())?;

    let image_data = ImageLoader::bytes_from_base64(&request.image)?;
    if image_data.is_empty() {
        return Err(ValidatorError::InvalidInput("No image provided".to_string()));
    }

    let verdict = run_validation(&state, Bytes::from(image_data), label).await?;

    Ok(Json(respond(verdict, label, request_id, start_time)))
}

/// 在阻塞线程池中执行解码和推理
async fn run_validation(
    state: &AppState,
    image_data: Bytes,
    label: ViewpointLabel,
) -> Result<Verdict> {
    let max_size = state.config.server_config.max_image_size;
    if image_data.len() > max_size {
        return Err(ValidatorError::FileTooLarge(image_data.len(), max_size));
    }

    let validator: ViewpointValidator = state.validator.clone();
    tokio::task::spawn_blocking(move || validator.validate_label(&image_data, label))
        .await
        .map_err(|e| ValidatorError::Internal(format!("Validation task failed: {}", e)))?
}

/// 流式请求体超过上限时由限流层中断读取，应报告413而不是400
fn multipart_error(state: &AppState, context: &str, err: MultipartError) -> ValidatorError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ValidatorError::RequestTooLarge(state.config.server_config.max_request_size)
    } else {
        ValidatorError::InvalidInput(format!("{}: {}", context, err))
    }
}

fn respond(
    verdict: Verdict,
    label: ViewpointLabel,
    request_id: String,
    start_time: Instant,
) -> ValidateResponse {
    let processing_time = start_time.elapsed().as_secs_f32();

    tracing::info!(
        "Validation request completed: request_id={}, label={}, status={}, time={:.3}s",
        request_id,
        label,
        verdict.outcome,
        processing_time
    );

    ValidateResponse {
        verdict,
        label,
        request_id,
        processing_time,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}
