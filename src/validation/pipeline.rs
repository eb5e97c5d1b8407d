use crate::{
    config::{DECISION_THRESHOLD, INPUT_SIZE},
    image::{ImageLoader, ImagePreprocessor, Normalization},
    models::{ModelRegistry, ViewpointLabel},
    utils::error::ValidatorError,
    validation::Verdict,
    Config, Result,
};
use std::sync::Arc;
use std::time::Instant;

/// 视角照片校验流水线
///
/// 解码 → 预处理 → 取模型 → 推理 → 阈值判定。自身不保存任何跨调用状态，
/// 唯一的共享状态是注入的 [`ModelRegistry`]。
#[derive(Clone)]
pub struct ViewpointValidator {
    registry: Arc<ModelRegistry>,
    preprocessor: ImagePreprocessor,
    threshold: f32,
}

impl ViewpointValidator {
    pub fn new(registry: Arc<ModelRegistry>, config: &Config) -> Self {
        Self::with_normalization(registry, config.model_config.normalization)
    }

    pub fn with_normalization(registry: Arc<ModelRegistry>, normalization: Normalization) -> Self {
        Self {
            registry,
            preprocessor: ImagePreprocessor::new(INPUT_SIZE, normalization),
            threshold: DECISION_THRESHOLD,
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    /// 校验图片是否符合指定视角，标签为字符串形式
    pub fn validate(&self, image_bytes: &[u8], label: &str) -> Result<Verdict> {
        let label = self.registry.resolve(label)?;
        self.validate_label(image_bytes, label)
    }

    /// 校验图片是否符合指定视角
    pub fn validate_label(&self, image_bytes: &[u8], label: ViewpointLabel) -> Result<Verdict> {
        let start_time = Instant::now();

        let result = self.run(image_bytes, label);

        match &result {
            Ok(verdict) => tracing::info!(
                "Validation completed for '{}': {} (score={:.4}, time={:.3}s)",
                label,
                verdict.outcome,
                verdict.score,
                start_time.elapsed().as_secs_f32()
            ),
            Err(e) if e.is_caller_error() => {
                tracing::warn!("Validation rejected input for '{}': {}", label, e)
            }
            Err(e) => tracing::error!("Validation failed for '{}': {}", label, e),
        }

        result
    }

    fn run(&self, image_bytes: &[u8], label: ViewpointLabel) -> Result<Verdict> {
        // 未启用的标签在解码之前就失败
        if self.registry.model_path(label).is_none() {
            return Err(ValidatorError::UnknownLabel(label.to_string()));
        }

        let image = ImageLoader::from_bytes(image_bytes)?;
        let tensor = self.preprocessor.to_tensor(&image).map_err(Self::unexpected)?;
        drop(image);

        let model = self.registry.get(label)?;

        let score = model.predict(tensor).map_err(Self::unexpected)?;
        if !score.is_finite() || !(0.0..=1.0).contains(&score) {
            return Err(ValidatorError::ValidationFailed(format!(
                "Model for '{}' returned score {} outside [0, 1]",
                label, score
            )));
        }

        Ok(Verdict::from_score(label, score, self.threshold))
    }

    /// 预处理和推理阶段的错误统一归为 ValidationFailed
    fn unexpected(err: ValidatorError) -> ValidatorError {
        match err {
            err @ ValidatorError::ValidationFailed(_) => err,
            other => ValidatorError::ValidationFailed(other.to_string()),
        }
    }
}
