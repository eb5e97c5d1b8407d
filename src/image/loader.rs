use crate::utils::error::ValidatorError;
use crate::Result;
use base64::Engine;
use image::{DynamicImage, ImageFormat, ImageReader, Limits};
use std::io::Cursor;

/// 解码时允许的最大边长
const MAX_DIMENSION: u32 = 16384;

/// 解码时允许分配的最大内存
const MAX_DECODE_ALLOC: u64 = 512 * 1024 * 1024;

pub struct ImageLoader;

impl ImageLoader {
    /// 从base64字符串解出原始字节，兼容 data URL 前缀
    pub fn bytes_from_base64(base64_data: &str) -> Result<Vec<u8>> {
        let trimmed = base64_data.trim();
        // data:image/xxx;base64,
        let base64_clean = match trimmed.strip_prefix("data:") {
            Some(rest) => rest.split_once(',').map(|(_, data)| data).unwrap_or(rest),
            None => trimmed,
        };

        let image_bytes = base64::engine::general_purpose::STANDARD.decode(base64_clean)?;
        Ok(image_bytes)
    }

    /// 从内存字节解码单张图片
    pub fn from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(ValidatorError::Decode("Empty image data".to_string()));
        }

        let format = Self::detect_format(bytes)
            .ok_or_else(|| ValidatorError::Decode("Unrecognized image format".to_string()))?;

        if !Self::is_supported_format(format) {
            return Err(ValidatorError::Decode(format!(
                "Unsupported image format: {:?}",
                format
            )));
        }

        let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
        reader.limits(Self::decode_limits());

        let image = reader.decode()?;
        tracing::debug!(
            "Decoded {:?} image: {}x{}",
            format,
            image.width(),
            image.height()
        );

        Ok(image)
    }

    /// 检测图像格式
    pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
        image::guess_format(bytes).ok()
    }

    /// 验证图像格式是否支持
    pub fn is_supported_format(format: ImageFormat) -> bool {
        matches!(
            format,
            ImageFormat::Png
                | ImageFormat::Jpeg
                | ImageFormat::Bmp
                | ImageFormat::Tiff
                | ImageFormat::WebP
        )
    }

    fn decode_limits() -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(MAX_DIMENSION);
        limits.max_image_height = Some(MAX_DIMENSION);
        limits.max_alloc = Some(MAX_DECODE_ALLOC);
        limits
    }
}
