use crate::utils::error::ValidatorError;
use crate::Result;
use image::{imageops::FilterType, DynamicImage, RgbImage};
use ndarray::Array4;
use std::fmt;
use std::str::FromStr;

const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// 输入归一化方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// 仅缩放到 [0, 1]
    Unit,
    /// 缩放后再做 ImageNet 均值/方差归一化
    ImageNet,
}

impl Normalization {
    fn mean_std(&self) -> ([f32; 3], [f32; 3]) {
        match self {
            Normalization::Unit => ([0.0; 3], [1.0; 3]),
            Normalization::ImageNet => (IMAGENET_MEAN, IMAGENET_STD),
        }
    }
}

impl fmt::Display for Normalization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Normalization::Unit => f.write_str("unit"),
            Normalization::ImageNet => f.write_str("imagenet"),
        }
    }
}

impl FromStr for Normalization {
    type Err = ValidatorError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unit" => Ok(Normalization::Unit),
            "imagenet" => Ok(Normalization::ImageNet),
            other => Err(ValidatorError::Config(format!(
                "Unknown normalization '{}', expected 'unit' or 'imagenet'",
                other
            ))),
        }
    }
}

/// 图片到模型输入张量的固定变换
#[derive(Debug, Clone, Copy)]
pub struct ImagePreprocessor {
    size: u32,
    normalization: Normalization,
}

impl ImagePreprocessor {
    pub fn new(size: u32, normalization: Normalization) -> Self {
        Self { size, normalization }
    }

    /// RGB化、拉伸缩放、转NCHW张量
    pub fn to_tensor(&self, image: &DynamicImage) -> Result<Array4<f32>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ValidatorError::ValidationFailed(
                "Decoded image has zero area".to_string(),
            ));
        }

        // 丢弃alpha通道
        let rgb = image.to_rgb8();
        let resized = self.resize(&rgb);

        Ok(self.rgb_to_tensor(&resized))
    }

    /// 直接拉伸到目标尺寸，不保持宽高比（与训练时的 Resize((224, 224)) 一致）
    fn resize(&self, rgb: &RgbImage) -> RgbImage {
        if rgb.width() == self.size && rgb.height() == self.size {
            return rgb.clone();
        }
        image::imageops::resize(rgb, self.size, self.size, FilterType::Triangle)
    }

    fn rgb_to_tensor(&self, rgb: &RgbImage) -> Array4<f32> {
        let (mean, std) = self.normalization.mean_std();
        let (width, height) = rgb.dimensions();

        Array4::from_shape_fn(
            (1, 3, height as usize, width as usize),
            |(_, c, y, x)| {
                let value = rgb.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
                (value - mean[c]) / std[c]
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};

    fn solid_rgb(width: u32, height: u32, pixel: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb(pixel)))
    }

    #[test]
    fn test_tensor_shape_is_fixed() {
        let pre = ImagePreprocessor::new(224, Normalization::Unit);
        for (w, h) in [(224, 224), (640, 480), (10, 300), (1, 1)] {
            let tensor = pre.to_tensor(&solid_rgb(w, h, [0, 0, 0])).unwrap();
            assert_eq!(tensor.shape(), &[1, 3, 224, 224]);
        }
    }

    #[test]
    fn test_unit_scaling_keeps_channel_order() {
        let pre = ImagePreprocessor::new(224, Normalization::Unit);
        let tensor = pre.to_tensor(&solid_rgb(100, 50, [255, 0, 51])).unwrap();

        assert_eq!(tensor[[0, 0, 0, 0]], 1.0);
        assert_eq!(tensor[[0, 1, 100, 100]], 0.0);
        assert!((tensor[[0, 2, 223, 223]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_alpha_is_dropped() {
        let pre = ImagePreprocessor::new(8, Normalization::Unit);
        let rgba = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(8, 8, Rgba([255, 255, 255, 0])));
        let tensor = pre.to_tensor(&rgba).unwrap();

        assert_eq!(tensor.shape(), &[1, 3, 8, 8]);
        assert!(tensor.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_imagenet_normalization() {
        let pre = ImagePreprocessor::new(4, Normalization::ImageNet);
        let tensor = pre.to_tensor(&solid_rgb(4, 4, [0, 0, 0])).unwrap();

        for c in 0..3 {
            let expected = -IMAGENET_MEAN[c] / IMAGENET_STD[c];
            assert!((tensor[[0, c, 1, 1]] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_stretch_ignores_aspect_ratio() {
        // 左半红右半蓝的宽图，拉伸后左右两侧仍分别为红和蓝，没有填充边
        let mut img = ImageBuffer::new(400, 100);
        for (x, _, pixel) in img.enumerate_pixels_mut() {
            *pixel = if x < 200 { Rgb([255, 0, 0]) } else { Rgb([0, 0, 255]) };
        }
        let pre = ImagePreprocessor::new(224, Normalization::Unit);
        let tensor = pre.to_tensor(&DynamicImage::ImageRgb8(img)).unwrap();

        assert_eq!(tensor[[0, 0, 0, 0]], 1.0);
        assert_eq!(tensor[[0, 2, 0, 0]], 0.0);
        assert_eq!(tensor[[0, 0, 223, 223]], 0.0);
        assert_eq!(tensor[[0, 2, 223, 223]], 1.0);
    }

    #[test]
    fn test_preprocessing_is_deterministic() {
        let mut img = ImageBuffer::new(37, 91);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgb([(x * 7) as u8, (y * 3) as u8, ((x + y) % 255) as u8]);
        }
        let image = DynamicImage::ImageRgb8(img);
        let pre = ImagePreprocessor::new(224, Normalization::Unit);

        assert_eq!(pre.to_tensor(&image).unwrap(), pre.to_tensor(&image).unwrap());
    }

    #[test]
    fn test_parse_normalization() {
        assert_eq!("unit".parse::<Normalization>().unwrap(), Normalization::Unit);
        assert_eq!("ImageNet".parse::<Normalization>().unwrap(), Normalization::ImageNet);
        assert!("zscore".parse::<Normalization>().is_err());
    }
}
