#![allow(dead_code)]

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use ndarray::Array4;
use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use viewpoint_validator::models::{BinaryClassifier, ModelLoader};
use viewpoint_validator::{Config, ModelRegistry, ValidatorError, ViewpointLabel, ViewpointValidator};

/// 固定分数模型
pub struct FixedScore(pub f32);

impl BinaryClassifier for FixedScore {
    fn predict(&self, _input: Array4<f32>) -> viewpoint_validator::Result<f32> {
        Ok(self.0)
    }
}

/// 从模型文件读取分数的加载器，记录加载次数
pub struct ScoreFileLoader {
    pub loads: Arc<AtomicUsize>,
    pub delay: Duration,
}

impl ModelLoader for ScoreFileLoader {
    fn load(&self, path: &Path) -> viewpoint_validator::Result<Arc<dyn BinaryClassifier>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.delay);

        let text = std::fs::read_to_string(path).map_err(|e| ValidatorError::corrupt(path, e))?;
        let score: f32 = text
            .trim()
            .parse()
            .map_err(|e| ValidatorError::corrupt(path, e))?;
        Ok(Arc::new(FixedScore(score)))
    }
}

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub config: Config,
    pub loads: Arc<AtomicUsize>,
    pub validator: ViewpointValidator,
}

impl Fixture {
    pub fn new(labels: &[ViewpointLabel]) -> Self {
        Self::with_delay(labels, Duration::ZERO)
    }

    pub fn with_delay(labels: &[ViewpointLabel], delay: Duration) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::new(
            "127.0.0.1:0".to_string(),
            dir.path().to_string_lossy().into_owned(),
            Some(2),
            false,
        )
        .unwrap()
        .with_labels(labels.to_vec())
        .unwrap();

        let loads = Arc::new(AtomicUsize::new(0));
        let loader = ScoreFileLoader {
            loads: Arc::clone(&loads),
            delay,
        };
        let registry = Arc::new(ModelRegistry::with_loader(&config, Box::new(loader)));
        let validator = ViewpointValidator::new(registry, &config);

        Self {
            dir,
            config,
            loads,
            validator,
        }
    }

    pub fn write_artifact(&self, label: ViewpointLabel, score: &str) {
        std::fs::write(self.config.model_path(label), score).unwrap();
    }

    pub fn remove_artifact(&self, label: ViewpointLabel) {
        std::fs::remove_file(self.config.model_path(label)).unwrap();
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

pub fn encode(format: ImageFormat, width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .unwrap();
    bytes
}

pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    encode(ImageFormat::Jpeg, width, height)
}
