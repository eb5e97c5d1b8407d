use crate::models::{BinaryClassifier, ModelLoader, OnnxModelLoader, ViewpointLabel};
use crate::utils::error::ValidatorError;
use crate::{Config, Result};
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// 单个标签的注册表项
struct RegistryEntry {
    path: PathBuf,
    model: OnceCell<Arc<dyn BinaryClassifier>>,
}

/// 视角标签到已加载模型的映射
///
/// 标签集合在构造时固定，此后只有每个标签的 `OnceCell` 会被写入一次。
/// 同一标签的并发首次加载会阻塞在同一个初始化上，因此模型文件只读取一次；
/// 加载失败时不写入任何内容，修复文件后的下一次调用会重新尝试。
pub struct ModelRegistry {
    entries: BTreeMap<ViewpointLabel, RegistryEntry>,
    loader: Box<dyn ModelLoader>,
    loads: AtomicUsize,
}

impl ModelRegistry {
    /// 使用 ONNX 加载器构建注册表
    pub fn new(config: &Config) -> Self {
        let loader = OnnxModelLoader::new(config.onnx_config.clone(), config.model_config.output);
        Self::with_loader(config, Box::new(loader))
    }

    pub fn with_loader(config: &Config, loader: Box<dyn ModelLoader>) -> Self {
        let entries = config
            .model_config
            .labels
            .iter()
            .map(|&label| {
                let entry = RegistryEntry {
                    path: config.model_path(label),
                    model: OnceCell::new(),
                };
                (label, entry)
            })
            .collect();

        Self {
            entries,
            loader,
            loads: AtomicUsize::new(0),
        }
    }

    /// 获取标签对应的模型，首次调用时从磁盘加载
    pub fn get(&self, label: ViewpointLabel) -> Result<Arc<dyn BinaryClassifier>> {
        let entry = self.entry(label)?;

        let model = entry
            .model
            .get_or_try_init(|| self.load(label, &entry.path))?;

        Ok(Arc::clone(model))
    }

    /// 按字符串标签获取模型，未知标签不会触发任何IO
    pub fn get_by_name(&self, label: &str) -> Result<Arc<dyn BinaryClassifier>> {
        let label = self.resolve(label)?;
        self.get(label)
    }

    /// 解析并检查标签是否在本次部署中启用
    pub fn resolve(&self, label: &str) -> Result<ViewpointLabel> {
        let parsed = label.parse::<ViewpointLabel>()?;
        self.entry(parsed)?;
        Ok(parsed)
    }

    /// 注入预先构建的模型（用于测试或自定义部署），已加载的标签返回false
    pub fn seed(&self, label: ViewpointLabel, model: Arc<dyn BinaryClassifier>) -> Result<bool> {
        let entry = self.entry(label)?;
        Ok(entry.model.set(model).is_ok())
    }

    /// 预加载所有启用的标签，单个失败只记录警告
    pub fn preload(&self) -> usize {
        let mut loaded = 0;
        for &label in self.entries.keys() {
            match self.get(label) {
                Ok(_) => loaded += 1,
                Err(e) => tracing::warn!("Failed to preload model for '{}': {}", label, e),
            }
        }
        tracing::info!("Preloaded {}/{} models", loaded, self.entries.len());
        loaded
    }

    pub fn labels(&self) -> Vec<ViewpointLabel> {
        self.entries.keys().copied().collect()
    }

    pub fn loaded_labels(&self) -> Vec<ViewpointLabel> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.model.get().is_some())
            .map(|(&label, _)| label)
            .collect()
    }

    pub fn model_path(&self, label: ViewpointLabel) -> Option<&Path> {
        self.entries.get(&label).map(|entry| entry.path.as_path())
    }

    /// 获取注册表统计信息
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            enabled_labels: self.entries.len(),
            loaded_labels: self.loaded_labels(),
            completed_loads: self.loads.load(Ordering::Relaxed),
        }
    }

    fn entry(&self, label: ViewpointLabel) -> Result<&RegistryEntry> {
        self.entries
            .get(&label)
            .ok_or_else(|| ValidatorError::UnknownLabel(label.to_string()))
    }

    fn load(&self, label: ViewpointLabel, path: &Path) -> Result<Arc<dyn BinaryClassifier>> {
        if !path.is_file() {
            tracing::error!(
                "Model artifact for '{}' not found: {}",
                label,
                path.display()
            );
            return Err(ValidatorError::ArtifactNotFound(path.to_path_buf()));
        }

        let start_time = Instant::now();
        let model = self.loader.load(path).map_err(|e| {
            tracing::error!("Error loading model for '{}': {}", label, e);
            match e {
                err @ (ValidatorError::ArtifactNotFound(_)
                | ValidatorError::ArtifactCorrupt { .. }) => err,
                other => ValidatorError::corrupt(path, other),
            }
        })?;

        self.loads.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            "Model loaded successfully for '{}' in {:.3}s",
            label,
            start_time.elapsed().as_secs_f32()
        );

        Ok(model)
    }
}

/// 注册表统计信息
#[derive(Debug, Clone, serde::Serialize)]
pub struct RegistryStats {
    pub enabled_labels: usize,
    pub loaded_labels: Vec<ViewpointLabel>,
    pub completed_loads: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    struct Fixed(f32);

    impl BinaryClassifier for Fixed {
        fn predict(&self, _input: Array4<f32>) -> Result<f32> {
            Ok(self.0)
        }
    }

    /// 读取文件内容作为固定分数
    struct CountingLoader {
        calls: Arc<AtomicUsize>,
    }

    impl ModelLoader for CountingLoader {
        fn load(&self, path: &Path) -> Result<Arc<dyn BinaryClassifier>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = std::fs::read_to_string(path)
                .map_err(|e| ValidatorError::corrupt(path, e))?;
            let score = text
                .trim()
                .parse::<f32>()
                .map_err(|e| ValidatorError::corrupt(path, e))?;
            Ok(Arc::new(Fixed(score)))
        }
    }

    fn registry(dir: &Path, labels: Vec<ViewpointLabel>) -> (ModelRegistry, Arc<AtomicUsize>) {
        let config = Config::new(
            "127.0.0.1:0".to_string(),
            dir.to_string_lossy().into_owned(),
            Some(1),
            false,
        )
        .unwrap()
        .with_labels(labels)
        .unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let loader = CountingLoader {
            calls: Arc::clone(&calls),
        };
        (ModelRegistry::with_loader(&config, Box::new(loader)), calls)
    }

    #[test]
    fn test_cache_hit_does_not_reload() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("front_model.onnx"), "0.8").unwrap();
        let (registry, calls) = registry(dir.path(), vec![ViewpointLabel::Front]);

        let first = registry.get(ViewpointLabel::Front).unwrap();
        std::fs::remove_file(dir.path().join("front_model.onnx")).unwrap();
        let second = registry.get(ViewpointLabel::Front).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.stats().completed_loads, 1);
    }

    #[test]
    fn test_disabled_label_is_unknown_without_io() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, calls) = registry(dir.path(), vec![ViewpointLabel::Front]);

        let err = registry.get(ViewpointLabel::Back).err().unwrap();
        assert!(matches!(err, ValidatorError::UnknownLabel(ref l) if l == "back"));

        let err = registry.get_by_name("not_a_real_label").err().unwrap();
        assert!(matches!(err, ValidatorError::UnknownLabel(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_missing_artifact_does_not_poison() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, calls) = registry(dir.path(), vec![ViewpointLabel::Back]);

        let err = registry.get(ViewpointLabel::Back).err().unwrap();
        assert!(matches!(err, ValidatorError::ArtifactNotFound(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(registry.loaded_labels().is_empty());

        std::fs::write(dir.path().join("back_model.onnx"), "0.2").unwrap();
        let model = registry.get(ViewpointLabel::Back).unwrap();
        assert_eq!(model.predict(Array4::zeros((1, 3, 1, 1))).unwrap(), 0.2);
        assert_eq!(registry.loaded_labels(), vec![ViewpointLabel::Back]);
    }

    #[test]
    fn test_corrupt_artifact_does_not_poison() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leftSide_model.onnx");
        std::fs::write(&path, "garbage").unwrap();
        let (registry, calls) = registry(dir.path(), vec![ViewpointLabel::LeftSide]);

        let err = registry.get(ViewpointLabel::LeftSide).err().unwrap();
        assert!(matches!(err, ValidatorError::ArtifactCorrupt { .. }));

        std::fs::write(&path, "0.9").unwrap();
        assert!(registry.get(ViewpointLabel::LeftSide).is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_seed_skips_loader() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, calls) = registry(dir.path(), ViewpointLabel::ALL.to_vec());

        assert!(registry.seed(ViewpointLabel::Front, Arc::new(Fixed(0.7))).unwrap());
        assert!(!registry.seed(ViewpointLabel::Front, Arc::new(Fixed(0.1))).unwrap());

        let model = registry.get(ViewpointLabel::Front).unwrap();
        assert_eq!(model.predict(Array4::zeros((1, 3, 1, 1))).unwrap(), 0.7);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_preload_counts_successes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("front_model.onnx"), "0.6").unwrap();
        std::fs::write(dir.path().join("back_model.onnx"), "0.4").unwrap();
        let (registry, _) = registry(
            dir.path(),
            vec![ViewpointLabel::Front, ViewpointLabel::Back, ViewpointLabel::RightSide],
        );

        assert_eq!(registry.preload(), 2);
        assert_eq!(
            registry.loaded_labels(),
            vec![ViewpointLabel::Front, ViewpointLabel::Back]
        );
    }
}
