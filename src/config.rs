use crate::image::Normalization;
use crate::models::{ModelOutput, ViewpointLabel};
use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::PathBuf;

/// 模型输入边长（正方形）
pub const INPUT_SIZE: u32 = 224;

/// 判定阈值：score > 0.5 为通过
pub const DECISION_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器绑定地址
    pub bind_addr: String,

    /// 模型文件目录
    pub models_dir: PathBuf,

    /// 工作线程数量
    pub workers: usize,

    /// 开发模式
    pub dev_mode: bool,

    /// ONNX Runtime配置
    pub onnx_config: OnnxConfig,

    /// 服务器配置
    pub server_config: ServerConfig,

    /// 模型与预处理配置
    pub model_config: ModelConfig,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU线程数
    pub intra_threads: usize,

    /// 优化级别
    pub optimization_level: i32,

    /// 启用图优化
    pub enable_optimization: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 请求超时时间（秒）
    pub request_timeout: u64,

    /// 最大请求体大小（字节）
    pub max_request_size: usize,

    /// 最大图片大小（字节）
    pub max_image_size: usize,
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// 本次部署启用的视角标签
    pub labels: Vec<ViewpointLabel>,

    /// 单个标签的模型路径覆盖
    pub model_paths: HashMap<ViewpointLabel, PathBuf>,

    /// 输入归一化方式，必须与训练时一致
    pub normalization: Normalization,

    /// 模型输出是概率还是logit
    pub output: ModelOutput,

    /// 启动时预加载全部模型
    pub preload: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            labels: ViewpointLabel::ALL.to_vec(),
            model_paths: HashMap::new(),
            normalization: Normalization::Unit,
            output: ModelOutput::Probability,
            preload: false,
        }
    }
}

impl Config {
    pub fn new(
        bind_addr: String,
        models_dir: String,
        workers: Option<usize>,
        dev_mode: bool,
    ) -> Result<Self> {
        let cpu_cores = num_cpus::get();
        let workers = workers.unwrap_or(cpu_cores);

        let onnx_config = OnnxConfig {
            intra_threads: (cpu_cores / 2).max(1), // 多个标签的会话可能同时推理
            optimization_level: 3,
            enable_optimization: true,
        };

        let server_config = ServerConfig {
            request_timeout: if dev_mode { 300 } else { 60 },
            max_request_size: 20 * 1024 * 1024, // 20MB，包含multipart开销
            max_image_size: 15 * 1024 * 1024,
        };

        Ok(Self {
            bind_addr,
            models_dir: PathBuf::from(models_dir),
            workers,
            dev_mode,
            onnx_config,
            server_config,
            model_config: ModelConfig::default(),
        })
    }

    /// 限定启用的标签，重复项会被去除
    pub fn with_labels(mut self, labels: Vec<ViewpointLabel>) -> Result<Self> {
        if labels.is_empty() {
            return Err(anyhow!("At least one viewpoint label must be enabled"));
        }
        let mut labels = labels;
        labels.sort();
        labels.dedup();
        self.model_config.labels = labels;
        Ok(self)
    }

    pub fn with_model_path(mut self, label: ViewpointLabel, path: impl Into<PathBuf>) -> Self {
        self.model_config.model_paths.insert(label, path.into());
        self
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.model_config.normalization = normalization;
        self
    }

    pub fn with_output(mut self, output: ModelOutput) -> Self {
        self.model_config.output = output;
        self
    }

    pub fn with_preload(mut self, preload: bool) -> Self {
        self.model_config.preload = preload;
        self
    }

    /// 获取指定标签的模型路径
    pub fn model_path(&self, label: ViewpointLabel) -> PathBuf {
        self.model_config
            .model_paths
            .get(&label)
            .cloned()
            .unwrap_or_else(|| self.models_dir.join(label.artifact_file_name()))
    }

    /// 解析逗号分隔的标签列表，如 `front,back`
    pub fn parse_labels(value: &str) -> Result<Vec<ViewpointLabel>> {
        value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<ViewpointLabel>().map_err(|e| anyhow!(e)))
            .collect()
    }

    /// 解析 `LABEL=PATH` 形式的模型路径覆盖
    pub fn parse_model_override(value: &str) -> Result<(ViewpointLabel, PathBuf)> {
        let (label, path) = value
            .split_once('=')
            .with_context(|| format!("Expected LABEL=PATH, got '{}'", value))?;
        let label = label.trim().parse::<ViewpointLabel>().map_err(|e| anyhow!(e))?;
        let path = path.trim();
        if path.is_empty() {
            return Err(anyhow!("Empty model path for label '{}'", label));
        }
        Ok((label, PathBuf::from(path)))
    }
}
