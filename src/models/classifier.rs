use crate::config::{OnnxConfig, INPUT_SIZE};
use crate::utils::error::ValidatorError;
use crate::Result;
use ndarray::Array4;
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    tensor::TensorElementType,
    value::{Tensor, ValueType},
};
use parking_lot::Mutex;
use std::fmt;
use std::path::Path;

/// 单输出二分类模型
///
/// 输入为 `[1, 3, H, W]` 的张量，输出为 [0, 1] 区间内的单个概率。
/// 实现必须是只读的：同一输入总是得到同一输出。
pub trait BinaryClassifier: Send + Sync {
    fn predict(&self, input: Array4<f32>) -> Result<f32>;
}

/// 模型最后一层输出的含义
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelOutput {
    /// 导出的模型已包含sigmoid头
    Probability,
    /// 原始logit，需要再做一次sigmoid
    Logit,
}

impl ModelOutput {
    pub fn to_probability(&self, raw: f32) -> f32 {
        match self {
            ModelOutput::Probability => raw,
            ModelOutput::Logit => 1.0 / (1.0 + (-raw).exp()),
        }
    }
}

impl fmt::Display for ModelOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelOutput::Probability => f.write_str("probability"),
            ModelOutput::Logit => f.write_str("logit"),
        }
    }
}

/// ONNX Runtime 推理会话
pub struct OnnxClassifier {
    session: Mutex<Session>,
    input_name: String,  // 动态发现的输入名称
    output_name: String, // 动态发现的输出名称
    output: ModelOutput,
}

impl OnnxClassifier {
    /// 从文件构建会话并校验输入输出形状，任何失败都视为模型文件损坏
    pub fn load(path: &Path, onnx_config: &OnnxConfig, output: ModelOutput) -> Result<Self> {
        tracing::info!("Loading classification model from: {}", path.display());

        let optimization_level = if onnx_config.enable_optimization {
            match onnx_config.optimization_level {
                i32::MIN..=0 => GraphOptimizationLevel::Disable,
                1 => GraphOptimizationLevel::Level1,
                2 => GraphOptimizationLevel::Level2,
                _ => GraphOptimizationLevel::Level3,
            }
        } else {
            GraphOptimizationLevel::Disable
        };

        let session = Session::builder()
            .map_err(corrupt_with(path))?
            .with_optimization_level(optimization_level)
            .map_err(corrupt_with(path))?
            .with_intra_threads(onnx_config.intra_threads)
            .map_err(corrupt_with(path))?
            .commit_from_file(path)
            .map_err(corrupt_with(path))?;

        let (input_name, output_name) = Self::check_signature(path, &session)?;

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            output,
        })
    }

    /// 校验模型签名：一个 float32 `[N, 3, 224, 224]` 输入，一个每张图单值的 float32 输出
    fn check_signature(path: &Path, session: &Session) -> Result<(String, String)> {
        let input = match session.inputs.as_slice() {
            [input] => input,
            inputs => {
                return Err(ValidatorError::corrupt(
                    path,
                    format!("expected exactly one input, found {}", inputs.len()),
                ))
            }
        };

        if !is_float32_tensor(&input.input_type) {
            return Err(ValidatorError::corrupt(
                path,
                format!(
                    "input '{}' must be a float32 tensor, found {:?}",
                    input.name, input.input_type
                ),
            ));
        }

        let expected = [3, INPUT_SIZE as i64, INPUT_SIZE as i64];
        match input.input_type.tensor_shape() {
            Some(shape) if shape.len() == 4 => {
                // 维度为负表示动态维度
                let fixed_ok = shape[1..]
                    .iter()
                    .zip(expected.iter())
                    .all(|(&dim, &want)| dim < 0 || dim == want);
                if !fixed_ok || shape[0] > 1 {
                    return Err(ValidatorError::corrupt(
                        path,
                        format!("unexpected input shape {:?}, expected [N, 3, 224, 224]", &shape[..]),
                    ));
                }
            }
            Some(shape) => {
                return Err(ValidatorError::corrupt(
                    path,
                    format!("unexpected input rank {}, expected 4", shape.len()),
                ))
            }
            None => {
                return Err(ValidatorError::corrupt(path, "model input is not a tensor"));
            }
        }

        let output = session
            .outputs
            .first()
            .ok_or_else(|| ValidatorError::corrupt(path, "model has no outputs"))?;

        if !is_float32_tensor(&output.output_type) {
            return Err(ValidatorError::corrupt(
                path,
                format!(
                    "output '{}' must be a float32 tensor, found {:?}",
                    output.name, output.output_type
                ),
            ));
        }

        if let Some(shape) = output.output_type.tensor_shape() {
            let per_image: i64 = shape.iter().skip(1).product();
            if shape.is_empty() || (per_image != 1 && shape.iter().skip(1).all(|&d| d > 0)) {
                return Err(ValidatorError::corrupt(
                    path,
                    format!("unexpected output shape {:?}, expected [N, 1]", &shape[..]),
                ));
            }
        }

        tracing::info!(
            "Classification model input: '{}', output: '{}'",
            input.name,
            output.name
        );
        for (i, output) in session.outputs.iter().enumerate() {
            tracing::debug!("Classification output[{}]: '{}'", i, output.name);
        }

        Ok((input.name.clone(), output.name.clone()))
    }
}

impl BinaryClassifier for OnnxClassifier {
    fn predict(&self, input: Array4<f32>) -> Result<f32> {
        let input_tensor = Tensor::from_array(input)?;

        let raw = {
            let mut session = self.session.lock();
            let outputs = session.run(inputs![self.input_name.as_str() => input_tensor])?;

            let output = match outputs.get(self.output_name.as_str()) {
                Some(output) => output.try_extract_array::<f32>()?,
                None => {
                    let available_outputs: Vec<String> =
                        outputs.keys().map(|s| s.to_string()).collect();
                    return Err(ValidatorError::ValidationFailed(format!(
                        "Classification output '{}' not found. Available outputs: {:?}",
                        self.output_name, available_outputs
                    )));
                }
            };

            if output.len() != 1 {
                return Err(ValidatorError::ValidationFailed(format!(
                    "Expected a single score, model returned shape {:?}",
                    output.shape()
                )));
            }
            output.iter().copied().next().unwrap_or(f32::NAN)
        };

        Ok(self.output.to_probability(raw))
    }
}

/// 模型加载接口，测试中可替换为桩实现
pub trait ModelLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<std::sync::Arc<dyn BinaryClassifier>>;
}

/// 生产环境使用的 ONNX 加载器
pub struct OnnxModelLoader {
    onnx_config: OnnxConfig,
    output: ModelOutput,
}

impl OnnxModelLoader {
    pub fn new(onnx_config: OnnxConfig, output: ModelOutput) -> Self {
        Self { onnx_config, output }
    }
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self, path: &Path) -> Result<std::sync::Arc<dyn BinaryClassifier>> {
        let classifier = OnnxClassifier::load(path, &self.onnx_config, self.output)?;
        Ok(std::sync::Arc::new(classifier))
    }
}

fn is_float32_tensor(value_type: &ValueType) -> bool {
    matches!(
        value_type,
        ValueType::Tensor {
            ty: TensorElementType::Float32,
            ..
        }
    )
}

fn corrupt_with<E: fmt::Display>(path: &Path) -> impl Fn(E) -> ValidatorError + '_ {
    move |e| ValidatorError::corrupt(path, e)
}
