pub mod classifier;
pub mod label;
pub mod registry;

pub use classifier::{BinaryClassifier, ModelLoader, ModelOutput, OnnxClassifier, OnnxModelLoader};
pub use label::ViewpointLabel;
pub use registry::{ModelRegistry, RegistryStats};
