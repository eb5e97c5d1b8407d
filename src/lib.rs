pub mod config;
pub mod image;
pub mod models;
pub mod utils;
pub mod validation;
pub mod web;

// 重新导出主要类型
pub use config::Config;
pub use models::{ModelRegistry, ViewpointLabel};
pub use utils::error::ValidatorError;
pub use validation::{Outcome, Verdict, ViewpointValidator};

pub type Result<T> = std::result::Result<T, ValidatorError>;
