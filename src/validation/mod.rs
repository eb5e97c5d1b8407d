pub mod pipeline;
pub mod types;

pub use pipeline::ViewpointValidator;
pub use types::{Outcome, Verdict};
