pub mod error;
pub mod store;
pub mod types;

pub use error::ConfigError;
pub use store::ConfigStore;
pub use types::{PipelineConfig, ProcessingMode};
