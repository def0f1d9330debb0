pub mod edge;
pub mod kernel;

pub use edge::{EdgeDetector, EdgeParams};
pub use kernel::SmoothingKernel;
