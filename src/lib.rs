pub mod capture;
pub mod config;
pub mod convert;
pub mod diagnostics;
pub mod error;
pub mod filter;
pub mod frame;
pub mod pipeline;
pub mod render;

pub use capture::{OwnedYuvFrame, ProcessingSession, SyntheticSource};
pub use config::{ConfigStore, PipelineConfig, ProcessingMode};
pub use convert::{PlaneDescriptor, YuvConverter, YuvFrame};
pub use error::{PipelineError, Result};
pub use frame::{ChannelLayout, FrameHandle, PixelBuffer};
pub use pipeline::{FrameProcessor, Pipeline};
pub use render::{GpuBackend, HeadlessBackend, RenderBridge, RenderOutcome, WgpuBackend};

/// Human-readable description of the native processor, for host about boxes
/// and logs.
pub fn processor_info() -> String {
    format!(
        "{} {} (yuv420 -> rgba, canny edges, {} {})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}
