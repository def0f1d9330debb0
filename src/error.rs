use thiserror::Error;

/// Frame pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A plane is too small for its declared geometry, or the geometry itself is malformed.
    #[error("invalid {plane} plane geometry: {reason}")]
    InvalidPlaneGeometry { plane: &'static str, reason: String },

    #[error("allocation failed: {0}")]
    AllocationFailure(String),

    #[error("GPU state error: {0}")]
    GpuState(String),

    #[error("pipeline has been shut down")]
    Shutdown,
}

impl PipelineError {
    pub(crate) fn plane(plane: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidPlaneGeometry {
            plane,
            reason: reason.into(),
        }
    }

    /// Whether the failure is contained to the frame or tick that raised it.
    ///
    /// Frame-local errors drop the current frame; the next frame is processed
    /// normally and the last good texture stays on screen.
    pub fn is_frame_local(&self) -> bool {
        !matches!(self, Self::Shutdown)
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, PipelineError>;
