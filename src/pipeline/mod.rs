// Pipeline wiring between the processing and render sides.

pub mod processor;

pub use processor::FrameProcessor;

use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::capture::ProcessingSession;
use crate::config::{ConfigError, ConfigStore, PipelineConfig};
use crate::diagnostics::{PipelineStats, StatsSnapshot};
use crate::error::Result;
use crate::frame::{FrameBufferManager, FrameHandle};
use crate::render::{GpuBackend, RenderBridge};

/// One camera-to-display pipeline.
///
/// Holds the state shared by both sides: the frame handoff, the live
/// configuration and the stats. Processors and render bridges created from
/// the same pipeline talk to each other only through the handoff.
pub struct Pipeline {
    frames: Arc<FrameBufferManager>,
    config: Arc<ConfigStore>,
    stats: Arc<Mutex<PipelineStats>>,
}

impl Pipeline {
    /// A pipeline with default configuration.
    pub fn new() -> Self {
        Self::with_store(Arc::new(ConfigStore::default()))
    }

    pub fn with_config(config: PipelineConfig) -> std::result::Result<Self, ConfigError> {
        Ok(Self::with_store(Arc::new(ConfigStore::in_memory(config)?)))
    }

    /// A pipeline whose configuration lives in the JSON file at `path`.
    pub fn open(path: PathBuf) -> Self {
        Self::with_store(Arc::new(ConfigStore::open(path)))
    }

    pub fn with_store(config: Arc<ConfigStore>) -> Self {
        let stats = Arc::new(Mutex::new(PipelineStats::new()));
        Self {
            frames: Arc::new(FrameBufferManager::new(Arc::clone(&stats))),
            config,
            stats,
        }
    }

    /// A processor for synchronous use on the capture thread.
    pub fn processor(&self) -> FrameProcessor {
        FrameProcessor::new(
            Arc::clone(&self.frames),
            Arc::clone(&self.config),
            Arc::clone(&self.stats),
        )
    }

    /// Start a background worker fed through [`ProcessingSession::submit`].
    pub fn start_session(&self) -> Result<ProcessingSession> {
        ProcessingSession::start(self.processor())
    }

    /// A render bridge drawing this pipeline's frames through `backend`.
    pub fn render_bridge<B: GpuBackend>(&self, backend: B) -> RenderBridge<B> {
        RenderBridge::new(
            backend,
            Arc::clone(&self.frames),
            Arc::clone(&self.config),
            Arc::clone(&self.stats),
        )
    }

    /// Notify the presentation surface whenever a frame is published.
    ///
    /// Runs on the processing thread; it should only schedule a render.
    pub fn on_frame_ready(&self, callback: impl Fn(FrameHandle) + Send + Sync + 'static) {
        self.frames.set_frame_ready_callback(Arc::new(callback));
    }

    /// Ask the render side to blank the display on its next tick.
    pub fn invalidate(&self) {
        self.frames.invalidate();
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.lock().snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.lock().reset();
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn frames(&self) -> &Arc<FrameBufferManager> {
        &self.frames
    }

    /// Stop accepting frames. Render bridges keep showing their last frame
    /// until they are shut down themselves.
    pub fn shutdown(&self) {
        self.frames.clear_frame_ready_callback();
        self.frames.close();
        info!("pipeline shut down");
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
