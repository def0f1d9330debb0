use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::capture::OwnedYuvFrame;
use crate::config::{ConfigStore, PipelineConfig, ProcessingMode};
use crate::convert::{YuvConverter, YuvFrame};
use crate::diagnostics::PipelineStats;
use crate::error::{PipelineError, Result};
use crate::filter::EdgeDetector;
use crate::frame::{ChannelLayout, FrameBufferManager, FrameHandle, PixelBuffer};

/// Converts, filters and publishes frames on the processing side.
///
/// One processor serves one capture stream; it keeps the edge detector's
/// scratch space between frames, so frames of a stable geometry cause no
/// allocation at all.
pub struct FrameProcessor {
    frames: Arc<FrameBufferManager>,
    config: Arc<ConfigStore>,
    stats: Arc<Mutex<PipelineStats>>,
    revision: u64,
    mode: ProcessingMode,
    converter: YuvConverter,
    detector: EdgeDetector,
    geometry: Option<(u32, u32)>,
    cancel: Option<Arc<AtomicBool>>,
}

impl FrameProcessor {
    pub fn new(
        frames: Arc<FrameBufferManager>,
        config: Arc<ConfigStore>,
        stats: Arc<Mutex<PipelineStats>>,
    ) -> Self {
        let revision = config.revision();
        let current = config.get();
        Self {
            frames,
            config,
            stats,
            revision,
            mode: current.mode,
            converter: current.converter(),
            detector: EdgeDetector::new(current.edge_params()),
            geometry: None,
            cancel: None,
        }
    }

    /// Abandon in-flight frames once `cancel` is set: a frame that has not
    /// been published yet goes back to the pool and `process` returns
    /// `Shutdown`.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Run one frame through the pipeline and publish the result.
    ///
    /// A rejected frame is counted and logged; whatever was displayed
    /// before stays on screen.
    pub fn process(&mut self, frame: &YuvFrame<'_>) -> Result<FrameHandle> {
        self.refresh_config();
        let started = Instant::now();

        match self.run(frame) {
            Ok((handle, bytes)) => {
                self.stats.lock().record_processed(bytes, started.elapsed());
                Ok(handle)
            }
            Err(PipelineError::Shutdown) => {
                debug!("frame {}x{} discarded after shutdown", frame.width, frame.height);
                Err(PipelineError::Shutdown)
            }
            Err(e) => {
                warn!("rejected {}x{} frame: {e}", frame.width, frame.height);
                self.stats.lock().record_rejected();
                Err(e)
            }
        }
    }

    pub fn process_owned(&mut self, frame: &OwnedYuvFrame) -> Result<FrameHandle> {
        self.process(&frame.as_frame())
    }

    pub fn mode(&self) -> ProcessingMode {
        self.mode
    }

    pub fn frames(&self) -> &Arc<FrameBufferManager> {
        &self.frames
    }

    pub fn stats(&self) -> &Arc<Mutex<PipelineStats>> {
        &self.stats
    }

    fn run(&mut self, frame: &YuvFrame<'_>) -> Result<(FrameHandle, usize)> {
        if self.is_cancelled() {
            return Err(PipelineError::Shutdown);
        }
        // Validate before touching the pool so a malformed frame cannot
        // evict buffers of the current geometry.
        self.converter.validate(frame)?;
        self.note_geometry(frame.width, frame.height);

        let mut buffer =
            self.frames
                .acquire_working_buffer(frame.width, frame.height, ChannelLayout::Rgba)?;
        if let Err(e) = self.fill(frame, &mut buffer) {
            self.frames.release(buffer);
            return Err(e);
        }
        if self.is_cancelled() {
            self.frames.release(buffer);
            return Err(PipelineError::Shutdown);
        }
        let bytes = buffer.len();
        let handle = self.frames.publish(buffer)?;
        Ok((handle, bytes))
    }

    fn fill(&mut self, frame: &YuvFrame<'_>, buffer: &mut PixelBuffer) -> Result<()> {
        self.converter.convert_into(frame, buffer)?;
        if self.mode == ProcessingMode::EdgeDetection {
            self.detector.apply(buffer)?;
        }
        Ok(())
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|cancel| cancel.load(Ordering::Acquire))
    }

    fn note_geometry(&mut self, width: u32, height: u32) {
        match self.geometry.replace((width, height)) {
            Some(old) if old != (width, height) => {
                info!(
                    "capture geometry changed {}x{} -> {width}x{height}",
                    old.0, old.1
                );
            }
            None => info!("capture geometry {width}x{height}"),
            Some(_) => {}
        }
    }

    fn refresh_config(&mut self) {
        if let Some((revision, config)) = self.config.changed_since(self.revision) {
            self.revision = revision;
            self.apply_config(&config);
        }
    }

    fn apply_config(&mut self, config: &PipelineConfig) {
        if config.mode != self.mode {
            info!("processing mode {:?} -> {:?}", self.mode, config.mode);
        }
        self.mode = config.mode;
        self.converter = config.converter();
        self.detector.set_params(config.edge_params());
    }
}
