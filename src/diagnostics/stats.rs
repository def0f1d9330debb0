use serde::Serialize;
use std::time::{Duration, Instant};

/// Counters for one pipeline instance.
///
/// Shared between the processing and render sides behind a mutex. All
/// counters cover the window since creation or the last [`reset`].
///
/// [`reset`]: PipelineStats::reset
pub struct PipelineStats {
    processed: u64,
    superseded: u64,
    discarded: u64,
    rejected: u64,
    uploaded: u64,
    texture_reallocations: u64,
    rendered: u64,
    skipped: u64,
    total_bytes: u64,
    total_processing: Duration,
    last_processing: Duration,
    window_start: Instant,
}

/// Snapshot of pipeline stats for the host UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub fps: f64,
    pub processed_frames: u64,
    pub dropped_frames: u64,
    pub rejected_frames: u64,
    pub uploaded_frames: u64,
    pub texture_reallocations: u64,
    pub rendered_ticks: u64,
    pub skipped_ticks: u64,
    pub drop_rate: f64,
    pub last_processing_ms: f64,
    pub mean_processing_ms: f64,
    pub bandwidth_bps: u64,
}

impl PipelineStats {
    /// Create new stats with zeroed counters.
    pub fn new() -> Self {
        Self {
            processed: 0,
            superseded: 0,
            discarded: 0,
            rejected: 0,
            uploaded: 0,
            texture_reallocations: 0,
            rendered: 0,
            skipped: 0,
            total_bytes: 0,
            total_processing: Duration::ZERO,
            last_processing: Duration::ZERO,
            window_start: Instant::now(),
        }
    }

    /// Record a frame that was converted, filtered and published.
    pub fn record_processed(&mut self, bytes: usize, elapsed: Duration) {
        self.processed += 1;
        self.total_bytes += bytes as u64;
        self.total_processing += elapsed;
        self.last_processing = elapsed;
    }

    /// Record a processed frame superseded before it was displayed.
    pub fn record_superseded(&mut self) {
        self.superseded += 1;
    }

    /// Record a captured frame replaced before it was processed.
    pub fn record_discarded(&mut self) {
        self.discarded += 1;
    }

    /// Frames that never reached the screen, whichever side dropped them.
    pub fn dropped(&self) -> u64 {
        self.superseded + self.discarded
    }

    /// Record a frame rejected by an error.
    pub fn record_rejected(&mut self) {
        self.rejected += 1;
    }

    /// Record a completed texture upload (one texture generation).
    pub fn record_upload(&mut self) {
        self.uploaded += 1;
    }

    pub fn record_texture_reallocation(&mut self) {
        self.texture_reallocations += 1;
    }

    pub fn record_render(&mut self) {
        self.rendered += 1;
    }

    /// Record a render tick skipped after a GPU failure.
    pub fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    /// Processed frames per second over the current window.
    pub fn fps(&self) -> f64 {
        let elapsed = self.window_start.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0.0;
        }
        self.processed as f64 / elapsed
    }

    /// Dropped frames as a percentage (0.0 - 100.0) of captured frames.
    ///
    /// Superseded frames were processed first, so only discarded ones add
    /// to the total.
    pub fn drop_rate(&self) -> f64 {
        let total = self.processed + self.discarded;
        if total == 0 {
            return 0.0;
        }
        (self.dropped() as f64 / total as f64) * 100.0
    }

    pub fn mean_processing_ms(&self) -> f64 {
        if self.processed == 0 {
            return 0.0;
        }
        self.total_processing.as_secs_f64() * 1000.0 / self.processed as f64
    }

    /// Processed pixel bytes per second.
    pub fn bandwidth_bps(&self) -> u64 {
        let elapsed = self.window_start.elapsed().as_secs_f64();
        if elapsed < 0.001 {
            return 0;
        }
        (self.total_bytes as f64 / elapsed) as u64
    }

    /// Reset all counters and restart the FPS window.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Take a serialisable snapshot.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            fps: self.fps(),
            processed_frames: self.processed,
            dropped_frames: self.dropped(),
            rejected_frames: self.rejected,
            uploaded_frames: self.uploaded,
            texture_reallocations: self.texture_reallocations,
            rendered_ticks: self.rendered,
            skipped_ticks: self.skipped,
            drop_rate: self.drop_rate(),
            last_processing_ms: self.last_processing.as_secs_f64() * 1000.0,
            mean_processing_ms: self.mean_processing_ms(),
            bandwidth_bps: self.bandwidth_bps(),
        }
    }
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self::new()
    }
}
