use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use crate::diagnostics::PipelineStats;
use crate::error::{PipelineError, Result};
use crate::frame::buffer::{ChannelLayout, PixelBuffer};
use crate::frame::pool::BufferPool;

/// Called on the processing thread each time a frame is published.
pub type FrameReadyCallback = Arc<dyn Fn(FrameHandle) + Send + Sync>;

/// Identifies one published frame.
///
/// Handles are plain values; holding one never keeps pixel storage alive.
/// The pixels are reached only through the [`FrameLease`] handed out by
/// [`FrameBufferManager::take_latest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameHandle {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub layout: ChannelLayout,
}

enum SlotEntry {
    Frame {
        handle: FrameHandle,
        buffer: PixelBuffer,
    },
    Blank,
}

/// What the render side finds in the handoff slot.
pub enum FrameUpdate {
    Frame(FrameLease),
    /// The display was explicitly invalidated.
    Blank,
}

/// Exclusive access to a published buffer on the render side.
///
/// The processing side cannot reach this buffer until the lease is dropped,
/// at which point the storage goes back to the pool.
pub struct FrameLease {
    handle: FrameHandle,
    buffer: PixelBuffer,
    pool: Arc<BufferPool>,
}

impl FrameLease {
    pub fn handle(&self) -> FrameHandle {
        self.handle
    }

    pub fn buffer(&self) -> &PixelBuffer {
        &self.buffer
    }
}

impl Drop for FrameLease {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buffer));
    }
}

/// Owns the working buffers and the single-slot latest-frame handoff.
///
/// The processing side fills a buffer from [`acquire_working_buffer`] and
/// hands it over with [`publish`]; from then on only the render side can
/// touch it. Publishing atomically replaces whatever the slot held, and an
/// unconsumed frame replaced this way is counted as dropped and recycled.
///
/// [`acquire_working_buffer`]: FrameBufferManager::acquire_working_buffer
/// [`publish`]: FrameBufferManager::publish
pub struct FrameBufferManager {
    slot: ArcSwapOption<SlotEntry>,
    pool: Arc<BufferPool>,
    sequence: AtomicU64,
    closed: AtomicBool,
    on_ready: Mutex<Option<FrameReadyCallback>>,
    stats: Arc<Mutex<PipelineStats>>,
}

impl FrameBufferManager {
    pub fn new(stats: Arc<Mutex<PipelineStats>>) -> Self {
        Self::with_pool(Arc::new(BufferPool::default()), stats)
    }

    pub fn with_pool(pool: Arc<BufferPool>, stats: Arc<Mutex<PipelineStats>>) -> Self {
        Self {
            slot: ArcSwapOption::empty(),
            pool,
            sequence: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            on_ready: Mutex::new(None),
            stats,
        }
    }

    /// Register the frame-ready notification, replacing any previous one.
    pub fn set_frame_ready_callback(&self, callback: FrameReadyCallback) {
        *self.on_ready.lock() = Some(callback);
    }

    pub fn clear_frame_ready_callback(&self) {
        *self.on_ready.lock() = None;
    }

    /// Take a buffer to write the next frame into.
    pub fn acquire_working_buffer(
        &self,
        width: u32,
        height: u32,
        layout: ChannelLayout,
    ) -> Result<PixelBuffer> {
        if self.is_closed() {
            return Err(PipelineError::Shutdown);
        }
        self.pool.acquire(width, height, layout)
    }

    /// Give back a working buffer that will not be published.
    pub fn release(&self, buffer: PixelBuffer) {
        self.pool.release(buffer);
    }

    /// Make `buffer` the latest frame visible to the render side.
    pub fn publish(&self, buffer: PixelBuffer) -> Result<FrameHandle> {
        if self.is_closed() {
            self.pool.release(buffer);
            return Err(PipelineError::Shutdown);
        }

        let handle = FrameHandle {
            sequence: self.sequence.fetch_add(1, Ordering::Relaxed) + 1,
            width: buffer.width(),
            height: buffer.height(),
            layout: buffer.layout(),
        };

        let previous = self
            .slot
            .swap(Some(Arc::new(SlotEntry::Frame { handle, buffer })));
        if self.is_closed() {
            // `close` ran between the check above and the swap; its pool is
            // already cleared, so the storage is freed instead of recycled.
            drop(self.slot.swap(None));
            drop(previous);
            return Err(PipelineError::Shutdown);
        }
        if let Some(superseded) = self.recycle(previous) {
            trace!(
                "frame {} superseded by {} before display",
                superseded.sequence,
                handle.sequence
            );
            self.stats.lock().record_superseded();
        }

        let callback = self.on_ready.lock().clone();
        if let Some(callback) = callback {
            callback(handle);
        }
        Ok(handle)
    }

    /// Consume whatever was published since the last call.
    ///
    /// `None` means nothing new: the render side keeps showing its current
    /// texture.
    pub fn take_latest(&self) -> Option<FrameUpdate> {
        if self.is_closed() {
            return None;
        }
        let entry = self.slot.swap(None)?;
        match Arc::try_unwrap(entry) {
            Ok(SlotEntry::Frame { handle, buffer }) => Some(FrameUpdate::Frame(FrameLease {
                handle,
                buffer,
                pool: Arc::clone(&self.pool),
            })),
            Ok(SlotEntry::Blank) => Some(FrameUpdate::Blank),
            Err(_) => {
                debug!("handoff entry still shared, skipping");
                None
            }
        }
    }

    /// Replace the pending frame with a request to blank the display.
    pub fn invalidate(&self) {
        let previous = self.slot.swap(Some(Arc::new(SlotEntry::Blank)));
        self.recycle(previous);
    }

    /// Stop accepting frames and release every buffer not held by a lease.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let previous = self.slot.swap(None);
        self.recycle(previous);
        self.pool.clear();
        debug!("frame buffer manager closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Sequence number of the most recently published frame (0 before any).
    pub fn last_sequence(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Return a displaced slot entry's buffer to the pool. Yields the handle
    /// when the entry was an unconsumed frame.
    fn recycle(&self, entry: Option<Arc<SlotEntry>>) -> Option<FrameHandle> {
        match Arc::try_unwrap(entry?) {
            Ok(SlotEntry::Frame { handle, buffer }) => {
                self.pool.release(buffer);
                Some(handle)
            }
            Ok(SlotEntry::Blank) | Err(_) => None,
        }
    }
}
