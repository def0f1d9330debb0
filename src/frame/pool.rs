use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::frame::buffer::{required_len, ChannelLayout, PixelBuffer};

/// Default number of idle buffers kept for reuse: one being filled, one
/// waiting in the handoff slot, one being uploaded.
pub const DEFAULT_MAX_BUFFERS: usize = 3;

/// Reusable pixel buffers for a single frame geometry.
///
/// Buffers are handed out by value and come back through [`release`].
/// When the requested geometry changes, every pooled buffer of the old
/// size is dropped; buffers are never resized in place.
///
/// [`release`]: BufferPool::release
#[derive(Debug)]
pub struct BufferPool {
    inner: Mutex<PoolInner>,
    max_buffers: usize,
}

#[derive(Debug, Default)]
struct PoolInner {
    geometry: Option<(u32, u32)>,
    free: Vec<PixelBuffer>,
    allocations: u64,
}

impl BufferPool {
    pub fn new(max_buffers: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
            max_buffers,
        }
    }

    /// Take a buffer with the given geometry, reusing pooled storage when
    /// one fits and allocating otherwise.
    pub fn acquire(&self, width: u32, height: u32, layout: ChannelLayout) -> Result<PixelBuffer> {
        let needed = required_len(width, height, layout).unwrap_or(0);
        {
            let mut inner = self.inner.lock();
            if inner.geometry != Some((width, height)) {
                if let Some((old_w, old_h)) = inner.geometry {
                    debug!(
                        "frame geometry changed {old_w}x{old_h} -> {width}x{height}, releasing {} pooled buffers",
                        inner.free.len()
                    );
                }
                inner.free.clear();
                inner.geometry = Some((width, height));
            }

            if let Some(pos) = inner.free.iter().position(|b| b.capacity() >= needed) {
                let mut buffer = inner.free.swap_remove(pos);
                buffer.relayout(layout)?;
                return Ok(buffer);
            }
        }

        // Allocate outside the lock so the render side can return buffers meanwhile.
        let buffer = PixelBuffer::try_new(width, height, layout)?;
        let mut inner = self.inner.lock();
        inner.allocations += 1;
        debug!(
            "allocated {width}x{height} {layout:?} buffer ({} bytes, {} total allocations)",
            buffer.capacity(),
            inner.allocations
        );
        Ok(buffer)
    }

    /// Return a buffer for reuse. Buffers of a stale geometry, or beyond
    /// the pool limit, are dropped.
    pub fn release(&self, buffer: PixelBuffer) {
        let mut inner = self.inner.lock();
        let current = inner.geometry == Some((buffer.width(), buffer.height()));
        if current && inner.free.len() < self.max_buffers {
            inner.free.push(buffer);
        }
    }

    /// Drop every pooled buffer and forget the current geometry.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.free.clear();
        inner.geometry = None;
    }

    /// Number of fresh allocations made since the pool was created.
    pub fn allocations(&self) -> u64 {
        self.inner.lock().allocations
    }

    /// Idle buffers ready for reuse.
    pub fn available(&self) -> usize {
        self.inner.lock().free.len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFERS)
    }
}
