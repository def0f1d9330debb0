use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Pixel packing of a [`PixelBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelLayout {
    /// Interleaved R, G, B, A bytes.
    #[default]
    Rgba,
    /// One intensity byte per pixel.
    Luminance,
}

impl ChannelLayout {
    /// Bytes per pixel.
    pub const fn channels(self) -> usize {
        match self {
            Self::Rgba => 4,
            Self::Luminance => 1,
        }
    }
}

/// Owned, packed pixel storage with its geometry.
///
/// The backing storage is sized once at allocation and never grows. The
/// layout may change in place (RGBA to luminance and back) as long as the
/// new layout fits in the allocated capacity. The default buffer is empty
/// and owns no storage.
#[derive(Debug, Default)]
pub struct PixelBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
    layout: ChannelLayout,
}

impl PixelBuffer {
    /// Allocate a zeroed buffer for the given geometry.
    ///
    /// Fails with `AllocationFailure` when the size overflows or the
    /// allocator refuses, instead of aborting the process.
    pub fn try_new(width: u32, height: u32, layout: ChannelLayout) -> Result<Self> {
        let len = required_len(width, height, layout).ok_or_else(|| {
            PipelineError::AllocationFailure(format!(
                "cannot size a {width}x{height} {layout:?} buffer"
            ))
        })?;

        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|e| {
            PipelineError::AllocationFailure(format!("{len} bytes for {width}x{height}: {e}"))
        })?;
        data.resize(len, 0);

        Ok(Self {
            data,
            width,
            height,
            layout,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    /// Allocated storage in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Bytes occupied by the image in its current layout.
    pub fn len(&self) -> usize {
        self.width as usize * self.height as usize * self.layout.channels()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes per row in the current layout.
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.layout.channels()
    }

    /// Whether the buffer has the given dimensions, regardless of layout.
    pub fn has_geometry(&self, width: u32, height: u32) -> bool {
        self.width == width && self.height == height
    }

    /// The image bytes in the current layout.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let len = self.len();
        &mut self.data[..len]
    }

    /// Switch the pixel layout without reallocating.
    ///
    /// Contents are not converted; callers rewrite the pixels afterwards.
    pub fn relayout(&mut self, layout: ChannelLayout) -> Result<()> {
        if layout == self.layout {
            return Ok(());
        }
        match required_len(self.width, self.height, layout) {
            Some(len) if len <= self.data.len() => {
                self.layout = layout;
                Ok(())
            }
            _ => Err(PipelineError::AllocationFailure(format!(
                "{}x{} {layout:?} does not fit in {} bytes",
                self.width,
                self.height,
                self.data.len()
            ))),
        }
    }
}

/// Bytes needed for an image, or `None` for empty or overflowing geometry.
pub fn required_len(width: u32, height: u32, layout: ChannelLayout) -> Option<usize> {
    if width == 0 || height == 0 {
        return None;
    }
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(layout.channels())
}
