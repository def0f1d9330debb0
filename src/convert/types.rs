use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Which chroma plane the capture delivers first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaneOrder {
    /// Planes arrive as Y, U (Cb), V (Cr).
    #[default]
    Uv,
    /// Planes arrive as Y, V (Cr), U (Cb), as in NV21.
    Vu,
}

/// Quantisation range of the incoming YUV samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ColorRange {
    /// Y, U and V span 0-255 (JPEG / camera full swing).
    #[default]
    Full,
    /// Y spans 16-235 and chroma 16-240 (BT.601 studio swing).
    Video,
}

/// One borrowed Y, U or V plane with its memory layout.
///
/// `row_stride` is the byte distance between rows and `pixel_stride` the
/// byte distance between samples within a row. Sensor buffers are often
/// padded, so neither is assumed to match the width.
#[derive(Debug, Clone, Copy)]
pub struct PlaneDescriptor<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub row_stride: usize,
    pub pixel_stride: usize,
}

impl<'a> PlaneDescriptor<'a> {
    pub fn new(
        data: &'a [u8],
        width: u32,
        height: u32,
        row_stride: usize,
        pixel_stride: usize,
    ) -> Self {
        Self {
            data,
            width,
            height,
            row_stride,
            pixel_stride,
        }
    }

    /// Bytes the plane must hold: every row but the last at full stride,
    /// plus the samples of the last row. Capture APIs commonly omit the
    /// padding after the final row.
    pub fn required_len(&self) -> Option<usize> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        let last_row = (self.height as usize - 1).checked_mul(self.row_stride)?;
        let last_sample = (self.width as usize - 1).checked_mul(self.pixel_stride)?;
        last_row.checked_add(last_sample)?.checked_add(1)
    }

    /// Check that the plane covers `width` x `height` samples without any
    /// read falling outside `data`.
    pub(crate) fn validate(&self, name: &'static str, width: u32, height: u32) -> Result<()> {
        if self.width < width || self.height < height {
            return Err(PipelineError::plane(
                name,
                format!(
                    "plane is {}x{}, frame needs {width}x{height}",
                    self.width, self.height
                ),
            ));
        }
        if self.pixel_stride == 0 {
            return Err(PipelineError::plane(name, "pixel stride is zero"));
        }
        let row_span = (self.width as usize - 1)
            .checked_mul(self.pixel_stride)
            .and_then(|span| span.checked_add(1))
            .ok_or_else(|| PipelineError::plane(name, "row span overflows"))?;
        if self.row_stride < row_span {
            return Err(PipelineError::plane(
                name,
                format!(
                    "row stride {} is shorter than a {}-byte row",
                    self.row_stride, row_span
                ),
            ));
        }
        let required = self
            .required_len()
            .ok_or_else(|| PipelineError::plane(name, "plane size overflows"))?;
        if self.data.len() < required {
            return Err(PipelineError::plane(
                name,
                format!(
                    "buffer holds {} bytes, {required} required",
                    self.data.len()
                ),
            ));
        }
        Ok(())
    }

    #[inline]
    pub(crate) fn row_offset(&self, row: usize) -> usize {
        row * self.row_stride
    }
}

/// A 4:2:0 frame as delivered by the capture driver.
///
/// `planes` holds the luma plane followed by the two chroma planes in
/// capture order; [`PlaneOrder`] says which chroma plane is which. Chroma
/// planes cover `ceil(width / 2)` x `ceil(height / 2)` samples.
#[derive(Debug, Clone, Copy)]
pub struct YuvFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub planes: [PlaneDescriptor<'a>; 3],
}

impl<'a> YuvFrame<'a> {
    pub fn new(width: u32, height: u32, planes: [PlaneDescriptor<'a>; 3]) -> Self {
        Self {
            width,
            height,
            planes,
        }
    }

    pub fn chroma_width(&self) -> u32 {
        self.width.div_ceil(2)
    }

    pub fn chroma_height(&self) -> u32 {
        self.height.div_ceil(2)
    }
}
