use crate::convert::{PlaneDescriptor, YuvFrame};

/// Geometry of one plane inside an [`OwnedYuvFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlaneLayout {
    /// Index into the frame's buffers.
    source: usize,
    /// First byte of the plane within that buffer.
    offset: usize,
    width: u32,
    height: u32,
    row_stride: usize,
    pixel_stride: usize,
}

/// One owned plane handed to [`OwnedYuvFrame::from_planes`].
#[derive(Debug, Clone)]
pub struct OwnedPlane {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub row_stride: usize,
    pub pixel_stride: usize,
}

impl OwnedPlane {
    pub fn new(
        data: Vec<u8>,
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
}

/// A YUV 4:2:0 frame that owns its pixel storage.
///
/// Used where a frame has to outlive the capture callback, such as the
/// processing session's mailbox. Semi-planar chroma is stored once and
/// exposed as two aliasing planes, the way camera buffers arrive.
#[derive(Debug, Clone)]
pub struct OwnedYuvFrame {
    width: u32,
    height: u32,
    buffers: Vec<Vec<u8>>,
    planes: [PlaneLayout; 3],
}

impl OwnedYuvFrame {
    /// Three independent planes in capture order (Y, then the two chroma planes).
    pub fn from_planes(width: u32, height: u32, planes: [OwnedPlane; 3]) -> Self {
        let mut buffers = Vec::with_capacity(3);
        let layouts = planes.map(|plane| {
            buffers.push(plane.data);
            PlaneLayout {
                source: buffers.len() - 1,
                offset: 0,
                width: plane.width,
                height: plane.height,
                row_stride: plane.row_stride,
                pixel_stride: plane.pixel_stride,
            }
        });
        Self {
            width,
            height,
            buffers,
            planes: layouts,
        }
    }

    /// A luma plane plus one interleaved chroma buffer (NV12/NV21).
    ///
    /// The chroma planes alias `chroma` at offsets 0 and 1 with a pixel
    /// stride of 2.
    pub fn semi_planar(
        width: u32,
        height: u32,
        luma: OwnedPlane,
        chroma: Vec<u8>,
        chroma_row_stride: usize,
    ) -> Self {
        let chroma_width = width.div_ceil(2);
        let chroma_height = height.div_ceil(2);
        let chroma_plane = |offset| PlaneLayout {
            source: 1,
            offset,
            width: chroma_width,
            height: chroma_height,
            row_stride: chroma_row_stride,
            pixel_stride: 2,
        };
        let y = PlaneLayout {
            source: 0,
            offset: 0,
            width: luma.width,
            height: luma.height,
            row_stride: luma.row_stride,
            pixel_stride: luma.pixel_stride,
        };
        Self {
            width,
            height,
            buffers: vec![luma.data, chroma],
            planes: [y, chroma_plane(0), chroma_plane(1)],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Total bytes of plane storage held by the frame.
    pub fn byte_len(&self) -> usize {
        self.buffers.iter().map(Vec::len).sum()
    }

    /// Borrow the frame for conversion.
    pub fn as_frame(&self) -> YuvFrame<'_> {
        let planes = self.planes.map(|p| {
            // An offset past the end leaves an empty plane, which fails validation.
            let data = self
                .buffers
                .get(p.source)
                .and_then(|b| b.get(p.offset..))
                .unwrap_or(&[]);
            PlaneDescriptor::new(data, p.width, p.height, p.row_stride, p.pixel_stride)
        });
        YuvFrame::new(self.width, self.height, planes)
    }
}
