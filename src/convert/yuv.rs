use crate::convert::types::{ColorRange, PlaneDescriptor, PlaneOrder, YuvFrame};
use crate::error::{PipelineError, Result};
use crate::frame::buffer::{required_len, ChannelLayout, PixelBuffer};

/// Whether [`YuvConverter::convert`] wrote into the existing buffer or a
/// new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferReuse {
    Reused,
    Allocated,
}

/// Integer 4:2:0 YUV to RGBA conversion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct YuvConverter {
    order: PlaneOrder,
    range: ColorRange,
}

impl YuvConverter {
    pub fn new(order: PlaneOrder, range: ColorRange) -> Self {
        Self { order, range }
    }

    pub fn order(&self) -> PlaneOrder {
        self.order
    }

    pub fn range(&self) -> ColorRange {
        self.range
    }

    /// Check every plane against the frame geometry before anything is written.
    pub fn validate(&self, frame: &YuvFrame<'_>) -> Result<()> {
        if frame.width == 0 || frame.height == 0 {
            return Err(PipelineError::plane(
                "y",
                format!("frame geometry {}x{} is empty", frame.width, frame.height),
            ));
        }
        let (cw, ch) = (frame.chroma_width(), frame.chroma_height());
        let (first, second) = self.chroma_names();
        frame.planes[0].validate("y", frame.width, frame.height)?;
        frame.planes[1].validate(first, cw, ch)?;
        frame.planes[2].validate(second, cw, ch)
    }

    /// Convert into a caller-provided buffer of the frame's geometry.
    ///
    /// On error the buffer contents are left as they were.
    pub fn convert_into(&self, frame: &YuvFrame<'_>, out: &mut PixelBuffer) -> Result<()> {
        self.validate(frame)?;
        if !out.has_geometry(frame.width, frame.height) {
            return Err(PipelineError::AllocationFailure(format!(
                "output buffer is {}x{}, frame is {}x{}",
                out.width(),
                out.height(),
                frame.width,
                frame.height
            )));
        }
        out.relayout(ChannelLayout::Rgba)?;
        self.write_rgba(frame, out.as_bytes_mut());
        Ok(())
    }

    /// Convert into `target`, reusing its storage when the geometry matches
    /// and replacing it with a fresh buffer otherwise.
    ///
    /// A frame that fails validation leaves `target` untouched.
    pub fn convert(
        &self,
        frame: &YuvFrame<'_>,
        target: &mut Option<PixelBuffer>,
    ) -> Result<BufferReuse> {
        self.validate(frame)?;
        let needed = required_len(frame.width, frame.height, ChannelLayout::Rgba).unwrap_or(0);

        if let Some(buffer) = target.as_mut() {
            if buffer.has_geometry(frame.width, frame.height) && buffer.capacity() >= needed {
                buffer.relayout(ChannelLayout::Rgba)?;
                self.write_rgba(frame, buffer.as_bytes_mut());
                return Ok(BufferReuse::Reused);
            }
        }

        let mut buffer = PixelBuffer::try_new(frame.width, frame.height, ChannelLayout::Rgba)?;
        self.write_rgba(frame, buffer.as_bytes_mut());
        *target = Some(buffer);
        Ok(BufferReuse::Allocated)
    }

    fn chroma_names(&self) -> (&'static str, &'static str) {
        match self.order {
            PlaneOrder::Uv => ("u", "v"),
            PlaneOrder::Vu => ("v", "u"),
        }
    }

    fn chroma_planes<'f, 'a>(
        &self,
        frame: &'f YuvFrame<'a>,
    ) -> (&'f PlaneDescriptor<'a>, &'f PlaneDescriptor<'a>) {
        match self.order {
            PlaneOrder::Uv => (&frame.planes[1], &frame.planes[2]),
            PlaneOrder::Vu => (&frame.planes[2], &frame.planes[1]),
        }
    }

    /// Planes must already be validated.
    fn write_rgba(&self, frame: &YuvFrame<'_>, rgba: &mut [u8]) {
        let y_plane = &frame.planes[0];
        let (u_plane, v_plane) = self.chroma_planes(frame);
        let width = frame.width as usize;
        let pixel = match self.range {
            ColorRange::Full => full_range_to_rgb,
            ColorRange::Video => video_range_to_rgb,
        };

        for (row, out_row) in rgba.chunks_exact_mut(width * 4).enumerate() {
            let y_base = y_plane.row_offset(row);
            let u_base = u_plane.row_offset(row / 2);
            let v_base = v_plane.row_offset(row / 2);

            for (col, out) in out_row.chunks_exact_mut(4).enumerate() {
                let y = y_plane.data[y_base + col * y_plane.pixel_stride];
                let u = u_plane.data[u_base + (col / 2) * u_plane.pixel_stride];
                let v = v_plane.data[v_base + (col / 2) * v_plane.pixel_stride];
                let [r, g, b] = pixel(y, u, v);
                out[0] = r;
                out[1] = g;
                out[2] = b;
                out[3] = 255;
            }
        }
    }
}

/// BT.601 full swing, 8-bit fixed point.
#[inline]
fn full_range_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as i32;
    let u = u as i32 - 128;
    let v = v as i32 - 128;
    [
        clamp_u8((y * 256 + 359 * v) >> 8),
        clamp_u8((y * 256 - 88 * u - 183 * v) >> 8),
        clamp_u8((y * 256 + 454 * u) >> 8),
    ]
}

/// BT.601 studio swing, 8-bit fixed point with rounding.
#[inline]
fn video_range_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = 298 * (y as i32 - 16);
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    [
        clamp_u8((c + 409 * e + 128) >> 8),
        clamp_u8((c - 100 * d - 208 * e + 128) >> 8),
        clamp_u8((c + 516 * d + 128) >> 8),
    ]
}

#[inline]
fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Planar 4:2:0 test frame with `pad` bytes after every row.
    struct Planes {
        width: u32,
        height: u32,
        pad: usize,
        y: Vec<u8>,
        u: Vec<u8>,
        v: Vec<u8>,
    }

    impl Planes {
        fn solid(width: u32, height: u32, pad: usize, y: u8, u: u8, v: u8) -> Self {
            let cw = width.div_ceil(2) as usize;
            let ch = height.div_ceil(2) as usize;
            Self {
                width,
                height,
                pad,
                y: vec![y; (width as usize + pad) * height as usize],
                u: vec![u; (cw + pad) * ch],
                v: vec![v; (cw + pad) * ch],
            }
        }

        fn frame(&self) -> YuvFrame<'_> {
            let (w, h) = (self.width, self.height);
            let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
            YuvFrame::new(
                w,
                h,
                [
                    PlaneDescriptor::new(&self.y, w, h, w as usize + self.pad, 1),
                    PlaneDescriptor::new(&self.u, cw, ch, cw as usize + self.pad, 1),
                    PlaneDescriptor::new(&self.v, cw, ch, cw as usize + self.pad, 1),
                ],
            )
        }
    }

    fn pixels(buffer: &PixelBuffer) -> Vec<[u8; 4]> {
        buffer
            .as_bytes()
            .chunks_exact(4)
            .map(|p| [p[0], p[1], p[2], p[3]])
            .collect()
    }

    #[test]
    fn neutral_luma_converts_to_gray_for_any_stride() {
        let converter = YuvConverter::default();
        for (w, h, pad) in [(1, 1, 0), (2, 2, 3), (5, 3, 7), (16, 9, 0), (7, 7, 1)] {
            let planes = Planes::solid(w, h, pad, 128, 128, 128);
            let mut target = None;
            converter.convert(&planes.frame(), &mut target).unwrap();

            let buffer = target.unwrap();
            assert!(buffer.has_geometry(w, h));
            assert!(
                pixels(&buffer).iter().all(|&p| p == [128, 128, 128, 255]),
                "{w}x{h} pad {pad} is not neutral gray"
            );
        }
    }

    #[test]
    fn video_range_expands_luma() {
        let converter = YuvConverter::new(PlaneOrder::Uv, ColorRange::Video);
        let planes = Planes::solid(4, 4, 0, 128, 128, 128);
        let mut target = None;
        converter.convert(&planes.frame(), &mut target).unwrap();
        assert!(pixels(&target.unwrap())
            .iter()
            .all(|&p| p == [130, 130, 130, 255]));
    }

    #[test]
    fn video_range_black_and_white_points() {
        assert_eq!(video_range_to_rgb(16, 128, 128), [0, 0, 0]);
        assert_eq!(video_range_to_rgb(235, 128, 128), [255, 255, 255]);
    }

    #[test]
    fn semi_planar_chroma_with_pixel_stride_two() {
        // 4x2 frame, interleaved UV plane of 2x1 samples padded to 6 bytes.
        let y = vec![100u8; 4 * 2];
        let uv = [90u8, 200, 90, 200, 0, 0];
        let frame = YuvFrame::new(
            4,
            2,
            [
                PlaneDescriptor::new(&y, 4, 2, 4, 1),
                PlaneDescriptor::new(&uv, 2, 1, 6, 2),
                PlaneDescriptor::new(&uv[1..], 2, 1, 6, 2),
            ],
        );

        let mut target = None;
        YuvConverter::default()
            .convert(&frame, &mut target)
            .unwrap();
        assert!(pixels(&target.unwrap())
            .iter()
            .all(|&p| p == [200, 61, 32, 255]));
    }

    #[test]
    fn vu_order_swaps_chroma_planes() {
        let y = vec![100u8; 4];
        let u = [90u8];
        let v = [200u8];
        let frame = YuvFrame::new(
            2,
            2,
            [
                PlaneDescriptor::new(&y, 2, 2, 2, 1),
                PlaneDescriptor::new(&v, 1, 1, 1, 1),
                PlaneDescriptor::new(&u, 1, 1, 1, 1),
            ],
        );

        let mut target = None;
        YuvConverter::new(PlaneOrder::Vu, ColorRange::Full)
            .convert(&frame, &mut target)
            .unwrap();
        assert!(pixels(&target.unwrap())
            .iter()
            .all(|&p| p == [200, 61, 32, 255]));
    }

    #[test]
    fn chroma_is_sampled_per_two_by_two_block() {
        let y = vec![128u8; 4 * 2];
        let u = [128u8, 128];
        let v = [128u8, 255];
        let frame = YuvFrame::new(
            4,
            2,
            [
                PlaneDescriptor::new(&y, 4, 2, 4, 1),
                PlaneDescriptor::new(&u, 2, 1, 2, 1),
                PlaneDescriptor::new(&v, 2, 1, 2, 1),
            ],
        );

        let mut target = None;
        YuvConverter::default()
            .convert(&frame, &mut target)
            .unwrap();
        let px = pixels(&target.unwrap());
        for row in 0..2 {
            assert_eq!(px[row * 4], [128, 128, 128, 255]);
            assert_eq!(px[row * 4 + 1], [128, 128, 128, 255]);
            assert_eq!(px[row * 4 + 2], [255, 37, 128, 255]);
            assert_eq!(px[row * 4 + 3], [255, 37, 128, 255]);
        }
    }

    #[test]
    fn undersized_plane_leaves_target_untouched() {
        let mut planes = Planes::solid(8, 8, 0, 128, 128, 128);
        planes.u.truncate(10);
        let converter = YuvConverter::default();

        let mut existing = PixelBuffer::try_new(8, 8, ChannelLayout::Rgba).unwrap();
        existing.as_bytes_mut().fill(0xAB);
        let mut target = Some(existing);

        let err = converter.convert(&planes.frame(), &mut target).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InvalidPlaneGeometry { plane: "u", .. }
        ));
        assert!(target
            .as_ref()
            .unwrap()
            .as_bytes()
            .iter()
            .all(|&b| b == 0xAB));

        let mut empty = None;
        assert!(converter.convert(&planes.frame(), &mut empty).is_err());
        assert!(empty.is_none());
    }

    #[test]
    fn undersized_plane_is_named_by_order() {
        let mut planes = Planes::solid(8, 8, 0, 128, 128, 128);
        planes.u.truncate(10);
        let converter = YuvConverter::new(PlaneOrder::Vu, ColorRange::Full);
        let mut target = None;
        let err = converter.convert(&planes.frame(), &mut target).unwrap_err();
        // The second plane in capture order is V under VU ordering.
        assert!(matches!(
            err,
            PipelineError::InvalidPlaneGeometry { plane: "v", .. }
        ));
    }

    #[test]
    fn convert_into_rejects_mismatched_output() {
        let planes = Planes::solid(4, 4, 0, 128, 128, 128);
        let mut out = PixelBuffer::try_new(2, 2, ChannelLayout::Rgba).unwrap();
        let err = YuvConverter::default()
            .convert_into(&planes.frame(), &mut out)
            .unwrap_err();
        assert!(matches!(err, PipelineError::AllocationFailure(_)));
    }

    #[test]
    fn convert_into_restores_rgba_layout() {
        let planes = Planes::solid(4, 4, 0, 128, 128, 128);
        let mut out = PixelBuffer::try_new(4, 4, ChannelLayout::Rgba).unwrap();
        out.relayout(ChannelLayout::Luminance).unwrap();
        YuvConverter::default()
            .convert_into(&planes.frame(), &mut out)
            .unwrap();
        assert_eq!(out.layout(), ChannelLayout::Rgba);
        assert_eq!(out.len(), 64);
    }

    #[test]
    fn same_geometry_reuses_storage_and_change_reallocates_once() {
        let converter = YuvConverter::default();
        let small = Planes::solid(8, 6, 2, 50, 128, 128);
        let large = Planes::solid(16, 12, 0, 50, 128, 128);
        let mut target = None;

        assert_eq!(
            converter.convert(&small.frame(), &mut target).unwrap(),
            BufferReuse::Allocated
        );
        let ptr = target.as_ref().unwrap().as_bytes().as_ptr();
        assert_eq!(
            converter.convert(&small.frame(), &mut target).unwrap(),
            BufferReuse::Reused
        );
        assert_eq!(target.as_ref().unwrap().as_bytes().as_ptr(), ptr);

        assert_eq!(
            converter.convert(&large.frame(), &mut target).unwrap(),
            BufferReuse::Allocated
        );
        assert_eq!(
            converter.convert(&large.frame(), &mut target).unwrap(),
            BufferReuse::Reused
        );
        assert!(target.unwrap().has_geometry(16, 12));
    }
}
