use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::filter::kernel::{rgba_to_luma, smooth, sobel, SmoothingKernel};
use crate::frame::buffer::{ChannelLayout, PixelBuffer};

/// tan(22.5 deg) in Q15.
const TAN_22_5: i64 = 13_573;
/// tan(67.5 deg) in Q15.
const TAN_67_5: i64 = 79_109;

const NONE: u8 = 0;
const WEAK: u8 = 1;
const STRONG: u8 = 2;

/// Edge-detection settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeParams {
    /// Gradient magnitude (L1 Sobel) a pixel must exceed to extend an edge.
    pub low: u16,
    /// Gradient magnitude a pixel must exceed to start an edge.
    pub high: u16,
    pub kernel: SmoothingKernel,
    /// Keep weak pixels connected to strong ones. Without it only strong
    /// pixels are edges.
    pub hysteresis: bool,
    /// Layout the filtered buffer is written in.
    pub output: ChannelLayout,
}

impl Default for EdgeParams {
    fn default() -> Self {
        Self {
            low: 100,
            high: 200,
            kernel: SmoothingKernel::default(),
            hysteresis: true,
            output: ChannelLayout::Rgba,
        }
    }
}

/// Working planes, kept between frames so a steady stream allocates once.
#[derive(Debug, Default)]
struct Scratch {
    len: usize,
    luma: Vec<u8>,
    horizontal: Vec<u32>,
    smoothed: Vec<u8>,
    gx: Vec<i16>,
    gy: Vec<i16>,
    magnitude: Vec<u16>,
    class: Vec<u8>,
    stack: Vec<usize>,
}

impl Scratch {
    fn fit(&mut self, len: usize) -> Result<()> {
        if self.len == len {
            return Ok(());
        }
        debug!("resizing edge scratch planes to {len} pixels");
        resize(&mut self.luma, len)?;
        resize(&mut self.horizontal, len)?;
        resize(&mut self.smoothed, len)?;
        resize(&mut self.gx, len)?;
        resize(&mut self.gy, len)?;
        resize(&mut self.magnitude, len)?;
        resize(&mut self.class, len)?;
        self.len = len;
        Ok(())
    }
}

fn resize<T: Copy + Default>(plane: &mut Vec<T>, len: usize) -> Result<()> {
    plane.clear();
    plane
        .try_reserve_exact(len)
        .map_err(|e| PipelineError::AllocationFailure(format!("edge scratch plane: {e}")))?;
    plane.resize(len, T::default());
    Ok(())
}

/// Smoothing, Sobel gradient, non-maximum suppression and double
/// threshold, applied in place to a [`PixelBuffer`].
///
/// Output pixels are 255 on an edge and 0 elsewhere, replicated into RGB
/// with opaque alpha or written as one luminance byte, per
/// [`EdgeParams::output`].
#[derive(Debug, Default)]
pub struct EdgeDetector {
    params: EdgeParams,
    scratch: Scratch,
}

impl EdgeDetector {
    pub fn new(params: EdgeParams) -> Self {
        Self {
            params,
            scratch: Scratch::default(),
        }
    }

    pub fn params(&self) -> EdgeParams {
        self.params
    }

    pub fn set_params(&mut self, params: EdgeParams) {
        self.params = params;
    }

    /// Replace the contents of `buffer` with its edge map.
    ///
    /// RGBA input is reduced to luminance first; luminance input is used
    /// directly.
    pub fn apply(&mut self, buffer: &mut PixelBuffer) -> Result<()> {
        let width = buffer.width() as usize;
        let height = buffer.height() as usize;
        let len = width * height;
        self.scratch.fit(len)?;

        let s = &mut self.scratch;
        match buffer.layout() {
            ChannelLayout::Rgba => rgba_to_luma(buffer.as_bytes(), &mut s.luma),
            ChannelLayout::Luminance => s.luma.copy_from_slice(buffer.as_bytes()),
        }

        smooth(
            &s.luma,
            width,
            height,
            self.params.kernel,
            &mut s.horizontal,
            &mut s.smoothed,
        );
        sobel(&s.smoothed, width, height, &mut s.gx, &mut s.gy, &mut s.magnitude);
        classify(s, width, height, self.params.low, self.params.high);

        if self.params.hysteresis {
            trace_edges(s, width, height);
        }

        buffer.relayout(self.params.output)?;
        let out = buffer.as_bytes_mut();
        match self.params.output {
            ChannelLayout::Rgba => {
                for (px, &class) in out.chunks_exact_mut(4).zip(s.class.iter()) {
                    let e = if class == STRONG { 255 } else { 0 };
                    px.copy_from_slice(&[e, e, e, 255]);
                }
            }
            ChannelLayout::Luminance => {
                for (px, &class) in out.iter_mut().zip(s.class.iter()) {
                    *px = if class == STRONG { 255 } else { 0 };
                }
            }
        }
        Ok(())
    }
}

/// Non-maximum suppression along the gradient direction, then the double
/// threshold. Neighbours outside the image count as zero magnitude.
fn classify(s: &mut Scratch, width: usize, height: usize, low: u16, high: u16) {
    let Scratch {
        gx,
        gy,
        magnitude,
        class,
        ..
    } = s;
    let mag = |x: isize, y: isize| -> u16 {
        if x < 0 || y < 0 || x >= width as isize || y >= height as isize {
            0
        } else {
            magnitude[y as usize * width + x as usize]
        }
    };

    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            let m = magnitude[i];
            if m <= low {
                class[i] = NONE;
                continue;
            }

            let dx = gx[i] as i64;
            let dy = gy[i] as i64;
            let (ax, ay) = (dx.abs(), dy.abs());
            let (xi, yi) = (x as isize, y as isize);

            // Neighbours behind and ahead along the gradient.
            let (before, after) = if (ay << 15) <= ax * TAN_22_5 {
                (mag(xi - 1, yi), mag(xi + 1, yi))
            } else if (ay << 15) >= ax * TAN_67_5 {
                (mag(xi, yi - 1), mag(xi, yi + 1))
            } else if (dx > 0) == (dy > 0) {
                (mag(xi - 1, yi - 1), mag(xi + 1, yi + 1))
            } else {
                (mag(xi + 1, yi - 1), mag(xi - 1, yi + 1))
            };

            // On a two-pixel plateau the pixel after the tie keeps the edge.
            let is_max = m >= before && m > after;
            class[i] = match (is_max, m > high) {
                (false, _) => NONE,
                (true, true) => STRONG,
                (true, false) => WEAK,
            };
        }
    }
}

/// Promote weak pixels 8-connected to a strong pixel; drop the rest.
fn trace_edges(s: &mut Scratch, width: usize, height: usize) {
    let Scratch { class, stack, .. } = s;
    stack.clear();
    stack.extend(
        class
            .iter()
            .enumerate()
            .filter(|(_, &c)| c == STRONG)
            .map(|(i, _)| i),
    );

    while let Some(i) = stack.pop() {
        let (x, y) = (i % width, i / width);
        for ny in y.saturating_sub(1)..=(y + 1).min(height - 1) {
            for nx in x.saturating_sub(1)..=(x + 1).min(width - 1) {
                let n = ny * width + nx;
                if class[n] == WEAK {
                    class[n] = STRONG;
                    stack.push(n);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rgba_image(width: u32, height: u32, f: impl Fn(u32, u32) -> u8) -> PixelBuffer {
        let mut buf = PixelBuffer::try_new(width, height, ChannelLayout::Rgba).unwrap();
        let w = width as usize;
        for (i, px) in buf.as_bytes_mut().chunks_exact_mut(4).enumerate() {
            let v = f((i % w) as u32, (i / w) as u32);
            px.copy_from_slice(&[v, v, v, 255]);
        }
        buf
    }

    fn edge_columns(buf: &PixelBuffer, row: u32) -> Vec<u32> {
        let w = buf.width() as usize;
        let start = row as usize * w * 4;
        buf.as_bytes()[start..start + w * 4]
            .chunks_exact(4)
            .enumerate()
            .filter(|(_, px)| px[0] == 255)
            .map(|(x, _)| x as u32)
            .collect()
    }

    #[test]
    fn uniform_image_has_no_edges() {
        let mut buf = rgba_image(32, 24, |_, _| 90);
        EdgeDetector::default().apply(&mut buf).unwrap();
        assert!(buf
            .as_bytes()
            .chunks_exact(4)
            .all(|px| px == [0, 0, 0, 255]));
    }

    #[test]
    fn vertical_split_yields_single_column() {
        let mut buf = rgba_image(64, 16, |x, _| if x < 32 { 0 } else { 255 });
        EdgeDetector::default().apply(&mut buf).unwrap();
        for row in 0..16 {
            assert_eq!(edge_columns(&buf, row), vec![32], "row {row}");
        }
    }

    #[test]
    fn small_kernel_split_yields_single_column() {
        let params = EdgeParams {
            kernel: SmoothingKernel::Binomial3,
            ..EdgeParams::default()
        };
        let mut buf = rgba_image(20, 6, |x, _| if x < 10 { 0 } else { 255 });
        EdgeDetector::new(params).apply(&mut buf).unwrap();
        for row in 0..6 {
            assert_eq!(edge_columns(&buf, row), vec![10], "row {row}");
        }
    }

    #[test]
    fn horizontal_split_yields_single_row() {
        let mut buf = rgba_image(16, 20, |_, y| if y < 10 { 255 } else { 0 });
        EdgeDetector::default().apply(&mut buf).unwrap();
        for row in 0..20 {
            let cols = edge_columns(&buf, row);
            if row == 10 {
                assert_eq!(cols.len(), 16);
            } else {
                assert!(cols.is_empty(), "row {row} has edges {cols:?}");
            }
        }
    }

    #[test]
    fn filter_is_deterministic() {
        let pattern = |x: u32, y: u32| ((x * 31 + y * 17) ^ (x * y)) as u8;
        let mut first = rgba_image(40, 30, pattern);
        let mut second = rgba_image(40, 30, pattern);

        let mut detector = EdgeDetector::default();
        detector.apply(&mut first).unwrap();
        detector.apply(&mut second).unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());

        let mut fresh = rgba_image(40, 30, pattern);
        EdgeDetector::default().apply(&mut fresh).unwrap();
        assert_eq!(first.as_bytes(), fresh.as_bytes());
    }

    #[test]
    fn tiny_images_stay_in_bounds() {
        for (w, h) in [(1, 1), (3, 3), (1, 7), (7, 1), (2, 2)] {
            let mut buf = rgba_image(w, h, |x, y| ((x + y) * 120) as u8);
            EdgeDetector::default().apply(&mut buf).unwrap();
            assert!(buf.as_bytes().chunks_exact(4).all(|px| px[3] == 255));
        }
    }

    #[test]
    fn luminance_output_writes_one_byte_per_pixel() {
        let params = EdgeParams {
            output: ChannelLayout::Luminance,
            ..EdgeParams::default()
        };
        let mut buf = rgba_image(64, 4, |x, _| if x < 32 { 0 } else { 255 });
        EdgeDetector::new(params).apply(&mut buf).unwrap();

        assert_eq!(buf.layout(), ChannelLayout::Luminance);
        assert_eq!(buf.as_bytes().len(), 64 * 4);
        let row: Vec<usize> = buf.as_bytes()[..64]
            .iter()
            .enumerate()
            .filter(|(_, &v)| v == 255)
            .map(|(x, _)| x)
            .collect();
        assert_eq!(row, vec![32]);
    }

    #[test]
    fn luminance_input_is_used_directly() {
        let mut rgba = rgba_image(64, 4, |x, _| if x < 32 { 0 } else { 255 });
        let mut luma = PixelBuffer::try_new(64, 4, ChannelLayout::Luminance).unwrap();
        for (i, v) in luma.as_bytes_mut().iter_mut().enumerate() {
            *v = if i % 64 < 32 { 0 } else { 255 };
        }

        let params = EdgeParams {
            output: ChannelLayout::Luminance,
            ..EdgeParams::default()
        };
        let mut detector = EdgeDetector::new(params);
        detector.apply(&mut rgba).unwrap();
        detector.apply(&mut luma).unwrap();
        assert_eq!(rgba.as_bytes(), luma.as_bytes());
    }

    #[test]
    fn hysteresis_keeps_weak_pixels_connected_to_strong_ones() {
        // The faint upper part of the edge only survives through its
        // connection to the strong lower part.
        let image = |x: u32, y: u32| match (x < 16, y < 8) {
            (true, _) => 0,
            (false, true) => 80,
            (false, false) => 255,
        };

        let mut traced = rgba_image(32, 16, image);
        EdgeDetector::default().apply(&mut traced).unwrap();

        let strict = EdgeParams {
            hysteresis: false,
            ..EdgeParams::default()
        };
        let mut untraced = rgba_image(32, 16, image);
        EdgeDetector::new(strict).apply(&mut untraced).unwrap();

        let count = |buf: &PixelBuffer| {
            buf.as_bytes()
                .chunks_exact(4)
                .filter(|p| p[0] == 255)
                .count()
        };
        assert!(count(&traced) > count(&untraced));
        assert_eq!(edge_columns(&traced, 1), vec![16]);
        assert!(edge_columns(&untraced, 1).is_empty());
    }

    #[test]
    fn thresholds_above_every_gradient_suppress_all() {
        let params = EdgeParams {
            low: 2000,
            high: 2000,
            ..EdgeParams::default()
        };
        let mut buf = rgba_image(64, 8, |x, _| if x < 32 { 0 } else { 255 });
        EdgeDetector::new(params).apply(&mut buf).unwrap();
        assert!(edge_columns(&buf, 4).is_empty());
    }
}
