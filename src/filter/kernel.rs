// Integer image kernels over packed single-channel rows.
//
// Every kernel clamps its window to the image (replicate border), so a
// 1x1 image is as valid an input as a 4K one.

use serde::{Deserialize, Serialize};

/// Binomial smoothing kernel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SmoothingKernel {
    /// [1, 2, 1] in each direction.
    Binomial3,
    /// [1, 4, 6, 4, 1] in each direction.
    #[default]
    Binomial5,
}

impl SmoothingKernel {
    pub fn from_size(size: u8) -> Option<Self> {
        match size {
            3 => Some(Self::Binomial3),
            5 => Some(Self::Binomial5),
            _ => None,
        }
    }

    pub const fn size(self) -> u8 {
        match self {
            Self::Binomial3 => 3,
            Self::Binomial5 => 5,
        }
    }

    const fn taps(self) -> &'static [u32] {
        match self {
            Self::Binomial3 => &[1, 2, 1],
            Self::Binomial5 => &[1, 4, 6, 4, 1],
        }
    }
}

impl TryFrom<u8> for SmoothingKernel {
    type Error = String;

    fn try_from(size: u8) -> Result<Self, Self::Error> {
        Self::from_size(size).ok_or_else(|| format!("smoothing kernel must be 3 or 5, got {size}"))
    }
}

impl From<SmoothingKernel> for u8 {
    fn from(kernel: SmoothingKernel) -> Self {
        kernel.size()
    }
}

/// Index `i + k - half`, clamped into `0..len`.
#[inline]
fn clamped(i: usize, k: usize, half: usize, len: usize) -> usize {
    (i + k).saturating_sub(half).min(len - 1)
}

/// Luminance of packed RGBA pixels, BT.601 weights in 8-bit fixed point.
pub fn rgba_to_luma(rgba: &[u8], luma: &mut [u8]) {
    for (px, out) in rgba.chunks_exact(4).zip(luma.iter_mut()) {
        let sum = 77 * px[0] as u32 + 150 * px[1] as u32 + 29 * px[2] as u32 + 128;
        *out = (sum >> 8) as u8;
    }
}

/// Separable binomial blur: a horizontal pass into `tmp`, then a vertical
/// pass into `dst` with a single rounding division at the end.
pub fn smooth(
    src: &[u8],
    width: usize,
    height: usize,
    kernel: SmoothingKernel,
    tmp: &mut [u32],
    dst: &mut [u8],
) {
    let taps = kernel.taps();
    let half = taps.len() / 2;
    let total: u32 = taps.iter().sum::<u32>().pow(2);

    for y in 0..height {
        let row = &src[y * width..(y + 1) * width];
        let out = &mut tmp[y * width..(y + 1) * width];
        for (x, acc) in out.iter_mut().enumerate() {
            *acc = taps
                .iter()
                .enumerate()
                .map(|(k, &t)| t * row[clamped(x, k, half, width)] as u32)
                .sum();
        }
    }

    for y in 0..height {
        for x in 0..width {
            let acc: u32 = taps
                .iter()
                .enumerate()
                .map(|(k, &t)| t * tmp[clamped(y, k, half, height) * width + x])
                .sum();
            dst[y * width + x] = ((acc + total / 2) / total) as u8;
        }
    }
}

/// 3x3 Sobel gradients and their L1 magnitude.
pub fn sobel(
    src: &[u8],
    width: usize,
    height: usize,
    gx: &mut [i16],
    gy: &mut [i16],
    magnitude: &mut [u16],
) {
    let p = |x: usize, y: usize| src[y * width + x] as i32;

    for y in 0..height {
        let ym = y.saturating_sub(1);
        let yp = (y + 1).min(height - 1);
        for x in 0..width {
            let xm = x.saturating_sub(1);
            let xp = (x + 1).min(width - 1);

            let dx = (p(xp, ym) + 2 * p(xp, y) + p(xp, yp))
                - (p(xm, ym) + 2 * p(xm, y) + p(xm, yp));
            let dy = (p(xm, yp) + 2 * p(x, yp) + p(xp, yp))
                - (p(xm, ym) + 2 * p(x, ym) + p(xp, ym));

            let i = y * width + x;
            gx[i] = dx as i16;
            gy[i] = dy as i16;
            magnitude[i] = (dx.abs() + dy.abs()) as u16;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split_row(width: usize, split: usize) -> Vec<u8> {
        (0..width).map(|x| if x < split { 0 } else { 255 }).collect()
    }

    #[test]
    fn luma_of_gray_is_identity() {
        let rgba = [0, 0, 0, 255, 128, 128, 128, 255, 255, 255, 255, 255];
        let mut luma = [0u8; 3];
        rgba_to_luma(&rgba, &mut luma);
        assert_eq!(luma, [0, 128, 255]);
    }

    #[test]
    fn smoothing_preserves_uniform_image() {
        for kernel in [SmoothingKernel::Binomial3, SmoothingKernel::Binomial5] {
            let src = vec![77u8; 6 * 4];
            let mut tmp = vec![0u32; src.len()];
            let mut dst = vec![0u8; src.len()];
            smooth(&src, 6, 4, kernel, &mut tmp, &mut dst);
            assert!(dst.iter().all(|&v| v == 77), "{kernel:?}");
        }
    }

    #[test]
    fn smoothing_single_pixel_clamps_to_itself() {
        let mut tmp = [0u32; 1];
        let mut dst = [0u8; 1];
        smooth(&[200], 1, 1, SmoothingKernel::Binomial5, &mut tmp, &mut dst);
        assert_eq!(dst, [200]);
    }

    #[test]
    fn smoothing_step_edge() {
        let width = 12;
        let src: Vec<u8> = (0..3).flat_map(|_| split_row(width, 6)).collect();
        let mut tmp = vec![0u32; src.len()];
        let mut dst = vec![0u8; src.len()];
        smooth(&src, width, 3, SmoothingKernel::Binomial5, &mut tmp, &mut dst);
        assert_eq!(&dst[..width], &[0, 0, 0, 0, 16, 80, 175, 239, 255, 255, 255, 255]);
    }

    #[test]
    fn sobel_responds_to_vertical_edge_only_horizontally() {
        let width = 8;
        let src: Vec<u8> = (0..4).flat_map(|_| split_row(width, 4)).collect();
        let n = src.len();
        let (mut gx, mut gy, mut mag) = (vec![0i16; n], vec![0i16; n], vec![0u16; n]);
        sobel(&src, width, 4, &mut gx, &mut gy, &mut mag);

        for y in 0..4 {
            let row = &mag[y * width..(y + 1) * width];
            assert_eq!(row, &[0, 0, 0, 1020, 1020, 0, 0, 0]);
        }
        assert!(gy.iter().all(|&v| v == 0));
        assert!(gx.iter().all(|&v| v >= 0));
    }

    #[test]
    fn sobel_handles_degenerate_sizes() {
        for (w, h) in [(1, 1), (1, 5), (5, 1), (3, 3)] {
            let src: Vec<u8> = (0..w * h).map(|i| (i * 37 % 256) as u8).collect();
            let n = src.len();
            let (mut gx, mut gy, mut mag) = (vec![0i16; n], vec![0i16; n], vec![0u16; n]);
            sobel(&src, w, h, &mut gx, &mut gy, &mut mag);
        }

        let (mut gx, mut gy, mut mag) = ([0i16; 1], [0i16; 1], [0u16; 1]);
        sobel(&[99], 1, 1, &mut gx, &mut gy, &mut mag);
        assert_eq!(mag, [0]);
    }

    #[test]
    fn kernel_size_round_trips_through_serde() {
        let kernel: SmoothingKernel = serde_json::from_str("3").unwrap();
        assert_eq!(kernel, SmoothingKernel::Binomial3);
        assert_eq!(serde_json::to_value(SmoothingKernel::Binomial5).unwrap(), 5);
        assert!(serde_json::from_str::<SmoothingKernel>("4").is_err());
    }
}
