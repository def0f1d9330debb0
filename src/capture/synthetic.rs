use crate::capture::frame::{OwnedPlane, OwnedYuvFrame};

/// Neutral chroma: no colour.
pub const NEUTRAL_CHROMA: u8 = 128;

/// How a synthetic source lays out its chroma samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChromaLayout {
    /// Separate U and V planes, one byte per sample (I420).
    #[default]
    Planar,
    /// One interleaved UV buffer, two bytes per sample pair (NV12).
    SemiPlanar,
}

/// Generates YUV frames in place of a camera.
///
/// Row padding is added after every row of every plane so that converters
/// are exercised with strides wider than the image.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticSource {
    width: u32,
    height: u32,
    padding: usize,
    chroma: ChromaLayout,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            padding: 0,
            chroma: ChromaLayout::Planar,
        }
    }

    /// Extra bytes at the end of each row.
    pub fn with_padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn with_chroma(mut self, chroma: ChromaLayout) -> Self {
        self.chroma = chroma;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Every pixel has the same Y, U and V.
    pub fn solid(&self, y: u8, u: u8, v: u8) -> OwnedYuvFrame {
        self.generate(|_, _| y, (u, v))
    }

    /// Colourless frame whose luma is `value` everywhere; handy for telling
    /// frames apart after they have been through the pipeline.
    pub fn marker(&self, value: u8) -> OwnedYuvFrame {
        self.solid(value, NEUTRAL_CHROMA, NEUTRAL_CHROMA)
    }

    /// Black to the left of `split_col`, white from it onwards.
    pub fn vertical_split(&self, split_col: u32) -> OwnedYuvFrame {
        self.generate(
            |x, _| if x < split_col { 0 } else { 255 },
            (NEUTRAL_CHROMA, NEUTRAL_CHROMA),
        )
    }

    /// Luma from `luma(x, y)` with constant chroma.
    pub fn generate(&self, luma: impl Fn(u32, u32) -> u8, (u, v): (u8, u8)) -> OwnedYuvFrame {
        let (w, h) = (self.width as usize, self.height as usize);
        let y_stride = w + self.padding;
        let mut y_plane = vec![0u8; y_stride * h];
        for (row, line) in y_plane.chunks_exact_mut(y_stride.max(1)).enumerate() {
            for (col, px) in line[..w].iter_mut().enumerate() {
                *px = luma(col as u32, row as u32);
            }
        }
        let luma_plane = OwnedPlane::new(y_plane, self.width, self.height, y_stride, 1);

        let (cw, ch) = (self.width.div_ceil(2), self.height.div_ceil(2));
        match self.chroma {
            ChromaLayout::Planar => {
                let stride = cw as usize + self.padding;
                let plane = |value| {
                    let mut data = vec![0u8; stride * ch as usize];
                    for line in data.chunks_exact_mut(stride.max(1)) {
                        line[..cw as usize].fill(value);
                    }
                    OwnedPlane::new(data, cw, ch, stride, 1)
                };
                OwnedYuvFrame::from_planes(
                    self.width,
                    self.height,
                    [luma_plane, plane(u), plane(v)],
                )
            }
            ChromaLayout::SemiPlanar => {
                let stride = cw as usize * 2 + self.padding;
                let mut data = vec![0u8; stride * ch as usize];
                for line in data.chunks_exact_mut(stride.max(1)) {
                    for pair in line[..cw as usize * 2].chunks_exact_mut(2) {
                        pair.copy_from_slice(&[u, v]);
                    }
                }
                OwnedYuvFrame::semi_planar(self.width, self.height, luma_plane, data, stride)
            }
        }
    }
}
