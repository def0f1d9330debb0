use std::collections::HashMap;

use crate::error::{PipelineError, Result};
use crate::frame::buffer::required_len;
use crate::frame::{ChannelLayout, PixelBuffer};
use crate::render::backend::{GpuBackend, TextureId};

#[derive(Debug)]
struct CpuTexture {
    width: u32,
    height: u32,
    layout: ChannelLayout,
    data: Vec<u8>,
}

/// What the last draw put on screen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Displayed<'a> {
    Cleared([f32; 4]),
    Texture {
        id: TextureId,
        width: u32,
        height: u32,
        layout: ChannelLayout,
        pixels: &'a [u8],
    },
}

/// Render backend with textures held in CPU memory.
///
/// Draws only record what would be sampled, which makes the displayed
/// image readable without a GPU.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    textures: HashMap<TextureId, CpuTexture>,
    next_id: u32,
    textures_created: u64,
    draws: u64,
    surfaces: u64,
    last_draw: Option<(Option<TextureId>, [f32; 4])>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The result of the most recent draw, if any.
    pub fn displayed(&self) -> Option<Displayed<'_>> {
        let (texture, clear) = self.last_draw?;
        let Some(id) = texture else {
            return Some(Displayed::Cleared(clear));
        };
        let tex = self.textures.get(&id)?;
        Some(Displayed::Texture {
            id,
            width: tex.width,
            height: tex.height,
            layout: tex.layout,
            pixels: &tex.data,
        })
    }

    /// The displayed image as RGBA, replicating single-channel textures into
    /// R, G and B the way the quad shader samples them.
    pub fn displayed_rgba(&self) -> Option<Vec<u8>> {
        match self.displayed()? {
            Displayed::Cleared(_) => None,
            Displayed::Texture { layout, pixels, .. } => Some(match layout {
                ChannelLayout::Rgba => pixels.to_vec(),
                ChannelLayout::Luminance => {
                    pixels.iter().flat_map(|&v| [v, v, v, 255]).collect()
                }
            }),
        }
    }

    pub fn textures_created(&self) -> u64 {
        self.textures_created
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn draw_count(&self) -> u64 {
        self.draws
    }

    pub fn surfaces_created(&self) -> u64 {
        self.surfaces
    }
}

impl GpuBackend for HeadlessBackend {
    type Target = ();

    fn surface_created(&mut self) -> Result<()> {
        self.surfaces += 1;
        self.last_draw = None;
        Ok(())
    }

    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        layout: ChannelLayout,
    ) -> Result<TextureId> {
        let len = required_len(width, height, layout).ok_or_else(|| {
            PipelineError::AllocationFailure(format!("cannot size a {width}x{height} texture"))
        })?;
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|e| PipelineError::AllocationFailure(format!("texture storage: {e}")))?;
        data.resize(len, 0);

        let id = TextureId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.textures_created += 1;
        self.textures.insert(
            id,
            CpuTexture {
                width,
                height,
                layout,
                data,
            },
        );
        Ok(id)
    }

    fn upload(&mut self, texture: TextureId, buffer: &PixelBuffer) -> Result<()> {
        let tex = self
            .textures
            .get_mut(&texture)
            .ok_or_else(|| PipelineError::GpuState(format!("unknown texture {texture:?}")))?;
        let fits = buffer.has_geometry(tex.width, tex.height) && buffer.layout() == tex.layout;
        if !fits {
            return Err(PipelineError::GpuState(format!(
                "texture is {}x{} {:?}, buffer is {}x{} {:?}",
                tex.width,
                tex.height,
                tex.layout,
                buffer.width(),
                buffer.height(),
                buffer.layout()
            )));
        }
        tex.data.copy_from_slice(buffer.as_bytes());
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        self.textures.remove(&texture);
    }

    fn draw(
        &mut self,
        _target: &(),
        texture: Option<TextureId>,
        clear_color: [f32; 4],
    ) -> Result<()> {
        if let Some(id) = texture {
            if !self.textures.contains_key(&id) {
                return Err(PipelineError::GpuState(format!(
                    "draw with unknown texture {id:?}"
                )));
            }
        }
        self.draws += 1;
        self.last_draw = Some((texture, clear_color));
        Ok(())
    }
}
