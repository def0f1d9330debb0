use serde::Serialize;

use crate::error::Result;
use crate::frame::{ChannelLayout, PixelBuffer};

/// Backend-assigned texture identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TextureId(pub u32);

/// GPU operations the render bridge needs from the presentation surface.
///
/// Implementations own the graphics context; the bridge decides when to
/// create, fill, replace and draw textures. All calls happen on the render
/// thread.
pub trait GpuBackend: Send {
    /// What a draw renders into (a surface view, or nothing for CPU backends).
    type Target: ?Sized;

    /// Called when the presentation surface has been (re)created. Textures
    /// from a previous surface are already destroyed.
    fn surface_created(&mut self) -> Result<()> {
        Ok(())
    }

    /// Allocate texture storage for the given geometry.
    fn create_texture(&mut self, width: u32, height: u32, layout: ChannelLayout)
        -> Result<TextureId>;

    /// Copy the whole buffer into the texture in one transfer.
    fn upload(&mut self, texture: TextureId, buffer: &PixelBuffer) -> Result<()>;

    fn destroy_texture(&mut self, texture: TextureId);

    /// Clear `target` and, when a texture is given, draw the full-screen
    /// quad sampling it.
    fn draw(
        &mut self,
        target: &Self::Target,
        texture: Option<TextureId>,
        clear_color: [f32; 4],
    ) -> Result<()>;
}
