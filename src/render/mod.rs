// Render side: published frames into a texture, drawn on a full-screen quad.

pub mod backend;
pub mod bridge;
pub mod headless;
pub mod wgpu_backend;

pub use backend::{GpuBackend, TextureId};
pub use bridge::{RenderBridge, RenderOutcome, RenderState, TextureState};
pub use headless::{Displayed, HeadlessBackend};
pub use wgpu_backend::WgpuBackend;
