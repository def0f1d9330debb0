use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ConfigStore;
use crate::diagnostics::PipelineStats;
use crate::error::{PipelineError, Result};
use crate::frame::{ChannelLayout, FrameBufferManager, FrameHandle, FrameLease, FrameUpdate};
use crate::render::backend::{GpuBackend, TextureId};

/// The texture currently owned by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureState {
    pub id: TextureId,
    pub width: u32,
    pub height: u32,
    pub layout: ChannelLayout,
}

/// Render-side lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RenderState {
    /// No texture yet.
    Idle,
    /// A texture is allocated; its contents may be stale.
    Ready,
    /// An upload is in progress.
    Updating,
    /// Terminal.
    Shutdown,
}

/// What one render tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// A new frame was uploaded and drawn.
    Uploaded(FrameHandle),
    /// Nothing new; the existing texture (or the clear colour) was drawn.
    Redrawn,
    /// The display was invalidated and cleared.
    Blanked,
    /// A GPU operation failed; nothing was drawn this tick.
    Skipped,
}

/// Moves the latest published frame into a GPU texture and draws it.
///
/// Owned by the render thread. Each tick takes at most one frame from the
/// handoff slot; a frame arriving faster than ticks simply replaces the
/// pending one upstream.
pub struct RenderBridge<B: GpuBackend> {
    backend: B,
    frames: Arc<FrameBufferManager>,
    config: Arc<ConfigStore>,
    config_revision: u64,
    clear_color: [f32; 4],
    stats: Arc<Mutex<PipelineStats>>,
    texture: Option<TextureState>,
    state: RenderState,
    displayed: Option<FrameHandle>,
    generation: u64,
}

impl<B: GpuBackend> RenderBridge<B> {
    pub fn new(
        backend: B,
        frames: Arc<FrameBufferManager>,
        config: Arc<ConfigStore>,
        stats: Arc<Mutex<PipelineStats>>,
    ) -> Self {
        let config_revision = config.revision();
        let clear_color = config.get().clear_color;
        Self {
            backend,
            frames,
            config,
            config_revision,
            clear_color,
            stats,
            texture: None,
            state: RenderState::Idle,
            displayed: None,
            generation: 0,
        }
    }

    /// Reset for a new presentation surface.
    ///
    /// Textures belong to the old surface and are dropped; the next
    /// published frame recreates one. Backend failures are returned so the
    /// host can decide whether to retry.
    pub fn on_surface_created(&mut self) -> Result<()> {
        if self.state == RenderState::Shutdown {
            return Err(PipelineError::Shutdown);
        }
        self.release_texture();
        self.backend.surface_created()?;
        info!("render surface created");
        Ok(())
    }

    /// One render tick: upload the latest frame if there is one, then draw.
    ///
    /// GPU failures are logged and reported as [`RenderOutcome::Skipped`];
    /// the previous texture stays intact. Only a shut-down bridge errors.
    pub fn render(&mut self, target: &B::Target) -> Result<RenderOutcome> {
        if self.state == RenderState::Shutdown {
            return Err(PipelineError::Shutdown);
        }
        self.refresh_config();

        let outcome = match self.frames.take_latest() {
            Some(FrameUpdate::Frame(lease)) => match self.upload(&lease) {
                Ok(()) => RenderOutcome::Uploaded(lease.handle()),
                Err(e) => {
                    warn!("texture upload for frame {} failed: {e}", lease.handle().sequence);
                    self.stats.lock().record_skipped();
                    return Ok(RenderOutcome::Skipped);
                }
            },
            Some(FrameUpdate::Blank) => {
                self.release_texture();
                RenderOutcome::Blanked
            }
            None => RenderOutcome::Redrawn,
        };

        let texture = self.texture.map(|t| t.id);
        if let Err(e) = self.backend.draw(target, texture, self.clear_color) {
            warn!("draw failed: {e}");
            self.stats.lock().record_skipped();
            return Ok(RenderOutcome::Skipped);
        }
        self.stats.lock().record_render();
        Ok(outcome)
    }

    /// Drop the texture and clear the target immediately.
    pub fn blank(&mut self, target: &B::Target) -> Result<()> {
        if self.state == RenderState::Shutdown {
            return Err(PipelineError::Shutdown);
        }
        self.release_texture();
        self.backend.draw(target, None, self.clear_color)
    }

    /// Destroy the texture and refuse further ticks. Idempotent.
    pub fn shutdown(&mut self) {
        if self.state == RenderState::Shutdown {
            return;
        }
        self.release_texture();
        self.state = RenderState::Shutdown;
        info!("render bridge shut down");
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn texture(&self) -> Option<TextureState> {
        self.texture
    }

    /// Handle of the frame currently in the texture.
    pub fn displayed(&self) -> Option<FrameHandle> {
        self.displayed
    }

    /// Number of completed uploads (texture generations).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn refresh_config(&mut self) {
        if let Some((revision, config)) = self.config.changed_since(self.config_revision) {
            self.config_revision = revision;
            self.clear_color = config.clear_color;
        }
    }

    fn upload(&mut self, lease: &FrameLease) -> Result<()> {
        self.state = RenderState::Updating;
        let result = self.upload_into_texture(lease);
        self.state = if self.texture.is_some() {
            RenderState::Ready
        } else {
            RenderState::Idle
        };
        result
    }

    fn upload_into_texture(&mut self, lease: &FrameLease) -> Result<()> {
        let buffer = lease.buffer();
        let (width, height, layout) = (buffer.width(), buffer.height(), buffer.layout());

        match self.texture {
            Some(current)
                if current.width == width && current.height == height && current.layout == layout =>
            {
                self.backend.upload(current.id, buffer)?;
            }
            previous => {
                // The old texture stays live until the new one holds a frame.
                let id = self.backend.create_texture(width, height, layout)?;
                if let Err(e) = self.backend.upload(id, buffer) {
                    self.backend.destroy_texture(id);
                    return Err(e);
                }
                if let Some(old) = previous {
                    self.backend.destroy_texture(old.id);
                    self.stats.lock().record_texture_reallocation();
                    info!(
                        "texture reallocated {}x{} {:?} -> {width}x{height} {layout:?}",
                        old.width, old.height, old.layout
                    );
                } else {
                    debug!("texture created {width}x{height} {layout:?}");
                }
                self.texture = Some(TextureState {
                    id,
                    width,
                    height,
                    layout,
                });
            }
        }

        self.generation += 1;
        self.displayed = Some(lease.handle());
        self.stats.lock().record_upload();
        Ok(())
    }

    fn release_texture(&mut self) {
        if let Some(texture) = self.texture.take() {
            self.backend.destroy_texture(texture.id);
            debug!("texture {:?} released", texture.id);
        }
        self.displayed = None;
        if self.state != RenderState::Shutdown {
            self.state = RenderState::Idle;
        }
    }
}
