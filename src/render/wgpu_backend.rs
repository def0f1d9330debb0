use tracing::{debug, info};
use wgpu::util::DeviceExt;

use crate::error::{PipelineError, Result};
use crate::frame::{ChannelLayout, PixelBuffer};
use crate::render::backend::{GpuBackend, TextureId};

const QUAD_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) tex_coord: vec2<f32>,
}

struct QuadParams {
    replicate_red: u32,
    decode_srgb: u32,
    _pad0: u32,
    _pad1: u32,
}

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    var tex_coords = array<vec2<f32>, 6>(
        vec2<f32>(0.0, 1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(0.0, 1.0),
        vec2<f32>(1.0, 0.0),
        vec2<f32>(0.0, 0.0),
    );

    var output: VertexOutput;
    output.position = vec4<f32>(positions[vertex_index], 0.0, 1.0);
    output.tex_coord = tex_coords[vertex_index];
    return output;
}

@group(0) @binding(0) var frame_texture: texture_2d<f32>;
@group(0) @binding(1) var frame_sampler: sampler;
@group(0) @binding(2) var<uniform> params: QuadParams;

fn srgb_to_linear(c: f32) -> f32 {
    if (c <= 0.04045) {
        return c / 12.92;
    }
    return pow((c + 0.055) / 1.055, 2.4);
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let texel = textureSample(frame_texture, frame_sampler, input.tex_coord);
    if (params.replicate_red == 0u) {
        return texel;
    }
    var v = texel.r;
    if (params.decode_srgb != 0u) {
        v = srgb_to_linear(v);
    }
    return vec4<f32>(v, v, v, 1.0);
}
"#;

/// Per-texture shader options.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
struct QuadParams {
    /// Non-zero for single-channel textures: R is copied to G and B.
    replicate_red: u32,
    /// Non-zero when a single-channel texture holds sRGB-encoded values but
    /// the target re-encodes on write.
    decode_srgb: u32,
    _pad: [u32; 2],
}

impl QuadParams {
    fn for_layout(layout: ChannelLayout, target_format: wgpu::TextureFormat) -> Self {
        let single = layout == ChannelLayout::Luminance;
        Self {
            replicate_red: u32::from(single),
            decode_srgb: u32::from(single && target_format.is_srgb()),
            _pad: [0; 2],
        }
    }
}

/// Sampled texture format for a buffer layout.
///
/// RGBA uses the sRGB variant when the target re-encodes on write, so the
/// bytes reach the screen unchanged.
fn texture_format(
    layout: ChannelLayout,
    target_format: wgpu::TextureFormat,
) -> wgpu::TextureFormat {
    match layout {
        ChannelLayout::Rgba if target_format.is_srgb() => wgpu::TextureFormat::Rgba8UnormSrgb,
        ChannelLayout::Rgba => wgpu::TextureFormat::Rgba8Unorm,
        ChannelLayout::Luminance => wgpu::TextureFormat::R8Unorm,
    }
}

fn check_dimensions(width: u32, height: u32, max: u32) -> Result<()> {
    if width == 0 || height == 0 || width > max || height > max {
        return Err(PipelineError::AllocationFailure(format!(
            "texture {width}x{height} outside 1..={max}"
        )));
    }
    Ok(())
}

struct GpuTexture {
    texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    // Kept alive for the bind group.
    _params: wgpu::Buffer,
    width: u32,
    height: u32,
    layout: ChannelLayout,
}

/// Draws frames with a full-screen textured quad through wgpu.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target_format: wgpu::TextureFormat,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    textures: Vec<Option<GpuTexture>>,
}

impl WgpuBackend {
    /// Build the quad pipeline on an existing device, rendering into targets
    /// of `target_format`.
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        target_format: wgpu::TextureFormat,
    ) -> Self {
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Frame Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Frame Quad Shader"),
            source: wgpu::ShaderSource::Wgsl(QUAD_SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Frame Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Frame Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Frame Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        info!("wgpu frame renderer initialized ({target_format:?})");

        Self {
            device,
            queue,
            target_format,
            pipeline,
            bind_group_layout,
            sampler,
            textures: Vec::new(),
        }
    }

    /// Create a device without a window and build the renderer on it.
    pub fn headless(target_format: wgpu::TextureFormat) -> Result<Self> {
        pollster::block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::LowPower,
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .map_err(|e| PipelineError::GpuState(format!("Failed to request adapter: {e}")))?;

            log::info!("Using GPU adapter: {:?}", adapter.get_info().name);

            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor::default())
                .await
                .map_err(|e| PipelineError::GpuState(format!("Failed to create device: {e}")))?;

            Ok(Self::new(device, queue, target_format))
        })
    }

    /// An offscreen render target matching this renderer's target format.
    pub fn offscreen_target(
        &self,
        width: u32,
        height: u32,
    ) -> Result<(wgpu::Texture, wgpu::TextureView)> {
        check_dimensions(width, height, self.device.limits().max_texture_dimension_2d)?;
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.target_format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok((texture, view))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.target_format
    }

    fn texture(&self, id: TextureId) -> Result<&GpuTexture> {
        self.textures
            .get(id.0 as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| PipelineError::GpuState(format!("unknown texture {id:?}")))
    }

    fn insert(&mut self, texture: GpuTexture) -> TextureId {
        let index = match self.textures.iter().position(Option::is_none) {
            Some(free) => {
                self.textures[free] = Some(texture);
                free
            }
            None => {
                self.textures.push(Some(texture));
                self.textures.len() - 1
            }
        };
        TextureId(index as u32)
    }
}

impl GpuBackend for WgpuBackend {
    type Target = wgpu::TextureView;

    fn surface_created(&mut self) -> Result<()> {
        let stale = self.textures.iter().filter(|t| t.is_some()).count();
        if stale > 0 {
            debug!("dropping {stale} textures from the previous surface");
        }
        self.textures.clear();
        Ok(())
    }

    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        layout: ChannelLayout,
    ) -> Result<TextureId> {
        check_dimensions(width, height, self.device.limits().max_texture_dimension_2d)?;

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Frame Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(layout, self.target_format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let params = QuadParams::for_layout(layout, self.target_format);
        let params_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Frame Quad Params"),
                contents: bytemuck::bytes_of(&params),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params_buffer.as_entire_binding(),
                },
            ],
        });

        Ok(self.insert(GpuTexture {
            texture,
            bind_group,
            _params: params_buffer,
            width,
            height,
            layout,
        }))
    }

    fn upload(&mut self, texture: TextureId, buffer: &PixelBuffer) -> Result<()> {
        let tex = self.texture(texture)?;
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

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            buffer.as_bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(buffer.row_bytes() as u32),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width: tex.width,
                height: tex.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if let Some(slot) = self.textures.get_mut(texture.0 as usize) {
            if let Some(tex) = slot.take() {
                tex.texture.destroy();
            }
        }
    }

    fn draw(
        &mut self,
        target: &wgpu::TextureView,
        texture: Option<TextureId>,
        clear_color: [f32; 4],
    ) -> Result<()> {
        let bind_group = match texture {
            Some(id) => Some(&self.texture(id)?.bind_group),
            None => None,
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Frame Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(clear_color[0]),
                            g: f64::from(clear_color[1]),
                            b: f64::from(clear_color[2]),
                            a: f64::from(clear_color[3]),
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            if let Some(bind_group) = bind_group {
                render_pass.set_pipeline(&self.pipeline);
                render_pass.set_bind_group(0, bind_group, &[]);
                render_pass.draw(0..6, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}
