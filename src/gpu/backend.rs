//! wgpu implementation of [`RenderBackend`].
//!
//! Targets are sampled-and-renderable textures. The composite program is a
//! full-screen quad pipeline over `shader_post_trails.wgsl`; pipelines are
//! built per destination format on first use, since the display surface and
//! the history targets need not share a format.

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use super::readback;
use super::{QuadVertex, QUAD_VERTICES};
use crate::backend::{Destination, RenderBackend, ResourceStats, TrailsUniforms};
use crate::error::TrailsError;
use crate::frame::{ColorFormat, FrameImage, Viewport};

/// Map a working format to its wgpu texture format.
pub fn texture_format(format: ColorFormat) -> wgpu::TextureFormat {
    match format {
        ColorFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        ColorFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        ColorFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
    }
}

/// Usages every trails texture is created with.
const TARGET_USAGES: wgpu::TextureUsages = wgpu::TextureUsages::RENDER_ATTACHMENT
    .union(wgpu::TextureUsages::TEXTURE_BINDING)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

/// Check that `allowed` covers what a trails target needs in `format`.
pub fn check_target_usages(
    format: ColorFormat,
    allowed: wgpu::TextureUsages,
) -> Result<(), TrailsError> {
    let missing = TARGET_USAGES.difference(allowed);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(TrailsError::Backend(format!(
            "format {} is not renderable on this adapter (missing {:?})",
            format, missing
        )))
    }
}

/// A color target: texture plus its default view.
#[derive(Debug)]
pub struct WgpuTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    size: Viewport,
    format: ColorFormat,
}

impl WgpuTarget {
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn format(&self) -> ColorFormat {
        self.format
    }
}

/// Composite program: shader, uniform storage and per-format pipelines.
#[derive(Debug)]
pub struct WgpuProgram {
    shader: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<ColorFormat, wgpu::RenderPipeline>,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
}

/// GPU backend owning a device, a queue and a headless display texture.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    /// Texture usages the adapter allows, per working format.
    allowed_usages: HashMap<ColorFormat, wgpu::TextureUsages>,
    /// Bind group layout for current + previous frame textures.
    texture_bind_group_layout: wgpu::BindGroupLayout,
    /// Bind group layout for the composite uniforms.
    uniform_bind_group_layout: wgpu::BindGroupLayout,
    quad_vertex_buffer: wgpu::Buffer,
    screen: Option<WgpuTarget>,
    live_targets: usize,
    live_programs: usize,
    draw_calls: u64,
}

impl WgpuBackend {
    /// Wrap an existing device and queue created from `adapter`.
    pub fn new(adapter: &wgpu::Adapter, device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let info = adapter.get_info();
        let allowed_usages = [
            ColorFormat::Rgba8Unorm,
            ColorFormat::Rgba16Float,
            ColorFormat::Rgba32Float,
        ]
        .into_iter()
        .map(|format| {
            let features = adapter.get_texture_format_features(texture_format(format));
            (format, features.allowed_usages)
        })
        .collect();

        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let texture_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Trails Texture Bind Group Layout"),
                entries: &[
                    // Binding 0: current frame
                    texture_entry(0),
                    // Binding 1: previous (history) frame
                    texture_entry(1),
                ],
            });

        let uniform_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Trails Uniform Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let quad_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Fullscreen Quad Buffer"),
            contents: bytemuck::cast_slice(QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Self {
            device,
            queue,
            adapter_name: format!("{} ({:?})", info.name, info.backend),
            allowed_usages,
            texture_bind_group_layout,
            uniform_bind_group_layout,
            quad_vertex_buffer,
            screen: None,
            live_targets: 0,
            live_programs: 0,
            draw_calls: 0,
        }
    }

    /// Request a headless adapter and device.
    pub async fn headless() -> Result<Self, TrailsError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None, // Headless
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| TrailsError::Backend("No adapter found".to_string()))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default(), None)
            .await
            .map_err(|e| TrailsError::Backend(format!("request_device failed: {}", e)))?;

        let backend = Self::new(&adapter, device, queue);
        log::info!("wgpu: using adapter {}", backend.adapter_name);
        Ok(backend)
    }

    /// Whether targets of `format` can be created on this adapter.
    pub fn supports_format(&self, format: ColorFormat) -> bool {
        self.check_format(format).is_ok()
    }

    fn check_format(&self, format: ColorFormat) -> Result<(), TrailsError> {
        let allowed = self
            .allowed_usages
            .get(&format)
            .copied()
            .unwrap_or(wgpu::TextureUsages::empty());
        check_target_usages(format, allowed)
    }

    fn allocate(
        &self,
        label: &str,
        size: Viewport,
        format: ColorFormat,
    ) -> Result<WgpuTarget, TrailsError> {
        self.check_format(format)?;
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size.width,
                height: size.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: texture_format(format),
            usage: TARGET_USAGES,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(WgpuTarget {
            texture,
            view,
            size,
            format,
        })
    }

    fn create_pipeline(
        device: &wgpu::Device,
        program: &WgpuProgram,
        format: ColorFormat,
    ) -> wgpu::RenderPipeline {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("Trails Pipeline: {}", format)),
            layout: Some(&program.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &program.shader,
                entry_point: Some("vs_main"),
                buffers: &[QuadVertex::desc()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &program.shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: texture_format(format),
                    // Float32 targets are not blendable; write without blending.
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }

    fn clear_view(&self, view: &wgpu::TextureView, label: &str) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        {
            let _render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            // Pass ends immediately, clearing the texture
        }
        self.queue.submit(Some(encoder.finish()));
    }
}

impl RenderBackend for WgpuBackend {
    type Target = WgpuTarget;
    type Program = WgpuProgram;

    fn create_target(
        &mut self,
        label: &str,
        size: Viewport,
        format: ColorFormat,
    ) -> Result<WgpuTarget, TrailsError> {
        if size.is_empty() {
            return Err(TrailsError::InvalidViewport {
                width: size.width,
                height: size.height,
            });
        }
        // New textures are zero-initialized by wgpu.
        let target = self.allocate(label, size, format)?;
        self.live_targets += 1;
        log::trace!("wgpu: created target '{}' {} {}", label, size, format);
        Ok(target)
    }

    fn release_target(&mut self, target: WgpuTarget) {
        target.texture.destroy();
        self.live_targets = self.live_targets.saturating_sub(1);
    }

    fn clear_target(&mut self, target: &WgpuTarget) -> Result<(), TrailsError> {
        self.clear_view(&target.view, "Clear Trails Target");
        Ok(())
    }

    fn target_size(&self, target: &WgpuTarget) -> Viewport {
        target.size
    }

    fn create_program(&mut self) -> Result<WgpuProgram, TrailsError> {
        let shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Trails Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader_post_trails.wgsl").into()),
        });

        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Trails Pipeline Layout"),
            bind_group_layouts: &[&self.texture_bind_group_layout, &self.uniform_bind_group_layout],
            push_constant_ranges: &[],
        });

        let uniform_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Trails Uniform Buffer"),
            contents: bytemuck::bytes_of(&TrailsUniforms::default()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let uniform_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Trails Uniform Bind Group"),
            layout: &self.uniform_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        self.live_programs += 1;
        Ok(WgpuProgram {
            shader,
            pipeline_layout,
            pipelines: HashMap::new(),
            uniform_buffer,
            uniform_bind_group,
        })
    }

    fn release_program(&mut self, program: WgpuProgram) {
        program.uniform_buffer.destroy();
        self.live_programs = self.live_programs.saturating_sub(1);
    }

    fn upload_uniforms(&mut self, program: &mut WgpuProgram, uniforms: &TrailsUniforms) {
        self.queue
            .write_buffer(&program.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    fn draw_composite(
        &mut self,
        program: &mut WgpuProgram,
        current: &WgpuTarget,
        previous: &WgpuTarget,
        destination: Destination<'_, WgpuTarget>,
    ) -> Result<(), TrailsError> {
        let output = match destination {
            Destination::Target(t) => t,
            Destination::Screen => self
                .screen
                .as_ref()
                .ok_or_else(|| TrailsError::Backend("screen is not configured".to_string()))?,
        };

        if !program.pipelines.contains_key(&output.format) {
            let pipeline = Self::create_pipeline(&self.device, program, output.format);
            program.pipelines.insert(output.format, pipeline);
        }
        let Some(pipeline) = program.pipelines.get(&output.format) else {
            return Err(TrailsError::Backend("missing composite pipeline".to_string()));
        };

        // Bindings: 0 = current, 1 = previous
        let texture_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Trails Texture Bind Group"),
            layout: &self.texture_bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&current.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&previous.view),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Trails Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Trails Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &output.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, &texture_bind_group, &[]);
            render_pass.set_bind_group(1, &program.uniform_bind_group, &[]);
            render_pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
            render_pass.draw(0..6, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));

        self.draw_calls += 1;
        Ok(())
    }

    fn write_target(&mut self, target: &WgpuTarget, image: &FrameImage) -> Result<(), TrailsError> {
        let image = image.resampled(target.size);
        let data = readback::encode_pixels(&image, target.format);
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(target.size.width * target.format.bytes_per_pixel()),
                rows_per_image: Some(target.size.height),
            },
            wgpu::Extent3d {
                width: target.size.width,
                height: target.size.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn read_target(&mut self, target: &WgpuTarget) -> Result<FrameImage, TrailsError> {
        readback::read_texture(
            &self.device,
            &self.queue,
            &target.texture,
            target.size,
            target.format,
        )
    }

    fn configure_screen(&mut self, size: Viewport, format: ColorFormat) -> Result<(), TrailsError> {
        if size.is_empty() {
            return Err(TrailsError::InvalidViewport {
                width: size.width,
                height: size.height,
            });
        }
        let screen = self.allocate("Screen", size, format)?;
        if let Some(old) = self.screen.replace(screen) {
            old.texture.destroy();
        }
        Ok(())
    }

    fn read_screen(&mut self) -> Result<FrameImage, TrailsError> {
        let screen = self
            .screen
            .as_ref()
            .ok_or_else(|| TrailsError::Backend("screen is not configured".to_string()))?;
        readback::read_texture(
            &self.device,
            &self.queue,
            &screen.texture,
            screen.size,
            screen.format,
        )
    }

    fn stats(&self) -> ResourceStats {
        ResourceStats {
            live_targets: self.live_targets,
            live_programs: self.live_programs,
            draw_calls: self.draw_calls,
        }
    }

    fn describe(&self) -> String {
        format!("wgpu: {}", self.adapter_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_target_usages_reports_missing_render_attachment() {
        let downlevel = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST;
        let err = check_target_usages(ColorFormat::Rgba32Float, downlevel).unwrap_err();
        match err {
            TrailsError::Backend(msg) => {
                assert!(msg.contains("rgba32f"), "{}", msg);
                assert!(msg.contains("RENDER_ATTACHMENT"), "{}", msg);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_check_target_usages_accepts_full_support() {
        assert!(check_target_usages(ColorFormat::Rgba16Float, wgpu::TextureUsages::all()).is_ok());
        assert!(check_target_usages(ColorFormat::Rgba8Unorm, TARGET_USAGES).is_ok());
    }
}
