//! GPU resource lifecycle. Every session allocation is wrapped in a guard
//! that reports to a shared counting ledger: acquisition and release are
//! paired by construction, on every exit path, and a texture shared between
//! the current and next slots cannot be released twice because guards are
//! reference counted.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::field::{ParticleField, SpriteAttr};
use crate::loader::DecodedImage;

/// Outstanding-allocation counters. Strictly for accounting; guards own the
/// actual objects.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    textures: AtomicUsize,
    geometries: AtomicUsize,
    materials: AtomicUsize,
}

impl ResourceLedger {
    pub fn outstanding(&self) -> usize {
        self.textures.load(Ordering::SeqCst)
            + self.geometries.load(Ordering::SeqCst)
            + self.materials.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> (usize, usize, usize) {
        (
            self.textures.load(Ordering::SeqCst),
            self.geometries.load(Ordering::SeqCst),
            self.materials.load(Ordering::SeqCst),
        )
    }
}

pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

pub struct GpuGeometry {
    pub start_buffer: wgpu::Buffer,
    pub attr_buffer: wgpu::Buffer,
    pub count: u32,
}

pub struct GpuMaterial {
    pub bind_group: wgpu::BindGroup,
}

struct Counted<T> {
    gpu: Option<T>,
    ledger: Arc<ResourceLedger>,
    slot: fn(&ResourceLedger) -> &AtomicUsize,
}

impl<T> Counted<T> {
    fn new(gpu: Option<T>, ledger: Arc<ResourceLedger>, slot: fn(&ResourceLedger) -> &AtomicUsize) -> Self {
        slot(&ledger).fetch_add(1, Ordering::SeqCst);
        Self { gpu, ledger, slot }
    }
}

impl<T> Drop for Counted<T> {
    fn drop(&mut self) {
        (self.slot)(&self.ledger).fetch_sub(1, Ordering::SeqCst);
    }
}

/// A decoded image uploaded to the GPU (or a ledger-only stand-in when
/// running headless). Clones share one allocation.
#[derive(Clone)]
pub struct TextureGuard {
    inner: Arc<Counted<GpuTexture>>,
    size: (u32, u32),
}

impl TextureGuard {
    pub fn gpu(&self) -> Option<&GpuTexture> {
        self.inner.gpu.as_ref()
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }
}

#[derive(Clone)]
pub struct GeometryGuard {
    inner: Arc<Counted<GpuGeometry>>,
    count: u32,
}

impl GeometryGuard {
    pub fn gpu(&self) -> Option<&GpuGeometry> {
        self.inner.gpu.as_ref()
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}

#[derive(Clone)]
pub struct MaterialGuard {
    inner: Arc<Counted<GpuMaterial>>,
}

impl MaterialGuard {
    pub fn gpu(&self) -> Option<&GpuMaterial> {
        self.inner.gpu.as_ref()
    }
}

/// The acquire side of the lifecycle contract. The state machine only ever
/// talks to this trait, which keeps it testable without a device.
pub trait SessionFactory {
    fn texture(&mut self, image: &DecodedImage) -> Result<TextureGuard>;
    fn geometry(&mut self, field: &ParticleField) -> Result<GeometryGuard>;
    fn material(&mut self, current: &TextureGuard, next: &TextureGuard) -> Result<MaterialGuard>;
    /// Rewrite the start-position buffer after a refit; flight attributes
    /// are untouched.
    fn write_start_positions(&mut self, geometry: &GeometryGuard, field: &ParticleField);
    fn ledger(&self) -> Arc<ResourceLedger>;
}

/// Pipelines and per-viewer GPU objects shared by the factory and the paint
/// callback. Built once from eframe's render state.
pub struct SharedGpu {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub sprite_pipeline: wgpu::RenderPipeline,
    pub plane_pipeline: wgpu::RenderPipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
    pub uniform_buffer: wgpu::Buffer,
    pub sampler: wgpu::Sampler,
}

const START_ATTRIBUTES: [wgpu::VertexAttribute; 1] = [wgpu::VertexAttribute {
    format: wgpu::VertexFormat::Float32x3,
    offset: 0,
    shader_location: 0,
}];

const SPRITE_ATTRIBUTES: [wgpu::VertexAttribute; 4] = [
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x3,
        offset: 0,
        shader_location: 1,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32,
        offset: 12,
        shader_location: 2,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32,
        offset: 16,
        shader_location: 3,
    },
    wgpu::VertexAttribute {
        format: wgpu::VertexFormat::Float32x2,
        offset: 20,
        shader_location: 4,
    },
];

impl SharedGpu {
    pub fn new(render_state: &egui_wgpu::RenderState) -> Self {
        let device = render_state.device.clone();
        let queue = render_state.queue.clone();
        let target_format = render_state.target_format;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("viewer_shader"),
            source: wgpu::ShaderSource::Wgsl(std::borrow::Cow::Borrowed(include_str!(
                "viewer.wgsl"
            ))),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("viewer_bgl"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("viewer_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let sprite_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("sprite_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_sprite",
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: 12,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &START_ATTRIBUTES,
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<SpriteAttr>() as u64,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &SPRITE_ATTRIBUTES,
                    },
                ],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_sprite",
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
        });

        let plane_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("plane_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_plane",
                buffers: &[],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_plane",
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("viewer_uniforms"),
            size: 64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("viewer_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            device,
            queue,
            sprite_pipeline,
            plane_pipeline,
            bind_group_layout,
            uniform_buffer,
            sampler,
        }
    }
}

pub struct WgpuFactory {
    pub shared: Arc<SharedGpu>,
    ledger: Arc<ResourceLedger>,
}

impl WgpuFactory {
    pub fn new(shared: Arc<SharedGpu>) -> Self {
        Self {
            shared,
            ledger: Arc::new(ResourceLedger::default()),
        }
    }
}

impl SessionFactory for WgpuFactory {
    fn texture(&mut self, image: &DecodedImage) -> Result<TextureGuard> {
        let device = &self.shared.device;
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("session_texture"),
            size: wgpu::Extent3d {
                width: image.width,
                height: image.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.shared.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &image.pixels,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(image.width * 4),
                rows_per_image: Some(image.height),
            },
            wgpu::Extent3d {
                width: image.width,
                height: image.height,
                depth_or_array_layers: 1,
            },
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(TextureGuard {
            inner: Arc::new(Counted::new(
                Some(GpuTexture { texture, view }),
                self.ledger.clone(),
                |l| &l.textures,
            )),
            size: (image.width, image.height),
        })
    }

    fn geometry(&mut self, field: &ParticleField) -> Result<GeometryGuard> {
        let device = &self.shared.device;
        let count = field.attrs.len() as u32;
        let start_data: &[u8] = bytemuck::cast_slice(&field.start_positions);
        let attr_data: &[u8] = bytemuck::cast_slice(&field.attrs);

        let start_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("start_positions"),
            size: start_data.len() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let attr_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sprite_attrs"),
            size: attr_data.len() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.shared.queue.write_buffer(&start_buffer, 0, start_data);
        self.shared.queue.write_buffer(&attr_buffer, 0, attr_data);

        Ok(GeometryGuard {
            inner: Arc::new(Counted::new(
                Some(GpuGeometry {
                    start_buffer,
                    attr_buffer,
                    count,
                }),
                self.ledger.clone(),
                |l| &l.geometries,
            )),
            count,
        })
    }

    fn material(&mut self, current: &TextureGuard, next: &TextureGuard) -> Result<MaterialGuard> {
        let (Some(cur), Some(nxt)) = (current.gpu(), next.gpu()) else {
            bail!("material requires GPU-backed textures");
        };
        let bind_group = self
            .shared
            .device
            .create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("session_material"),
                layout: &self.shared.bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.shared.uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&cur.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::TextureView(&nxt.view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::Sampler(&self.shared.sampler),
                    },
                ],
            });
        Ok(MaterialGuard {
            inner: Arc::new(Counted::new(
                Some(GpuMaterial { bind_group }),
                self.ledger.clone(),
                |l| &l.materials,
            )),
        })
    }

    fn write_start_positions(&mut self, geometry: &GeometryGuard, field: &ParticleField) {
        if let Some(gpu) = geometry.gpu() {
            self.shared
                .queue
                .write_buffer(&gpu.start_buffer, 0, bytemuck::cast_slice(&field.start_positions));
        }
    }

    fn ledger(&self) -> Arc<ResourceLedger> {
        self.ledger.clone()
    }
}

/// Ledger-only factory for headless runs and the state-machine tests.
pub struct HeadlessFactory {
    ledger: Arc<ResourceLedger>,
}

impl HeadlessFactory {
    pub fn new() -> Self {
        Self {
            ledger: Arc::new(ResourceLedger::default()),
        }
    }
}

impl Default for HeadlessFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionFactory for HeadlessFactory {
    fn texture(&mut self, image: &DecodedImage) -> Result<TextureGuard> {
        Ok(TextureGuard {
            inner: Arc::new(Counted::new(None, self.ledger.clone(), |l| &l.textures)),
            size: (image.width, image.height),
        })
    }

    fn geometry(&mut self, field: &ParticleField) -> Result<GeometryGuard> {
        let count = field.attrs.len() as u32;
        Ok(GeometryGuard {
            inner: Arc::new(Counted::new(None, self.ledger.clone(), |l| &l.geometries)),
            count,
        })
    }

    fn material(&mut self, _current: &TextureGuard, _next: &TextureGuard) -> Result<MaterialGuard> {
        Ok(MaterialGuard {
            inner: Arc::new(Counted::new(None, self.ledger.clone(), |l| &l.materials)),
        })
    }

    fn write_start_positions(&mut self, _geometry: &GeometryGuard, _field: &ParticleField) {}

    fn ledger(&self) -> Arc<ResourceLedger> {
        self.ledger.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field() -> ParticleField {
        ParticleField::generate(
            4,
            1,
            (100, 100),
            egui::Rect::from_min_size(egui::pos2(0.0, 0.0), egui::vec2(10.0, 10.0)),
            egui::Rect::from_min_size(egui::pos2(0.0, 0.0), egui::vec2(800.0, 600.0)),
            0.9,
        )
    }

    #[test]
    fn guards_release_on_drop() {
        let mut factory = HeadlessFactory::new();
        let ledger = factory.ledger();
        let img = DecodedImage::solid(2, 2, [0, 0, 0, 255]);
        {
            let tex = factory.texture(&img).unwrap();
            let geo = factory.geometry(&field()).unwrap();
            let mat = factory.material(&tex, &tex).unwrap();
            assert_eq!(ledger.outstanding(), 3);
            drop(mat);
            assert_eq!(ledger.outstanding(), 2);
            drop(geo);
        }
        assert_eq!(ledger.outstanding(), 0);
    }

    #[test]
    fn shared_texture_releases_once() {
        let mut factory = HeadlessFactory::new();
        let ledger = factory.ledger();
        let img = DecodedImage::solid(2, 2, [0, 0, 0, 255]);
        let tex = factory.texture(&img).unwrap();
        let shared = tex.clone();
        assert_eq!(ledger.snapshot().0, 1, "clone must not double-count");
        drop(tex);
        assert_eq!(ledger.snapshot().0, 1);
        drop(shared);
        assert_eq!(ledger.snapshot().0, 0);
    }

    #[test]
    fn geometry_guard_reports_particle_count() {
        let mut factory = HeadlessFactory::new();
        let geo = factory.geometry(&field()).unwrap();
        assert_eq!(geo.count(), 25);
    }
}
