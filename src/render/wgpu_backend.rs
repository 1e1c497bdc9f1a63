//! `wgpu` implementation of the render backend traits.
//!
//! One `Device`/`Queue` pair is shared between the UI side and the render thread; that
//! sharing is what makes textures drawn on the render thread readable when the UI
//! presents them. Published ids are resolved through a small registry owned by
//! [`WgpuDevice`].

use super::{
    FrameParams, FramePresenter, GpuContext, GpuProvider, PixelSize, RenderError, RenderTarget,
    TextureId,
};
use crate::models::{MeshSnapshot, PointCloudSnapshot};
use bytemuck::{Pod, Zeroable};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use wgpu::util::DeviceExt;

pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const NORMAL_COLOR: [f32; 3] = [0.2, 0.6, 1.0];
const NORMAL_LENGTH: f32 = 0.02;

const SHADER: &str = r#"
struct Uniforms {
    view_proj: mat4x4<f32>,
    color: vec4<f32>,
    clip_plane: vec4<f32>,
    // x: clipping on, y: lighting on
    flags: vec4<f32>,
};

@group(0) @binding(0) var<uniform> u: Uniforms;

struct VertexOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) world: vec3<f32>,
    @location(1) normal: vec3<f32>,
};

@vertex
fn vs_plain(@location(0) position: vec3<f32>) -> VertexOut {
    var out: VertexOut;
    out.clip = u.view_proj * vec4<f32>(position, 1.0);
    out.world = position;
    out.normal = vec3<f32>(0.0, 0.0, 0.0);
    return out;
}

@vertex
fn vs_lit(@location(0) position: vec3<f32>, @location(1) normal: vec3<f32>) -> VertexOut {
    var out: VertexOut;
    out.clip = u.view_proj * vec4<f32>(position, 1.0);
    out.world = position;
    out.normal = normal;
    return out;
}

@fragment
fn fs_main(in: VertexOut) -> @location(0) vec4<f32> {
    if (u.flags.x > 0.5 && dot(u.clip_plane.xyz, in.world) + u.clip_plane.w < 0.0) {
        discard;
    }
    var color = u.color.rgb;
    if (u.flags.y > 0.5 && length(in.normal) > 1e-6) {
        let light = normalize(vec3<f32>(0.4, 0.8, 0.6));
        let diffuse = abs(dot(normalize(in.normal), light));
        color = color * (0.25 + 0.75 * diffuse);
    }
    return vec4<f32>(color, 1.0);
}
"#;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Uniforms {
    view_proj: [[f32; 4]; 4],
    color: [f32; 4],
    clip_plane: [f32; 4],
    flags: [f32; 4],
}

/// Uniform slots, one per draw kind within a frame.
#[derive(Clone, Copy)]
enum Slot {
    Points = 0,
    Mesh = 1,
    Wire = 2,
    Normals = 3,
}

const SLOTS: usize = 4;

/// Device, queue and texture registry shared by every thread that touches the GPU.
pub struct WgpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    textures: Mutex<HashMap<TextureId, wgpu::Texture>>,
    next_texture: AtomicU64,
}

impl WgpuDevice {
    pub async fn new() -> Result<Arc<Self>, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .map_err(|e| RenderError::NotAvailable(e.to_string()))?;

        let info = adapter.get_info();
        tracing::info!("GPU: {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("pointmesh device"),
                ..Default::default()
            })
            .await
            .map_err(|e| RenderError::ContextCreation(e.to_string()))?;

        device.on_uncaptured_error(Box::new(|e| {
            tracing::error!("[wgpu] uncaptured error: {e}");
        }));

        Ok(Arc::new(Self {
            device,
            queue,
            textures: Mutex::new(HashMap::new()),
            next_texture: AtomicU64::new(1),
        }))
    }

    /// Blocking wrapper for callers without an async runtime.
    pub fn new_blocking() -> Result<Arc<Self>, RenderError> {
        pollster::block_on(Self::new())
    }

    fn register(&self, texture: wgpu::Texture) -> TextureId {
        let id = loop {
            // skips the reserved zero after wrap-around
            if let Some(id) = TextureId::new(self.next_texture.fetch_add(1, Ordering::Relaxed)) {
                break id;
            }
        };
        self.registry().insert(id, texture);
        id
    }

    fn unregister(&self, id: TextureId) -> Option<wgpu::Texture> {
        self.registry().remove(&id)
    }

    /// Resolve a published id, if it still names a live texture.
    pub fn texture(&self, id: TextureId) -> Option<wgpu::Texture> {
        self.registry().get(&id).cloned()
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<TextureId, wgpu::Texture>> {
        self.textures.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hands the render thread its off-screen "surface" and context over a shared device.
pub struct WgpuProvider {
    shared: Arc<WgpuDevice>,
    format: wgpu::TextureFormat,
}

impl WgpuProvider {
    pub fn new(shared: Arc<WgpuDevice>) -> Self {
        Self {
            shared,
            format: COLOR_FORMAT,
        }
    }
}

/// There is no window behind the render thread; the surface is just the colour format
/// every framebuffer must use to be copyable onto the UI's surface.
#[derive(Debug, Clone, Copy)]
pub struct OffscreenSurface {
    pub format: wgpu::TextureFormat,
}

impl GpuProvider for WgpuProvider {
    type Surface = OffscreenSurface;
    type Context = WgpuContext;

    fn create_surface(&mut self) -> Result<OffscreenSurface, RenderError> {
        Ok(OffscreenSurface {
            format: self.format,
        })
    }

    fn create_shared_context(
        &mut self,
        surface: &OffscreenSurface,
    ) -> Result<WgpuContext, RenderError> {
        Ok(WgpuContext {
            shared: self.shared.clone(),
            format: surface.format,
            pipelines: None,
            points: None,
            mesh: None,
            bound: None,
        })
    }
}

pub struct WgpuTarget {
    id: TextureId,
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth: wgpu::Texture,
    depth_view: wgpu::TextureView,
    size: PixelSize,
}

impl RenderTarget for WgpuTarget {
    fn color_texture(&self) -> TextureId {
        self.id
    }

    fn size(&self) -> PixelSize {
        self.size
    }
}

struct Pipelines {
    points: wgpu::RenderPipeline,
    lines: wgpu::RenderPipeline,
    triangles: wgpu::RenderPipeline,
    uniforms: Vec<wgpu::Buffer>,
    bind_groups: Vec<wgpu::BindGroup>,
}

struct PointBuffers {
    positions: wgpu::Buffer,
    count: u32,
    normal_lines: Option<(wgpu::Buffer, u32)>,
}

struct MeshBuffers {
    positions: wgpu::Buffer,
    normals: wgpu::Buffer,
    indices: wgpu::Buffer,
    index_count: u32,
    edges: wgpu::Buffer,
    edge_count: u32,
}

pub struct WgpuContext {
    shared: Arc<WgpuDevice>,
    format: wgpu::TextureFormat,
    pipelines: Option<Pipelines>,
    points: Option<PointBuffers>,
    mesh: Option<MeshBuffers>,
    bound: Option<(wgpu::TextureView, wgpu::TextureView)>,
}

impl WgpuContext {
    fn device(&self) -> &wgpu::Device {
        &self.shared.device
    }

    fn vertex_buffer(&self, label: &str, data: &[[f32; 3]]) -> wgpu::Buffer {
        self.device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::VERTEX,
            })
    }

    fn index_buffer(&self, label: &str, data: &[u32]) -> wgpu::Buffer {
        self.device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::INDEX,
            })
    }
}

fn position_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

fn normal_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x3];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

fn uniforms_for(frame: &FrameParams, color: [f32; 3], lit: bool) -> Uniforms {
    let clip = frame.settings.clip_plane;
    Uniforms {
        view_proj: (frame.projection * frame.view).to_cols_array_2d(),
        color: [color[0], color[1], color[2], 1.0],
        clip_plane: clip.plane,
        flags: [
            if clip.enabled { 1.0 } else { 0.0 },
            if lit { 1.0 } else { 0.0 },
            0.0,
            0.0,
        ],
    }
}

impl GpuContext for WgpuContext {
    type Target = WgpuTarget;

    fn make_current(&mut self) -> Result<(), RenderError> {
        // wgpu devices are usable from any thread
        Ok(())
    }

    fn done_current(&mut self) {}

    fn build_pipeline(&mut self) -> Result<(), RenderError> {
        let device = self.device();
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("pointmesh shader"),
            source: wgpu::ShaderSource::Wgsl(SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("pointmesh uniforms"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });
        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("pointmesh pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let make = |label: &str,
                    topology: wgpu::PrimitiveTopology,
                    entry: &str,
                    buffers: &[wgpu::VertexBufferLayout<'_>]| {
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some(entry),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers,
                },
                primitive: wgpu::PrimitiveState {
                    topology,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::LessEqual,
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some("fs_main"),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            })
        };

        let points = make(
            "pointmesh points",
            wgpu::PrimitiveTopology::PointList,
            "vs_plain",
            &[position_layout()],
        );
        let lines = make(
            "pointmesh lines",
            wgpu::PrimitiveTopology::LineList,
            "vs_plain",
            &[position_layout()],
        );
        let triangles = make(
            "pointmesh triangles",
            wgpu::PrimitiveTopology::TriangleList,
            "vs_lit",
            &[position_layout(), normal_layout()],
        );

        let mut uniforms = Vec::with_capacity(SLOTS);
        let mut bind_groups = Vec::with_capacity(SLOTS);
        for _ in 0..SLOTS {
            let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("pointmesh uniform buffer"),
                size: std::mem::size_of::<Uniforms>() as wgpu::BufferAddress,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("pointmesh bind group"),
                layout: &bind_group_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            uniforms.push(buffer);
            bind_groups.push(bind_group);
        }

        self.pipelines = Some(Pipelines {
            points,
            lines,
            triangles,
            uniforms,
            bind_groups,
        });
        Ok(())
    }

    fn release_pipeline(&mut self) {
        self.points = None;
        self.mesh = None;
        if let Some(pipelines) = self.pipelines.take() {
            for buffer in &pipelines.uniforms {
                buffer.destroy();
            }
        }
    }

    fn create_framebuffer(&mut self, size: PixelSize) -> Result<WgpuTarget, RenderError> {
        let limit = self.device().limits().max_texture_dimension_2d;
        if size.width > limit || size.height > limit {
            return Err(RenderError::Framebuffer {
                size,
                reason: format!("exceeds the device limit of {limit} pixels"),
            });
        }
        let extent = wgpu::Extent3d {
            width: size.width,
            height: size.height,
            depth_or_array_layers: 1,
        };
        let color = self.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("pointmesh color target"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let depth = self.device().create_texture(&wgpu::TextureDescriptor {
            label: Some("pointmesh depth target"),
            size: extent,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());
        let depth_view = depth.create_view(&wgpu::TextureViewDescriptor::default());
        let id = self.shared.register(color.clone());
        tracing::debug!("Allocated framebuffer {} at {}", id, size);

        Ok(WgpuTarget {
            id,
            color,
            color_view,
            depth,
            depth_view,
            size,
        })
    }

    fn release_framebuffer(&mut self, target: WgpuTarget) {
        self.shared.unregister(target.id);
        // a presenter may still hold a clone of the colour texture for an in-flight copy;
        // dropping our references lets wgpu free it once that copy completes
        drop(target.color_view);
        drop(target.color);
        target.depth.destroy();
    }

    fn bind_framebuffer(&mut self, target: &WgpuTarget) -> Result<(), RenderError> {
        self.bound = Some((target.color_view.clone(), target.depth_view.clone()));
        Ok(())
    }

    fn unbind_framebuffer(&mut self, _target: &WgpuTarget) {
        self.bound = None;
    }

    fn upload_points(&mut self, cloud: Option<&PointCloudSnapshot>) -> Result<(), RenderError> {
        self.points = None;
        let Some(cloud) = cloud.filter(|c| !c.is_empty()) else {
            return Ok(());
        };
        let positions = self.vertex_buffer("pointmesh points", cloud.positions());
        let normal_lines = cloud.normals().map(|normals| {
            let scale = cloud
                .bounds()
                .map(|b| b.half_extent().max(1e-3))
                .unwrap_or(1.0);
            let length = NORMAL_LENGTH * scale * 2.0;
            let mut lines = Vec::with_capacity(normals.len() * 2);
            for (p, n) in cloud.positions().iter().zip(normals) {
                lines.push(*p);
                lines.push([p[0] + n[0] * length, p[1] + n[1] * length, p[2] + n[2] * length]);
            }
            let count = lines.len() as u32;
            (self.vertex_buffer("pointmesh normals", &lines), count)
        });
        self.points = Some(PointBuffers {
            positions,
            count: cloud.len() as u32,
            normal_lines,
        });
        Ok(())
    }

    fn upload_mesh(&mut self, mesh: Option<&MeshSnapshot>) -> Result<(), RenderError> {
        self.mesh = None;
        let Some(mesh) = mesh.filter(|m| !m.is_empty()) else {
            return Ok(());
        };
        let zeros;
        let normals = match mesh.normals() {
            Some(normals) => normals,
            None => {
                zeros = vec![[0.0f32; 3]; mesh.vertices().len()];
                zeros.as_slice()
            }
        };
        let edges: Vec<u32> = mesh
            .indices()
            .chunks_exact(3)
            .flat_map(|t| [t[0], t[1], t[1], t[2], t[2], t[0]])
            .collect();

        self.mesh = Some(MeshBuffers {
            positions: self.vertex_buffer("pointmesh mesh positions", mesh.vertices()),
            normals: self.vertex_buffer("pointmesh mesh normals", normals),
            indices: self.index_buffer("pointmesh mesh indices", mesh.indices()),
            index_count: mesh.indices().len() as u32,
            edges: self.index_buffer("pointmesh mesh edges", &edges),
            edge_count: edges.len() as u32,
        });
        Ok(())
    }

    fn draw(&mut self, frame: &FrameParams) -> Result<(), RenderError> {
        let pipelines = self
            .pipelines
            .as_ref()
            .ok_or_else(|| RenderError::Draw("pipeline not built".to_string()))?;
        let (color_view, depth_view) = self
            .bound
            .as_ref()
            .ok_or_else(|| RenderError::Draw("no framebuffer bound".to_string()))?;

        let settings = &frame.settings;
        let slots = [
            (Slot::Points, settings.point_color, false),
            (Slot::Mesh, settings.mesh_color, true),
            (Slot::Wire, settings.wire_color, false),
            (Slot::Normals, NORMAL_COLOR, false),
        ];
        for (slot, color, lit) in slots {
            let uniforms = uniforms_for(frame, color, lit);
            self.shared.queue.write_buffer(
                &pipelines.uniforms[slot as usize],
                0,
                bytemuck::bytes_of(&uniforms),
            );
        }

        let mut encoder = self
            .shared
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("pointmesh frame"),
            });
        {
            let [r, g, b] = frame.background;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("pointmesh pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(r),
                            g: f64::from(g),
                            b: f64::from(b),
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            if let Some(mesh) = &self.mesh {
                if settings.show_mesh {
                    pass.set_pipeline(&pipelines.triangles);
                    pass.set_bind_group(0, &pipelines.bind_groups[Slot::Mesh as usize], &[]);
                    pass.set_vertex_buffer(0, mesh.positions.slice(..));
                    pass.set_vertex_buffer(1, mesh.normals.slice(..));
                    pass.set_index_buffer(mesh.indices.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..mesh.index_count, 0, 0..1);
                }
                if settings.wireframe {
                    pass.set_pipeline(&pipelines.lines);
                    pass.set_bind_group(0, &pipelines.bind_groups[Slot::Wire as usize], &[]);
                    pass.set_vertex_buffer(0, mesh.positions.slice(..));
                    pass.set_index_buffer(mesh.edges.slice(..), wgpu::IndexFormat::Uint32);
                    pass.draw_indexed(0..mesh.edge_count, 0, 0..1);
                }
            }

            if let Some(points) = &self.points {
                if settings.show_points {
                    pass.set_pipeline(&pipelines.points);
                    pass.set_bind_group(0, &pipelines.bind_groups[Slot::Points as usize], &[]);
                    pass.set_vertex_buffer(0, points.positions.slice(..));
                    pass.draw(0..points.count, 0..1);
                }
                if let (true, Some((lines, count))) = (settings.show_normals, &points.normal_lines)
                {
                    pass.set_pipeline(&pipelines.lines);
                    pass.set_bind_group(0, &pipelines.bind_groups[Slot::Normals as usize], &[]);
                    pass.set_vertex_buffer(0, lines.slice(..));
                    pass.draw(0..*count, 0..1);
                }
            }
        }
        // later submissions on the shared queue (the UI's copy) observe this frame
        self.shared.queue.submit(Some(encoder.finish()));
        Ok(())
    }
}

/// UI-side presenter that copies published frames onto a target texture.
///
/// The target must use [`COLOR_FORMAT`] and allow `COPY_DST` and `RENDER_ATTACHMENT`.
pub struct WgpuPresenter {
    shared: Arc<WgpuDevice>,
    target: wgpu::Texture,
}

impl WgpuPresenter {
    pub fn new(shared: Arc<WgpuDevice>, target: wgpu::Texture) -> Self {
        Self { shared, target }
    }

    pub fn target(&self) -> &wgpu::Texture {
        &self.target
    }

    pub fn set_target(&mut self, target: wgpu::Texture) {
        self.target = target;
    }
}

impl FramePresenter for WgpuPresenter {
    fn clear(&mut self, color: [f32; 3], _size: PixelSize) {
        let view = self
            .target
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder =
            self.shared
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("pointmesh clear"),
                });
        {
            let [r, g, b] = color;
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("pointmesh clear pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: f64::from(r),
                            g: f64::from(g),
                            b: f64::from(b),
                            a: 1.0,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                ..Default::default()
            });
        }
        self.shared.queue.submit(Some(encoder.finish()));
    }

    fn blit(&mut self, texture: TextureId, size: PixelSize) -> bool {
        let Some(source) = self.shared.texture(texture) else {
            return false;
        };
        self.copy_from(&source, size);
        true
    }
}

impl WgpuPresenter {
    /// Copy `source` onto the target. The clone keeps the texture alive until the copy
    /// has executed, even if the render thread releases its framebuffer meanwhile.
    pub fn copy_from(&mut self, source: &wgpu::Texture, size: PixelSize) {
        let extent = wgpu::Extent3d {
            width: size
                .width
                .min(source.width())
                .min(self.target.width()),
            height: size
                .height
                .min(source.height())
                .min(self.target.height()),
            depth_or_array_layers: 1,
        };
        let mut encoder =
            self.shared
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("pointmesh blit"),
                });
        encoder.copy_texture_to_texture(source.as_image_copy(), self.target.as_image_copy(), extent);
        self.shared.queue.submit(Some(encoder.finish()));
    }
}
