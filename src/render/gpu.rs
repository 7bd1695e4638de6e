use std::num::NonZeroU64;
use std::sync::Arc;

use bytemuck::bytes_of;
use log::{debug, warn};
use wgpu::util::DeviceExt;
use winit::event::WindowEvent;
use winit::window::{Window, WindowId};

use crate::environment::EnvironmentMap;
use crate::error::RenderError;
use crate::geometry::{Geometry, VertexLayout};
use crate::material::{DepthMaterial, MaterialKind, MaterialUniform};
use crate::render::common::{plane_vertex_layout, wobble_vertex_layout, GlobalUniform};
use crate::render::overlay::UiOverlay;
use crate::render::shaders::{self, ShaderProgram};
use crate::render_loop::{FrameBackend, Resource};
use crate::scene::{Mesh, SceneContext};
use crate::uniforms::WobbleUniform;

/// GPU renderer backed by wgpu: shadow pass, background, floor, wobble and
/// the egui panel overlay.
pub struct Renderer {
    window: Arc<Window>,
    gpu: Option<GpuState>,
}

struct GpuState {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth: DepthBuffer,
    shadow_map: ShadowMap,
    globals_buffer: wgpu::Buffer,
    scene_layout: wgpu::BindGroupLayout,
    scene_bind_group: wgpu::BindGroup,
    shadow_bind_group: wgpu::BindGroup,
    env_sampler: wgpu::Sampler,
    shadow_sampler: wgpu::Sampler,
    environment: EnvironmentTexture,
    environment_revision: u64,
    /// A scene map is uploaded; until then the placeholder is bound.
    environment_bound: bool,
    background_pipeline: wgpu::RenderPipeline,
    static_depth_pipeline: wgpu::RenderPipeline,
    plane: MaterialResources,
    plane_mesh: MeshBuffers,
    wobble_uniforms: wgpu::Buffer,
    wobble_mesh: Option<MeshBuffers>,
    surface_material: Option<MaterialResources>,
    depth_material: Option<DepthMaterialResources>,
    /// Absent on devices without a control panel.
    overlay: Option<UiOverlay>,
}

impl Renderer {
    /// Creates the surface, device and every pipeline for `scene`.
    ///
    /// Shader and pipeline validation failures are reported as
    /// [`RenderError::ShaderCompilation`]; nothing is drawn in that case.
    pub async fn new(window: Arc<Window>, scene: &SceneContext) -> Result<Self, RenderError> {
        let (width, height) = scene.viewport.render_resolution();
        if width == 0 || height == 0 {
            return Err(RenderError::ZeroSizedSurface);
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: preferred_backends(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: Default::default(),
            backend_options: Default::default(),
        });
        let surface = instance
            .create_surface(Arc::clone(&window))
            .map_err(|err| RenderError::UnsupportedBackend(err.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| RenderError::UnsupportedBackend(err.to_string()))?;
        debug!("using adapter {:?}", adapter.get_info());

        let device_descriptor = wgpu::DeviceDescriptor {
            label: Some("renderer-device"),
            required_features: wgpu::Features::empty(),
            required_limits: required_limits(&adapter),
            experimental_features: Default::default(),
            memory_hints: Default::default(),
            trace: Default::default(),
        };
        let (device, queue) = adapter
            .request_device(&device_descriptor)
            .await
            .map_err(|err| RenderError::Device(err.to_string()))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| RenderError::UnsupportedBackend("surface reports no formats".into()))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, width, height);
        let shadow_map = ShadowMap::create(&device, scene.light.shadow.map_size);

        let globals_entry = wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
            ty: uniform_binding::<GlobalUniform>(),
            count: None,
        };
        let scene_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("scene-bind-layout"),
            entries: &[
                globals_entry,
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });
        // The shadow pass must not bind the map it renders into.
        let shadow_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("shadow-bind-layout"),
            entries: &[globals_entry],
        });
        let object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object-bind-layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: uniform_binding::<WobbleUniform>(),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: uniform_binding::<MaterialUniform>(),
                    count: None,
                },
            ],
        });
        let depth_object_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("depth-object-bind-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: uniform_binding::<WobbleUniform>(),
                count: None,
            }],
        });

        let globals_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("global-uniform"),
            size: std::mem::size_of::<GlobalUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let wobble_uniforms = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("wobble-uniform"),
            contents: bytes_of(&scene.uniforms.to_gpu()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow-sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        let env_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("environment-sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let environment = EnvironmentTexture::placeholder(&device, &queue);

        let scene_bind_group = create_scene_bind_group(
            &device,
            &scene_layout,
            &globals_buffer,
            &shadow_map,
            &shadow_sampler,
            &environment,
            &env_sampler,
        );
        let shadow_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow-bind-group"),
            layout: &shadow_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: globals_buffer.as_entire_binding(),
            }],
        });

        let main_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("main-pipeline-layout"),
            bind_group_layouts: &[&scene_layout, &object_layout],
            push_constant_ranges: &[],
        });
        let shadow_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("shadow-pipeline-layout"),
            bind_group_layouts: &[&shadow_layout, &depth_object_layout],
            push_constant_ranges: &[],
        });
        let static_shadow_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("static-shadow-pipeline-layout"),
            bind_group_layouts: &[&shadow_layout],
            push_constant_ranges: &[],
        });

        let surface_pipeline = build_color_pipeline(
            &device,
            &shaders::surface_program(),
            &main_layout,
            Some(wobble_vertex_layout()),
            surface_format,
            ColorPass::Opaque {
                cull_mode: Some(wgpu::Face::Back),
            },
        )
        .await?;
        let plane_pipeline = build_color_pipeline(
            &device,
            &shaders::plane_program(),
            &main_layout,
            Some(plane_vertex_layout()),
            surface_format,
            ColorPass::Opaque { cull_mode: None },
        )
        .await?;
        let background_pipeline = build_color_pipeline(
            &device,
            &shaders::background_program(),
            &main_layout,
            None,
            surface_format,
            ColorPass::Background,
        )
        .await?;
        let depth_pipeline = build_depth_pipeline(
            &device,
            &shaders::depth_program(),
            &shadow_pipeline_layout,
            wobble_vertex_layout(),
            &scene.depth_material,
        )
        .await?;
        let static_depth_pipeline = build_depth_pipeline(
            &device,
            &shaders::static_depth_program(),
            &static_shadow_pipeline_layout,
            plane_vertex_layout(),
            &scene.depth_material,
        )
        .await?;

        let surface_material = MaterialResources::create(
            &device,
            &object_layout,
            &wobble_uniforms,
            surface_pipeline,
            &scene.wobble_material_uniform(),
            "wobble",
        );
        let plane = MaterialResources::create(
            &device,
            &object_layout,
            &wobble_uniforms,
            plane_pipeline,
            &scene.plane_material_uniform(),
            "plane",
        );
        let depth_material = DepthMaterialResources {
            pipeline: depth_pipeline,
            bind_group: device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("depth-object-bind-group"),
                layout: &depth_object_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wobble_uniforms.as_entire_binding(),
                }],
            }),
        };

        let wobble_mesh = MeshBuffers::from_mesh(&device, &scene.wobble, VertexLayout::PositionNormalTangent)?;
        let plane_mesh = MeshBuffers::from_mesh(&device, &scene.plane, VertexLayout::PositionNormal)?;
        let overlay = scene
            .profile
            .panel_visible()
            .then(|| UiOverlay::new(&device, surface_format, &window));

        Ok(Self {
            window,
            gpu: Some(GpuState {
                surface,
                device,
                queue,
                config,
                depth,
                shadow_map,
                globals_buffer,
                scene_layout,
                scene_bind_group,
                shadow_bind_group,
                env_sampler,
                shadow_sampler,
                environment,
                environment_revision: 0,
                environment_bound: false,
                background_pipeline,
                static_depth_pipeline,
                plane,
                plane_mesh,
                wobble_uniforms,
                wobble_mesh: Some(wobble_mesh),
                surface_material: Some(surface_material),
                depth_material: Some(depth_material),
                overlay,
            }),
        })
    }

    /// Returns the identifier of the window owned by the renderer.
    pub fn window_id(&self) -> WindowId {
        self.window.id()
    }

    /// Exposes the inner window for event handling.
    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Forwards a window event to the overlay. Returns whether the panel
    /// consumed it, in which case the scene must not react to it.
    pub fn handle_overlay_event(&mut self, event: &WindowEvent) -> bool {
        match self.gpu.as_mut().and_then(|gpu| gpu.overlay.as_mut()) {
            Some(overlay) => overlay.handle_event(&self.window, event),
            None => false,
        }
    }

    /// Runs one overlay pass with `build`; drawn with the next frame.
    /// Returns `None` when there is no overlay.
    pub fn run_overlay<R>(&mut self, build: impl FnOnce(&egui::Context) -> R) -> Option<R> {
        let overlay = self.gpu.as_mut()?.overlay.as_mut()?;
        Some(overlay.run(&self.window, build))
    }

    /// Resizes the swap chain and depth buffer to a drawing buffer of
    /// `width` x `height` physical pixels.
    pub fn resize(&mut self, width: u32, height: u32) {
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };
        if width == 0 || height == 0 {
            return;
        }
        gpu.config.width = width;
        gpu.config.height = height;
        gpu.surface.configure(&gpu.device, &gpu.config);
        gpu.depth = DepthBuffer::create(&gpu.device, width, height);
    }

    /// Draws one frame of `scene`.
    pub fn render(&mut self, scene: &SceneContext) -> Result<(), RenderError> {
        let Some(gpu) = self.gpu.as_mut() else {
            return Ok(());
        };
        gpu.sync_environment(scene);
        gpu.write_uniforms(scene);

        let output = match gpu.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                gpu.surface.configure(&gpu.device, &gpu.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(RenderError::Frame("GPU is out of memory".into()));
            }
            Err(wgpu::SurfaceError::Timeout) => {
                debug!("surface timeout; retrying next frame");
                return Ok(());
            }
            Err(wgpu::SurfaceError::Other) => {
                warn!("surface reported an unknown error; retrying next frame");
                return Ok(());
            }
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = gpu
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("renderer-encoder"),
            });

        {
            // Runs even without casters so the map is cleared.
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shadow-pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &gpu.shadow_map.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_bind_group(0, &gpu.shadow_bind_group, &[]);
            for caster in scene.shadow_casters() {
                match caster.material {
                    MaterialKind::Wobble => {
                        if let (Some(mesh), Some(depth_material)) = (&gpu.wobble_mesh, &gpu.depth_material) {
                            pass.set_pipeline(&depth_material.pipeline);
                            pass.set_bind_group(1, &depth_material.bind_group, &[]);
                            mesh.draw(&mut pass);
                        }
                    }
                    MaterialKind::Standard => {
                        pass.set_pipeline(&gpu.static_depth_pipeline);
                        gpu.plane_mesh.draw(&mut pass);
                    }
                }
            }
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("main-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &gpu.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_bind_group(0, &gpu.scene_bind_group, &[]);

            if gpu.environment_bound {
                pass.set_pipeline(&gpu.background_pipeline);
                pass.set_bind_group(1, &gpu.plane.bind_group, &[]);
                pass.draw(0..3, 0..1);
            }

            pass.set_pipeline(&gpu.plane.pipeline);
            pass.set_bind_group(1, &gpu.plane.bind_group, &[]);
            gpu.plane_mesh.draw(&mut pass);

            if let (Some(mesh), Some(material)) = (&gpu.wobble_mesh, &gpu.surface_material) {
                pass.set_pipeline(&material.pipeline);
                pass.set_bind_group(1, &material.bind_group, &[]);
                mesh.draw(&mut pass);
            }
        }

        let mut command_buffers = Vec::new();
        if let Some(overlay) = gpu.overlay.as_mut() {
            let screen = egui_wgpu::ScreenDescriptor {
                size_in_pixels: [gpu.config.width, gpu.config.height],
                pixels_per_point: scene.viewport.pixel_ratio as f32,
            };
            command_buffers = overlay.draw(&gpu.device, &gpu.queue, &mut encoder, &view, &screen);
        }
        command_buffers.push(encoder.finish());
        gpu.queue.submit(command_buffers);
        output.present();
        Ok(())
    }

    /// Drops the GPU objects behind `resource`.
    pub fn release(&mut self, resource: Resource) {
        if resource == Resource::Renderer {
            self.gpu = None;
        } else if let Some(gpu) = self.gpu.as_mut() {
            match resource {
                Resource::WobbleGeometry => gpu.wobble_mesh = None,
                Resource::SurfaceMaterial => gpu.surface_material = None,
                Resource::DepthMaterial => gpu.depth_material = None,
                Resource::Renderer | Resource::Controls => {}
            }
        }
        debug!("released {resource:?}");
    }
}

impl FrameBackend for Renderer {
    fn draw(&mut self, scene: &SceneContext) -> anyhow::Result<()> {
        self.render(scene)?;
        Ok(())
    }

    fn request_frame(&mut self) {
        self.window.request_redraw();
    }

    fn release(&mut self, resource: Resource) {
        Renderer::release(self, resource);
    }
}

impl GpuState {
    fn write_uniforms(&self, scene: &SceneContext) {
        let environment_mips = self.environment_bound.then_some(self.environment.mip_levels);
        let globals = GlobalUniform::from_scene(scene, environment_mips);
        self.queue
            .write_buffer(&self.globals_buffer, 0, bytes_of(&globals));
        self.queue
            .write_buffer(&self.wobble_uniforms, 0, bytes_of(&scene.uniforms.to_gpu()));
        if let Some(material) = &self.surface_material {
            self.queue.write_buffer(
                &material.material_buffer,
                0,
                bytes_of(&scene.wobble_material_uniform()),
            );
        }
        self.queue.write_buffer(
            &self.plane.material_buffer,
            0,
            bytes_of(&scene.plane_material_uniform()),
        );
    }

    fn sync_environment(&mut self, scene: &SceneContext) {
        if scene.environment_revision() == self.environment_revision {
            return;
        }
        self.environment_revision = scene.environment_revision();
        let Some(map) = scene.environment() else {
            return;
        };
        let max_dimension = self.device.limits().max_texture_dimension_2d;
        if let Err(err) = map.check_fits(max_dimension) {
            warn!("{err}; continuing without environment lighting");
            return;
        }
        self.environment = EnvironmentTexture::upload(&self.device, &self.queue, map);
        self.environment_bound = true;
        self.scene_bind_group = create_scene_bind_group(
            &self.device,
            &self.scene_layout,
            &self.globals_buffer,
            &self.shadow_map,
            &self.shadow_sampler,
            &self.environment,
            &self.env_sampler,
        );
        debug!(
            "uploaded environment map with {} mip level(s)",
            self.environment.mip_levels
        );
    }
}

#[cfg(target_arch = "wasm32")]
fn preferred_backends() -> wgpu::Backends {
    wgpu::Backends::GL
}

#[cfg(not(target_arch = "wasm32"))]
fn preferred_backends() -> wgpu::Backends {
    wgpu::Backends::PRIMARY
}

#[cfg(target_arch = "wasm32")]
fn required_limits(adapter: &wgpu::Adapter) -> wgpu::Limits {
    wgpu::Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits())
}

#[cfg(not(target_arch = "wasm32"))]
fn required_limits(adapter: &wgpu::Adapter) -> wgpu::Limits {
    wgpu::Limits::default().using_resolution(adapter.limits())
}

fn uniform_binding<T>() -> wgpu::BindingType {
    wgpu::BindingType::Buffer {
        ty: wgpu::BufferBindingType::Uniform,
        has_dynamic_offset: false,
        min_binding_size: NonZeroU64::new(std::mem::size_of::<T>() as u64),
    }
}

fn create_scene_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    globals: &wgpu::Buffer,
    shadow_map: &ShadowMap,
    shadow_sampler: &wgpu::Sampler,
    environment: &EnvironmentTexture,
    env_sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("scene-bind-group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: globals.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&shadow_map.view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(shadow_sampler),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(&environment.view),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: wgpu::BindingResource::Sampler(env_sampler),
            },
        ],
    })
}

/// Runs `build` inside a validation error scope and reports anything it
/// raised against `program`.
async fn validated<T>(
    device: &wgpu::Device,
    program: &'static str,
    build: impl FnOnce() -> T,
) -> Result<T, RenderError> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = build();
    match device.pop_error_scope().await {
        Some(err) => Err(RenderError::ShaderCompilation {
            program,
            message: err.to_string(),
        }),
        None => Ok(value),
    }
}

enum ColorPass {
    Opaque { cull_mode: Option<wgpu::Face> },
    /// Fullscreen, behind everything, no depth writes.
    Background,
}

async fn build_color_pipeline(
    device: &wgpu::Device,
    program: &ShaderProgram,
    layout: &wgpu::PipelineLayout,
    vertex_layout: Option<wgpu::VertexBufferLayout<'static>>,
    format: wgpu::TextureFormat,
    pass: ColorPass,
) -> Result<wgpu::RenderPipeline, RenderError> {
    let fragment_entry = program.fragment_entry.ok_or(RenderError::ShaderCompilation {
        program: program.name,
        message: "program has no fragment stage".into(),
    })?;
    validated(device, program.name, || {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(program.name),
            source: wgpu::ShaderSource::Wgsl(program.source.as_str().into()),
        });
        let buffers: Vec<wgpu::VertexBufferLayout<'static>> = vertex_layout.into_iter().collect();
        let (cull_mode, depth_write_enabled, depth_compare) = match pass {
            ColorPass::Opaque { cull_mode } => (cull_mode, true, wgpu::CompareFunction::Less),
            ColorPass::Background => (None, false, wgpu::CompareFunction::Always),
        };
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(program.name),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some(program.vertex_entry),
                compilation_options: Default::default(),
                buffers: &buffers,
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DepthBuffer::FORMAT,
                depth_write_enabled,
                depth_compare,
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some(fragment_entry),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
            cache: None,
        })
    })
    .await
}

/// Depth-only pipeline rasterizing casters into the shadow map with no
/// fragment stage, biased as `material` says.
async fn build_depth_pipeline(
    device: &wgpu::Device,
    program: &ShaderProgram,
    layout: &wgpu::PipelineLayout,
    vertex_layout: wgpu::VertexBufferLayout<'static>,
    material: &DepthMaterial,
) -> Result<wgpu::RenderPipeline, RenderError> {
    validated(device, program.name, || {
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(program.name),
            source: wgpu::ShaderSource::Wgsl(program.source.as_str().into()),
        });
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(program.name),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some(program.vertex_entry),
                compilation_options: Default::default(),
                buffers: &[vertex_layout],
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: ShadowMap::FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: Default::default(),
                bias: wgpu::DepthBiasState {
                    constant: material.bias_constant,
                    slope_scale: material.bias_slope_scale,
                    clamp: 0.0,
                },
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: None,
            multiview: None,
            cache: None,
        })
    })
    .await
}

struct MaterialResources {
    pipeline: wgpu::RenderPipeline,
    material_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl MaterialResources {
    fn create(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        wobble_uniforms: &wgpu::Buffer,
        pipeline: wgpu::RenderPipeline,
        material: &MaterialUniform,
        label: &str,
    ) -> Self {
        let material_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label}-material")),
            contents: bytes_of(material),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label}-bind-group")),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wobble_uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: material_buffer.as_entire_binding(),
                },
            ],
        });
        Self {
            pipeline,
            material_buffer,
            bind_group,
        }
    }
}

struct DepthMaterialResources {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
}

struct MeshBuffers {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn from_mesh(device: &wgpu::Device, mesh: &Mesh, layout: VertexLayout) -> Result<Self, RenderError> {
        let geometry: &Geometry = &mesh.geometry;
        let vertices = geometry
            .vertex_data(layout)
            .map_err(|err| RenderError::Device(format!("{}: {err}", mesh.name)))?;
        let indices = geometry
            .index_data()
            .map_err(|err| RenderError::Device(format!("{}: {err}", mesh.name)))?;
        let vertex = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{}-vertices", mesh.name)),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{}-indices", mesh.name)),
            contents: bytemuck::cast_slice(indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Ok(Self {
            vertex,
            index,
            index_count: indices.len() as u32,
        })
    }

    fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex.slice(..));
        pass.set_index_buffer(self.index.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

struct ShadowMap {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl ShadowMap {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    fn create(device: &wgpu::Device, size: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("shadow-map"),
            size: wgpu::Extent3d {
                width: size.max(1),
                height: size.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

struct EnvironmentTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    mip_levels: u32,
}

impl EnvironmentTexture {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

    /// Black 1x1 stand-in bound until the real map arrives.
    fn placeholder(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self::upload(device, queue, &EnvironmentMap::uniform(glam::Vec3::ZERO))
    }

    fn upload(device: &wgpu::Device, queue: &wgpu::Queue, map: &EnvironmentMap) -> Self {
        let levels = map.mip_chain();
        let mip_levels = levels.len() as u32;
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("environment-map"),
            size: wgpu::Extent3d {
                width: map.width,
                height: map.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: mip_levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        for (mip_level, level) in levels.iter().enumerate() {
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: mip_level as u32,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                level.as_bytes(),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(level.bytes_per_row()),
                    rows_per_image: Some(level.height),
                },
                wgpu::Extent3d {
                    width: level.width,
                    height: level.height,
                    depth_or_array_layers: 1,
                },
            );
        }
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
            mip_levels,
        }
    }
}
