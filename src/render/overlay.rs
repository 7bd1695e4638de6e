//! egui drawn over the finished scene.
//!
//! A pass runs in two halves: [`UiOverlay::run`] feeds winit input to egui,
//! builds the UI and tessellates it on the CPU, then [`UiOverlay::draw`]
//! uploads the result and records one extra render pass that loads the
//! scene's colour target instead of clearing it.

use winit::event::{ElementState, WindowEvent};
use winit::window::Window;

pub struct UiOverlay {
    context: egui::Context,
    state: egui_winit::State,
    renderer: egui_wgpu::Renderer,
    primitives: Vec<egui::ClippedPrimitive>,
    textures_delta: egui::TexturesDelta,
}

impl UiOverlay {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat, window: &Window) -> Self {
        let context = egui::Context::default();
        let viewport = context.viewport_id();
        let state = egui_winit::State::new(context.clone(), viewport, window, None, None, None);
        let renderer = egui_wgpu::Renderer::new(device, format, egui_wgpu::RendererOptions::default());
        Self {
            context,
            state,
            renderer,
            primitives: Vec::new(),
            textures_delta: egui::TexturesDelta::default(),
        }
    }

    /// Forwards `event` to egui and returns whether egui consumed it.
    ///
    /// Button releases are never reported as consumed so an orbit drag that
    /// ends over the panel still ends.
    pub fn handle_event(&mut self, window: &Window, event: &WindowEvent) -> bool {
        let response = self.state.on_window_event(window, event);
        if let WindowEvent::MouseInput {
            state: ElementState::Released,
            ..
        } = event
        {
            return false;
        }
        response.consumed
    }

    /// Runs one egui pass with `build` and keeps the tessellated output for
    /// the next [`UiOverlay::draw`].
    pub fn run<R>(&mut self, window: &Window, build: impl FnOnce(&egui::Context) -> R) -> R {
        let raw_input = self.state.take_egui_input(window);
        self.context.begin_pass(raw_input);
        let result = build(&self.context);
        let egui::FullOutput {
            shapes,
            textures_delta,
            platform_output,
            pixels_per_point,
            ..
        } = self.context.end_pass();
        self.state.handle_platform_output(window, platform_output);
        // Deltas from a pass whose frame was skipped still have to land.
        self.textures_delta.append(textures_delta);
        self.primitives = self.context.tessellate(shapes, pixels_per_point);
        result
    }

    /// Records the overlay into `encoder` on top of `target`. Returns the
    /// command buffers egui needs submitted ahead of `encoder`.
    pub fn draw(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        screen: &egui_wgpu::ScreenDescriptor,
    ) -> Vec<wgpu::CommandBuffer> {
        for (id, delta) in &self.textures_delta.set {
            self.renderer.update_texture(device, queue, *id, delta);
        }
        let command_buffers = self
            .renderer
            .update_buffers(device, queue, encoder, &self.primitives, screen);

        {
            let mut pass = encoder
                .begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("overlay-pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: target,
                        depth_slice: None,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                })
                .forget_lifetime();
            self.renderer.render(&mut pass, &self.primitives, screen);
        }

        for id in &self.textures_delta.free {
            self.renderer.free_texture(id);
        }
        self.textures_delta.set.clear();
        self.textures_delta.free.clear();
        command_buffers
    }
}
