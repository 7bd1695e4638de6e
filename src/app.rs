use anyhow::Result;
use glam::Vec2;
use log::{info, warn};
use winit::event::{ElementState, Event, KeyEvent, MouseButton as WinitMouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{KeyCode as WinitKeyCode, PhysicalKey};

use crate::clock::Clock;
use crate::environment::{EnvironmentError, EnvironmentMap};
use crate::input::{InputState, KeyCode, MouseButton, NamedKey};
use crate::panel::ControlPanel;
use crate::render::Renderer;
use crate::render_loop::{Frame, FrameBackend, RenderLoop, Resource};
use crate::scene::SceneContext;
use crate::uniforms::UniformName;

/// Messages posted to the event loop from outside the window system.
#[derive(Debug)]
pub enum AppEvent {
    EnvironmentLoaded(Result<EnvironmentMap, EnvironmentError>),
    /// Page is going away (wasm `beforeunload`).
    Unload,
}

/// Scene state plus everything that mutates it, independent of any window.
#[derive(Debug)]
pub struct AppState {
    pub scene: SceneContext,
    pub panel: ControlPanel,
    pub input: InputState,
    pub render_loop: RenderLoop,
}

impl AppState {
    pub fn new(scene: SceneContext, clock: Clock) -> Self {
        let panel = ControlPanel::new(&scene.profile);
        Self {
            scene,
            panel,
            input: InputState::new(),
            render_loop: RenderLoop::new(clock),
        }
    }

    /// Installs a finished environment load. Failures are logged and the
    /// scene keeps rendering without image based lighting.
    pub fn apply_environment(&mut self, result: Result<EnvironmentMap, EnvironmentError>) {
        match result {
            Ok(map) => {
                info!("environment map loaded ({}x{})", map.width, map.height);
                self.scene.set_environment(map);
            }
            Err(err) => warn!("{err}; continuing without environment lighting"),
        }
    }

    /// Applies a logical resize and returns the drawing buffer size.
    pub fn resize(&mut self, width: u32, height: u32, device_pixel_ratio: f64) -> (u32, u32) {
        self.scene.resize(width, height, device_pixel_ratio);
        self.scene.viewport.render_resolution()
    }

    /// Returns whether the panel consumed the key.
    pub fn key_pressed(&mut self, key: KeyCode) -> Result<bool> {
        self.input.set_key_down(key);
        let shift = self.input.shift_held();
        let consumed = self.panel.handle_key(
            key,
            shift,
            &mut self.scene.uniforms,
            &mut self.scene.surface_material.params,
        )?;
        Ok(consumed)
    }

    pub fn key_released(&mut self, key: KeyCode) {
        self.input.set_key_up(key);
    }

    pub fn mouse_button(&mut self, button: MouseButton, pressed: bool) {
        if pressed {
            self.input.set_mouse_button_down(button);
        } else {
            self.input.set_mouse_button_up(button);
        }
    }

    /// Left drag orbits, right drag pans. `position` is in logical pixels.
    pub fn pointer_moved(&mut self, position: Vec2) {
        let delta = self.input.set_mouse_position(position);
        let height = self.scene.viewport.height as f32;
        if self.input.is_mouse_button_down(MouseButton::LEFT) {
            self.scene.controls.rotate(delta, height);
        } else if self.input.is_mouse_button_down(MouseButton::RIGHT) {
            self.scene.controls.pan(delta, height, &self.scene.camera);
        }
    }

    /// Positive `delta` zooms out.
    pub fn wheel(&mut self, delta: f32) {
        self.scene.controls.dolly(delta);
    }

    pub fn frame(&mut self, backend: &mut dyn FrameBackend) -> Result<Frame> {
        self.render_loop.tick(&mut self.scene, backend)
    }

    pub fn shutdown(&mut self, backend: &mut dyn FrameBackend) -> bool {
        self.render_loop.stop(&mut self.scene, backend)
    }

    /// `uName = value` lines for every uniform.
    pub fn uniform_report(&self) -> Vec<String> {
        UniformName::ALL
            .iter()
            .map(|name| format!("{} = {:.3}", name.as_str(), self.scene.uniforms.get(*name)))
            .collect()
    }

    /// Builds the panel window for this egui pass. Returns whether it was
    /// drawn.
    pub fn show_panel(&mut self, ctx: &egui::Context) -> Result<bool> {
        let drawn = self.panel.show(
            ctx,
            &mut self.scene.uniforms,
            &mut self.scene.surface_material.params,
        )?;
        Ok(drawn)
    }
}

/// Draws nothing; counts what the render loop asks of it.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    pub frames: u64,
    pub requests: u64,
    pub released: Vec<Resource>,
}

impl FrameBackend for HeadlessBackend {
    fn draw(&mut self, _scene: &SceneContext) -> Result<()> {
        self.frames += 1;
        Ok(())
    }

    fn request_frame(&mut self) {
        self.requests += 1;
    }

    fn release(&mut self, resource: Resource) {
        self.released.push(resource);
    }
}

const WINDOW_TITLE: &str = "Wobble Scene";

/// Window-backed application shared by the native binary and the browser.
pub struct WindowApp {
    pub state: AppState,
    renderer: Renderer,
}

impl WindowApp {
    pub fn new(state: AppState, renderer: Renderer) -> Self {
        renderer.window().request_redraw();
        Self { state, renderer }
    }

    pub fn process_event(&mut self, event: Event<AppEvent>, elwt: &ActiveEventLoop) -> Result<()> {
        match event {
            Event::WindowEvent { event, window_id } if window_id == self.renderer.window_id() => {
                self.process_window_event(event, elwt)?;
            }
            Event::UserEvent(AppEvent::EnvironmentLoaded(result)) => {
                self.state.apply_environment(result);
                self.renderer.window().request_redraw();
            }
            Event::UserEvent(AppEvent::Unload) => {
                self.shutdown();
                elwt.exit();
            }
            Event::LoopExiting => self.shutdown(),
            _ => {}
        }
        Ok(())
    }

    fn process_window_event(&mut self, event: WindowEvent, elwt: &ActiveEventLoop) -> Result<()> {
        if self.renderer.handle_overlay_event(&event) {
            return Ok(());
        }
        match event {
            WindowEvent::CloseRequested => {
                self.shutdown();
                elwt.exit();
            }
            WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. } => self.sync_size(),
            WindowEvent::KeyboardInput { event, .. } => self.handle_keyboard(&event)?,
            WindowEvent::MouseInput { state, button, .. } => {
                self.state
                    .mouse_button(map_mouse_button(button), state == ElementState::Pressed);
            }
            WindowEvent::CursorMoved { position, .. } => {
                let logical = position.to_logical::<f32>(self.renderer.window().scale_factor());
                self.state.pointer_moved(Vec2::new(logical.x, logical.y));
            }
            WindowEvent::Focused(false) => self.state.input.clear(),
            WindowEvent::MouseWheel { delta, .. } => {
                let amount = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(position) => position.y as f32,
                };
                self.state.wheel(-amount);
            }
            WindowEvent::RedrawRequested => {
                let state = &mut self.state;
                if let Some(shown) = self.renderer.run_overlay(|ctx| state.show_panel(ctx)) {
                    shown?;
                }
                self.state.frame(&mut self.renderer)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn sync_size(&mut self) {
        let window = self.renderer.window();
        let scale_factor = window.scale_factor();
        let logical = window.inner_size().to_logical::<f64>(scale_factor);
        let (width, height) = self.state.resize(
            logical.width.round() as u32,
            logical.height.round() as u32,
            scale_factor,
        );
        self.renderer.resize(width, height);
    }

    fn handle_keyboard(&mut self, event: &KeyEvent) -> Result<()> {
        let Some(key) = map_keycode(&event.physical_key) else {
            return Ok(());
        };
        if event.repeat {
            return Ok(());
        }
        match event.state {
            ElementState::Pressed => {
                self.state.key_pressed(key)?;
            }
            ElementState::Released => self.state.key_released(key),
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.state.shutdown(&mut self.renderer) {
            for line in self.state.uniform_report() {
                info!("{line}");
            }
        }
    }

    pub fn window_title() -> &'static str {
        WINDOW_TITLE
    }
}

pub fn map_mouse_button(button: WinitMouseButton) -> MouseButton {
    let index = match button {
        WinitMouseButton::Left => 0,
        WinitMouseButton::Right => 1,
        WinitMouseButton::Middle => 2,
        WinitMouseButton::Back => 3,
        WinitMouseButton::Forward => 4,
        WinitMouseButton::Other(value) => value.min(u8::MAX as u16) as u8,
    };
    MouseButton::new(index)
}

pub fn map_keycode(key: &PhysicalKey) -> Option<KeyCode> {
    let PhysicalKey::Code(code) = key else {
        return None;
    };
    use WinitKeyCode as Key;
    Some(match code {
        Key::Space => KeyCode::Named(NamedKey::Space),
        Key::Enter => KeyCode::Named(NamedKey::Enter),
        Key::Tab => KeyCode::Named(NamedKey::Tab),
        Key::ArrowLeft => KeyCode::Named(NamedKey::Left),
        Key::ArrowRight => KeyCode::Named(NamedKey::Right),
        Key::ArrowUp => KeyCode::Named(NamedKey::Up),
        Key::ArrowDown => KeyCode::Named(NamedKey::Down),
        Key::Escape => KeyCode::Named(NamedKey::Escape),
        Key::ShiftLeft => KeyCode::Named(NamedKey::LeftShift),
        Key::ShiftRight => KeyCode::Named(NamedKey::RightShift),
        Key::Digit0 => KeyCode::Digit(0),
        Key::Digit1 => KeyCode::Digit(1),
        Key::Digit2 => KeyCode::Digit(2),
        Key::Digit3 => KeyCode::Digit(3),
        Key::Digit4 => KeyCode::Digit(4),
        Key::Digit5 => KeyCode::Digit(5),
        Key::Digit6 => KeyCode::Digit(6),
        Key::Digit7 => KeyCode::Digit(7),
        Key::Digit8 => KeyCode::Digit(8),
        Key::Digit9 => KeyCode::Digit(9),
        Key::KeyA => KeyCode::Character('A'),
        Key::KeyB => KeyCode::Character('B'),
        Key::KeyC => KeyCode::Character('C'),
        Key::KeyD => KeyCode::Character('D'),
        Key::KeyE => KeyCode::Character('E'),
        Key::KeyF => KeyCode::Character('F'),
        Key::KeyG => KeyCode::Character('G'),
        Key::KeyH => KeyCode::Character('H'),
        Key::KeyI => KeyCode::Character('I'),
        Key::KeyJ => KeyCode::Character('J'),
        Key::KeyK => KeyCode::Character('K'),
        Key::KeyL => KeyCode::Character('L'),
        Key::KeyM => KeyCode::Character('M'),
        Key::KeyN => KeyCode::Character('N'),
        Key::KeyO => KeyCode::Character('O'),
        Key::KeyP => KeyCode::Character('P'),
        Key::KeyQ => KeyCode::Character('Q'),
        Key::KeyR => KeyCode::Character('R'),
        Key::KeyS => KeyCode::Character('S'),
        Key::KeyT => KeyCode::Character('T'),
        Key::KeyU => KeyCode::Character('U'),
        Key::KeyV => KeyCode::Character('V'),
        Key::KeyW => KeyCode::Character('W'),
        Key::KeyX => KeyCode::Character('X'),
        Key::KeyY => KeyCode::Character('Y'),
        Key::KeyZ => KeyCode::Character('Z'),
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceProfile;
    use crate::render_loop::RunState;

    fn state(profile: DeviceProfile) -> AppState {
        let scene = SceneContext::build(profile, 800, 600);
        AppState::new(scene, Clock::fixed_step(0.5))
    }

    #[test]
    fn failed_environment_load_leaves_scene_running() {
        let mut app = state(DeviceProfile::new(false, 2, 1.0));
        app.apply_environment(Err(EnvironmentError::Fetch("HTTP 404".into())));
        assert!(app.scene.environment().is_none());
        let mut backend = HeadlessBackend::default();
        assert!(matches!(app.frame(&mut backend).unwrap(), Frame::Drawn { .. }));
    }

    #[test]
    fn environment_load_bumps_the_revision() {
        let mut app = state(DeviceProfile::new(false, 2, 1.0));
        let before = app.scene.environment_revision();
        app.apply_environment(Ok(EnvironmentMap::uniform(glam::Vec3::ONE)));
        assert!(app.scene.environment().is_some());
        assert_eq!(app.scene.environment_revision(), before + 1);
    }

    #[test]
    fn panel_keys_edit_uniforms_with_shift_acceleration() {
        let mut app = state(DeviceProfile::new(false, 8, 1.0));
        let before = app.scene.uniforms.get(UniformName::PositionFrequency);
        assert!(app.key_pressed(KeyCode::Named(NamedKey::Right)).unwrap());
        app.key_pressed(KeyCode::Named(NamedKey::LeftShift)).unwrap();
        assert!(app.key_pressed(KeyCode::Named(NamedKey::Right)).unwrap());
        let after = app.scene.uniforms.get(UniformName::PositionFrequency);
        assert!((after - before - 0.011).abs() < 1e-5);
        assert_eq!(app.panel.selected().map(|b| b.label()), Some("uPositionFrequency"));
    }

    #[test]
    fn mobile_ignores_panel_keys() {
        let mut app = state(DeviceProfile::new(true, 8, 3.0));
        let before = app.scene.uniforms.get(UniformName::PositionFrequency);
        assert!(!app.key_pressed(KeyCode::Named(NamedKey::Right)).unwrap());
        assert!(!app.key_pressed(KeyCode::Character('H')).unwrap());
        assert_eq!(app.scene.uniforms.get(UniformName::PositionFrequency), before);
        assert!(!app.panel.is_visible());
    }

    #[test]
    fn panel_window_is_built_only_on_desktop() {
        let mut app = state(DeviceProfile::new(false, 8, 1.0));
        let ctx = egui::Context::default();
        let mut drawn = false;
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            drawn = app.show_panel(ctx).unwrap();
        });
        assert!(drawn);

        let mut mobile = state(DeviceProfile::new(true, 8, 3.0));
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            drawn = mobile.show_panel(ctx).unwrap();
        });
        assert!(!drawn);
    }

    #[test]
    fn left_drag_orbits_the_camera() {
        let mut app = state(DeviceProfile::new(false, 8, 1.0));
        let start = app.scene.camera.position;
        app.pointer_moved(Vec2::new(100.0, 100.0));
        app.mouse_button(MouseButton::LEFT, true);
        app.pointer_moved(Vec2::new(160.0, 100.0));
        app.mouse_button(MouseButton::LEFT, false);
        for _ in 0..30 {
            app.scene.update_controls();
        }
        assert_ne!(app.scene.camera.position, start);
        let distance = app.scene.camera.distance();
        assert!((distance - start.length()).abs() < 1e-3);
    }

    #[test]
    fn resize_reports_the_capped_drawing_buffer() {
        let mut app = state(DeviceProfile::new(true, 8, 3.0));
        assert_eq!(app.scene.viewport.pixel_ratio, 1.0);
        // Resizes cap at 2 on every tier; the mobile cap of 1 is startup only.
        assert_eq!(app.resize(400, 800, 3.0), (800, 1600));
        assert!((app.scene.camera.aspect - 0.5).abs() < 1e-6);
        assert_eq!(app.resize(400, 800, 1.0), (400, 800));
    }

    #[test]
    fn shutdown_runs_once_and_stops_ticking() {
        let mut app = state(DeviceProfile::new(false, 8, 1.0));
        let mut backend = HeadlessBackend::default();
        app.frame(&mut backend).unwrap();
        assert!(app.shutdown(&mut backend));
        assert!(!app.shutdown(&mut backend));
        assert_eq!(backend.released, Resource::TEARDOWN_ORDER.to_vec());
        assert_eq!(app.frame(&mut backend).unwrap(), Frame::Stopped);
        assert_eq!(backend.frames, 1);
        assert_eq!(app.render_loop.state(), RunState::Stopped);
    }

    #[test]
    fn uniform_report_lists_every_uniform_in_order() {
        let app = state(DeviceProfile::new(false, 8, 1.0));
        let report = app.uniform_report();
        assert_eq!(report.len(), UniformName::ALL.len());
        assert!(report[0].starts_with("uTime = "));
        assert!(report[6].starts_with("uWarpStrength = "));
    }

    #[test]
    fn keycodes_map_from_physical_keys() {
        assert_eq!(
            map_keycode(&PhysicalKey::Code(WinitKeyCode::KeyH)),
            Some(KeyCode::Character('H'))
        );
        assert_eq!(
            map_keycode(&PhysicalKey::Code(WinitKeyCode::ArrowLeft)),
            Some(KeyCode::Named(NamedKey::Left))
        );
        assert_eq!(map_keycode(&PhysicalKey::Code(WinitKeyCode::F13)), None);
    }
}
