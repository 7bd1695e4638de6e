use anyhow::Result;

use crate::clock::Clock;
use crate::scene::SceneContext;

/// Resources handed back at teardown, in release order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resource {
    WobbleGeometry,
    SurfaceMaterial,
    DepthMaterial,
    Renderer,
    Controls,
}

impl Resource {
    pub const TEARDOWN_ORDER: [Resource; 5] = [
        Resource::WobbleGeometry,
        Resource::SurfaceMaterial,
        Resource::DepthMaterial,
        Resource::Renderer,
        Resource::Controls,
    ];
}

/// What the render loop draws with. The GPU renderer implements it for real
/// frames; headless runs and tests substitute their own.
pub trait FrameBackend {
    /// Draws exactly one frame of `scene`.
    fn draw(&mut self, scene: &SceneContext) -> Result<()>;

    /// Asks the host to schedule the next tick.
    fn request_frame(&mut self);

    /// Frees whatever the backend holds for `resource`.
    fn release(&mut self, resource: Resource);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Frame {
    Drawn { elapsed: f32 },
    Stopped,
}

/// Drives one draw per host frame until stopped.
#[derive(Debug)]
pub struct RenderLoop {
    clock: Clock,
    state: RunState,
    frames: u64,
}

impl RenderLoop {
    pub fn new(clock: Clock) -> Self {
        Self {
            clock,
            state: RunState::Running,
            frames: 0,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Advances time, steps the controls, draws once and schedules the next
    /// frame. Does nothing once stopped.
    pub fn tick(&mut self, scene: &mut SceneContext, backend: &mut dyn FrameBackend) -> Result<Frame> {
        if self.state == RunState::Stopped {
            return Ok(Frame::Stopped);
        }
        let elapsed = self.clock.elapsed();
        scene.uniforms.set_time(elapsed);
        scene.update_controls();
        backend.draw(scene)?;
        self.frames += 1;
        backend.request_frame();
        Ok(Frame::Drawn { elapsed })
    }

    /// Stops the loop and releases every resource once. Returns `false`
    /// when the loop was already stopped.
    pub fn stop(&mut self, scene: &mut SceneContext, backend: &mut dyn FrameBackend) -> bool {
        if self.state == RunState::Stopped {
            return false;
        }
        self.state = RunState::Stopped;
        for resource in Resource::TEARDOWN_ORDER {
            if resource == Resource::Controls && !scene.controls.dispose() {
                continue;
            }
            backend.release(resource);
        }
        log::info!("render loop stopped after {} frame(s)", self.frames);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceProfile;
    use crate::scene::SceneContext;

    #[derive(Default)]
    struct Recording {
        draws: Vec<f32>,
        requests: usize,
        released: Vec<Resource>,
    }

    impl FrameBackend for Recording {
        fn draw(&mut self, scene: &SceneContext) -> Result<()> {
            self.draws.push(scene.uniforms.time);
            Ok(())
        }

        fn request_frame(&mut self) {
            self.requests += 1;
        }

        fn release(&mut self, resource: Resource) {
            self.released.push(resource);
        }
    }

    fn scene() -> SceneContext {
        SceneContext::build(DeviceProfile::new(true, 2, 1.0), 320, 240)
    }

    #[test]
    fn each_tick_sets_time_and_draws_once() {
        let mut scene = scene();
        let mut backend = Recording::default();
        let mut render_loop = RenderLoop::new(Clock::fixed_step(0.5));

        assert_eq!(
            render_loop.tick(&mut scene, &mut backend).unwrap(),
            Frame::Drawn { elapsed: 0.5 }
        );
        render_loop.tick(&mut scene, &mut backend).unwrap();
        assert_eq!(backend.draws, vec![0.5, 1.0]);
        assert_eq!(backend.requests, 2);
        assert_eq!(scene.uniforms.time, 1.0);
        assert_eq!(render_loop.frames(), 2);
    }

    #[test]
    fn ticks_only_touch_time() {
        let mut scene = scene();
        let before = scene.uniforms;
        let mut render_loop = RenderLoop::new(Clock::fixed_step(0.1));
        render_loop.tick(&mut scene, &mut Recording::default()).unwrap();
        let mut expected = before;
        expected.time = scene.uniforms.time;
        assert_eq!(scene.uniforms, expected);
    }

    #[test]
    fn stop_releases_everything_exactly_once() {
        let mut scene = scene();
        let mut backend = Recording::default();
        let mut render_loop = RenderLoop::new(Clock::fixed_step(0.1));
        render_loop.tick(&mut scene, &mut backend).unwrap();

        assert!(render_loop.stop(&mut scene, &mut backend));
        assert!(!render_loop.stop(&mut scene, &mut backend));
        assert_eq!(backend.released, Resource::TEARDOWN_ORDER.to_vec());
        assert!(scene.controls.is_disposed());
        assert_eq!(render_loop.state(), RunState::Stopped);
    }

    #[test]
    fn no_frame_after_stop() {
        let mut scene = scene();
        let mut backend = Recording::default();
        let mut render_loop = RenderLoop::new(Clock::fixed_step(0.1));
        render_loop.stop(&mut scene, &mut backend);
        assert_eq!(render_loop.tick(&mut scene, &mut backend).unwrap(), Frame::Stopped);
        assert!(backend.draws.is_empty());
        assert_eq!(backend.requests, 0);
    }
}
