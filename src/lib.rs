//! Real-time scene of a noise-displaced icosahedron floating over a shadow
//! receiving floor.
//!
//! Everything the scene owns lives in [`SceneContext`]; the render loop,
//! control panel and event handlers borrow it. The GPU side lives in
//! [`render`] and is the only module that needs a window, so the rest of
//! the crate runs headless in tools and tests.

pub mod app;
pub mod camera;
pub mod clock;
pub mod controls;
pub mod device;
pub mod displacement;
pub mod environment;
pub mod error;
pub mod geometry;
pub mod input;
pub mod material;
pub mod noise;
pub mod panel;
pub mod render;
pub mod render_loop;
pub mod scene;
pub mod uniforms;
pub mod viewport;
#[cfg(target_arch = "wasm32")]
pub mod web;

pub use app::{AppEvent, AppState, HeadlessBackend, WindowApp};
pub use clock::Clock;
pub use device::DeviceProfile;
pub use environment::{EnvironmentError, EnvironmentMap};
pub use error::{ConfigError, RenderError};
pub use input::{InputState, KeyCode, MouseButton, NamedKey};
pub use panel::ControlPanel;
pub use render::Renderer;
pub use render_loop::{Frame, FrameBackend, RenderLoop, Resource, RunState};
pub use scene::SceneContext;
pub use uniforms::{UniformName, UniformStore};
