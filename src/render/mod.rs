pub mod common;
pub mod gpu;
pub mod overlay;
pub mod shaders;

pub use common::GlobalUniform;
pub use gpu::Renderer;
pub use overlay::UiOverlay;
pub use shaders::ShaderProgram;
