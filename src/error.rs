use thiserror::Error;

/// Failures raised while bringing up or driving the GPU renderer.
///
/// Every variant except [`RenderError::Frame`] is fatal at startup: the scene
/// is never partially rendered.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("no usable rendering backend: {0}")]
    UnsupportedBackend(String),
    #[error("failed to create GPU device: {0}")]
    Device(String),
    #[error("shader program `{program}` failed to compile: {message}")]
    ShaderCompilation { program: &'static str, message: String },
    #[error("window has zero area")]
    ZeroSizedSurface,
    #[error("frame could not be presented: {0}")]
    Frame(String),
}

/// Invalid names or values handed to the uniform store, panel or CLI.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("unknown uniform `{0}`")]
    UnknownUniform(String),
    #[error("unknown panel binding `{0}`")]
    UnknownBinding(String),
    #[error("binding `{0}` is read-only")]
    ReadOnly(String),
    #[error("binding `{0}` does not hold a colour")]
    NotAColor(String),
    #[error("invalid colour `{0}`, expected #rrggbb")]
    InvalidColor(String),
    #[error("control panel is not available on this device")]
    PanelUnavailable,
}
