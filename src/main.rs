//! Native entry point. The browser build starts from `wobble_scene::web::run`
//! instead, so everything here is desktop only.

#[cfg(not(target_arch = "wasm32"))]
fn main() {
    env_logger::init();
    if let Err(err) = desktop::run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
mod desktop {
    use std::any::Any;
    use std::env;
    use std::fmt;
    use std::panic::{self, AssertUnwindSafe};
    use std::path::PathBuf;
    use std::sync::Arc;

    use anyhow::{anyhow, Context, Result};
    use pollster::block_on;
    use winit::dpi::LogicalSize;
    use winit::event_loop::EventLoop;
    use winit::window::Window;

    use wobble_scene::environment;
    use wobble_scene::{
        AppEvent, AppState, Clock, DeviceProfile, HeadlessBackend, Renderer, SceneContext, WindowApp,
    };

    const DEFAULT_ENV_MAP: &str = "assets/urban_alley_01_1k.hdr";
    const WINDOW_WIDTH: u32 = 1280;
    const WINDOW_HEIGHT: u32 = 720;
    const HEADLESS_STEP: f64 = 1.0 / 60.0;

    pub fn run() -> Result<()> {
        let options = CliOptions::parse(env::args().skip(1))?;
        if options.summary_only {
            return run_headless(&options);
        }
        match run_interactive(&options) {
            Ok(()) => Ok(()),
            Err(err) if err.downcast_ref::<WindowInitError>().is_some() => {
                eprintln!(
                    "{err}. Falling back to --summary-only mode (set DISPLAY or install X11 libs to enable rendering)."
                );
                run_headless(&options)
            }
            Err(err) => Err(err),
        }
    }

    fn run_headless(options: &CliOptions) -> Result<()> {
        let scene = SceneContext::build(options.profile(1.0), WINDOW_WIDTH, WINDOW_HEIGHT);
        let mut app = AppState::new(scene, Clock::fixed_step(HEADLESS_STEP));
        if let Some(path) = &options.env_map {
            app.apply_environment(environment::load_file(path));
        }

        for line in app.scene.summary() {
            println!("{line}");
        }

        let mut backend = HeadlessBackend::default();
        for _ in 0..options.frames {
            app.frame(&mut backend).context("headless frame failed")?;
        }
        println!("Ran {} frame(s)", backend.frames);

        let (min, max) = app.scene.wobble_range();
        println!("Wobble displacement: min {min:.3}, max {max:.3}");
        println!("Final uniforms:");
        for line in app.uniform_report() {
            println!(" - {line}");
        }
        app.shutdown(&mut backend);
        Ok(())
    }

    fn run_interactive(options: &CliOptions) -> Result<()> {
        let default_hook = panic::take_hook();
        panic::set_hook(Box::new(|_| {}));
        let event_loop = panic::catch_unwind(AssertUnwindSafe(|| {
            EventLoop::<AppEvent>::with_user_event().build()
        }));
        panic::set_hook(default_hook);
        let event_loop = event_loop
            .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
            .map_err(|err| WindowInitError::from_error("event loop", err))?;

        #[allow(deprecated)]
        let window = Arc::new(
            event_loop
                .create_window(
                    Window::default_attributes()
                        .with_title(WindowApp::window_title())
                        .with_inner_size(LogicalSize::new(WINDOW_WIDTH, WINDOW_HEIGHT)),
                )
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );

        let scale_factor = window.scale_factor();
        let logical = window.inner_size().to_logical::<f64>(scale_factor);
        let scene = SceneContext::build(
            options.profile(scale_factor),
            logical.width.round() as u32,
            logical.height.round() as u32,
        );
        for line in scene.summary() {
            println!("{line}");
        }

        let renderer = block_on(Renderer::new(Arc::clone(&window), &scene))
            .context("failed to initialise renderer")?;
        if let Some(path) = options.env_map.clone() {
            environment::spawn_load(path, event_loop.create_proxy());
        }

        let mut app = WindowApp::new(AppState::new(scene, Clock::monotonic()), renderer);
        let mut last_error = None;

        #[allow(deprecated)]
        event_loop
            .run(|event, elwt| {
                if let Err(err) = app.process_event(event, elwt) {
                    last_error = Some(err);
                    elwt.exit();
                }
            })
            .context("event loop terminated abnormally")?;

        if let Some(err) = last_error {
            return Err(err);
        }
        Ok(())
    }

    #[derive(Debug)]
    struct WindowInitError {
        message: String,
    }

    impl WindowInitError {
        fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
            Self {
                message: format!("failed to initialize {stage}: {}", panic_message(panic)),
            }
        }

        fn from_error(stage: &str, err: impl fmt::Display) -> Self {
            Self {
                message: format!("failed to initialize {stage}: {err}"),
            }
        }
    }

    impl fmt::Display for WindowInitError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.message)
        }
    }

    impl std::error::Error for WindowInitError {}

    fn panic_message(panic: Box<dyn Any + Send>) -> String {
        match panic.downcast::<String>() {
            Ok(msg) => *msg,
            Err(panic) => match panic.downcast::<&'static str>() {
                Ok(msg) => (*msg).to_string(),
                Err(_) => "unknown panic".into(),
            },
        }
    }

    const USAGE: &str = "Usage: wobble-scene [--env-map <path>] [--summary-only] [--frames <n>] \
                         [--mobile] [--cores <n>] [--pixel-ratio <f>]";

    #[derive(Debug)]
    struct CliOptions {
        env_map: Option<PathBuf>,
        summary_only: bool,
        frames: u32,
        mobile: bool,
        cores: Option<u32>,
        pixel_ratio: Option<f64>,
    }

    impl CliOptions {
        fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
            let mut options = Self {
                env_map: Some(PathBuf::from(DEFAULT_ENV_MAP)),
                summary_only: false,
                frames: 1,
                mobile: false,
                cores: None,
                pixel_ratio: None,
            };
            let mut args = args.into_iter();
            while let Some(arg) = args.next() {
                match arg.as_str() {
                    "--env-map" => options.env_map = Some(PathBuf::from(value_for(&arg, args.next())?)),
                    "--summary-only" => options.summary_only = true,
                    "--frames" => options.frames = parse_value(&arg, args.next())?,
                    "--mobile" => options.mobile = true,
                    "--cores" => options.cores = Some(parse_value(&arg, args.next())?),
                    "--pixel-ratio" => {
                        let ratio: f64 = parse_value(&arg, args.next())?;
                        if !(ratio.is_finite() && ratio > 0.0) {
                            return Err(anyhow!("--pixel-ratio must be positive, got {ratio}"));
                        }
                        options.pixel_ratio = Some(ratio);
                    }
                    "-h" | "--help" => return Err(anyhow!(USAGE)),
                    other => return Err(anyhow!("Unknown argument: {other}. {USAGE}")),
                }
            }
            Ok(options)
        }

        /// Host profile with any command line overrides applied.
        fn profile(&self, scale_factor: f64) -> DeviceProfile {
            let mut profile = DeviceProfile::native(self.pixel_ratio.unwrap_or(scale_factor));
            profile.is_mobile = self.mobile;
            if let Some(cores) = self.cores {
                profile.hardware_concurrency = cores;
            }
            profile
        }
    }

    fn value_for(flag: &str, value: Option<String>) -> Result<String> {
        value.ok_or_else(|| anyhow!("{flag} expects a value. {USAGE}"))
    }

    fn parse_value<T>(flag: &str, value: Option<String>) -> Result<T>
    where
        T: std::str::FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let value = value_for(flag, value)?;
        value
            .parse()
            .with_context(|| format!("invalid value for {flag}: {value}"))
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn parse(args: &[&str]) -> Result<CliOptions> {
            CliOptions::parse(args.iter().map(|arg| arg.to_string()))
        }

        #[test]
        fn defaults_point_at_the_bundled_environment() {
            let options = parse(&[]).unwrap();
            assert_eq!(options.env_map, Some(PathBuf::from(DEFAULT_ENV_MAP)));
            assert_eq!(options.frames, 1);
            assert!(!options.summary_only);
        }

        #[test]
        fn overrides_shape_the_profile() {
            let options = parse(&["--mobile", "--cores", "2", "--pixel-ratio", "3"]).unwrap();
            let profile = options.profile(1.0);
            assert!(profile.is_mobile);
            assert_eq!(profile.hardware_concurrency, 2);
            assert_eq!(profile.device_pixel_ratio, 3.0);
        }

        #[test]
        fn bad_values_are_rejected() {
            assert!(parse(&["--frames"]).is_err());
            assert!(parse(&["--frames", "many"]).is_err());
            assert!(parse(&["--pixel-ratio", "0"]).is_err());
            assert!(parse(&["--bogus"]).is_err());
        }
    }
}
