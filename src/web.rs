#![cfg(target_arch = "wasm32")]

use std::sync::Arc;

use gloo_events::EventListener;
use log::{info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use winit::dpi::LogicalSize;
use winit::event_loop::{ControlFlow, EventLoop};
use winit::platform::web::{EventLoopExtWebSys, WindowAttributesExtWebSys};
use winit::window::Window;

use crate::app::{AppEvent, AppState, WindowApp};
use crate::clock::Clock;
use crate::device::DeviceProfile;
use crate::environment;
use crate::render::Renderer;
use crate::scene::SceneContext;

const DEFAULT_ENV_MAP_URL: &str = "./urban_alley_01_1k.hdr";

/// Starts the scene on the canvas with id `canvas_id`.
///
/// `env_map_url` defaults to the bundled HDR next to the page. The returned
/// promise resolves once the event loop is running.
#[wasm_bindgen]
pub async fn run(canvas_id: String, env_map_url: Option<String>) -> Result<(), JsValue> {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::new(log::Level::Info));

    let browser = web_sys::window().ok_or_else(|| JsValue::from_str("missing window"))?;
    let document = browser
        .document()
        .ok_or_else(|| JsValue::from_str("missing document"))?;
    let canvas: web_sys::HtmlCanvasElement = document
        .get_element_by_id(&canvas_id)
        .ok_or_else(|| JsValue::from_str("canvas element not found"))?
        .dyn_into()
        .map_err(|_| JsValue::from_str("element is not a canvas"))?;

    let navigator = browser.navigator();
    let user_agent = navigator.user_agent().unwrap_or_default();
    let cores = navigator.hardware_concurrency() as u32;
    let profile = DeviceProfile::from_user_agent(&user_agent, cores, browser.device_pixel_ratio());
    let (width, height) = logical_size(&browser);

    let event_loop = EventLoop::<AppEvent>::with_user_event()
        .build()
        .map_err(|err| JsValue::from_str(&format!("failed to create event loop: {err}")))?;
    #[allow(deprecated)]
    let window = Arc::new(
        event_loop
            .create_window(
                Window::default_attributes()
                    .with_canvas(Some(canvas))
                    .with_title(WindowApp::window_title())
                    .with_inner_size(LogicalSize::new(width, height)),
            )
            .map_err(|err| JsValue::from_str(&format!("window error: {err}")))?,
    );

    let scene = SceneContext::build(profile, width, height);
    for line in scene.summary() {
        info!("{line}");
    }
    let renderer = Renderer::new(Arc::clone(&window), &scene)
        .await
        .map_err(|err| JsValue::from_str(&format!("renderer error: {err}")))?;

    let url = env_map_url.unwrap_or_else(|| DEFAULT_ENV_MAP_URL.to_string());
    environment::spawn_fetch(url, event_loop.create_proxy());

    let proxy = event_loop.create_proxy();
    let unload = EventListener::new(&browser, "beforeunload", move |_| {
        if proxy.send_event(AppEvent::Unload).is_err() {
            warn!("event loop already closed on unload");
        }
    });

    let resize_window = Arc::clone(&window);
    let resize_browser = browser.clone();
    let resize = EventListener::new(&browser, "resize", move |_| {
        let (width, height) = logical_size(&resize_browser);
        // Winit answers with a `Resized` event once the canvas changes.
        let _ = resize_window.request_inner_size(LogicalSize::new(width, height));
    });

    let mut app = WindowApp::new(AppState::new(scene, Clock::monotonic()), renderer);

    #[allow(deprecated)]
    event_loop.spawn(move |event, elwt| {
        // Listeners live as long as the loop does.
        let _ = (&unload, &resize);
        elwt.set_control_flow(ControlFlow::Wait);
        if let Err(err) = app.process_event(event, elwt) {
            log::error!("{err:?}");
            elwt.exit();
        }
    });

    Ok(())
}

fn logical_size(browser: &web_sys::Window) -> (u32, u32) {
    let dimension = |value: Result<JsValue, JsValue>| {
        value
            .ok()
            .and_then(|value| value.as_f64())
            .map(|value| value.max(1.0) as u32)
            .unwrap_or(1)
    };
    (dimension(browser.inner_width()), dimension(browser.inner_height()))
}
