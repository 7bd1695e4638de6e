//! Equirectangular HDR environment maps.
//!
//! Loading never blocks scene construction: the decoded map is handed back to
//! the event loop as [`AppEvent::EnvironmentLoaded`](crate::app::AppEvent) and
//! applied there, so the scene only ever sees one serialized mutation.

use std::f32::consts::{FRAC_1_PI, TAU};

use glam::{Vec2, Vec3};
use half::f16;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("failed to read environment map: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode environment map: {0}")]
    Decode(#[from] image::ImageError),
    #[error("failed to fetch environment map: {0}")]
    Fetch(String),
    #[error("environment map is empty")]
    Empty,
    #[error("environment map is {width}x{height}, larger than the {max} texel texture limit")]
    TooLarge { width: u32, height: u32, max: u32 },
}

/// Decoded HDR image, stored as half-float RGBA texels ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvironmentMap {
    pub width: u32,
    pub height: u32,
    texels: Vec<f16>,
}

impl EnvironmentMap {
    /// Decodes an image (Radiance `.hdr` in practice) from memory.
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvironmentError> {
        let image = image::load_from_memory(bytes)?;
        let (width, height) = (image.width(), image.height());
        let rgb = image.into_rgb32f();
        let mut texels = Vec::with_capacity((width * height * 4) as usize);
        for pixel in rgb.pixels() {
            texels.extend_from_slice(&[
                f16::from_f32(pixel[0]),
                f16::from_f32(pixel[1]),
                f16::from_f32(pixel[2]),
                f16::ONE,
            ]);
        }
        Self::from_texels(width, height, texels)
    }

    pub fn from_texels(width: u32, height: u32, texels: Vec<f16>) -> Result<Self, EnvironmentError> {
        if width == 0 || height == 0 || texels.len() != (width * height * 4) as usize {
            return Err(EnvironmentError::Empty);
        }
        Ok(Self {
            width,
            height,
            texels,
        })
    }

    /// Single colour map, handy as a stand-in and in tests.
    pub fn uniform(color: Vec3) -> Self {
        let texel = [
            f16::from_f32(color.x),
            f16::from_f32(color.y),
            f16::from_f32(color.z),
            f16::ONE,
        ];
        Self {
            width: 1,
            height: 1,
            texels: texel.to_vec(),
        }
    }

    /// Rejects maps whose base level exceeds `max_dimension` texels on
    /// either axis (the device's `max_texture_dimension_2d`).
    pub fn check_fits(&self, max_dimension: u32) -> Result<(), EnvironmentError> {
        if self.width > max_dimension || self.height > max_dimension {
            return Err(EnvironmentError::TooLarge {
                width: self.width,
                height: self.height,
                max: max_dimension,
            });
        }
        Ok(())
    }

    /// Raw bytes in `Rgba16Float` layout.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }

    pub fn bytes_per_row(&self) -> u32 {
        self.width * 4 * std::mem::size_of::<f16>() as u32
    }

    /// Box-filtered mip levels from full resolution down to 1x1.
    pub fn mip_chain(&self) -> Vec<EnvironmentMap> {
        let mut levels = vec![self.clone()];
        loop {
            let Some(last) = levels.last() else { break };
            if last.width == 1 && last.height == 1 {
                break;
            }
            let next = last.downsample();
            levels.push(next);
        }
        levels
    }

    fn downsample(&self) -> Self {
        let width = (self.width / 2).max(1);
        let height = (self.height / 2).max(1);
        let mut texels = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                let mut sum = [0.0f32; 4];
                for (sx, sy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
                    let src_x = (x * 2 + sx).min(self.width - 1);
                    let src_y = (y * 2 + sy).min(self.height - 1);
                    let base = ((src_y * self.width + src_x) * 4) as usize;
                    for (channel, total) in sum.iter_mut().enumerate() {
                        *total += self.texels[base + channel].to_f32();
                    }
                }
                texels.extend(sum.iter().map(|total| f16::from_f32(total / 4.0)));
            }
        }
        Self {
            width,
            height,
            texels,
        }
    }

    /// Nearest texel radiance seen along `direction`.
    pub fn sample(&self, direction: Vec3) -> Vec3 {
        let uv = equirect_uv(direction);
        let x = ((uv.x * self.width as f32) as u32).min(self.width - 1);
        let y = ((uv.y * self.height as f32) as u32).min(self.height - 1);
        let base = ((y * self.width + x) * 4) as usize;
        Vec3::new(
            self.texels[base].to_f32(),
            self.texels[base + 1].to_f32(),
            self.texels[base + 2].to_f32(),
        )
    }
}

/// Equirectangular lookup; `+Y` maps to the top row, matching `env_uv` in
/// `lighting.wgsl`.
pub fn equirect_uv(direction: Vec3) -> Vec2 {
    let direction = direction.normalize_or_zero();
    Vec2::new(
        direction.z.atan2(direction.x) / TAU + 0.5,
        0.5 - direction.y.clamp(-1.0, 1.0).asin() * FRAC_1_PI,
    )
}

/// Reads and decodes a map on a background thread, then posts the result to
/// the event loop.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_load(
    path: std::path::PathBuf,
    proxy: winit::event_loop::EventLoopProxy<crate::app::AppEvent>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        let result = load_file(&path);
        if proxy
            .send_event(crate::app::AppEvent::EnvironmentLoaded(result))
            .is_err()
        {
            log::debug!("event loop closed before {} finished loading", path.display());
        }
    })
}

#[cfg(not(target_arch = "wasm32"))]
pub fn load_file(path: &std::path::Path) -> Result<EnvironmentMap, EnvironmentError> {
    let bytes = std::fs::read(path)?;
    EnvironmentMap::decode(&bytes)
}

/// Fetches and decodes a map from `url`, then posts the result to the event
/// loop.
#[cfg(target_arch = "wasm32")]
pub fn spawn_fetch(url: String, proxy: winit::event_loop::EventLoopProxy<crate::app::AppEvent>) {
    wasm_bindgen_futures::spawn_local(async move {
        let result = fetch(&url).await;
        if proxy
            .send_event(crate::app::AppEvent::EnvironmentLoaded(result))
            .is_err()
        {
            log::debug!("event loop closed before {url} finished loading");
        }
    });
}

#[cfg(target_arch = "wasm32")]
async fn fetch(url: &str) -> Result<EnvironmentMap, EnvironmentError> {
    use wasm_bindgen::JsCast;
    use wasm_bindgen_futures::JsFuture;

    let window = web_sys::window().ok_or_else(|| EnvironmentError::Fetch("window not available".into()))?;
    let response = JsFuture::from(window.fetch_with_str(url))
        .await
        .map_err(|err| EnvironmentError::Fetch(format!("{err:?}")))?
        .dyn_into::<web_sys::Response>()
        .map_err(|_| EnvironmentError::Fetch("unexpected fetch result".into()))?;
    if !response.ok() {
        return Err(EnvironmentError::Fetch(format!("HTTP {}", response.status())));
    }
    let buffer = response
        .array_buffer()
        .map_err(|err| EnvironmentError::Fetch(format!("{err:?}")))?;
    let buffer = JsFuture::from(buffer)
        .await
        .map_err(|err| EnvironmentError::Fetch(format!("{err:?}")))?;
    let bytes = js_sys::Uint8Array::new(&buffer).to_vec();
    EnvironmentMap::decode(&bytes)
}
