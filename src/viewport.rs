use serde::{Deserialize, Serialize};

/// Logical viewport size plus the pixel ratio the renderer draws at.
///
/// The startup cap comes from the device tier (1 on mobile, 2 elsewhere).
/// Later resizes only apply [`Viewport::RESIZE_PIXEL_RATIO_CAP`], so a phone
/// that resizes or rotates renders at up to 2x from then on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f64,
}

impl Viewport {
    pub const RESIZE_PIXEL_RATIO_CAP: f64 = 2.0;

    pub fn new(width: u32, height: u32, device_pixel_ratio: f64, startup_cap: f64) -> Self {
        let mut viewport = Self {
            width: 1,
            height: 1,
            pixel_ratio: 1.0,
        };
        viewport.apply(width, height, device_pixel_ratio, startup_cap);
        viewport
    }

    /// Applies a new logical size and device pixel ratio.
    ///
    /// The effective ratio is `min(device_pixel_ratio, 2)`.
    pub fn resize(&mut self, width: u32, height: u32, device_pixel_ratio: f64) {
        self.apply(width, height, device_pixel_ratio, Self::RESIZE_PIXEL_RATIO_CAP);
    }

    fn apply(&mut self, width: u32, height: u32, device_pixel_ratio: f64, cap: f64) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.pixel_ratio = device_pixel_ratio.min(cap).max(f64::MIN_POSITIVE);
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Size of the drawing buffer in physical pixels.
    pub fn render_resolution(&self) -> (u32, u32) {
        (
            ((self.width as f64 * self.pixel_ratio).floor() as u32).max(1),
            ((self.height as f64 * self.pixel_ratio).floor() as u32).max(1),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_updates_aspect_and_resolution() {
        let mut viewport = Viewport::new(800, 600, 1.0, 2.0);
        viewport.resize(1280, 720, 1.5);
        assert_eq!(viewport.aspect(), 1280.0 / 720.0);
        assert_eq!(viewport.render_resolution(), (1920, 1080));
    }

    #[test]
    fn pixel_ratio_is_capped() {
        let viewport = Viewport::new(1280, 720, 3.0, 2.0);
        assert_eq!(viewport.pixel_ratio, 2.0);
        assert_eq!(viewport.render_resolution(), (2560, 1440));

        let mobile = Viewport::new(390, 844, 3.0, 1.0);
        assert_eq!(mobile.render_resolution(), (390, 844));
    }

    #[test]
    fn startup_cap_does_not_survive_a_resize() {
        let mut mobile = Viewport::new(390, 844, 3.0, 1.0);
        assert_eq!(mobile.pixel_ratio, 1.0);
        mobile.resize(844, 390, 3.0);
        assert_eq!(mobile.pixel_ratio, 2.0);
        assert_eq!(mobile.render_resolution(), (1688, 780));
    }

    #[test]
    fn zero_sized_viewports_are_clamped() {
        let viewport = Viewport::new(0, 0, 1.0, 2.0);
        assert_eq!(viewport.render_resolution(), (1, 1));
        assert_eq!(viewport.aspect(), 1.0);
    }
}
