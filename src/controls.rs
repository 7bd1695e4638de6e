use std::f32::consts::{PI, TAU};

use glam::{Vec2, Vec3};

use crate::camera::PerspectiveCamera;

/// Orbit controls that rotate, dolly and pan a camera around its target.
///
/// Pointer input accumulates into pending deltas; [`OrbitControls::update`]
/// applies one damping step of them per frame.
#[derive(Debug, Clone)]
pub struct OrbitControls {
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    rotate_delta: Vec2,
    pan_offset: Vec3,
    scale: f32,
    enabled: bool,
    disposed: bool,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self {
            enable_damping: false,
            damping_factor: 0.05,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            pan_speed: 1.0,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            rotate_delta: Vec2::ZERO,
            pan_offset: Vec3::ZERO,
            scale: 1.0,
            enabled: true,
            disposed: false,
        }
    }
}

const POLAR_EPSILON: f32 = 1e-6;

impl OrbitControls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_damping(mut self) -> Self {
        self.enable_damping = true;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled && !self.disposed
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Drag rotation, in pixels of pointer travel.
    pub fn rotate(&mut self, pointer_delta: Vec2, viewport_height: f32) {
        if !self.is_enabled() {
            return;
        }
        let per_pixel = TAU / viewport_height.max(1.0) * self.rotate_speed;
        self.rotate_delta.x -= pointer_delta.x * per_pixel;
        self.rotate_delta.y -= pointer_delta.y * per_pixel;
    }

    /// Wheel zoom; positive `wheel_delta` moves away from the target.
    pub fn dolly(&mut self, wheel_delta: f32) {
        if !self.is_enabled() || wheel_delta == 0.0 {
            return;
        }
        let zoom_scale = 0.95f32.powf(self.zoom_speed);
        if wheel_delta > 0.0 {
            self.scale /= zoom_scale;
        } else {
            self.scale *= zoom_scale;
        }
    }

    /// Drag pan, moving the target in the camera's screen plane.
    pub fn pan(&mut self, pointer_delta: Vec2, viewport_height: f32, camera: &PerspectiveCamera) {
        if !self.is_enabled() {
            return;
        }
        let forward = (camera.target - camera.position).normalize_or_zero();
        let right = forward.cross(camera.up).normalize_or_zero();
        let up = right.cross(forward);
        let visible_height = 2.0 * camera.distance() * (camera.fov.to_radians() / 2.0).tan();
        let per_pixel = visible_height / viewport_height.max(1.0) * self.pan_speed;
        self.pan_offset += (-right * pointer_delta.x + up * pointer_delta.y) * per_pixel;
    }

    /// Advances the camera by one step; with damping enabled only a
    /// `damping_factor` share of the pending motion is applied.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) {
        if self.disposed {
            return;
        }
        let offset = camera.position - camera.target;
        let mut radius = offset.length();
        let mut theta = offset.x.atan2(offset.z);
        let mut phi = if radius > 0.0 {
            (offset.y / radius).clamp(-1.0, 1.0).acos()
        } else {
            0.0
        };

        let factor = if self.enable_damping {
            self.damping_factor
        } else {
            1.0
        };
        theta += self.rotate_delta.x * factor;
        phi += self.rotate_delta.y * factor;
        phi = phi.clamp(POLAR_EPSILON, PI - POLAR_EPSILON);

        radius = (radius * self.scale).clamp(self.min_distance, self.max_distance);
        camera.target += self.pan_offset * factor;

        let sin_phi = phi.sin();
        camera.position = camera.target
            + Vec3::new(
                radius * sin_phi * theta.sin(),
                radius * phi.cos(),
                radius * sin_phi * theta.cos(),
            );

        if self.enable_damping {
            self.rotate_delta *= 1.0 - self.damping_factor;
            self.pan_offset *= 1.0 - self.damping_factor;
        } else {
            self.rotate_delta = Vec2::ZERO;
            self.pan_offset = Vec3::ZERO;
        }
        self.scale = 1.0;
    }

    /// Detaches from input for good and drops pending motion.
    ///
    /// Returns `false` if the controls were already disposed.
    pub fn dispose(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.disposed = true;
        self.enabled = false;
        self.rotate_delta = Vec2::ZERO;
        self.pan_offset = Vec3::ZERO;
        self.scale = 1.0;
        true
    }
}
