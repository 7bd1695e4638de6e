use std::f32::consts::PI;

use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::camera::PerspectiveCamera;
use crate::controls::OrbitControls;
use crate::device::DeviceProfile;
use crate::displacement;
use crate::environment::EnvironmentMap;
use crate::geometry::Geometry;
use crate::material::{DepthMaterial, MaterialKind, MaterialUniform, PhysicalMaterialParams, SurfaceMaterial};
use crate::uniforms::UniformStore;
use crate::viewport::Viewport;

pub const WOBBLE_RADIUS: f32 = 2.5;
pub const MERGE_TOLERANCE: f32 = 1e-4;

/// Geometry plus the program that draws it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mesh {
    pub name: String,
    pub geometry: Geometry,
    pub material: MaterialKind,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

/// Shadow map settings of a directional light.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShadowConfig {
    pub map_size: u32,
    pub near: f32,
    pub far: f32,
    /// Half-size of the orthographic shadow frustum.
    pub extent: f32,
    pub normal_bias: f32,
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            map_size: 1024,
            near: 0.5,
            far: 15.0,
            extent: 5.0,
            normal_bias: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionalLight {
    pub color: Vec3,
    pub intensity: f32,
    pub position: Vec3,
    pub target: Vec3,
    pub shadow: ShadowConfig,
}

impl DirectionalLight {
    /// Unit vector pointing from the lit surface towards the light.
    pub fn direction(&self) -> Vec3 {
        (self.position - self.target).normalize_or_zero()
    }

    /// Orthographic view-projection of the shadow camera.
    pub fn view_projection(&self) -> Mat4 {
        let extent = self.shadow.extent;
        let up = if self.direction().abs().dot(Vec3::Y) > 0.999 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        let view = Mat4::look_at_rh(self.position, self.target, up);
        let projection =
            Mat4::orthographic_rh(-extent, extent, -extent, extent, self.shadow.near, self.shadow.far);
        projection * view
    }
}

/// Everything the scene owns, built once at startup and passed by reference
/// to the render loop, the panel and the event handlers.
#[derive(Debug)]
pub struct SceneContext {
    pub profile: DeviceProfile,
    pub uniforms: UniformStore,
    pub surface_material: SurfaceMaterial,
    pub depth_material: DepthMaterial,
    pub plane_material: PhysicalMaterialParams,
    pub wobble: Mesh,
    pub plane: Mesh,
    pub light: DirectionalLight,
    pub camera: PerspectiveCamera,
    pub controls: OrbitControls,
    pub viewport: Viewport,
    environment: Option<EnvironmentMap>,
    environment_revision: u64,
}

impl SceneContext {
    /// Assembles the scene for a `width` x `height` logical viewport.
    ///
    /// The environment map is not part of construction; it arrives later
    /// through [`SceneContext::set_environment`].
    pub fn build(profile: DeviceProfile, width: u32, height: u32) -> Self {
        let viewport = Viewport::new(
            width,
            height,
            profile.device_pixel_ratio,
            profile.pixel_ratio_cap(),
        );

        let wobble = Mesh {
            name: "wobble".to_string(),
            geometry: wobble_geometry(profile.subdivision_level()),
            material: MaterialKind::Wobble,
            cast_shadow: true,
            receive_shadow: true,
        };

        let plane_transform =
            Mat4::from_translation(Vec3::new(0.0, -5.0, 5.0)) * Mat4::from_rotation_y(PI);
        let plane = Mesh {
            name: "plane".to_string(),
            geometry: Geometry::plane(15.0, 15.0, 15, 1).transformed(plane_transform),
            material: MaterialKind::Standard,
            cast_shadow: false,
            receive_shadow: true,
        };

        let light = DirectionalLight {
            color: Vec3::ONE,
            intensity: 3.0,
            position: Vec3::new(0.25, 2.0, -2.25),
            target: Vec3::ZERO,
            shadow: ShadowConfig::default(),
        };

        let camera = PerspectiveCamera::new(35.0, viewport.aspect(), 0.1, 100.0)
            .with_position(Vec3::new(13.0, -3.0, -5.0));

        log::debug!(
            "built scene for {} profile: subdivision {}, pixel ratio {}",
            profile.tier_name(),
            profile.subdivision_level(),
            viewport.pixel_ratio
        );

        Self {
            profile,
            uniforms: UniformStore::new(),
            surface_material: SurfaceMaterial::default(),
            depth_material: DepthMaterial::default(),
            plane_material: PhysicalMaterialParams::standard(),
            wobble,
            plane,
            light,
            camera,
            controls: OrbitControls::new().with_damping(),
            viewport,
            environment: None,
            environment_revision: 0,
        }
    }

    /// Installs the environment as both background and image-based light.
    pub fn set_environment(&mut self, map: EnvironmentMap) {
        log::info!("environment map ready ({}x{})", map.width, map.height);
        self.environment = Some(map);
        self.environment_revision += 1;
    }

    pub fn environment(&self) -> Option<&EnvironmentMap> {
        self.environment.as_ref()
    }

    /// Bumped on every [`SceneContext::set_environment`]; lets the renderer
    /// re-upload only when the map changed.
    pub fn environment_revision(&self) -> u64 {
        self.environment_revision
    }

    pub fn resize(&mut self, width: u32, height: u32, device_pixel_ratio: f64) {
        self.viewport.resize(width, height, device_pixel_ratio);
        self.camera.set_aspect(self.viewport.aspect());
    }

    /// Meshes drawn into the shadow map, in draw order.
    pub fn shadow_casters(&self) -> impl Iterator<Item = &Mesh> {
        [&self.wobble, &self.plane]
            .into_iter()
            .filter(|mesh| mesh.cast_shadow)
    }

    pub fn wobble_material_uniform(&self) -> MaterialUniform {
        self.surface_material.params.to_gpu(self.wobble.receive_shadow)
    }

    pub fn plane_material_uniform(&self) -> MaterialUniform {
        self.plane_material.to_gpu(self.plane.receive_shadow)
    }

    /// One damping step of the orbit controls.
    pub fn update_controls(&mut self) {
        self.controls.update(&mut self.camera);
    }

    /// Smallest and largest displacement over the wobble's vertices at the
    /// current uniform values, evaluated on the CPU.
    pub fn wobble_range(&self) -> (f32, f32) {
        self.wobble
            .geometry
            .positions
            .iter()
            .map(|position| displacement::wobble(*position, &self.uniforms))
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), value| {
                (min.min(value), max.max(value))
            })
    }

    pub fn summary(&self) -> Vec<String> {
        let (render_width, render_height) = self.viewport.render_resolution();
        vec![
            format!(
                "Device profile: {} ({} cores, pixel ratio cap {})",
                self.profile.tier_name(),
                self.profile.hardware_concurrency,
                self.profile.pixel_ratio_cap()
            ),
            format!(
                "Wobble mesh: radius {WOBBLE_RADIUS}, subdivision {}, {} vertices, {} triangles",
                self.profile.subdivision_level(),
                self.wobble.geometry.vertex_count(),
                self.wobble.geometry.triangle_count()
            ),
            format!(
                "Plane: {} vertices, {} triangles",
                self.plane.geometry.vertex_count(),
                self.plane.geometry.triangle_count()
            ),
            format!(
                "Light: intensity {}, position ({:.2}, {:.2}, {:.2}), shadow map {}x{}",
                self.light.intensity,
                self.light.position.x,
                self.light.position.y,
                self.light.position.z,
                self.light.shadow.map_size,
                self.light.shadow.map_size
            ),
            format!(
                "Camera: fov {}, position ({:.2}, {:.2}, {:.2})",
                self.camera.fov, self.camera.position.x, self.camera.position.y, self.camera.position.z
            ),
            format!(
                "Viewport: {}x{} at pixel ratio {} ({}x{} drawing buffer)",
                self.viewport.width,
                self.viewport.height,
                self.viewport.pixel_ratio,
                render_width,
                render_height
            ),
            format!(
                "Environment: {}",
                self.environment
                    .as_ref()
                    .map(|map| format!("{}x{}", map.width, map.height))
                    .unwrap_or_else(|| "none".to_string())
            ),
        ]
    }
}

/// Icosahedron with shared vertices, then tangents derived from the merged
/// normals.
pub fn wobble_geometry(subdivision: u32) -> Geometry {
    let mut geometry = Geometry::icosahedron(WOBBLE_RADIUS, subdivision).merge_vertices(MERGE_TOLERANCE);
    geometry.compute_tangents();
    geometry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desktop() -> DeviceProfile {
        DeviceProfile::new(false, 8, 1.0)
    }

    #[test]
    fn wobble_is_merged_and_has_tangents() {
        let geometry = wobble_geometry(4);
        assert!(geometry.is_indexed());
        assert_eq!(geometry.vertex_count(), 10 * 5 * 5 + 2);
        assert_eq!(geometry.tangents.len(), geometry.vertex_count());
    }

    #[test]
    fn mobile_scene_uses_the_lightest_mesh() {
        let scene = SceneContext::build(DeviceProfile::new(true, 8, 3.0), 390, 844);
        assert_eq!(scene.wobble.geometry.vertex_count(), 10 * 41 * 41 + 2);
        assert_eq!(scene.viewport.render_resolution(), (390, 844));
    }

    #[test]
    fn scene_matches_the_staged_layout() {
        let scene = SceneContext::build(DeviceProfile::new(false, 2, 1.0), 1280, 720);
        assert_eq!(scene.wobble.geometry.vertex_count(), 10 * 51 * 51 + 2);
        assert!(scene.wobble.cast_shadow && scene.wobble.receive_shadow);
        assert!(!scene.plane.cast_shadow && scene.plane.receive_shadow);
        assert_eq!(scene.camera.position, Vec3::new(13.0, -3.0, -5.0));
        assert_eq!(scene.camera.fov, 35.0);
        assert!(scene.controls.enable_damping);
        assert_eq!(scene.controls.damping_factor, 0.05);
        assert_eq!(scene.light.shadow.map_size, 1024);
        assert_eq!(scene.light.shadow.far, 15.0);
        assert!(scene.environment().is_none());
    }

    #[test]
    fn plane_is_a_single_strip_of_fifteen_quads() {
        let scene = SceneContext::build(desktop(), 800, 600);
        assert_eq!(scene.plane.geometry.vertex_count(), 16 * 2);
        assert_eq!(scene.plane.geometry.triangle_count(), 30);
    }

    #[test]
    fn shadow_flags_drive_casters_and_receivers() {
        let mut scene = SceneContext::build(desktop(), 800, 600);
        let casters: Vec<&str> = scene.shadow_casters().map(|mesh| mesh.name.as_str()).collect();
        assert_eq!(casters, ["wobble"]);
        assert_eq!(scene.wobble_material_uniform().layers[3], 1.0);
        assert_eq!(scene.plane_material_uniform().layers[3], 1.0);

        scene.plane.cast_shadow = true;
        scene.plane.receive_shadow = false;
        scene.wobble.cast_shadow = false;
        let casters: Vec<&str> = scene.shadow_casters().map(|mesh| mesh.name.as_str()).collect();
        assert_eq!(casters, ["plane"]);
        assert_eq!(scene.plane_material_uniform().layers[3], 0.0);
    }

    #[test]
    fn plane_faces_the_camera_side() {
        let scene = SceneContext::build(desktop(), 800, 600);
        let normal = scene.plane.geometry.normals[0];
        assert!((normal - Vec3::NEG_Z).length() < 1e-5);
        let centre = scene.plane.geometry.positions.iter().copied().sum::<Vec3>()
            / scene.plane.geometry.vertex_count() as f32;
        assert!((centre - Vec3::new(0.0, -5.0, 5.0)).length() < 1e-4);
    }

    #[test]
    fn resize_keeps_camera_aspect_in_sync() {
        let mut scene = SceneContext::build(desktop(), 800, 600);
        scene.resize(1920, 1080, 3.0);
        assert_eq!(scene.camera.aspect, 1920.0 / 1080.0);
        assert_eq!(scene.viewport.render_resolution(), (3840, 2160));
    }

    #[test]
    fn environment_revision_tracks_updates() {
        let mut scene = SceneContext::build(desktop(), 800, 600);
        assert_eq!(scene.environment_revision(), 0);
        scene.set_environment(EnvironmentMap::uniform(Vec3::ONE));
        assert_eq!(scene.environment_revision(), 1);
        assert!(scene.environment().is_some());
    }

    #[test]
    fn shadow_camera_sees_the_origin() {
        let light = SceneContext::build(desktop(), 800, 600).light;
        let clip = light.view_projection() * Vec3::ZERO.extend(1.0);
        assert!(clip.x.abs() < 1e-4 && clip.y.abs() < 1e-4);
        assert!(clip.z > 0.0 && clip.z < 1.0);
    }

    #[test]
    fn zero_strength_leaves_the_wobble_undisplaced() {
        let mut scene = SceneContext::build(DeviceProfile::new(true, 2, 1.0), 320, 240);
        let (min, max) = scene.wobble_range();
        assert!(min < 0.0 && max > 0.0);
        scene.uniforms.set(crate::uniforms::UniformName::Strength, 0.0);
        assert_eq!(scene.wobble_range(), (0.0, 0.0));
    }
}
