use bytemuck::{Pod, Zeroable};

use crate::scene::SceneContext;

/// Tone mapping exposure.
pub const EXPOSURE: f32 = 1.0;

/// Per-frame camera, light and shading state, laid out like `Globals` in
/// `globals.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct GlobalUniform {
    pub view_proj: [[f32; 4]; 4],
    pub inv_view_proj: [[f32; 4]; 4],
    pub light_view_proj: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    pub light_direction: [f32; 4],
    pub light_color: [f32; 4],
    pub params: [f32; 4],
}

impl GlobalUniform {
    /// `environment_mips` is the mip count of the bound environment texture,
    /// or `None` while no map has arrived.
    pub fn from_scene(scene: &SceneContext, environment_mips: Option<u32>) -> Self {
        let view_proj = scene.camera.view_projection_matrix();
        let (max_lod, has_environment) = match environment_mips {
            Some(levels) if levels > 0 => ((levels - 1) as f32, 1.0),
            _ => (0.0, 0.0),
        };
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            inv_view_proj: view_proj.inverse().to_cols_array_2d(),
            light_view_proj: scene.light.view_projection().to_cols_array_2d(),
            camera_position: scene.camera.position.extend(1.0).to_array(),
            light_direction: scene.light.direction().extend(scene.light.intensity).to_array(),
            light_color: scene.light.color.extend(1.0).to_array(),
            params: [scene.light.shadow.normal_bias, EXPOSURE, max_lod, has_environment],
        }
    }
}

pub const WOBBLE_ATTRIBUTES: [wgpu::VertexAttribute; 3] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x4];
pub const PLANE_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];

/// Position, normal, tangent.
pub fn wobble_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: (10 * std::mem::size_of::<f32>()) as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &WOBBLE_ATTRIBUTES,
    }
}

/// Position, normal.
pub fn plane_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: (6 * std::mem::size_of::<f32>()) as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &PLANE_ATTRIBUTES,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceProfile;
    use crate::geometry::VertexLayout;

    fn scene() -> SceneContext {
        SceneContext::build(DeviceProfile::new(true, 2, 1.0), 640, 480)
    }

    #[test]
    fn uniform_block_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<GlobalUniform>(), 256);
    }

    #[test]
    fn environment_flag_follows_the_bound_texture() {
        let scene = scene();
        let without = GlobalUniform::from_scene(&scene, None);
        assert_eq!(without.params[3], 0.0);
        let with = GlobalUniform::from_scene(&scene, Some(11));
        assert_eq!(with.params[2], 10.0);
        assert_eq!(with.params[3], 1.0);
        assert_eq!(with.params[0], 0.05);
    }

    #[test]
    fn light_direction_carries_intensity() {
        let uniform = GlobalUniform::from_scene(&scene(), None);
        let [x, y, z, intensity] = uniform.light_direction;
        assert!(((x * x + y * y + z * z).sqrt() - 1.0).abs() < 1e-5);
        assert!(y > 0.0);
        assert_eq!(intensity, 3.0);
    }

    #[test]
    fn vertex_strides_match_geometry_layouts() {
        let float = std::mem::size_of::<f32>() as u64;
        assert_eq!(
            wobble_vertex_layout().array_stride,
            VertexLayout::PositionNormalTangent.floats_per_vertex() as u64 * float
        );
        assert_eq!(
            plane_vertex_layout().array_stride,
            VertexLayout::PositionNormal.floats_per_vertex() as u64 * float
        );
    }
}
