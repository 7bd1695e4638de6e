//! CPU reference for the wobble vertex stage.
//!
//! `shaders/wobble.wgsl` evaluates exactly these steps on the GPU for both the
//! visible surface and the shadow depth pass.

use glam::{Vec3, Vec4};

use crate::noise::simplex_noise_4d;
use crate::uniforms::UniformStore;

/// Offset along the tangent basis used to rebuild the shading normal.
pub const NORMAL_SHIFT: f32 = 0.01;

/// A vertex after displacement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplacedVertex {
    pub position: Vec3,
    pub normal: Vec3,
    /// Raw displacement distance along the original normal.
    pub wobble: f32,
}

/// Displacement distance at `position` for the current uniform values.
///
/// The warp noise is a scalar added to every component of the sampling
/// position before the main noise lookup.
pub fn wobble(position: Vec3, uniforms: &UniformStore) -> f32 {
    let warp = simplex_noise_4d(
        (position * uniforms.warp_position_frequency)
            .extend(uniforms.time * uniforms.warp_time_frequency),
    );
    let warped = position + Vec3::splat(warp * uniforms.warp_strength);
    simplex_noise_4d(
        (warped * uniforms.position_frequency).extend(uniforms.time * uniforms.time_frequency),
    ) * uniforms.strength
}

/// Displaces a vertex along its normal and rebuilds the normal from two
/// displaced neighbours along the tangent and bitangent.
pub fn displace(position: Vec3, normal: Vec3, tangent: Vec4, uniforms: &UniformStore) -> DisplacedVertex {
    let tangent = tangent.truncate();
    let bitangent = normal.cross(tangent);

    let neighbour_a = position + tangent * NORMAL_SHIFT;
    let neighbour_b = position + bitangent * NORMAL_SHIFT;

    let offset = wobble(position, uniforms);
    let displaced = position + normal * offset;
    let displaced_a = neighbour_a + normal * wobble(neighbour_a, uniforms);
    let displaced_b = neighbour_b + normal * wobble(neighbour_b, uniforms);

    let to_a = (displaced_a - displaced).normalize();
    let to_b = (displaced_b - displaced).normalize();

    DisplacedVertex {
        position: displaced,
        normal: to_a.cross(to_b),
        wobble: offset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_vertex() -> (Vec3, Vec3, Vec4) {
        let normal = Vec3::new(0.3, 0.8, -0.52).normalize();
        let tangent = Vec3::Y.cross(normal).normalize();
        (normal * 2.5, normal, tangent.extend(1.0))
    }

    #[test]
    fn displacement_is_deterministic() {
        let (position, normal, tangent) = sample_vertex();
        let mut uniforms = UniformStore::new();
        uniforms.set_time(12.75);
        let first = displace(position, normal, tangent, &uniforms);
        let second = displace(position, normal, tangent, &uniforms);
        assert_eq!(first, second);
    }

    #[test]
    fn zero_strength_leaves_geometry_untouched_at_any_time() {
        let (position, normal, tangent) = sample_vertex();
        let mut uniforms = UniformStore::new();
        uniforms.strength = 0.0;
        for time in [0.0, 0.5, 3.0, 97.25] {
            uniforms.set_time(time);
            let displaced = displace(position, normal, tangent, &uniforms);
            assert_eq!(displaced.position, position);
            assert_eq!(displaced.wobble, 0.0);
            assert!((displaced.normal - normal).length() < 1e-3);
        }
    }

    #[test]
    fn vertices_move_along_their_normal() {
        let (position, normal, tangent) = sample_vertex();
        let uniforms = UniformStore::new();
        let displaced = displace(position, normal, tangent, &uniforms);
        let delta = displaced.position - position;
        assert!(delta.cross(normal).length() < 1e-5);
        assert!((delta.dot(normal) - displaced.wobble).abs() < 1e-5);
    }

    #[test]
    fn displacement_changes_over_time() {
        let (position, _, _) = sample_vertex();
        let mut uniforms = UniformStore::new();
        let start = wobble(position, &uniforms);
        uniforms.set_time(4.0);
        assert_ne!(start, wobble(position, &uniforms));
    }

    #[test]
    fn rebuilt_normal_points_outward() {
        let (position, normal, tangent) = sample_vertex();
        let mut uniforms = UniformStore::new();
        uniforms.set_time(1.5);
        let displaced = displace(position, normal, tangent, &uniforms);
        // Cross of two unit deltas; the fragment stage renormalises it.
        let length = displaced.normal.length();
        assert!(length > 0.3 && length <= 1.0 + 1e-4, "length {length}");
        assert!(displaced.normal.dot(normal) > 0.0);
    }
}
