//! WGSL program sources.
//!
//! Each program is stitched together from the chunks under `src/shaders`.
//! The surface and depth programs share the `wobble` chunk verbatim, so the
//! shadow always follows the displaced silhouette.

const GLOBALS: &str = include_str!("../shaders/globals.wgsl");
const LIGHTING: &str = include_str!("../shaders/lighting.wgsl");
const WOBBLE: &str = include_str!("../shaders/wobble.wgsl");
const SURFACE: &str = include_str!("../shaders/surface.wgsl");
const DEPTH: &str = include_str!("../shaders/depth.wgsl");
const STATIC_DEPTH: &str = include_str!("../shaders/static_depth.wgsl");
const PLANE: &str = include_str!("../shaders/plane.wgsl");
const BACKGROUND: &str = include_str!("../shaders/background.wgsl");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderProgram {
    pub name: &'static str,
    pub source: String,
    pub vertex_entry: &'static str,
    /// `None` for depth-only programs.
    pub fragment_entry: Option<&'static str>,
}

fn compose(chunks: &[&str]) -> String {
    chunks.join("\n")
}

/// Displaced, PBR shaded wobble.
pub fn surface_program() -> ShaderProgram {
    ShaderProgram {
        name: "wobble-surface",
        source: compose(&[GLOBALS, LIGHTING, WOBBLE, SURFACE]),
        vertex_entry: "vs_main",
        fragment_entry: Some("fs_main"),
    }
}

/// Displaced wobble rendered into the shadow map.
pub fn depth_program() -> ShaderProgram {
    ShaderProgram {
        name: "wobble-depth",
        source: compose(&[GLOBALS, WOBBLE, DEPTH]),
        vertex_entry: "vs_depth",
        fragment_entry: None,
    }
}

/// Undisplaced position-normal meshes rendered into the shadow map.
pub fn static_depth_program() -> ShaderProgram {
    ShaderProgram {
        name: "static-depth",
        source: compose(&[GLOBALS, STATIC_DEPTH]),
        vertex_entry: "vs_static_depth",
        fragment_entry: None,
    }
}

/// Shadow receiving floor with the standard material.
pub fn plane_program() -> ShaderProgram {
    ShaderProgram {
        name: "plane",
        source: compose(&[GLOBALS, LIGHTING, PLANE]),
        vertex_entry: "vs_plane",
        fragment_entry: Some("fs_plane"),
    }
}

/// Environment map drawn behind everything else.
pub fn background_program() -> ShaderProgram {
    ShaderProgram {
        name: "background",
        source: compose(&[GLOBALS, LIGHTING, BACKGROUND]),
        vertex_entry: "vs_background",
        fragment_entry: Some("fs_background"),
    }
}

pub fn all_programs() -> [ShaderProgram; 5] {
    [
        surface_program(),
        depth_program(),
        static_depth_program(),
        plane_program(),
        background_program(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surface_and_depth_share_the_displacement_chunk() {
        let surface = surface_program();
        let depth = depth_program();
        assert!(surface.source.contains(WOBBLE));
        assert!(depth.source.contains(WOBBLE));
        assert_eq!(surface.source.matches("fn displace(").count(), 1);
        assert_eq!(depth.source.matches("fn displace(").count(), 1);
    }

    #[test]
    fn depth_programs_have_no_fragment_stage() {
        for depth in [depth_program(), static_depth_program()] {
            assert_eq!(depth.fragment_entry, None);
            assert!(!depth.source.contains("@fragment"));
            assert!(!depth.source.contains("shadow_map"));
        }
    }

    #[test]
    fn entry_points_exist_in_their_sources() {
        for program in all_programs() {
            assert!(
                program.source.contains(&format!("fn {}(", program.vertex_entry)),
                "{} is missing its vertex entry",
                program.name
            );
            if let Some(fragment) = program.fragment_entry {
                assert!(program.source.contains(&format!("fn {fragment}(")));
            }
        }
    }

    #[test]
    fn wobble_uniform_block_matches_the_cpu_layout() {
        let fields = [
            "time: f32",
            "position_frequency: f32",
            "time_frequency: f32",
            "strength: f32",
            "warp_position_frequency: f32",
            "warp_time_frequency: f32",
            "warp_strength: f32",
        ];
        let mut cursor = 0;
        for field in fields {
            let offset = WOBBLE[cursor..]
                .find(field)
                .unwrap_or_else(|| panic!("{field} out of order"));
            cursor += offset + field.len();
        }
        assert_eq!(std::mem::size_of::<crate::uniforms::WobbleUniform>(), 32);
    }
}
