use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Physically based surface parameters of the wobble.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicalMaterialParams {
    /// Linear RGB base colour.
    pub color: Vec3,
    pub metalness: f32,
    pub roughness: f32,
    pub transmission: f32,
    pub ior: f32,
    pub thickness: f32,
    pub clearcoat: f32,
    pub clearcoat_roughness: f32,
}

impl Default for PhysicalMaterialParams {
    fn default() -> Self {
        Self {
            color: srgb_to_linear(Vec3::splat(208.0 / 255.0)),
            metalness: 0.95,
            roughness: 0.18,
            transmission: 0.0,
            ior: 2.5,
            thickness: 0.0,
            clearcoat: 0.7,
            clearcoat_roughness: 0.08,
        }
    }
}

impl PhysicalMaterialParams {
    /// Parameters of a plain standard material: white, fully rough, dielectric.
    pub fn standard() -> Self {
        Self {
            color: Vec3::ONE,
            metalness: 0.0,
            roughness: 1.0,
            transmission: 0.0,
            ior: 1.5,
            thickness: 0.0,
            clearcoat: 0.0,
            clearcoat_roughness: 0.0,
        }
    }

    pub fn set_color_hex(&mut self, hex: &str) -> Result<(), ConfigError> {
        self.color = srgb_to_linear(parse_hex_color(hex)?);
        Ok(())
    }

    pub fn color_hex(&self) -> String {
        format_hex_color(self.color_srgb())
    }

    /// Base colour as 8-bit sRGB channels.
    pub fn color_srgb(&self) -> [u8; 3] {
        linear_to_srgb(self.color)
            .to_array()
            .map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8)
    }

    pub fn set_color_srgb(&mut self, rgb: [u8; 3]) {
        self.color = srgb_to_linear(Vec3::from_array(rgb.map(|c| c as f32 / 255.0)));
    }

    /// `receive_shadow` gates the shadow map lookup in the fragment stage.
    pub fn to_gpu(&self, receive_shadow: bool) -> MaterialUniform {
        MaterialUniform {
            color: self.color.extend(1.0).to_array(),
            surface: [self.metalness, self.roughness, self.transmission, self.ior],
            layers: [
                self.thickness,
                self.clearcoat,
                self.clearcoat_roughness,
                if receive_shadow { 1.0 } else { 0.0 },
            ],
        }
    }
}

/// GPU mirror of [`PhysicalMaterialParams`], laid out like `MaterialUniform`
/// in `lighting.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialUniform {
    pub color: [f32; 4],
    /// metalness, roughness, transmission, ior
    pub surface: [f32; 4],
    /// thickness, clearcoat, clearcoat roughness, receives shadow (0 or 1)
    pub layers: [f32; 4],
}

/// Visible material of the wobble: physical parameters shaded by the
/// displacement surface program.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SurfaceMaterial {
    pub params: PhysicalMaterialParams,
}

/// Depth-only twin of [`SurfaceMaterial`] used for the shadow map.
///
/// It runs the same displacement vertex stage and writes straight into the
/// `Depth32Float` shadow map, so it carries no colour state. What it does
/// carry is the rasterizer bias applied while drawing casters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DepthMaterial {
    /// Constant depth bias in depth-buffer units.
    pub bias_constant: i32,
    pub bias_slope_scale: f32,
}

impl Default for DepthMaterial {
    fn default() -> Self {
        Self {
            bias_constant: 2,
            bias_slope_scale: 2.0,
        }
    }
}

/// Which program draws a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialKind {
    Wobble,
    Standard,
}

pub fn parse_hex_color(hex: &str) -> Result<Vec3, ConfigError> {
    let invalid = || ConfigError::InvalidColor(hex.to_string());
    let digits = hex.strip_prefix('#').ok_or_else(invalid)?;
    if digits.len() != 6 || !digits.is_ascii() {
        return Err(invalid());
    }
    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16)
            .map(|value| value as f32 / 255.0)
            .map_err(|_| invalid())
    };
    Ok(Vec3::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

pub fn format_hex_color(rgb: [u8; 3]) -> String {
    let [r, g, b] = rgb;
    format!("#{r:02x}{g:02x}{b:02x}")
}

pub fn srgb_to_linear(color: Vec3) -> Vec3 {
    Vec3::from_array(color.to_array().map(|c| {
        if c < 0.04045 {
            c * 0.077_399_38
        } else {
            (c * 0.947_867_3 + 0.052_132_7).powf(2.4)
        }
    }))
}

pub fn linear_to_srgb(color: Vec3) -> Vec3 {
    Vec3::from_array(color.to_array().map(|c| {
        if c < 0.003_130_8 {
            c * 12.92
        } else {
            1.055 * c.powf(0.416_666_66) - 0.055
        }
    }))
}
