use std::fmt;
use std::str::FromStr;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Names of the scalar parameters shared by the surface and depth shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UniformName {
    Time,
    PositionFrequency,
    TimeFrequency,
    Strength,
    WarpPositionFrequency,
    WarpTimeFrequency,
    WarpStrength,
}

impl UniformName {
    pub const ALL: [UniformName; 7] = [
        UniformName::Time,
        UniformName::PositionFrequency,
        UniformName::TimeFrequency,
        UniformName::Strength,
        UniformName::WarpPositionFrequency,
        UniformName::WarpTimeFrequency,
        UniformName::WarpStrength,
    ];

    /// Name used by the shader sources and the control panel.
    pub fn as_str(self) -> &'static str {
        match self {
            UniformName::Time => "uTime",
            UniformName::PositionFrequency => "uPositionFrequency",
            UniformName::TimeFrequency => "uTimeFrequency",
            UniformName::Strength => "uStrength",
            UniformName::WarpPositionFrequency => "uWarpPositionFrequency",
            UniformName::WarpTimeFrequency => "uWarpTimeFrequency",
            UniformName::WarpStrength => "uWarpStrength",
        }
    }
}

impl fmt::Display for UniformName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UniformName {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        UniformName::ALL
            .into_iter()
            .find(|candidate| candidate.as_str() == name)
            .ok_or_else(|| ConfigError::UnknownUniform(name.to_string()))
    }
}

/// Scalar parameters driving the displacement field.
///
/// Every field exists from construction onwards, so a shader can never
/// observe a missing entry. Writes are not validated; the control panel
/// clamps to its own slider bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniformStore {
    pub time: f32,
    pub position_frequency: f32,
    pub time_frequency: f32,
    pub strength: f32,
    pub warp_position_frequency: f32,
    pub warp_time_frequency: f32,
    pub warp_strength: f32,
}

impl Default for UniformStore {
    fn default() -> Self {
        Self {
            time: 0.0,
            position_frequency: 0.233,
            time_frequency: 0.13,
            strength: 0.492,
            warp_position_frequency: 0.4,
            warp_time_frequency: 0.3,
            warp_strength: 1.8,
        }
    }
}

impl UniformStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: UniformName) -> f32 {
        match name {
            UniformName::Time => self.time,
            UniformName::PositionFrequency => self.position_frequency,
            UniformName::TimeFrequency => self.time_frequency,
            UniformName::Strength => self.strength,
            UniformName::WarpPositionFrequency => self.warp_position_frequency,
            UniformName::WarpTimeFrequency => self.warp_time_frequency,
            UniformName::WarpStrength => self.warp_strength,
        }
    }

    pub fn set(&mut self, name: UniformName, value: f32) {
        let slot = match name {
            UniformName::Time => &mut self.time,
            UniformName::PositionFrequency => &mut self.position_frequency,
            UniformName::TimeFrequency => &mut self.time_frequency,
            UniformName::Strength => &mut self.strength,
            UniformName::WarpPositionFrequency => &mut self.warp_position_frequency,
            UniformName::WarpTimeFrequency => &mut self.warp_time_frequency,
            UniformName::WarpStrength => &mut self.warp_strength,
        };
        *slot = value;
    }

    /// Looks a parameter up by its shader-side name.
    pub fn get_by_name(&self, name: &str) -> Result<f32, ConfigError> {
        Ok(self.get(name.parse()?))
    }

    pub fn set_by_name(&mut self, name: &str, value: f32) -> Result<(), ConfigError> {
        self.set(name.parse()?, value);
        Ok(())
    }

    /// The only mutation the render loop performs.
    pub fn set_time(&mut self, elapsed: f32) {
        self.time = elapsed;
    }

    pub fn to_gpu(&self) -> WobbleUniform {
        WobbleUniform {
            time: self.time,
            position_frequency: self.position_frequency,
            time_frequency: self.time_frequency,
            strength: self.strength,
            warp_position_frequency: self.warp_position_frequency,
            warp_time_frequency: self.warp_time_frequency,
            warp_strength: self.warp_strength,
            _padding: 0.0,
        }
    }
}

/// GPU mirror of [`UniformStore`], laid out like `WobbleUniforms` in `wobble.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct WobbleUniform {
    pub time: f32,
    pub position_frequency: f32,
    pub time_frequency: f32,
    pub strength: f32,
    pub warp_position_frequency: f32,
    pub warp_time_frequency: f32,
    pub warp_strength: f32,
    _padding: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tuned_values() {
        let store = UniformStore::new();
        assert_eq!(store.time, 0.0);
        assert_eq!(store.position_frequency, 0.233);
        assert_eq!(store.time_frequency, 0.13);
        assert_eq!(store.strength, 0.492);
        assert_eq!(store.warp_position_frequency, 0.4);
        assert_eq!(store.warp_time_frequency, 0.3);
        assert_eq!(store.warp_strength, 1.8);
    }

    #[test]
    fn every_name_round_trips_through_get_and_set() {
        let mut store = UniformStore::new();
        for (index, name) in UniformName::ALL.into_iter().enumerate() {
            store.set(name, index as f32 + 0.5);
        }
        for (index, name) in UniformName::ALL.into_iter().enumerate() {
            assert_eq!(store.get(name), index as f32 + 0.5);
        }
    }

    #[test]
    fn writes_are_not_clamped() {
        let mut store = UniformStore::new();
        store.set_by_name("uStrength", 7.5).unwrap();
        assert_eq!(store.strength, 7.5);
    }

    #[test]
    fn unknown_name_is_a_config_error() {
        let mut store = UniformStore::new();
        let err = store.set_by_name("uColor", 1.0).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownUniform(name) if name == "uColor"));
    }

    #[test]
    fn gpu_block_is_sixteen_byte_aligned() {
        assert_eq!(std::mem::size_of::<WobbleUniform>() % 16, 0);
        let mut store = UniformStore::new();
        store.set_time(3.25);
        let gpu = store.to_gpu();
        assert_eq!(gpu.time, 3.25);
        assert_eq!(gpu.warp_strength, 1.8);
    }
}
