//! Live parameter panel.
//!
//! The panel is a list of bindings onto Uniform Store fields and surface
//! material properties. It is drawn as an egui window of sliders plus a
//! colour picker, and can also be driven from the keyboard; values written
//! through it are clamped to each binding's range. On mobile devices the
//! panel has no bindings, draws nothing and ignores every key.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::device::DeviceProfile;
use crate::error::ConfigError;
use crate::input::{KeyCode, NamedKey};
use crate::material::{format_hex_color, PhysicalMaterialParams};
use crate::uniforms::{UniformName, UniformStore};

/// Editable property of the surface material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaterialProperty {
    Metalness,
    Roughness,
    Transmission,
    Ior,
    Thickness,
    Color,
}

impl MaterialProperty {
    pub const ALL: [MaterialProperty; 6] = [
        MaterialProperty::Metalness,
        MaterialProperty::Roughness,
        MaterialProperty::Transmission,
        MaterialProperty::Ior,
        MaterialProperty::Thickness,
        MaterialProperty::Color,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MaterialProperty::Metalness => "metalness",
            MaterialProperty::Roughness => "roughness",
            MaterialProperty::Transmission => "transmission",
            MaterialProperty::Ior => "ior",
            MaterialProperty::Thickness => "thickness",
            MaterialProperty::Color => "color",
        }
    }

    fn range(self) -> (f32, f32) {
        match self {
            MaterialProperty::Ior | MaterialProperty::Thickness => (0.0, 10.0),
            _ => (0.0, 1.0),
        }
    }

    fn scalar_slot(self, material: &mut PhysicalMaterialParams) -> Option<&mut f32> {
        match self {
            MaterialProperty::Metalness => Some(&mut material.metalness),
            MaterialProperty::Roughness => Some(&mut material.roughness),
            MaterialProperty::Transmission => Some(&mut material.transmission),
            MaterialProperty::Ior => Some(&mut material.ior),
            MaterialProperty::Thickness => Some(&mut material.thickness),
            MaterialProperty::Color => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BindingTarget {
    Uniform(UniformName),
    Material(MaterialProperty),
}

impl BindingTarget {
    pub fn label(self) -> &'static str {
        match self {
            BindingTarget::Uniform(name) => name.as_str(),
            BindingTarget::Material(property) => property.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BindingValue {
    Scalar(f32),
    Color(String),
}

impl fmt::Display for BindingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingValue::Scalar(value) => write!(f, "{value:.3}"),
            BindingValue::Color(hex) => f.write_str(hex),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Binding {
    pub target: BindingTarget,
    pub min: f32,
    pub max: f32,
    pub step: f32,
    /// Shown but never written by the panel.
    pub read_only: bool,
    pub default: BindingValue,
}

impl Binding {
    pub fn label(&self) -> &'static str {
        self.target.label()
    }

    pub fn value(&self, uniforms: &UniformStore, material: &PhysicalMaterialParams) -> BindingValue {
        match self.target {
            BindingTarget::Uniform(name) => BindingValue::Scalar(uniforms.get(name)),
            BindingTarget::Material(MaterialProperty::Color) => BindingValue::Color(material.color_hex()),
            BindingTarget::Material(property) => {
                let mut copy = *material;
                let value = property.scalar_slot(&mut copy).map_or(0.0, |slot| *slot);
                BindingValue::Scalar(value)
            }
        }
    }
}

const SLIDER_STEP: f32 = 0.001;
const PANEL_TITLE: &str = "Control Panel";

/// Edit made through the egui window during one pass.
enum Edit {
    Scalar(f32),
    Color(String),
}

#[derive(Debug, Clone)]
pub struct ControlPanel {
    bindings: Vec<Binding>,
    selected: usize,
    visible: bool,
}

impl ControlPanel {
    pub fn new(profile: &DeviceProfile) -> Self {
        if !profile.panel_visible() {
            return Self {
                bindings: Vec::new(),
                selected: 0,
                visible: false,
            };
        }

        let store = UniformStore::default();
        let material = PhysicalMaterialParams::default();
        let mut bindings = Vec::with_capacity(UniformName::ALL.len() + MaterialProperty::ALL.len());
        for name in UniformName::ALL {
            let read_only = name == UniformName::Time;
            bindings.push(Binding {
                target: BindingTarget::Uniform(name),
                min: 0.0,
                max: if read_only { f32::INFINITY } else { 2.0 },
                step: SLIDER_STEP,
                read_only,
                default: BindingValue::Scalar(store.get(name)),
            });
        }
        for property in MaterialProperty::ALL {
            let (min, max) = property.range();
            let binding = Binding {
                target: BindingTarget::Material(property),
                min,
                max,
                step: SLIDER_STEP,
                read_only: false,
                default: BindingValue::Scalar(0.0),
            };
            let default = binding.value(&store, &material);
            bindings.push(Binding { default, ..binding });
        }

        Self {
            // Start on the first writable row.
            selected: bindings.iter().position(|b| !b.read_only).unwrap_or(0),
            bindings,
            visible: true,
        }
    }

    pub fn is_available(&self) -> bool {
        !self.bindings.is_empty()
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn selected(&self) -> Option<&Binding> {
        self.bindings.get(self.selected)
    }

    pub fn select(&mut self, label: &str) -> Result<(), ConfigError> {
        self.selected = self.index_of(label)?;
        Ok(())
    }

    pub fn select_next(&mut self) {
        if !self.bindings.is_empty() {
            self.selected = (self.selected + 1) % self.bindings.len();
        }
    }

    pub fn select_previous(&mut self) {
        if !self.bindings.is_empty() {
            self.selected = (self.selected + self.bindings.len() - 1) % self.bindings.len();
        }
    }

    pub fn toggle_visibility(&mut self) -> Result<bool, ConfigError> {
        if !self.is_available() {
            return Err(ConfigError::PanelUnavailable);
        }
        self.visible = !self.visible;
        Ok(self.visible)
    }

    /// Writes a scalar binding, clamped to its range. Returns the applied
    /// value.
    pub fn set(
        &self,
        label: &str,
        value: f32,
        uniforms: &mut UniformStore,
        material: &mut PhysicalMaterialParams,
    ) -> Result<f32, ConfigError> {
        let binding = &self.bindings[self.index_of(label)?];
        if binding.read_only {
            return Err(ConfigError::ReadOnly(label.to_string()));
        }
        let value = value.clamp(binding.min, binding.max);
        match binding.target {
            BindingTarget::Uniform(name) => uniforms.set(name, value),
            BindingTarget::Material(property) => {
                let slot = property
                    .scalar_slot(material)
                    .ok_or_else(|| ConfigError::NotAColor(label.to_string()))?;
                *slot = value;
            }
        }
        log::info!("{label} = {value:.3}");
        Ok(value)
    }

    pub fn set_color(
        &self,
        label: &str,
        hex: &str,
        material: &mut PhysicalMaterialParams,
    ) -> Result<(), ConfigError> {
        let binding = &self.bindings[self.index_of(label)?];
        if binding.target != BindingTarget::Material(MaterialProperty::Color) {
            return Err(ConfigError::NotAColor(label.to_string()));
        }
        material.set_color_hex(hex)?;
        log::info!("{label} = {hex}");
        Ok(())
    }

    /// Moves the selected binding by `steps` slider steps. On the colour row
    /// every sRGB channel moves by `steps` levels of 255, brightening or
    /// darkening the base colour. Read-only rows are left alone.
    pub fn nudge(
        &self,
        steps: f32,
        uniforms: &mut UniformStore,
        material: &mut PhysicalMaterialParams,
    ) -> Result<Option<f32>, ConfigError> {
        let Some(binding) = self.selected() else {
            return Err(ConfigError::PanelUnavailable);
        };
        if binding.read_only {
            return Ok(None);
        }
        match binding.value(uniforms, material) {
            BindingValue::Scalar(current) => {
                let value = self.set(binding.label(), current + steps * binding.step, uniforms, material)?;
                Ok(Some(value))
            }
            BindingValue::Color(_) => {
                let rgb = material
                    .color_srgb()
                    .map(|channel| (f32::from(channel) + steps).round().clamp(0.0, 255.0) as u8);
                self.set_color(binding.label(), &format_hex_color(rgb), material)?;
                Ok(None)
            }
        }
    }

    pub fn reset_selected(
        &self,
        uniforms: &mut UniformStore,
        material: &mut PhysicalMaterialParams,
    ) -> Result<(), ConfigError> {
        let Some(binding) = self.selected() else {
            return Err(ConfigError::PanelUnavailable);
        };
        if binding.read_only {
            return Ok(());
        }
        match &binding.default {
            BindingValue::Scalar(value) => {
                self.set(binding.label(), *value, uniforms, material)?;
            }
            BindingValue::Color(hex) => self.set_color(binding.label(), hex, material)?,
        }
        Ok(())
    }

    /// Applies one key press. Returns whether the panel consumed the key.
    pub fn handle_key(
        &mut self,
        key: KeyCode,
        shift: bool,
        uniforms: &mut UniformStore,
        material: &mut PhysicalMaterialParams,
    ) -> Result<bool, ConfigError> {
        if !self.is_available() {
            return Ok(false);
        }
        if key == KeyCode::Character('H') {
            let visible = self.toggle_visibility()?;
            log::info!("control panel {}", if visible { "shown" } else { "hidden" });
            return Ok(true);
        }
        if !self.visible {
            return Ok(false);
        }
        let multiplier = if shift { 10.0 } else { 1.0 };
        match key {
            KeyCode::Named(NamedKey::Tab) if shift => self.select_previous(),
            KeyCode::Named(NamedKey::Tab) => self.select_next(),
            KeyCode::Named(NamedKey::Right) => {
                self.nudge(multiplier, uniforms, material)?;
            }
            KeyCode::Named(NamedKey::Left) => {
                self.nudge(-multiplier, uniforms, material)?;
            }
            KeyCode::Character('R') => self.reset_selected(uniforms, material)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Draws the panel window into `ctx` and applies whatever the user edited.
    /// Returns whether the window was drawn; a hidden or unavailable panel
    /// draws nothing.
    pub fn show(
        &mut self,
        ctx: &egui::Context,
        uniforms: &mut UniformStore,
        material: &mut PhysicalMaterialParams,
    ) -> Result<bool, ConfigError> {
        if !self.visible || !self.is_available() {
            return Ok(false);
        }
        let response = egui::Window::new(PANEL_TITLE)
            .resizable(false)
            .default_pos([12.0, 12.0])
            .show(ctx, |ui| self.draw_rows(ui, uniforms, material));
        match response {
            Some(response) => {
                response.inner.unwrap_or(Ok(()))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn draw_rows(
        &mut self,
        ui: &mut egui::Ui,
        uniforms: &mut UniformStore,
        material: &mut PhysicalMaterialParams,
    ) -> Result<(), ConfigError> {
        let mut edited = None;
        for (index, binding) in self.bindings.iter().enumerate() {
            let mut label = egui::RichText::new(binding.label());
            if index == self.selected {
                label = label.strong();
            }
            let edit = match binding.value(uniforms, material) {
                value if binding.read_only => {
                    ui.weak(format!("{}: {value}", binding.label()));
                    None
                }
                BindingValue::Scalar(mut value) => {
                    let slider = egui::Slider::new(&mut value, binding.min..=binding.max)
                        .step_by(f64::from(binding.step))
                        .text(label);
                    ui.add(slider).changed().then_some(Edit::Scalar(value))
                }
                BindingValue::Color(_) => {
                    let mut rgb = material.color_srgb();
                    let changed = ui
                        .horizontal(|ui| {
                            let response = ui.color_edit_button_srgb(&mut rgb);
                            ui.label(label);
                            response.changed()
                        })
                        .inner;
                    changed.then(|| Edit::Color(format_hex_color(rgb)))
                }
            };
            if let Some(edit) = edit {
                edited = Some((index, edit));
            }
        }

        if let Some((index, edit)) = edited {
            self.selected = index;
            let label = self.bindings[index].label();
            match edit {
                Edit::Scalar(value) => {
                    self.set(label, value, uniforms, material)?;
                }
                Edit::Color(hex) => self.set_color(label, &hex, material)?,
            }
        }
        Ok(())
    }

    fn index_of(&self, label: &str) -> Result<usize, ConfigError> {
        if !self.is_available() {
            return Err(ConfigError::PanelUnavailable);
        }
        self.bindings
            .iter()
            .position(|binding| binding.label() == label)
            .ok_or_else(|| ConfigError::UnknownBinding(label.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desktop_panel() -> (ControlPanel, UniformStore, PhysicalMaterialParams) {
        (
            ControlPanel::new(&DeviceProfile::new(false, 8, 1.0)),
            UniformStore::default(),
            PhysicalMaterialParams::default(),
        )
    }

    #[test]
    fn exposes_every_uniform_and_material_property() {
        let (panel, _, _) = desktop_panel();
        assert_eq!(panel.bindings().len(), 13);
        assert!(panel.is_visible());
        assert_eq!(panel.selected().map(Binding::label), Some("uPositionFrequency"));
    }

    #[test]
    fn writes_are_clamped_to_slider_bounds() {
        let (panel, mut uniforms, mut material) = desktop_panel();
        assert_eq!(panel.set("uStrength", 5.0, &mut uniforms, &mut material), Ok(2.0));
        assert_eq!(uniforms.strength, 2.0);
        assert_eq!(panel.set("ior", -1.0, &mut uniforms, &mut material), Ok(0.0));
        assert_eq!(material.ior, 0.0);
        assert_eq!(panel.set("roughness", 0.5, &mut uniforms, &mut material), Ok(0.5));
        assert_eq!(material.roughness, 0.5);
    }

    #[test]
    fn time_is_read_only() {
        let (panel, mut uniforms, mut material) = desktop_panel();
        assert_eq!(
            panel.set("uTime", 1.0, &mut uniforms, &mut material),
            Err(ConfigError::ReadOnly("uTime".to_string()))
        );
    }

    #[test]
    fn unknown_and_mistyped_bindings_are_errors() {
        let (panel, mut uniforms, mut material) = desktop_panel();
        assert_eq!(
            panel.set("uNope", 1.0, &mut uniforms, &mut material),
            Err(ConfigError::UnknownBinding("uNope".to_string()))
        );
        assert_eq!(
            panel.set_color("metalness", "#ffffff", &mut material),
            Err(ConfigError::NotAColor("metalness".to_string()))
        );
        panel.set_color("color", "#102030", &mut material).unwrap();
        assert_eq!(material.color_hex(), "#102030");
    }

    #[test]
    fn keyboard_selects_nudges_and_resets() {
        let (mut panel, mut uniforms, mut material) = desktop_panel();
        let tab = KeyCode::Named(NamedKey::Tab);
        let right = KeyCode::Named(NamedKey::Right);

        // uPositionFrequency -> uTimeFrequency -> uStrength
        panel.handle_key(tab, false, &mut uniforms, &mut material).unwrap();
        panel.handle_key(tab, false, &mut uniforms, &mut material).unwrap();
        assert_eq!(panel.selected().map(Binding::label), Some("uStrength"));

        panel.handle_key(right, true, &mut uniforms, &mut material).unwrap();
        assert!((uniforms.strength - 0.502).abs() < 1e-6);

        panel
            .handle_key(KeyCode::Character('R'), false, &mut uniforms, &mut material)
            .unwrap();
        assert_eq!(uniforms.strength, 0.492);

        panel.handle_key(tab, true, &mut uniforms, &mut material).unwrap();
        assert_eq!(panel.selected().map(Binding::label), Some("uTimeFrequency"));
    }

    #[test]
    fn arrow_keys_brighten_and_darken_the_colour_row() {
        let (mut panel, mut uniforms, mut material) = desktop_panel();
        panel.select("color").unwrap();
        let right = KeyCode::Named(NamedKey::Right);
        let left = KeyCode::Named(NamedKey::Left);

        assert_eq!(panel.handle_key(right, true, &mut uniforms, &mut material), Ok(true));
        assert_eq!(material.color_hex(), "#dadada");
        assert_eq!(panel.handle_key(left, false, &mut uniforms, &mut material), Ok(true));
        assert_eq!(material.color_hex(), "#d9d9d9");

        panel
            .handle_key(KeyCode::Character('R'), false, &mut uniforms, &mut material)
            .unwrap();
        assert_eq!(material.color_hex(), "#d0d0d0");
    }

    #[test]
    fn colour_nudges_saturate_at_the_channel_limits() {
        let (mut panel, mut uniforms, mut material) = desktop_panel();
        panel.select("color").unwrap();
        material.set_color_hex("#fafafa").unwrap();
        assert_eq!(panel.nudge(10.0, &mut uniforms, &mut material), Ok(None));
        assert_eq!(material.color_hex(), "#ffffff");
        material.set_color_hex("#030303").unwrap();
        panel.nudge(-10.0, &mut uniforms, &mut material).unwrap();
        assert_eq!(material.color_hex(), "#000000");
    }

    fn run_panel(
        panel: &mut ControlPanel,
        uniforms: &mut UniformStore,
        material: &mut PhysicalMaterialParams,
    ) -> (bool, egui::FullOutput) {
        let ctx = egui::Context::default();
        let mut drawn = false;
        let output = ctx.run(egui::RawInput::default(), |ctx| {
            drawn = panel.show(ctx, uniforms, material).unwrap();
        });
        (drawn, output)
    }

    #[test]
    fn desktop_panel_draws_an_egui_window() {
        let (mut panel, mut uniforms, mut material) = desktop_panel();
        let (drawn, output) = run_panel(&mut panel, &mut uniforms, &mut material);
        assert!(drawn);
        assert!(output.platform_output.events.is_empty());
        // Drawing alone never writes a binding.
        assert_eq!(uniforms, UniformStore::default());
        assert_eq!(material, PhysicalMaterialParams::default());
    }

    #[test]
    fn hidden_and_mobile_panels_draw_nothing() {
        let (mut panel, mut uniforms, mut material) = desktop_panel();
        panel.toggle_visibility().unwrap();
        let (drawn, output) = run_panel(&mut panel, &mut uniforms, &mut material);
        assert!(!drawn);
        assert!(output.shapes.is_empty());

        let mut mobile = ControlPanel::new(&DeviceProfile::new(true, 8, 2.0));
        let (drawn, output) = run_panel(&mut mobile, &mut uniforms, &mut material);
        assert!(!drawn);
        assert!(output.shapes.is_empty());
    }

    #[test]
    fn hidden_panel_ignores_everything_but_the_toggle() {
        let (mut panel, mut uniforms, mut material) = desktop_panel();
        let h = KeyCode::Character('H');
        assert_eq!(panel.handle_key(h, false, &mut uniforms, &mut material), Ok(true));
        assert!(!panel.is_visible());
        let right = KeyCode::Named(NamedKey::Right);
        assert_eq!(panel.handle_key(right, false, &mut uniforms, &mut material), Ok(false));
        assert_eq!(uniforms.position_frequency, 0.233);
    }

    #[test]
    fn mobile_panel_is_absent() {
        let mut panel = ControlPanel::new(&DeviceProfile::new(true, 8, 2.0));
        let mut uniforms = UniformStore::default();
        let mut material = PhysicalMaterialParams::default();
        assert!(!panel.is_available());
        assert!(!panel.is_visible());
        assert_eq!(
            panel.handle_key(KeyCode::Character('H'), false, &mut uniforms, &mut material),
            Ok(false)
        );
        assert_eq!(
            panel.set("uStrength", 1.0, &mut uniforms, &mut material),
            Err(ConfigError::PanelUnavailable)
        );
    }
}
