use std::collections::HashSet;

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
}

impl KeyCode {
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = parse_named_key(name) {
            return Some(key);
        }
        let mut chars = name.chars();
        let (Some(ch), None) = (chars.next(), chars.next()) else {
            return None;
        };
        if ch.is_ascii_alphabetic() {
            return Some(Self::Character(ch.to_ascii_uppercase()));
        }
        if ch.is_ascii_digit() {
            return Some(Self::Digit(ch as u8 - b'0'));
        }
        None
    }

    pub fn is_shift(self) -> bool {
        matches!(
            self,
            Self::Named(NamedKey::LeftShift) | Self::Named(NamedKey::RightShift)
        )
    }
}

fn parse_named_key(name: &str) -> Option<KeyCode> {
    use NamedKey::*;
    let key = match name {
        "Space" => Space,
        "Enter" | "Return" => Enter,
        "Tab" => Tab,
        "Left" | "ArrowLeft" => Left,
        "Right" | "ArrowRight" => Right,
        "Up" | "ArrowUp" => Up,
        "Down" | "ArrowDown" => Down,
        "Escape" | "Esc" => Escape,
        "LeftShift" | "LShift" => LeftShift,
        "RightShift" | "RShift" => RightShift,
        _ => return None,
    };
    Some(KeyCode::Named(key))
}

/// Keys the scene reacts to by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Enter,
    Tab,
    Left,
    Right,
    Up,
    Down,
    Escape,
    LeftShift,
    RightShift,
}

/// Identifier for a mouse button (left button is zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseButton(u8);

impl MouseButton {
    pub const LEFT: Self = Self(0);
    pub const RIGHT: Self = Self(1);
    pub const MIDDLE: Self = Self(2);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

/// Keyboard and pointer state, owned by the event loop.
#[derive(Debug, Default)]
pub struct InputState {
    keys: HashSet<KeyCode>,
    mouse_buttons: HashSet<MouseButton>,
    mouse_position: Option<Vec2>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the key was not already held.
    pub fn set_key_down(&mut self, key: KeyCode) -> bool {
        self.keys.insert(key)
    }

    pub fn set_key_up(&mut self, key: KeyCode) {
        self.keys.remove(&key);
    }

    pub fn set_mouse_button_down(&mut self, button: MouseButton) {
        self.mouse_buttons.insert(button);
    }

    pub fn set_mouse_button_up(&mut self, button: MouseButton) {
        self.mouse_buttons.remove(&button);
    }

    /// Records the pointer position and returns how far it moved since the
    /// previous one (zero for the first sample).
    pub fn set_mouse_position(&mut self, position: Vec2) -> Vec2 {
        let delta = self
            .mouse_position
            .map_or(Vec2::ZERO, |previous| position - previous);
        self.mouse_position = Some(position);
        delta
    }

    pub fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        self.mouse_buttons.contains(&button)
    }

    pub fn shift_held(&self) -> bool {
        self.keys.iter().any(|key| key.is_shift())
    }

    /// Forgets everything held, e.g. when the window loses focus.
    pub fn clear(&mut self) {
        self.keys.clear();
        self.mouse_buttons.clear();
        self.mouse_position = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_character_keys() {
        assert_eq!(
            KeyCode::from_name("Space"),
            Some(KeyCode::Named(NamedKey::Space))
        );
        assert_eq!(
            KeyCode::from_name("ArrowLeft"),
            Some(KeyCode::Named(NamedKey::Left))
        );
        assert_eq!(KeyCode::from_name("h"), Some(KeyCode::Character('H')));
        assert_eq!(KeyCode::from_name("7"), Some(KeyCode::Digit(7)));
        assert_eq!(KeyCode::from_name("hh"), None);
    }

    #[test]
    fn input_state_tracks_keys_and_shift() {
        let mut state = InputState::new();
        assert!(state.set_key_down(KeyCode::Named(NamedKey::LeftShift)));
        assert!(!state.set_key_down(KeyCode::Named(NamedKey::LeftShift)));
        assert!(state.shift_held());
        state.set_key_up(KeyCode::Named(NamedKey::LeftShift));
        assert!(!state.shift_held());
    }

    #[test]
    fn pointer_deltas_start_at_zero() {
        let mut state = InputState::new();
        assert_eq!(state.set_mouse_position(Vec2::new(10.0, 10.0)), Vec2::ZERO);
        assert_eq!(
            state.set_mouse_position(Vec2::new(14.0, 7.0)),
            Vec2::new(4.0, -3.0)
        );
        state.clear();
        assert_eq!(state.set_mouse_position(Vec2::new(0.0, 0.0)), Vec2::ZERO);
    }

    #[test]
    fn mouse_buttons_are_tracked() {
        let mut state = InputState::new();
        state.set_mouse_button_down(MouseButton::RIGHT);
        assert!(state.is_mouse_button_down(MouseButton::RIGHT));
        assert!(!state.is_mouse_button_down(MouseButton::LEFT));
        state.set_mouse_button_up(MouseButton::RIGHT);
        assert!(!state.is_mouse_button_down(MouseButton::RIGHT));
    }
}
