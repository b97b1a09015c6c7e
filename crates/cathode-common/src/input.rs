use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::types::{Pos, Size};

bitflags! {
    /// Keyboard modifier bits, encoded the xterm way: the wire value of a
    /// modified sequence is `1 + bits`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Modifiers: u8 {
        const SHIFT = 1 << 0;
        const ALT   = 1 << 1;
        const CTRL  = 1 << 2;
    }
}

impl Modifiers {
    /// Decode the `1 + bits` parameter carried by CSI sequences.
    pub fn from_param(param: u16) -> Self {
        Self::from_bits_truncate(param.saturating_sub(1) as u8)
    }

    pub fn to_param(self) -> u16 {
        1 + self.bits() as u16
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Char(char),
    Enter,
    Tab,
    BackTab,
    Backspace,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    F(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub modifiers: Modifiers,
}

impl KeyEvent {
    pub fn new(code: KeyCode, modifiers: Modifiers) -> Self {
        Self { code, modifiers }
    }

    pub fn plain(code: KeyCode) -> Self {
        Self::new(code, Modifiers::empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    WheelUp,
    WheelDown,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MouseAction {
    Down,
    Up,
    Move,
    Drag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MouseEvent {
    pub button: MouseButton,
    pub action: MouseAction,
    pub pos: Pos,
    pub modifiers: Modifiers,
}

/// A structured event delivered to a UI-app workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    /// Plain text that did not arrive as a key sequence (e.g. a paste).
    Text(String),
    Resize(Size),
    FocusGained,
    FocusLost,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_param_encoding() {
        assert_eq!(Modifiers::from_param(1), Modifiers::empty());
        assert_eq!(Modifiers::from_param(2), Modifiers::SHIFT);
        assert_eq!(Modifiers::from_param(5), Modifiers::CTRL);
        assert_eq!(
            Modifiers::from_param(8),
            Modifiers::SHIFT | Modifiers::ALT | Modifiers::CTRL
        );
        assert_eq!((Modifiers::CTRL | Modifiers::SHIFT).to_param(), 6);
    }
}
