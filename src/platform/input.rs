use enigo::{Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use crate::input::{InputError, InputInjector};

/// OS-level input through `enigo`
pub struct EnigoInjector {
    enigo: Enigo,
}

impl EnigoInjector {
    pub fn new() -> Result<Self, InputError> {
        let enigo = Enigo::new(&Settings::default()).map_err(|e| InputError::Injection(e.to_string()))?;
        Ok(Self { enigo })
    }

    fn key(&mut self, name: &str, direction: Direction) -> Result<(), InputError> {
        let key = parse_key(name)?;
        self.enigo
            .key(key, direction)
            .map_err(|e| InputError::Injection(e.to_string()))
    }

    fn left_button(&mut self, direction: Direction) -> Result<(), InputError> {
        self.enigo
            .button(Button::Left, direction)
            .map_err(|e| InputError::Injection(e.to_string()))
    }
}

impl InputInjector for EnigoInjector {
    fn move_cursor(&mut self, x: i32, y: i32) -> Result<(), InputError> {
        self.enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| InputError::Injection(e.to_string()))
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), InputError> {
        self.enigo
            .move_mouse(dx, dy, Coordinate::Rel)
            .map_err(|e| InputError::Injection(e.to_string()))
    }

    fn mouse_down(&mut self) -> Result<(), InputError> {
        self.left_button(Direction::Press)
    }

    fn mouse_up(&mut self) -> Result<(), InputError> {
        self.left_button(Direction::Release)
    }

    fn key_down(&mut self, key: &str) -> Result<(), InputError> {
        self.key(key, Direction::Press)
    }

    fn key_up(&mut self, key: &str) -> Result<(), InputError> {
        self.key(key, Direction::Release)
    }
}

/// Map a symbolic key name to an `enigo` key.
///
/// Names are case-insensitive. Single characters map to themselves.
pub fn parse_key(name: &str) -> Result<Key, InputError> {
    let lower = name.trim().to_lowercase();
    let key = match lower.as_str() {
        "ctrl" | "control" => Key::Control,
        "shift" => Key::Shift,
        "alt" => Key::Alt,
        "win" | "meta" | "cmd" | "super" => Key::Meta,
        "enter" | "return" => Key::Return,
        "esc" | "escape" => Key::Escape,
        "tab" => Key::Tab,
        "space" => Key::Space,
        "backspace" => Key::Backspace,
        "delete" | "del" => Key::Delete,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" | "pgup" => Key::PageUp,
        "pagedown" | "pgdn" => Key::PageDown,
        "up" => Key::UpArrow,
        "down" => Key::DownArrow,
        "left" => Key::LeftArrow,
        "right" => Key::RightArrow,
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,
        other => {
            let mut chars = other.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Key::Unicode(c),
                _ => return Err(InputError::InvalidKey(name.to_string())),
            }
        }
    };
    Ok(key)
}
