//! Synthetic input
//!
//! The OS-level primitives sit behind [`InputInjector`] and [`Beeper`]. This
//! module adds the sequences actions are built from: scripted clicks, key
//! taps and holding modifier keys around another input with guaranteed
//! release.

use std::thread;
use std::time::Duration;

use serde_json::Value;

/// Name of the pseudo-key that clicks the left mouse button
pub const LEFT_CLICK: &str = "left_click";

/// Low-level input primitives. Coordinates are absolute screen pixels.
pub trait InputInjector: Send {
    fn move_cursor(&mut self, x: i32, y: i32) -> Result<(), InputError>;

    /// Relative pointer motion, used for camera control
    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), InputError>;

    fn mouse_down(&mut self) -> Result<(), InputError>;

    fn mouse_up(&mut self) -> Result<(), InputError>;

    fn key_down(&mut self, key: &str) -> Result<(), InputError>;

    fn key_up(&mut self, key: &str) -> Result<(), InputError>;
}

/// Audible notification
pub trait Beeper: Send {
    fn beep(&mut self, frequency: u32, duration: Duration) -> Result<(), InputError>;
}

/// Injector that only logs, for dry runs
#[derive(Debug, Default)]
pub struct NoopInjector;

impl InputInjector for NoopInjector {
    fn move_cursor(&mut self, x: i32, y: i32) -> Result<(), InputError> {
        log::debug!("[dry-run] move to ({}, {})", x, y);
        Ok(())
    }

    fn move_relative(&mut self, dx: i32, dy: i32) -> Result<(), InputError> {
        log::debug!("[dry-run] move by ({}, {})", dx, dy);
        Ok(())
    }

    fn mouse_down(&mut self) -> Result<(), InputError> {
        log::debug!("[dry-run] mouse down");
        Ok(())
    }

    fn mouse_up(&mut self) -> Result<(), InputError> {
        log::debug!("[dry-run] mouse up");
        Ok(())
    }

    fn key_down(&mut self, key: &str) -> Result<(), InputError> {
        log::debug!("[dry-run] key down {}", key);
        Ok(())
    }

    fn key_up(&mut self, key: &str) -> Result<(), InputError> {
        log::debug!("[dry-run] key up {}", key);
        Ok(())
    }
}

/// Beeper that writes to the log instead of making a sound
#[derive(Debug, Default)]
pub struct LogBeeper;

impl Beeper for LogBeeper {
    fn beep(&mut self, frequency: u32, duration: Duration) -> Result<(), InputError> {
        log::info!("BEEP {} Hz for {:?}", frequency, duration);
        Ok(())
    }
}

/// Modifier keys from an action parameter.
///
/// Accepts a comma-separated string (`"ctrl, shift"`) or a list of strings.
/// Blank entries are dropped.
pub fn parse_modifiers(value: Option<&Value>) -> Vec<String> {
    let names: Vec<&str> = match value {
        Some(Value::String(s)) => s.split(',').collect(),
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    };
    names
        .into_iter()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Hold `modifiers` while `body` runs.
///
/// Modifiers are pressed in order, followed by `settle` if any were given.
/// They are released in reverse order whether or not `body` succeeded. Press
/// and release failures are logged and do not stop the sequence.
pub fn with_modifiers<T>(
    input: &mut dyn InputInjector,
    modifiers: &[String],
    settle: Duration,
    body: impl FnOnce(&mut dyn InputInjector) -> Result<T, InputError>,
) -> Result<T, InputError> {
    for key in modifiers {
        if let Err(e) = input.key_down(key) {
            log::warn!("Failed to press modifier {}: {}", key, e);
        }
    }
    if !modifiers.is_empty() {
        thread::sleep(settle);
    }

    let result = body(&mut *input);

    for key in modifiers.iter().rev() {
        if let Err(e) = input.key_up(key) {
            log::warn!("Failed to release modifier {}: {}", key, e);
        }
    }

    result
}

/// Press and release the left button with a short hold
pub fn scripted_click(input: &mut dyn InputInjector, hold: Duration) -> Result<(), InputError> {
    input.mouse_down()?;
    thread::sleep(hold);
    input.mouse_up()
}

/// Move to an absolute screen point and click there
pub fn click_at(input: &mut dyn InputInjector, x: i32, y: i32, hold: Duration) -> Result<(), InputError> {
    input.move_cursor(x, y)?;
    scripted_click(input, hold)
}

/// Hold `key` for `duration`, always attempting the release once pressed
pub fn tap_key(input: &mut dyn InputInjector, key: &str, duration: Duration) -> Result<(), InputError> {
    input.key_down(key)?;
    thread::sleep(duration);
    input.key_up(key)
}

/// Input errors
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("Input injection failed: {0}")]
    Injection(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Not supported: {0}")]
    NotSupported(String),
}


#[cfg(test)]
mod tests {
    use super::fakes::{InputEvent, RecordingInjector};
    use super::*;
    use serde_json::json;
    use InputEvent::*;

    #[test]
    fn test_parse_modifiers_string_and_list() {
        assert_eq!(parse_modifiers(Some(&json!("ctrl, shift ,"))), vec!["ctrl", "shift"]);
        assert_eq!(parse_modifiers(Some(&json!(["alt", " ", "ctrl"]))), vec!["alt", "ctrl"]);
        assert!(parse_modifiers(Some(&json!(""))).is_empty());
        assert!(parse_modifiers(None).is_empty());
        assert!(parse_modifiers(Some(&json!(3))).is_empty());
    }

    #[test]
    fn test_modifiers_released_in_reverse() {
        let mut input = RecordingInjector::default();
        let mods = vec!["ctrl".to_string(), "shift".to_string()];

        with_modifiers(&mut input, &mods, Duration::ZERO, |i| click_at(i, 5, 6, Duration::ZERO)).unwrap();

        assert_eq!(
            input.events(),
            vec![
                KeyDown("ctrl".into()),
                KeyDown("shift".into()),
                Move(5, 6),
                Down,
                Up,
                KeyUp("shift".into()),
                KeyUp("ctrl".into()),
            ]
        );
    }

    #[test]
    fn test_modifiers_released_when_body_fails() {
        let mut input = RecordingInjector {
            fail_clicks: true,
            ..Default::default()
        };
        let mods = vec!["alt".to_string()];

        let result = with_modifiers(&mut input, &mods, Duration::ZERO, |i| click_at(i, 1, 1, Duration::ZERO));

        assert!(result.is_err());
        assert_eq!(input.events().last(), Some(&KeyUp("alt".into())));
    }

    #[test]
    fn test_failed_modifier_press_does_not_abort() {
        let mut input = RecordingInjector {
            failing_keys: vec!["hyper".to_string()],
            ..Default::default()
        };
        let mods = vec!["hyper".to_string(), "ctrl".to_string()];

        with_modifiers(&mut input, &mods, Duration::ZERO, |i| tap_key(i, "a", Duration::ZERO)).unwrap();

        assert_eq!(
            input.events(),
            vec![
                KeyDown("ctrl".into()),
                KeyDown("a".into()),
                KeyUp("a".into()),
                KeyUp("ctrl".into()),
                KeyUp("hyper".into()),
            ]
        );
    }
}
