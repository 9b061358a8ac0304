//! Typed access to trigger/action parameters
//!
//! Documents written by hand or by older editors sometimes store numbers as
//! strings, so numeric getters accept both.

use std::time::Duration;

use serde_json::{Map, Value};

pub trait ParamsExt {
    fn number(&self, key: &str) -> Option<f64>;
    fn text(&self, key: &str) -> Option<&str>;
    fn flag(&self, key: &str) -> Option<bool>;

    fn number_or(&self, key: &str, default: f64) -> f64 {
        self.number(key).unwrap_or(default)
    }

    fn flag_or(&self, key: &str, default: bool) -> bool {
        self.flag(key).unwrap_or(default)
    }

    /// Integer parameter, truncating fractional values
    fn int(&self, key: &str) -> Option<i64> {
        self.number(key).map(|v| v as i64)
    }

    /// Fixed-length list of integers, e.g. a region or a color
    fn int_list<const N: usize>(&self, key: &str) -> Option<[i64; N]>;

    /// Delay in seconds, negative values clamped to zero. Values too large
    /// for a `Duration` are an error.
    fn seconds_or(&self, key: &str, default: f64) -> Result<Duration, String> {
        let secs = self.number_or(key, default).max(0.0);
        Duration::try_from_secs_f64(secs).map_err(|_| format!("'{}' of {} seconds is out of range", key, secs))
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl ParamsExt for Map<String, Value> {
    fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(as_number).filter(|v| v.is_finite())
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    fn flag(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_f64().map(|v| v != 0.0),
            Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    fn int_list<const N: usize>(&self, key: &str) -> Option<[i64; N]> {
        let items = self.get(key)?.as_array()?;
        if items.len() != N {
            return None;
        }
        let mut out = [0i64; N];
        for (slot, item) in out.iter_mut().zip(items) {
            *slot = as_number(item)? as i64;
        }
        Some(out)
    }
}
