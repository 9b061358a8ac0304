//! Edge (transition) representation
//!
//! Triggers and actions are stored as an open `type` + `params` pair so that
//! documents written by newer editors load and save without loss. They are
//! compiled into executable form by the engine.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Trigger type names understood by the engine
pub mod trigger_kinds {
    pub const TEMPLATE_MATCH: &str = "template_match";
    pub const OCR_WATCH: &str = "ocr_watch";
    pub const COLOR_MATCH: &str = "color_match";
    pub const IMMEDIATE: &str = "immediate";
    pub const WAIT: &str = "wait";

    pub const ALL: [&str; 5] = [TEMPLATE_MATCH, OCR_WATCH, COLOR_MATCH, IMMEDIATE, WAIT];
}

/// Action type names understood by the engine
pub mod action_kinds {
    pub const CLICK_MATCH: &str = "click_match";
    pub const PRESS_KEY: &str = "press_key";
    pub const CLICK_POSITION: &str = "click_position";
    pub const WAIT: &str = "wait";
    pub const CENTER_CAMERA: &str = "center_camera";
    pub const BUZZER: &str = "buzzer";

    pub const ALL: [&str; 6] = [CLICK_MATCH, PRESS_KEY, CLICK_POSITION, WAIT, CENTER_CAMERA, BUZZER];
}

/// Serialized trigger: a type tag and its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl TriggerSpec {
    /// Create a trigger from a type name and a JSON object of parameters
    pub fn new(kind: impl Into<String>, params: Value) -> Self {
        Self {
            kind: kind.into(),
            params: into_map(params),
        }
    }

    pub fn immediate() -> Self {
        Self::new(trigger_kinds::IMMEDIATE, Value::Null)
    }

    pub fn template_match(template: &str, threshold: f32) -> Self {
        Self::new(
            trigger_kinds::TEMPLATE_MATCH,
            json!({ "template": template, "threshold": threshold, "invert": false }),
        )
    }

    pub fn template_absent(template: &str, threshold: f32) -> Self {
        Self::new(
            trigger_kinds::TEMPLATE_MATCH,
            json!({ "template": template, "threshold": threshold, "invert": true }),
        )
    }

    pub fn color_match(x: i32, y: i32, rgb: [u8; 3], tolerance: f64) -> Self {
        Self::new(
            trigger_kinds::COLOR_MATCH,
            json!({ "x": x, "y": y, "rgb": rgb, "tolerance": tolerance }),
        )
    }

    pub fn ocr_watch(region: [i32; 4], condition: &str, value: f64) -> Self {
        Self::new(
            trigger_kinds::OCR_WATCH,
            json!({ "region": region, "condition": condition, "value": value, "interval": 1.0 }),
        )
    }

    /// Template file referenced by a `template_match` trigger
    pub fn template_name(&self) -> Option<&str> {
        if self.kind != trigger_kinds::TEMPLATE_MATCH {
            return None;
        }
        self.params.get("template").and_then(Value::as_str).filter(|s| !s.is_empty())
    }
}

/// Serialized action: a type tag and its parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl ActionSpec {
    /// Create an action from a type name and a JSON object of parameters
    pub fn new(kind: impl Into<String>, params: Value) -> Self {
        Self {
            kind: kind.into(),
            params: into_map(params),
        }
    }

    pub fn click_match() -> Self {
        Self::new(action_kinds::CLICK_MATCH, Value::Null)
    }

    pub fn press_key(key: &str) -> Self {
        Self::new(action_kinds::PRESS_KEY, json!({ "key": key, "duration": 0.05 }))
    }

    pub fn click_position(x: i32, y: i32) -> Self {
        Self::new(action_kinds::CLICK_POSITION, json!({ "x": x, "y": y }))
    }

    pub fn wait(seconds: f64) -> Self {
        Self::new(action_kinds::WAIT, json!({ "duration": seconds }))
    }

    pub fn center_camera() -> Self {
        Self::new(action_kinds::CENTER_CAMERA, Value::Null)
    }

    pub fn buzzer(frequency: u32, seconds: f64) -> Self {
        Self::new(action_kinds::BUZZER, json!({ "frequency": frequency, "duration": seconds }))
    }

    /// Set or replace a single parameter
    pub fn with_param(mut self, key: &str, value: Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }
}

fn into_map(params: Value) -> Map<String, Value> {
    match params {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Maximum trigger count meaning "no limit"
pub const UNLIMITED: i64 = -1;

fn unlimited() -> i64 {
    UNLIMITED
}

fn single_activation() -> i64 {
    1
}

/// A directed, possibly conditional transition between two vertices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Unique identifier
    #[serde(default = "super::new_id")]
    pub id: String,
    /// Source vertex; `None` leaves the edge inert
    #[serde(default)]
    pub source_id: Option<String>,
    /// Target vertex; `None` fires the action without transitioning
    #[serde(default)]
    pub target_id: Option<String>,
    /// Perception check gating the transition
    pub trigger: TriggerSpec,
    /// Effect run when the edge fires
    #[serde(default)]
    pub action: Option<ActionSpec>,
    /// Higher is evaluated first
    #[serde(default)]
    pub priority: i32,
    /// Editor endpoints `[x1, y1, x2, y2]` for disconnected ends
    #[serde(default)]
    pub points: Option<Vec<f64>>,
    /// Firing cap, `-1` for unlimited
    #[serde(default = "unlimited")]
    pub max_triggers: i64,
    /// Satisfied observations required per firing
    #[serde(default = "single_activation")]
    pub activation_threshold: i64,
}

impl Edge {
    /// Create an edge with a fresh id
    pub fn new(source: Option<&str>, target: Option<&str>, trigger: TriggerSpec) -> Self {
        Self {
            id: super::new_id(),
            source_id: source.map(str::to_string),
            target_id: target.map(str::to_string),
            trigger,
            action: None,
            priority: 0,
            points: None,
            max_triggers: UNLIMITED,
            activation_threshold: 1,
        }
    }

    /// Create a connected edge
    pub fn between(source: &str, target: &str, trigger: TriggerSpec) -> Self {
        Self::new(Some(source), Some(target), trigger)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_action(mut self, action: ActionSpec) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_triggers(mut self, max_triggers: i64) -> Self {
        self.max_triggers = max_triggers;
        self
    }

    pub fn with_activation_threshold(mut self, threshold: i64) -> Self {
        self.activation_threshold = threshold;
        self
    }

    pub fn with_points(mut self, points: Vec<f64>) -> Self {
        self.points = Some(points);
        self
    }

    /// Activation threshold clamped to at least one
    pub fn effective_threshold(&self) -> u64 {
        self.activation_threshold.max(1) as u64
    }

    /// Whether the firing cap has been reached after `executions` firings
    pub fn is_exhausted(&self, executions: u64) -> bool {
        self.max_triggers >= 0 && executions >= self.max_triggers as u64
    }

    /// Whether the `match_count`-th satisfied observation fires the edge
    pub fn fires_on(&self, match_count: u64) -> bool {
        match_count > 0 && match_count % self.effective_threshold() == 0
    }

    pub fn is_outgoing_from(&self, vertex_id: &str) -> bool {
        self.source_id.as_deref() == Some(vertex_id)
    }

    /// Whether either endpoint refers to `vertex_id`
    pub fn touches(&self, vertex_id: &str) -> bool {
        self.source_id.as_deref() == Some(vertex_id) || self.target_id.as_deref() == Some(vertex_id)
    }
}
