//! Vertex (state) representation

use serde::{Deserialize, Serialize};

/// A named state of the automation graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Unique identifier
    #[serde(default = "super::new_id")]
    pub id: String,
    /// Display name
    pub name: String,
    /// Free-text notes
    #[serde(default)]
    pub description: String,
    /// Reference image used to re-identify this state during recovery
    #[serde(default)]
    pub template: Option<String>,
    /// Whether execution starts here
    #[serde(default)]
    pub is_start: bool,
}

impl Vertex {
    /// Create a vertex with a fresh id
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(super::new_id(), name)
    }

    /// Create a vertex with an explicit id
    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            template: None,
            is_start: false,
        }
    }

    /// Set the reference image
    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Mark as the start state
    pub fn as_start(mut self) -> Self {
        self.is_start = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = Vertex::new("Shop");
        let b = Vertex::new("Shop");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_missing_optional_fields() {
        let vertex: Vertex = serde_json::from_str(r#"{"id": "v1", "name": "Idle"}"#).unwrap();
        assert_eq!(vertex.id, "v1");
        assert_eq!(vertex.description, "");
        assert_eq!(vertex.template, None);
        assert!(!vertex.is_start);
    }

    #[test]
    fn test_missing_id_is_generated() {
        let vertex: Vertex = serde_json::from_str(r#"{"name": "Idle"}"#).unwrap();
        assert!(!vertex.id.is_empty());
    }
}
