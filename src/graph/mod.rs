//! Automation graph model
//!
//! Vertices are recognizable game screens, edges are conditional transitions
//! carrying a trigger and an optional action. The graph is a plain value: the
//! engine takes its own copy at construction, so an editor can keep mutating
//! the original while a run is in progress.

pub mod document;
pub mod edge;
pub mod params;
pub mod vertex;

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

pub use document::{GraphDocument, Layout};
pub use edge::{action_kinds, trigger_kinds, ActionSpec, Edge, TriggerSpec, UNLIMITED};
pub use params::ParamsExt;
pub use vertex::Vertex;

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// The state machine graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Graph {
    /// Vertices keyed by id
    vertices: BTreeMap<String, Vertex>,
    /// Edges in insertion order (ties in priority keep this order)
    edges: Vec<Edge>,
    /// Cross-cutting execution flags
    pub settings: Map<String, Value>,
}

impl Graph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a vertex, rejecting duplicate ids
    pub fn add_vertex(&mut self, vertex: Vertex) -> Result<(), GraphError> {
        if self.vertices.contains_key(&vertex.id) {
            return Err(GraphError::DuplicateVertex(vertex.id));
        }
        if vertex.is_start {
            self.clear_start_flags();
        }
        self.vertices.insert(vertex.id.clone(), vertex);
        Ok(())
    }

    /// Remove a vertex and every edge referencing it
    pub fn remove_vertex(&mut self, vertex_id: &str) -> Result<Vertex, GraphError> {
        let vertex = self
            .vertices
            .remove(vertex_id)
            .ok_or_else(|| GraphError::UnknownVertex(vertex_id.to_string()))?;
        self.edges.retain(|e| !e.touches(vertex_id));
        Ok(vertex)
    }

    /// Add an edge, rejecting duplicate ids
    pub fn add_edge(&mut self, edge: Edge) -> Result<(), GraphError> {
        if self.edges.iter().any(|e| e.id == edge.id) {
            return Err(GraphError::DuplicateEdge(edge.id));
        }
        self.edges.push(edge);
        Ok(())
    }

    /// Remove an edge by id
    pub fn remove_edge(&mut self, edge_id: &str) -> Result<Edge, GraphError> {
        let index = self
            .edges
            .iter()
            .position(|e| e.id == edge_id)
            .ok_or_else(|| GraphError::UnknownEdge(edge_id.to_string()))?;
        Ok(self.edges.remove(index))
    }

    /// Replace an existing edge in place, keeping its position
    pub fn replace_edge(&mut self, edge: Edge) -> Result<Edge, GraphError> {
        let slot = self
            .edges
            .iter_mut()
            .find(|e| e.id == edge.id)
            .ok_or_else(|| GraphError::UnknownEdge(edge.id.clone()))?;
        Ok(std::mem::replace(slot, edge))
    }

    pub fn rename_vertex(&mut self, vertex_id: &str, name: impl Into<String>) -> Result<(), GraphError> {
        self.vertex_mut(vertex_id)?.name = name.into();
        Ok(())
    }

    /// Set or clear the reference image of a vertex
    pub fn set_vertex_template(
        &mut self,
        vertex_id: &str,
        template: Option<String>,
    ) -> Result<(), GraphError> {
        self.vertex_mut(vertex_id)?.template = template.filter(|t| !t.is_empty());
        Ok(())
    }

    /// Make `vertex_id` the only start vertex
    pub fn set_start(&mut self, vertex_id: &str) -> Result<(), GraphError> {
        if !self.vertices.contains_key(vertex_id) {
            return Err(GraphError::UnknownVertex(vertex_id.to_string()));
        }
        for vertex in self.vertices.values_mut() {
            vertex.is_start = vertex.id == vertex_id;
        }
        Ok(())
    }

    fn clear_start_flags(&mut self) {
        for vertex in self.vertices.values_mut() {
            vertex.is_start = false;
        }
    }

    fn vertex_mut(&mut self, vertex_id: &str) -> Result<&mut Vertex, GraphError> {
        self.vertices
            .get_mut(vertex_id)
            .ok_or_else(|| GraphError::UnknownVertex(vertex_id.to_string()))
    }

    pub fn vertex(&self, vertex_id: &str) -> Option<&Vertex> {
        self.vertices.get(vertex_id)
    }

    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.vertices.values()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn find_edge(&self, edge_id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == edge_id)
    }

    /// All vertices flagged as start
    pub fn start_vertices(&self) -> Vec<&Vertex> {
        self.vertices.values().filter(|v| v.is_start).collect()
    }

    /// The start vertex, if exactly one is flagged
    pub fn start_vertex(&self) -> Option<&Vertex> {
        match self.start_vertices().as_slice() {
            [single] => Some(*single),
            _ => None,
        }
    }

    /// Edges leaving `vertex_id`, highest priority first, ties in insertion order
    pub fn outgoing_edges(&self, vertex_id: &str) -> Vec<&Edge> {
        let mut edges: Vec<&Edge> = self.edges.iter().filter(|e| e.is_outgoing_from(vertex_id)).collect();
        edges.sort_by(|a, b| b.priority.cmp(&a.priority));
        edges
    }

    /// Every image file the graph refers to
    pub fn referenced_assets(&self) -> BTreeSet<String> {
        let mut assets: BTreeSet<String> =
            self.vertices.values().filter_map(|v| v.template.clone()).collect();
        assets.extend(
            self.edges
                .iter()
                .filter_map(|e| e.trigger.template_name())
                .map(str::to_string),
        );
        assets
    }

    /// Human-readable problems that would make a run misbehave
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        match self.start_vertices().len() {
            0 => warnings.push("no start vertex".to_string()),
            1 => {}
            n => warnings.push(format!("{} vertices are flagged as start", n)),
        }

        for edge in &self.edges {
            for (end, id) in [("source", &edge.source_id), ("target", &edge.target_id)] {
                if let Some(id) = id {
                    if !self.vertices.contains_key(id) {
                        warnings.push(format!("edge {} {} refers to unknown vertex {}", edge.id, end, id));
                    }
                }
            }
            if !trigger_kinds::ALL.contains(&edge.trigger.kind.as_str()) {
                warnings.push(format!("edge {} has unknown trigger type '{}'", edge.id, edge.trigger.kind));
            }
            if let Some(action) = &edge.action {
                if !action_kinds::ALL.contains(&action.kind.as_str()) {
                    warnings.push(format!("edge {} has unknown action type '{}'", edge.id, action.kind));
                }
            }
        }

        warnings
    }
}

/// Graph editing and persistence errors
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Failed to access graph document: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid graph document: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Vertex id already exists: {0}")]
    DuplicateVertex(String),
    #[error("Edge id already exists: {0}")]
    DuplicateEdge(String),
    #[error("Unknown vertex: {0}")]
    UnknownVertex(String),
    #[error("Unknown edge: {0}")]
    UnknownEdge(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Graph {
        let mut graph = Graph::new();
        graph.add_vertex(Vertex::with_id("a", "Menu").as_start()).unwrap();
        graph.add_vertex(Vertex::with_id("b", "Shop").with_template("shop.png")).unwrap();
        graph.add_vertex(Vertex::with_id("c", "Confirm")).unwrap();
        graph
            .add_edge(Edge::between("a", "b", TriggerSpec::template_match("open.png", 0.8)).with_id("e1"))
            .unwrap();
        graph
            .add_edge(Edge::between("b", "c", TriggerSpec::immediate()).with_id("e2"))
            .unwrap();
        graph
            .add_edge(Edge::between("c", "a", TriggerSpec::immediate()).with_id("e3"))
            .unwrap();
        graph
    }

    #[test]
    fn test_remove_vertex_cascades_edges() {
        let mut graph = sample();
        graph.remove_vertex("b").unwrap();

        let ids: Vec<&str> = graph.edges().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["e3"]);
        assert!(graph.vertex("b").is_none());
    }

    #[test]
    fn test_set_start_is_exclusive() {
        let mut graph = sample();
        graph.set_start("c").unwrap();

        assert_eq!(graph.start_vertex().map(|v| v.id.as_str()), Some("c"));
        assert_eq!(graph.start_vertices().len(), 1);
        assert!(graph.set_start("missing").is_err());
    }

    #[test]
    fn test_adding_start_vertex_clears_previous() {
        let mut graph = sample();
        graph.add_vertex(Vertex::with_id("d", "Other").as_start()).unwrap();
        assert_eq!(graph.start_vertex().map(|v| v.id.as_str()), Some("d"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut graph = sample();
        assert!(matches!(
            graph.add_vertex(Vertex::with_id("a", "Again")),
            Err(GraphError::DuplicateVertex(_))
        ));
        assert!(matches!(
            graph.add_edge(Edge::between("a", "c", TriggerSpec::immediate()).with_id("e1")),
            Err(GraphError::DuplicateEdge(_))
        ));
    }

    #[test]
    fn test_outgoing_edges_sorted_by_priority_stable() {
        let mut graph = sample();
        graph
            .add_edge(Edge::between("a", "c", TriggerSpec::immediate()).with_id("low").with_priority(-1))
            .unwrap();
        graph
            .add_edge(Edge::between("a", "c", TriggerSpec::immediate()).with_id("high").with_priority(5))
            .unwrap();
        graph
            .add_edge(Edge::between("a", "b", TriggerSpec::immediate()).with_id("tie"))
            .unwrap();
        graph
            .add_edge(Edge::new(None, Some("a"), TriggerSpec::immediate()).with_id("dangling"))
            .unwrap();

        let order: Vec<&str> = graph.outgoing_edges("a").iter().map(|e| e.id.as_str()).collect();
        assert_eq!(order, vec!["high", "e1", "tie", "low"]);
    }

    #[test]
    fn test_referenced_assets() {
        let graph = sample();
        let assets: Vec<String> = graph.referenced_assets().into_iter().collect();
        assert_eq!(assets, vec!["open.png".to_string(), "shop.png".to_string()]);
    }

    #[test]
    fn test_replace_and_remove_edge() {
        let mut graph = sample();
        let replacement = Edge::between("b", "a", TriggerSpec::immediate()).with_id("e2").with_priority(3);
        graph.replace_edge(replacement).unwrap();
        assert_eq!(graph.edges()[1].priority, 3);

        graph.remove_edge("e2").unwrap();
        assert!(graph.find_edge("e2").is_none());
        assert!(graph.remove_edge("e2").is_err());
    }

    #[test]
    fn test_rename_and_template_edit() {
        let mut graph = sample();
        graph.rename_vertex("a", "Main Menu").unwrap();
        graph.set_vertex_template("a", Some("menu.png".to_string())).unwrap();
        graph.set_vertex_template("b", Some(String::new())).unwrap();

        assert_eq!(graph.vertex("a").unwrap().name, "Main Menu");
        assert_eq!(graph.vertex("a").unwrap().template.as_deref(), Some("menu.png"));
        assert_eq!(graph.vertex("b").unwrap().template, None);
    }

    #[test]
    fn test_validate_reports_problems() {
        let mut graph = sample();
        assert!(graph.validate().is_empty());

        graph
            .add_edge(Edge::between("a", "ghost", TriggerSpec::new("teleport", Value::Null)))
            .unwrap();
        graph.vertex_mut("c").unwrap().is_start = true;

        let warnings = graph.validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().any(|w| w.contains("flagged as start")));
        assert!(warnings.iter().any(|w| w.contains("ghost")));
        assert!(warnings.iter().any(|w| w.contains("teleport")));
        assert!(graph.start_vertex().is_none());
    }
}
