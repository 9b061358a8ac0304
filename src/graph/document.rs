//! Persisted graph document and editor layout sidecar
//!
//! The document is JSON with `vertices`, `edges` and `settings`. Editor node
//! positions live next to it in `<document>.layout` and are never needed for
//! execution.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Edge, Graph, GraphError, Vertex};

/// Suffix appended to the document path for the layout sidecar
pub const LAYOUT_SUFFIX: &str = ".layout";

/// On-disk shape of a graph
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub vertices: Vec<Vertex>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub settings: Map<String, Value>,
}

impl Graph {
    /// Build a graph from a parsed document.
    ///
    /// Start flags are taken as written; a document with several start
    /// vertices loads fine and is rejected only when a run begins.
    pub fn from_document(document: GraphDocument) -> Result<Self, GraphError> {
        let mut graph = Graph::new();
        for vertex in document.vertices {
            if graph.vertices.contains_key(&vertex.id) {
                return Err(GraphError::DuplicateVertex(vertex.id));
            }
            graph.vertices.insert(vertex.id.clone(), vertex);
        }
        for edge in document.edges {
            graph.add_edge(edge)?;
        }
        graph.settings = document.settings;
        Ok(graph)
    }

    /// Snapshot the graph as a document
    pub fn to_document(&self) -> GraphDocument {
        GraphDocument {
            vertices: self.vertices.values().cloned().collect(),
            edges: self.edges.clone(),
            settings: self.settings.clone(),
        }
    }

    pub fn from_json(text: &str) -> Result<Self, GraphError> {
        Self::from_document(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    /// Load a graph document from disk
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, GraphError> {
        let text = fs::read_to_string(path.as_ref())?;
        let graph = Self::from_json(&text)?;
        log::info!(
            "Loaded graph {} ({} vertices, {} edges)",
            path.as_ref().display(),
            graph.vertex_count(),
            graph.edges().len()
        );
        Ok(graph)
    }

    /// Write the graph document to disk
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), GraphError> {
        fs::write(path.as_ref(), self.to_json()?)?;
        Ok(())
    }
}

/// Editor node positions keyed by vertex id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Layout {
    pub positions: BTreeMap<String, [f64; 2]>,
}

impl Layout {
    /// Sidecar path for a document path
    pub fn sidecar_path(document: &Path) -> PathBuf {
        let mut name = document.as_os_str().to_os_string();
        name.push(LAYOUT_SUFFIX);
        PathBuf::from(name)
    }

    /// Grid layout: four per row starting at (150, 100) with 200px pitch
    pub fn auto(graph: &Graph) -> Self {
        let positions = graph
            .vertices()
            .enumerate()
            .map(|(i, v)| {
                let x = 150.0 + (i % 4) as f64 * 200.0;
                let y = 100.0 + (i / 4) as f64 * 200.0;
                (v.id.clone(), [x, y])
            })
            .collect();
        Self { positions }
    }

    /// Load the sidecar for `document`, regenerating it when absent or unreadable
    pub fn load_or_auto(document: &Path, graph: &Graph) -> Self {
        let path = Self::sidecar_path(document);
        let loaded = fs::read_to_string(&path)
            .ok()
            .and_then(|text| match serde_json::from_str::<Layout>(&text) {
                Ok(layout) => Some(layout),
                Err(e) => {
                    log::warn!("Ignoring unreadable layout {}: {}", path.display(), e);
                    None
                }
            });

        let mut layout = loaded.unwrap_or_else(|| Self::auto(graph));
        // Vertices added outside the editor still need a slot
        let auto = Self::auto(graph);
        for (id, pos) in auto.positions {
            layout.positions.entry(id).or_insert(pos);
        }
        layout
    }

    /// Write the sidecar next to `document`
    pub fn save(&self, document: &Path) -> Result<(), GraphError> {
        fs::write(Self::sidecar_path(document), serde_json::to_string(self)?)?;
        Ok(())
    }
}

/// Copy a document, its layout and every referenced asset into `out_dir`.
///
/// Assets land in `out_dir/assets/`. Missing assets are skipped with a
/// warning; returns the names of the assets actually copied.
pub fn export_bundle(
    graph: &Graph,
    layout: &Layout,
    assets_dir: &Path,
    out_dir: &Path,
) -> Result<Vec<String>, GraphError> {
    let asset_out = out_dir.join("assets");
    fs::create_dir_all(&asset_out)?;

    let document = out_dir.join("graph.json");
    graph.save_to_file(&document)?;
    layout.save(&document)?;

    let mut copied = Vec::new();
    for name in graph.referenced_assets() {
        let source = assets_dir.join(&name);
        if !source.is_file() {
            log::warn!("Asset {} not found, not bundled", source.display());
            continue;
        }
        fs::copy(&source, asset_out.join(&name))?;
        copied.push(name);
    }

    log::info!("Exported bundle to {} ({} assets)", out_dir.display(), copied.len());
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ActionSpec, TriggerSpec};
    use serde_json::json;

    fn sample() -> Graph {
        let mut graph = Graph::new();
        graph
            .add_vertex(Vertex::with_id("menu", "Menu").as_start().with_template("menu.png"))
            .unwrap();
        graph
            .add_vertex(Vertex::with_id("shop", "Shop").with_description("item list"))
            .unwrap();
        graph
            .add_edge(
                Edge::between("menu", "shop", TriggerSpec::template_match("shop_btn.png", 0.9))
                    .with_id("open")
                    .with_action(ActionSpec::click_match().with_param("modifiers", json!("ctrl")))
                    .with_priority(5)
                    .with_max_triggers(3)
                    .with_activation_threshold(2),
            )
            .unwrap();
        graph
            .add_edge(
                Edge::new(Some("shop"), None, TriggerSpec::ocr_watch([10, 20, 100, 40], "<", 500.0))
                    .with_id("alarm")
                    .with_action(ActionSpec::buzzer(800, 0.3))
                    .with_points(vec![1.0, 2.0, 3.0, 4.0]),
            )
            .unwrap();
        graph.settings.insert("background_mode".to_string(), json!(true));
        graph
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");

        let graph = sample();
        graph.save_to_file(&path).unwrap();
        let loaded = Graph::load_from_file(&path).unwrap();

        assert_eq!(loaded, graph);
        let open = loaded.find_edge("open").unwrap();
        assert_eq!(open.priority, 5);
        assert_eq!(open.max_triggers, 3);
        assert_eq!(open.activation_threshold, 2);
        assert_eq!(loaded.find_edge("alarm").unwrap().points, Some(vec![1.0, 2.0, 3.0, 4.0]));
        assert_eq!(loaded.settings.get("background_mode"), Some(&json!(true)));
    }

    #[test]
    fn test_document_field_names() {
        let value: Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        let edge = value["edges"]
            .as_array()
            .unwrap()
            .iter()
            .find(|e| e["id"] == "alarm")
            .unwrap();

        assert_eq!(edge["source_id"], "shop");
        assert!(edge["target_id"].is_null());
        assert_eq!(edge["trigger"]["type"], "ocr_watch");
        assert_eq!(edge["action"]["params"]["frequency"], 800);
        assert_eq!(edge["max_triggers"], -1);

        let vertex = &value["vertices"][0];
        assert!(vertex.get("is_start").is_some());
        assert!(vertex.get("template").is_some());
    }

    #[test]
    fn test_unknown_types_survive_round_trip() {
        let text = r#"{
            "vertices": [{"id": "a", "name": "A", "is_start": true}],
            "edges": [{"id": "x", "source_id": "a", "target_id": "a",
                       "trigger": {"type": "future_trigger", "params": {"k": [1, 2]}},
                       "action": {"type": "future_action", "params": {}}}],
            "settings": {}
        }"#;
        let graph = Graph::from_json(text).unwrap();
        let again = Graph::from_json(&graph.to_json().unwrap()).unwrap();
        assert_eq!(graph, again);
        assert_eq!(again.edges()[0].trigger.params["k"], json!([1, 2]));
    }

    #[test]
    fn test_multiple_start_flags_load_as_written() {
        let text = r#"{"vertices": [
            {"id": "a", "name": "A", "is_start": true},
            {"id": "b", "name": "B", "is_start": true}
        ]}"#;
        let graph = Graph::from_json(text).unwrap();
        assert_eq!(graph.start_vertices().len(), 2);
    }

    #[test]
    fn test_layout_sidecar_regenerated_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        let graph = sample();

        let layout = Layout::load_or_auto(&path, &graph);
        assert_eq!(layout, Layout::auto(&graph));
        assert_eq!(layout.positions["menu"], [150.0, 100.0]);
        assert_eq!(layout.positions["shop"], [350.0, 100.0]);

        let mut moved = layout.clone();
        moved.positions.insert("menu".to_string(), [10.0, 20.0]);
        moved.save(&path).unwrap();
        assert!(dir.path().join("graph.json.layout").is_file());

        let reloaded = Layout::load_or_auto(&path, &graph);
        assert_eq!(reloaded.positions["menu"], [10.0, 20.0]);
    }

    #[test]
    fn test_export_bundle_copies_existing_assets() {
        let assets = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        fs::write(assets.path().join("menu.png"), b"png").unwrap();

        let graph = sample();
        let copied = export_bundle(&graph, &Layout::auto(&graph), assets.path(), out.path()).unwrap();

        assert_eq!(copied, vec!["menu.png".to_string()]);
        assert!(out.path().join("assets/menu.png").is_file());
        assert!(out.path().join("graph.json.layout").is_file());
        assert_eq!(Graph::load_from_file(out.path().join("graph.json")).unwrap(), graph);
    }
}
