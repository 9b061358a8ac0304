//! State Graph Bot - graph-driven visual automation for desktop game clients
//!
//! An automation is a directed graph: vertices are recognizable screens,
//! edges carry a perception trigger (template, pixel color, OCR number) and
//! an optional action (click, key press, camera centering, buzzer). The
//! [`engine::Engine`] polls the target window, fires the first satisfied edge
//! leaving the current vertex and follows it, recovering by reference image
//! when it gets stuck.
//!
//! ## Platform
//!
//! OS capture and input sit behind [`vision::WindowTarget`],
//! [`input::InputInjector`] and [`input::Beeper`]. The `desktop` feature
//! provides implementations based on `xcap` and `enigo` in `platform`.

pub mod actions;
pub mod config;
pub mod engine;
pub mod graph;
pub mod input;
#[cfg(feature = "desktop")]
pub mod platform;
pub mod triggers;
pub mod vision;

pub use config::EngineSettings;
pub use engine::{Engine, EngineError, EngineHandle, EngineStatus, SharedResources, StateObserver};
pub use graph::{ActionSpec, Edge, Graph, GraphError, TriggerSpec, Vertex};
