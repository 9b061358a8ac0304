//! Execution engine
//!
//! Drives the perception-decide-act loop over a [`Graph`]: capture a frame,
//! evaluate the current vertex's outgoing edges in priority order, run the
//! first firing edge's action and move to its target. When nothing has moved
//! the engine for the dwell timeout it scans every vertex's reference image
//! and jumps to whichever one is on screen.

pub mod context;
pub mod handle;

use std::collections::HashSet;
use std::io;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::actions::{build_action, CompiledAction};
use crate::config::EngineSettings;
use crate::graph::{Edge, Graph, GraphError};
use crate::input::{Beeper, InputInjector};
use crate::triggers::{build_trigger, Trigger};
use crate::vision::{FrameSource, WindowTarget};

pub use context::{LastMatch, Runtime, SharedResources, TickContext};
pub use handle::{ChannelObserver, EngineHandle, StateObserver};

#[cfg(test)]
pub(crate) use context::testing;

/// An edge with its compiled trigger and action and its counters
struct CompiledEdge {
    spec: Edge,
    trigger: Box<dyn Trigger>,
    action: Option<CompiledAction>,
    /// Satisfied trigger evaluations
    match_count: u64,
    /// Firings
    exec_count: u64,
}

impl CompiledEdge {
    fn compile(spec: &Edge) -> Self {
        Self {
            trigger: build_trigger(&spec.trigger),
            action: spec.action.as_ref().map(build_action),
            spec: spec.clone(),
            match_count: 0,
            exec_count: 0,
        }
    }
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// `start` has not succeeded yet
    NotStarted,
    /// The window could not be captured; nothing was evaluated
    NoFrame,
    /// No edge fired and no recovery happened
    Idle,
    /// Only target-less edges fired
    Fired(Vec<String>),
    /// An edge fired and moved the engine
    Transitioned { edge: String, target: String },
    /// The stall scan moved the engine without running any action
    Recovered(String),
}

/// Counters of one edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeStatus {
    pub edge_id: String,
    pub match_count: u64,
    pub exec_count: u64,
    pub exhausted: bool,
}

/// Snapshot of a running engine for hosts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub current_vertex: Option<String>,
    pub running: bool,
    pub paused: bool,
    pub edges: Vec<EdgeStatus>,
}

/// Result of a run on a worker thread, with the resources to hand on
#[derive(Debug)]
pub struct RunOutcome {
    pub result: Result<(), EngineError>,
    pub resources: SharedResources,
}

/// The state machine driver
pub struct Engine {
    graph: Graph,
    edges: Vec<CompiledEdge>,
    runtime: Runtime,
    handle: EngineHandle,
    observer: Option<Box<dyn StateObserver>>,
    current: Option<String>,
    last_transition: Instant,
    /// Vertices whose reference image failed to load
    unrecoverable: HashSet<String>,
}

impl Engine {
    /// Build an engine over a snapshot of `graph`.
    ///
    /// The graph's settings bag is applied on top of `settings`. Triggers and
    /// actions are compiled here; malformed ones are logged and neutralized.
    pub fn new(
        graph: &Graph,
        mut settings: EngineSettings,
        target: Box<dyn WindowTarget>,
        input: Box<dyn InputInjector>,
        beeper: Box<dyn Beeper>,
    ) -> Self {
        settings.apply_graph_settings(&graph.settings);
        let frames = FrameSource::new(target, &settings);
        let edges = graph.edges().iter().map(CompiledEdge::compile).collect();

        Self {
            graph: graph.clone(),
            edges,
            runtime: Runtime::new(settings, frames, input, beeper, SharedResources::default()),
            handle: EngineHandle::default(),
            observer: None,
            current: None,
            last_transition: Instant::now(),
            unrecoverable: HashSet::new(),
        }
    }

    /// Reuse templates and the OCR handle from a previous engine
    pub fn with_resources(mut self, mut resources: SharedResources) -> Self {
        resources
            .templates
            .set_dir(self.runtime.settings.assets_dir.clone());
        self.runtime.resources = resources;
        self
    }

    pub fn with_observer(mut self, observer: impl StateObserver + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Control handle; clone it freely
    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.runtime.settings
    }

    pub fn current_vertex(&self) -> Option<&str> {
        self.current.as_deref()
    }

    /// Give up the engine, keeping what is worth reusing
    pub fn into_resources(self) -> SharedResources {
        self.runtime.resources
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            current_vertex: self.current.clone(),
            running: self.handle.is_running(),
            paused: self.handle.is_paused(),
            edges: self
                .edges
                .iter()
                .map(|e| EdgeStatus {
                    edge_id: e.spec.id.clone(),
                    match_count: e.match_count,
                    exec_count: e.exec_count,
                    exhausted: e.spec.is_exhausted(e.exec_count),
                })
                .collect(),
        }
    }

    /// Validate the graph and enter the start vertex.
    ///
    /// Fails without side effects when there is no single start vertex or a
    /// connected template trigger names an image that cannot be loaded.
    pub fn start(&mut self) -> Result<(), EngineError> {
        let start = match self.graph.start_vertices().as_slice() {
            [] => return Err(EngineError::NoStartVertex),
            [single] => single.id.clone(),
            many => {
                let mut ids: Vec<String> = many.iter().map(|v| v.id.clone()).collect();
                ids.sort();
                return Err(EngineError::AmbiguousStart(ids));
            }
        };

        self.check_templates()?;
        self.unrecoverable = self.load_reference_images();

        let name = self.vertex_name(&start);
        log::info!("Starting at {} ({})", name, start);
        self.last_transition = Instant::now();
        self.enter(start);
        Ok(())
    }

    fn check_templates(&mut self) -> Result<(), EngineError> {
        for edge in &self.edges {
            let connected = edge
                .spec
                .source_id
                .as_deref()
                .is_some_and(|id| self.graph.vertex(id).is_some());
            let Some(name) = edge.trigger.required_template().filter(|_| connected) else {
                continue;
            };
            if let Err(e) = self.runtime.resources.templates.get(name) {
                return Err(EngineError::MissingTemplate {
                    name: name.to_string(),
                    reason: e.to_string(),
                });
            }
        }
        Ok(())
    }

    fn load_reference_images(&mut self) -> HashSet<String> {
        let mut failed = HashSet::new();
        for vertex in self.graph.vertices() {
            let Some(template) = vertex.template.as_deref() else {
                continue;
            };
            if let Err(e) = self.runtime.resources.templates.get(template) {
                log::warn!("{} cannot be recovered to: {}", vertex.name, e);
                failed.insert(vertex.id.clone());
            }
        }
        failed
    }

    /// Run one perception-decide-act cycle without sleeping
    pub fn tick(&mut self) -> TickOutcome {
        let Some(current) = self.current.clone() else {
            return TickOutcome::NotStarted;
        };
        let Some(frame) = self.runtime.frames.capture() else {
            return TickOutcome::NoFrame;
        };
        let ctx = TickContext::new(frame);

        let mut fired = Vec::new();
        for index in self.outgoing(&current) {
            let edge = &mut self.edges[index];
            if edge.spec.is_exhausted(edge.exec_count) {
                continue;
            }
            if !edge.trigger.evaluate(&ctx, &mut self.runtime) {
                continue;
            }

            edge.match_count += 1;
            if !edge.spec.fires_on(edge.match_count) {
                log::debug!(
                    "Edge {} satisfied {} times, waiting for {}",
                    edge.spec.id,
                    edge.match_count,
                    edge.spec.effective_threshold()
                );
                continue;
            }
            edge.exec_count += 1;

            if let Some(action) = &edge.action {
                if let Err(e) = action.run(&ctx, &mut self.runtime) {
                    log::warn!("{} action on edge {} failed: {}", action.kind(), edge.spec.id, e);
                }
            }

            let edge_id = edge.spec.id.clone();
            match edge.spec.target_id.clone() {
                Some(target) if self.graph.vertex(&target).is_some() => {
                    log::info!(
                        "[{}] -> {} via {}",
                        self.vertex_name(&current),
                        self.vertex_name(&target),
                        edge_id
                    );
                    self.last_transition = Instant::now();
                    self.enter(target.clone());
                    return TickOutcome::Transitioned { edge: edge_id, target };
                }
                Some(target) => {
                    log::warn!("Edge {} points at unknown vertex {}", edge_id, target);
                    fired.push(edge_id);
                }
                None => fired.push(edge_id),
            }
        }

        if !fired.is_empty() {
            return TickOutcome::Fired(fired);
        }

        if self.is_stalled() {
            if let Some(found) = self.scan_for_state(&ctx, &current) {
                log::warn!(
                    "Stuck in {} for {:?}, recovered to {}",
                    self.vertex_name(&current),
                    self.last_transition.elapsed(),
                    self.vertex_name(&found)
                );
                self.last_transition = Instant::now();
                self.enter(found.clone());
                return TickOutcome::Recovered(found);
            }
        }

        TickOutcome::Idle
    }

    /// Indices of the edges leaving `vertex_id`, highest priority first.
    ///
    /// `edges` is compiled from the graph's edge list in order, so positions
    /// in one are positions in the other.
    fn outgoing(&self, vertex_id: &str) -> Vec<usize> {
        let all = self.graph.edges();
        self.graph
            .outgoing_edges(vertex_id)
            .into_iter()
            .filter_map(|edge| all.iter().position(|e| std::ptr::eq(e, edge)))
            .collect()
    }

    fn is_stalled(&self) -> bool {
        let recovery = &self.runtime.settings.recovery;
        recovery.enabled && self.last_transition.elapsed() > recovery.dwell_timeout()
    }

    /// First other vertex whose reference image is on screen
    fn scan_for_state(&mut self, ctx: &TickContext, current: &str) -> Option<String> {
        log::debug!("Scanning for other states");
        let threshold = self.runtime.settings.recovery.confidence;

        for vertex in self.graph.vertices() {
            if vertex.id == current || self.unrecoverable.contains(&vertex.id) {
                continue;
            }
            let Some(name) = vertex.template.as_deref() else {
                continue;
            };
            let Ok(template) = self.runtime.resources.templates.get(name) else {
                continue;
            };
            let hit = self
                .runtime
                .matcher
                .locate(ctx.frame.gray(), template, ctx.frame.scale_hint());
            if let Some(hit) = hit.filter(|h| h.confidence >= threshold) {
                log::debug!("{} visible at {:.3}", vertex.name, hit.confidence);
                return Some(vertex.id.clone());
            }
        }
        None
    }

    fn enter(&mut self, vertex_id: String) {
        if let Some(observer) = &self.observer {
            observer.on_state_changed(&vertex_id);
        }
        self.current = Some(vertex_id);
    }

    fn vertex_name(&self, vertex_id: &str) -> String {
        self.graph
            .vertex(vertex_id)
            .map_or_else(|| vertex_id.to_string(), |v| v.name.clone())
    }

    /// Loop until stopped. Starts the engine first if needed.
    pub fn run(&mut self) -> Result<(), EngineError> {
        if self.current.is_none() {
            self.start()?;
        }

        let timings = self.runtime.settings.timings.clone();
        let pause_poll = Runtime::millis(timings.pause_poll_ms);
        let capture_retry = Runtime::millis(timings.capture_retry_ms);
        let debounce = Runtime::millis(timings.transition_debounce_ms);
        let idle = Runtime::millis(timings.tick_idle_ms);

        while self.handle.is_running() {
            if self.handle.is_paused() {
                thread::sleep(pause_poll);
                continue;
            }

            let pause = match self.tick() {
                TickOutcome::NoFrame | TickOutcome::NotStarted => capture_retry,
                TickOutcome::Transitioned { .. } => debounce,
                _ => idle,
            };
            if pause > Duration::ZERO {
                thread::sleep(pause);
            }
        }

        log::info!("Engine stopped in {:?}", self.current);
        Ok(())
    }

    /// Run on a dedicated worker thread
    pub fn spawn(mut self) -> io::Result<JoinHandle<RunOutcome>> {
        thread::Builder::new()
            .name("sgbot-engine".to_string())
            .spawn(move || {
                let result = self.run();
                if let Err(e) = &result {
                    log::error!("Engine failed to start: {}", e);
                }
                RunOutcome {
                    result,
                    resources: self.into_resources(),
                }
            })
    }
}

/// Errors that keep a run from starting
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("No start vertex found")]
    NoStartVertex,
    #[error("More than one start vertex: {}", .0.join(", "))]
    AmbiguousStart(Vec<String>),
    #[error("Template {name} cannot be loaded: {reason}")]
    MissingTemplate { name: String, reason: String },
    #[error(transparent)]
    Graph(#[from] GraphError),
}
