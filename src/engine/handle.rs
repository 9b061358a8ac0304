//! Cross-thread control of a running engine

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::Sender;

/// Pause/resume/stop switch shared with hosts and hotkey handlers.
///
/// All operations are idempotent and may be called from any thread. The
/// engine reads the flags once per tick.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    running: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

impl Default for EngineHandle {
    fn default() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            paused: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl EngineHandle {
    pub fn pause(&self) {
        if !self.paused.swap(true, Ordering::SeqCst) {
            log::info!("Engine paused");
        }
    }

    pub fn resume(&self) {
        if self.paused.swap(false, Ordering::SeqCst) {
            log::info!("Engine resumed");
        }
    }

    /// Flip between paused and running, returning the new paused state
    pub fn toggle_pause(&self) -> bool {
        let paused = !self.paused.fetch_xor(true, Ordering::SeqCst);
        log::info!("Engine {}", if paused { "paused" } else { "resumed" });
        paused
    }

    /// Ask the loop to exit at the next tick boundary
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            log::info!("Stop requested");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

/// Receives the id of every vertex the engine enters.
///
/// Called on the engine thread. UI hosts should forward the id to their own
/// thread rather than touching widgets here; [`ChannelObserver`] does that.
pub trait StateObserver: Send {
    fn on_state_changed(&self, vertex_id: &str);
}

impl<F> StateObserver for F
where
    F: Fn(&str) + Send,
{
    fn on_state_changed(&self, vertex_id: &str) {
        self(vertex_id)
    }
}

/// Hands state changes to another thread over a channel
#[derive(Debug, Clone)]
pub struct ChannelObserver(Sender<String>);

impl ChannelObserver {
    pub fn new(sender: Sender<String>) -> Self {
        Self(sender)
    }
}

impl StateObserver for ChannelObserver {
    fn on_state_changed(&self, vertex_id: &str) {
        if self.0.send(vertex_id.to_string()).is_err() {
            log::debug!("State observer channel closed");
        }
    }
}
