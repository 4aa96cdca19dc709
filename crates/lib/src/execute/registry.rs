//! Execution status tracking.
//!
//! The registry records which named steps are running. A name can be
//! registered only once at a time; the transitions from zero to one running
//! step and from one to zero bracket a build cycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::trace;

use super::listener::ExecutionListener;

/// Start and finish time of one step run.
#[derive(Debug, Clone, Copy)]
pub struct StepTiming {
  pub started_at: Instant,
  pub finished_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct RegistryState {
  running: HashMap<String, StepTiming>,
  cycle_started_at: Option<Instant>,
}

/// Tracks running steps and notifies listeners of transitions.
#[derive(Default)]
pub struct ExecutionRegistry {
  state: Mutex<RegistryState>,
  listeners: Vec<Arc<dyn ExecutionListener>>,
}

impl std::fmt::Debug for ExecutionRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ExecutionRegistry")
      .field("state", &self.state)
      .field("listeners", &self.listeners.len())
      .finish()
  }
}

impl ExecutionRegistry {
  pub fn new(listeners: Vec<Arc<dyn ExecutionListener>>) -> Self {
    Self {
      state: Mutex::default(),
      listeners,
    }
  }

  fn lock(&self) -> MutexGuard<'_, RegistryState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Register `name` as running.
  ///
  /// Returns `false` without touching the existing entry when `name` is
  /// already running.
  pub fn signal_start(&self, name: &str) -> bool {
    let mut state = self.lock();
    if state.running.contains_key(name) {
      trace!(step = %name, "already running");
      return false;
    }

    let now = Instant::now();
    if state.running.is_empty() {
      state.cycle_started_at = Some(now);
      for listener in &self.listeners {
        listener.on_build_start();
      }
    }

    state.running.insert(
      name.to_string(),
      StepTiming {
        started_at: now,
        finished_at: None,
      },
    );
    for listener in &self.listeners {
      listener.on_step_start(name);
    }
    true
  }

  /// Mark `name` as finished. Does nothing when `name` is not running.
  pub fn signal_stop(&self, name: &str) {
    let mut state = self.lock();
    let Some(timing) = state.running.get_mut(name) else {
      trace!(step = %name, "stop for step that is not running");
      return;
    };

    let now = Instant::now();
    timing.finished_at = Some(now);
    let elapsed = now.duration_since(timing.started_at);
    for listener in &self.listeners {
      listener.on_step_stop(name, elapsed);
    }
    state.running.remove(name);

    if state.running.is_empty() {
      let total = state
        .cycle_started_at
        .take()
        .map(|start| now.duration_since(start))
        .unwrap_or(Duration::ZERO);
      for listener in &self.listeners {
        listener.on_build_stop(total);
      }
    }
  }

  pub fn is_running(&self, name: &str) -> bool {
    self.lock().running.contains_key(name)
  }

  /// When `name` started, if it is running.
  pub fn started_at(&self, name: &str) -> Option<Instant> {
    self.lock().running.get(name).map(|t| t.started_at)
  }

  pub fn running_count(&self) -> usize {
    self.lock().running.len()
  }
}
