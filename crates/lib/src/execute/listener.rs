//! Execution listeners.
//!
//! Listeners observe the lifetime of steps and build cycles. They are handed
//! to the [`ExecutionRegistry`](super::ExecutionRegistry) at construction and
//! notified in registration order.

use std::time::Duration;

use tracing::info;

/// Observes step and build cycle transitions.
///
/// Callbacks run while the registry holds its lock, so implementations must
/// return quickly and must not call back into the registry.
pub trait ExecutionListener: Send + Sync {
  /// The first step of a cycle started.
  fn on_build_start(&self) {}

  fn on_step_start(&self, _name: &str) {}

  fn on_step_stop(&self, _name: &str, _elapsed: Duration) {}

  /// The last running step of a cycle stopped.
  fn on_build_stop(&self, _total: Duration) {}
}

/// Ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl ExecutionListener for NoopListener {}

/// Emits a tracing event per transition.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl ExecutionListener for LogListener {
  fn on_build_start(&self) {
    info!("build started");
  }

  fn on_step_start(&self, name: &str) {
    info!(step = %name, "step started");
  }

  fn on_step_stop(&self, name: &str, elapsed: Duration) {
    info!(step = %name, ?elapsed, "step finished");
  }

  fn on_build_stop(&self, total: Duration) {
    info!(?total, "build finished");
  }
}
