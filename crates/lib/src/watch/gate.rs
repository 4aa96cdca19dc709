use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-step "rebuild running" flag.
#[derive(Debug, Default)]
pub struct RebuildGate {
  running: AtomicBool,
}

impl RebuildGate {
  /// Set the flag; `None` if it was already set.
  pub fn try_acquire(self: &Arc<Self>) -> Option<GateGuard> {
    self
      .running
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()
      .map(|_| GateGuard { gate: Arc::clone(self) })
  }

  pub fn is_closed(&self) -> bool {
    self.running.load(Ordering::Acquire)
  }
}

/// Clears the flag on drop.
#[derive(Debug)]
pub struct GateGuard {
  gate: Arc<RebuildGate>,
}

impl Drop for GateGuard {
  fn drop(&mut self) {
    self.gate.running.store(false, Ordering::Release);
  }
}
