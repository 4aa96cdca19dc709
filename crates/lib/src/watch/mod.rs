//! Source watching and rebuilds.
//!
//! Every entry of [`WATCH_TABLE`] ties a set of source directories to the
//! step that rebuilds them. Changes are debounced, then routed to a
//! [`StepWatcher`] which starts a rebuild unless one for the same step is
//! still in flight. Entries are independent of each other.

mod gate;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::context::{Context, SourceDir};
use crate::execute::{ExecuteError, ExecutionRegistry};
use crate::steps::{Step, StepKind, StepOutcome, StepTable, run_guarded};

pub use gate::{GateGuard, RebuildGate};

#[derive(Debug, Error)]
pub enum WatchError {
  #[error("failed to create file watcher: {0}")]
  Init(#[source] notify::Error),

  #[error("failed to watch {path}: {source}")]
  Watch {
    path: PathBuf,
    #[source]
    source: notify::Error,
  },

  #[error("rebuild of {step} timed out after {timeout:?}")]
  TimedOut { step: StepKind, timeout: Duration },
}

/// Source directories whose changes rebuild one step.
#[derive(Debug, Clone, Copy)]
pub struct WatchEntry {
  pub groups: &'static [SourceDir],
  pub step: StepKind,
}

pub const WATCH_TABLE: &[WatchEntry] = &[
  WatchEntry {
    groups: &[SourceDir::Layouts, SourceDir::Content],
    step: StepKind::Content,
  },
  // Utility classes in layouts and pages feed the stylesheet.
  WatchEntry {
    groups: &[SourceDir::Styles, SourceDir::Layouts, SourceDir::Content],
    step: StepKind::Styles,
  },
  WatchEntry {
    groups: &[SourceDir::Fonts],
    step: StepKind::Fonts,
  },
  WatchEntry {
    groups: &[SourceDir::Images],
    step: StepKind::Images,
  },
  WatchEntry {
    groups: &[SourceDir::Scripts],
    step: StepKind::Scripts,
  },
  WatchEntry {
    groups: &[SourceDir::Other],
    step: StepKind::Other,
  },
];

/// Whether a filesystem event should start a rebuild.
pub(crate) fn is_change(kind: &EventKind) -> bool {
  matches!(kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_))
}

/// Rebuilds one step, never more than one run at a time.
pub struct StepWatcher {
  step: Arc<dyn Step>,
  gate: Arc<RebuildGate>,
  ctx: Arc<Context>,
  registry: Arc<ExecutionRegistry>,
  timeout: Duration,
}

impl StepWatcher {
  pub fn new(step: Arc<dyn Step>, ctx: Arc<Context>, registry: Arc<ExecutionRegistry>, timeout: Duration) -> Self {
    Self {
      step,
      gate: Arc::new(RebuildGate::default()),
      ctx,
      registry,
      timeout,
    }
  }

  pub fn kind(&self) -> StepKind {
    self.step.kind()
  }

  /// True while a rebuild started by this watcher has not settled.
  pub fn is_rebuilding(&self) -> bool {
    self.gate.is_closed()
  }

  /// Start a rebuild, or drop the change when one is already in flight.
  ///
  /// A rebuild that overruns the timeout is reported but keeps the flag and
  /// its registry entry until it settles. Step work runs on blocking threads
  /// that cannot be interrupted, so the flag is cleared only once the step
  /// has really finished, whether it succeeded or failed.
  pub fn trigger(&self) -> Option<JoinHandle<()>> {
    let Some(guard) = self.gate.try_acquire() else {
      debug!(step = %self.kind(), "rebuild in flight, change dropped");
      return None;
    };

    let step = Arc::clone(&self.step);
    let ctx = Arc::clone(&self.ctx);
    let registry = Arc::clone(&self.registry);
    let timeout = self.timeout;

    Some(tokio::spawn(async move {
      let _guard = guard;
      let kind = step.kind();
      let run = run_guarded(step.as_ref(), &ctx, &registry);
      tokio::pin!(run);

      let result = match tokio::time::timeout(timeout, &mut run).await {
        Ok(result) => result,
        Err(_) => {
          let e = WatchError::TimedOut { step: kind, timeout };
          error!(step = %kind, error = %e, "rebuild overran, waiting for it to settle");
          run.await
        }
      };

      match result {
        Ok(StepOutcome::Completed) => info!(step = %kind, "rebuilt"),
        Ok(StepOutcome::Skipped) => debug!(step = %kind, "step busy, rebuild skipped"),
        Err(e) => error!(step = %kind, error = %e, "rebuild failed"),
      }
    }))
  }
}

/// Owns the filesystem watches of a watch session.
///
/// Dropping the coordinator stops watching.
pub struct WatchCoordinator {
  debouncers: Vec<Debouncer<RecommendedWatcher, RecommendedCache>>,
  dispatcher: JoinHandle<()>,
}

impl std::fmt::Debug for WatchCoordinator {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("WatchCoordinator")
      .field("watches", &self.debouncers.len())
      .finish()
  }
}

impl WatchCoordinator {
  /// Watch the source groups of every [`WATCH_TABLE`] entry.
  ///
  /// Source directories that do not exist are skipped with a warning.
  pub fn start(
    ctx: Arc<Context>,
    table: &StepTable,
    registry: Arc<ExecutionRegistry>,
  ) -> Result<Self, ExecuteError> {
    let (tx, mut rx) = mpsc::unbounded_channel::<usize>();
    let mut watchers = Vec::with_capacity(WATCH_TABLE.len());
    let mut debouncers = Vec::with_capacity(WATCH_TABLE.len());

    for (index, entry) in WATCH_TABLE.iter().enumerate() {
      let step = table.get(entry.step)?;
      watchers.push(StepWatcher::new(
        step,
        Arc::clone(&ctx),
        Arc::clone(&registry),
        ctx.rebuild_timeout(),
      ));

      let tx = tx.clone();
      let kind = entry.step;
      let mut debouncer = new_debouncer(ctx.debounce(), None, move |result: DebounceEventResult| match result {
        Ok(events) => {
          if events.iter().any(|e| is_change(&e.event.kind)) {
            let _ = tx.send(index);
          }
        }
        Err(errors) => {
          for e in errors {
            warn!(step = %kind, error = %e, "watch error");
          }
        }
      })
      .map_err(WatchError::Init)?;

      for group in entry.groups {
        let path = ctx.source_dir(*group);
        if !path.is_dir() {
          warn!(step = %kind, path = %path.display(), "source directory missing, not watched");
          continue;
        }
        debouncer
          .watch(&path, RecursiveMode::Recursive)
          .map_err(|source| WatchError::Watch {
            path: path.clone(),
            source,
          })?;
        debug!(step = %kind, path = %path.display(), "watching");
      }
      debouncers.push(debouncer);
    }

    let dispatcher = tokio::spawn(async move {
      while let Some(index) = rx.recv().await {
        if let Some(watcher) = watchers.get(index) {
          watcher.trigger();
        }
      }
    });

    info!(entries = WATCH_TABLE.len(), "watching sources");
    Ok(Self {
      debouncers,
      dispatcher,
    })
  }
}

impl Drop for WatchCoordinator {
  fn drop(&mut self) {
    self.dispatcher.abort();
  }
}
