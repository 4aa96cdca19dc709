use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::error;

use crate::context::{Context, Mode};
use crate::execute::{ExecuteError, ExecutionRegistry, Executor, ExecutorKind};
use crate::steps::{StepKind, StepTable, run_all};
use crate::watch::WatchCoordinator;

/// Cleans the build directory, then runs every site step concurrently.
///
/// In watch mode a failed build is logged rather than returned, and the
/// watch coordinator is started and kept for the lifetime of the executor.
pub struct BuildExecutor {
  table: Arc<StepTable>,
  registry: Arc<ExecutionRegistry>,
  watcher: Mutex<Option<WatchCoordinator>>,
}

impl BuildExecutor {
  pub fn new(table: Arc<StepTable>, registry: Arc<ExecutionRegistry>) -> Self {
    Self {
      table,
      registry,
      watcher: Mutex::new(None),
    }
  }

  /// Whether source watching has been started.
  pub fn is_watching(&self) -> bool {
    self.watcher.lock().unwrap_or_else(PoisonError::into_inner).is_some()
  }

  async fn build(&self, ctx: &Context) -> Result<(), ExecuteError> {
    let steps = self.table.resolve(&StepKind::FANOUT)?;
    let clean = self.table.get(StepKind::Clean)?;

    clean.run(ctx).await.map_err(|source| ExecuteError::Step {
      step: StepKind::Clean,
      source,
    })?;
    run_all(&steps, ctx, &self.registry).await
  }
}

impl Executor for BuildExecutor {
  fn kind(&self) -> ExecutorKind {
    ExecutorKind::Build
  }

  fn supports(&self, _ctx: &Context) -> bool {
    true
  }

  fn execute<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<(), ExecuteError>> {
    async move {
      let result = self.build(ctx).await;
      if ctx.mode() != Mode::Watch {
        return result;
      }

      if let Err(e) = result {
        error!(error = %e, "initial build failed, waiting for changes");
      }
      let coordinator = WatchCoordinator::start(Arc::new(ctx.clone()), &self.table, Arc::clone(&self.registry))?;
      *self.watcher.lock().unwrap_or_else(PoisonError::into_inner) = Some(coordinator);
      Ok(())
    }
    .boxed()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::{RecordingListener, TestStep, test_context_in};
  use tempfile::TempDir;

  fn table(steps: &[Arc<TestStep>]) -> Arc<StepTable> {
    let mut builder = StepTable::builder().register(Arc::new(crate::steps::CleanStep));
    for step in steps {
      builder = builder.register(step.clone());
    }
    Arc::new(builder.build())
  }

  fn fanout(fail: Option<StepKind>) -> Vec<Arc<TestStep>> {
    StepKind::FANOUT
      .iter()
      .map(|kind| {
        Arc::new(if Some(*kind) == fail {
          TestStep::failing(*kind)
        } else {
          TestStep::ok(*kind)
        })
      })
      .collect()
  }

  #[tokio::test]
  async fn build_cleans_then_runs_every_step_once() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context_in(temp.path(), Mode::Build);
    std::fs::create_dir_all(ctx.output_dir()).unwrap();
    std::fs::write(ctx.output_dir().join("stale.html"), "old").unwrap();

    let steps = fanout(None);
    let listener = Arc::new(RecordingListener::default());
    let registry = Arc::new(ExecutionRegistry::new(vec![listener.clone()]));
    let executor = BuildExecutor::new(table(&steps), registry);

    executor.execute(&ctx).await.unwrap();

    assert!(!ctx.output_dir().join("stale.html").exists());
    assert!(steps.iter().all(|s| s.runs() == 1));
    assert!(!listener.events().iter().any(|e| e.contains("Clean")));
    assert!(!executor.is_watching());
  }

  #[tokio::test]
  async fn build_failure_is_returned_outside_watch() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context_in(temp.path(), Mode::Build);
    let steps = fanout(Some(StepKind::Styles));
    let executor = BuildExecutor::new(table(&steps), Arc::default());

    let err = executor.execute(&ctx).await.unwrap_err();
    assert!(matches!(err, ExecuteError::Step { step: StepKind::Styles, .. }));
    assert!(steps.iter().all(|s| s.runs() == 1));
  }

  #[tokio::test]
  async fn watch_mode_survives_failed_build_and_starts_watching() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context_in(temp.path(), Mode::Watch);
    let steps = fanout(Some(StepKind::Content));
    let executor = BuildExecutor::new(table(&steps), Arc::default());

    executor.execute(&ctx).await.unwrap();
    assert!(executor.is_watching());
  }

  #[tokio::test]
  async fn missing_step_registration_fails_before_cleaning() {
    let temp = TempDir::new().unwrap();
    let ctx = test_context_in(temp.path(), Mode::Build);
    std::fs::create_dir_all(ctx.output_dir()).unwrap();
    let executor = BuildExecutor::new(table(&[]), Arc::default());

    let err = executor.execute(&ctx).await.unwrap_err();
    assert!(matches!(err, ExecuteError::UnregisteredStep(_)));
    assert!(ctx.output_dir().exists());
  }
}
