//! Executor orchestration.
//!
//! Executors are the high-level operations of one invocation: build, package,
//! deploy and serve. Each decides whether it applies to the current
//! [`Context`] and names the executors it depends on. An [`Execution`]
//! schedules the applicable executors with their dependencies and runs them
//! one after another, stopping at the first failure.

pub mod executors;
mod listener;
mod plan;
mod registry;

use std::collections::VecDeque;
use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, info};

use crate::context::{Context, ContextError};
use crate::deploy::DeployError;
use crate::package::PackageError;
use crate::serve::ServeError;
use crate::steps::{StepError, StepKind};
use crate::watch::WatchError;

pub use listener::{ExecutionListener, LogListener, NoopListener};
pub use plan::resolve_order;
pub use registry::{ExecutionRegistry, StepTiming};

/// Errors that stop an execution.
#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error(transparent)]
  Context(#[from] ContextError),

  /// A build step failed.
  #[error("{step} step failed: {source}")]
  Step {
    step: StepKind,
    #[source]
    source: StepError,
  },

  /// A step kind has no registered implementation.
  #[error("no implementation registered for step {0}")]
  UnregisteredStep(StepKind),

  /// An executor requires one that is not part of the execution.
  #[error("executor {executor} requires unknown executor {required}")]
  UnknownExecutor {
    executor: ExecutorKind,
    required: ExecutorKind,
  },

  /// Two executors of the same kind were supplied.
  #[error("executor {0} registered twice")]
  DuplicateExecutor(ExecutorKind),

  /// Executor dependencies form a cycle.
  #[error("dependency cycle detected")]
  CycleDetected,

  #[error(transparent)]
  Package(#[from] PackageError),

  #[error(transparent)]
  Deploy(#[from] DeployError),

  #[error(transparent)]
  Serve(#[from] ServeError),

  #[error(transparent)]
  Watch(#[from] WatchError),
}

/// Identifier of a high-level operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExecutorKind {
  Build,
  Package,
  Deploy,
  Serve,
}

impl ExecutorKind {
  pub fn name(self) -> &'static str {
    match self {
      ExecutorKind::Build => "build",
      ExecutorKind::Package => "package",
      ExecutorKind::Deploy => "deploy",
      ExecutorKind::Serve => "serve",
    }
  }
}

impl std::fmt::Display for ExecutorKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.name())
  }
}

/// A high-level operation with declared dependencies.
pub trait Executor: Send + Sync {
  fn kind(&self) -> ExecutorKind;

  /// Whether this executor applies to `ctx`.
  fn supports(&self, ctx: &Context) -> bool;

  /// Executors that must complete before this one starts.
  fn requires(&self) -> &'static [ExecutorKind] {
    &[]
  }

  fn execute<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<(), ExecuteError>>;
}

/// Runs the executors that apply to a context, dependencies first.
pub struct Execution {
  executors: Vec<Arc<dyn Executor>>,
}

impl std::fmt::Debug for Execution {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let kinds: Vec<_> = self.executors.iter().map(|e| e.kind()).collect();
    f.debug_struct("Execution").field("executors", &kinds).finish()
  }
}

impl Execution {
  /// Create an execution over `executors`, given in declaration order.
  ///
  /// Fails when a kind appears twice, a dependency names a kind that is not
  /// present, or the declared dependencies contain a cycle.
  pub fn new(executors: Vec<Arc<dyn Executor>>) -> Result<Self, ExecuteError> {
    plan::validate(&executors)?;
    Ok(Self { executors })
  }

  /// The executors that would run for `ctx`, in run order.
  pub fn plan(&self, ctx: &Context) -> Result<Vec<ExecutorKind>, ExecuteError> {
    Ok(
      resolve_order(&self.executors, ctx)?
        .iter()
        .map(|e| e.kind())
        .collect(),
    )
  }

  /// Run the applicable executors one at a time.
  ///
  /// Returns the kinds that ran. The first failing executor ends the run and
  /// its error is returned; nothing scheduled after it starts.
  pub async fn run(&self, ctx: &Context) -> Result<Vec<ExecutorKind>, ExecuteError> {
    let mut queue: VecDeque<Arc<dyn Executor>> = resolve_order(&self.executors, ctx)?.into();
    debug!(
      order = ?queue.iter().map(|e| e.kind()).collect::<Vec<_>>(),
      mode = %ctx.mode(),
      "execution planned"
    );

    let mut done = Vec::with_capacity(queue.len());
    while let Some(executor) = queue.pop_front() {
      let kind = executor.kind();
      info!(executor = %kind, "running executor");
      executor.execute(ctx).await?;
      done.push(kind);
    }
    Ok(done)
  }
}
