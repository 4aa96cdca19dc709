//! Build steps.
//!
//! A step is a named unit of work that turns source files into output files.
//! Steps are registered once in an immutable [`StepTable`] keyed by
//! [`StepKind`], run under the execution registry's at-most-one rule with
//! [`run_guarded`], and fanned out concurrently with [`run_all`].

mod clean;
mod content;
mod copy;
mod images;
mod styles;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use thiserror::Error;
use tracing::{debug, error};

use crate::authorship::{AuthorError, AuthorLookup};
use crate::context::Context;
use crate::execute::{ExecuteError, ExecutionRegistry};

pub use clean::CleanStep;
pub use content::ContentStep;
pub use copy::CopyStep;
pub use images::{ImagesStep, minify_svg};
pub use styles::StylesStep;

/// Identifier of a build step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StepKind {
  Clean,
  Content,
  Styles,
  Fonts,
  Images,
  Scripts,
  Other,
}

impl StepKind {
  /// Steps run concurrently by a full build, after [`StepKind::Clean`].
  pub const FANOUT: [StepKind; 6] = [
    StepKind::Content,
    StepKind::Styles,
    StepKind::Scripts,
    StepKind::Images,
    StepKind::Fonts,
    StepKind::Other,
  ];

  /// Registry key of the step. Unique across kinds.
  pub fn name(self) -> &'static str {
    match self {
      StepKind::Clean => "Clean",
      StepKind::Content => "Content",
      StepKind::Styles => "Styles",
      StepKind::Fonts => "Fonts",
      StepKind::Images => "Images",
      StepKind::Scripts => "Scripts",
      StepKind::Other => "Other",
    }
  }
}

impl std::fmt::Display for StepKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.name())
  }
}

/// Errors raised by a step's transformation.
#[derive(Debug, Error)]
pub enum StepError {
  /// `styles/index.css` is missing.
  #[error("main stylesheet not found: {0}")]
  MissingMainStylesheet(PathBuf),

  #[error("layout not found for {page}: {layout}")]
  MissingLayout { page: PathBuf, layout: String },

  #[error("invalid front matter in {path}: {source}")]
  FrontMatter {
    path: PathBuf,
    #[source]
    source: serde_yaml::Error,
  },

  #[error("failed to render {path}: {source}")]
  Template {
    path: PathBuf,
    #[source]
    source: minijinja::Error,
  },

  #[error("failed to process stylesheet {path}: {message}")]
  Css { path: PathBuf, message: String },

  #[error("failed to minify {path}: {message}")]
  Minify { path: PathBuf, message: String },

  #[error("No author found for file {0}! Did you forget to commit?")]
  MissingAuthor(PathBuf),

  #[error("author lookup failed: {0}")]
  Author(#[from] AuthorError),

  #[error("io error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("step task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

impl StepError {
  pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
    let path = path.into();
    move |source| StepError::Io { path, source }
  }
}

/// A named transformation of source files into output files.
pub trait Step: Send + Sync {
  fn kind(&self) -> StepKind;

  fn run<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<(), StepError>>;
}

/// Immutable mapping from step identifier to implementation.
#[derive(Clone, Default)]
pub struct StepTable {
  steps: HashMap<StepKind, Arc<dyn Step>>,
}

impl std::fmt::Debug for StepTable {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let mut kinds: Vec<_> = self.steps.keys().collect();
    kinds.sort();
    f.debug_struct("StepTable").field("steps", &kinds).finish()
  }
}

/// Collects step implementations before freezing them into a [`StepTable`].
#[derive(Default)]
pub struct StepTableBuilder {
  steps: HashMap<StepKind, Arc<dyn Step>>,
}

impl StepTableBuilder {
  /// Register `step` under its own kind, replacing any earlier registration.
  pub fn register(mut self, step: Arc<dyn Step>) -> Self {
    self.steps.insert(step.kind(), step);
    self
  }

  pub fn build(self) -> StepTable {
    StepTable { steps: self.steps }
  }
}

impl StepTable {
  pub fn builder() -> StepTableBuilder {
    StepTableBuilder::default()
  }

  /// The full set of site steps.
  pub fn standard(authors: Arc<dyn AuthorLookup>) -> Self {
    Self::builder()
      .register(Arc::new(CleanStep))
      .register(Arc::new(ContentStep::new(authors)))
      .register(Arc::new(StylesStep))
      .register(Arc::new(CopyStep::fonts()))
      .register(Arc::new(ImagesStep))
      .register(Arc::new(CopyStep::scripts()))
      .register(Arc::new(CopyStep::other()))
      .build()
  }

  /// Look up a step; an unregistered kind is a configuration error.
  pub fn get(&self, kind: StepKind) -> Result<Arc<dyn Step>, ExecuteError> {
    self.steps.get(&kind).cloned().ok_or(ExecuteError::UnregisteredStep(kind))
  }

  /// Resolve all of `kinds`, failing on the first unregistered one.
  pub fn resolve(&self, kinds: &[StepKind]) -> Result<Vec<Arc<dyn Step>>, ExecuteError> {
    kinds.iter().map(|kind| self.get(*kind)).collect()
  }
}

/// How a guarded run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
  Completed,
  /// The step was already running; nothing was done.
  Skipped,
}

/// Releases the registry entry when dropped, so the entry is released on
/// success, on error and when the run is cancelled.
struct RunningGuard<'a> {
  registry: &'a ExecutionRegistry,
  name: &'static str,
}

impl Drop for RunningGuard<'_> {
  fn drop(&mut self) {
    self.registry.signal_stop(self.name);
  }
}

/// Run `step` unless a run of the same step is already registered.
pub async fn run_guarded(step: &dyn Step, ctx: &Context, registry: &ExecutionRegistry) -> Result<StepOutcome, ExecuteError> {
  let kind = step.kind();
  if !registry.signal_start(kind.name()) {
    debug!(step = %kind, "step already running, skipped");
    return Ok(StepOutcome::Skipped);
  }
  let _guard = RunningGuard {
    registry,
    name: kind.name(),
  };

  step
    .run(ctx)
    .await
    .map(|()| StepOutcome::Completed)
    .map_err(|source| ExecuteError::Step { step: kind, source })
}

/// Run `steps` concurrently and wait for all of them to settle.
///
/// Siblings are never cancelled. The error of the first step to fail is
/// returned; later failures are logged.
pub async fn run_all(steps: &[Arc<dyn Step>], ctx: &Context, registry: &ExecutionRegistry) -> Result<(), ExecuteError> {
  let mut pending: FuturesUnordered<_> = steps
    .iter()
    .map(|step| run_guarded(step.as_ref(), ctx, registry))
    .collect();

  let mut first_error = None;
  while let Some(result) = pending.next().await {
    if let Err(e) = result {
      if first_error.is_none() {
        first_error = Some(e);
      } else {
        error!(error = %e, "step failed");
      }
    }
  }

  match first_error {
    Some(e) => Err(e),
    None => Ok(()),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::testutil::{RecordingListener, TestStep, test_context};
  use std::time::Duration;

  #[test]
  fn names_are_unique() {
    let mut names: Vec<_> = StepKind::FANOUT.iter().map(|k| k.name()).collect();
    names.push(StepKind::Clean.name());
    let count = names.len();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), count);
  }

  #[test]
  fn unregistered_step_fails_fast() {
    let table = StepTable::builder().register(Arc::new(TestStep::ok(StepKind::Fonts))).build();
    assert!(table.get(StepKind::Fonts).is_ok());
    let err = table.resolve(&[StepKind::Fonts, StepKind::Images]).err().unwrap();
    assert!(matches!(err, ExecuteError::UnregisteredStep(StepKind::Images)));
  }

  #[test]
  fn standard_table_covers_every_step() {
    let table = StepTable::standard(Arc::new(crate::authorship::StaticAuthors::default()));
    assert!(table.get(StepKind::Clean).is_ok());
    assert!(table.resolve(&StepKind::FANOUT).is_ok());
  }

  #[tokio::test]
  async fn guarded_run_releases_entry_on_error() {
    let (ctx, _temp) = test_context();
    let registry = ExecutionRegistry::default();
    let step = TestStep::failing(StepKind::Styles);

    let err = run_guarded(&step, &ctx, &registry).await.unwrap_err();
    assert!(matches!(err, ExecuteError::Step { step: StepKind::Styles, .. }));
    assert!(!registry.is_running("Styles"));
  }

  #[tokio::test]
  async fn guarded_run_skips_when_already_running() {
    let (ctx, _temp) = test_context();
    let registry = ExecutionRegistry::default();
    let step = TestStep::ok(StepKind::Images);

    assert!(registry.signal_start("Images"));
    let outcome = run_guarded(&step, &ctx, &registry).await.unwrap();
    assert_eq!(outcome, StepOutcome::Skipped);
    assert_eq!(step.runs(), 0);
    assert!(registry.is_running("Images"));
  }

  #[tokio::test]
  async fn fanout_runs_every_step_once_in_one_cycle() {
    let (ctx, _temp) = test_context();
    let listener = Arc::new(RecordingListener::default());
    let registry = ExecutionRegistry::new(vec![listener.clone()]);
    let concrete: Vec<Arc<TestStep>> = StepKind::FANOUT
      .iter()
      .map(|kind| Arc::new(TestStep::ok(*kind).with_delay(Duration::from_millis(20))))
      .collect();
    let steps: Vec<Arc<dyn Step>> = concrete.iter().map(|s| s.clone() as Arc<dyn Step>).collect();

    run_all(&steps, &ctx, &registry).await.unwrap();

    assert!(concrete.iter().all(|s| s.runs() == 1));
    let events = listener.events();
    assert_eq!(events.iter().filter(|e| *e == "build-start").count(), 1);
    assert_eq!(events.iter().filter(|e| *e == "build-stop").count(), 1);
    // All six start before any of them stops.
    let first_stop = events.iter().position(|e| e.starts_with("stop:")).unwrap();
    assert_eq!(events[..first_stop].iter().filter(|e| e.starts_with("start:")).count(), 6);
  }

  #[tokio::test]
  async fn fanout_lets_siblings_finish_after_failure() {
    let (ctx, _temp) = test_context();
    let registry = ExecutionRegistry::default();
    let failing = Arc::new(TestStep::failing(StepKind::Content));
    let slow = Arc::new(TestStep::ok(StepKind::Fonts).with_delay(Duration::from_millis(50)));
    let steps: Vec<Arc<dyn Step>> = vec![failing.clone(), slow.clone()];

    let err = run_all(&steps, &ctx, &registry).await.unwrap_err();

    assert!(matches!(err, ExecuteError::Step { step: StepKind::Content, .. }));
    assert_eq!(slow.runs(), 1);
    assert!(slow.finished());
    assert_eq!(registry.running_count(), 0);
  }

  #[tokio::test]
  async fn fanout_reports_first_failure_in_time() {
    let (ctx, _temp) = test_context();
    let registry = ExecutionRegistry::default();
    let late = Arc::new(TestStep::failing(StepKind::Styles).with_delay(Duration::from_millis(60)));
    let early = Arc::new(TestStep::failing(StepKind::Images));
    let steps: Vec<Arc<dyn Step>> = vec![late, early];

    let err = run_all(&steps, &ctx, &registry).await.unwrap_err();
    assert!(matches!(err, ExecuteError::Step { step: StepKind::Images, .. }));
  }
}
