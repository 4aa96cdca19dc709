//! Test helpers shared across modules.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tempfile::TempDir;
use tokio::sync::Notify;

use crate::consts::{ENV_DEPLOY_DIR, ENV_DEPLOY_HOST, ENV_DEPLOY_KEY, ENV_DEPLOY_PORT, ENV_DEPLOY_USER};
use crate::context::{Context, ContextOptions, DeployTarget, EnvVars, Mode};
use crate::deploy::{DeployError, DeployTransport, RemoteOutput};
use crate::execute::{ExecuteError, ExecutionListener, Executor, ExecutorKind};
use crate::steps::{Step, StepError, StepKind};

/// Write `contents` to `path`, creating parent directories.
pub fn write_file(path: &Path, contents: impl AsRef<[u8]>) {
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(path, contents).unwrap();
}

pub fn test_context_in(root: &Path, mode: Mode) -> Context {
  Context::resolve(
    ContextOptions {
      mode,
      project_root: root.to_path_buf(),
      ..ContextOptions::default()
    },
    &EnvVars::default(),
  )
  .unwrap()
}

/// A build-mode context over a fresh temporary project.
pub fn test_context() -> (Context, TempDir) {
  let temp = TempDir::new().unwrap();
  let ctx = test_context_in(temp.path(), Mode::Build);
  (ctx, temp)
}

pub fn deploy_context_with_key(root: &Path, key: &Path) -> Context {
  let env = EnvVars::from_pairs([
    (ENV_DEPLOY_HOST, "example.org".to_string()),
    (ENV_DEPLOY_PORT, "22".to_string()),
    (ENV_DEPLOY_USER, "www".to_string()),
    (ENV_DEPLOY_KEY, key.to_string_lossy().into_owned()),
    (ENV_DEPLOY_DIR, "/var/www/site".to_string()),
  ]);
  Context::resolve(
    ContextOptions {
      mode: Mode::Deploy,
      project_root: root.to_path_buf(),
      ..ContextOptions::default()
    },
    &env,
  )
  .unwrap()
}

pub fn deploy_context_in(root: &Path) -> Context {
  deploy_context_with_key(root, &root.join("id_ed25519"))
}

/// Records listener callbacks as short strings.
#[derive(Debug, Default)]
pub struct RecordingListener {
  events: Mutex<Vec<String>>,
}

impl RecordingListener {
  pub fn events(&self) -> Vec<String> {
    self.events.lock().unwrap().clone()
  }

  fn push(&self, event: String) {
    self.events.lock().unwrap().push(event);
  }
}

impl ExecutionListener for RecordingListener {
  fn on_build_start(&self) {
    self.push("build-start".into());
  }

  fn on_step_start(&self, name: &str) {
    self.push(format!("start:{name}"));
  }

  fn on_step_stop(&self, name: &str, _elapsed: Duration) {
    self.push(format!("stop:{name}"));
  }

  fn on_build_stop(&self, _total: Duration) {
    self.push("build-stop".into());
  }
}

/// A step that counts its runs and can be slowed, blocked or made to fail.
pub struct TestStep {
  kind: StepKind,
  fail: bool,
  delay: Duration,
  block: Option<Arc<Notify>>,
  started: Notify,
  runs: AtomicUsize,
  finished: AtomicBool,
}

impl TestStep {
  pub fn ok(kind: StepKind) -> Self {
    Self {
      kind,
      fail: false,
      delay: Duration::ZERO,
      block: None,
      started: Notify::new(),
      runs: AtomicUsize::new(0),
      finished: AtomicBool::new(false),
    }
  }

  pub fn failing(kind: StepKind) -> Self {
    Self {
      fail: true,
      ..Self::ok(kind)
    }
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = delay;
    self
  }

  /// Hold every run until `release` is notified.
  pub fn blocked_on(mut self, release: Arc<Notify>) -> Self {
    self.block = Some(release);
    self
  }

  pub fn runs(&self) -> usize {
    self.runs.load(Ordering::SeqCst)
  }

  /// Whether a run reached its end.
  pub fn finished(&self) -> bool {
    self.finished.load(Ordering::SeqCst)
  }

  /// Wait until a run has started.
  pub async fn wait_started(&self) {
    self.started.notified().await;
  }
}

impl Step for TestStep {
  fn kind(&self) -> StepKind {
    self.kind
  }

  fn run<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, Result<(), StepError>> {
    async move {
      self.runs.fetch_add(1, Ordering::SeqCst);
      self.started.notify_one();
      if !self.delay.is_zero() {
        tokio::time::sleep(self.delay).await;
      }
      if let Some(release) = &self.block {
        release.notified().await;
      }
      self.finished.store(true, Ordering::SeqCst);

      if self.fail {
        return Err(StepError::Minify {
          path: self.kind.name().into(),
          message: "induced failure".into(),
        });
      }
      Ok(())
    }
    .boxed()
  }
}

/// A step whose work sleeps on a blocking thread, tracking overlapping runs.
pub struct BlockingStep {
  kind: StepKind,
  work: Duration,
  runs: AtomicUsize,
  active: Arc<AtomicUsize>,
  max_active: Arc<AtomicUsize>,
}

impl BlockingStep {
  pub fn new(kind: StepKind, work: Duration) -> Self {
    Self {
      kind,
      work,
      runs: AtomicUsize::new(0),
      active: Arc::default(),
      max_active: Arc::default(),
    }
  }

  pub fn runs(&self) -> usize {
    self.runs.load(Ordering::SeqCst)
  }

  /// Highest number of runs seen working at the same moment.
  pub fn max_concurrent(&self) -> usize {
    self.max_active.load(Ordering::SeqCst)
  }
}

impl Step for BlockingStep {
  fn kind(&self) -> StepKind {
    self.kind
  }

  fn run<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, Result<(), StepError>> {
    async move {
      self.runs.fetch_add(1, Ordering::SeqCst);
      let active = Arc::clone(&self.active);
      let max_active = Arc::clone(&self.max_active);
      let work = self.work;
      tokio::task::spawn_blocking(move || {
        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
        max_active.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(work);
        active.fetch_sub(1, Ordering::SeqCst);
      })
      .await?;
      Ok(())
    }
    .boxed()
  }
}

/// An executor that logs its runs into a shared list.
pub struct TestExecutor {
  kind: ExecutorKind,
  requires: &'static [ExecutorKind],
  supports: fn(&Context) -> bool,
  log: Arc<Mutex<Vec<ExecutorKind>>>,
  fail: bool,
}

impl TestExecutor {
  pub fn new(
    kind: ExecutorKind,
    requires: &'static [ExecutorKind],
    supports: fn(&Context) -> bool,
    log: &Arc<Mutex<Vec<ExecutorKind>>>,
  ) -> Self {
    Self {
      kind,
      requires,
      supports,
      log: Arc::clone(log),
      fail: false,
    }
  }

  /// Fail with an unregistered-step error when executed.
  pub fn failing(mut self) -> Self {
    self.fail = true;
    self
  }
}

impl Executor for TestExecutor {
  fn kind(&self) -> ExecutorKind {
    self.kind
  }

  fn supports(&self, ctx: &Context) -> bool {
    (self.supports)(ctx)
  }

  fn requires(&self) -> &'static [ExecutorKind] {
    self.requires
  }

  fn execute<'a>(&'a self, _ctx: &'a Context) -> BoxFuture<'a, Result<(), ExecuteError>> {
    async move {
      self.log.lock().unwrap().push(self.kind);
      if self.fail {
        return Err(ExecuteError::UnregisteredStep(StepKind::Content));
      }
      Ok(())
    }
    .boxed()
  }
}

/// Records transport calls; optionally fails the first call matching a pattern.
#[derive(Debug, Default)]
pub struct MockTransport {
  calls: Mutex<Vec<String>>,
  fail_on: Option<&'static str>,
}

impl MockTransport {
  /// Fail uploads when `pattern` is `"upload"`, otherwise commands containing it.
  pub fn failing_on(pattern: &'static str) -> Self {
    Self {
      calls: Mutex::default(),
      fail_on: Some(pattern),
    }
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }
}

impl DeployTransport for MockTransport {
  fn upload<'a>(
    &'a self,
    _target: &'a DeployTarget,
    _local: &'a Path,
    remote_name: &'a str,
  ) -> BoxFuture<'a, Result<RemoteOutput, DeployError>> {
    async move {
      self.calls.lock().unwrap().push(format!("upload {remote_name}"));
      let code = if self.fail_on == Some("upload") { 1 } else { 0 };
      Ok(RemoteOutput {
        code: Some(code),
        stderr: String::new(),
      })
    }
    .boxed()
  }

  fn exec<'a>(&'a self, _target: &'a DeployTarget, command: &'a str) -> BoxFuture<'a, Result<RemoteOutput, DeployError>> {
    async move {
      self.calls.lock().unwrap().push(format!("exec {command}"));
      let failed = self.fail_on.is_some_and(|p| p != "upload" && command.contains(p));
      Ok(RemoteOutput {
        code: Some(if failed { 2 } else { 0 }),
        stderr: if failed { "boom".into() } else { String::new() },
      })
    }
    .boxed()
  }
}
