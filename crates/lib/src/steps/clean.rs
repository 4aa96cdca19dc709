use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;

use super::{Step, StepError, StepKind};
use crate::context::Context;

/// Removes the whole build directory. A missing directory is fine.
#[derive(Debug, Default, Clone, Copy)]
pub struct CleanStep;

impl Step for CleanStep {
  fn kind(&self) -> StepKind {
    StepKind::Clean
  }

  fn run<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<(), StepError>> {
    async move {
      let build_dir = ctx.build_dir();
      match tokio::fs::remove_dir_all(&build_dir).await {
        Ok(()) => {
          debug!(path = %build_dir.display(), "removed build directory");
          Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StepError::Io {
          path: build_dir,
          source: e,
        }),
      }
    }
    .boxed()
  }
}
