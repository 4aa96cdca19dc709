use futures::FutureExt;
use futures::future::BoxFuture;

use crate::context::{Context, Mode};
use crate::execute::{ExecuteError, Executor, ExecutorKind};
use crate::package::package_site;

/// Archives the built site.
#[derive(Debug, Default, Clone, Copy)]
pub struct PackageExecutor;

impl Executor for PackageExecutor {
  fn kind(&self) -> ExecutorKind {
    ExecutorKind::Package
  }

  fn supports(&self, ctx: &Context) -> bool {
    ctx.mode() == Mode::Package
  }

  fn requires(&self) -> &'static [ExecutorKind] {
    &[ExecutorKind::Build]
  }

  fn execute<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<(), ExecuteError>> {
    async move {
      package_site(ctx).await?;
      Ok(())
    }
    .boxed()
  }
}
