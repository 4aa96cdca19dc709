use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::context::{Context, Mode};
use crate::deploy::{DeployTransport, deploy};
use crate::execute::{ExecuteError, Executor, ExecutorKind};

/// Ships the package to the deploy host.
pub struct DeployExecutor {
  transport: Arc<dyn DeployTransport>,
}

impl DeployExecutor {
  pub fn new(transport: Arc<dyn DeployTransport>) -> Self {
    Self { transport }
  }
}

impl Executor for DeployExecutor {
  fn kind(&self) -> ExecutorKind {
    ExecutorKind::Deploy
  }

  fn supports(&self, ctx: &Context) -> bool {
    ctx.mode() == Mode::Deploy
  }

  fn requires(&self) -> &'static [ExecutorKind] {
    &[ExecutorKind::Build, ExecutorKind::Package]
  }

  fn execute<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<(), ExecuteError>> {
    async move {
      deploy(ctx, self.transport.as_ref()).await?;
      Ok(())
    }
    .boxed()
  }
}
