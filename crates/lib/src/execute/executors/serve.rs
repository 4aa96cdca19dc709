use std::sync::{Mutex, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;

use crate::context::{Context, Mode};
use crate::execute::{ExecuteError, Executor, ExecutorKind};
use crate::serve::{ServerHandle, start};

/// Starts the dev server. The servers run until the executor is dropped.
#[derive(Debug, Default)]
pub struct ServeExecutor {
  server: Mutex<Option<ServerHandle>>,
}

impl ServeExecutor {
  /// Address of the site server, once started.
  pub fn site_addr(&self) -> Option<std::net::SocketAddr> {
    self
      .server
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .as_ref()
      .map(ServerHandle::site_addr)
  }
}

impl Executor for ServeExecutor {
  fn kind(&self) -> ExecutorKind {
    ExecutorKind::Serve
  }

  fn supports(&self, ctx: &Context) -> bool {
    ctx.mode() == Mode::Watch
  }

  fn requires(&self) -> &'static [ExecutorKind] {
    &[ExecutorKind::Build]
  }

  fn execute<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<(), ExecuteError>> {
    async move {
      let handle = start(ctx).await?;
      *self.server.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
      Ok(())
    }
    .boxed()
  }
}
