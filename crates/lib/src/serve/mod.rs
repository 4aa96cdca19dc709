//! Development server.
//!
//! Two listeners run side by side: the site server on the configured server
//! port and the live-reload server on the live-reload port. Changes under the
//! output directory are debounced and pushed to live-reload clients.

mod livereload;
mod mime;
mod site;

use std::net::SocketAddr;
use std::path::PathBuf;

use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::context::Context;
use crate::watch::is_change;

pub use livereload::{LiveReload, client_script, livereload_router};
pub use mime::{DEFAULT_MIME_TYPE, MIME_TYPES, is_served_type, mime_for};
pub use site::{resolve_request_path, site_router};

#[derive(Debug, Error)]
pub enum ServeError {
  #[error("failed to bind {addr}: {source}")]
  Bind {
    addr: SocketAddr,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to prepare {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to watch {path}: {source}")]
  Watch {
    path: PathBuf,
    #[source]
    source: notify::Error,
  },
}

/// Running dev server. Dropping the handle stops both servers.
pub struct ServerHandle {
  site_addr: SocketAddr,
  livereload_addr: SocketAddr,
  hub: LiveReload,
  tasks: Vec<JoinHandle<()>>,
  _output_watch: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl std::fmt::Debug for ServerHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ServerHandle")
      .field("site_addr", &self.site_addr)
      .field("livereload_addr", &self.livereload_addr)
      .finish_non_exhaustive()
  }
}

impl ServerHandle {
  pub fn site_addr(&self) -> SocketAddr {
    self.site_addr
  }

  pub fn livereload_addr(&self) -> SocketAddr {
    self.livereload_addr
  }

  pub fn live_reload(&self) -> &LiveReload {
    &self.hub
  }

  pub fn shutdown(self) {
    drop(self);
  }
}

impl Drop for ServerHandle {
  fn drop(&mut self) {
    for task in &self.tasks {
      task.abort();
    }
  }
}

async fn bind(port: u16) -> Result<TcpListener, ServeError> {
  let addr = SocketAddr::from(([0, 0, 0, 0], port));
  TcpListener::bind(addr)
    .await
    .map_err(|source| ServeError::Bind { addr, source })
}

fn spawn_server(name: &'static str, listener: TcpListener, router: axum::Router) -> JoinHandle<()> {
  tokio::spawn(async move {
    if let Err(e) = axum::serve(listener, router).await {
      error!(server = name, error = %e, "server stopped");
    }
  })
}

/// Start both servers and the output watcher.
///
/// Returns once both listeners are bound.
pub async fn start(ctx: &Context) -> Result<ServerHandle, ServeError> {
  let output_dir = ctx.output_dir();
  tokio::fs::create_dir_all(&output_dir)
    .await
    .map_err(|source| ServeError::Io {
      path: output_dir.clone(),
      source,
    })?;

  let site_listener = bind(ctx.server_port()).await?;
  let reload_listener = bind(ctx.livereload_port()).await?;
  let site_addr = local_addr(&site_listener)?;
  let livereload_addr = local_addr(&reload_listener)?;

  let hub = LiveReload::default();
  let output_watch = watch_output(&output_dir, ctx, hub.clone())?;

  let tasks = vec![
    spawn_server("site", site_listener, site_router(output_dir)),
    spawn_server(
      "livereload",
      reload_listener,
      livereload_router(hub.clone(), livereload_addr.port()),
    ),
  ];

  info!(url = %format!("http://localhost:{}", site_addr.port()), "serving site");
  debug!(addr = %livereload_addr, "live reload listening");

  Ok(ServerHandle {
    site_addr,
    livereload_addr,
    hub,
    tasks,
    _output_watch: output_watch,
  })
}

fn local_addr(listener: &TcpListener) -> Result<SocketAddr, ServeError> {
  listener.local_addr().map_err(|source| ServeError::Io {
    path: PathBuf::new(),
    source,
  })
}

fn watch_output(
  output_dir: &std::path::Path,
  ctx: &Context,
  hub: LiveReload,
) -> Result<Debouncer<RecommendedWatcher, RecommendedCache>, ServeError> {
  let watch_err = |source| ServeError::Watch {
    path: output_dir.to_path_buf(),
    source,
  };

  let mut debouncer = new_debouncer(ctx.debounce(), None, move |result: DebounceEventResult| match result {
    Ok(events) => {
      let reload = events
        .iter()
        .filter(|e| is_change(&e.event.kind))
        .flat_map(|e| e.event.paths.iter())
        .any(|p| is_served_type(p));
      if reload {
        let clients = hub.notify();
        debug!(clients, "output changed, reload sent");
      }
    }
    Err(errors) => {
      for e in errors {
        warn!(error = %e, "output watch error");
      }
    }
  })
  .map_err(watch_err)?;
  debouncer
    .watch(output_dir, RecursiveMode::Recursive)
    .map_err(watch_err)?;
  Ok(debouncer)
}
