//! Live-reload channel.
//!
//! Browsers load `/livereload.js` from the live-reload server, which opens a
//! WebSocket to `/livereload` and reloads the page on every `reload` message.

use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::sync::broadcast;
use tracing::debug;

/// Fans reload notifications out to connected clients.
#[derive(Debug, Clone)]
pub struct LiveReload {
  tx: broadcast::Sender<()>,
}

impl Default for LiveReload {
  fn default() -> Self {
    let (tx, _) = broadcast::channel(16);
    Self { tx }
  }
}

impl LiveReload {
  /// Ask every connected client to reload. Returns the number of clients.
  pub fn notify(&self) -> usize {
    self.tx.send(()).unwrap_or(0)
  }

  pub fn subscribe(&self) -> broadcast::Receiver<()> {
    self.tx.subscribe()
  }
}

#[derive(Clone)]
struct ReloadState {
  hub: LiveReload,
  port: u16,
}

pub fn client_script(port: u16) -> String {
  format!(
    r#"(function () {{
  var host = (location.host || 'localhost').split(':')[0];
  function connect() {{
    var socket = new WebSocket('ws://' + host + ':{port}/livereload');
    socket.onmessage = function (event) {{
      if (event.data === 'reload') {{
        location.reload();
      }}
    }};
    socket.onclose = function () {{
      setTimeout(connect, 1000);
    }};
  }}
  connect();
}})();
"#
  )
}

/// Router for the live-reload server listening on `port`.
pub fn livereload_router(hub: LiveReload, port: u16) -> Router {
  Router::new()
    .route("/livereload.js", get(script))
    .route("/livereload", get(socket))
    .with_state(ReloadState { hub, port })
}

async fn script(State(state): State<ReloadState>) -> impl IntoResponse {
  ([(header::CONTENT_TYPE, "text/javascript")], client_script(state.port))
}

async fn socket(State(state): State<ReloadState>, ws: WebSocketUpgrade) -> impl IntoResponse {
  let rx = state.hub.subscribe();
  ws.on_upgrade(move |socket| forward_reloads(socket, rx))
}

async fn forward_reloads(mut socket: WebSocket, mut rx: broadcast::Receiver<()>) {
  debug!("live-reload client connected");
  loop {
    tokio::select! {
      notice = rx.recv() => match notice {
        Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {
          if socket.send(Message::Text("reload".into())).await.is_err() {
            break;
          }
        }
        Err(broadcast::error::RecvError::Closed) => break,
      },
      incoming = socket.recv() => match incoming {
        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
        Some(Ok(_)) => {}
      },
    }
  }
  debug!("live-reload client disconnected");
}
