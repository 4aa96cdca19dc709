//! Static file serving from the output directory.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use tracing::{error, info};

use super::mime::mime_for;

const INDEX_FILE: &str = "index.html";

/// Map a request path onto a file below `root`.
///
/// Empty, `.` and `..` segments are dropped, so the result never leaves `root`.
pub fn resolve_request_path(root: &Path, request_path: &str) -> PathBuf {
  let mut resolved = root.to_path_buf();
  for segment in request_path.split(['/', '\\']) {
    let component = Path::new(segment).components().next();
    if matches!(component, Some(Component::Normal(_))) && !segment.contains(':') {
      resolved.push(segment);
    }
  }
  if request_path.ends_with('/') {
    resolved.push(INDEX_FILE);
  }
  resolved
}

/// Router serving every path from `root`.
pub fn site_router(root: PathBuf) -> Router {
  Router::new().fallback(serve_file).with_state(Arc::new(root))
}

async fn serve_file(State(root): State<Arc<PathBuf>>, method: Method, uri: Uri) -> Response {
  let mut path = resolve_request_path(&root, uri.path());
  if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
    path.push(INDEX_FILE);
  }

  let response = match tokio::fs::read(&path).await {
    Ok(body) => ([(header::CONTENT_TYPE, mime_for(&path))], body).into_response(),
    Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
      let requested = uri.path_and_query().map_or(uri.path(), |pq| pq.as_str());
      (StatusCode::NOT_FOUND, format!("Requested URL: {requested} was not found")).into_response()
    }
    Err(e) => {
      error!(path = %path.display(), error = %e, "failed to read file");
      (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
    }
  };

  info!(method = %method, path = %uri.path(), status = response.status().as_u16(), "request");
  response
}
