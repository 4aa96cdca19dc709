use std::path::Path;

/// Content types served by the dev server, keyed by lowercase extension.
pub const MIME_TYPES: &[(&str, &str)] = &[
  ("html", "text/html"),
  ("js", "text/javascript"),
  ("json", "application/json"),
  ("css", "text/css"),
  ("png", "image/png"),
  ("jpg", "image/jpeg"),
  ("svg", "image/svg+xml"),
  ("woff", "application/font-woff"),
];

pub const DEFAULT_MIME_TYPE: &str = "text/plain";

fn lookup(path: &Path) -> Option<&'static str> {
  let ext = path.extension()?.to_str()?.to_ascii_lowercase();
  MIME_TYPES.iter().find(|(e, _)| *e == ext).map(|(_, mime)| *mime)
}

pub fn mime_for(path: &Path) -> &'static str {
  lookup(path).unwrap_or(DEFAULT_MIME_TYPE)
}

/// Whether changes to `path` should reload connected browsers.
pub fn is_served_type(path: &Path) -> bool {
  lookup(path).is_some()
}
