//! Environment variable sources.
//!
//! Values are layered: variables set in the process win over those read from
//! the project's `.env` file. The layering is captured once, so a `Context`
//! built from it never observes later changes to the process environment.

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use super::ContextError;

/// A snapshot of environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvVars {
  vars: HashMap<String, String>,
}

impl EnvVars {
  /// Snapshot the current process environment.
  ///
  /// Variables whose name or value is not valid Unicode are skipped.
  pub fn from_process() -> Self {
    Self {
      vars: std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .collect(),
    }
  }

  /// Build a snapshot from explicit pairs.
  pub fn from_pairs<I, K, V>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
  {
    Self {
      vars: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
    }
  }

  /// Layer the variables of a dotenv file underneath this snapshot.
  ///
  /// Variables already present are kept; a missing file is not an error.
  pub fn with_dotenv(mut self, path: &Path) -> Result<Self, ContextError> {
    let iter = match dotenvy::from_path_iter(path) {
      Ok(iter) => iter,
      Err(dotenvy::Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
        debug!(path = %path.display(), "no dotenv file");
        return Ok(self);
      }
      Err(e) => {
        return Err(ContextError::Dotenv {
          path: path.to_path_buf(),
          source: e,
        });
      }
    };

    for item in iter {
      let (key, value) = item.map_err(|e| ContextError::Dotenv {
        path: path.to_path_buf(),
        source: e,
      })?;
      self.vars.entry(key).or_insert(value);
    }

    debug!(path = %path.display(), "loaded dotenv file");
    Ok(self)
  }

  /// Look up a variable. Empty values are treated as unset.
  pub fn get(&self, name: &str) -> Option<&str> {
    self.vars.get(name).map(String::as_str).filter(|v| !v.is_empty())
  }

  /// Look up a variable that must be present.
  pub fn require(&self, name: &str) -> Result<&str, ContextError> {
    self.get(name).ok_or_else(|| ContextError::MissingEnv(name.to_string()))
  }
}
