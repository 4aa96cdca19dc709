use std::path::{Path, PathBuf};

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;
use walkdir::WalkDir;

use super::{Step, StepError, StepKind};
use crate::consts::{FONTS_OUTPUT_DIR, SCRIPTS_OUTPUT_DIR};
use crate::context::{Context, SourceDir};

/// Copies a source tree into the output directory unchanged.
#[derive(Debug, Clone, Copy)]
pub struct CopyStep {
  kind: StepKind,
  source: SourceDir,
  /// Subdirectory of the output directory; `None` copies into its root.
  target: Option<&'static str>,
}

impl CopyStep {
  pub fn fonts() -> Self {
    Self {
      kind: StepKind::Fonts,
      source: SourceDir::Fonts,
      target: Some(FONTS_OUTPUT_DIR),
    }
  }

  pub fn scripts() -> Self {
    Self {
      kind: StepKind::Scripts,
      source: SourceDir::Scripts,
      target: Some(SCRIPTS_OUTPUT_DIR),
    }
  }

  pub fn other() -> Self {
    Self {
      kind: StepKind::Other,
      source: SourceDir::Other,
      target: None,
    }
  }
}

impl Step for CopyStep {
  fn kind(&self) -> StepKind {
    self.kind
  }

  fn run<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<(), StepError>> {
    async move {
      let source = ctx.source_dir(self.source);
      let target = match self.target {
        Some(sub) => ctx.output_dir().join(sub),
        None => ctx.output_dir(),
      };
      let copied = tokio::task::spawn_blocking(move || copy_tree(&source, &target, |_, bytes| Ok(bytes))).await??;
      debug!(step = %self.kind, files = copied, "copied sources");
      Ok(())
    }
    .boxed()
  }
}

/// Copy every file below `source` to the same relative path below `target`,
/// passing the contents through `transform`.
///
/// A missing `source` copies nothing. Returns the number of files written.
pub(crate) fn copy_tree<F>(source: &Path, target: &Path, mut transform: F) -> Result<usize, StepError>
where
  F: FnMut(&Path, Vec<u8>) -> Result<Vec<u8>, StepError>,
{
  if !source.is_dir() {
    return Ok(0);
  }

  let mut copied = 0;
  for entry in WalkDir::new(source).follow_links(true) {
    let entry = entry.map_err(|e| {
      let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| source.to_path_buf());
      StepError::Io {
        path,
        source: e.into(),
      }
    })?;
    if !entry.file_type().is_file() {
      continue;
    }

    let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
    let destination: PathBuf = target.join(relative);
    if let Some(parent) = destination.parent() {
      std::fs::create_dir_all(parent).map_err(StepError::io(parent))?;
    }

    let bytes = std::fs::read(entry.path()).map_err(StepError::io(entry.path()))?;
    let bytes = transform(entry.path(), bytes)?;
    std::fs::write(&destination, bytes).map_err(StepError::io(&destination))?;
    copied += 1;
  }
  Ok(copied)
}
