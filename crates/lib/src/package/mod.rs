//! Site packaging.
//!
//! The output directory is archived as a gzip-compressed tarball whose entries
//! are relative to the output directory, as `tar -C <out> -czf <pkg> .` would
//! produce.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tar::{Archive, Builder};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::info;

use crate::context::Context;

#[derive(Debug, Error)]
pub enum PackageError {
  #[error("nothing to package: {0} does not exist")]
  MissingOutput(PathBuf),

  #[error("failed to write package {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to extract package {path}: {source}")]
  Extract {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("packaging task failed: {0}")]
  Join(#[from] tokio::task::JoinError),
}

/// Archive `source_dir` into `archive`, replacing any existing file.
///
/// The archive is written next to its destination and renamed into place, so
/// a failed run never leaves a truncated package behind.
pub fn create_package(source_dir: &Path, archive: &Path) -> Result<(), PackageError> {
  if !source_dir.is_dir() {
    return Err(PackageError::MissingOutput(source_dir.to_path_buf()));
  }

  let write_err = |source: std::io::Error| PackageError::Write {
    path: archive.to_path_buf(),
    source,
  };
  let parent = archive.parent().unwrap_or_else(|| Path::new("."));
  std::fs::create_dir_all(parent).map_err(write_err)?;

  let temp = NamedTempFile::new_in(parent).map_err(write_err)?;
  {
    let encoder = GzEncoder::new(BufWriter::new(temp.as_file()), Compression::new(9));
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(true);
    builder.append_dir_all(".", source_dir).map_err(write_err)?;
    let encoder = builder.into_inner().map_err(write_err)?;
    let mut writer = encoder.finish().map_err(write_err)?;
    std::io::Write::flush(&mut writer).map_err(write_err)?;
  }
  temp.persist(archive).map_err(|e| write_err(e.error))?;
  Ok(())
}

/// Unpack a package created by [`create_package`] into `dest`.
pub fn extract_package(archive: &Path, dest: &Path) -> Result<(), PackageError> {
  let extract_err = |source: std::io::Error| PackageError::Extract {
    path: archive.to_path_buf(),
    source,
  };
  let file = File::open(archive).map_err(extract_err)?;
  std::fs::create_dir_all(dest).map_err(extract_err)?;
  let mut unpacker = Archive::new(GzDecoder::new(BufReader::new(file)));
  unpacker.unpack(dest).map_err(extract_err)?;
  Ok(())
}

/// Package the context's output directory into its package path.
pub async fn package_site(ctx: &Context) -> Result<PathBuf, PackageError> {
  let output_dir = ctx.output_dir();
  let archive = ctx.package_path();
  let target = archive.clone();
  tokio::task::spawn_blocking(move || create_package(&output_dir, &target)).await??;
  info!(path = %archive.display(), "site packaged");
  Ok(archive)
}
