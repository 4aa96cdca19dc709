//! Deployment of the packaged site.
//!
//! The package is uploaded to the remote user's working directory, unpacked
//! into the target directory and its permissions normalised. Each remote
//! command must exit with status zero; the first failure ends the deploy and
//! nothing already applied remotely is rolled back.

mod openssh;

use std::path::PathBuf;

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::info;

use crate::consts::SITE_PACKAGE_FILE;
use crate::context::{Context, ContextError, DeployTarget};

pub use openssh::OpenSshTransport;

#[derive(Debug, Error)]
pub enum DeployError {
  #[error(transparent)]
  Context(#[from] ContextError),

  #[error("deploy settings are only available in deploy mode")]
  NotConfigured,

  #[error("cannot read deploy key {path}: {source}")]
  Key {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("site package not found: {0}")]
  MissingPackage(PathBuf),

  #[error("failed to run {program}: {source}")]
  Spawn {
    program: String,
    #[source]
    source: std::io::Error,
  },

  #[error("upload of {file} failed with exit code {code:?}: {stderr}")]
  Upload {
    file: String,
    code: Option<i32>,
    stderr: String,
  },

  #[error("remote command failed with exit code {code:?}: {command}: {stderr}")]
  Remote {
    command: String,
    code: Option<i32>,
    stderr: String,
  },
}

/// Exit status and diagnostics of a remote operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOutput {
  /// `None` when the process was terminated by a signal.
  pub code: Option<i32>,
  pub stderr: String,
}

impl RemoteOutput {
  pub fn success(&self) -> bool {
    self.code == Some(0)
  }
}

/// Moves files to, and runs commands on, the deploy host.
pub trait DeployTransport: Send + Sync {
  /// Upload `local` as `remote_name` in the remote working directory.
  fn upload<'a>(
    &'a self,
    target: &'a DeployTarget,
    local: &'a std::path::Path,
    remote_name: &'a str,
  ) -> BoxFuture<'a, Result<RemoteOutput, DeployError>>;

  /// Run `command` through the remote shell.
  fn exec<'a>(&'a self, target: &'a DeployTarget, command: &'a str) -> BoxFuture<'a, Result<RemoteOutput, DeployError>>;
}

/// Quote `value` for a POSIX shell.
pub fn shell_quote(value: &str) -> String {
  if !value.is_empty()
    && value
      .chars()
      .all(|c| c.is_ascii_alphanumeric() || matches!(c, '/' | '.' | '_' | '-' | '+' | ':' | '@' | '%' | ','))
  {
    return value.to_string();
  }
  format!("'{}'", value.replace('\'', r"'\''"))
}

pub fn extract_command(directory: &str) -> String {
  format!("tar xzf {} -C {}", SITE_PACKAGE_FILE, shell_quote(directory))
}

pub fn permissions_command(directory: &str) -> String {
  let dir = shell_quote(directory);
  format!("find {dir} -type d -exec chmod 755 {{}} +; find {dir} -type f -exec chmod 644 {{}} +")
}

async fn run_remote(
  transport: &dyn DeployTransport,
  target: &DeployTarget,
  command: &str,
) -> Result<(), DeployError> {
  let output = transport.exec(target, command).await?;
  if !output.success() {
    return Err(DeployError::Remote {
      command: command.to_string(),
      code: output.code,
      stderr: output.stderr.trim().to_string(),
    });
  }
  Ok(())
}

/// Ship the package at the context's package path to the deploy host.
///
/// The key file is read before any connection is attempted.
pub async fn deploy(ctx: &Context, transport: &dyn DeployTransport) -> Result<(), DeployError> {
  let target = ctx.deploy_target().ok_or(DeployError::NotConfigured)?;

  tokio::fs::read(&target.key_path)
    .await
    .map_err(|source| DeployError::Key {
      path: target.key_path.clone(),
      source,
    })?;

  let package = ctx.package_path();
  if !tokio::fs::try_exists(&package).await.unwrap_or(false) {
    return Err(DeployError::MissingPackage(package));
  }

  let uploaded = transport.upload(target, &package, SITE_PACKAGE_FILE).await?;
  if !uploaded.success() {
    return Err(DeployError::Upload {
      file: SITE_PACKAGE_FILE.to_string(),
      code: uploaded.code,
      stderr: uploaded.stderr.trim().to_string(),
    });
  }
  info!(host = %target.host, "site package uploaded");

  run_remote(transport, target, &extract_command(&target.directory)).await?;
  info!(directory = %target.directory, "site package extracted");

  run_remote(transport, target, &permissions_command(&target.directory)).await?;
  info!("deploy complete");
  Ok(())
}
