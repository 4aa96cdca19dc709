//! Transport over the system OpenSSH client.

use std::path::Path;
use std::process::Stdio;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::debug;

use super::{DeployError, DeployTransport, RemoteOutput};
use crate::context::DeployTarget;

/// Runs `ssh` and `sftp` non-interactively with the target's key.
#[derive(Debug, Clone)]
pub struct OpenSshTransport {
  ssh: String,
  sftp: String,
}

impl Default for OpenSshTransport {
  fn default() -> Self {
    Self {
      ssh: "ssh".to_string(),
      sftp: "sftp".to_string(),
    }
  }
}

impl OpenSshTransport {
  /// Use explicit client binaries instead of `ssh`/`sftp` from `PATH`.
  pub fn with_programs(ssh: impl Into<String>, sftp: impl Into<String>) -> Self {
    Self {
      ssh: ssh.into(),
      sftp: sftp.into(),
    }
  }

  fn upload_command(&self, target: &DeployTarget) -> Command {
    let mut command = Command::new(&self.sftp);
    command.args(["-b", "-"]).arg("-P").arg(target.port.to_string());
    common_options(&mut command, target);
    command.arg(target.destination()).stdin(Stdio::piped());
    command
  }

  fn exec_command(&self, target: &DeployTarget, remote: &str) -> Command {
    let mut command = Command::new(&self.ssh);
    command.arg("-p").arg(target.port.to_string());
    common_options(&mut command, target);
    command.arg(target.destination()).arg(remote).stdin(Stdio::null());
    command
  }
}

fn common_options(command: &mut Command, target: &DeployTarget) {
  command
    .arg("-i")
    .arg(&target.key_path)
    .args(["-o", "BatchMode=yes", "-o", "IdentitiesOnly=yes"])
    .stdout(Stdio::null())
    .stderr(Stdio::piped())
    .kill_on_drop(true);
}

/// Quote a path for an `sftp` batch line.
fn sftp_quote(value: &str) -> String {
  format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn spawn(program: &str, command: &mut Command) -> Result<Child, DeployError> {
  command.spawn().map_err(|source| DeployError::Spawn {
    program: program.to_string(),
    source,
  })
}

async fn collect(program: &str, child: Child) -> Result<RemoteOutput, DeployError> {
  let output = child.wait_with_output().await.map_err(|source| DeployError::Spawn {
    program: program.to_string(),
    source,
  })?;
  Ok(RemoteOutput {
    code: output.status.code(),
    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
  })
}

impl DeployTransport for OpenSshTransport {
  fn upload<'a>(
    &'a self,
    target: &'a DeployTarget,
    local: &'a Path,
    remote_name: &'a str,
  ) -> BoxFuture<'a, Result<RemoteOutput, DeployError>> {
    async move {
      let batch = format!(
        "put {} {}\n",
        sftp_quote(&local.to_string_lossy()),
        sftp_quote(remote_name)
      );
      debug!(program = %self.sftp, destination = %target.destination(), "uploading");

      let mut child = spawn(&self.sftp, &mut self.upload_command(target))?;
      if let Some(mut stdin) = child.stdin.take() {
        stdin
          .write_all(batch.as_bytes())
          .await
          .map_err(|source| DeployError::Spawn {
            program: self.sftp.clone(),
            source,
          })?;
      }
      collect(&self.sftp, child).await
    }
    .boxed()
  }

  fn exec<'a>(&'a self, target: &'a DeployTarget, command: &'a str) -> BoxFuture<'a, Result<RemoteOutput, DeployError>> {
    async move {
      debug!(program = %self.ssh, destination = %target.destination(), command = %command, "running remote command");
      let child = spawn(&self.ssh, &mut self.exec_command(target, command))?;
      collect(&self.ssh, child).await
    }
    .boxed()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::path::PathBuf;

  fn target() -> DeployTarget {
    DeployTarget {
      host: "example.org".into(),
      port: 2222,
      user: "www".into(),
      key_path: PathBuf::from("/keys/id"),
      directory: "/srv/site".into(),
    }
  }

  fn args(command: &Command) -> Vec<String> {
    command
      .as_std()
      .get_args()
      .map(|a| a.to_string_lossy().into_owned())
      .collect()
  }

  #[test]
  fn ssh_arguments() {
    let transport = OpenSshTransport::default();
    let command = transport.exec_command(&target(), "true");
    assert_eq!(command.as_std().get_program(), "ssh");
    assert_eq!(
      args(&command),
      vec![
        "-p",
        "2222",
        "-i",
        "/keys/id",
        "-o",
        "BatchMode=yes",
        "-o",
        "IdentitiesOnly=yes",
        "www@example.org",
        "true"
      ]
    );
  }

  #[test]
  fn sftp_arguments() {
    let transport = OpenSshTransport::default();
    let command = transport.upload_command(&target());
    let args = args(&command);
    assert_eq!(&args[..4], &["-b", "-", "-P", "2222"]);
    assert_eq!(args.last().map(String::as_str), Some("www@example.org"));
  }

  #[test]
  fn sftp_quoting() {
    assert_eq!(sftp_quote("/tmp/my site.tar.gz"), "\"/tmp/my site.tar.gz\"");
    assert_eq!(sftp_quote("a\"b"), "\"a\\\"b\"");
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn nonzero_exit_is_reported() {
    let transport = OpenSshTransport::with_programs("false", "false");
    let output = transport.exec(&target(), "true").await.unwrap();
    assert!(!output.success());
    assert_eq!(output.code, Some(1));
  }

  #[tokio::test]
  async fn missing_client_is_a_spawn_error() {
    let transport = OpenSshTransport::with_programs("/nonexistent/ssh", "/nonexistent/sftp");
    let err = transport.exec(&target(), "true").await.unwrap_err();
    assert!(matches!(err, DeployError::Spawn { .. }));
  }
}
