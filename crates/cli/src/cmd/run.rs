use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use tracing::info;

use sitebuild_lib::authorship::GitAuthorLookup;
use sitebuild_lib::consts::DOTENV_FILE;
use sitebuild_lib::context::{Context, ContextOptions, EnvVars, Mode};
use sitebuild_lib::deploy::OpenSshTransport;
use sitebuild_lib::execute::executors::standard_executors;
use sitebuild_lib::execute::{Execution, ExecutionListener, ExecutionRegistry, LogListener};
use sitebuild_lib::steps::StepTable;

use crate::output::{print_info, print_success};
use crate::progress::ProgressListener;

/// Arguments for a single invocation, already parsed from the command line.
pub struct RunArgs {
  pub mode: Mode,
  pub production: bool,
  pub project: PathBuf,
  pub port: Option<u16>,
  pub livereload_port: Option<u16>,
  pub rebuild_timeout: Option<u64>,
  pub progress: bool,
}

pub fn cmd_run(args: RunArgs) -> Result<()> {
  let env = EnvVars::from_process()
    .with_dotenv(&args.project.join(DOTENV_FILE))
    .context("Failed to load environment")?;

  let ctx = Context::resolve(
    ContextOptions {
      mode: args.mode,
      production: args.production,
      project_root: args.project,
      server_port: args.port,
      livereload_port: args.livereload_port,
      rebuild_timeout: args.rebuild_timeout.map(Duration::from_secs),
    },
    &env,
  )
  .context("Invalid configuration")?;

  info!(
    mode = %ctx.mode(),
    production = ctx.production(),
    root = %ctx.project_root().display(),
    "resolved context"
  );

  let listener: Arc<dyn ExecutionListener> = if args.progress {
    Arc::new(ProgressListener)
  } else {
    Arc::new(LogListener)
  };
  let registry = Arc::new(ExecutionRegistry::new(vec![listener]));
  let table = Arc::new(StepTable::standard(Arc::new(GitAuthorLookup)));
  let execution = Execution::new(standard_executors(
    table,
    registry,
    Arc::new(OpenSshTransport::default()),
  ))
  .context("Invalid executor set")?;

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  rt.block_on(async {
    let ran = execution.run(&ctx).await?;
    info!(executors = ?ran, "execution finished");

    match ctx.mode() {
      Mode::Watch => {
        print_info(&format!(
          "Serving {} at http://localhost:{} (press Ctrl-C to stop)",
          ctx.output_dir().display(),
          ctx.server_port()
        ));
        tokio::signal::ctrl_c()
          .await
          .context("Failed to listen for shutdown signal")?;
        print_info("Stopping");
      }
      Mode::Package => print_success(&format!("Packaged {}", ctx.package_path().display())),
      Mode::Deploy => {
        if let Some(target) = ctx.deploy_target() {
          print_success(&format!("Deployed to {}:{}", target.destination(), target.directory));
        }
      }
      Mode::Build => print_success(&format!("Built {}", ctx.output_dir().display())),
    }

    Ok::<(), anyhow::Error>(())
  })
}
