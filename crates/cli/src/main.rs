mod cmd;
mod output;
mod progress;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use clap::builder::PossibleValuesParser;
use tracing_subscriber::EnvFilter;

use crate::output::print_error;

#[derive(Parser)]
#[command(name = "site")]
#[command(about = "Build, preview, package and deploy a static site", long_about = None)]
#[command(version)]
struct Cli {
  /// What to do: build (default), watch/serve, package or deploy
  #[arg(value_name = "MODE", value_parser = PossibleValuesParser::new(["build", "watch", "serve", "package", "deploy"]))]
  modes: Vec<String>,

  /// Force production settings (minification, required authors)
  #[arg(long)]
  prod: bool,

  /// Project root holding src/ and receiving dist/
  #[arg(long, value_name = "DIR", default_value = ".")]
  project: PathBuf,

  /// Port for the development server
  #[arg(long)]
  port: Option<u16>,

  /// Port for the live-reload channel
  #[arg(long)]
  livereload_port: Option<u16>,

  /// Upper bound in seconds for a single watch-triggered rebuild
  #[arg(long, value_name = "SECS")]
  rebuild_timeout: Option<u64>,

  /// Print plain log lines instead of step progress
  #[arg(long)]
  no_progress: bool,

  /// Increase log verbosity (-v info, -vv debug)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(cli.verbose)));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let result = cmd::cmd_run(cmd::RunArgs {
    mode: sitebuild_lib::context::Mode::from_tokens(&cli.modes),
    production: cli.prod,
    project: cli.project,
    port: cli.port,
    livereload_port: cli.livereload_port,
    rebuild_timeout: cli.rebuild_timeout,
    progress: !cli.no_progress,
  });

  match result {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_error(&format!("{err:#}"));
      ExitCode::FAILURE
    }
  }
}

fn default_directives(verbose: u8) -> &'static str {
  match verbose {
    0 => "warn",
    1 => "warn,sitebuild_lib=info,site=info",
    _ => "info,sitebuild_lib=debug,site=debug",
  }
}
