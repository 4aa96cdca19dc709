//! Terminal progress for step execution.

use std::time::Duration;

use owo_colors::{OwoColorize, Stream};
use sitebuild_lib::execute::ExecutionListener;

use crate::output::{Status, format_elapsed, status};

/// Prints one line when a step starts, one when it stops, and the total
/// time once the last running step of a cycle has finished.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProgressListener;

impl ExecutionListener for ProgressListener {
  fn on_step_start(&self, name: &str) {
    status(
      Status::Running,
      format_args!(
        "{} {}",
        name.if_supports_color(Stream::Stdout, |s| s.bold()),
        "running".if_supports_color(Stream::Stdout, |s| s.dimmed())
      ),
    );
  }

  fn on_step_stop(&self, name: &str, elapsed: Duration) {
    status(
      Status::Done,
      format_args!(
        "{} done in {}",
        name.if_supports_color(Stream::Stdout, |s| s.bold()),
        format_elapsed(elapsed)
      ),
    );
  }

  fn on_build_stop(&self, total: Duration) {
    println!("{}", total_line(total));
  }
}

fn total_line(total: Duration) -> String {
  format!("Total build time: {}ms", total.as_millis())
}
