//! Terminal output for the `site` binary.
//!
//! Every user-facing line starts with a colored status marker. Successes and
//! notes go to stdout, failures to stderr.

use std::fmt::Display;
use std::time::Duration;

use owo_colors::{OwoColorize, Stream};

/// Kind of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
  Running,
  Done,
  Failed,
}

impl Status {
  fn marker(self) -> &'static str {
    match self {
      Status::Running => "•",
      Status::Done => "✓",
      Status::Failed => "✗",
    }
  }

  fn stream(self) -> Stream {
    match self {
      Status::Failed => Stream::Stderr,
      _ => Stream::Stdout,
    }
  }
}

/// Print `message` behind the marker of `status`.
pub fn status(kind: Status, message: impl Display) {
  let stream = kind.stream();
  let marker = kind.marker();
  let marker = marker.if_supports_color(stream, |m| match kind {
    Status::Running => m.blue().to_string(),
    Status::Done => m.green().to_string(),
    Status::Failed => m.red().bold().to_string(),
  });

  match stream {
    Stream::Stderr => eprintln!("{marker} {message}"),
    _ => println!("{marker} {message}"),
  }
}

pub fn print_success(message: &str) {
  status(Status::Done, message);
}

pub fn print_error(message: &str) {
  status(Status::Failed, message.if_supports_color(Stream::Stderr, |m| m.red()));
}

pub fn print_info(message: &str) {
  status(Status::Running, message);
}

/// Short human form of a step duration: `840ms`, `2.3s`, `1m 05s`.
pub fn format_elapsed(elapsed: Duration) -> String {
  let millis = elapsed.as_millis();
  match millis {
    0..1_000 => format!("{millis}ms"),
    1_000..60_000 => format!("{:.1}s", elapsed.as_secs_f64()),
    _ => {
      let secs = elapsed.as_secs();
      format!("{}m {:02}s", secs / 60, secs % 60)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn elapsed_uses_the_coarsest_fitting_unit() {
    assert_eq!(format_elapsed(Duration::from_millis(840)), "840ms");
    assert_eq!(format_elapsed(Duration::from_millis(2_340)), "2.3s");
    assert_eq!(format_elapsed(Duration::from_secs(65)), "1m 05s");
  }

  #[test]
  fn failures_go_to_stderr() {
    assert!(matches!(Status::Failed.stream(), Stream::Stderr));
    assert!(matches!(Status::Done.stream(), Stream::Stdout));
  }
}
