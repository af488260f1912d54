//! Terminal rendering for kiln commands.
//!
//! Status lines carry a [`Mark`] derived from job statuses and build outcomes.
//! Problems go to stderr, everything else to stdout. `--output json` bypasses
//! all of it through [`print_json`].

use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use owo_colors::{OwoColorize, Stream};

use kiln_lib::execute::BuildOutcome;
use kiln_lib::job::JobStatus;
use kiln_lib::target::TargetState;

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
  #[default]
  Text,
  Json,
}

impl OutputFormat {
  pub fn is_json(self) -> bool {
    matches!(self, OutputFormat::Json)
  }
}

/// Leading marker of a status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
  Done,
  Failed,
  Pending,
  Note,
}

impl Mark {
  pub fn symbol(self) -> &'static str {
    match self {
      Mark::Done => "✓",
      Mark::Failed => "✗",
      Mark::Pending => "⚠",
      Mark::Note => "•",
    }
  }

  fn to_stderr(self) -> bool {
    matches!(self, Mark::Failed | Mark::Pending)
  }

  fn stream(self) -> Stream {
    if self.to_stderr() { Stream::Stderr } else { Stream::Stdout }
  }
}

impl From<JobStatus> for Mark {
  fn from(status: JobStatus) -> Self {
    match status {
      JobStatus::Ok => Mark::Done,
      JobStatus::Incomplete => Mark::Pending,
      JobStatus::Failed => Mark::Failed,
    }
  }
}

impl From<BuildOutcome> for Mark {
  fn from(outcome: BuildOutcome) -> Self {
    match outcome {
      BuildOutcome::Success => Mark::Done,
      BuildOutcome::Incomplete => Mark::Pending,
      BuildOutcome::Failed => Mark::Failed,
    }
  }
}

/// Print `message` behind `mark`. Failed and pending lines go to stderr.
pub fn status_line(mark: impl Into<Mark>, message: &str) {
  let mark = mark.into();
  let symbol = mark.symbol();
  let symbol = match mark {
    Mark::Done => symbol.if_supports_color(mark.stream(), |s| s.green()).to_string(),
    Mark::Failed => symbol.if_supports_color(mark.stream(), |s| s.red()).to_string(),
    Mark::Pending => symbol.if_supports_color(mark.stream(), |s| s.yellow()).to_string(),
    Mark::Note => symbol.if_supports_color(mark.stream(), |s| s.blue()).to_string(),
  };
  if mark.to_stderr() {
    eprintln!("{symbol} {message}");
  } else {
    println!("{symbol} {message}");
  }
}

/// Indented detail lines under a status line, such as a traceback.
pub fn detail_lines(mark: impl Into<Mark>, text: &str) {
  let to_stderr = mark.into().to_stderr();
  for line in text.lines() {
    if to_stderr {
      eprintln!("    {line}");
    } else {
      println!("    {line}");
    }
  }
}

pub fn print_stat(label: &str, value: impl std::fmt::Display) {
  println!("  {}: {}", label.if_supports_color(Stream::Stdout, |s| s.dimmed()), value);
}

/// A target state, colored by how far the target got.
pub fn state_label(state: TargetState) -> String {
  let label = state.to_string();
  match state {
    TargetState::Ok => label.if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
    TargetState::Ready | TargetState::Building => label.if_supports_color(Stream::Stdout, |s| s.cyan()).to_string(),
    TargetState::Incomplete => label.if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
    TargetState::Failed => label.if_supports_color(Stream::Stdout, |s| s.red()).to_string(),
    TargetState::Unbuilt => label.if_supports_color(Stream::Stdout, |s| s.dimmed()).to_string(),
  }
}

/// Cache sizes in binary units with one decimal.
pub fn format_size(bytes: u64) -> String {
  const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
  if bytes < 1024 {
    return format!("{bytes} B");
  }
  let mut value = bytes as f64 / 1024.0;
  let mut unit = 0;
  while value >= 1024.0 && unit + 1 < UNITS.len() {
    value /= 1024.0;
    unit += 1;
  }
  format!("{value:.1} {}", UNITS[unit])
}

/// Build durations, truncated to milliseconds.
pub fn format_elapsed(elapsed: Duration) -> String {
  let millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
  humantime::format_duration(Duration::from_millis(millis)).to_string()
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{json}");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn marks_follow_status_severity() {
    assert_eq!(Mark::from(JobStatus::Ok), Mark::Done);
    assert_eq!(Mark::from(JobStatus::Incomplete), Mark::Pending);
    assert_eq!(Mark::from(BuildOutcome::Failed), Mark::Failed);
    assert_eq!(Mark::from(BuildOutcome::Incomplete).symbol(), "⚠");
  }

  #[test]
  fn sizes_use_binary_units() {
    assert_eq!(format_size(500), "500 B");
    assert_eq!(format_size(1536), "1.5 KB");
    assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
  }

  #[test]
  fn elapsed_drops_sub_millisecond_noise() {
    assert_eq!(format_elapsed(Duration::from_micros(1_500_250)), "1s 500ms");
    assert_eq!(format_elapsed(Duration::from_secs(65)), "1m 5s");
  }
}
