//! Types for pass-driven build execution.
//!
//! This module defines the error type, the build report and the configuration
//! for building a target graph.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::consts::DEFAULT_MAX_PASSES;
use crate::job::{JobStatus, WorkerConfig};
use crate::store::StoreError;
use crate::target::TargetName;
use crate::target::graph::GraphError;

/// Reason attached to targets still unresolved when the passes run out.
pub const INCOMPLETE_REASON: &str = "requirement never became available";

/// Errors that abort a build.
///
/// Job failures are not errors here; they are recorded on their targets and
/// reported through [`BuildReport`].
#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error(transparent)]
  Graph(#[from] GraphError),

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("failed to encode job descriptor: {0}")]
  Encode(#[source] serde_json::Error),
}

/// Configuration for a build.
#[derive(Debug, Clone)]
pub struct ExecuteConfig {
  /// Maximum number of jobs running at once.
  pub parallelism: usize,

  /// Passes before unresolved targets are reported incomplete.
  pub max_passes: usize,

  /// Run jobs in worker subprocesses instead of in-process.
  pub worker: Option<WorkerConfig>,
}

impl Default for ExecuteConfig {
  fn default() -> Self {
    Self {
      parallelism: num_cpus(),
      max_passes: DEFAULT_MAX_PASSES,
      worker: None,
    }
  }
}

fn num_cpus() -> usize {
  std::thread::available_parallelism().map(|p| p.get()).unwrap_or(4)
}

/// Overall result of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildOutcome {
  Success,
  /// Some targets never got their requirements within the pass budget.
  Incomplete,
  Failed,
}

impl fmt::Display for BuildOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildOutcome::Success => write!(f, "success"),
      BuildOutcome::Incomplete => write!(f, "incomplete"),
      BuildOutcome::Failed => write!(f, "failed"),
    }
  }
}

/// One job dispatched (or replayed from cache) during a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobRecord {
  pub pass: usize,
  pub target: TargetName,
  pub status: JobStatus,
  pub cached: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedTarget {
  pub name: TargetName,
  pub error: Option<String>,
  pub traceback: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockedTarget {
  pub name: TargetName,
  pub blocked_by: TargetName,
}

impl fmt::Display for BlockedTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} blocked by failed dependency {}", self.name, self.blocked_by)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncompleteTarget {
  pub name: TargetName,
  /// Keys of the requirements the last run was missing.
  pub missing: Vec<String>,
  pub reason: String,
}

/// What a build did and where every target ended up.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
  /// Passes that dispatched at least one target.
  pub passes: usize,
  /// Import targets built ok, including cache hits.
  pub built: Vec<TargetName>,
  /// Test targets whose parameters resolved.
  pub tests: Vec<TargetName>,
  pub cache_hits: Vec<TargetName>,
  pub failed: Vec<FailedTarget>,
  pub blocked: Vec<BlockedTarget>,
  pub incomplete: Vec<IncompleteTarget>,
  pub jobs: Vec<JobRecord>,
}

impl BuildReport {
  pub fn outcome(&self) -> BuildOutcome {
    if !self.failed.is_empty() {
      BuildOutcome::Failed
    } else if !self.incomplete.is_empty() || !self.blocked.is_empty() {
      BuildOutcome::Incomplete
    } else {
      BuildOutcome::Success
    }
  }

  pub fn is_success(&self) -> bool {
    self.outcome() == BuildOutcome::Success
  }

  /// Jobs dispatched in `pass`.
  pub fn jobs_in_pass(&self, pass: usize) -> impl Iterator<Item = &JobRecord> {
    self.jobs.iter().filter(move |j| j.pass == pass)
  }
}
