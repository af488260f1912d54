//! Jobs: the build action of one target.
//!
//! The graph turns a ready target into a [`JobDescriptor`], a self-contained
//! value holding everything the job needs (the module declaration and the
//! resources its requirements resolved to). Descriptors travel as content refs;
//! the [`JobRegistry`] resolves a descriptor piece into a runnable [`Job`] and
//! the [`JobDriver`] runs it, in-process or in a worker subprocess.
//!
//! Running a job yields exactly one [`JobResult`]:
//!
//! - `ok`: the output resources, with the requirements the job used
//! - `incomplete`: requirements that are not available yet; retried on a later
//!   pass once the graph wires them
//! - `failed`: an unrecoverable error, with diagnostics

mod driver;
mod import;
mod registry;
mod worker;

use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use driver::{DriverMode, JobDriver, WorkerConfig};
pub use import::ImportJob;
pub use registry::{JobFactory, JobRegistry};
pub use test::TestJob;
pub use worker::run_worker;

use crate::construct::CustomTypes;
use crate::manifest::{ModuleDecl, TestDecl};
use crate::requirement::Requirement;
use crate::resource::Resource;
use crate::store::{PieceCodec, StoreError};
use crate::target::{Target, TargetName};
use crate::util::hash::Hashable;

/// Errors resolving or running a job.
///
/// The driver turns these into failed job results; they never abort a build.
#[derive(Debug, Error)]
pub enum JobError {
  #[error("job descriptor has no string `kind`")]
  MissingKind,

  #[error("no job registered for kind {0:?}")]
  UnknownKind(String),

  #[error("failed to decode {kind} job: {source}")]
  Decode {
    kind: String,
    #[source]
    source: serde_json::Error,
  },

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error("failed to spawn worker {program}: {source}")]
  Spawn {
    program: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to wait for worker: {0}")]
  Wait(#[source] io::Error),

  #[error("job timed out after {}", humantime::format_duration(*.0))]
  Timeout(Duration),

  #[error("worker output is not a job result: {0}")]
  WorkerOutput(#[source] serde_json::Error),

  #[error("job panicked: {0}")]
  Panic(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
  Ok,
  Incomplete,
  Failed,
}

impl JobStatus {
  pub fn desc(&self) -> &'static str {
    match self {
      JobStatus::Ok => "ok",
      JobStatus::Incomplete => "incomplete",
      JobStatus::Failed => "failed",
    }
  }
}

/// Outcome of running a job. Crosses the worker process boundary as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
  pub status: JobStatus,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub traceback: Option<String>,
  #[serde(default)]
  pub used_reqs: Vec<Requirement>,
  #[serde(default)]
  pub missing_reqs: Vec<Requirement>,
  #[serde(default)]
  pub output: Vec<Resource>,
}

impl JobResult {
  pub fn ok(used_reqs: Vec<Requirement>, output: Vec<Resource>) -> Self {
    Self {
      status: JobStatus::Ok,
      error: None,
      traceback: None,
      used_reqs,
      missing_reqs: Vec::new(),
      output,
    }
  }

  pub fn incomplete(missing_reqs: Vec<Requirement>) -> Self {
    Self {
      status: JobStatus::Incomplete,
      error: None,
      traceback: None,
      used_reqs: Vec::new(),
      missing_reqs,
      output: Vec::new(),
    }
  }

  pub fn failed(error: impl std::fmt::Display, traceback: Option<String>) -> Self {
    Self {
      status: JobStatus::Failed,
      error: Some(error.to_string()),
      traceback,
      used_reqs: Vec::new(),
      missing_reqs: Vec::new(),
      output: Vec::new(),
    }
  }

  /// A failed result carrying the error and its source chain.
  pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
    let mut chain = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
      chain.push(format!("caused by: {cause}"));
      source = cause.source();
    }
    Self::failed(err, Some(chain.join("\n")))
  }

  pub fn desc(&self) -> &'static str {
    self.status.desc()
  }

  /// The target this result may be cached under, if any.
  ///
  /// Only ok results of targets that produce resources are cached.
  pub fn cache_target_name(&self, target: &Target) -> Option<TargetName> {
    (self.status == JobStatus::Ok && target.has_output()).then(|| target.name().clone())
  }
}

/// A requirement together with the resources its providers produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvidedRequirement {
  pub requirement: Requirement,
  pub resources: Vec<Resource>,
}

/// Everything a job needs to run, independent of the graph.
///
/// The descriptor's content hash is the job's cache key: it changes whenever
/// the module declaration or any provided resource changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobDescriptor {
  Import {
    module: ModuleDecl,
    custom_types: CustomTypes,
    provided: Vec<ProvidedRequirement>,
  },
  Test {
    module: String,
    test: TestDecl,
    provided: Vec<ProvidedRequirement>,
  },
}

impl PieceCodec for JobDescriptor {}
impl Hashable for JobDescriptor {}

impl JobDescriptor {
  pub fn kind(&self) -> &'static str {
    match self {
      JobDescriptor::Import { .. } => "import",
      JobDescriptor::Test { .. } => "test",
    }
  }
}

/// A runnable build action.
pub trait Job: Send {
  fn run(&self) -> JobResult;
}

/// Resources provided for `requirement`, if the descriptor carries it.
fn provided_for<'a>(provided: &'a [ProvidedRequirement], requirement: &Requirement) -> Option<&'a [Resource]> {
  provided
    .iter()
    .find(|p| p.requirement == *requirement)
    .map(|p| p.resources.as_slice())
}
