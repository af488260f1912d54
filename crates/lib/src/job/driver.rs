use std::any::Any;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use super::{JobError, JobRegistry, JobResult};
use crate::store::{ContentStore, ObjectRef};

/// How to reach the out-of-process job worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
  /// Executable invoked as `<program> worker --store <store_dir> <ref>`.
  pub program: PathBuf,
  /// Directory of the file store the worker reads descriptors from.
  pub store_dir: PathBuf,
  /// Kill the worker and fail the job after this long.
  pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverMode {
  InProcess,
  Subprocess(WorkerConfig),
}

/// Resolves job refs and runs them. Retries are the graph's concern, never the
/// driver's.
#[derive(Clone)]
pub struct JobDriver {
  store: Arc<dyn ContentStore>,
  jobs: Arc<JobRegistry>,
  mode: DriverMode,
}

impl std::fmt::Debug for JobDriver {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("JobDriver").field("mode", &self.mode).finish_non_exhaustive()
  }
}

impl JobDriver {
  pub fn new(store: Arc<dyn ContentStore>, jobs: Arc<JobRegistry>, mode: DriverMode) -> Self {
    Self { store, jobs, mode }
  }

  pub fn mode(&self) -> &DriverMode {
    &self.mode
  }

  pub fn store(&self) -> &Arc<dyn ContentStore> {
    &self.store
  }

  /// Run the job behind `reference` and report its result.
  ///
  /// Errors resolving or running the job become failed results.
  pub async fn run(&self, reference: &ObjectRef) -> JobResult {
    let result = match &self.mode {
      DriverMode::InProcess => self.run_in_process(reference).await,
      DriverMode::Subprocess(config) => run_subprocess(config, reference).await,
    };
    result.unwrap_or_else(|e| {
      warn!(job = %reference, error = %e, "job did not run to completion");
      JobResult::from_error(&e)
    })
  }

  async fn run_in_process(&self, reference: &ObjectRef) -> Result<JobResult, JobError> {
    let piece = self.store.get(reference)?;
    let job = self.jobs.resolve(&piece)?;

    match tokio::task::spawn_blocking(move || job.run()).await {
      Ok(result) => Ok(result),
      Err(e) if e.is_panic() => {
        let payload = e.into_panic();
        Err(JobError::Panic(panic_message(&*payload)))
      }
      Err(e) => Err(JobError::Panic(e.to_string())),
    }
  }
}

async fn run_subprocess(config: &WorkerConfig, reference: &ObjectRef) -> Result<JobResult, JobError> {
  let mut command = Command::new(&config.program);
  command
    .arg("worker")
    .arg("--store")
    .arg(&config.store_dir)
    .arg(reference.to_string())
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

  debug!(job = %reference, program = %config.program.display(), "spawning worker");
  let child = command.spawn().map_err(|source| JobError::Spawn {
    program: config.program.clone(),
    source,
  })?;

  // Dropping the wait future on timeout drops the child, which kills it.
  let output = match config.timeout {
    Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
      .await
      .map_err(|_| JobError::Timeout(limit))?,
    None => child.wait_with_output().await,
  }
  .map_err(JobError::Wait)?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    return Ok(JobResult::failed(
      format!("worker exited with {}", output.status),
      (!stderr.is_empty()).then_some(stderr),
    ));
  }

  serde_json::from_slice(&output.stdout).map_err(JobError::WorkerOutput)
}

pub(super) fn panic_message(payload: &(dyn Any + Send)) -> String {
  if let Some(s) = payload.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "unknown panic payload".to_string()
  }
}
