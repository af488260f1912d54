//! Pass-driven build execution.
//!
//! A build repeatedly dispatches every ready target of a [`TargetSet`] until no
//! target is ready. Each pass:
//! - builds a self-contained descriptor per ready target and stores it
//! - replays cached results for descriptors built before
//! - runs the remaining jobs in parallel, bounded by `parallelism`
//! - records results in completion order, which readies the next targets
//!
//! Targets left over once nothing is ready are reported failed, blocked by a
//! failed dependency, or incomplete.

pub mod types;

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::cache::{CacheRecord, ResourceCache};
use crate::construct::ConstructorRegistry;
use crate::job::{DriverMode, JobDriver, JobRegistry, JobResult, JobStatus};
use crate::resource::Resource;
use crate::store::{ContentStore, FileStore, MemoryStore, ObjectRef, PieceCodec};
use crate::target::graph::TargetSet;
use crate::target::{TargetName, TargetState};

pub use types::{
  BlockedTarget, BuildOutcome, BuildReport, ExecuteConfig, ExecuteError, FailedTarget, INCOMPLETE_REASON,
  IncompleteTarget, JobRecord,
};

/// Where descriptors are stored, how jobs run and where results are cached.
#[derive(Clone)]
pub struct BuildContext {
  driver: JobDriver,
  cache: Option<Arc<dyn ResourceCache>>,
}

impl std::fmt::Debug for BuildContext {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("BuildContext")
      .field("driver", &self.driver)
      .field("cached", &self.cache.is_some())
      .finish()
  }
}

impl BuildContext {
  pub fn new(driver: JobDriver, cache: Option<Arc<dyn ResourceCache>>) -> Self {
    Self { driver, cache }
  }

  /// A context with the default job and constructor registries.
  ///
  /// With a worker configured, descriptors go to a file store the worker can
  /// read and jobs run as subprocesses. Otherwise they stay in memory and run
  /// in-process.
  pub fn from_config(config: &ExecuteConfig, cache: Option<Arc<dyn ResourceCache>>) -> Self {
    let jobs = Arc::new(JobRegistry::with_defaults(Arc::new(ConstructorRegistry::with_defaults())));
    let driver = match &config.worker {
      Some(worker) => {
        let store: Arc<dyn ContentStore> = Arc::new(FileStore::new(&worker.store_dir));
        JobDriver::new(store, jobs, DriverMode::Subprocess(worker.clone()))
      }
      None => JobDriver::new(Arc::new(MemoryStore::new()), jobs, DriverMode::InProcess),
    };
    Self::new(driver, cache)
  }

  pub fn driver(&self) -> &JobDriver {
    &self.driver
  }

  pub fn store(&self) -> &Arc<dyn ContentStore> {
    self.driver.store()
  }

  pub fn cache(&self) -> Option<&Arc<dyn ResourceCache>> {
    self.cache.as_ref()
  }
}

/// Build every target reachable from the ready set.
///
/// # Errors
///
/// Job failures never abort the build. Errors are returned only when the graph
/// rejects a result (for example a new requirement closing a cycle) or a
/// descriptor cannot be stored.
#[instrument(skip_all, fields(targets = targets.len()))]
pub async fn build(
  targets: &mut TargetSet,
  ctx: &BuildContext,
  config: &ExecuteConfig,
) -> Result<BuildReport, ExecuteError> {
  let semaphore = Arc::new(Semaphore::new(config.parallelism.max(1)));
  let mut report = BuildReport::default();

  for pass in 1..=config.max_passes {
    let ready = targets.ready_targets();
    if ready.is_empty() {
      debug!(pass, "no ready targets");
      break;
    }
    report.passes = pass;
    info!(pass, ready = ready.len(), "starting pass");

    let mut join_set = JoinSet::new();
    let mut running = BTreeSet::new();

    for name in ready {
      targets.mark_building(&name)?;
      let descriptor = targets.job_descriptor(&name)?;
      let piece = descriptor.piece().map_err(ExecuteError::Encode)?;
      let job_ref = ctx.store().put(&piece)?;

      if let Some(record) = cached_record(ctx, &job_ref, &name) {
        debug!(target = %name, job = %job_ref, "cache hit");
        targets.record_result(&name, &record.into_result())?;
        report.cache_hits.push(name.clone());
        report.jobs.push(JobRecord {
          pass,
          target: name,
          status: JobStatus::Ok,
          cached: true,
        });
        continue;
      }

      let driver = ctx.driver.clone();
      let semaphore = semaphore.clone();
      let task_name = name.clone();
      join_set.spawn(async move {
        // The semaphore is never closed.
        let _permit = semaphore.acquire_owned().await.ok();
        let result = driver.run(&job_ref).await;
        (task_name, job_ref, result)
      });
      running.insert(name);
    }

    while let Some(joined) = join_set.join_next().await {
      let (name, job_ref, result) = match joined {
        Ok(done) => done,
        Err(e) => {
          error!(error = %e, "job task panicked");
          continue;
        }
      };
      running.remove(&name);
      finish_job(targets, ctx, pass, &name, Some(&job_ref), result, &mut report)?;
    }

    for name in std::mem::take(&mut running) {
      let result = JobResult::failed("job task did not complete", None);
      finish_job(targets, ctx, pass, &name, None, result, &mut report)?;
    }
  }

  summarize(targets, &mut report);
  info!(
    passes = report.passes,
    built = report.built.len(),
    failed = report.failed.len(),
    incomplete = report.incomplete.len(),
    outcome = %report.outcome(),
    "build finished"
  );
  Ok(report)
}

fn cached_record(ctx: &BuildContext, job_ref: &ObjectRef, name: &TargetName) -> Option<CacheRecord> {
  let record = ctx.cache.as_ref()?.get(job_ref.hash())?;
  if record.target != *name {
    warn!(job = %job_ref, target = %name, cached_for = %record.target, "cache record belongs to another target");
    return None;
  }
  Some(record)
}

fn finish_job(
  targets: &mut TargetSet,
  ctx: &BuildContext,
  pass: usize,
  name: &TargetName,
  job_ref: Option<&ObjectRef>,
  result: JobResult,
  report: &mut BuildReport,
) -> Result<(), ExecuteError> {
  debug!(target = %name, status = result.desc(), "job finished");
  targets.record_result(name, &result)?;

  if let (Some(cache), Some(job_ref)) = (&ctx.cache, job_ref)
    && let Some(cache_name) = result.cache_target_name(targets.get(name)?)
    && let Err(e) = cache.put(job_ref.hash(), &CacheRecord::new(cache_name, &result))
  {
    warn!(target = %name, error = %e, "failed to cache result");
  }

  report.jobs.push(JobRecord {
    pass,
    target: name.clone(),
    status: result.status,
    cached: false,
  });
  Ok(())
}

/// Classify every target by where it ended up.
fn summarize(targets: &TargetSet, report: &mut BuildReport) {
  for target in targets.iter() {
    let name = target.name().clone();
    match target.state() {
      TargetState::Ok if target.is_test() => report.tests.push(name),
      TargetState::Ok => report.built.push(name),
      TargetState::Failed => report.failed.push(FailedTarget {
        name,
        error: target.error().map(str::to_string),
        traceback: target.traceback().map(str::to_string),
      }),
      _ => match targets.blocked_by(&name) {
        Some(blocked_by) => report.blocked.push(BlockedTarget { name, blocked_by }),
        None => report.incomplete.push(IncompleteTarget {
          name,
          missing: target.missing_reqs().iter().map(|r| r.key()).collect(),
          reason: INCOMPLETE_REASON.to_string(),
        }),
      },
    }
  }

  for incomplete in &report.incomplete {
    warn!(target = %incomplete.name, missing = ?incomplete.missing, "{}", incomplete.reason);
  }
}

/// Resources of every built import target, in dependency order.
pub fn collect_resources(targets: &TargetSet) -> Result<Vec<Resource>, ExecuteError> {
  Ok(targets.collect_resources()?)
}
