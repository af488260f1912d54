//! The worker side of out-of-process job execution.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::driver::panic_message;
use super::{JobError, JobRegistry, JobResult};
use crate::construct::ConstructorRegistry;
use crate::store::{ContentStore, FileStore, ObjectRef};

/// Resolve `reference` from the file store at `store_dir` and run the job.
///
/// The worker builds the same default registries as an in-process build, so a
/// job yields the same result on either side of the process boundary.
pub fn run_worker(store_dir: &Path, reference: &ObjectRef) -> JobResult {
  let store = FileStore::new(store_dir);
  let jobs = JobRegistry::with_defaults(Arc::new(ConstructorRegistry::with_defaults()));

  let job = match store
    .get(reference)
    .map_err(JobError::from)
    .and_then(|piece| jobs.resolve(&piece))
  {
    Ok(job) => job,
    Err(e) => return JobResult::from_error(&e),
  };

  debug!(job = %reference, "running job");
  let result = match catch_unwind(AssertUnwindSafe(|| job.run())) {
    Ok(result) => result,
    Err(payload) => JobResult::from_error(&JobError::Panic(panic_message(&*payload))),
  };
  info!(job = %reference, status = result.desc(), "job finished");
  result
}
