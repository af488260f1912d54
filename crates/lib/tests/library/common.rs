//! Shared helpers for library integration tests.

use std::sync::Arc;

use serde_json::json;

use kiln_lib::execute::{BuildContext, BuildReport, ExecuteConfig, build};
use kiln_lib::job::{DriverMode, JobDriver, JobRegistry};
use kiln_lib::manifest::{Manifest, ModuleDecl};
use kiln_lib::store::MemoryStore;
use kiln_lib::target::graph::TargetSet;

pub fn run_async<F: std::future::Future>(f: F) -> F::Output {
  tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .unwrap()
    .block_on(f)
}

/// `lib` exports the `db` service.
pub fn lib() -> ModuleDecl {
  ModuleDecl::new("lib")
    .with_source("def db(): ...")
    .with_attribute("db", "service", json!({}))
}

/// `app` imports `lib` and builds a `server` service on top of `db`.
pub fn app() -> ModuleDecl {
  ModuleDecl::new("app")
    .with_source("def server(db): ...")
    .with_import("lib")
    .with_attribute("server", "service", json!({"params": ["db"]}))
}

pub fn targets(modules: Vec<ModuleDecl>) -> TargetSet {
  TargetSet::from_manifest(Manifest {
    modules,
    ..Default::default()
  })
  .unwrap()
}

pub fn config() -> ExecuteConfig {
  ExecuteConfig {
    parallelism: 2,
    ..Default::default()
  }
}

/// In-process context running jobs from `jobs`, without a cache.
pub fn context_with(jobs: JobRegistry) -> BuildContext {
  let driver = JobDriver::new(Arc::new(MemoryStore::new()), Arc::new(jobs), DriverMode::InProcess);
  BuildContext::new(driver, None)
}

pub fn build_all(targets: &mut TargetSet, ctx: &BuildContext) -> BuildReport {
  run_async(build(targets, ctx, &config())).unwrap()
}
