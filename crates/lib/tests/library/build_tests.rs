//! Pass-driven builds over the default and scripted job registries.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde_json::json;

use kiln_lib::cache::{MemoryCache, ResourceCache};
use kiln_lib::construct::{
  ConstructError, Constructor, ConstructorHandler, ConstructorRegistry, CustomTypes, RegistryError,
};
use kiln_lib::execute::{BuildContext, BuildOutcome, ExecuteConfig, build, collect_resources};
use kiln_lib::job::{Job, JobError, JobRegistry, JobResult, JobStatus};
use kiln_lib::manifest::{AttributeRef, ModuleDecl};
use kiln_lib::requirement::Requirement;
use kiln_lib::store::Piece;
use kiln_lib::target::graph::TargetSet;
use kiln_lib::target::{TargetName, TargetState};

use super::common::{app, build_all, config, context_with, lib, run_async, targets};

struct Scripted(JobResult);

impl Job for Scripted {
  fn run(&self) -> JobResult {
    self.0.clone()
  }
}

fn default_context() -> BuildContext {
  BuildContext::from_config(&config(), None)
}

fn output_hash(set: &TargetSet, name: &TargetName) -> String {
  set.get(name).unwrap().output().unwrap().hash.0.clone()
}

#[test]
fn incomplete_then_ok_takes_exactly_two_passes() {
  let calls = Arc::new(AtomicUsize::new(0));
  let used = vec![Requirement::Marker {
    name: "http".to_string(),
  }];

  let mut jobs = JobRegistry::new();
  let counter = calls.clone();
  let ok_used = used.clone();
  jobs
    .register(
      "import",
      Box::new(move |_: &Piece| -> Result<Box<dyn Job>, JobError> {
        let result = if counter.fetch_add(1, Ordering::SeqCst) == 0 {
          JobResult::incomplete(vec![])
        } else {
          JobResult::ok(ok_used.clone(), vec![])
        };
        Ok(Box::new(Scripted(result)) as Box<dyn Job>)
      }),
    )
    .unwrap();

  let mut set = targets(vec![ModuleDecl::new("app")]);
  let report = build_all(&mut set, &context_with(jobs));

  assert_eq!(report.passes, 2);
  assert_eq!(calls.load(Ordering::SeqCst), 2);
  assert_eq!(report.outcome(), BuildOutcome::Success);

  let target = set.get(&TargetName::import("app")).unwrap();
  assert_eq!(target.state(), TargetState::Ok);
  assert_eq!(target.used_reqs(), used.as_slice());
}

#[test]
fn undeclared_service_is_wired_and_retried() {
  let app = ModuleDecl::new("app").with_attribute("server", "service", json!({"params": ["db"]}));
  let mut set = targets(vec![lib(), app]);

  let report = build_all(&mut set, &default_context());

  assert_eq!(report.outcome(), BuildOutcome::Success);
  let app = set.get(&TargetName::import("app")).unwrap();
  assert!(app.deps().contains(&TargetName::import("lib")));
  assert!(app.used_reqs().contains(&Requirement::Service { name: "db".to_string() }));
}

#[test]
fn failed_target_stays_failed_until_its_input_changes() {
  let broken = ModuleDecl::new("lib").with_attribute("db", "deploy", json!({}));
  let mut set = targets(vec![broken, app()]);
  let ctx = default_context();

  let report = build_all(&mut set, &ctx);
  assert_eq!(report.outcome(), BuildOutcome::Failed);
  assert_eq!(report.blocked.len(), 1);

  // Nothing is retried with unchanged inputs.
  let report = build_all(&mut set, &ctx);
  assert!(report.jobs.is_empty());
  assert_eq!(set.get(&TargetName::import("lib")).unwrap().state(), TargetState::Failed);
  assert_eq!(report.failed[0].name, TargetName::import("lib"));

  set.update_module(lib()).unwrap();
  assert_eq!(set.get(&TargetName::import("lib")).unwrap().state(), TargetState::Ready);

  let report = build_all(&mut set, &ctx);
  assert_eq!(report.outcome(), BuildOutcome::Success);
  assert_eq!(set.get(&TargetName::import("app")).unwrap().state(), TargetState::Ok);
}

#[test]
fn failed_dependent_reruns_when_upstream_output_changes() {
  let defaults = Arc::new(JobRegistry::with_defaults(Arc::new(ConstructorRegistry::with_defaults())));
  let app_broken = Arc::new(AtomicBool::new(true));

  let mut jobs = JobRegistry::new();
  let broken = app_broken.clone();
  let fallback = defaults.clone();
  jobs
    .register(
      "import",
      Box::new(move |piece: &Piece| -> Result<Box<dyn Job>, JobError> {
        let is_app = piece.pointer("/module/name").and_then(Piece::as_str) == Some("app");
        if is_app && broken.load(Ordering::SeqCst) {
          return Ok(Box::new(Scripted(JobResult::failed("server exploded", None))) as Box<dyn Job>);
        }
        fallback.resolve(piece)
      }),
    )
    .unwrap();
  let ctx = context_with(jobs);
  let mut set = targets(vec![lib(), app()]);
  let app_name = TargetName::import("app");

  let report = build_all(&mut set, &ctx);
  assert_eq!(report.outcome(), BuildOutcome::Failed);
  assert_eq!(report.failed[0].name, app_name);

  app_broken.store(false, Ordering::SeqCst);
  let report = build_all(&mut set, &ctx);
  assert!(report.jobs.is_empty());
  assert_eq!(set.get(&app_name).unwrap().state(), TargetState::Failed);

  set.update_module(lib().with_source("def db(pool): ...")).unwrap();
  assert_eq!(set.get(&app_name).unwrap().state(), TargetState::Failed);

  let report = build_all(&mut set, &ctx);
  assert_eq!(report.outcome(), BuildOutcome::Success);
  assert!(
    report
      .jobs
      .iter()
      .any(|j| j.target == app_name && j.status == JobStatus::Ok)
  );
  assert_eq!(set.get(&app_name).unwrap().state(), TargetState::Ok);
}

#[test]
fn lib_and_app_end_to_end() {
  let mut set = targets(vec![lib(), app()]);
  let ctx = default_context();
  let lib_name = TargetName::import("lib");
  let app_name = TargetName::import("app");

  let report = build_all(&mut set, &ctx);
  assert_eq!(report.outcome(), BuildOutcome::Success);
  let first_lib_pass = report.jobs.iter().find(|j| j.target == lib_name).unwrap().pass;
  let first_app_ok = report
    .jobs
    .iter()
    .find(|j| j.target == app_name && j.status == JobStatus::Ok)
    .unwrap()
    .pass;
  assert_eq!(first_lib_pass, 1);
  assert!(first_app_ok > first_lib_pass);

  let keys: Vec<_> = collect_resources(&set).unwrap().iter().map(|r| r.key()).collect();
  assert!(keys.contains(&"service:db".to_string()));
  assert!(keys.contains(&"service:server".to_string()));

  let app_hash = output_hash(&set, &app_name);
  let app_descriptor = set.job_descriptor(&app_name).unwrap();

  // Changing lib's content changes app's inputs and output.
  set.update_module(lib().with_source("def db(pool): ...")).unwrap();
  let report = build_all(&mut set, &ctx);

  assert_eq!(report.outcome(), BuildOutcome::Success);
  assert!(report.jobs.iter().any(|j| j.target == app_name));
  assert_ne!(output_hash(&set, &app_name), app_hash);
  assert_ne!(set.job_descriptor(&app_name).unwrap(), app_descriptor);
}

#[test]
fn cached_results_replay_without_running_jobs() {
  let cache: Arc<dyn ResourceCache> = Arc::new(MemoryCache::new());
  let config = ExecuteConfig {
    parallelism: 1,
    ..Default::default()
  };
  let ctx = BuildContext::from_config(&config, Some(cache));

  let mut first = targets(vec![lib(), app()]);
  run_async(build(&mut first, &ctx, &config)).unwrap();

  let mut second = targets(vec![lib(), app()]);
  let report = run_async(build(&mut second, &ctx, &config)).unwrap();

  assert_eq!(report.cache_hits, vec![TargetName::import("lib"), TargetName::import("app")]);
  assert_eq!(collect_resources(&second).unwrap(), collect_resources(&first).unwrap());
  assert_eq!(
    output_hash(&second, &TargetName::import("app")),
    output_hash(&first, &TargetName::import("app"))
  );
}

#[test]
fn registries_reject_duplicate_kinds() {
  let mut constructors = ConstructorRegistry::with_defaults();
  assert!(constructors.kinds().any(|kind| kind == "service"));
  assert_eq!(
    constructors.register(Box::new(DuplicateService)).unwrap_err(),
    RegistryError::DuplicateKind("service".to_string())
  );

  let mut jobs = JobRegistry::with_defaults(Arc::new(ConstructorRegistry::with_defaults()));
  assert_eq!(
    jobs
      .register(
        "import",
        Box::new(|_: &Piece| -> Result<Box<dyn Job>, JobError> { Err(JobError::MissingKind) }),
      )
      .unwrap_err(),
    RegistryError::DuplicateKind("import".to_string())
  );
}

struct DuplicateService;

impl ConstructorHandler for DuplicateService {
  fn kind(&self) -> &'static str {
    "service"
  }

  fn from_template_piece(
    &self,
    _piece: &Piece,
    _attribute: &AttributeRef,
    _custom_types: &CustomTypes,
  ) -> Result<Constructor, ConstructError> {
    unreachable!("registration is rejected before construction")
  }
}
