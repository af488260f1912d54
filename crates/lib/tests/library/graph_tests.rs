//! Target graph construction and readiness.

use serde_json::json;

use kiln_lib::job::JobResult;
use kiln_lib::manifest::{Manifest, ModuleDecl};
use kiln_lib::requirement::Requirement;
use kiln_lib::resource::Resource;
use kiln_lib::target::graph::{GraphError, TargetSet};
use kiln_lib::target::{TargetName, TargetState};

use super::common::{app, lib, targets};

fn module_resource(name: &str) -> Resource {
  Resource::Module {
    name: name.to_string(),
    source_hash: format!("{name}-source"),
    imports: vec![],
    recorders: Default::default(),
  }
}

#[test]
fn import_cycle_fails_construction() {
  let result = TargetSet::from_manifest(Manifest {
    modules: vec![ModuleDecl::new("a").with_import("b"), ModuleDecl::new("b").with_import("a")],
    ..Default::default()
  });

  match result {
    Err(GraphError::Cycle(members)) => assert_eq!(members, vec!["import/a", "import/b"]),
    other => panic!("expected a cycle error, got {other:?}"),
  }
}

#[test]
fn requirement_closing_a_cycle_is_rejected() {
  let mut set = targets(vec![lib(), app()]);

  let err = set
    .add_requirement(&TargetName::import("lib"), Requirement::Service {
      name: "server".to_string(),
    })
    .unwrap_err();

  assert!(matches!(err, GraphError::Cycle(_)));
}

#[test]
fn unresolved_import_is_target_missing() {
  let result = TargetSet::from_manifest(Manifest {
    modules: vec![ModuleDecl::new("app").with_import("nowhere")],
    ..Default::default()
  });

  let err = result.unwrap_err();
  assert_eq!(err.to_string(), "target missing: module:nowhere (required by import/app)");
}

#[test]
fn dependents_become_ready_within_one_step() {
  let mut set = targets(vec![lib(), app()]);
  let lib = TargetName::import("lib");
  let app = TargetName::import("app");

  assert!(!set.get(&app).unwrap().ready());

  set.mark_building(&lib).unwrap();
  assert!(!set.get(&app).unwrap().ready());
  set
    .record_result(&lib, &JobResult::ok(vec![], vec![module_resource("lib")]))
    .unwrap();

  assert!(set.get(&app).unwrap().ready());
  assert_eq!(set.ready_targets(), vec![app.clone()]);
}

#[test]
fn readiness_only_reverts_through_invalidation() {
  let other = ModuleDecl::new("other").with_attribute("cron", "service", json!({}));
  let mut set = targets(vec![lib(), app(), other]);
  let lib = TargetName::import("lib");
  let app = TargetName::import("app");
  let other = TargetName::import("other");

  set.mark_building(&lib).unwrap();
  set
    .record_result(&lib, &JobResult::ok(vec![], vec![module_resource("lib")]))
    .unwrap();
  assert!(set.get(&app).unwrap().ready());

  // Unrelated transitions leave app ready.
  set.mark_building(&other).unwrap();
  set.record_result(&other, &JobResult::failed("boom", None)).unwrap();
  for name in [lib.clone(), app.clone()] {
    set.update_status(&name).unwrap();
  }
  assert!(set.get(&app).unwrap().ready());

  let invalidated = set.invalidate(&lib).unwrap();
  assert_eq!(invalidated, vec![lib.clone(), app.clone()]);
  assert_eq!(set.get(&app).unwrap().state(), TargetState::Unbuilt);
  assert_eq!(set.get(&lib).unwrap().state(), TargetState::Ready);
}

#[test]
fn failed_target_blocks_transitive_dependents() {
  let top = ModuleDecl::new("top").with_import("app");
  let mut set = targets(vec![lib(), app(), top]);
  let lib = TargetName::import("lib");

  set.mark_building(&lib).unwrap();
  set.record_result(&lib, &JobResult::failed("boom", None)).unwrap();

  assert_eq!(set.blocked_by(&TargetName::import("top")), Some(lib.clone()));
  assert!(set.ready_targets().is_empty());
}
