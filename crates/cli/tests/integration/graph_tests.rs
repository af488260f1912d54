//! Graph command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn graph_lists_targets_in_build_order() {
  let env = TestEnv::from_fixture("lib_app.json");

  let output = env
    .kiln_cmd()
    .arg("graph")
    .arg(&env.manifest_path)
    .args(["-o", "json"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let entries: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  let names: Vec<_> = entries
    .as_array()
    .unwrap()
    .iter()
    .map(|e| e["name"].as_str().unwrap().to_string())
    .collect();
  assert_eq!(names, vec!["import/lib", "import/app", "test/app/test_server"]);
  assert_eq!(entries[0]["state"], "ready");
  assert_eq!(entries[1]["deps"], serde_json::json!(["import/lib"]));
  assert_eq!(entries[1]["requirements"], serde_json::json!(["module:lib"]));
}

#[test]
fn graph_text_shows_edges() {
  let env = TestEnv::from_fixture("lib_app.json");

  env
    .kiln_cmd()
    .arg("graph")
    .arg(&env.manifest_path)
    .assert()
    .success()
    .stdout(predicate::str::contains("import/app [unbuilt]"))
    .stdout(predicate::str::contains("→ import/lib"));
}

#[test]
fn graph_rejects_cycles() {
  let env = TestEnv::from_fixture("cycle.json");

  env
    .kiln_cmd()
    .arg("graph")
    .arg(&env.manifest_path)
    .assert()
    .failure()
    .stderr(predicate::str::contains("dependency cycle between targets: import/a, import/b"));
}
