//! Build command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn build_reports_success() {
  let env = TestEnv::from_fixture("lib_app.json");

  env
    .kiln_cmd()
    .arg("build")
    .arg(&env.manifest_path)
    .assert()
    .success()
    .stdout(predicate::str::contains("Build complete!"))
    .stdout(predicate::str::contains("Targets built: 2"))
    .stdout(predicate::str::contains("Tests resolved: 1"));
}

#[test]
fn build_json_summary() {
  let env = TestEnv::from_fixture("lib_app.json");

  let summary = env.build_json(&["--show-system"]);

  assert_eq!(summary["outcome"], "success");
  assert_eq!(summary["report"]["built"], serde_json::json!(["import/app", "import/lib"]));
  assert_eq!(summary["report"]["tests"], serde_json::json!(["test/app/test_server"]));

  let system = &summary["system"];
  assert_eq!(system["services"]["server"]["params"], serde_json::json!(["db"]));
  assert_eq!(system["parameters"]["db"]["port"]["attr"], "db_port");
  assert_eq!(system["config"]["views"]["ctl"], "dict");
  assert_eq!(system["config"]["views"]["items"]["index"]["module"], "app");
  assert_eq!(system["markers"]["http"][0]["attr"], "route");
  assert_eq!(system["init_hooks"][0]["attr"], "setup");
}

#[test]
fn second_build_hits_cache() {
  let env = TestEnv::from_fixture("lib_app.json");

  let first = env.build_json(&[]);
  assert_eq!(first["report"]["cache_hits"], serde_json::json!([]));

  let second = env.build_json(&[]);
  assert_eq!(second["outcome"], "success");
  assert_eq!(second["report"]["cache_hits"], serde_json::json!(["import/lib", "import/app"]));
  assert_eq!(std::fs::read_dir(env.results_path()).unwrap().count(), 2);
}

#[test]
fn no_cache_leaves_cache_empty() {
  let env = TestEnv::from_fixture("lib_app.json");

  env.build_json(&["--no-cache"]);
  let second = env.build_json(&["--no-cache"]);

  assert_eq!(second["report"]["cache_hits"], serde_json::json!([]));
  assert!(!env.results_path().exists());
}

#[test]
fn isolated_build_matches_in_process_build() {
  let in_process = TestEnv::from_fixture("lib_app.json");
  let isolated = TestEnv::from_fixture("lib_app.json");

  let expected = in_process.build_json(&["--no-cache", "--show-system"]);
  let store = isolated.temp.path().join("store");
  let actual = isolated.build_json(&[
    "--no-cache",
    "--show-system",
    "--isolate",
    "--timeout",
    "30s",
    "--store-dir",
    store.to_str().unwrap(),
  ]);

  assert_eq!(actual["outcome"], "success");
  assert_eq!(actual["system"], expected["system"]);
  assert!(std::fs::read_dir(store.join("objects")).unwrap().count() > 0);
}

#[test]
fn timeout_requires_isolate() {
  let env = TestEnv::from_fixture("lib_app.json");

  env
    .kiln_cmd()
    .arg("build")
    .arg(&env.manifest_path)
    .args(["--timeout", "5s"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("--isolate"));
}

#[test]
fn failed_module_fails_build() {
  let env = TestEnv::from_fixture("broken.json");

  env
    .kiln_cmd()
    .arg("build")
    .arg(&env.manifest_path)
    .assert()
    .failure()
    .stderr(predicate::str::contains("import/lib"))
    .stderr(predicate::str::contains("unrecognized constructor kind \"deploy\""))
    .stderr(predicate::str::contains("import/app blocked by failed dependency import/lib"));
}

#[test]
fn failed_module_json_outcome() {
  let env = TestEnv::from_fixture("broken.json");

  let summary = env.build_json(&[]);

  assert_eq!(summary["outcome"], "failed");
  assert_eq!(summary["report"]["failed"][0]["name"], "import/lib");
  assert!(summary.get("system").is_none());
}

#[test]
fn unprovided_requirement_is_an_error() {
  let env = TestEnv::from_fixture("unprovided.json");

  env
    .kiln_cmd()
    .arg("build")
    .arg(&env.manifest_path)
    .assert()
    .failure()
    .stderr(predicate::str::contains("target missing: service:db"));
}

#[test]
fn pass_budget_reports_incomplete() {
  let env = TestEnv::from_fixture("lib_app.json");

  let summary = env.build_json(&["--no-cache", "--max-passes", "1"]);

  assert_eq!(summary["outcome"], "incomplete");
  assert_eq!(summary["report"]["built"], serde_json::json!(["import/lib"]));
  assert_eq!(
    summary["report"]["incomplete"][0]["reason"],
    "requirement never became available"
  );
}

#[test]
fn missing_manifest_fails() {
  let env = TestEnv::from_fixture("lib_app.json");

  env
    .kiln_cmd()
    .arg("build")
    .arg(env.temp.path().join("absent.json"))
    .assert()
    .failure()
    .stderr(predicate::str::contains("Failed to load manifest"));
}
