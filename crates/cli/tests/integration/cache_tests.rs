//! Cache command integration tests.

use predicates::prelude::*;

use super::common::TestEnv;

#[test]
fn stats_of_empty_cache() {
  let env = TestEnv::from_fixture("lib_app.json");

  env
    .kiln_cmd()
    .args(["cache", "stats"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Cache is empty"));
}

#[test]
fn stats_and_clear_after_build() {
  let env = TestEnv::from_fixture("lib_app.json");
  env.build_json(&[]);

  let output = env.kiln_cmd().args(["cache", "stats", "-o", "json"]).output().unwrap();
  let stats: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(stats["entries"], 2);

  env
    .kiln_cmd()
    .args(["cache", "clear"])
    .assert()
    .success()
    .stdout(predicate::str::contains("Removed 2 cached result(s)"));

  let second = env.build_json(&[]);
  assert_eq!(second["report"]["cache_hits"], serde_json::json!([]));
}

#[test]
fn explicit_cache_dir() {
  let env = TestEnv::from_fixture("lib_app.json");
  let dir = env.temp.path().join("elsewhere");

  env.build_json(&["--cache-dir", dir.to_str().unwrap()]);

  assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 2);
  env
    .kiln_cmd()
    .args(["cache", "stats", "--cache-dir"])
    .arg(&dir)
    .assert()
    .success()
    .stdout(predicate::str::contains("Entries: 2"));
}
