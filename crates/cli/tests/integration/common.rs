//! Shared test helpers for CLI integration tests.

use std::path::PathBuf;

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Get path to a fixture file.
pub fn fixture_path(name: &str) -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
    .join("tests")
    .join("fixtures")
    .join(name)
}

/// Read fixture content.
pub fn fixture_content(name: &str) -> String {
  std::fs::read_to_string(fixture_path(name)).unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
}

/// Isolated test environment.
///
/// Each test gets its own temporary directory with an isolated cache and
/// content store.
pub struct TestEnv {
  pub temp: TempDir,
  pub manifest_path: PathBuf,
}

impl TestEnv {
  /// Copy a fixture manifest to a temporary `kiln.json`.
  pub fn from_fixture(name: &str) -> Self {
    let temp = TempDir::new().unwrap();
    let manifest_path = temp.path().join("kiln.json");
    std::fs::write(&manifest_path, fixture_content(name)).unwrap();
    Self { temp, manifest_path }
  }

  /// Cache root (isolated per test).
  pub fn cache_path(&self) -> PathBuf {
    let p = self.temp.path().join("cache");
    std::fs::create_dir_all(&p).unwrap();
    dunce::canonicalize(&p).unwrap_or(p)
  }

  /// Directory of the file-backed resource cache.
  pub fn results_path(&self) -> PathBuf {
    self.cache_path().join("results")
  }

  /// Get a pre-configured Command for the kiln binary.
  ///
  /// Sets `KILN_CACHE_DIR` so the resource cache and the content store live
  /// under the test's temporary directory.
  pub fn kiln_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("kiln");
    cmd.env("KILN_CACHE_DIR", self.cache_path());
    cmd.env_remove("KILN_STORE");
    cmd.env_remove("RUST_LOG");
    cmd
  }

  /// Run `kiln build -o json` and parse its summary.
  pub fn build_json(&self, extra: &[&str]) -> serde_json::Value {
    let output = self
      .kiln_cmd()
      .arg("build")
      .arg(&self.manifest_path)
      .args(["-o", "json"])
      .args(extra)
      .output()
      .unwrap();
    serde_json::from_slice(&output.stdout)
      .unwrap_or_else(|e| panic!("build output is not JSON ({e}): {}", String::from_utf8_lossy(&output.stdout)))
  }
}
