//! Targets: buildable units of the graph.
//!
//! One import target exists per module (`import/<module>`), producing the
//! module's resources. Test targets (`test/<module>/<test>`) are derived from an
//! import target and produce no resources; they check that the test's
//! parameters resolve.

pub mod graph;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::requirement::Requirement;
use crate::resource::Resource;
use crate::util::hash::{HashError, Hashable, ObjectHash};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetName(pub String);

impl TargetName {
  pub fn import(module: &str) -> Self {
    Self(format!("import/{module}"))
  }

  pub fn test(module: &str, test: &str) -> Self {
    Self(format!("test/{module}/{test}"))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for TargetName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetKind {
  Import { module: String },
  Test { module: String, test: String },
}

/// Build state of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetState {
  Unbuilt,
  /// Every dependency is built ok; the target may be dispatched.
  Ready,
  Building,
  Ok,
  /// The last run missed requirements; retried once they are wired.
  Incomplete,
  Failed,
}

impl fmt::Display for TargetState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      TargetState::Unbuilt => "unbuilt",
      TargetState::Ready => "ready",
      TargetState::Building => "building",
      TargetState::Ok => "ok",
      TargetState::Incomplete => "incomplete",
      TargetState::Failed => "failed",
    };
    f.write_str(s)
  }
}

/// Resources produced by a successful build, with their content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetOutput {
  pub resources: Vec<Resource>,
  pub hash: ObjectHash,
}

impl TargetOutput {
  pub fn new(resources: Vec<Resource>) -> Result<Self, HashError> {
    let hash = resources.compute_hash()?;
    Ok(Self { resources, hash })
  }
}

impl Hashable for Vec<Resource> {}

#[derive(Debug, Clone)]
pub struct Target {
  name: TargetName,
  kind: TargetKind,
  pub(crate) deps: BTreeSet<TargetName>,
  pub(crate) import_requirements: BTreeSet<Requirement>,
  pub(crate) state: TargetState,
  output: Option<TargetOutput>,
  last_hash: Option<ObjectHash>,
  pub(crate) used_reqs: Vec<Requirement>,
  pub(crate) missing_reqs: Vec<Requirement>,
  pub(crate) error: Option<String>,
  pub(crate) traceback: Option<String>,
}

impl Target {
  fn new(name: TargetName, kind: TargetKind) -> Self {
    Self {
      name,
      kind,
      deps: BTreeSet::new(),
      import_requirements: BTreeSet::new(),
      state: TargetState::Unbuilt,
      output: None,
      last_hash: None,
      used_reqs: Vec::new(),
      missing_reqs: Vec::new(),
      error: None,
      traceback: None,
    }
  }

  pub fn import(module: &str) -> Self {
    Self::new(
      TargetName::import(module),
      TargetKind::Import {
        module: module.to_string(),
      },
    )
  }

  pub fn test(module: &str, test: &str) -> Self {
    Self::new(
      TargetName::test(module, test),
      TargetKind::Test {
        module: module.to_string(),
        test: test.to_string(),
      },
    )
  }

  pub fn name(&self) -> &TargetName {
    &self.name
  }

  pub fn kind(&self) -> &TargetKind {
    &self.kind
  }

  pub fn module(&self) -> &str {
    match &self.kind {
      TargetKind::Import { module } | TargetKind::Test { module, .. } => module,
    }
  }

  pub fn is_test(&self) -> bool {
    matches!(self.kind, TargetKind::Test { .. })
  }

  /// Whether a successful build yields cacheable resources.
  pub fn has_output(&self) -> bool {
    matches!(self.kind, TargetKind::Import { .. })
  }

  pub fn state(&self) -> TargetState {
    self.state
  }

  pub fn ready(&self) -> bool {
    self.state == TargetState::Ready
  }

  pub fn deps(&self) -> &BTreeSet<TargetName> {
    &self.deps
  }

  pub fn import_requirements(&self) -> &BTreeSet<Requirement> {
    &self.import_requirements
  }

  pub fn output(&self) -> Option<&TargetOutput> {
    self.output.as_ref()
  }

  /// Hash of the most recent successful output, kept across invalidation.
  pub fn last_hash(&self) -> Option<&ObjectHash> {
    self.last_hash.as_ref()
  }

  pub fn used_reqs(&self) -> &[Requirement] {
    &self.used_reqs
  }

  pub fn missing_reqs(&self) -> &[Requirement] {
    &self.missing_reqs
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }

  pub fn traceback(&self) -> Option<&str> {
    self.traceback.as_deref()
  }

  /// Store a new output. Returns whether its hash differs from the previous
  /// successful build.
  pub(crate) fn set_output(&mut self, output: TargetOutput) -> bool {
    let changed = self.last_hash.as_ref().is_some_and(|last| *last != output.hash);
    self.last_hash = Some(output.hash.clone());
    self.output = Some(output);
    changed
  }

  pub(crate) fn reset(&mut self) {
    self.state = TargetState::Unbuilt;
    self.output = None;
    self.missing_reqs.clear();
    self.error = None;
    self.traceback = None;
  }
}
