//! Requirements: what a target needs from other targets.
//!
//! A requirement names a resource by identity (a module, a service, the config
//! control of a service, every attribute carrying a marker, a test fixture). The
//! target graph maps each requirement to the targets providing it through the
//! provider index, and [`Requirement::make_resource_list`] extracts the matching
//! resources from a provider's built output.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::resource::Resource;
use crate::store::PieceCodec;
use crate::target::graph::{GraphError, TargetSet};
use crate::target::{Target, TargetName};
use crate::util::hash::Hashable;

/// Errors extracting a required resource from a provider target.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
  /// The provider has not produced an output yet.
  #[error("target {0} has no output")]
  NoOutput(TargetName),

  /// The provider's output holds no resource matching the requirement.
  #[error("target {target} does not provide {requirement}")]
  NotProvided { requirement: String, target: TargetName },
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requirement {
  /// The module resource of an imported module.
  Module { name: String },
  /// A service template.
  Service { name: String },
  /// The config control of a service.
  ConfigCtl { service: String },
  /// Every attribute carrying the marker.
  Marker { name: String },
  /// A test fixture, falling back to the service itself.
  Fixture { service: String },
}

/// Which provider index a requirement is looked up in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProviderKind {
  Module,
  Service,
  ConfigCtl,
  Marker,
  Fixture,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProviderKey {
  pub kind: ProviderKind,
  pub name: String,
}

impl ProviderKey {
  pub fn new(kind: ProviderKind, name: impl Into<String>) -> Self {
    Self {
      kind,
      name: name.into(),
    }
  }
}

impl fmt::Display for ProviderKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let kind = match self.kind {
      ProviderKind::Module => "module",
      ProviderKind::Service => "service",
      ProviderKind::ConfigCtl => "config_ctl",
      ProviderKind::Marker => "marker",
      ProviderKind::Fixture => "fixture",
    };
    write!(f, "{kind}:{}", self.name)
  }
}

impl PieceCodec for Requirement {}
impl Hashable for Requirement {}

impl fmt::Display for Requirement {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.key())
  }
}

impl Requirement {
  /// Stable key used for deduplication and ordering.
  pub fn key(&self) -> String {
    self.provider_key().to_string()
  }

  pub fn provider_key(&self) -> ProviderKey {
    match self {
      Requirement::Module { name } => ProviderKey::new(ProviderKind::Module, name),
      Requirement::Service { name } => ProviderKey::new(ProviderKind::Service, name),
      Requirement::ConfigCtl { service } => ProviderKey::new(ProviderKind::ConfigCtl, service),
      Requirement::Marker { name } => ProviderKey::new(ProviderKind::Marker, name),
      Requirement::Fixture { service } => ProviderKey::new(ProviderKind::Fixture, service),
    }
  }

  /// Test requirements only apply within test targets.
  pub fn is_test_requirement(&self) -> bool {
    matches!(self, Requirement::Fixture { .. })
  }

  /// Whether a requirement may legitimately resolve to no resources at all.
  pub fn allows_empty(&self) -> bool {
    matches!(self, Requirement::Marker { .. })
  }

  /// Rewire the test target derived from `import_target` for this requirement.
  ///
  /// Only fixtures rewire: the test target takes the fixture as an import
  /// requirement of its own, which wires it to the fixture's providers.
  pub fn update_tested_target(
    &self,
    import_target: &TargetName,
    test_target: &TargetName,
    targets: &mut TargetSet,
  ) -> Result<(), GraphError> {
    if !self.is_test_requirement() {
      return Ok(());
    }
    debug!(
      requirement = %self,
      import = %import_target,
      test = %test_target,
      "routing test requirement"
    );
    targets.add_requirement(test_target, self.clone())?;
    Ok(())
  }

  /// Every resource in `resources` this requirement matches.
  ///
  /// A fixture requirement matches fixtures of its service and falls back to
  /// the service itself when no fixture is present.
  pub fn find_in<'a>(&self, resources: &'a [Resource]) -> Vec<&'a Resource> {
    match self {
      Requirement::Module { name } => resources
        .iter()
        .filter(|r| matches!(r, Resource::Module { name: n, .. } if n == name))
        .collect(),
      Requirement::Service { name } => resources
        .iter()
        .filter(|r| matches!(r, Resource::Service { name: n, .. } if n == name))
        .collect(),
      Requirement::ConfigCtl { service } => resources
        .iter()
        .filter(|r| matches!(r, Resource::ConfigCtl { service: s, .. } if s == service))
        .collect(),
      Requirement::Marker { name } => resources
        .iter()
        .filter(|r| matches!(r, Resource::Marker { marker, .. } if marker == name))
        .collect(),
      Requirement::Fixture { service } => {
        let fixtures: Vec<_> = resources
          .iter()
          .filter(|r| matches!(r, Resource::Fixture { service: s, .. } if s == service))
          .collect();
        if !fixtures.is_empty() {
          return fixtures;
        }
        resources
          .iter()
          .filter(|r| matches!(r, Resource::Service { name, .. } if name == service))
          .collect()
      }
    }
  }

  /// Extract the resource this requirement names from a provider's output.
  pub fn make_resource(&self, target: &Target) -> Result<Resource, ResolveError> {
    let output = target.output().ok_or_else(|| ResolveError::NoOutput(target.name().clone()))?;
    self
      .find_in(&output.resources)
      .into_iter()
      .next()
      .cloned()
      .ok_or_else(|| ResolveError::NotProvided {
        requirement: self.key(),
        target: target.name().clone(),
      })
  }

  /// Extract every resource this requirement expands to in a provider's output.
  ///
  /// Markers fan out to each marked attribute. Every other requirement yields
  /// exactly one resource.
  pub fn make_resource_list(&self, target: &Target) -> Result<Vec<Resource>, ResolveError> {
    match self {
      Requirement::Marker { .. } => {
        let output = target.output().ok_or_else(|| ResolveError::NoOutput(target.name().clone()))?;
        let found: Vec<_> = self.find_in(&output.resources).into_iter().cloned().collect();
        if found.is_empty() {
          return Err(ResolveError::NotProvided {
            requirement: self.key(),
            target: target.name().clone(),
          });
        }
        Ok(found)
      }
      _ => Ok(vec![self.make_resource(target)?]),
    }
  }
}
