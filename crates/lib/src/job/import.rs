use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use tracing::{debug, warn};

use super::{Job, JobResult, ProvidedRequirement, provided_for};
use crate::construct::{ConstructError, ConstructorRegistry, CustomTypes, NameToResource};
use crate::manifest::ModuleDecl;
use crate::requirement::Requirement;
use crate::resource::{ImportRecord, Resource};

/// Discovers one module: runs the constructor registry over its attributes and
/// produces the module's resources.
pub struct ImportJob {
  module: ModuleDecl,
  custom_types: CustomTypes,
  provided: Vec<ProvidedRequirement>,
  constructors: Arc<ConstructorRegistry>,
}

impl ImportJob {
  pub fn new(
    module: ModuleDecl,
    custom_types: CustomTypes,
    provided: Vec<ProvidedRequirement>,
    constructors: Arc<ConstructorRegistry>,
  ) -> Self {
    Self {
      module,
      custom_types,
      provided,
      constructors,
    }
  }

  /// Whether the descriptor carries resources for `requirement`.
  fn satisfied(&self, requirement: &Requirement) -> bool {
    match provided_for(&self.provided, requirement) {
      Some(resources) => requirement.allows_empty() || !requirement.find_in(resources).is_empty(),
      None => false,
    }
  }

  /// The module resource, or the imports that are not available yet.
  fn module_resource(&self) -> Result<Resource, Vec<Requirement>> {
    let mut imports = Vec::new();
    let mut missing = Vec::new();

    for name in &self.module.imports {
      let requirement = Requirement::Module { name: name.clone() };
      let found = provided_for(&self.provided, &requirement)
        .and_then(|resources| requirement.find_in(resources).into_iter().next());
      match found {
        Some(Resource::Module { source_hash, .. }) => imports.push(ImportRecord {
          module: name.clone(),
          source_hash: source_hash.clone(),
        }),
        _ => missing.push(requirement),
      }
    }

    if !missing.is_empty() {
      return Err(missing);
    }
    Ok(Resource::Module {
      name: self.module.name.clone(),
      source_hash: self.module.source_hash(),
      imports,
      recorders: self.module.recorders.clone(),
    })
  }

  fn discover(&self) -> Result<JobResult, ConstructError> {
    let module_resource = match self.module_resource() {
      Ok(resource) => resource,
      Err(missing) => return Ok(JobResult::incomplete(missing)),
    };

    let mut names = NameToResource::new();
    let mut resources = vec![module_resource.clone()];
    let mut sites = HashSet::new();
    let mut implied: BTreeSet<Requirement> = self
      .module
      .imports
      .iter()
      .map(|name| Requirement::Module { name: name.clone() })
      .collect();

    for attribute in self.module.feed() {
      let constructor = self.constructors.construct(
        &attribute.directive(),
        &self.custom_types,
        &mut names,
        &module_resource,
        &attribute,
      )?;
      if !sites.insert(constructor.key()) {
        return Err(ConstructError::DuplicateKey(constructor.key()));
      }

      if let Some(binding) = names.get(&attribute.name) {
        resources.push(binding.clone());
      }
      if let Some(call) = names.get(&format!("{}.call", attribute.name)) {
        resources.push(call.clone());
      }
      resources.push(constructor.get_component(&names)?);
      implied.extend(constructor.requirements());
    }

    // Requirements this module provides for itself need no dependency. Markers
    // are aggregated across every declaring module, so they always go through
    // the graph.
    implied.retain(|r| r.allows_empty() || r.find_in(&resources).is_empty());

    let missing: Vec<_> = implied
      .iter()
      .filter(|r| !r.is_test_requirement() && !self.satisfied(r))
      .cloned()
      .collect();
    if !missing.is_empty() {
      debug!(module = %self.module.name, missing = missing.len(), "module has unresolved requirements");
      return Ok(JobResult::incomplete(missing));
    }

    Ok(JobResult::ok(implied.into_iter().collect(), resources))
  }
}

impl Job for ImportJob {
  fn run(&self) -> JobResult {
    match self.discover() {
      Ok(result) => result,
      Err(e) => {
        warn!(module = %self.module.name, error = %e, "module discovery failed");
        JobResult::from_error(&e)
      }
    }
  }
}
