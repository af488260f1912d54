//! The target graph.
//!
//! [`TargetSet`] owns every target, the dependency edges between them and the
//! provider index used to wire requirements to the targets producing them.
//! Edges point from a dependency to its dependent, so a topological sort yields
//! a valid build order.
//!
//! Readiness is maintained incrementally: every state transition of a target
//! re-evaluates its direct dependents, and nothing else.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::{Target, TargetKind, TargetName, TargetOutput, TargetState};
use crate::construct::provided_key;
use crate::job::{JobDescriptor, JobResult, JobStatus, ProvidedRequirement};
use crate::manifest::{Manifest, ModuleDecl};
use crate::requirement::{ProviderKey, ProviderKind, Requirement};
use crate::resource::Resource;

/// Errors raised while building or mutating the target graph.
#[derive(Debug, Error)]
pub enum GraphError {
  /// A requirement has no provider, or a name matches no target.
  #[error("target missing: {name}{}", required_suffix(.required_by.as_ref()))]
  TargetMissing {
    name: String,
    required_by: Option<TargetName>,
  },

  /// Two targets provide the same unique resource.
  #[error("{key} is provided by both {first} and {second}")]
  DuplicateProvider {
    key: String,
    first: TargetName,
    second: TargetName,
  },

  /// Targets depend on each other.
  #[error("dependency cycle between targets: {}", .0.join(", "))]
  Cycle(Vec<String>),

  #[error("target {target} cannot go from {from} to {to}")]
  InvalidTransition {
    target: TargetName,
    from: TargetState,
    to: TargetState,
  },

  #[error("failed to hash output of {target}: {source}")]
  Hash {
    target: TargetName,
    #[source]
    source: serde_json::Error,
  },
}

fn required_suffix(required_by: Option<&TargetName>) -> String {
  required_by.map(|t| format!(" (required by {t})")).unwrap_or_default()
}

/// Every target of a build session and the edges between them.
#[derive(Debug)]
pub struct TargetSet {
  manifest: Manifest,
  targets: BTreeMap<TargetName, Target>,
  graph: DiGraph<TargetName, ()>,
  nodes: HashMap<TargetName, NodeIndex>,
  providers: BTreeMap<ProviderKey, BTreeSet<TargetName>>,
  /// Import target to the test targets derived from it.
  tests_of: BTreeMap<TargetName, Vec<TargetName>>,
}

impl TargetSet {
  /// Build the graph for a manifest.
  ///
  /// # Errors
  ///
  /// Returns `DuplicateProvider` if two modules declare the same service, config
  /// control or fixture, `TargetMissing` if an import or test parameter has no
  /// provider, and `Cycle` if the modules import each other.
  pub fn from_manifest(manifest: Manifest) -> Result<Self, GraphError> {
    let mut set = Self {
      manifest,
      targets: BTreeMap::new(),
      graph: DiGraph::new(),
      nodes: HashMap::new(),
      providers: BTreeMap::new(),
      tests_of: BTreeMap::new(),
    };
    let modules = set.manifest.modules.clone();

    for module in &modules {
      let import = set.add_target(Target::import(&module.name));
      for test in &module.tests {
        let test = set.add_target(Target::test(&module.name, &test.name));
        set.tests_of.entry(import.clone()).or_default().push(test);
      }
    }

    for module in &modules {
      let import = TargetName::import(&module.name);
      for key in provider_keys(module) {
        set.register_provider(key, &import)?;
      }
    }

    for module in &modules {
      let import = TargetName::import(&module.name);
      for name in &module.imports {
        set.wire_requirement(&import, &Requirement::Module { name: name.clone() })?;
      }
      for test in &module.tests {
        let test_target = TargetName::test(&module.name, &test.name);
        set.add_dep(&test_target, &import);
        for param in &test.params {
          let requirement = Requirement::Fixture {
            service: param.clone(),
          };
          set.wire_requirement(&test_target, &requirement)?;
        }
      }
    }

    set.check_cycles()?;

    let names: Vec<_> = set.targets.keys().cloned().collect();
    for name in &names {
      set.update_status(name)?;
    }

    info!(
      targets = set.targets.len(),
      edges = set.graph.edge_count(),
      "built target graph"
    );
    Ok(set)
  }

  fn add_target(&mut self, target: Target) -> TargetName {
    let name = target.name().clone();
    let idx = self.graph.add_node(name.clone());
    self.nodes.insert(name.clone(), idx);
    self.targets.insert(name.clone(), target);
    name
  }

  fn register_provider(&mut self, key: ProviderKey, target: &TargetName) -> Result<(), GraphError> {
    let unique = matches!(
      key.kind,
      ProviderKind::Service | ProviderKind::ConfigCtl | ProviderKind::Fixture
    );
    let entry = self.providers.entry(key.clone()).or_default();
    if unique && let Some(first) = entry.iter().find(|t| *t != target) {
      return Err(GraphError::DuplicateProvider {
        key: key.to_string(),
        first: first.clone(),
        second: target.clone(),
      });
    }
    entry.insert(target.clone());
    Ok(())
  }

  /// Add an edge making `target` depend on `dep`. Self edges are ignored.
  fn add_dep(&mut self, target: &TargetName, dep: &TargetName) -> bool {
    if target == dep {
      return false;
    }
    let (Some(&from), Some(&to)) = (self.nodes.get(dep), self.nodes.get(target)) else {
      return false;
    };
    let Some(t) = self.targets.get_mut(target) else {
      return false;
    };
    if !t.deps.insert(dep.clone()) {
      return false;
    }
    self.graph.add_edge(from, to, ());
    trace!(target = %target, dep = %dep, "added dependency");
    true
  }

  /// Resolve the targets providing `requirement` for `required_by`.
  ///
  /// A target never provides to itself. Markers may have no provider at all.
  pub fn providers_for(
    &self,
    requirement: &Requirement,
    required_by: &TargetName,
  ) -> Result<Vec<TargetName>, GraphError> {
    let mut found = self
      .providers
      .get(&requirement.provider_key())
      .cloned()
      .unwrap_or_default();

    if found.is_empty()
      && let Requirement::Fixture { service } = requirement
    {
      found = self
        .providers
        .get(&ProviderKey::new(ProviderKind::Service, service))
        .cloned()
        .unwrap_or_default();
    }

    if found.is_empty() && !requirement.allows_empty() {
      return Err(GraphError::TargetMissing {
        name: requirement.key(),
        required_by: Some(required_by.clone()),
      });
    }

    found.remove(required_by);
    Ok(found.into_iter().collect())
  }

  /// Record `requirement` on a target and wire edges to its providers, without
  /// checking for cycles. Returns whether anything changed.
  ///
  /// A requirement only the target itself provides is a self-loop.
  fn wire_requirement(&mut self, name: &TargetName, requirement: &Requirement) -> Result<bool, GraphError> {
    let providers = self.providers_for(requirement, name)?;
    if providers.is_empty() && !requirement.allows_empty() {
      return Err(GraphError::Cycle(vec![name.to_string()]));
    }
    let target = self.get_mut(name)?;
    let mut changed = target.import_requirements.insert(requirement.clone());
    for provider in &providers {
      changed |= self.add_dep(name, provider);
    }
    Ok(changed)
  }

  /// Add an import requirement to a target, wiring it to the requirement's
  /// providers.
  ///
  /// # Errors
  ///
  /// Returns `TargetMissing` if nothing provides the requirement and `Cycle` if
  /// the new edges close a cycle.
  pub fn add_requirement(&mut self, name: &TargetName, requirement: Requirement) -> Result<bool, GraphError> {
    let changed = self.wire_requirement(name, &requirement)?;
    if changed {
      debug!(target = %name, requirement = %requirement, "added requirement");
      self.check_cycles()?;
      self.update_status(name)?;
    }
    Ok(changed)
  }

  fn check_cycles(&self) -> Result<(), GraphError> {
    for component in tarjan_scc(&self.graph) {
      if component.len() > 1 {
        let mut members: Vec<String> = component.iter().map(|idx| self.graph[*idx].0.clone()).collect();
        members.sort();
        return Err(GraphError::Cycle(members));
      }
    }
    Ok(())
  }

  pub fn get(&self, name: &TargetName) -> Result<&Target, GraphError> {
    self.targets.get(name).ok_or_else(|| missing(name))
  }

  fn get_mut(&mut self, name: &TargetName) -> Result<&mut Target, GraphError> {
    self.targets.get_mut(name).ok_or_else(|| missing(name))
  }

  pub fn iter(&self) -> impl Iterator<Item = &Target> {
    self.targets.values()
  }

  pub fn len(&self) -> usize {
    self.targets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.targets.is_empty()
  }

  pub fn manifest(&self) -> &Manifest {
    &self.manifest
  }

  /// Test targets derived from an import target.
  pub fn tests_of(&self, import: &TargetName) -> &[TargetName] {
    self.tests_of.get(import).map(Vec::as_slice).unwrap_or_default()
  }

  /// Direct dependents of a target.
  pub fn dependents(&self, name: &TargetName) -> Vec<TargetName> {
    let Some(&idx) = self.nodes.get(name) else {
      return Vec::new();
    };
    let mut dependents: Vec<_> = self
      .graph
      .neighbors_directed(idx, Direction::Outgoing)
      .map(|n| self.graph[n].clone())
      .collect();
    dependents.sort();
    dependents.dedup();
    dependents
  }

  /// Targets that may be dispatched, in name order.
  pub fn ready_targets(&self) -> Vec<TargetName> {
    self
      .targets
      .values()
      .filter(|t| t.ready())
      .map(|t| t.name().clone())
      .collect()
  }

  /// Re-evaluate whether a target is ready. Returns whether its state changed.
  ///
  /// `Unbuilt` and `Incomplete` targets become `Ready` once every dependency is
  /// ok; a `Ready` target goes back to `Unbuilt` when one is not. Other states
  /// are left alone.
  pub fn update_status(&mut self, name: &TargetName) -> Result<bool, GraphError> {
    let target = self.get(name)?;
    let deps_ok = target
      .deps
      .iter()
      .all(|dep| self.targets.get(dep).is_some_and(|t| t.state == TargetState::Ok));

    let target = self.get_mut(name)?;
    let next = match (target.state, deps_ok) {
      (TargetState::Unbuilt | TargetState::Incomplete, true) => TargetState::Ready,
      (TargetState::Ready, false) => TargetState::Unbuilt,
      (state, _) => state,
    };
    if next == target.state {
      return Ok(false);
    }
    trace!(target = %name, from = %target.state, to = %next, "status updated");
    target.state = next;
    Ok(true)
  }

  /// Move a target to `state` and re-evaluate its direct dependents.
  fn transition(&mut self, name: &TargetName, state: TargetState) -> Result<(), GraphError> {
    self.get_mut(name)?.state = state;
    for dependent in self.dependents(name) {
      self.update_status(&dependent)?;
    }
    Ok(())
  }

  /// Claim a ready target for a job.
  pub fn mark_building(&mut self, name: &TargetName) -> Result<(), GraphError> {
    let target = self.get(name)?;
    if target.state != TargetState::Ready {
      return Err(GraphError::InvalidTransition {
        target: name.clone(),
        from: target.state,
        to: TargetState::Building,
      });
    }
    self.transition(name, TargetState::Building)
  }

  /// Assemble the self-contained job descriptor of a target.
  ///
  /// Each import requirement is included with the resources of its providers
  /// once every provider is built ok. Requirements whose providers are not
  /// ready, or do not hold the resource, are left out so the job reports them
  /// missing.
  pub fn job_descriptor(&self, name: &TargetName) -> Result<JobDescriptor, GraphError> {
    let target = self.get(name)?;

    let mut provided = Vec::new();
    'requirements: for requirement in &target.import_requirements {
      let mut resources = Vec::new();
      for provider in self.providers_for(requirement, name)? {
        let provider = self.get(&provider)?;
        if provider.state != TargetState::Ok {
          continue 'requirements;
        }
        match requirement.make_resource_list(provider) {
          Ok(found) => resources.extend(found),
          Err(e) => {
            warn!(target = %name, requirement = %requirement, error = %e, "provider lacks required resource");
            continue 'requirements;
          }
        }
      }
      provided.push(ProvidedRequirement {
        requirement: requirement.clone(),
        resources,
      });
    }

    match target.kind() {
      TargetKind::Import { module } => {
        let decl = self.manifest.module(module).ok_or_else(|| missing(name))?;
        Ok(JobDescriptor::Import {
          module: decl.clone(),
          custom_types: self.manifest.types.clone(),
          provided,
        })
      }
      TargetKind::Test { module, test } => {
        let decl = self
          .manifest
          .module(module)
          .and_then(|m| m.tests.iter().find(|t| t.name == *test))
          .ok_or_else(|| missing(name))?;
        Ok(JobDescriptor::Test {
          module: module.clone(),
          test: decl.clone(),
          provided,
        })
      }
    }
  }

  /// Apply a job result to a target.
  pub fn record_result(&mut self, name: &TargetName, result: &JobResult) -> Result<(), GraphError> {
    match result.status {
      JobStatus::Ok => self.record_ok(name, result),
      JobStatus::Incomplete => self.record_incomplete(name, result),
      JobStatus::Failed => {
        let target = self.get_mut(name)?;
        target.error = result.error.clone();
        target.traceback = result.traceback.clone();
        target.missing_reqs.clear();
        self.transition(name, TargetState::Failed)
      }
    }
  }

  fn record_ok(&mut self, name: &TargetName, result: &JobResult) -> Result<(), GraphError> {
    let output = TargetOutput::new(result.output.clone()).map_err(|source| GraphError::Hash {
      target: name.clone(),
      source,
    })?;

    let target = self.get_mut(name)?;
    let changed = target.set_output(output);
    target.used_reqs = result.used_reqs.clone();
    target.missing_reqs.clear();
    target.error = None;
    target.traceback = None;

    if changed {
      info!(target = %name, "output changed, invalidating dependents");
      for dependent in self.dependents(name) {
        self.invalidate(&dependent)?;
      }
    }
    self.transition(name, TargetState::Ok)?;

    let test_reqs: Vec<_> = result
      .used_reqs
      .iter()
      .filter(|r| r.is_test_requirement())
      .cloned()
      .collect();
    if !test_reqs.is_empty() {
      for test in self.tests_of(name).to_vec() {
        for requirement in &test_reqs {
          requirement.update_tested_target(name, &test, self)?;
        }
      }
    }
    Ok(())
  }

  fn record_incomplete(&mut self, name: &TargetName, result: &JobResult) -> Result<(), GraphError> {
    let target = self.get_mut(name)?;
    target.missing_reqs = result.missing_reqs.clone();
    target.error = result.error.clone();
    let is_test = target.is_test();
    self.transition(name, TargetState::Incomplete)?;

    for requirement in &result.missing_reqs {
      if requirement.is_test_requirement() && !is_test {
        for test in self.tests_of(name).to_vec() {
          requirement.update_tested_target(name, &test, self)?;
        }
      } else {
        self.wire_requirement(name, requirement)?;
      }
    }
    self.check_cycles()?;
    self.update_status(name)?;
    Ok(())
  }

  /// Force a target and every transitive dependent back to `Unbuilt`.
  ///
  /// Returns the invalidated targets in visit order.
  pub fn invalidate(&mut self, name: &TargetName) -> Result<Vec<TargetName>, GraphError> {
    self.get(name)?;

    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::from([name.clone()]);
    let mut order = Vec::new();
    while let Some(current) = queue.pop_front() {
      if !seen.insert(current.clone()) {
        continue;
      }
      for dependent in self.dependents(&current) {
        queue.push_back(dependent);
      }
      order.push(current);
    }

    for current in &order {
      self.get_mut(current)?.reset();
    }
    for current in &order {
      self.update_status(current)?;
    }
    debug!(target = %name, invalidated = order.len(), "invalidated targets");
    Ok(order)
  }

  /// Replace a module declaration after its inputs changed.
  ///
  /// The module's import target is reset and rebuilt on the next pass; its
  /// dependents follow once the new output hash differs from the old one. New
  /// imports and newly provided resources are wired. Dropped imports keep
  /// their edges and test declarations are not re-read until the graph is
  /// rebuilt from a manifest.
  pub fn update_module(&mut self, decl: ModuleDecl) -> Result<(), GraphError> {
    let import = TargetName::import(&decl.name);
    self.get(&import)?;

    for key in provider_keys(&decl) {
      self.register_provider(key, &import)?;
    }
    for name in &decl.imports {
      self.wire_requirement(&import, &Requirement::Module { name: name.clone() })?;
    }
    self.check_cycles()?;

    if let Some(slot) = self.manifest.modules.iter_mut().find(|m| m.name == decl.name) {
      *slot = decl;
    }

    self.get_mut(&import)?.reset();
    self.transition(&import, TargetState::Unbuilt)?;
    self.update_status(&import)?;
    info!(target = %import, "module updated");
    Ok(())
  }

  /// The nearest failed target this target transitively depends on.
  pub fn blocked_by(&self, name: &TargetName) -> Option<TargetName> {
    let mut seen = BTreeSet::new();
    let mut stack: Vec<TargetName> = self.targets.get(name)?.deps.iter().rev().cloned().collect();
    while let Some(current) = stack.pop() {
      if !seen.insert(current.clone()) {
        continue;
      }
      let target = self.targets.get(&current)?;
      if target.state == TargetState::Failed {
        return Some(current);
      }
      stack.extend(target.deps.iter().rev().cloned());
    }
    None
  }

  /// Targets in dependency order.
  pub fn build_order(&self) -> Result<Vec<TargetName>, GraphError> {
    match toposort(&self.graph, None) {
      Ok(sorted) => Ok(sorted.into_iter().map(|idx| self.graph[idx].clone()).collect()),
      Err(cycle) => {
        self.check_cycles()?;
        Err(GraphError::Cycle(vec![self.graph[cycle.node_id()].0.clone()]))
      }
    }
  }

  /// Resources of every built import target, in dependency order.
  pub fn collect_resources(&self) -> Result<Vec<Resource>, GraphError> {
    let mut resources = Vec::new();
    for name in self.build_order()? {
      let target = self.get(&name)?;
      if target.has_output()
        && target.state == TargetState::Ok
        && let Some(output) = target.output()
      {
        resources.extend(output.resources.iter().cloned());
      }
    }
    Ok(resources)
  }
}

fn missing(name: &TargetName) -> GraphError {
  GraphError::TargetMissing {
    name: name.to_string(),
    required_by: None,
  }
}

/// Provider index entries contributed by a module.
fn provider_keys(module: &ModuleDecl) -> Vec<ProviderKey> {
  std::iter::once(ProviderKey::new(ProviderKind::Module, &module.name))
    .chain(module.feed().filter_map(|attr| provided_key(&attr)))
    .collect()
}
