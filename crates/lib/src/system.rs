//! The running system that resources configure.
//!
//! A [`System`] is assembled by applying built resources in order (see
//! [`crate::resource::apply`]). Every mutation is idempotent: applying an equal
//! value twice is accepted, while applying a conflicting value for the same slot
//! is an [`ApplyError`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resource::{CtlKind, ImportRecord};

/// Errors raised while applying resources to a system.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApplyError {
  /// A config item was applied before the control of its service was installed.
  #[error("config item {key:?} for service {service} applied before its config control")]
  ConfigCtlMissing { service: String, key: String },

  /// A config control was installed twice with different kinds.
  #[error("config control for service {service} is {installed}, cannot install {requested}")]
  ConfigCtlConflict {
    service: String,
    installed: CtlKind,
    requested: CtlKind,
  },

  /// A dict config key is bound to two different attributes.
  #[error("config key {key:?} of service {service} is bound to both {existing} and {new}")]
  ConfigConflict {
    service: String,
    key: String,
    existing: AttrPath,
    new: AttrPath,
  },

  /// The same slot was configured twice with different values.
  #[error("conflicting definitions for {0}")]
  Conflict(String),
}

/// A `(module, attribute)` location.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttrPath {
  pub module: String,
  pub attr: String,
}

impl AttrPath {
  pub fn new(module: impl Into<String>, attr: impl Into<String>) -> Self {
    Self {
      module: module.into(),
      attr: attr.into(),
    }
  }
}

impl fmt::Display for AttrPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.module, self.attr)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntry {
  pub source_hash: String,
  pub imports: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
  pub factory: AttrPath,
  pub params: Vec<String>,
  pub markers: Vec<String>,
}

/// Configuration collected for one service through its control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "ctl", content = "items", rename_all = "lowercase")]
pub enum ConfigValues {
  Dict(BTreeMap<String, AttrPath>),
  List(Vec<(String, AttrPath)>),
}

impl ConfigValues {
  fn kind(&self) -> CtlKind {
    match self {
      ConfigValues::Dict(_) => CtlKind::Dict,
      ConfigValues::List(_) => CtlKind::List,
    }
  }
}

/// Configured state produced by applying resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct System {
  pub modules: BTreeMap<String, ModuleEntry>,
  pub services: BTreeMap<String, ServiceEntry>,
  /// Service name to parameter name to the attribute providing it.
  pub parameters: BTreeMap<String, BTreeMap<String, AttrPath>>,
  pub markers: BTreeMap<String, Vec<AttrPath>>,
  /// Init hooks in application order.
  pub init_hooks: Vec<AttrPath>,
  pub config: BTreeMap<String, ConfigValues>,
  pub fixtures: BTreeMap<String, AttrPath>,
}

impl System {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn add_module(&mut self, name: &str, source_hash: &str, imports: &[ImportRecord]) -> Result<(), ApplyError> {
    let entry = ModuleEntry {
      source_hash: source_hash.to_string(),
      imports: imports.iter().map(|r| r.module.clone()).collect(),
    };
    insert_once(&mut self.modules, name, entry, || format!("module {name}"))
  }

  pub fn add_service(
    &mut self,
    name: &str,
    factory: AttrPath,
    params: &[String],
    markers: &[String],
  ) -> Result<(), ApplyError> {
    let entry = ServiceEntry {
      factory,
      params: params.to_vec(),
      markers: markers.to_vec(),
    };
    insert_once(&mut self.services, name, entry, || format!("service {name}"))
  }

  pub fn set_parameter(&mut self, service: &str, name: &str, source: AttrPath) -> Result<(), ApplyError> {
    let params = self.parameters.entry(service.to_string()).or_default();
    insert_once(params, name, source, || format!("parameter {name} of service {service}"))
  }

  pub fn add_marker(&mut self, marker: &str, path: AttrPath) {
    let marked = self.markers.entry(marker.to_string()).or_default();
    if !marked.contains(&path) {
      marked.push(path);
    }
  }

  pub fn add_init_hook(&mut self, path: AttrPath) {
    if !self.init_hooks.contains(&path) {
      self.init_hooks.push(path);
    }
  }

  pub fn install_config_ctl(&mut self, service: &str, ctl: CtlKind) -> Result<(), ApplyError> {
    match self.config.get(service) {
      Some(existing) if existing.kind() == ctl => Ok(()),
      Some(existing) => Err(ApplyError::ConfigCtlConflict {
        service: service.to_string(),
        installed: existing.kind(),
        requested: ctl,
      }),
      None => {
        let values = match ctl {
          CtlKind::Dict => ConfigValues::Dict(BTreeMap::new()),
          CtlKind::List => ConfigValues::List(Vec::new()),
        };
        self.config.insert(service.to_string(), values);
        Ok(())
      }
    }
  }

  /// Add a config item through the installed control of `service`.
  pub fn add_config_item(&mut self, service: &str, key: &str, path: AttrPath) -> Result<(), ApplyError> {
    let Some(values) = self.config.get_mut(service) else {
      return Err(ApplyError::ConfigCtlMissing {
        service: service.to_string(),
        key: key.to_string(),
      });
    };

    match values {
      ConfigValues::Dict(items) => match items.get(key) {
        Some(existing) if *existing == path => Ok(()),
        Some(existing) => Err(ApplyError::ConfigConflict {
          service: service.to_string(),
          key: key.to_string(),
          existing: existing.clone(),
          new: path,
        }),
        None => {
          items.insert(key.to_string(), path);
          Ok(())
        }
      },
      ConfigValues::List(items) => {
        let item = (key.to_string(), path);
        if !items.contains(&item) {
          items.push(item);
        }
        Ok(())
      }
    }
  }

  pub fn add_fixture(&mut self, service: &str, path: AttrPath) -> Result<(), ApplyError> {
    insert_once(&mut self.fixtures, service, path, || format!("fixture {service}"))
  }
}

fn insert_once<V: PartialEq>(
  map: &mut BTreeMap<String, V>,
  key: &str,
  value: V,
  describe: impl FnOnce() -> String,
) -> Result<(), ApplyError> {
  match map.get(key) {
    Some(existing) if *existing == value => Ok(()),
    Some(_) => Err(ApplyError::Conflict(describe())),
    None => {
      map.insert(key.to_string(), value);
      Ok(())
    }
  }
}
