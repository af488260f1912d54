//! Resources: the built artifacts of the graph.
//!
//! A resource is pure data plus an effect on the running [`System`]. Resources are
//! produced by import jobs (through the constructor registry), shipped between
//! targets as job inputs, persisted in the resource cache and finally applied to
//! a system in the order defined by [`apply::order_resources`].
//!
//! Equality is structural: two resources with the same fields are the same
//! resource, and their pieces hash identically.

pub mod apply;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::store::PieceCodec;
use crate::system::{ApplyError, AttrPath, System};
use crate::util::hash::{Hashable, ObjectHash};

static NO_RECORDERS: BTreeMap<String, String> = BTreeMap::new();

/// How a service's configuration is collected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CtlKind {
  /// Config items are keyed; one item per key.
  #[default]
  Dict,
  /// Config items accumulate in application order.
  List,
}

impl std::fmt::Display for CtlKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CtlKind::Dict => write!(f, "dict"),
      CtlKind::List => write!(f, "list"),
    }
  }
}

/// A cross-module import binding carried by a module resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ImportRecord {
  /// Imported module name.
  pub module: String,
  /// Source hash of the imported module at build time.
  pub source_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resource {
  /// An imported module.
  Module {
    name: String,
    source_hash: String,
    imports: Vec<ImportRecord>,
    recorders: BTreeMap<String, String>,
  },
  /// Links a module to one of its attributes.
  AttributeBinding { module: String, name: String },
  /// An attribute used as an invokable.
  Call { module: String, name: String },
  Service {
    name: String,
    module: String,
    attr: String,
    params: Vec<String>,
    markers: Vec<String>,
  },
  Parameter {
    service: String,
    name: String,
    module: String,
    attr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    type_hash: Option<ObjectHash>,
  },
  Marker { marker: String, module: String, attr: String },
  InitHook { module: String, attr: String },
  /// Installs the config control of a service.
  ConfigCtl { service: String, ctl: CtlKind },
  ConfigItem {
    service: String,
    key: String,
    module: String,
    attr: String,
  },
  Fixture {
    service: String,
    module: String,
    attr: String,
    params: Vec<String>,
  },
}

impl PieceCodec for Resource {}
impl Hashable for Resource {}

impl Resource {
  /// Stable key identifying what this resource is about.
  pub fn key(&self) -> String {
    match self {
      Resource::Module { name, .. } => format!("module:{name}"),
      Resource::AttributeBinding { module, name } => format!("binding:{module}:{name}"),
      Resource::Call { module, name } => format!("call:{module}:{name}"),
      Resource::Service { name, .. } => format!("service:{name}"),
      Resource::Parameter { service, name, .. } => format!("parameter:{service}:{name}"),
      Resource::Marker { marker, module, attr } => format!("marker:{marker}:{module}:{attr}"),
      Resource::InitHook { module, attr } => format!("init_hook:{module}:{attr}"),
      Resource::ConfigCtl { service, .. } => format!("config_ctl:{service}"),
      Resource::ConfigItem { service, key, .. } => format!("config_item:{service}:{key}"),
      Resource::Fixture { service, .. } => format!("fixture:{service}"),
    }
  }

  /// System resources are applied before every ordinary resource.
  pub fn is_system_resource(&self) -> bool {
    matches!(self, Resource::ConfigCtl { .. })
  }

  /// Whether this resource installs a config control that later config
  /// lookups for the same service depend on.
  pub fn is_config_ctl_creg_item(&self) -> bool {
    matches!(self, Resource::ConfigCtl { .. })
  }

  /// The service whose configuration this resource installs or resolves.
  pub fn config_service(&self) -> Option<&str> {
    match self {
      Resource::ConfigCtl { service, .. } | Resource::ConfigItem { service, .. } => Some(service),
      _ => None,
    }
  }

  pub fn import_records(&self) -> &[ImportRecord] {
    match self {
      Resource::Module { imports, .. } => imports,
      _ => &[],
    }
  }

  pub fn recorders(&self) -> &BTreeMap<String, String> {
    match self {
      Resource::Module { recorders, .. } => recorders,
      _ => &NO_RECORDERS,
    }
  }

  /// Apply this resource's effect to the running system.
  ///
  /// Applying the same resource value again leaves the system unchanged.
  pub fn configure_system(&self, system: &mut System) -> Result<(), ApplyError> {
    match self {
      Resource::Module {
        name,
        source_hash,
        imports,
        ..
      } => system.add_module(name, source_hash, imports),
      Resource::AttributeBinding { .. } | Resource::Call { .. } => Ok(()),
      Resource::Service {
        name,
        module,
        attr,
        params,
        markers,
      } => system.add_service(name, AttrPath::new(module, attr), params, markers),
      Resource::Parameter {
        service,
        name,
        module,
        attr,
        ..
      } => system.set_parameter(service, name, AttrPath::new(module, attr)),
      Resource::Marker { marker, module, attr } => {
        system.add_marker(marker, AttrPath::new(module, attr));
        Ok(())
      }
      Resource::InitHook { module, attr } => {
        system.add_init_hook(AttrPath::new(module, attr));
        Ok(())
      }
      Resource::ConfigCtl { service, ctl } => system.install_config_ctl(service, *ctl),
      Resource::ConfigItem {
        service,
        key,
        module,
        attr,
      } => system.add_config_item(service, key, AttrPath::new(module, attr)),
      Resource::Fixture {
        service, module, attr, ..
      } => system.add_fixture(service, AttrPath::new(module, attr)),
    }
  }
}
