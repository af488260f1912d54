//! Constructors: translating discovered attributes into resources.
//!
//! Each attribute in the discovery feed carries a kind tag (`service`,
//! `parameter`, `marker`, ...) and a template value. The [`ConstructorRegistry`]
//! dispatches on the tag to a [`ConstructorHandler`], which decodes the template
//! into a [`Constructor`]. A constructor knows which requirements its attribute
//! implies and how to build the attribute's component resource once the
//! attribute binding has been registered.

mod registry;
mod templates;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use registry::*;
pub(crate) use templates::provided_key;

use crate::requirement::Requirement;
use crate::resource::{CtlKind, Resource};
use crate::store::{Piece, PieceCodec};
use crate::util::hash::{Hashable, ObjectHash};

/// Attribute name (or `"<attr>.call"`) to the resource registered under it.
pub type NameToResource = BTreeMap<String, Resource>;

/// Named custom types attributes may reference.
pub type CustomTypes = BTreeMap<String, Piece>;

/// Errors raised while constructing resources from attributes.
///
/// Any of these fails the import job of the module being discovered; other
/// modules are unaffected.
#[derive(Debug, Error)]
pub enum ConstructError {
  /// The directive is not an object with a string `kind`.
  #[error("invalid constructor directive for {attribute}: {reason}")]
  InvalidDirective { attribute: String, reason: String },

  /// No handler is registered for the kind tag.
  #[error("unrecognized constructor kind {kind:?} for attribute {attribute}")]
  UnrecognizedKind { kind: String, attribute: String },

  /// The template value does not match the kind's schema.
  #[error("invalid {kind} template for attribute {attribute}: {source}")]
  InvalidTemplate {
    kind: String,
    attribute: String,
    #[source]
    source: serde_json::Error,
  },

  /// A parameter references a type missing from the manifest.
  #[error("unknown type {name:?} referenced by attribute {attribute}")]
  UnknownType { name: String, attribute: String },

  /// No attribute binding is registered for the constructor's attribute.
  #[error("no component registered for attribute {0}")]
  MissingComponent(String),

  /// Two constructors share a definition site.
  #[error("duplicate constructor for {0}")]
  DuplicateKey(String),

  /// The owning resource is not a module.
  #[error("expected a module resource, got {0}")]
  NotAModule(String),

  #[error("failed to encode constructor input: {0}")]
  Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constructor {
  Service {
    module: String,
    attr: String,
    name: String,
    params: Vec<String>,
    markers: Vec<String>,
  },
  Parameter {
    module: String,
    attr: String,
    service: String,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    type_hash: Option<ObjectHash>,
  },
  Marker {
    module: String,
    attr: String,
    marker: String,
  },
  InitHook {
    module: String,
    attr: String,
  },
  ConfigItem {
    module: String,
    attr: String,
    service: String,
    key: String,
  },
  ConfigCtl {
    module: String,
    attr: String,
    service: String,
    ctl: CtlKind,
  },
  Fixture {
    module: String,
    attr: String,
    service: String,
    params: Vec<String>,
  },
}

impl PieceCodec for Constructor {}
impl Hashable for Constructor {}

impl Constructor {
  fn site(&self) -> (&str, &str) {
    match self {
      Constructor::Service { module, attr, .. }
      | Constructor::Parameter { module, attr, .. }
      | Constructor::Marker { module, attr, .. }
      | Constructor::InitHook { module, attr }
      | Constructor::ConfigItem { module, attr, .. }
      | Constructor::ConfigCtl { module, attr, .. }
      | Constructor::Fixture { module, attr, .. } => (module, attr),
    }
  }

  /// `"<module>:<attr>"`, shared by every constructor of one definition site.
  pub fn key(&self) -> String {
    let (module, attr) = self.site();
    format!("{module}:{attr}")
  }

  pub fn attr(&self) -> &str {
    self.site().1
  }

  /// Build the component resource from the binding registered for this
  /// constructor's attribute.
  pub fn get_component(&self, name_to_resource: &NameToResource) -> Result<Resource, ConstructError> {
    let Some(Resource::AttributeBinding { module, name }) = name_to_resource.get(self.attr()) else {
      return Err(ConstructError::MissingComponent(self.key()));
    };
    let (module, attr) = (module.clone(), name.clone());

    let component = match self {
      Constructor::Service { name, params, markers, .. } => Resource::Service {
        name: name.clone(),
        module,
        attr,
        params: params.clone(),
        markers: markers.clone(),
      },
      Constructor::Parameter {
        service,
        name,
        type_hash,
        ..
      } => Resource::Parameter {
        service: service.clone(),
        name: name.clone(),
        module,
        attr,
        type_hash: type_hash.clone(),
      },
      Constructor::Marker { marker, .. } => Resource::Marker {
        marker: marker.clone(),
        module,
        attr,
      },
      Constructor::InitHook { .. } => Resource::InitHook { module, attr },
      Constructor::ConfigItem { service, key, .. } => Resource::ConfigItem {
        service: service.clone(),
        key: key.clone(),
        module,
        attr,
      },
      // The control is owned by the service, not by the declaring attribute.
      Constructor::ConfigCtl { service, ctl, .. } => Resource::ConfigCtl {
        service: service.clone(),
        ctl: *ctl,
      },
      Constructor::Fixture { service, params, .. } => Resource::Fixture {
        service: service.clone(),
        module,
        attr,
        params: params.clone(),
      },
    };
    Ok(component)
  }

  /// Requirements implied by the attribute.
  pub fn requirements(&self) -> Vec<Requirement> {
    match self {
      Constructor::Service { params, markers, .. } => params
        .iter()
        .map(|p| Requirement::Service { name: p.clone() })
        .chain(markers.iter().map(|m| Requirement::Marker { name: m.clone() }))
        .collect(),
      Constructor::Parameter { service, .. } => vec![Requirement::Service {
        name: service.clone(),
      }],
      Constructor::ConfigItem { service, .. } => vec![Requirement::ConfigCtl {
        service: service.clone(),
      }],
      Constructor::Fixture { params, .. } => params
        .iter()
        .map(|p| Requirement::Fixture { service: p.clone() })
        .collect(),
      Constructor::Marker { .. } | Constructor::InitHook { .. } | Constructor::ConfigCtl { .. } => Vec::new(),
    }
  }
}
