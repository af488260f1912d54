use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, trace};

use super::templates::{
  ConfigCtlTemplate, ConfigItemTemplate, FixtureTemplate, InitHookTemplate, MarkerTemplate, ParameterTemplate,
  ServiceTemplate, decode,
};
use super::{ConstructError, Constructor, CustomTypes, NameToResource};
use crate::manifest::AttributeRef;
use crate::resource::Resource;
use crate::store::Piece;
use crate::util::hash::Hashable;

/// Errors building a registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
  #[error("a handler for kind {0:?} is already registered")]
  DuplicateKind(String),
}

/// Decodes the template of one attribute kind into a [`Constructor`].
pub trait ConstructorHandler: Send + Sync {
  /// The attribute kind tag this handler owns.
  fn kind(&self) -> &'static str;

  /// Callable kinds also register a `Call` resource for their attribute.
  fn is_callable(&self) -> bool {
    false
  }

  fn from_template_piece(
    &self,
    piece: &Piece,
    attribute: &AttributeRef,
    custom_types: &CustomTypes,
  ) -> Result<Constructor, ConstructError>;
}

pub struct ServiceHandler;

impl ConstructorHandler for ServiceHandler {
  fn kind(&self) -> &'static str {
    "service"
  }

  fn is_callable(&self) -> bool {
    true
  }

  fn from_template_piece(&self, piece: &Piece, attribute: &AttributeRef, _: &CustomTypes) -> Result<Constructor, ConstructError> {
    let template: ServiceTemplate = decode(self.kind(), attribute, piece)?;
    Ok(Constructor::Service {
      module: attribute.module.clone(),
      attr: attribute.name.clone(),
      name: template.name.unwrap_or_else(|| attribute.name.clone()),
      params: template.params,
      markers: template.markers,
    })
  }
}

pub struct ParameterHandler;

impl ConstructorHandler for ParameterHandler {
  fn kind(&self) -> &'static str {
    "parameter"
  }

  fn from_template_piece(
    &self,
    piece: &Piece,
    attribute: &AttributeRef,
    custom_types: &CustomTypes,
  ) -> Result<Constructor, ConstructError> {
    let template: ParameterTemplate = decode(self.kind(), attribute, piece)?;

    let type_hash = match template.type_name {
      Some(name) => {
        let Some(ty) = custom_types.get(&name) else {
          return Err(ConstructError::UnknownType {
            name,
            attribute: format!("{}:{}", attribute.module, attribute.name),
          });
        };
        Some(ty.compute_hash().map_err(ConstructError::Encode)?)
      }
      None => None,
    };

    Ok(Constructor::Parameter {
      module: attribute.module.clone(),
      attr: attribute.name.clone(),
      service: template.service,
      name: template.name.unwrap_or_else(|| attribute.name.clone()),
      type_hash,
    })
  }
}

pub struct MarkerHandler;

impl ConstructorHandler for MarkerHandler {
  fn kind(&self) -> &'static str {
    "marker"
  }

  fn from_template_piece(&self, piece: &Piece, attribute: &AttributeRef, _: &CustomTypes) -> Result<Constructor, ConstructError> {
    let template: MarkerTemplate = decode(self.kind(), attribute, piece)?;
    Ok(Constructor::Marker {
      module: attribute.module.clone(),
      attr: attribute.name.clone(),
      marker: template.marker,
    })
  }
}

pub struct InitHookHandler;

impl ConstructorHandler for InitHookHandler {
  fn kind(&self) -> &'static str {
    "init_hook"
  }

  fn is_callable(&self) -> bool {
    true
  }

  fn from_template_piece(&self, piece: &Piece, attribute: &AttributeRef, _: &CustomTypes) -> Result<Constructor, ConstructError> {
    let _: InitHookTemplate = decode(self.kind(), attribute, piece)?;
    Ok(Constructor::InitHook {
      module: attribute.module.clone(),
      attr: attribute.name.clone(),
    })
  }
}

pub struct ConfigItemHandler;

impl ConstructorHandler for ConfigItemHandler {
  fn kind(&self) -> &'static str {
    "config_item"
  }

  fn from_template_piece(&self, piece: &Piece, attribute: &AttributeRef, _: &CustomTypes) -> Result<Constructor, ConstructError> {
    let template: ConfigItemTemplate = decode(self.kind(), attribute, piece)?;
    Ok(Constructor::ConfigItem {
      module: attribute.module.clone(),
      attr: attribute.name.clone(),
      service: template.service,
      key: template.key.unwrap_or_else(|| attribute.name.clone()),
    })
  }
}

pub struct ConfigCtlHandler;

impl ConstructorHandler for ConfigCtlHandler {
  fn kind(&self) -> &'static str {
    "config_ctl"
  }

  fn from_template_piece(&self, piece: &Piece, attribute: &AttributeRef, _: &CustomTypes) -> Result<Constructor, ConstructError> {
    let template: ConfigCtlTemplate = decode(self.kind(), attribute, piece)?;
    Ok(Constructor::ConfigCtl {
      module: attribute.module.clone(),
      attr: attribute.name.clone(),
      service: template.service,
      ctl: template.ctl,
    })
  }
}

pub struct FixtureHandler;

impl ConstructorHandler for FixtureHandler {
  fn kind(&self) -> &'static str {
    "fixture"
  }

  fn is_callable(&self) -> bool {
    true
  }

  fn from_template_piece(&self, piece: &Piece, attribute: &AttributeRef, _: &CustomTypes) -> Result<Constructor, ConstructError> {
    let template: FixtureTemplate = decode(self.kind(), attribute, piece)?;
    Ok(Constructor::Fixture {
      module: attribute.module.clone(),
      attr: attribute.name.clone(),
      service: template.service.unwrap_or_else(|| attribute.name.clone()),
      params: template.params,
    })
  }
}

/// Kind tag to handler dispatch, owned by a build session.
#[derive(Default)]
pub struct ConstructorRegistry {
  handlers: BTreeMap<&'static str, Box<dyn ConstructorHandler>>,
}

impl std::fmt::Debug for ConstructorRegistry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ConstructorRegistry")
      .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
      .finish()
  }
}

impl ConstructorRegistry {
  /// An empty registry.
  pub fn new() -> Self {
    Self::default()
  }

  /// A registry with every built-in kind registered.
  pub fn with_defaults() -> Self {
    let builtins: [Box<dyn ConstructorHandler>; 7] = [
      Box::new(ServiceHandler),
      Box::new(ParameterHandler),
      Box::new(MarkerHandler),
      Box::new(InitHookHandler),
      Box::new(ConfigItemHandler),
      Box::new(ConfigCtlHandler),
      Box::new(FixtureHandler),
    ];
    let handlers = builtins.into_iter().map(|h| (h.kind(), h)).collect();
    Self { handlers }
  }

  /// Register a handler for its kind tag.
  pub fn register(&mut self, handler: Box<dyn ConstructorHandler>) -> Result<(), RegistryError> {
    let kind = handler.kind();
    if self.handlers.contains_key(kind) {
      return Err(RegistryError::DuplicateKind(kind.to_string()));
    }
    debug!(kind, "registered constructor handler");
    self.handlers.insert(kind, handler);
    Ok(())
  }

  pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
    self.handlers.keys().copied()
  }

  /// Construct the constructor for one attribute.
  ///
  /// Registers the attribute binding under the attribute name and, for callable
  /// kinds, a `Call` resource under `"<attr>.call"`.
  pub fn construct(
    &self,
    piece: &Piece,
    custom_types: &CustomTypes,
    name_to_resource: &mut NameToResource,
    module_resource: &Resource,
    attribute: &AttributeRef,
  ) -> Result<Constructor, ConstructError> {
    let site = format!("{}:{}", attribute.module, attribute.name);
    let Some(kind) = piece.get("kind").and_then(Piece::as_str) else {
      return Err(ConstructError::InvalidDirective {
        attribute: site,
        reason: "missing string field `kind`".to_string(),
      });
    };
    let Some(handler) = self.handlers.get(kind) else {
      return Err(ConstructError::UnrecognizedKind {
        kind: kind.to_string(),
        attribute: site,
      });
    };
    let Resource::Module { name: module, .. } = module_resource else {
      return Err(ConstructError::NotAModule(module_resource.key()));
    };

    let value = piece.get("value").unwrap_or(&Piece::Null);
    let constructor = handler.from_template_piece(value, attribute, custom_types)?;

    name_to_resource.insert(
      attribute.name.clone(),
      Resource::AttributeBinding {
        module: module.clone(),
        name: attribute.name.clone(),
      },
    );
    if handler.is_callable() {
      name_to_resource.insert(
        format!("{}.call", attribute.name),
        Resource::Call {
          module: module.clone(),
          name: attribute.name.clone(),
        },
      );
    }

    trace!(kind, attribute = %site, "constructed attribute");
    Ok(constructor)
  }
}
