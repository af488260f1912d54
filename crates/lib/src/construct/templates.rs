//! Template schemas of the built-in attribute kinds.

use serde::Deserialize;
use serde::de::DeserializeOwned;

use super::ConstructError;
use crate::manifest::AttributeRef;
use crate::requirement::{ProviderKey, ProviderKind};
use crate::resource::CtlKind;
use crate::store::Piece;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct ServiceTemplate {
  /// Defaults to the attribute name.
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default)]
  pub params: Vec<String>,
  /// Markers whose attributes the service collects.
  #[serde(default)]
  pub markers: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct ParameterTemplate {
  pub service: String,
  #[serde(default)]
  pub name: Option<String>,
  #[serde(default, rename = "type")]
  pub type_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct MarkerTemplate {
  pub marker: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct InitHookTemplate {}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct ConfigItemTemplate {
  pub service: String,
  #[serde(default)]
  pub key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct ConfigCtlTemplate {
  pub service: String,
  #[serde(default)]
  pub ctl: CtlKind,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct FixtureTemplate {
  /// Defaults to the attribute name.
  #[serde(default)]
  pub service: Option<String>,
  #[serde(default)]
  pub params: Vec<String>,
}

/// Decode a template value. A missing (`null`) value reads as an empty object.
pub(super) fn decode<T: DeserializeOwned>(kind: &str, attribute: &AttributeRef, value: &Piece) -> Result<T, ConstructError> {
  let value = if value.is_null() {
    Piece::Object(Default::default())
  } else {
    value.clone()
  };
  serde_json::from_value(value).map_err(|source| ConstructError::InvalidTemplate {
    kind: kind.to_string(),
    attribute: format!("{}:{}", attribute.module, attribute.name),
    source,
  })
}

/// The provider index entry an attribute contributes, if any.
///
/// Attributes whose template does not decode contribute nothing here; their
/// module's import job reports the template error.
pub(crate) fn provided_key(attribute: &AttributeRef) -> Option<ProviderKey> {
  match attribute.kind.as_str() {
    "service" => {
      let template: ServiceTemplate = decode("service", attribute, &attribute.value).ok()?;
      let name = template.name.unwrap_or_else(|| attribute.name.clone());
      Some(ProviderKey::new(ProviderKind::Service, name))
    }
    "marker" => {
      let template: MarkerTemplate = decode("marker", attribute, &attribute.value).ok()?;
      Some(ProviderKey::new(ProviderKind::Marker, template.marker))
    }
    "config_ctl" => {
      let template: ConfigCtlTemplate = decode("config_ctl", attribute, &attribute.value).ok()?;
      Some(ProviderKey::new(ProviderKind::ConfigCtl, template.service))
    }
    "fixture" => {
      let template: FixtureTemplate = decode("fixture", attribute, &attribute.value).ok()?;
      let service = template.service.unwrap_or_else(|| attribute.name.clone());
      Some(ProviderKey::new(ProviderKind::Fixture, service))
    }
    _ => None,
  }
}
