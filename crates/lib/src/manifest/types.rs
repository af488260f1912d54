use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::store::Piece;
use crate::util::hash::Hashable;

/// Errors that can occur when loading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
  /// Failed to read the manifest file.
  #[error("failed to read manifest {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// The manifest is not valid JSON or does not match the schema.
  #[error("failed to parse manifest: {0}")]
  Parse(#[source] serde_json::Error),

  /// Two modules share a name.
  #[error("duplicate module: {0}")]
  DuplicateModule(String),

  /// A module declares the same attribute twice.
  #[error("duplicate attribute {name} in module {module}")]
  DuplicateAttribute { module: String, name: String },

  /// A module declares the same test twice.
  #[error("duplicate test {name} in module {module}")]
  DuplicateTest { module: String, name: String },

  /// A module or attribute name is empty or contains a `/`.
  #[error("invalid name {0:?}: names must be non-empty and must not contain '/'")]
  InvalidName(String),
}

/// The declared discovery feed: every module and the attributes it exports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
  /// Named custom types that attributes may reference.
  #[serde(default)]
  pub types: BTreeMap<String, Piece>,

  #[serde(default)]
  pub modules: Vec<ModuleDecl>,
}

/// A module and its declared exports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDecl {
  pub name: String,

  /// Opaque source text. Only its hash takes part in the build.
  #[serde(default)]
  pub source: String,

  /// Names of modules this module imports.
  #[serde(default)]
  pub imports: Vec<String>,

  /// Auxiliary recorders, aux name to recorder kind.
  #[serde(default)]
  pub recorders: BTreeMap<String, String>,

  #[serde(default)]
  pub attributes: Vec<AttributeDecl>,

  #[serde(default)]
  pub tests: Vec<TestDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDecl {
  pub name: String,
  pub kind: String,
  #[serde(default)]
  pub value: Piece,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestDecl {
  pub name: String,
  /// Services or fixtures the test function takes as parameters.
  #[serde(default)]
  pub params: Vec<String>,
}

/// One entry of the discovery feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRef {
  pub module: String,
  pub name: String,
  pub kind: String,
  pub value: Piece,
}

impl AttributeRef {
  /// The constructor directive for this attribute, as consumed by the registry.
  pub fn directive(&self) -> Piece {
    json!({ "kind": self.kind, "value": self.value })
  }
}

impl Manifest {
  /// Load and validate a manifest from a JSON file.
  pub fn load(path: &Path) -> Result<Self, ManifestError> {
    let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::parse(&content)
  }

  /// Parse and validate a manifest from JSON text.
  pub fn parse(content: &str) -> Result<Self, ManifestError> {
    let manifest: Manifest = serde_json::from_str(content).map_err(ManifestError::Parse)?;
    manifest.validate()?;
    Ok(manifest)
  }

  pub fn validate(&self) -> Result<(), ManifestError> {
    let mut modules = HashSet::new();
    for module in &self.modules {
      check_name(&module.name)?;
      if !modules.insert(module.name.as_str()) {
        return Err(ManifestError::DuplicateModule(module.name.clone()));
      }
      module.validate()?;
    }
    Ok(())
  }

  pub fn module(&self, name: &str) -> Option<&ModuleDecl> {
    self.modules.iter().find(|m| m.name == name)
  }

  /// Every `(module, attribute name, attribute kind, attribute value)` entry, in
  /// declaration order.
  pub fn feed(&self) -> impl Iterator<Item = AttributeRef> + '_ {
    self.modules.iter().flat_map(|m| m.feed())
  }
}

impl ModuleDecl {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      source: String::new(),
      imports: Vec::new(),
      recorders: BTreeMap::new(),
      attributes: Vec::new(),
      tests: Vec::new(),
    }
  }

  pub fn with_source(mut self, source: impl Into<String>) -> Self {
    self.source = source.into();
    self
  }

  pub fn with_import(mut self, module: impl Into<String>) -> Self {
    self.imports.push(module.into());
    self
  }

  pub fn with_attribute(mut self, name: impl Into<String>, kind: impl Into<String>, value: Piece) -> Self {
    self.attributes.push(AttributeDecl {
      name: name.into(),
      kind: kind.into(),
      value,
    });
    self
  }

  pub fn with_test(mut self, name: impl Into<String>, params: &[&str]) -> Self {
    self.tests.push(TestDecl {
      name: name.into(),
      params: params.iter().map(|p| p.to_string()).collect(),
    });
    self
  }

  pub fn feed(&self) -> impl Iterator<Item = AttributeRef> + '_ {
    self.attributes.iter().map(|attr| AttributeRef {
      module: self.name.clone(),
      name: attr.name.clone(),
      kind: attr.kind.clone(),
      value: attr.value.clone(),
    })
  }

  /// Full hash of the module source text.
  pub fn source_hash(&self) -> String {
    crate::util::hash::hash_bytes(self.source.as_bytes())
  }

  fn validate(&self) -> Result<(), ManifestError> {
    let mut attrs = HashSet::new();
    for attr in &self.attributes {
      check_name(&attr.name)?;
      if !attrs.insert(attr.name.as_str()) {
        return Err(ManifestError::DuplicateAttribute {
          module: self.name.clone(),
          name: attr.name.clone(),
        });
      }
    }

    let mut tests = HashSet::new();
    for test in &self.tests {
      check_name(&test.name)?;
      if !tests.insert(test.name.as_str()) {
        return Err(ManifestError::DuplicateTest {
          module: self.name.clone(),
          name: test.name.clone(),
        });
      }
    }
    Ok(())
  }
}

impl Hashable for Manifest {}

fn check_name(name: &str) -> Result<(), ManifestError> {
  if name.is_empty() || name.contains('/') {
    return Err(ManifestError::InvalidName(name.to_string()));
  }
  Ok(())
}
