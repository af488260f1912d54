//! Content-addressed object store.
//!
//! Values are stored as pieces (their JSON encoding) under a reference derived
//! from their content. Storing the same piece twice yields the same reference and
//! is a no-op. Job descriptors travel between the build loop and the job driver
//! (possibly in another process) as references into a store.
//!
//! # Storage Layout (`FileStore`)
//!
//! ```text
//! <store>/objects/<hash>.json
//! ```

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::util::fs::write_atomic;
use crate::util::hash::{Hashable, ObjectHash};

/// Serialized, content-hashable form of a model value.
pub type Piece = serde_json::Value;

/// Conversion between a model value and its piece.
///
/// Implementors must satisfy `from_piece(&x.piece()?)? == x`.
pub trait PieceCodec: Serialize + DeserializeOwned {
  fn piece(&self) -> Result<Piece, serde_json::Error> {
    serde_json::to_value(self)
  }

  fn from_piece(piece: &Piece) -> Result<Self, serde_json::Error> {
    serde_json::from_value(piece.clone())
  }
}

/// Reference to a piece held in a content store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectRef(pub ObjectHash);

impl ObjectRef {
  /// Compute the reference a piece would be stored under.
  pub fn of(piece: &Piece) -> Result<Self, StoreError> {
    Ok(Self(piece.compute_hash().map_err(StoreError::Encode)?))
  }

  pub fn hash(&self) -> &ObjectHash {
    &self.0
  }
}

impl fmt::Display for ObjectRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

impl std::str::FromStr for ObjectRef {
  type Err = StoreError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_hexdigit()) {
      return Err(StoreError::InvalidRef(s.to_string()));
    }
    Ok(Self(ObjectHash(s.to_ascii_lowercase())))
  }
}

/// Errors that can occur when storing or resolving pieces.
#[derive(Debug, Error)]
pub enum StoreError {
  /// No piece is stored under the reference.
  #[error("object not found: {0}")]
  NotFound(ObjectRef),

  /// The reference is not a hex digest.
  #[error("invalid object reference: {0:?}")]
  InvalidRef(String),

  /// Failed to encode a piece.
  #[error("failed to encode object: {0}")]
  Encode(#[source] serde_json::Error),

  /// A stored object could not be decoded.
  #[error("failed to decode object {reference}: {source}")]
  Decode {
    reference: ObjectRef,
    #[source]
    source: serde_json::Error,
  },

  /// I/O failure in a file-backed store.
  #[error("store io error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// A content-addressed store of pieces.
pub trait ContentStore: Send + Sync {
  /// Store a piece and return its content-derived reference.
  fn put(&self, piece: &Piece) -> Result<ObjectRef, StoreError>;

  /// Resolve a reference back to its piece.
  fn get(&self, reference: &ObjectRef) -> Result<Piece, StoreError>;
}

/// In-memory content store.
#[derive(Debug, Default)]
pub struct MemoryStore {
  objects: RwLock<HashMap<ObjectRef, Piece>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.objects.read().map(|objects| objects.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl ContentStore for MemoryStore {
  fn put(&self, piece: &Piece) -> Result<ObjectRef, StoreError> {
    let reference = ObjectRef::of(piece)?;
    let mut objects = self.objects.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    objects.entry(reference.clone()).or_insert_with(|| piece.clone());
    Ok(reference)
  }

  fn get(&self, reference: &ObjectRef) -> Result<Piece, StoreError> {
    let objects = self.objects.read().unwrap_or_else(|poisoned| poisoned.into_inner());
    objects
      .get(reference)
      .cloned()
      .ok_or_else(|| StoreError::NotFound(reference.clone()))
  }
}

/// File-backed content store shared with out-of-process workers.
#[derive(Debug, Clone)]
pub struct FileStore {
  root: PathBuf,
}

impl FileStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn object_path(&self, reference: &ObjectRef) -> PathBuf {
    self.root.join("objects").join(format!("{}.json", reference.hash().0))
  }
}

impl ContentStore for FileStore {
  fn put(&self, piece: &Piece) -> Result<ObjectRef, StoreError> {
    let reference = ObjectRef::of(piece)?;
    let path = self.object_path(&reference);

    if path.exists() {
      debug!(reference = %reference, "object already stored");
      return Ok(reference);
    }

    let content = serde_json::to_vec(piece).map_err(StoreError::Encode)?;
    write_atomic(&path, &content).map_err(|source| StoreError::Io {
      path: path.clone(),
      source,
    })?;
    debug!(reference = %reference, path = %path.display(), "stored object");
    Ok(reference)
  }

  fn get(&self, reference: &ObjectRef) -> Result<Piece, StoreError> {
    let path = self.object_path(reference);
    let content = match std::fs::read(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(StoreError::NotFound(reference.clone())),
      Err(source) => return Err(StoreError::Io { path, source }),
    };
    serde_json::from_slice(&content).map_err(|source| StoreError::Decode {
      reference: reference.clone(),
      source,
    })
  }
}
