//! Resource cache keyed by job descriptor hash.
//!
//! A descriptor embeds the module declaration and every resource it was handed,
//! so its hash identifies the job's output. A hit replays the cached record into
//! the graph exactly like an ok job result.
//!
//! Cache problems never fail a build: a missing, unreadable or corrupt entry is
//! a miss and the target is rebuilt.
//!
//! # Storage Layout (`FileCache`)
//!
//! ```text
//! <cache>/<hash>.json
//! ```

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::job::JobResult;
use crate::requirement::Requirement;
use crate::resource::Resource;
use crate::target::TargetName;
use crate::util::fs::write_atomic;
use crate::util::hash::ObjectHash;

#[derive(Debug, Error)]
pub enum CacheError {
  #[error("failed to encode cache record: {0}")]
  Encode(#[source] serde_json::Error),

  #[error("cache io error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// A cached ok result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheRecord {
  pub target: TargetName,
  pub resources: Vec<Resource>,
  pub used_reqs: Vec<Requirement>,
}

impl CacheRecord {
  pub fn new(target: TargetName, result: &JobResult) -> Self {
    Self {
      target,
      resources: result.output.clone(),
      used_reqs: result.used_reqs.clone(),
    }
  }

  /// The ok result this record replays as.
  pub fn into_result(self) -> JobResult {
    JobResult::ok(self.used_reqs, self.resources)
  }
}

pub trait ResourceCache: Send + Sync {
  fn get(&self, key: &ObjectHash) -> Option<CacheRecord>;

  /// Store a record. Writing a key that is already present is a no-op.
  fn put(&self, key: &ObjectHash, record: &CacheRecord) -> Result<(), CacheError>;
}

#[derive(Debug, Default)]
pub struct MemoryCache {
  records: RwLock<HashMap<ObjectHash, CacheRecord>>,
}

impl MemoryCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.records.read().map(|r| r.len()).unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl ResourceCache for MemoryCache {
  fn get(&self, key: &ObjectHash) -> Option<CacheRecord> {
    let records = self.records.read().unwrap_or_else(|poisoned| poisoned.into_inner());
    records.get(key).cloned()
  }

  fn put(&self, key: &ObjectHash, record: &CacheRecord) -> Result<(), CacheError> {
    let mut records = self.records.write().unwrap_or_else(|poisoned| poisoned.into_inner());
    records.entry(key.clone()).or_insert_with(|| record.clone());
    Ok(())
  }
}

/// Summary of a file cache's contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
  pub entries: usize,
  pub bytes: u64,
}

/// On-disk cache, one JSON file per key.
#[derive(Debug, Clone)]
pub struct FileCache {
  dir: PathBuf,
}

impl FileCache {
  pub fn new(dir: impl Into<PathBuf>) -> Self {
    Self { dir: dir.into() }
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  fn entry_path(&self, key: &ObjectHash) -> PathBuf {
    self.dir.join(format!("{}.json", key.0))
  }

  fn entries(&self) -> impl Iterator<Item = walkdir::DirEntry> {
    WalkDir::new(&self.dir)
      .min_depth(1)
      .max_depth(1)
      .into_iter()
      .filter_map(Result::ok)
      .filter(|e| e.file_type().is_file() && e.path().extension().is_some_and(|ext| ext == "json"))
  }

  pub fn stats(&self) -> CacheStats {
    self.entries().fold(CacheStats::default(), |mut stats, entry| {
      stats.entries += 1;
      stats.bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
      stats
    })
  }

  /// Remove every entry. Returns how many were removed.
  pub fn clear(&self) -> Result<usize, CacheError> {
    let mut removed = 0;
    for entry in self.entries() {
      std::fs::remove_file(entry.path()).map_err(|source| CacheError::Io {
        path: entry.path().to_path_buf(),
        source,
      })?;
      removed += 1;
    }
    debug!(dir = %self.dir.display(), removed, "cleared cache");
    Ok(removed)
  }
}

impl ResourceCache for FileCache {
  fn get(&self, key: &ObjectHash) -> Option<CacheRecord> {
    let path = self.entry_path(key);
    let content = match std::fs::read(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
      Err(e) => {
        warn!(path = %path.display(), error = %e, "unreadable cache entry, treating as miss");
        return None;
      }
    };

    match serde_json::from_slice(&content) {
      Ok(record) => Some(record),
      Err(e) => {
        warn!(path = %path.display(), error = %e, "corrupt cache entry, treating as miss");
        None
      }
    }
  }

  fn put(&self, key: &ObjectHash, record: &CacheRecord) -> Result<(), CacheError> {
    let path = self.entry_path(key);
    if path.exists() {
      return Ok(());
    }
    let content = serde_json::to_vec_pretty(record).map_err(CacheError::Encode)?;
    write_atomic(&path, &content).map_err(|source| CacheError::Io { path, source })?;
    Ok(())
  }
}
