//! Well-known directories for the resource cache and the content store.
//!
//! Each path can be overridden through an environment variable so tests and
//! CI can isolate their state.

use std::path::PathBuf;

use crate::consts::{APP_NAME, CACHE_DIR_ENV, STORE_DIR_ENV};

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var_os("USERPROFILE")
    .map(PathBuf::from)
    .unwrap_or_else(std::env::temp_dir)
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var_os("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(std::env::temp_dir)
}

/// Returns the directory holding cached job outputs.
///
/// Resolution order: `KILN_CACHE_DIR`, then the platform cache directory.
pub fn cache_dir() -> PathBuf {
  if let Some(path) = std::env::var_os(CACHE_DIR_ENV) {
    return PathBuf::from(path);
  }
  default_cache_dir()
}

#[cfg(windows)]
fn default_cache_dir() -> PathBuf {
  std::env::var_os("LOCALAPPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(home_dir)
    .join(APP_NAME)
    .join("Cache")
}

#[cfg(not(windows))]
fn default_cache_dir() -> PathBuf {
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".cache"));
  cache_home.join(APP_NAME)
}

/// Returns the directory of the file-backed resource cache.
pub fn results_dir() -> PathBuf {
  cache_dir().join("results")
}

/// Returns the directory of the file-backed content store.
///
/// Resolution order: `KILN_STORE`, then `<cache_dir>/store`.
pub fn store_dir() -> PathBuf {
  if let Some(path) = std::env::var_os(STORE_DIR_ENV) {
    return PathBuf::from(path);
  }
  cache_dir().join("store")
}
