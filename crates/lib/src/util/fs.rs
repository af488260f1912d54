//! Atomic file writes shared by the content store and the resource cache.

use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Write `content` to `path` atomically.
///
/// The data goes to a temporary file in the same directory which is then
/// renamed over the destination, so readers never observe a partial file.
pub fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
  let dir = path
    .parent()
    .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent directory"))?;
  std::fs::create_dir_all(dir)?;

  let mut temp = NamedTempFile::new_in(dir)?;
  temp.write_all(content)?;
  temp.flush()?;
  temp.persist(path).map_err(|e| e.error)?;
  Ok(())
}
