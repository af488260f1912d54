//! Crate-wide constants.

/// Application name used for directories and environment variables.
pub const APP_NAME: &str = "kiln";

/// Length of the truncated hex digest used for object hashes.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Default upper bound on build passes before incomplete targets are escalated.
pub const DEFAULT_MAX_PASSES: usize = 16;

/// Environment variable overriding the cache directory.
pub const CACHE_DIR_ENV: &str = "KILN_CACHE_DIR";

/// Environment variable overriding the content store directory.
pub const STORE_DIR_ENV: &str = "KILN_STORE";
