//! Shared utilities.
//!
//! Common utilities used across the crate: content hashing and atomic file writes.

pub mod fs;
pub mod hash;
