//! Declared module manifest.
//!
//! The manifest is the discovery feed of the build: it lists every module, the
//! attributes each module exports (with their kind and constructor value) and the
//! tests it declares. Nothing is discovered by introspection; whatever produces
//! the manifest owns that concern.

mod types;

pub use types::*;
