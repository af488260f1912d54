//! Implementation of the hidden `kiln worker` command.
//!
//! Runs one job descriptor from a file store and prints its result as JSON on
//! stdout. Job failures are part of the result, so the process exits zero
//! whenever a result was printed.

use std::path::Path;

use anyhow::{Context, Result};

use kiln_lib::job::run_worker;
use kiln_lib::store::ObjectRef;

use crate::output::print_json;

pub fn cmd_worker(store: &Path, reference: &str) -> Result<()> {
  let reference: ObjectRef = reference.parse().context("Invalid job reference")?;
  let result = run_worker(store, &reference);
  print_json(&result)
}
