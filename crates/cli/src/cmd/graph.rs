//! Implementation of the `kiln graph` command.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};
use serde::Serialize;

use kiln_lib::manifest::Manifest;
use kiln_lib::target::graph::TargetSet;
use kiln_lib::target::{TargetName, TargetState};

use crate::output::{Mark, OutputFormat, print_json, state_label};

#[derive(Serialize)]
struct GraphEntry {
  name: TargetName,
  state: TargetState,
  deps: Vec<TargetName>,
  requirements: Vec<String>,
}

/// Print every target in build order with its dependencies and requirements.
pub fn cmd_graph(manifest_path: &Path, output: OutputFormat) -> Result<()> {
  let manifest =
    Manifest::load(manifest_path).with_context(|| format!("Failed to load manifest: {}", manifest_path.display()))?;
  let targets = TargetSet::from_manifest(manifest).context("Failed to build target graph")?;

  let mut entries = Vec::new();
  for name in targets.build_order()? {
    let target = targets.get(&name)?;
    entries.push(GraphEntry {
      name,
      state: target.state(),
      deps: target.deps().iter().cloned().collect(),
      requirements: target.import_requirements().iter().map(|r| r.key()).collect(),
    });
  }

  if output.is_json() {
    return print_json(&entries);
  }

  for entry in &entries {
    println!("{} [{}]", entry.name, state_label(entry.state));
    for dep in &entry.deps {
      println!("  → {dep}");
    }
    for requirement in &entry.requirements {
      println!(
        "  {} {}",
        Mark::Note.symbol(),
        requirement.if_supports_color(Stream::Stdout, |s| s.dimmed())
      );
    }
  }

  Ok(())
}
