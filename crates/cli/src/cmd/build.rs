//! Implementation of the `kiln build` command.
//!
//! Loads a manifest, builds its target graph pass by pass and applies the
//! built resources to a fresh system.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use kiln_lib::cache::{FileCache, ResourceCache};
use kiln_lib::execute::{BuildContext, BuildReport, ExecuteConfig, build, collect_resources};
use kiln_lib::job::{JobStatus, WorkerConfig};
use kiln_lib::manifest::Manifest;
use kiln_lib::platform::paths;
use kiln_lib::resource::apply::apply_resources;
use kiln_lib::system::System;
use kiln_lib::target::graph::TargetSet;

use crate::output::{Mark, OutputFormat, detail_lines, format_elapsed, print_json, print_stat, status_line};

#[derive(Debug, Clone)]
pub struct BuildOptions {
  pub jobs: Option<usize>,
  pub max_passes: usize,
  pub isolate: bool,
  pub timeout: Option<Duration>,
  pub no_cache: bool,
  pub cache_dir: Option<PathBuf>,
  pub store_dir: Option<PathBuf>,
  pub show_system: bool,
  pub output: OutputFormat,
}

#[derive(Serialize)]
struct BuildSummary<'a> {
  outcome: String,
  report: &'a BuildReport,
  resources: usize,
  #[serde(skip_serializing_if = "Option::is_none")]
  system: Option<&'a System>,
}

/// Execute the build command. Returns whether every target was built.
pub fn cmd_build(manifest_path: &Path, options: &BuildOptions) -> Result<bool> {
  let start = Instant::now();

  let manifest =
    Manifest::load(manifest_path).with_context(|| format!("Failed to load manifest: {}", manifest_path.display()))?;
  let mut targets = TargetSet::from_manifest(manifest).context("Failed to build target graph")?;

  let mut config = ExecuteConfig {
    max_passes: options.max_passes,
    ..Default::default()
  };
  if let Some(jobs) = options.jobs {
    config.parallelism = jobs;
  }
  if options.isolate {
    let store_dir = options.store_dir.clone().unwrap_or_else(paths::store_dir);
    std::fs::create_dir_all(&store_dir)
      .with_context(|| format!("Failed to create store directory: {}", store_dir.display()))?;
    config.worker = Some(WorkerConfig {
      program: std::env::current_exe().context("Failed to locate the kiln executable")?,
      store_dir: dunce::canonicalize(&store_dir).unwrap_or(store_dir),
      timeout: options.timeout,
    });
  }

  let cache: Option<Arc<dyn ResourceCache>> = if options.no_cache {
    None
  } else {
    let dir = options.cache_dir.clone().unwrap_or_else(paths::results_dir);
    info!(dir = %dir.display(), "using resource cache");
    Some(Arc::new(FileCache::new(dir)))
  };

  let ctx = BuildContext::from_config(&config, cache);
  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let report = rt
    .block_on(build(&mut targets, &ctx, &config))
    .context("Build failed")?;

  let resources = collect_resources(&targets).context("Failed to collect built resources")?;
  // Resources of a partial build may reference config controls that were never built.
  let system = if report.is_success() {
    let mut system = System::new();
    apply_resources(&mut system, &resources).context("Failed to apply built resources")?;
    Some(system)
  } else {
    None
  };
  let shown_system = system.as_ref().filter(|_| options.show_system);

  if options.output.is_json() {
    print_json(&BuildSummary {
      outcome: report.outcome().to_string(),
      report: &report,
      resources: resources.len(),
      system: shown_system,
    })?;
    return Ok(report.is_success());
  }

  println!();
  for failed in &report.failed {
    status_line(
      JobStatus::Failed,
      &format!("{}: {}", failed.name, failed.error.as_deref().unwrap_or("job failed")),
    );
    if let Some(traceback) = &failed.traceback {
      detail_lines(JobStatus::Failed, traceback);
    }
  }
  for blocked in &report.blocked {
    status_line(Mark::Pending, &blocked.to_string());
  }
  for incomplete in &report.incomplete {
    let missing = if incomplete.missing.is_empty() {
      String::new()
    } else {
      format!(" (missing {})", incomplete.missing.join(", "))
    };
    status_line(
      JobStatus::Incomplete,
      &format!("{}: {}{}", incomplete.name, incomplete.reason, missing),
    );
  }

  if report.is_success() {
    status_line(report.outcome(), "Build complete!");
  } else {
    status_line(report.outcome(), &format!("Build {}", report.outcome()));
  }
  print_stat("Targets built", report.built.len());
  print_stat("Tests resolved", report.tests.len());
  print_stat("Cache hits", report.cache_hits.len());
  print_stat("Resources", resources.len());
  print_stat("Passes", report.passes);
  print_stat("Duration", format_elapsed(start.elapsed()));

  if let Some(system) = shown_system {
    println!();
    print_json(system)?;
  }

  Ok(report.is_success())
}
