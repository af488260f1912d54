mod cmd;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{BuildOptions, CacheCommand};
use output::OutputFormat;

/// kiln - incremental, content-addressed resource compiler
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build every module of a manifest
  Build {
    /// Path to the manifest file
    #[arg(default_value = "kiln.json")]
    manifest: PathBuf,

    /// Maximum number of jobs running at once (default: number of CPUs)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Passes before unresolved targets are reported incomplete
    #[arg(long, default_value_t = kiln_lib::consts::DEFAULT_MAX_PASSES)]
    max_passes: usize,

    /// Run every job in a separate worker process
    #[arg(long)]
    isolate: bool,

    /// Kill isolated jobs running longer than this (e.g., "30s", "2m")
    #[arg(long, value_parser = humantime::parse_duration, requires = "isolate")]
    timeout: Option<Duration>,

    /// Do not read or write the resource cache
    #[arg(long)]
    no_cache: bool,

    /// Resource cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Content store directory shared with isolated workers
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Print the system assembled from the built resources
    #[arg(long)]
    show_system: bool,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Show the target graph of a manifest
  Graph {
    /// Path to the manifest file
    #[arg(default_value = "kiln.json")]
    manifest: PathBuf,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Inspect or clear the resource cache
  Cache {
    #[command(subcommand)]
    command: CacheCommand,
  },

  /// Run one stored job and print its result (used by isolated builds)
  #[command(hide = true)]
  Worker {
    /// Content store holding the job descriptor
    #[arg(long)]
    store: PathBuf,

    /// Reference of the job descriptor
    reference: String,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "warn" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  match cli.command {
    Commands::Build {
      manifest,
      jobs,
      max_passes,
      isolate,
      timeout,
      no_cache,
      cache_dir,
      store_dir,
      show_system,
      output,
    } => {
      let options = BuildOptions {
        jobs,
        max_passes,
        isolate,
        timeout,
        no_cache,
        cache_dir,
        store_dir,
        show_system,
        output,
      };
      if !cmd::cmd_build(&manifest, &options)? {
        std::process::exit(1);
      }
    }
    Commands::Graph { manifest, output } => cmd::cmd_graph(&manifest, output)?,
    Commands::Cache { command } => cmd::cmd_cache(command)?,
    Commands::Worker { store, reference } => cmd::cmd_worker(&store, &reference)?,
  }

  Ok(())
}
