use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use serde::Serialize;
use tracing::debug;

use kiln_lib::cache::FileCache;
use kiln_lib::platform::paths;

use crate::output::{Mark, OutputFormat, format_size, print_json, print_stat, status_line};

#[derive(Subcommand, Debug)]
pub enum CacheCommand {
  /// Show the number and size of cached results
  Stats {
    /// Resource cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },

  /// Remove every cached result
  Clear {
    /// Resource cache directory
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Output format
    #[arg(short = 'o', long, value_enum, default_value = "text")]
    output: OutputFormat,
  },
}

#[derive(Serialize)]
struct ClearResult {
  removed: usize,
}

pub fn cmd_cache(command: CacheCommand) -> Result<()> {
  match command {
    CacheCommand::Stats { cache_dir, output } => {
      let cache = FileCache::new(cache_dir.unwrap_or_else(paths::results_dir));
      let stats = cache.stats();
      debug!(dir = %cache.dir().display(), entries = stats.entries, "read cache stats");

      if output.is_json() {
        print_json(&stats)?;
      } else if stats.entries == 0 {
        status_line(Mark::Note, "Cache is empty");
      } else {
        print_stat("Entries", stats.entries);
        print_stat("Size", format_size(stats.bytes));
        print_stat("Path", cache.dir().display());
      }
    }
    CacheCommand::Clear { cache_dir, output } => {
      let cache = FileCache::new(cache_dir.unwrap_or_else(paths::results_dir));
      let removed = cache.clear().context("Failed to clear cache")?;

      if output.is_json() {
        print_json(&ClearResult { removed })?;
      } else {
        status_line(Mark::Done, &format!("Removed {removed} cached result(s)"));
      }
    }
  }
  Ok(())
}
