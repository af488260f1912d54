mod build;
mod cache;
mod graph;
mod worker;

pub use build::{BuildOptions, cmd_build};
pub use cache::{CacheCommand, cmd_cache};
pub use graph::cmd_graph;
pub use worker::cmd_worker;
