//! CLI integration tests.

mod build_tests;
mod cache_tests;
mod common;
mod graph_tests;
