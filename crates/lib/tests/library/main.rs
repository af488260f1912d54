//! Library integration tests.

mod build_tests;
mod common;
mod graph_tests;
mod resource_tests;
