//! kiln-lib: Core types and logic for kiln
//!
//! This crate provides the incremental resource compiler behind the `kiln` CLI:
//! - `Manifest`: the declared modules, their attributes and tests
//! - `Resource`: content-addressed build outputs and their `System` application
//! - `ConstructorRegistry`: turns attribute directives into resources
//! - `TargetSet`: the target graph with readiness and invalidation
//! - `JobDriver`: runs import and test jobs in-process or in worker subprocesses
//! - `ResourceCache`: replays results of previously built job descriptors

pub mod cache;
pub mod construct;
pub mod consts;
pub mod execute;
pub mod job;
pub mod manifest;
pub mod platform;
pub mod requirement;
pub mod resource;
pub mod store;
pub mod system;
pub mod target;
pub mod util;
