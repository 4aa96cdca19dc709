//! sitebuild-lib: build orchestration for a static site.
//!
//! This crate wires the pieces of a site build together:
//! - `Context`: the resolved, immutable build configuration for one invocation
//! - `Step`: a named unit of work that turns source files into output files
//! - `Executor`: a high-level operation (build, package, deploy, serve) with dependencies
//! - `Execution`: orders the applicable executors and runs them one after another
//! - `WatchCoordinator`: re-runs steps when their sources change, one rebuild per step at a time
//!
//! Rendering, CSS processing, the dev HTTP server and the SSH transport are thin
//! wrappers over third-party crates and the system OpenSSH client.

pub mod authorship;
pub mod consts;
pub mod context;
pub mod deploy;
pub mod execute;
pub mod package;
pub mod serve;
pub mod steps;
pub mod util;
pub mod watch;
