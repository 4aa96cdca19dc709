//! The executors of a site invocation.

mod build;
mod deploy;
mod package;
mod serve;

use std::sync::Arc;

pub use build::BuildExecutor;
pub use deploy::DeployExecutor;
pub use package::PackageExecutor;
pub use serve::ServeExecutor;

use super::{ExecutionRegistry, Executor};
use crate::deploy::DeployTransport;
use crate::steps::StepTable;

/// Executors in declaration order: build, deploy, package, serve.
pub fn standard_executors(
  table: Arc<StepTable>,
  registry: Arc<ExecutionRegistry>,
  transport: Arc<dyn DeployTransport>,
) -> Vec<Arc<dyn Executor>> {
  vec![
    Arc::new(BuildExecutor::new(table, registry)),
    Arc::new(DeployExecutor::new(transport)),
    Arc::new(PackageExecutor),
    Arc::new(ServeExecutor::default()),
  ]
}
