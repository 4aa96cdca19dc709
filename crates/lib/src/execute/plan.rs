//! Executor dependency resolution.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;

use super::{ExecuteError, Executor, ExecutorKind};
use crate::context::Context;

/// Check that executor kinds are unique, every requirement is present and the
/// requirements are acyclic.
pub(super) fn validate(executors: &[Arc<dyn Executor>]) -> Result<(), ExecuteError> {
  let mut graph = DiGraph::<ExecutorKind, ()>::new();
  let mut nodes = HashMap::new();
  for executor in executors {
    let kind = executor.kind();
    if nodes.insert(kind, graph.add_node(kind)).is_some() {
      return Err(ExecuteError::DuplicateExecutor(kind));
    }
  }

  for executor in executors {
    let dependent = nodes[&executor.kind()];
    for required in executor.requires() {
      let dependency = nodes.get(required).ok_or(ExecuteError::UnknownExecutor {
        executor: executor.kind(),
        required: *required,
      })?;
      graph.add_edge(*dependency, dependent, ());
    }
  }

  toposort(&graph, None).map_err(|_| ExecuteError::CycleDetected)?;
  Ok(())
}

/// Order the executors that support `ctx`.
///
/// Executors are visited in declaration order. Before a supported executor is
/// scheduled, each of its direct requirements not yet scheduled is scheduled.
/// Requirements of requirements are not followed. Nothing is scheduled twice.
pub fn resolve_order(executors: &[Arc<dyn Executor>], ctx: &Context) -> Result<Vec<Arc<dyn Executor>>, ExecuteError> {
  let by_kind: HashMap<ExecutorKind, &Arc<dyn Executor>> = executors.iter().map(|e| (e.kind(), e)).collect();

  let mut scheduled = Vec::new();
  let mut seen = HashSet::new();
  for executor in executors {
    if seen.contains(&executor.kind()) || !executor.supports(ctx) {
      continue;
    }

    for required in executor.requires() {
      if seen.contains(required) {
        continue;
      }
      let dependency = by_kind.get(required).ok_or(ExecuteError::UnknownExecutor {
        executor: executor.kind(),
        required: *required,
      })?;
      seen.insert(*required);
      scheduled.push(Arc::clone(dependency));
    }

    seen.insert(executor.kind());
    scheduled.push(Arc::clone(executor));
  }
  Ok(scheduled)
}
