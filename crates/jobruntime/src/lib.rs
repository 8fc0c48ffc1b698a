//! Graph execution runtime
//!
//! Builds validated task graphs and runs them: every READY node is spawned
//! at once, results are merged into the run's state as nodes finish, and
//! the first node error stops further launches.

mod executor;
mod graph;
mod runtime;

pub use executor::{ExecutionResult, NodeStatus, RunStatus, WorkflowExecutor};
pub use graph::{GraphBuilder, JobGraph, END, START};
pub use runtime::{JobRuntime, RuntimeConfig};
