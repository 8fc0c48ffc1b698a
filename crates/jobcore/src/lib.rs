//! Core abstractions for the job-matching pipeline
//!
//! Field-typed workflow state with its merge rules, the per-stage dedup
//! tracker, the node contract and the error taxonomy. The runtime and the
//! concrete nodes build on these.

mod dedup;
mod error;
pub mod events;
mod node;
mod state;

pub use dedup::{DedupSnapshot, DedupTracker};
pub use error::{
    AdapterError, FlowError, GraphError, NodeError, PersistenceError, Severity, ValidationError,
};
pub use events::*;
pub use node::{Node, NodeContext, NodeFailure};
pub use state::{
    Accumulator, Field, FieldKind, FieldSpec, Keyed, Kind, NodeResult, Scalar, StateSnapshot,
    WorkflowState,
};

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
