//! The node contract and the context a node runs with.

use crate::{
    events::EventEmitter, AdapterError, DedupTracker, FieldSpec, NodeError, NodeResult,
    StateSnapshot, ValidationError,
};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Core trait that every pipeline step implements
#[async_trait]
pub trait Node: Send + Sync {
    /// Unique name within a graph (e.g., "search", "summarize-listings")
    fn name(&self) -> &str;

    /// Fields that must be committed before the node may start
    fn reads(&self) -> Vec<FieldSpec>;

    /// Fields the node is allowed to write
    fn writes(&self) -> Vec<FieldSpec>;

    /// Execute the node against a snapshot of its read-set
    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeFailure>;
}

/// Execution context passed to each node
#[derive(Clone)]
pub struct NodeContext {
    /// Name of the node being executed
    pub node: String,

    /// Committed values of the node's read-set
    pub state: StateSnapshot,

    /// Run-wide processed-id sets
    pub dedup: Arc<DedupTracker>,

    /// Event emitter for real-time updates
    pub events: EventEmitter,
}

impl NodeContext {
    pub fn new(
        node: impl Into<String>,
        state: StateSnapshot,
        dedup: Arc<DedupTracker>,
        events: EventEmitter,
    ) -> Self {
        Self {
            node: node.into(),
            state,
            dedup,
            events,
        }
    }
}

/// A node error, optionally with the work completed before it happened.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFailure {
    pub error: NodeError,
    pub partial: Option<NodeResult>,
}

impl NodeFailure {
    pub fn with_partial(error: impl Into<NodeError>, partial: NodeResult) -> Self {
        Self {
            error: error.into(),
            partial: (!partial.is_empty()).then_some(partial),
        }
    }
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for NodeFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<NodeError> for NodeFailure {
    fn from(error: NodeError) -> Self {
        Self {
            error,
            partial: None,
        }
    }
}

impl From<AdapterError> for NodeFailure {
    fn from(error: AdapterError) -> Self {
        NodeError::from(error).into()
    }
}

impl From<ValidationError> for NodeFailure {
    fn from(error: ValidationError) -> Self {
        NodeError::from(error).into()
    }
}
