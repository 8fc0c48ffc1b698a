//! Error taxonomy shared by the graph builder, the scheduler and the nodes.

use thiserror::Error;

/// How a failure affects the run that observed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Aborts the run.
    Fatal,
    /// Logged; the run continues and its results are still returned.
    Recoverable,
}

#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Graph definition error: {0}")]
    Graph(#[from] GraphError),

    #[error("Node '{node}' failed: {source}")]
    Node {
        node: String,
        #[source]
        source: NodeError,
    },

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl FlowError {
    pub fn severity(&self) -> Severity {
        match self {
            FlowError::Persistence(_) => Severity::Recoverable,
            _ => Severity::Fatal,
        }
    }
}

/// Structural errors in a graph or in how a node honours its declared fields.
///
/// Everything here is a programming error. Most variants are raised by the
/// graph builder; the field-contract variants surface at merge time when a
/// node returns something its declaration did not allow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Duplicate node name: {0}")]
    DuplicateNode(String),

    #[error("Node name '{0}' is reserved")]
    ReservedName(String),

    #[error("Edge references unregistered node: {0}")]
    UnknownNode(String),

    #[error("Cyclic dependency detected at node '{0}'")]
    CyclicDependency(String),

    #[error("Node '{0}' is not reachable from START")]
    Unreachable(String),

    #[error("Node '{node}' reads '{field}' but its producer '{producer}' is not an ancestor")]
    UnorderedRead {
        node: String,
        field: String,
        producer: String,
    },

    #[error("Scalar field '{field}' has more than one writer: '{first}' and '{second}'")]
    MultipleScalarWriters {
        field: String,
        first: String,
        second: String,
    },

    #[error("Field '{field}' is declared with conflicting kinds")]
    FieldKindMismatch { field: String },

    #[error("Node '{node}' wrote undeclared field '{field}'")]
    UndeclaredWrite { node: String, field: String },

    #[error("Scalar field '{field}' written twice with conflicting values")]
    ScalarConflict { field: String },

    #[error("Accumulator '{field}' already holds a different entry for id '{id}'")]
    AccumulatorConflict { field: String, id: String },
}

/// Failure of an external capability invoked by a node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Upstream returned status {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Document unreadable: {0}")]
    Unreadable(String),

    #[error("Missing configuration: {0}")]
    Configuration(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid '{field}': {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("Missing state field: {0}")]
    MissingField(String),

    #[error("Invalid value for field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Node task aborted: {0}")]
    Aborted(String),

    #[error("Dedup invariant violated: '{id}' processed twice in stage '{stage}'")]
    DedupInvariant { stage: String, id: String },
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}
