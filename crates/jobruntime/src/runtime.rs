use crate::{ExecutionResult, JobGraph, WorkflowExecutor};
use jobcore::{DedupTracker, EventBus, ExecutionEvent, WorkflowState};
use std::sync::Arc;

/// Engine value that runs graphs. Construct one and pass it where needed;
/// nothing about a run outlives the call to [`run`](Self::run).
pub struct JobRuntime {
    executor: Arc<WorkflowExecutor>,
    event_bus: Arc<EventBus>,
}

impl JobRuntime {
    /// Create a new runtime with default settings
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a new runtime with custom configuration
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self {
            executor: Arc::new(WorkflowExecutor::new(config.max_parallel_nodes)),
            event_bus: Arc::new(EventBus::new(config.event_buffer_size)),
        }
    }

    /// Run `graph` once with a caller-seeded state and dedup tracker.
    pub async fn run(
        &self,
        graph: &JobGraph,
        initial: WorkflowState,
        dedup: DedupTracker,
    ) -> ExecutionResult {
        self.executor
            .execute(graph, &self.event_bus, initial, Arc::new(dedup))
            .await
    }

    /// Subscribe to execution events
    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<ExecutionEvent> {
        self.event_bus.subscribe()
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }
}

impl Default for JobRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the runtime
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Upper bound on nodes running at the same time
    pub max_parallel_nodes: usize,
    pub event_buffer_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_parallel_nodes: 16,
            event_buffer_size: 1000,
        }
    }
}
