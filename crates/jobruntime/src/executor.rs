use crate::graph::JobGraph;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use jobcore::{
    DedupSnapshot, DedupTracker, EventBus, ExecutionEvent, GraphError, NodeContext, NodeError,
    NodeFailure, NodeResult, RunId, WorkflowState,
};
use petgraph::graph::NodeIndex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

/// Lifecycle of a single node within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Pending,
    Ready,
    Running,
    Done,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Init,
    Running,
    Completed,
    Failed,
}

/// Final status of a run
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Completed,
    Failed { node: String, error: NodeError },
}

/// Outcome of one run: status plus everything merged up to the end
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub run_id: RunId,
    pub status: RunStatus,
    pub state: WorkflowState,
    pub dedup: DedupSnapshot,
    pub nodes: BTreeMap<String, NodeStatus>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn failed_node(&self) -> Option<&str> {
        match &self.status {
            RunStatus::Failed { node, .. } => Some(node),
            RunStatus::Completed => None,
        }
    }
}

/// Runs a [`JobGraph`] with every ready node in flight at once
pub struct WorkflowExecutor {
    max_parallel: usize,
}

impl WorkflowExecutor {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            max_parallel: max_parallel.max(1),
        }
    }

    /// Execute one run of `graph`.
    ///
    /// Always returns a result: a failed run carries the failing node and the
    /// state merged before the remaining in-flight nodes drained.
    pub async fn execute(
        &self,
        graph: &JobGraph,
        event_bus: &EventBus,
        initial: WorkflowState,
        dedup: Arc<DedupTracker>,
    ) -> ExecutionResult {
        let run_id = RunId::new_v4();
        let started = Instant::now();
        let mut phase = RunPhase::Init;

        event_bus.emit(ExecutionEvent::RunStarted {
            run_id,
            nodes: graph.len(),
            timestamp: Utc::now(),
        });

        let mut state = initial;
        let mut statuses: HashMap<NodeIndex, NodeStatus> = graph
            .node_indices()
            .map(|idx| (idx, NodeStatus::Pending))
            .collect();
        let mut ready = VecDeque::new();
        let mut running = FuturesUnordered::new();
        let mut failure: Option<(String, NodeError)> = None;

        statuses.insert(graph.start, NodeStatus::Done);
        Self::promote(graph, graph.start, &mut statuses, &mut ready);
        phase = Self::transition(run_id, phase, RunPhase::Running);

        loop {
            while failure.is_none() && running.len() < self.max_parallel {
                let Some(idx) = ready.pop_front() else {
                    break;
                };
                let node = &graph.graph[idx];
                let Some(task) = node.task.clone() else {
                    // END has no work; reaching it finishes the graph
                    statuses.insert(idx, NodeStatus::Done);
                    continue;
                };

                statuses.insert(idx, NodeStatus::Running);
                let ctx = NodeContext::new(
                    node.name.clone(),
                    state.read(&task.reads()),
                    dedup.clone(),
                    event_bus.create_emitter(run_id, &node.name),
                );

                event_bus.emit(ExecutionEvent::NodeStarted {
                    run_id,
                    node: node.name.clone(),
                    timestamp: Utc::now(),
                });
                tracing::info!(%run_id, node = %node.name, "node started");

                let handle = tokio::spawn(async move {
                    let start = Instant::now();
                    let result = task.execute(ctx).await;
                    (result, start.elapsed().as_millis() as u64)
                });
                running.push(async move {
                    match handle.await {
                        Ok((result, duration_ms)) => (idx, result, duration_ms),
                        Err(e) => (
                            idx,
                            Err(NodeFailure::from(NodeError::Aborted(e.to_string()))),
                            0,
                        ),
                    }
                });
            }

            let Some((idx, outcome, duration_ms)) = running.next().await else {
                break;
            };
            let name = graph.graph[idx].name.clone();

            let outcome = match outcome {
                Ok(result) => Self::merge(graph, idx, &mut state, result)
                    .map(|fields| (fields, duration_ms))
                    .map_err(NodeFailure::from),
                Err(err) => Err(err),
            };

            match outcome {
                Ok((fields, duration_ms)) => {
                    tracing::info!(%run_id, node = %name, duration_ms, "node completed");
                    event_bus.emit(ExecutionEvent::NodeCompleted {
                        run_id,
                        node: name,
                        fields,
                        duration_ms,
                        timestamp: Utc::now(),
                    });
                    statuses.insert(idx, NodeStatus::Done);
                    Self::promote(graph, idx, &mut statuses, &mut ready);
                }
                Err(NodeFailure { error, partial }) => {
                    tracing::error!(%run_id, node = %name, error = %error, "node failed");
                    event_bus.emit(ExecutionEvent::NodeFailed {
                        run_id,
                        node: name.clone(),
                        error: error.to_string(),
                        timestamp: Utc::now(),
                    });
                    statuses.insert(idx, NodeStatus::Error);

                    if let Some(partial) = partial {
                        if let Err(e) = Self::merge(graph, idx, &mut state, partial) {
                            tracing::warn!(node = %name, error = %e, "discarding partial result");
                        }
                    }
                    if failure.is_none() {
                        failure = Some((name, error));
                    }
                }
            }
        }

        let status = match failure {
            Some((node, error)) => {
                Self::transition(run_id, phase, RunPhase::Failed);
                RunStatus::Failed { node, error }
            }
            None => {
                debug_assert_eq!(statuses.get(&graph.end), Some(&NodeStatus::Done));
                Self::transition(run_id, phase, RunPhase::Completed);
                RunStatus::Completed
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        event_bus.emit(ExecutionEvent::RunFinished {
            run_id,
            success: status == RunStatus::Completed,
            duration_ms,
            timestamp: Utc::now(),
        });

        let nodes = statuses
            .into_iter()
            .filter(|(idx, _)| graph.graph[*idx].task.is_some())
            .map(|(idx, status)| (graph.graph[idx].name.clone(), status))
            .collect();

        ExecutionResult {
            run_id,
            status,
            state,
            dedup: dedup.snapshot(),
            nodes,
            duration_ms,
        }
    }

    /// Check a result against the node's write-set, then commit it.
    fn merge(
        graph: &JobGraph,
        idx: NodeIndex,
        state: &mut WorkflowState,
        result: NodeResult,
    ) -> Result<Vec<String>, NodeError> {
        let node = &graph.graph[idx];
        let declared: Vec<&str> = node
            .task
            .as_ref()
            .map(|task| task.writes().iter().map(|spec| spec.name).collect())
            .unwrap_or_default();

        if let Some(field) = result.fields().find(|f| !declared.contains(f)) {
            return Err(GraphError::UndeclaredWrite {
                node: node.name.clone(),
                field: field.to_string(),
            }
            .into());
        }

        let fields = result.fields().map(str::to_string).collect();
        state.apply(result)?;
        Ok(fields)
    }

    /// Mark successors of a finished node READY once all of their
    /// predecessors are DONE. A join point waits for every incoming edge.
    fn promote(
        graph: &JobGraph,
        finished: NodeIndex,
        statuses: &mut HashMap<NodeIndex, NodeStatus>,
        ready: &mut VecDeque<NodeIndex>,
    ) {
        for next in graph.outgoing(finished) {
            if statuses.get(&next) != Some(&NodeStatus::Pending) {
                continue;
            }
            let satisfied = graph
                .incoming(next)
                .all(|dep| statuses.get(&dep) == Some(&NodeStatus::Done));
            if satisfied {
                statuses.insert(next, NodeStatus::Ready);
                ready.push_back(next);
            }
        }
    }

    fn transition(run_id: RunId, from: RunPhase, to: RunPhase) -> RunPhase {
        tracing::debug!(%run_id, ?from, ?to, "run phase");
        to
    }
}
