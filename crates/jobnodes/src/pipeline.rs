//! The job-matching pipeline: graph wiring, seeding and result read-back.

use crate::adapter::{Adapters, ResultPersistence, RunArtifacts};
use crate::feedback::FeedbackNode;
use crate::fields::*;
use crate::model::{
    DocumentHandle, Listing, ListingFeedback, ListingSummary, ResumeFields, SearchCriteria,
};
use crate::resume::{ResumeFieldsNode, ResumeTextNode};
use crate::search::SearchNode;
use crate::summarize::SummarizeNode;
use jobcore::{
    DedupSnapshot, DedupTracker, FlowError, GraphError, NodeError, NodeResult, RunId, Severity,
    WorkflowState,
};
use jobruntime::{ExecutionResult, GraphBuilder, JobGraph, JobRuntime, RunStatus, RuntimeConfig};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Wire the five pipeline nodes:
///
/// ```text
/// START ─┬─ search ────────────── summarize-listings ──┬─ score-and-feedback ─ END
///        └─ extract-resume-text ─ extract-resume-fields ┘
/// ```
pub fn build_graph(adapters: &Adapters) -> Result<JobGraph, GraphError> {
    GraphBuilder::new()
        .node(Arc::new(SearchNode::new(
            adapters.query.clone(),
            adapters.retrieval.clone(),
        )))
        .node(Arc::new(ResumeTextNode::new(adapters.document.clone())))
        .node(Arc::new(ResumeFieldsNode::new(adapters.resume.clone())))
        .node(Arc::new(SummarizeNode::new(adapters.summarization.clone())))
        .node(Arc::new(FeedbackNode::new(adapters.matching.clone())))
        .edge(SEARCH, SUMMARIZE_LISTINGS)
        .edge(EXTRACT_RESUME_TEXT, EXTRACT_RESUME_FIELDS)
        .edge(SUMMARIZE_LISTINGS, SCORE_AND_FEEDBACK)
        .edge(EXTRACT_RESUME_FIELDS, SCORE_AND_FEEDBACK)
        .build()
}

#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub query: String,
    pub document: DocumentHandle,
    /// Ids processed by earlier runs, per dedup stage.
    pub seen: DedupSnapshot,
}

impl PipelineRequest {
    pub fn new(query: impl Into<String>, document: DocumentHandle) -> Self {
        Self {
            query: query.into(),
            document,
            seen: DedupSnapshot::new(),
        }
    }

    pub fn with_seen(mut self, seen: DedupSnapshot) -> Self {
        self.seen = seen;
        self
    }
}

/// Everything a completed run produced.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOutput {
    pub run_id: RunId,
    pub criteria: Option<SearchCriteria>,
    pub listings: Vec<Listing>,
    pub summaries: Vec<ListingSummary>,
    pub feedbacks: Vec<ListingFeedback>,
    pub resume_fields: Option<ResumeFields>,
    pub dedup: DedupSnapshot,
    pub duration_ms: u64,
    /// Set when the results could not be stored. The run still completed.
    pub storage_warning: Option<String>,
}

/// A failed run: the failing node and everything merged before the run
/// stopped.
#[derive(Debug, Error)]
#[error("pipeline failed at '{node}': {error}")]
pub struct PipelineFailure {
    pub node: String,
    #[source]
    pub error: FlowError,
    pub state: WorkflowState,
    pub dedup: DedupSnapshot,
}

/// Explicit engine value: one validated graph plus the runtime that runs it.
pub struct JobSearchPipeline {
    graph: JobGraph,
    runtime: JobRuntime,
    persistence: Option<Arc<dyn ResultPersistence>>,
}

impl JobSearchPipeline {
    pub fn new(adapters: Adapters, config: RuntimeConfig) -> Result<Self, GraphError> {
        Ok(Self {
            graph: build_graph(&adapters)?,
            runtime: JobRuntime::with_config(config),
            persistence: None,
        })
    }

    pub fn with_persistence(mut self, store: Arc<dyn ResultPersistence>) -> Self {
        self.persistence = Some(store);
        self
    }

    pub fn graph(&self) -> &JobGraph {
        &self.graph
    }

    pub fn runtime(&self) -> &JobRuntime {
        &self.runtime
    }

    pub async fn run(&self, request: PipelineRequest) -> Result<PipelineOutput, PipelineFailure> {
        let PipelineRequest {
            query,
            document,
            seen,
        } = request;

        let state = seed_state(&query, &document).map_err(|error| PipelineFailure {
            node: jobruntime::START.to_string(),
            error: FlowError::Node {
                node: jobruntime::START.to_string(),
                source: error,
            },
            state: WorkflowState::new(),
            dedup: seen.clone(),
        })?;

        tracing::info!(%query, document = %document.name(), "pipeline run starting");
        let result = self
            .runtime
            .run(&self.graph, state, DedupTracker::seeded(seen))
            .await;

        let ExecutionResult {
            run_id,
            status,
            state,
            dedup,
            duration_ms,
            ..
        } = result;

        if let RunStatus::Failed { node, error } = status {
            tracing::error!(%run_id, %node, %error, "pipeline run failed");
            return Err(PipelineFailure {
                error: FlowError::Node {
                    node: node.clone(),
                    source: error,
                },
                node,
                state,
                dedup,
            });
        }

        let output = match read_output(&state) {
            Ok(output) => output,
            Err(error) => {
                return Err(PipelineFailure {
                    node: jobruntime::END.to_string(),
                    error: FlowError::Node {
                        node: jobruntime::END.to_string(),
                        source: error,
                    },
                    state,
                    dedup,
                })
            }
        };
        let (criteria, listings, summaries, feedbacks, resume_fields) = output;

        let mut storage_warning = None;
        if let Some(store) = &self.persistence {
            let artifacts = RunArtifacts {
                query,
                document: Some(document),
                listings: listings.clone(),
                summaries: summaries.clone(),
                feedbacks: feedbacks.clone(),
            };
            if let Err(e) = store.persist(&artifacts).await {
                let error = FlowError::from(e);
                match error.severity() {
                    Severity::Recoverable => {
                        tracing::warn!(%run_id, %error, "could not store results");
                        storage_warning = Some(error.to_string());
                    }
                    Severity::Fatal => {
                        return Err(PipelineFailure {
                            node: jobruntime::END.to_string(),
                            error,
                            state,
                            dedup,
                        })
                    }
                }
            }
        }

        tracing::info!(
            %run_id,
            listings = listings.len(),
            summaries = summaries.len(),
            feedbacks = feedbacks.len(),
            duration_ms,
            "pipeline run completed"
        );
        Ok(PipelineOutput {
            run_id,
            criteria,
            listings,
            summaries,
            feedbacks,
            resume_fields,
            dedup,
            duration_ms,
            storage_warning,
        })
    }
}

fn seed_state(query: &str, document: &DocumentHandle) -> Result<WorkflowState, NodeError> {
    let mut seed = NodeResult::new();
    seed.set(QUERY_TEXT, &query.to_string())?;
    seed.set(DOCUMENT, document)?;

    let mut state = WorkflowState::new();
    state.apply(seed)?;
    Ok(state)
}

type Output = (
    Option<SearchCriteria>,
    Vec<Listing>,
    Vec<ListingSummary>,
    Vec<ListingFeedback>,
    Option<ResumeFields>,
);

fn read_output(state: &WorkflowState) -> Result<Output, NodeError> {
    Ok((
        state.get(CRITERIA)?,
        state.entries(LISTINGS)?,
        state.entries(SUMMARIES)?,
        state.entries(FEEDBACKS)?,
        state.get(RESUME_FIELDS)?,
    ))
}
