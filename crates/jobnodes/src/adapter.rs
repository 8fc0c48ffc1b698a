//! External capabilities invoked by the pipeline nodes.
//!
//! Each trait is one opaque boundary. Nodes hold them as `Arc<dyn _>` so a
//! run can mix concrete clients with in-process fakes.

use crate::model::{
    DocumentHandle, FeedbackDraft, Listing, ListingFeedback, ListingSummary, ResumeFields,
    SearchCriteria, SummaryDraft,
};
use async_trait::async_trait;
use jobcore::{AdapterError, PersistenceError};
use std::sync::Arc;

/// Free-text query to structured search criteria.
#[async_trait]
pub trait QueryStructuring: Send + Sync {
    async fn structure(&self, query: &str) -> Result<SearchCriteria, AdapterError>;
}

#[async_trait]
pub trait ListingRetrieval: Send + Sync {
    /// Fetch listings matching `criteria`. An empty result is not an error.
    async fn retrieve(&self, criteria: &SearchCriteria) -> Result<Vec<Listing>, AdapterError>;
}

#[async_trait]
pub trait DocumentTextExtraction: Send + Sync {
    /// Text of every page, in order.
    async fn extract_text(&self, document: &DocumentHandle) -> Result<String, AdapterError>;
}

#[async_trait]
pub trait ResumeFieldExtraction: Send + Sync {
    async fn extract_fields(&self, text: &str) -> Result<ResumeFields, AdapterError>;
}

#[async_trait]
pub trait ListingSummarization: Send + Sync {
    async fn summarize(&self, description: &str) -> Result<SummaryDraft, AdapterError>;
}

/// Inputs for comparing a candidate against one summarized listing.
#[derive(Debug, Clone, Copy)]
pub struct MatchRequest<'a> {
    pub candidate_skills: &'a [String],
    pub candidate_profile: &'a str,
    pub target_skills: &'a [String],
    pub target_summary: &'a str,
}

#[async_trait]
pub trait MatchFeedback: Send + Sync {
    async fn feedback(&self, request: MatchRequest<'_>) -> Result<FeedbackDraft, AdapterError>;
}

/// Everything a completed run hands to storage.
#[derive(Debug, Clone, Default)]
pub struct RunArtifacts {
    pub query: String,
    pub document: Option<DocumentHandle>,
    pub listings: Vec<Listing>,
    pub summaries: Vec<ListingSummary>,
    pub feedbacks: Vec<ListingFeedback>,
}

/// Idempotent upsert of run artifacts keyed by listing id.
#[async_trait]
pub trait ResultPersistence: Send + Sync {
    async fn persist(&self, artifacts: &RunArtifacts) -> Result<(), PersistenceError>;
}

/// The capabilities the pipeline nodes are built from.
#[derive(Clone)]
pub struct Adapters {
    pub query: Arc<dyn QueryStructuring>,
    pub retrieval: Arc<dyn ListingRetrieval>,
    pub document: Arc<dyn DocumentTextExtraction>,
    pub resume: Arc<dyn ResumeFieldExtraction>,
    pub summarization: Arc<dyn ListingSummarization>,
    pub matching: Arc<dyn MatchFeedback>,
}
