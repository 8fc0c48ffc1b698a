//! Job-matching pipeline nodes
//!
//! The domain model, the adapter boundary, the five nodes of the pipeline,
//! concrete adapters and result stores, and the [`JobSearchPipeline`] that
//! wires them into a graph.

mod adapter;
mod apify;
pub mod config;
mod document;
mod feedback;
pub mod fields;
mod llm;
pub mod model;
mod pipeline;
mod resume;
mod search;
mod store;
mod summarize;

pub use adapter::{
    Adapters, DocumentTextExtraction, ListingRetrieval, ListingSummarization, MatchFeedback,
    MatchRequest, QueryStructuring, ResultPersistence, ResumeFieldExtraction, RunArtifacts,
};
pub use apify::ApifyRetrieval;
pub use config::{ApifyConfig, LlmConfig, PipelineConfig};
pub use document::{PdfExtractor, PlainTextExtractor, ResumeDocumentExtractor};
pub use feedback::FeedbackNode;
pub use llm::{ChatClient, LlmAgent};
pub use pipeline::{
    build_graph, JobSearchPipeline, PipelineFailure, PipelineOutput, PipelineRequest,
};
pub use resume::{ResumeFieldsNode, ResumeTextNode};
pub use search::SearchNode;
pub use store::{MemoryStore, SearchRecord, SqliteStore, StoredListing};
pub use summarize::SummarizeNode;
