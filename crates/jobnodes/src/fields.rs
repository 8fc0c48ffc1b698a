//! State fields, dedup stages and node names shared by the pipeline.

use crate::model::{
    DocumentHandle, Listing, ListingFeedback, ListingSummary, ResumeFields, SearchCriteria,
};
use jobcore::{Accumulator, Field, Scalar};

// Seeded by the caller
pub const QUERY_TEXT: Field<Scalar<String>> = Field::new("query_text");
pub const DOCUMENT: Field<Scalar<DocumentHandle>> = Field::new("document");

pub const CRITERIA: Field<Scalar<SearchCriteria>> = Field::new("criteria");
pub const LISTINGS: Field<Accumulator<Listing>> = Field::new("listings");
pub const RESUME_TEXT: Field<Scalar<String>> = Field::new("resume_text");
pub const RESUME_FIELDS: Field<Scalar<ResumeFields>> = Field::new("resume_fields");
pub const SUMMARIES: Field<Accumulator<ListingSummary>> = Field::new("summaries");
pub const FEEDBACKS: Field<Accumulator<ListingFeedback>> = Field::new("feedbacks");

/// Dedup stage consulted before summarizing a listing.
pub const SUMMARY_STAGE: &str = "summary";
/// Dedup stage consulted before scoring a summary. Independent of
/// [`SUMMARY_STAGE`].
pub const FEEDBACK_STAGE: &str = "feedback";

pub const SEARCH: &str = "search";
pub const EXTRACT_RESUME_TEXT: &str = "extract-resume-text";
pub const EXTRACT_RESUME_FIELDS: &str = "extract-resume-fields";
pub const SUMMARIZE_LISTINGS: &str = "summarize-listings";
pub const SCORE_AND_FEEDBACK: &str = "score-and-feedback";
