use crate::adapter::ListingSummarization;
use crate::fields::{LISTINGS, SUMMARIES, SUMMARIZE_LISTINGS, SUMMARY_STAGE};
use crate::model::ListingSummary;
use async_trait::async_trait;
use jobcore::{FieldSpec, Node, NodeContext, NodeError, NodeFailure, NodeResult};
use std::sync::Arc;

/// Summarizes every listing not yet seen in the `summary` stage.
///
/// Listings are visited in id order. If the adapter fails, the summaries
/// produced so far travel with the failure.
pub struct SummarizeNode {
    summarizer: Arc<dyn ListingSummarization>,
}

impl SummarizeNode {
    pub fn new(summarizer: Arc<dyn ListingSummarization>) -> Self {
        Self { summarizer }
    }
}

#[async_trait]
impl Node for SummarizeNode {
    fn name(&self) -> &str {
        SUMMARIZE_LISTINGS
    }

    fn reads(&self) -> Vec<FieldSpec> {
        vec![LISTINGS.spec()]
    }

    fn writes(&self) -> Vec<FieldSpec> {
        vec![SUMMARIES.spec()]
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeFailure> {
        let listings = ctx.state.entries(LISTINGS)?;
        let total = listings.len();
        let mut summaries = Vec::new();

        for (done, listing) in listings.iter().enumerate() {
            if ctx.dedup.should_process(SUMMARY_STAGE, &listing.id) {
                let draft = match self.summarizer.summarize(&listing.description).await {
                    Ok(draft) => draft,
                    Err(err) => {
                        tracing::error!(id = %listing.id, error = %err, "summarization failed");
                        return Err(partial(err, &summaries));
                    }
                };
                if let Err(err) = ctx.dedup.confirm(SUMMARY_STAGE, &listing.id) {
                    return Err(partial(err, &summaries));
                }
                summaries.push(ListingSummary {
                    id: listing.id.clone(),
                    summary: draft.summary,
                    required_skills: draft.required_skills,
                });
            }
            ctx.events.progress(done + 1, total);
        }

        tracing::info!(
            summarized = summaries.len(),
            skipped = total - summaries.len(),
            "listings summarized"
        );
        let mut result = NodeResult::new();
        result.extend(SUMMARIES, &summaries)?;
        Ok(result)
    }
}

fn partial(error: impl Into<NodeError>, summaries: &[ListingSummary]) -> NodeFailure {
    let mut result = NodeResult::new();
    match result.extend(SUMMARIES, summaries) {
        Ok(()) => NodeFailure::with_partial(error, result),
        Err(_) => NodeFailure::from(error.into()),
    }
}
