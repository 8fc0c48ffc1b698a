use crate::adapter::{MatchFeedback, MatchRequest};
use crate::fields::{FEEDBACKS, FEEDBACK_STAGE, RESUME_FIELDS, SCORE_AND_FEEDBACK, SUMMARIES};
use crate::model::ListingFeedback;
use async_trait::async_trait;
use jobcore::{FieldSpec, Node, NodeContext, NodeError, NodeFailure, NodeResult};
use std::sync::Arc;

/// Join node: scores each new summary against the candidate's resume.
pub struct FeedbackNode {
    matcher: Arc<dyn MatchFeedback>,
}

impl FeedbackNode {
    pub fn new(matcher: Arc<dyn MatchFeedback>) -> Self {
        Self { matcher }
    }
}

#[async_trait]
impl Node for FeedbackNode {
    fn name(&self) -> &str {
        SCORE_AND_FEEDBACK
    }

    fn reads(&self) -> Vec<FieldSpec> {
        vec![SUMMARIES.spec(), RESUME_FIELDS.spec()]
    }

    fn writes(&self) -> Vec<FieldSpec> {
        vec![FEEDBACKS.spec()]
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeFailure> {
        let resume = ctx.state.require(RESUME_FIELDS)?;
        let summaries = ctx.state.entries(SUMMARIES)?;
        let total = summaries.len();
        let mut feedbacks = Vec::new();

        for (done, summary) in summaries.iter().enumerate() {
            if ctx.dedup.should_process(FEEDBACK_STAGE, &summary.id) {
                let request = MatchRequest {
                    candidate_skills: &resume.skills,
                    candidate_profile: &resume.profile,
                    target_skills: &summary.required_skills,
                    target_summary: &summary.summary,
                };
                let draft = match self.matcher.feedback(request).await {
                    Ok(draft) => draft,
                    Err(err) => {
                        tracing::error!(id = %summary.id, error = %err, "feedback failed");
                        return Err(partial(err, &feedbacks));
                    }
                };
                if let Err(err) = ctx.dedup.confirm(FEEDBACK_STAGE, &summary.id) {
                    return Err(partial(err, &feedbacks));
                }
                feedbacks.push(ListingFeedback {
                    id: summary.id.clone(),
                    similarity_score: clamp_score(&summary.id, draft.similarity_score),
                    feedback: draft.feedback,
                });
            }
            ctx.events.progress(done + 1, total);
        }

        let mut result = NodeResult::new();
        result.extend(FEEDBACKS, &feedbacks)?;
        Ok(result)
    }
}

fn clamp_score(id: &str, score: i64) -> u8 {
    let clamped = score.clamp(0, 100);
    if clamped != score {
        tracing::warn!(id, score, "similarity score out of range, clamped");
    }
    // in range after the clamp above
    clamped as u8
}

fn partial(error: impl Into<NodeError>, feedbacks: &[ListingFeedback]) -> NodeFailure {
    let mut result = NodeResult::new();
    match result.extend(FEEDBACKS, feedbacks) {
        Ok(()) => NodeFailure::with_partial(error, result),
        Err(_) => NodeFailure::from(error.into()),
    }
}
