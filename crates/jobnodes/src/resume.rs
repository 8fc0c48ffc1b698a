use crate::adapter::{DocumentTextExtraction, ResumeFieldExtraction};
use crate::fields::{DOCUMENT, EXTRACT_RESUME_FIELDS, EXTRACT_RESUME_TEXT, RESUME_FIELDS, RESUME_TEXT};
use async_trait::async_trait;
use jobcore::{AdapterError, FieldSpec, Node, NodeContext, NodeFailure, NodeResult};
use std::sync::Arc;

/// Reads the resume document into plain text.
pub struct ResumeTextNode {
    extractor: Arc<dyn DocumentTextExtraction>,
}

impl ResumeTextNode {
    pub fn new(extractor: Arc<dyn DocumentTextExtraction>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl Node for ResumeTextNode {
    fn name(&self) -> &str {
        EXTRACT_RESUME_TEXT
    }

    fn reads(&self) -> Vec<FieldSpec> {
        vec![DOCUMENT.spec()]
    }

    fn writes(&self) -> Vec<FieldSpec> {
        vec![RESUME_TEXT.spec()]
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeFailure> {
        let document = ctx.state.require(DOCUMENT)?;
        let text = self.extractor.extract_text(&document).await?;
        if text.trim().is_empty() {
            return Err(AdapterError::Unreadable(format!(
                "no text in {}",
                document.path.display()
            ))
            .into());
        }
        ctx.events
            .info(format!("extracted {} characters", text.chars().count()));

        let mut result = NodeResult::new();
        result.set(RESUME_TEXT, &text)?;
        Ok(result)
    }
}

/// Turns resume text into structured fields.
pub struct ResumeFieldsNode {
    extractor: Arc<dyn ResumeFieldExtraction>,
}

impl ResumeFieldsNode {
    pub fn new(extractor: Arc<dyn ResumeFieldExtraction>) -> Self {
        Self { extractor }
    }
}

#[async_trait]
impl Node for ResumeFieldsNode {
    fn name(&self) -> &str {
        EXTRACT_RESUME_FIELDS
    }

    fn reads(&self) -> Vec<FieldSpec> {
        vec![RESUME_TEXT.spec()]
    }

    fn writes(&self) -> Vec<FieldSpec> {
        vec![RESUME_FIELDS.spec()]
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeFailure> {
        let text = ctx.state.require(RESUME_TEXT)?;
        let fields = self.extractor.extract_fields(&text).await?.with_sentinels();
        tracing::debug!(skills = fields.skills.len(), "resume fields extracted");

        let mut result = NodeResult::new();
        result.set(RESUME_FIELDS, &fields)?;
        Ok(result)
    }
}
