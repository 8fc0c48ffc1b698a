use crate::adapter::{ListingRetrieval, QueryStructuring};
use crate::fields::{CRITERIA, LISTINGS, QUERY_TEXT, SEARCH};
use async_trait::async_trait;
use jobcore::{FieldSpec, Node, NodeContext, NodeFailure, NodeResult};
use std::collections::HashSet;
use std::sync::Arc;

/// Structures the query, then retrieves matching listings.
pub struct SearchNode {
    query: Arc<dyn QueryStructuring>,
    retrieval: Arc<dyn ListingRetrieval>,
}

impl SearchNode {
    pub fn new(query: Arc<dyn QueryStructuring>, retrieval: Arc<dyn ListingRetrieval>) -> Self {
        Self { query, retrieval }
    }
}

#[async_trait]
impl Node for SearchNode {
    fn name(&self) -> &str {
        SEARCH
    }

    fn reads(&self) -> Vec<FieldSpec> {
        vec![QUERY_TEXT.spec()]
    }

    fn writes(&self) -> Vec<FieldSpec> {
        vec![CRITERIA.spec(), LISTINGS.spec()]
    }

    async fn execute(&self, ctx: NodeContext) -> Result<NodeResult, NodeFailure> {
        let query = ctx.state.require(QUERY_TEXT)?;
        ctx.events.info(format!("structuring query: {query}"));

        let criteria = self.query.structure(&query).await?.clamped();
        criteria.validate()?;
        tracing::debug!(?criteria, "search criteria");

        let fetched = self.retrieval.retrieve(&criteria).await?;
        let total = fetched.len();

        let mut seen = HashSet::new();
        let listings: Vec<_> = fetched
            .into_iter()
            .filter(|listing| seen.insert(listing.id.clone()))
            .collect();
        if listings.len() < total {
            tracing::debug!(
                dropped = total - listings.len(),
                "duplicate listing ids in retrieval result"
            );
        }
        ctx.events
            .info(format!("retrieved {} listings", listings.len()));

        let mut result = NodeResult::new();
        result.set(CRITERIA, &criteria)?;
        result.extend(LISTINGS, &listings)?;
        Ok(result)
    }
}
