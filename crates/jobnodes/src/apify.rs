//! Listing retrieval through an asynchronous Apify actor run.

use crate::adapter::ListingRetrieval;
use crate::config::ApifyConfig;
use crate::model::{Listing, SearchCriteria};
use async_trait::async_trait;
use jobcore::AdapterError;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::{sleep, Instant};

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActorRun {
    id: String,
    status: String,
    default_dataset_id: String,
}

impl ActorRun {
    fn is_terminal(&self) -> bool {
        matches!(
            self.status.as_str(),
            "SUCCEEDED" | "FAILED" | "ABORTED" | "TIMED-OUT"
        )
    }

    fn is_failed(&self) -> bool {
        matches!(self.status.as_str(), "FAILED" | "ABORTED" | "TIMED-OUT")
    }
}

pub struct ApifyRetrieval {
    client: Client,
    config: ApifyConfig,
    actor: Option<String>,
}

impl ApifyRetrieval {
    pub fn new(config: ApifyConfig) -> Self {
        // the API addresses actors as `user~name`
        let actor = config
            .actor
            .as_deref()
            .filter(|a| !a.is_empty())
            .map(|a| a.replace('/', "~"));
        Self {
            client: Client::new(),
            config,
            actor,
        }
    }

    fn token(&self) -> Result<&str, AdapterError> {
        self.config
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AdapterError::Configuration("APIFY_TOKEN".into()))
    }

    fn actor(&self) -> Result<&str, AdapterError> {
        self.actor
            .as_deref()
            .ok_or_else(|| AdapterError::Configuration("APIFY_ACTOR_NAME".into()))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn start(&self, input: &Value) -> Result<ActorRun, AdapterError> {
        let response = self
            .client
            .post(self.url(&format!("acts/{}/runs", self.actor()?)))
            .query(&[("token", self.token()?)])
            .json(input)
            .send()
            .await
            .map_err(request_error)?;
        decode::<Envelope<ActorRun>>(response).await.map(|e| e.data)
    }

    async fn status(&self, run_id: &str) -> Result<ActorRun, AdapterError> {
        let response = self
            .client
            .get(self.url(&format!("actor-runs/{run_id}")))
            .query(&[("token", self.token()?)])
            .send()
            .await
            .map_err(request_error)?;
        decode::<Envelope<ActorRun>>(response).await.map(|e| e.data)
    }

    async fn items(&self, dataset_id: &str) -> Result<Vec<Listing>, AdapterError> {
        let response = self
            .client
            .get(self.url(&format!("datasets/{dataset_id}/items")))
            .query(&[("token", self.token()?), ("clean", "true"), ("format", "json")])
            .send()
            .await
            .map_err(request_error)?;
        decode(response).await
    }

    /// Poll until the run is terminal or the wait budget is spent.
    async fn wait(&self, mut run: ActorRun) -> Result<ActorRun, AdapterError> {
        let deadline = Instant::now() + self.config.wait_budget;
        while !run.is_terminal() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::warn!(
                    run_id = %run.id,
                    status = %run.status,
                    "actor run still in progress after wait budget, reading partial dataset"
                );
                break;
            }
            sleep(self.config.poll_interval.min(remaining)).await;
            run = self.status(&run.id).await?;
            tracing::debug!(run_id = %run.id, status = %run.status, "actor run polled");
        }
        Ok(run)
    }
}

#[async_trait]
impl ListingRetrieval for ApifyRetrieval {
    async fn retrieve(&self, criteria: &SearchCriteria) -> Result<Vec<Listing>, AdapterError> {
        let actor = self.actor()?;
        let input = criteria.to_retrieval_input();
        tracing::debug!(%input, "starting actor run");

        let run = self.start(&input).await?;
        tracing::info!(run_id = %run.id, actor, "actor run started");

        let run = self.wait(run).await?;
        if run.is_failed() {
            return Err(AdapterError::Upstream {
                status: 0,
                message: format!("actor run {} ended with {}", run.id, run.status),
            });
        }

        let mut listings = self.items(&run.default_dataset_id).await?;
        let limit = usize::try_from(criteria.result_limit).unwrap_or(0);
        listings.truncate(limit);
        tracing::info!(count = listings.len(), "listings retrieved");
        Ok(listings)
    }
}

fn request_error(err: reqwest::Error) -> AdapterError {
    AdapterError::Request(format!("Apify request failed: {err}"))
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, AdapterError> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(AdapterError::Upstream {
            status: status.as_u16(),
            message,
        });
    }
    response
        .json()
        .await
        .map_err(|e| AdapterError::MalformedResponse(e.to_string()))
}
