use crate::adapter::Adapters;
use crate::apify::ApifyRetrieval;
use crate::document::ResumeDocumentExtractor;
use crate::llm::{ChatClient, LlmAgent};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_APIFY_BASE_URL: &str = "https://api.apify.com/v2";

/// OpenAI-compatible chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            api_key: None,
        }
    }
}

/// Listing retrieval through an Apify actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApifyConfig {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub actor: Option<String>,
    /// How long to wait for the actor run before reading what it produced.
    pub wait_budget: Duration,
    pub poll_interval: Duration,
}

impl Default for ApifyConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_APIFY_BASE_URL.to_string(),
            token: None,
            actor: None,
            wait_budget: Duration::from_secs(60),
            poll_interval: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub llm: LlmConfig,
    pub apify: ApifyConfig,
    /// SQLite result database; `None` disables persistence.
    pub store_path: Option<PathBuf>,
}

impl Adapters {
    /// Concrete adapters: one LLM agent for the four language tasks, an
    /// Apify actor for listings and PDF or plain-text resume extraction.
    ///
    /// Missing credentials surface as [`AdapterError::Configuration`] from
    /// the first call that needs them.
    ///
    /// [`AdapterError::Configuration`]: jobcore::AdapterError::Configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        let agent = Arc::new(LlmAgent::new(ChatClient::new(config.llm.clone())));
        let retrieval = Arc::new(ApifyRetrieval::new(config.apify.clone()));

        Self {
            query: agent.clone(),
            retrieval,
            document: Arc::new(ResumeDocumentExtractor::new()),
            resume: agent.clone(),
            summarization: agent.clone(),
            matching: agent,
        }
    }
}
