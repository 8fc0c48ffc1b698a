//! Language tasks backed by an OpenAI-compatible chat endpoint.

use crate::adapter::{
    ListingSummarization, MatchFeedback, MatchRequest, QueryStructuring, ResumeFieldExtraction,
};
use crate::config::LlmConfig;
use crate::model::{FeedbackDraft, ResumeFields, SearchCriteria, SummaryDraft};
use async_trait::async_trait;
use jobcore::AdapterError;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

const QUERY_PROMPT: &str = r#"You turn a job seeker's request into search parameters for a job listing API.
Reply with a single JSON object using these keys:
  "title": job title or null
  "location": location or null
  "postedWithinDays": integer, default 7
  "companyAllowList": companies to search within, most preferred first
  "companyDenyList": companies to exclude
  "workArrangements": any of "remote", "hybrid", "onsite", most preferred first
  "experienceLevels": any of "internship", "entry_level", "associate", "mid_senior_level", "director", "executive", most preferred first
  "resultLimit": integer, default 3
Leave lists empty when the request does not mention them."#;

const RESUME_PROMPT: &str = r#"You extract the important features from resume text. The text was pulled from a document and is not structured.
Reply with a single JSON object using these keys:
  "skills": programming and technical skills, domain skills before soft skills
  "profile": a brief description of the candidate
  "projects": projects the candidate built
  "certifications": certifications held
  "experience": work experience entries
  "education": education entries
Use empty lists or an empty string when a section is absent."#;

const SUMMARY_PROMPT: &str = r#"You summarize job descriptions.
Reply with a single JSON object using these keys:
  "summary": a synopsis of the role in at most three sentences
  "requiredSkills": the skills the role asks for"#;

const FEEDBACK_PROMPT: &str = r#"You help candidates improve their resume for a specific job.
Point out the keywords, skills and projects the resume lacks for this job and how to add them.
Also rate how well the job suits the candidate.
Reply with a single JSON object using these keys:
  "similarityScore": integer between 0 and 100
  "feedback": your advice as plain text"#;

/// Minimal chat-completions client that asks for JSON replies.
///
/// The API key is optional: local OpenAI-compatible servers accept
/// unauthenticated requests.
pub struct ChatClient {
    client: Client,
    config: LlmConfig,
}

impl ChatClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Send one system + user exchange and decode the reply as `T`.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        system: &str,
        user: &str,
    ) -> Result<T, AdapterError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "response_format": { "type": "json_object" },
            "temperature": 0,
        });

        tracing::debug!(model = %self.config.model, "chat completion request");
        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| AdapterError::Request(format!("LLM request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AdapterError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let reply: Value = response
            .json()
            .await
            .map_err(|e| AdapterError::MalformedResponse(e.to_string()))?;
        let content = reply["choices"]
            .get(0)
            .and_then(|choice| choice["message"]["content"].as_str())
            .ok_or_else(|| AdapterError::MalformedResponse("no choices in reply".into()))?;

        serde_json::from_str(strip_fences(content))
            .map_err(|e| AdapterError::MalformedResponse(format!("{e}: {content}")))
    }
}

/// Some models wrap JSON in a markdown code fence even in JSON mode.
fn strip_fences(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// One agent serving every language task of the pipeline.
pub struct LlmAgent {
    chat: ChatClient,
}

impl LlmAgent {
    pub fn new(chat: ChatClient) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl QueryStructuring for LlmAgent {
    async fn structure(&self, query: &str) -> Result<SearchCriteria, AdapterError> {
        self.chat.complete_json(QUERY_PROMPT, query).await
    }
}

#[async_trait]
impl ResumeFieldExtraction for LlmAgent {
    async fn extract_fields(&self, text: &str) -> Result<ResumeFields, AdapterError> {
        self.chat
            .complete_json(RESUME_PROMPT, &format!("Resume text:\n{text}"))
            .await
    }
}

#[async_trait]
impl ListingSummarization for LlmAgent {
    async fn summarize(&self, description: &str) -> Result<SummaryDraft, AdapterError> {
        self.chat
            .complete_json(SUMMARY_PROMPT, &format!("Job description:\n{description}"))
            .await
    }
}

#[async_trait]
impl MatchFeedback for LlmAgent {
    async fn feedback(&self, request: MatchRequest<'_>) -> Result<FeedbackDraft, AdapterError> {
        let user = format!(
            "Candidate skills: {}\nCandidate profile: {}\n\nJob skills: {}\nJob summary: {}",
            request.candidate_skills.join(", "),
            request.candidate_profile,
            request.target_skills.join(", "),
            request.target_summary,
        );
        self.chat.complete_json(FEEDBACK_PROMPT, &user).await
    }
}
