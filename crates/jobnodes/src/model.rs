//! Records that flow through the pipeline.

use jobcore::{Keyed, ValidationError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use std::path::PathBuf;

pub const MIN_RESULT_LIMIT: i64 = 1;
pub const MAX_RESULT_LIMIT: i64 = 3;
pub const DEFAULT_POSTED_WITHIN_DAYS: u32 = 7;

const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkArrangement {
    Remote,
    Hybrid,
    Onsite,
}

impl WorkArrangement {
    /// Code used by the listing service's `remote` filter.
    pub fn code(self) -> &'static str {
        match self {
            WorkArrangement::Onsite => "1",
            WorkArrangement::Remote => "2",
            WorkArrangement::Hybrid => "3",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Internship,
    EntryLevel,
    Associate,
    MidSeniorLevel,
    Director,
    Executive,
}

impl ExperienceLevel {
    pub fn code(self) -> &'static str {
        match self {
            ExperienceLevel::Internship => "1",
            ExperienceLevel::EntryLevel => "2",
            ExperienceLevel::Associate => "3",
            ExperienceLevel::MidSeniorLevel => "4",
            ExperienceLevel::Director => "5",
            ExperienceLevel::Executive => "6",
        }
    }
}

/// Structured form of a free-text job query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCriteria {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_posted_within_days")]
    pub posted_within_days: u32,
    /// Companies to search within, highest priority first.
    #[serde(default)]
    pub company_allow_list: Vec<String>,
    #[serde(default)]
    pub company_deny_list: Vec<String>,
    #[serde(default)]
    pub work_arrangements: Vec<WorkArrangement>,
    #[serde(default)]
    pub experience_levels: Vec<ExperienceLevel>,
    #[serde(default = "default_result_limit")]
    pub result_limit: i64,
}

fn default_posted_within_days() -> u32 {
    DEFAULT_POSTED_WITHIN_DAYS
}

fn default_result_limit() -> i64 {
    MAX_RESULT_LIMIT
}

impl Default for SearchCriteria {
    fn default() -> Self {
        Self {
            title: None,
            location: None,
            posted_within_days: DEFAULT_POSTED_WITHIN_DAYS,
            company_allow_list: Vec::new(),
            company_deny_list: Vec::new(),
            work_arrangements: Vec::new(),
            experience_levels: Vec::new(),
            result_limit: MAX_RESULT_LIMIT,
        }
    }
}

impl SearchCriteria {
    /// Force `result_limit` into the supported range.
    pub fn clamped(mut self) -> Self {
        let limit = self.result_limit.clamp(MIN_RESULT_LIMIT, MAX_RESULT_LIMIT);
        if limit != self.result_limit {
            tracing::warn!(
                requested = self.result_limit,
                clamped = limit,
                "result limit out of range"
            );
            self.result_limit = limit;
        }
        self
    }

    /// Reject criteria that have no safe default.
    ///
    /// Runs after [`clamped`](Self::clamped); an out-of-range limit is
    /// corrected there rather than rejected here.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        if blank(&self.title) && blank(&self.location) {
            return Err(ValidationError::new(
                "title",
                "criteria need a job title or a location",
            ));
        }
        if self.posted_within_days == 0 {
            return Err(ValidationError::new(
                "postedWithinDays",
                "must be at least one day",
            ));
        }
        Ok(())
    }

    /// Input document for the listing service.
    pub fn to_retrieval_input(&self) -> Value {
        let mut input = Map::new();
        if let Some(title) = &self.title {
            input.insert("title".into(), json!(title));
        }
        if let Some(location) = &self.location {
            input.insert("location".into(), json!(location));
        }
        input.insert(
            "datePosted".into(),
            json!(format!("r{}", u64::from(self.posted_within_days) * SECONDS_PER_DAY)),
        );
        if !self.company_allow_list.is_empty() {
            input.insert("companyName".into(), json!(self.company_allow_list));
        }
        if !self.company_deny_list.is_empty() {
            input.insert("skipJobId".into(), json!(self.company_deny_list));
        }
        if !self.work_arrangements.is_empty() {
            let codes: Vec<_> = self.work_arrangements.iter().map(|w| w.code()).collect();
            input.insert("remote".into(), json!(codes));
        }
        if !self.experience_levels.is_empty() {
            let codes: Vec<_> = self.experience_levels.iter().map(|e| e.code()).collect();
            input.insert("experienceLevel".into(), json!(codes));
        }
        input.insert("limit".into(), json!(self.result_limit));
        Value::Object(input)
    }
}

/// One job listing as returned by the listing service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub url: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub location: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub company_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub company_url: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub recruiter_name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub recruiter_url: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub experience_level: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub contract_type: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub work_type: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sector: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub salary: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub apply_type: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub apply_url: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub posted_time_ago: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub posted_date: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub applications_count: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
}

impl Keyed for Listing {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Scraped records use numbers and nulls where strings are expected.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// What the summarization capability returns for one description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDraft {
    pub summary: String,
    #[serde(default)]
    pub required_skills: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingSummary {
    /// Id of the summarized listing.
    pub id: String,
    pub summary: String,
    pub required_skills: Vec<String>,
}

impl Keyed for ListingSummary {
    fn key(&self) -> &str {
        &self.id
    }
}

/// What the matching capability returns for one listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackDraft {
    pub similarity_score: i64,
    #[serde(default = "default_feedback")]
    pub feedback: String,
}

fn default_feedback() -> String {
    "No feedback".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingFeedback {
    /// Id of the listing the feedback is about.
    pub id: String,
    /// Always within 0..=100.
    pub similarity_score: u8,
    pub feedback: String,
}

impl Keyed for ListingFeedback {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Structured fields of a resume.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeFields {
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default)]
    pub certifications: Vec<String>,
    #[serde(default)]
    pub experience: Vec<String>,
    #[serde(default)]
    pub education: Vec<String>,
}

impl ResumeFields {
    /// Replace every empty section with an explicit "none" entry so that
    /// downstream prompts never see a missing section.
    pub fn with_sentinels(mut self) -> Self {
        fn fill(list: &mut Vec<String>, sentinel: &str) {
            list.retain(|entry| !entry.trim().is_empty());
            if list.is_empty() {
                list.push(sentinel.to_string());
            }
        }

        fill(&mut self.skills, "No skills");
        fill(&mut self.projects, "No Projects");
        fill(&mut self.certifications, "No Certifications");
        fill(&mut self.experience, "No Experience");
        fill(&mut self.education, "No Education");
        if self.profile.trim().is_empty() {
            self.profile = "No profile".to_string();
        }
        self
    }
}

/// Handle to the resume document a run analyzes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentHandle {
    pub path: PathBuf,
}

impl DocumentHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File name for display and search history.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}
