// crates/jobnodes/tests/pipeline_test.rs

use async_trait::async_trait;
use jobcore::{AdapterError, DedupSnapshot, NodeError, PersistenceError};
use jobnodes::fields::{SCORE_AND_FEEDBACK, SUMMARIZE_LISTINGS, SUMMARY_STAGE};
use jobnodes::model::{
    DocumentHandle, FeedbackDraft, Listing, ResumeFields, SearchCriteria, SummaryDraft,
};
use jobnodes::{
    Adapters, DocumentTextExtraction, JobSearchPipeline, ListingRetrieval, ListingSummarization,
    MatchFeedback, MatchRequest, MemoryStore, PipelineRequest, QueryStructuring,
    ResultPersistence, ResumeFieldExtraction, RunArtifacts,
};
use jobruntime::RuntimeConfig;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn listing(id: &str) -> Listing {
    Listing {
        id: id.to_string(),
        title: format!("Role {id}"),
        company_name: "Acme".to_string(),
        description: format!("desc-{id}"),
        ..Listing::default()
    }
}

struct FakeQuery {
    limit: i64,
}

#[async_trait]
impl QueryStructuring for FakeQuery {
    async fn structure(&self, _query: &str) -> Result<SearchCriteria, AdapterError> {
        Ok(SearchCriteria {
            title: Some("Rust Engineer".into()),
            result_limit: self.limit,
            ..SearchCriteria::default()
        })
    }
}

struct FakeRetrieval {
    listings: Vec<Listing>,
    delay: Duration,
    requested_limit: Mutex<Option<i64>>,
}

#[async_trait]
impl ListingRetrieval for FakeRetrieval {
    async fn retrieve(&self, criteria: &SearchCriteria) -> Result<Vec<Listing>, AdapterError> {
        *self.requested_limit.lock().unwrap() = Some(criteria.result_limit);
        tokio::time::sleep(self.delay).await;
        Ok(self.listings.clone())
    }
}

struct FakeDocument {
    delay: Duration,
}

#[async_trait]
impl DocumentTextExtraction for FakeDocument {
    async fn extract_text(&self, _document: &DocumentHandle) -> Result<String, AdapterError> {
        tokio::time::sleep(self.delay).await;
        Ok("Rust developer with five years of backend work".into())
    }
}

struct FakeResume {
    fields: ResumeFields,
}

#[async_trait]
impl ResumeFieldExtraction for FakeResume {
    async fn extract_fields(&self, _text: &str) -> Result<ResumeFields, AdapterError> {
        Ok(self.fields.clone())
    }
}

#[derive(Default)]
struct FakeSummarizer {
    fail_on: Option<String>,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl ListingSummarization for FakeSummarizer {
    async fn summarize(&self, description: &str) -> Result<SummaryDraft, AdapterError> {
        self.calls.lock().unwrap().push(description.to_string());
        if self.fail_on.as_deref() == Some(description) {
            return Err(AdapterError::Upstream {
                status: 429,
                message: "quota exceeded".into(),
            });
        }
        Ok(SummaryDraft {
            summary: format!("summary of {description}"),
            required_skills: vec!["Rust".into(), "Tokio".into()],
        })
    }
}

struct FakeMatcher {
    score: i64,
}

#[async_trait]
impl MatchFeedback for FakeMatcher {
    async fn feedback(&self, request: MatchRequest<'_>) -> Result<FeedbackDraft, AdapterError> {
        Ok(FeedbackDraft {
            similarity_score: self.score,
            feedback: format!("compare against: {}", request.target_summary),
        })
    }
}

struct FailingStore;

#[async_trait]
impl ResultPersistence for FailingStore {
    async fn persist(&self, _artifacts: &RunArtifacts) -> Result<(), PersistenceError> {
        Err(PersistenceError::Backend("database is locked".into()))
    }
}

struct Fixture {
    query_limit: i64,
    listings: Vec<Listing>,
    search_delay: Duration,
    resume_delay: Duration,
    resume_fields: ResumeFields,
    summarizer: Arc<FakeSummarizer>,
    score: i64,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            query_limit: 3,
            listings: vec![listing("A"), listing("B")],
            search_delay: Duration::ZERO,
            resume_delay: Duration::ZERO,
            resume_fields: ResumeFields {
                skills: vec!["Rust".into()],
                profile: "Backend engineer".into(),
                ..ResumeFields::default()
            },
            summarizer: Arc::new(FakeSummarizer::default()),
            score: 80,
        }
    }
}

impl Fixture {
    fn build(self) -> (JobSearchPipeline, Arc<FakeRetrieval>) {
        let retrieval = Arc::new(FakeRetrieval {
            listings: self.listings,
            delay: self.search_delay,
            requested_limit: Mutex::new(None),
        });
        let adapters = Adapters {
            query: Arc::new(FakeQuery {
                limit: self.query_limit,
            }),
            retrieval: retrieval.clone(),
            document: Arc::new(FakeDocument {
                delay: self.resume_delay,
            }),
            resume: Arc::new(FakeResume {
                fields: self.resume_fields,
            }),
            summarization: self.summarizer,
            matching: Arc::new(FakeMatcher { score: self.score }),
        };
        let pipeline = JobSearchPipeline::new(adapters, RuntimeConfig::default()).unwrap();
        (pipeline, retrieval)
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("jobnodes=debug,jobruntime=info")
        .try_init();
}

fn request() -> PipelineRequest {
    PipelineRequest::new("rust jobs, any company", DocumentHandle::new("resume.txt"))
}

fn ids<T>(items: &[T], key: impl Fn(&T) -> &str) -> Vec<String> {
    items.iter().map(|item| key(item).to_string()).collect()
}

#[tokio::test]
async fn test_result_limit_is_clamped_before_retrieval() {
    let (pipeline, retrieval) = Fixture {
        query_limit: 1000,
        ..Fixture::default()
    }
    .build();

    let output = pipeline.run(request()).await.unwrap();

    assert_eq!(*retrieval.requested_limit.lock().unwrap(), Some(3));
    assert_eq!(output.criteria.map(|c| c.result_limit), Some(3));
}

#[tokio::test]
async fn test_seeded_summary_set_skips_known_listing() {
    let summarizer = Arc::new(FakeSummarizer::default());
    let (pipeline, _) = Fixture {
        listings: vec![listing("A"), listing("C")],
        summarizer: summarizer.clone(),
        ..Fixture::default()
    }
    .build();

    let mut seen = DedupSnapshot::new();
    seen.insert(SUMMARY_STAGE.to_string(), BTreeSet::from(["A".to_string()]));
    let output = pipeline.run(request().with_seen(seen)).await.unwrap();

    assert_eq!(ids(&output.summaries, |s| s.id.as_str()), vec!["C"]);
    assert_eq!(*summarizer.calls.lock().unwrap(), vec!["desc-C"]);
    assert_eq!(
        output.dedup[SUMMARY_STAGE],
        BTreeSet::from(["A".to_string(), "C".to_string()])
    );
}

#[tokio::test]
async fn test_branch_completion_order_does_not_change_output() {
    let (search_first, _) = Fixture {
        resume_delay: Duration::from_millis(60),
        ..Fixture::default()
    }
    .build();
    let (resume_first, _) = Fixture {
        search_delay: Duration::from_millis(60),
        ..Fixture::default()
    }
    .build();

    let a = search_first.run(request()).await.unwrap();
    let b = resume_first.run(request()).await.unwrap();

    assert_eq!(ids(&a.summaries, |s| s.id.as_str()), vec!["A", "B"]);
    assert_eq!(a.listings, b.listings);
    assert_eq!(a.summaries, b.summaries);
    assert_eq!(a.feedbacks, b.feedbacks);
    assert_eq!(a.resume_fields, b.resume_fields);
    assert_eq!(a.dedup, b.dedup);
}

#[tokio::test]
async fn test_summarization_failure_returns_partial_state() {
    init_tracing();
    let summarizer = Arc::new(FakeSummarizer {
        fail_on: Some("desc-B".into()),
        ..FakeSummarizer::default()
    });
    let (pipeline, _) = Fixture {
        summarizer,
        ..Fixture::default()
    }
    .build();

    let failure = pipeline.run(request()).await.unwrap_err();

    assert_eq!(failure.node, SUMMARIZE_LISTINGS);
    assert_eq!(failure.state.ids("listings"), vec!["A", "B"]);
    assert_eq!(failure.state.ids("summaries"), vec!["A"]);
    assert!(!failure.state.contains("feedbacks"));
    assert!(failure.to_string().contains(SUMMARIZE_LISTINGS));
}

#[tokio::test]
async fn test_resume_after_failure_retries_the_failed_listing() {
    init_tracing();
    let flaky = Arc::new(FakeSummarizer {
        fail_on: Some("desc-B".into()),
        ..FakeSummarizer::default()
    });
    let (failing, _) = Fixture {
        summarizer: flaky,
        ..Fixture::default()
    }
    .build();

    let failure = failing.run(request()).await.unwrap_err();
    assert_eq!(
        failure.dedup[SUMMARY_STAGE],
        BTreeSet::from(["A".to_string()])
    );

    let healthy = Arc::new(FakeSummarizer::default());
    let (resumed, _) = Fixture {
        summarizer: healthy.clone(),
        ..Fixture::default()
    }
    .build();

    let output = resumed
        .run(request().with_seen(failure.dedup.clone()))
        .await
        .unwrap();

    assert_eq!(ids(&output.summaries, |s| s.id.as_str()), vec!["B"]);
    assert_eq!(*healthy.calls.lock().unwrap(), vec!["desc-B"]);
    assert_eq!(
        output.dedup[SUMMARY_STAGE],
        BTreeSet::from(["A".to_string(), "B".to_string()])
    );
}

#[tokio::test]
async fn test_persistence_failure_still_completes() {
    init_tracing();
    let (pipeline, _) = Fixture::default().build();
    let pipeline = pipeline.with_persistence(Arc::new(FailingStore));

    let output = pipeline.run(request()).await.unwrap();

    assert_eq!(output.summaries.len(), 2);
    assert_eq!(output.feedbacks.len(), 2);
    let warning = output.storage_warning.unwrap();
    assert!(warning.contains("database is locked"));
}

#[tokio::test]
async fn test_rerun_with_exported_dedup_summarizes_nothing_twice() {
    let summarizer = Arc::new(FakeSummarizer::default());
    let (pipeline, _) = Fixture {
        listings: vec![listing("A"), listing("B"), listing("A")],
        summarizer: summarizer.clone(),
        ..Fixture::default()
    }
    .build();

    let first = pipeline.run(request()).await.unwrap();
    assert_eq!(ids(&first.summaries, |s| s.id.as_str()), vec!["A", "B"]);

    let second = pipeline
        .run(request().with_seen(first.dedup.clone()))
        .await
        .unwrap();
    assert!(second.summaries.is_empty());
    assert!(second.feedbacks.is_empty());
    assert_eq!(summarizer.calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_scores_are_clamped_and_resume_sentinels_applied() {
    let (pipeline, _) = Fixture {
        score: 140,
        resume_fields: ResumeFields::default(),
        ..Fixture::default()
    }
    .build();

    let output = pipeline.run(request()).await.unwrap();

    assert!(output.feedbacks.iter().all(|f| f.similarity_score == 100));
    let fields = output.resume_fields.unwrap();
    assert_eq!(fields.skills, vec!["No skills"]);
    assert_eq!(fields.certifications, vec!["No Certifications"]);
}

#[tokio::test]
async fn test_results_are_upserted_by_listing_id() {
    let store = Arc::new(MemoryStore::new());
    let (pipeline, _) = Fixture::default().build();
    let pipeline = pipeline.with_persistence(store.clone());

    let first = pipeline.run(request()).await.unwrap();
    pipeline
        .run(request().with_seen(first.dedup.clone()))
        .await
        .unwrap();

    assert_eq!(store.len().await, 2);
    let stored = store.get("A").await.unwrap();
    assert_eq!(stored.listing.title, "Role A");
    assert_eq!(stored.summary.unwrap().summary, "summary of desc-A");
    assert_eq!(stored.feedback.unwrap().similarity_score, 80);

    let history = store.history().await;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].query, "rust jobs, any company");
    assert_eq!(history[0].resume_name.as_deref(), Some("resume.txt"));
}

#[tokio::test]
async fn test_join_node_sees_both_branches() {
    let (pipeline, _) = Fixture {
        search_delay: Duration::from_millis(30),
        ..Fixture::default()
    }
    .build();
    let mut events = pipeline.runtime().subscribe_events();

    let output = pipeline.run(request()).await.unwrap();
    assert_eq!(ids(&output.feedbacks, |f| f.id.as_str()), vec!["A", "B"]);

    let mut started = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let jobcore::ExecutionEvent::NodeStarted { node, .. } = event {
            started.push(node);
        }
    }
    assert_eq!(
        started.iter().filter(|n| n.as_str() == SCORE_AND_FEEDBACK).count(),
        1
    );
    assert_eq!(started.last().map(String::as_str), Some(SCORE_AND_FEEDBACK));
}

#[tokio::test]
async fn test_missing_seed_is_reported_as_missing_field() {
    use jobcore::{DedupTracker, EventEmitter, Node, NodeContext, WorkflowState};
    use jobnodes::SearchNode;

    let node = SearchNode::new(
        Arc::new(FakeQuery { limit: 3 }),
        Arc::new(FakeRetrieval {
            listings: vec![],
            delay: Duration::ZERO,
            requested_limit: Mutex::new(None),
        }),
    );
    let ctx = NodeContext::new(
        "search",
        WorkflowState::new().read(&node.reads()),
        Arc::new(DedupTracker::new()),
        EventEmitter::detached("search"),
    );

    let failure = node.execute(ctx).await.unwrap_err();
    assert!(matches!(failure.error, NodeError::MissingField(_)));
}

struct VagueQuery;

#[async_trait]
impl QueryStructuring for VagueQuery {
    async fn structure(&self, _query: &str) -> Result<SearchCriteria, AdapterError> {
        Ok(SearchCriteria::default())
    }
}

#[tokio::test]
async fn test_criteria_without_title_or_location_fail_the_search() {
    use jobcore::{DedupTracker, EventEmitter, Node, NodeContext, NodeResult, WorkflowState};
    use jobnodes::fields::QUERY_TEXT;
    use jobnodes::SearchNode;

    let retrieval = Arc::new(FakeRetrieval {
        listings: vec![listing("A")],
        delay: Duration::ZERO,
        requested_limit: Mutex::new(None),
    });
    let node = SearchNode::new(Arc::new(VagueQuery), retrieval.clone());

    let mut seed = NodeResult::new();
    seed.set(QUERY_TEXT, &"anything".to_string()).unwrap();
    let mut state = WorkflowState::new();
    state.apply(seed).unwrap();
    let ctx = NodeContext::new(
        "search",
        state.read(&node.reads()),
        Arc::new(DedupTracker::new()),
        EventEmitter::detached("search"),
    );

    let failure = node.execute(ctx).await.unwrap_err();
    assert!(matches!(failure.error, NodeError::Validation(ref e) if e.field == "title"));
    assert_eq!(*retrieval.requested_limit.lock().unwrap(), None);
}

#[tokio::test]
async fn test_overlapping_schedules_summarize_each_id_once() {
    use jobcore::{DedupTracker, EventEmitter, Node, NodeContext, NodeResult, WorkflowState};
    use jobnodes::fields::LISTINGS;
    use jobnodes::SummarizeNode;

    let summarizer = Arc::new(FakeSummarizer::default());
    let node = SummarizeNode::new(summarizer.clone());
    let dedup = Arc::new(DedupTracker::new());

    let mut produced = Vec::new();
    for batch in [vec!["A", "B"], vec!["B", "C"], vec!["A", "C"]] {
        let mut seed = NodeResult::new();
        let listings: Vec<Listing> = batch.into_iter().map(listing).collect();
        seed.extend(LISTINGS, &listings).unwrap();
        let mut state = WorkflowState::new();
        state.apply(seed).unwrap();

        let ctx = NodeContext::new(
            SUMMARIZE_LISTINGS,
            state.read(&node.reads()),
            dedup.clone(),
            EventEmitter::detached(SUMMARIZE_LISTINGS),
        );
        let result = node.execute(ctx).await.unwrap();
        produced.push(result.entry_count("summaries"));
    }

    assert_eq!(produced, vec![2, 1, 0]);
    assert_eq!(summarizer.calls.lock().unwrap().len(), 3);
    assert_eq!(dedup.len(SUMMARY_STAGE), 3);
}
