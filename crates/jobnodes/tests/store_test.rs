// crates/jobnodes/tests/store_test.rs

use jobnodes::model::{DocumentHandle, Listing, ListingFeedback, ListingSummary};
use jobnodes::{MemoryStore, ResultPersistence, RunArtifacts, SqliteStore};

fn listing(id: &str, title: &str) -> Listing {
    Listing {
        id: id.into(),
        title: title.into(),
        apply_url: format!("https://jobs.example/{id}"),
        ..Listing::default()
    }
}

fn summary(id: &str, text: &str) -> ListingSummary {
    ListingSummary {
        id: id.into(),
        summary: text.into(),
        required_skills: vec!["Kubernetes".into()],
    }
}

fn artifacts(with_analysis: bool) -> RunArtifacts {
    let (summaries, feedbacks) = if with_analysis {
        (
            vec![summary("4012345", "Runs the deploy platform")],
            vec![ListingFeedback {
                id: "4012345".into(),
                similarity_score: 64,
                feedback: "Mention cluster upgrades".into(),
            }],
        )
    } else {
        (vec![], vec![])
    };
    RunArtifacts {
        query: "platform roles in Berlin".into(),
        document: Some(DocumentHandle::new("/tmp/cv.pdf")),
        listings: vec![listing("4012345", "Platform Engineer")],
        summaries,
        feedbacks,
    }
}

#[tokio::test]
async fn test_sqlite_store_persists_to_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("results/jobs.db");

    let store = SqliteStore::open(&path).unwrap();
    store.persist(&artifacts(true)).await.unwrap();
    drop(store);

    assert!(path.exists());
    let reopened = SqliteStore::open(&path).unwrap();
    let stored = reopened.get("4012345").unwrap().unwrap();
    assert_eq!(stored.listing.title, "Platform Engineer");
    assert_eq!(stored.summary.unwrap().required_skills, vec!["Kubernetes"]);
    assert_eq!(stored.feedback.unwrap().similarity_score, 64);
    assert!(reopened.get("missing").unwrap().is_none());
}

#[tokio::test]
async fn test_sqlite_upsert_keeps_earlier_analysis() {
    let store = SqliteStore::in_memory().unwrap();

    store.persist(&artifacts(true)).await.unwrap();
    let mut rerun = artifacts(false);
    rerun.listings[0].title = "Senior Platform Engineer".into();
    store.persist(&rerun).await.unwrap();

    assert_eq!(store.len().unwrap(), 1);
    let stored = store.get("4012345").unwrap().unwrap();
    assert_eq!(stored.listing.title, "Senior Platform Engineer");
    assert_eq!(stored.summary.unwrap().summary, "Runs the deploy platform");
    assert_eq!(stored.feedback.unwrap().feedback, "Mention cluster upgrades");

    let history = store.history().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].listing_ids, vec!["4012345"]);
    assert_eq!(history[1].resume_name.as_deref(), Some("cv.pdf"));
}

#[tokio::test]
async fn test_sqlite_keeps_similar_ids_apart() {
    let store = SqliteStore::in_memory().unwrap();

    store
        .persist(&RunArtifacts {
            query: "first".into(),
            document: None,
            listings: vec![listing("a.b", "first")],
            summaries: vec![summary("a.b", "about a.b")],
            feedbacks: vec![],
        })
        .await
        .unwrap();
    store
        .persist(&RunArtifacts {
            query: "second".into(),
            document: None,
            listings: vec![listing("a_b", "second")],
            summaries: vec![],
            feedbacks: vec![],
        })
        .await
        .unwrap();

    assert_eq!(store.len().unwrap(), 2);
    let first = store.get("a.b").unwrap().unwrap();
    assert_eq!(first.listing.title, "first");
    assert_eq!(first.summary.unwrap().summary, "about a.b");
    let second = store.get("a_b").unwrap().unwrap();
    assert_eq!(second.listing.title, "second");
    assert!(second.summary.is_none());
}

#[tokio::test]
async fn test_memory_store_upsert_keeps_earlier_analysis() {
    let store = MemoryStore::new();

    store.persist(&artifacts(true)).await.unwrap();
    store.persist(&artifacts(false)).await.unwrap();

    assert_eq!(store.len().await, 1);
    let stored = store.get("4012345").await.unwrap();
    assert_eq!(stored.summary.unwrap().summary, "Runs the deploy platform");
    assert_eq!(stored.feedback.unwrap().similarity_score, 64);
    assert_eq!(store.history().await.len(), 2);
}
