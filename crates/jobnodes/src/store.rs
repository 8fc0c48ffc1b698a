//! Result stores: upsert by listing id plus a search history.

use crate::adapter::{ResultPersistence, RunArtifacts};
use crate::model::{Listing, ListingFeedback, ListingSummary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobcore::PersistenceError;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::RwLock;

/// A listing joined with whatever analysis the run produced for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredListing {
    pub listing: Listing,
    pub summary: Option<ListingSummary>,
    pub feedback: Option<ListingFeedback>,
    pub updated_at: DateTime<Utc>,
}

impl StoredListing {
    /// Keep analysis from an earlier run when this run produced none.
    fn merged_over(mut self, previous: Option<&StoredListing>) -> Self {
        if let Some(previous) = previous {
            if self.summary.is_none() {
                self.summary = previous.summary.clone();
            }
            if self.feedback.is_none() {
                self.feedback = previous.feedback.clone();
            }
        }
        self
    }
}

/// One originating query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRecord {
    pub query: String,
    pub resume_name: Option<String>,
    pub listing_ids: Vec<String>,
    pub searched_at: DateTime<Utc>,
}

fn join(artifacts: &RunArtifacts) -> (Vec<StoredListing>, SearchRecord) {
    let now = Utc::now();
    let summaries: HashMap<&str, &ListingSummary> =
        artifacts.summaries.iter().map(|s| (s.id.as_str(), s)).collect();
    let feedbacks: HashMap<&str, &ListingFeedback> =
        artifacts.feedbacks.iter().map(|f| (f.id.as_str(), f)).collect();

    let records = artifacts
        .listings
        .iter()
        .map(|listing| StoredListing {
            listing: listing.clone(),
            summary: summaries.get(listing.id.as_str()).map(|s| (*s).clone()),
            feedback: feedbacks.get(listing.id.as_str()).map(|f| (*f).clone()),
            updated_at: now,
        })
        .collect();
    let search = SearchRecord {
        query: artifacts.query.clone(),
        resume_name: artifacts.document.as_ref().map(|d| d.name()),
        listing_ids: artifacts.listings.iter().map(|l| l.id.clone()).collect(),
        searched_at: now,
    };
    (records, search)
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    listings: RwLock<BTreeMap<String, StoredListing>>,
    history: RwLock<Vec<SearchRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: &str) -> Option<StoredListing> {
        self.listings.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.listings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.listings.read().await.is_empty()
    }

    pub async fn history(&self) -> Vec<SearchRecord> {
        self.history.read().await.clone()
    }
}

#[async_trait]
impl ResultPersistence for MemoryStore {
    async fn persist(&self, artifacts: &RunArtifacts) -> Result<(), PersistenceError> {
        let (records, search) = join(artifacts);
        let mut listings = self.listings.write().await;
        for record in records {
            let previous = listings.get(&record.listing.id).cloned();
            let record = record.merged_over(previous.as_ref());
            listings.insert(record.listing.id.clone(), record);
        }
        self.history.write().await.push(search);
        Ok(())
    }
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS job_listings (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        company_name TEXT NOT NULL,
        location TEXT NOT NULL,
        apply_url TEXT NOT NULL,
        data TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS job_analyses (
        listing_id TEXT PRIMARY KEY REFERENCES job_listings(id),
        summary TEXT,
        required_skills TEXT,
        similarity_score INTEGER,
        feedback TEXT,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS search_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        query TEXT NOT NULL,
        resume_name TEXT,
        listing_ids TEXT NOT NULL,
        searched_at TEXT NOT NULL
    );";

const UPSERT_LISTING: &str = "
    INSERT INTO job_listings (id, title, company_name, location, apply_url, data, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
    ON CONFLICT(id) DO UPDATE SET
        title = excluded.title,
        company_name = excluded.company_name,
        location = excluded.location,
        apply_url = excluded.apply_url,
        data = excluded.data,
        updated_at = excluded.updated_at";

// NULL columns leave the earlier analysis in place.
const UPSERT_ANALYSIS: &str = "
    INSERT INTO job_analyses
        (listing_id, summary, required_skills, similarity_score, feedback, updated_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
    ON CONFLICT(listing_id) DO UPDATE SET
        summary = COALESCE(excluded.summary, job_analyses.summary),
        required_skills = COALESCE(excluded.required_skills, job_analyses.required_skills),
        similarity_score = COALESCE(excluded.similarity_score, job_analyses.similarity_score),
        feedback = COALESCE(excluded.feedback, job_analyses.feedback),
        updated_at = excluded.updated_at";

/// SQLite-backed result store.
///
/// Listings and their analysis live in separate tables keyed by listing
/// id; every persisted run appends one `search_history` row.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(db_error)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_error)?;
        conn.execute_batch(SCHEMA).map_err(db_error)?;

        tracing::debug!(path = %path.display(), "result store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory().map_err(db_error)?;
        conn.execute_batch(SCHEMA).map_err(db_error)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, PersistenceError> {
        self.conn
            .lock()
            .map_err(|e| PersistenceError::Backend(e.to_string()))
    }

    pub fn get(&self, id: &str) -> Result<Option<StoredListing>, PersistenceError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT l.data, l.updated_at, a.summary, a.required_skills,
                        a.similarity_score, a.feedback
                 FROM job_listings l
                 LEFT JOIN job_analyses a ON a.listing_id = l.id
                 WHERE l.id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(db_error)?;
        drop(conn);

        let Some((data, updated_at, summary, skills, score, feedback)) = row else {
            return Ok(None);
        };
        let listing: Listing = serde_json::from_str(&data)?;
        let summary = match summary {
            Some(summary) => Some(ListingSummary {
                id: listing.id.clone(),
                summary,
                required_skills: match skills {
                    Some(raw) => serde_json::from_str(&raw)?,
                    None => Vec::new(),
                },
            }),
            None => None,
        };
        let feedback = match score {
            Some(score) => Some(ListingFeedback {
                id: listing.id.clone(),
                similarity_score: u8::try_from(score.clamp(0, 100)).unwrap_or(100),
                feedback: feedback.unwrap_or_default(),
            }),
            None => None,
        };
        Ok(Some(StoredListing {
            listing,
            summary,
            feedback,
            updated_at: parse_timestamp(&updated_at)?,
        }))
    }

    pub fn len(&self) -> Result<usize, PersistenceError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM job_listings", [], |row| row.get(0))
            .map_err(db_error)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    pub fn is_empty(&self) -> Result<bool, PersistenceError> {
        self.len().map(|n| n == 0)
    }

    /// Originating queries, oldest first.
    pub fn history(&self) -> Result<Vec<SearchRecord>, PersistenceError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT query, resume_name, listing_ids, searched_at
                 FROM search_history ORDER BY id",
            )
            .map_err(db_error)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(db_error)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_error)?;

        rows.into_iter()
            .map(|(query, resume_name, ids, searched_at)| {
                Ok(SearchRecord {
                    query,
                    resume_name,
                    listing_ids: serde_json::from_str(&ids)?,
                    searched_at: parse_timestamp(&searched_at)?,
                })
            })
            .collect()
    }

    fn write(&self, records: &[StoredListing], search: &SearchRecord) -> Result<(), PersistenceError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_error)?;

        for record in records {
            let listing = &record.listing;
            let updated_at = record.updated_at.to_rfc3339();
            tx.execute(
                UPSERT_LISTING,
                params![
                    listing.id,
                    listing.title,
                    listing.company_name,
                    listing.location,
                    listing.apply_url,
                    serde_json::to_string(listing)?,
                    updated_at,
                ],
            )
            .map_err(db_error)?;

            if record.summary.is_none() && record.feedback.is_none() {
                continue;
            }
            let skills = match &record.summary {
                Some(summary) => Some(serde_json::to_string(&summary.required_skills)?),
                None => None,
            };
            tx.execute(
                UPSERT_ANALYSIS,
                params![
                    listing.id,
                    record.summary.as_ref().map(|s| s.summary.as_str()),
                    skills,
                    record.feedback.as_ref().map(|f| i64::from(f.similarity_score)),
                    record.feedback.as_ref().map(|f| f.feedback.as_str()),
                    updated_at,
                ],
            )
            .map_err(db_error)?;
        }

        tx.execute(
            "INSERT INTO search_history (query, resume_name, listing_ids, searched_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                search.query,
                search.resume_name,
                serde_json::to_string(&search.listing_ids)?,
                search.searched_at.to_rfc3339(),
            ],
        )
        .map_err(db_error)?;

        tx.commit().map_err(db_error)
    }
}

#[async_trait]
impl ResultPersistence for SqliteStore {
    async fn persist(&self, artifacts: &RunArtifacts) -> Result<(), PersistenceError> {
        let (records, search) = join(artifacts);
        self.write(&records, &search)?;
        tracing::debug!(listings = records.len(), "results stored");
        Ok(())
    }
}

fn db_error(err: rusqlite::Error) -> PersistenceError {
    PersistenceError::Backend(err.to_string())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| PersistenceError::Backend(format!("bad timestamp '{raw}': {e}")))
}
