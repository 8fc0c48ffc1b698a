//! Per-stage sets of entity ids that have already been processed.

use crate::NodeError;
use dashmap::DashMap;
use std::collections::{BTreeMap, BTreeSet, HashSet};

/// Exported form of a tracker, used to seed a later run.
pub type DedupSnapshot = BTreeMap<String, BTreeSet<String>>;

/// Atomic test-and-set over named stages.
///
/// Membership only grows within a run. Each stage is independent of every
/// other stage. Shared across concurrently running nodes behind an `Arc`.
#[derive(Debug, Default)]
pub struct DedupTracker {
    claimed: DashMap<String, HashSet<String>>,
    confirmed: DashMap<String, HashSet<String>>,
}

impl DedupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tracker pre-populated with ids processed by a prior run.
    pub fn seeded(prior: DedupSnapshot) -> Self {
        let tracker = Self::new();
        for (stage, ids) in prior {
            tracker.seed(&stage, ids);
        }
        tracker
    }

    /// Seeded ids count as claimed and confirmed: they were finished by an
    /// earlier run and are exported again by [`snapshot`](Self::snapshot).
    pub fn seed(&self, stage: &str, ids: impl IntoIterator<Item = String>) {
        let ids: Vec<String> = ids.into_iter().collect();
        self.confirmed
            .entry(stage.to_string())
            .or_default()
            .extend(ids.iter().cloned());
        self.claimed
            .entry(stage.to_string())
            .or_default()
            .extend(ids);
    }

    /// Returns `true` exactly once per (stage, id) and records the id.
    ///
    /// The shard lock is held across the lookup and the insert, so two
    /// callers racing on the same id cannot both win.
    pub fn should_process(&self, stage: &str, id: &str) -> bool {
        let inserted = self
            .claimed
            .entry(stage.to_string())
            .or_default()
            .insert(id.to_string());
        if !inserted {
            tracing::debug!(stage, id, "already processed, skipping");
        }
        inserted
    }

    /// Record that work for a claimed id finished.
    ///
    /// Finishing the same id twice means the claim was not exclusive.
    pub fn confirm(&self, stage: &str, id: &str) -> Result<(), NodeError> {
        let fresh = self
            .confirmed
            .entry(stage.to_string())
            .or_default()
            .insert(id.to_string());
        if fresh {
            Ok(())
        } else {
            tracing::error!(stage, id, "dedup invariant violated");
            Err(NodeError::DedupInvariant {
                stage: stage.to_string(),
                id: id.to_string(),
            })
        }
    }

    pub fn contains(&self, stage: &str, id: &str) -> bool {
        self.claimed
            .get(stage)
            .is_some_and(|ids| ids.contains(id))
    }

    pub fn len(&self, stage: &str) -> usize {
        self.claimed.get(stage).map_or(0, |ids| ids.len())
    }

    /// Finished ids per stage.
    ///
    /// An id claimed whose work then failed is left out, so a run seeded
    /// from this snapshot picks it up again.
    pub fn snapshot(&self) -> DedupSnapshot {
        self.confirmed
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().iter().cloned().collect(),
                )
            })
            .collect()
    }
}
