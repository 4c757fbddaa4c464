//! k-anonymity aggregation engine
//!
//! Tallies preferences per office within one locality (the owner's state).
//! Below the disclosure threshold only the total is returned; the
//! per-candidate breakdown is never computed, so small groups cannot be
//! re-identified by elimination.
//!
//! Ordering: counts descending. Equal counts keep the order in which each
//! candidate's first counted preference appears when rows are scanned in
//! creation order. The sort is stable, so this order is deterministic.

use crate::error::ServerError;
use crate::repository::PulseRepository;
use indexmap::IndexMap;
use pulse_model::{Aggregate, CandidateId, Office, OfficeId, Pulse, PulseRecord, DISCLOSURE_THRESHOLD};
use std::sync::Arc;

const UNKNOWN: &str = "Unknown";

/// Threshold-gated tally computation, fresh per request
#[derive(Clone)]
pub struct AggregationEngine {
    repo: Arc<dyn PulseRepository>,
    threshold: u64,
}

impl std::fmt::Debug for AggregationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AggregationEngine")
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl AggregationEngine {
    /// Engine with the default threshold
    #[inline]
    #[must_use]
    pub fn new(repo: Arc<dyn PulseRepository>) -> Self {
        Self {
            repo,
            threshold: DISCLOSURE_THRESHOLD,
        }
    }

    /// Raise the threshold; values below the default are clamped up
    #[inline]
    #[must_use]
    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold.max(DISCLOSURE_THRESHOLD);
        self
    }

    /// Active threshold
    #[inline]
    #[must_use]
    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Aggregate for one office in `locality`
    ///
    /// # Errors
    /// `ServerError::NotFound` for an unknown office, or a storage failure
    pub async fn aggregate(
        &self,
        office_id: &OfficeId,
        locality: &str,
    ) -> Result<Aggregate, ServerError> {
        let office = self
            .repo
            .office(office_id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("office {office_id}")))?;
        self.aggregate_office(&office, locality).await
    }

    /// Aggregates for every office in `locality`
    ///
    /// # Errors
    /// Storage failures
    pub async fn pulse(&self, locality: &str) -> Result<Pulse, ServerError> {
        let mut pulse = Pulse::new();
        for office in self.repo.offices().await? {
            let aggregate = self.aggregate_office(&office, locality).await?;
            pulse.insert(office.id, aggregate);
        }
        Ok(pulse)
    }

    async fn aggregate_office(
        &self,
        office: &Office,
        locality: &str,
    ) -> Result<Aggregate, ServerError> {
        let rows = self.repo.preferences_in(&office.id, locality).await?;
        let total_votes = rows.len() as u64;

        if total_votes < self.threshold {
            tracing::debug!(office = %office.id, locality, total_votes, "aggregate withheld");
            return Ok(Aggregate::withheld(&office.name, total_votes));
        }

        let mut groups: IndexMap<CandidateId, u64> = IndexMap::new();
        for row in rows {
            *groups.entry(row.candidate_id).or_insert(0) += 1;
        }

        let mut data = Vec::with_capacity(groups.len());
        for (candidate_id, count) in groups {
            let (candidate_name, party) = match self.repo.candidate(&candidate_id).await? {
                Some(candidate) => {
                    let party = if candidate.party.trim().is_empty() {
                        UNKNOWN.to_string()
                    } else {
                        candidate.party
                    };
                    (candidate.name, party)
                }
                None => (UNKNOWN.to_string(), UNKNOWN.to_string()),
            };
            data.push(PulseRecord {
                candidate_id,
                candidate_name,
                party,
                count,
            });
        }

        tracing::debug!(office = %office.id, locality, total_votes, "aggregate disclosed");
        Aggregate::disclosed(&office.name, total_votes, data)
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;
    use pretty_assertions::assert_eq;
    use pulse_model::{Candidate, LocationUpdate, PreferenceDraft, Scope, SessionId};

    async fn fixture() -> (Arc<MemoryRepository>, AggregationEngine) {
        let repo = Arc::new(MemoryRepository::new());
        repo.upsert_office(Office::new("gov", "GOVERNOR", "Governor", Scope::State))
            .await
            .unwrap();
        repo.upsert_candidate(Candidate::new("g1", "Candidate X", "Party 1", "gov").in_state("Lagos"))
            .await
            .unwrap();
        repo.upsert_candidate(Candidate::new("g2", "Candidate Y", "Party 2", "gov").in_state("Lagos"))
            .await
            .unwrap();
        let engine = AggregationEngine::new(repo.clone());
        (repo, engine)
    }

    async fn vote(repo: &MemoryRepository, n: usize, state: &str, office: &str, candidate: &str) {
        let session = SessionId::new(format!("{state}-{office}-{candidate}-{n}"));
        let user = repo.create_user(session.clone()).await.unwrap();
        repo.update_location(&session, &LocationUpdate::new(state, "Somewhere"))
            .await
            .unwrap();
        repo.upsert_preference(&user.id, PreferenceDraft::new(office, candidate))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn below_threshold_is_withheld() {
        let (repo, engine) = fixture().await;
        for n in 0..24 {
            vote(&repo, n, "Lagos", "gov", "g1").await;
        }

        let agg = engine.aggregate(&OfficeId::new("gov"), "Lagos").await.unwrap();
        assert!(!agg.allowed());
        assert_eq!(agg.total_votes(), 24);
        assert_eq!(agg.office_name(), "Governor");
        assert!(agg.data().is_none());
    }

    #[tokio::test]
    async fn at_threshold_is_disclosed_and_sorted() {
        let (repo, engine) = fixture().await;
        for n in 0..5 {
            vote(&repo, n, "Lagos", "gov", "g2").await;
        }
        for n in 0..20 {
            vote(&repo, n, "Lagos", "gov", "g1").await;
        }

        let agg = engine.aggregate(&OfficeId::new("gov"), "Lagos").await.unwrap();
        assert!(agg.allowed());
        assert_eq!(agg.total_votes(), 25);
        let data = agg.data().unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!((data[0].candidate_id.as_str(), data[0].count), ("g1", 20));
        assert_eq!((data[1].candidate_id.as_str(), data[1].count), ("g2", 5));
        assert_eq!(data[0].candidate_name, "Candidate X");
        assert_eq!(data[1].party, "Party 2");
    }

    #[tokio::test]
    async fn other_states_do_not_count() {
        let (repo, engine) = fixture().await;
        for n in 0..30 {
            vote(&repo, n, "Kano", "gov", "g1").await;
        }

        let agg = engine.aggregate(&OfficeId::new("gov"), "Lagos").await.unwrap();
        assert_eq!(agg.total_votes(), 0);
        assert!(!agg.allowed());
    }

    #[tokio::test]
    async fn ties_keep_first_vote_order() {
        let (repo, engine) = fixture().await;
        // g2 is voted for first, so it ranks ahead of g1 on an equal count.
        vote(&repo, 0, "Lagos", "gov", "g2").await;
        for n in 1..13 {
            vote(&repo, n, "Lagos", "gov", "g1").await;
        }
        for n in 13..25 {
            vote(&repo, n, "Lagos", "gov", "g2").await;
        }
        vote(&repo, 25, "Lagos", "gov", "g1").await;

        let agg = engine.aggregate(&OfficeId::new("gov"), "Lagos").await.unwrap();
        let order: Vec<_> = agg
            .data()
            .unwrap()
            .iter()
            .map(|r| (r.candidate_id.as_str(), r.count))
            .collect();
        assert_eq!(order, vec![("g2", 13), ("g1", 13)]);
    }

    #[tokio::test]
    async fn unknown_candidate_is_labelled() {
        let (repo, engine) = fixture().await;
        for n in 0..25 {
            vote(&repo, n, "Lagos", "gov", "ghost").await;
        }

        let agg = engine.aggregate(&OfficeId::new("gov"), "Lagos").await.unwrap();
        let record = &agg.data().unwrap()[0];
        assert_eq!(record.candidate_name, "Unknown");
        assert_eq!(record.party, "Unknown");
    }

    #[tokio::test]
    async fn reflects_writes_between_reads() {
        let (repo, engine) = fixture().await;
        for n in 0..24 {
            vote(&repo, n, "Lagos", "gov", "g1").await;
        }
        let before = engine.aggregate(&OfficeId::new("gov"), "Lagos").await.unwrap();
        assert!(!before.allowed());

        vote(&repo, 24, "Lagos", "gov", "g2").await;
        let after = engine.aggregate(&OfficeId::new("gov"), "Lagos").await.unwrap();
        assert!(after.allowed());
        assert_eq!(after.total_votes(), 25);
    }

    #[tokio::test]
    async fn threshold_cannot_be_lowered() {
        let (_, engine) = fixture().await;
        assert_eq!(engine.clone().with_threshold(3).threshold(), DISCLOSURE_THRESHOLD);
        assert_eq!(engine.with_threshold(50).threshold(), 50);
    }

    #[tokio::test]
    async fn unknown_office_is_not_found() {
        let (_, engine) = fixture().await;
        let err = engine.aggregate(&OfficeId::new("nope"), "Lagos").await.unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[tokio::test]
    async fn pulse_covers_every_office() {
        let (repo, engine) = fixture().await;
        repo.upsert_office(Office::new("pres", "PRESIDENT", "President", Scope::National))
            .await
            .unwrap();

        let pulse = engine.pulse("Lagos").await.unwrap();
        assert_eq!(pulse.len(), 2);
        assert!(pulse.values().all(|a| !a.allowed()));
    }
}
