//! Disclosure-gated preference tallies
//!
//! An [`Aggregate`] can only exist in two shapes: withheld (no per-candidate
//! data) or disclosed (data sorted by count, descending, and only at or above
//! [`DISCLOSURE_THRESHOLD`] votes). Constructors and deserialization both
//! enforce that shape.

use crate::error::ModelError;
use crate::ids::{CandidateId, OfficeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Minimum number of preferences before per-candidate counts are disclosed
pub const DISCLOSURE_THRESHOLD: u64 = 25;

/// Tally for one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PulseRecord {
    /// Candidate
    pub candidate_id: CandidateId,
    /// Candidate name snapshot
    pub candidate_name: String,
    /// Party snapshot
    pub party: String,
    /// Number of preferences
    pub count: u64,
}

/// Preference tally for one office within one locality
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawAggregate")]
pub struct Aggregate {
    allowed: bool,
    total_votes: u64,
    office_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Vec<PulseRecord>>,
}

impl Aggregate {
    /// Sub-threshold result: totals only
    #[inline]
    #[must_use]
    pub fn withheld(office_name: impl Into<String>, total_votes: u64) -> Self {
        Self {
            allowed: false,
            total_votes,
            office_name: office_name.into(),
            data: None,
        }
    }

    /// Disclosed result; `data` is re-sorted by count, descending, keeping
    /// the given order among equal counts
    ///
    /// # Errors
    /// `InconsistentAggregate` when `total_votes` is below
    /// [`DISCLOSURE_THRESHOLD`]
    pub fn disclosed(
        office_name: impl Into<String>,
        total_votes: u64,
        mut data: Vec<PulseRecord>,
    ) -> Result<Self, ModelError> {
        if total_votes < DISCLOSURE_THRESHOLD {
            return Err(ModelError::InconsistentAggregate(format!(
                "disclosed aggregate with {total_votes} votes, below {DISCLOSURE_THRESHOLD}"
            )));
        }
        data.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(Self {
            allowed: true,
            total_votes,
            office_name: office_name.into(),
            data: Some(data),
        })
    }

    /// Whether per-candidate data is disclosed
    #[inline]
    #[must_use]
    pub fn allowed(&self) -> bool {
        self.allowed
    }

    /// Total preferences counted
    #[inline]
    #[must_use]
    pub fn total_votes(&self) -> u64 {
        self.total_votes
    }

    /// Office display name
    #[inline]
    #[must_use]
    pub fn office_name(&self) -> &str {
        &self.office_name
    }

    /// Per-candidate tallies when disclosed
    #[inline]
    #[must_use]
    pub fn data(&self) -> Option<&[PulseRecord]> {
        self.data.as_deref()
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawAggregate {
    allowed: bool,
    total_votes: u64,
    #[serde(default)]
    office_name: String,
    #[serde(default)]
    data: Option<Vec<PulseRecord>>,
}

impl TryFrom<RawAggregate> for Aggregate {
    type Error = ModelError;

    fn try_from(raw: RawAggregate) -> Result<Self, Self::Error> {
        match (raw.allowed, raw.data) {
            (false, None) => Ok(Self::withheld(raw.office_name, raw.total_votes)),
            (false, Some(_)) => Err(ModelError::InconsistentAggregate(
                "withheld aggregate carries data".to_string(),
            )),
            (true, None) => Err(ModelError::InconsistentAggregate(
                "disclosed aggregate without data".to_string(),
            )),
            (true, Some(data)) => Self::disclosed(raw.office_name, raw.total_votes, data),
        }
    }
}

/// Aggregates for every office in one locality
pub type Pulse = BTreeMap<OfficeId, Aggregate>;
