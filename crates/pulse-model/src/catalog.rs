//! Offices and candidates (read-only reference data)

use crate::error::ModelError;
use crate::ids::{CandidateId, OfficeId};
use crate::user::User;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Geographic tier at which an office's candidates are partitioned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    /// Everyone sees the same candidates
    National,
    /// Partitioned by state
    State,
    /// Partitioned by state and LGA
    Lga,
    /// Partitioned by state, LGA and ward
    Ward,
}

impl Scope {
    /// Wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::National => "NATIONAL",
            Scope::State => "STATE",
            Scope::Lga => "LGA",
            Scope::Ward => "WARD",
        }
    }
}

impl FromStr for Scope {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NATIONAL" => Ok(Scope::National),
            "STATE" => Ok(Scope::State),
            "LGA" => Ok(Scope::Lga),
            "WARD" => Ok(Scope::Ward),
            other => Err(ModelError::UnknownScope(other.to_string())),
        }
    }
}

/// Elected office
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Office {
    /// Office ID
    pub id: OfficeId,
    /// Stable key (e.g. `GOVERNOR`)
    pub key: String,
    /// Display name
    pub name: String,
    /// Geographic scope
    pub scope: Scope,
}

impl Office {
    /// Create office
    #[inline]
    #[must_use]
    pub fn new(
        id: impl Into<OfficeId>,
        key: impl Into<String>,
        name: impl Into<String>,
        scope: Scope,
    ) -> Self {
        Self {
            id: id.into(),
            key: key.into(),
            name: name.into(),
            scope,
        }
    }
}

/// Candidate standing for an office
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Candidate ID
    pub id: CandidateId,
    /// Display name
    pub name: String,
    /// Party
    #[serde(default)]
    pub party: String,
    /// Office this candidate stands for
    pub office_id: OfficeId,
    /// State partition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// LGA partition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lga: Option<String>,
    /// Ward partition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ward: Option<String>,
    /// Verified by curators
    #[serde(default)]
    pub verified: bool,
}

impl Candidate {
    /// Create a national candidate
    #[inline]
    #[must_use]
    pub fn new(
        id: impl Into<CandidateId>,
        name: impl Into<String>,
        party: impl Into<String>,
        office_id: impl Into<OfficeId>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            party: party.into(),
            office_id: office_id.into(),
            state: None,
            lga: None,
            ward: None,
            verified: false,
        }
    }

    /// With state partition
    #[inline]
    #[must_use]
    pub fn in_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    /// With LGA partition
    #[inline]
    #[must_use]
    pub fn in_lga(mut self, lga: impl Into<String>) -> Self {
        self.lga = Some(lga.into());
        self
    }

    /// With ward partition
    #[inline]
    #[must_use]
    pub fn in_ward(mut self, ward: impl Into<String>) -> Self {
        self.ward = Some(ward.into());
        self
    }

    /// Whether this candidate is visible at a location under `scope`
    #[must_use]
    pub fn is_visible_at(
        &self,
        scope: Scope,
        state: &str,
        lga: &str,
        ward: Option<&str>,
    ) -> bool {
        let same_state = self.state.as_deref() == Some(state);
        let same_lga = self.lga.as_deref() == Some(lga);
        let same_ward = ward.is_some() && self.ward.as_deref() == ward;

        match scope {
            Scope::National => true,
            Scope::State => same_state,
            Scope::Lga => same_state && same_lga,
            Scope::Ward => same_state && same_lga && same_ward,
        }
    }

    /// Whether this candidate is visible to `user` under `scope`
    #[inline]
    #[must_use]
    pub fn is_visible_to(&self, scope: Scope, user: &User) -> bool {
        self.is_visible_at(scope, &user.state, &user.lga, user.ward.as_deref())
    }
}
