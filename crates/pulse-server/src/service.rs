//! Remote service semantics
//!
//! Transport-free: the HTTP routes and the in-process loopback used in
//! tests both call into [`PulseService`].

use crate::aggregate::AggregationEngine;
use crate::error::ServerError;
use crate::repository::PulseRepository;
use pulse_model::{
    Candidate, CandidateId, LocationUpdate, Office, OfficeId, Preference, PreferenceDraft, Pulse,
    SessionId, SessionInit, User,
};
use serde::Deserialize;
use std::sync::Arc;

/// Candidate listing filter (`GET candidates`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateQuery {
    /// Office
    pub office_id: OfficeId,
    /// Viewer state
    #[serde(default)]
    pub state: Option<String>,
    /// Viewer LGA
    #[serde(default)]
    pub lga: Option<String>,
    /// Viewer ward
    #[serde(default)]
    pub ward: Option<String>,
}

impl CandidateQuery {
    /// Query for an office with no location
    #[inline]
    #[must_use]
    pub fn new(office_id: impl Into<OfficeId>) -> Self {
        Self {
            office_id: office_id.into(),
            state: None,
            lga: None,
            ward: None,
        }
    }

    /// With viewer location
    #[inline]
    #[must_use]
    pub fn at(mut self, state: impl Into<String>, lga: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self.lga = Some(lga.into());
        self
    }

    /// With viewer ward
    #[inline]
    #[must_use]
    pub fn with_ward(mut self, ward: impl Into<String>) -> Self {
        self.ward = Some(ward.into());
        self
    }
}

/// Outcome of `session/init`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGrant {
    /// Token and user
    pub init: SessionInit,
    /// A new session was issued (cookie must be set)
    pub created: bool,
}

/// Voter pulse service
#[derive(Clone)]
pub struct PulseService {
    repo: Arc<dyn PulseRepository>,
    engine: AggregationEngine,
}

impl std::fmt::Debug for PulseService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulseService")
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}

impl PulseService {
    /// Service over a repository with the given disclosure threshold
    #[must_use]
    pub fn new(repo: Arc<dyn PulseRepository>, threshold: u64) -> Self {
        let engine = AggregationEngine::new(repo.clone()).with_threshold(threshold);
        Self { repo, engine }
    }

    /// Underlying repository
    #[inline]
    #[must_use]
    pub fn repository(&self) -> &Arc<dyn PulseRepository> {
        &self.repo
    }

    /// Aggregation engine
    #[inline]
    #[must_use]
    pub fn engine(&self) -> &AggregationEngine {
        &self.engine
    }

    /// Recover the user for a known session, otherwise issue a new session
    /// and user row
    ///
    /// # Errors
    /// Storage failures
    pub async fn init_session(
        &self,
        session: Option<SessionId>,
    ) -> Result<SessionGrant, ServerError> {
        if let Some(session_id) = session.filter(|s| !s.is_blank()) {
            if let Some(user) = self.repo.user_by_session(&session_id).await? {
                tracing::debug!(user = %user.id, "session recovered");
                return Ok(SessionGrant {
                    init: SessionInit { session_id, user },
                    created: false,
                });
            }
        }

        let session_id = SessionId::generate();
        let user = self.repo.create_user(session_id.clone()).await?;
        tracing::info!(user = %user.id, "session issued");
        Ok(SessionGrant {
            init: SessionInit { session_id, user },
            created: true,
        })
    }

    /// Mark community standards accepted
    ///
    /// # Errors
    /// `Unauthorized` without a known session
    pub async fn accept_standards(&self, session: Option<&SessionId>) -> Result<User, ServerError> {
        let session = session.ok_or_else(ServerError::session_missing)?;
        self.repo.accept_standards(session).await
    }

    /// Set location
    ///
    /// # Errors
    /// `Unauthorized` without a known session, `Validation` for a blank
    /// state or LGA
    pub async fn update_location(
        &self,
        session: Option<&SessionId>,
        update: &LocationUpdate,
    ) -> Result<User, ServerError> {
        let session = session.ok_or_else(ServerError::session_missing)?;
        update.validate()?;
        self.repo.update_location(session, update).await
    }

    /// Offices ordered by id
    ///
    /// # Errors
    /// Storage failures
    pub async fn offices(&self) -> Result<Vec<Office>, ServerError> {
        self.repo.offices().await
    }

    /// Candidates for an office visible at the query's location
    ///
    /// # Errors
    /// `NotFound` for an unknown office
    pub async fn candidates(&self, query: &CandidateQuery) -> Result<Vec<Candidate>, ServerError> {
        let office = self
            .repo
            .office(&query.office_id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("office {}", query.office_id)))?;

        let state = query.state.as_deref().unwrap_or_default();
        let lga = query.lga.as_deref().unwrap_or_default();
        let ward = query.ward.as_deref();

        Ok(self
            .repo
            .candidates_for(&office.id)
            .await?
            .into_iter()
            .filter(|c| c.is_visible_at(office.scope, state, lga, ward))
            .collect())
    }

    /// Candidate by id
    ///
    /// # Errors
    /// `NotFound` when absent
    pub async fn candidate(&self, id: &CandidateId) -> Result<Candidate, ServerError> {
        self.repo
            .candidate(id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("candidate {id}")))
    }

    /// Upsert the session user's preference for an office
    ///
    /// # Errors
    /// `Unauthorized` without a known session, `Validation` for a malformed
    /// draft or a candidate standing for another office, `NotFound` for an
    /// unknown office or candidate
    pub async fn save_preference(
        &self,
        session: Option<&SessionId>,
        draft: PreferenceDraft,
    ) -> Result<Preference, ServerError> {
        let session = session.ok_or_else(ServerError::session_missing)?;
        let user = self
            .repo
            .user_by_session(session)
            .await?
            .ok_or_else(|| ServerError::Unauthorized("user not found".to_string()))?;

        draft.validate()?;
        if self.repo.office(&draft.office_id).await?.is_none() {
            return Err(ServerError::NotFound(format!("office {}", draft.office_id)));
        }
        let candidate = self
            .repo
            .candidate(&draft.candidate_id)
            .await?
            .ok_or_else(|| ServerError::NotFound(format!("candidate {}", draft.candidate_id)))?;
        if candidate.office_id != draft.office_id {
            return Err(ServerError::Validation(format!(
                "candidate {} does not stand for office {}",
                candidate.id, draft.office_id
            )));
        }

        let saved = self.repo.upsert_preference(&user.id, draft).await?;
        tracing::debug!(user = %user.id, office = %saved.office_id, "preference saved");
        Ok(saved)
    }

    /// Aggregates for every office in a state
    ///
    /// # Errors
    /// `Validation` when the state is missing or blank
    pub async fn pulse(&self, state: Option<&str>) -> Result<Pulse, ServerError> {
        let state = state
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ServerError::Validation("state required".to_string()))?;
        self.engine.pulse(state).await
    }
}
