//! System of record
//!
//! [`PulseRepository`] is the storage seam. [`MemoryRepository`] keeps rows
//! in creation order: preferences live in an `IndexMap` keyed by
//! `(user, office)`, so an upsert overwrites in place and never reorders.

use crate::error::ServerError;
use async_trait::async_trait;
use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::RwLock;
use pulse_model::{
    Candidate, CandidateId, LocationUpdate, Office, OfficeId, Preference, PreferenceDraft,
    SessionId, User, UserId,
};
use std::collections::BTreeMap;

/// Storage operations used by the service and the aggregation engine
#[async_trait]
pub trait PulseRepository: Send + Sync {
    /// User bound to a session, if any
    async fn user_by_session(&self, session: &SessionId) -> Result<Option<User>, ServerError>;

    /// Create a fresh user bound to `session`
    async fn create_user(&self, session: SessionId) -> Result<User, ServerError>;

    /// Mark standards accepted
    async fn accept_standards(&self, session: &SessionId) -> Result<User, ServerError>;

    /// Set location fields
    async fn update_location(
        &self,
        session: &SessionId,
        update: &LocationUpdate,
    ) -> Result<User, ServerError>;

    /// All offices ordered by id
    async fn offices(&self) -> Result<Vec<Office>, ServerError>;

    /// Office by id
    async fn office(&self, id: &OfficeId) -> Result<Option<Office>, ServerError>;

    /// Insert or replace an office
    async fn upsert_office(&self, office: Office) -> Result<(), ServerError>;

    /// Insert or replace a candidate
    async fn upsert_candidate(&self, candidate: Candidate) -> Result<(), ServerError>;

    /// Candidates standing for an office, in insertion order
    async fn candidates_for(&self, office_id: &OfficeId) -> Result<Vec<Candidate>, ServerError>;

    /// Candidate by id
    async fn candidate(&self, id: &CandidateId) -> Result<Option<Candidate>, ServerError>;

    /// Upsert keyed on `(user, office)`; an update keeps id and creation time
    async fn upsert_preference(
        &self,
        user_id: &UserId,
        draft: PreferenceDraft,
    ) -> Result<Preference, ServerError>;

    /// Preferences for `office_id` whose owner lives in `state`, in creation
    /// order
    async fn preferences_in(
        &self,
        office_id: &OfficeId,
        state: &str,
    ) -> Result<Vec<Preference>, ServerError>;
}

#[derive(Debug, Default)]
struct Catalog {
    offices: BTreeMap<OfficeId, Office>,
    candidates: IndexMap<CandidateId, Candidate>,
}

/// In-memory repository
#[derive(Debug, Default)]
pub struct MemoryRepository {
    sessions: DashMap<SessionId, UserId>,
    users: DashMap<UserId, User>,
    catalog: RwLock<Catalog>,
    preferences: RwLock<IndexMap<(UserId, OfficeId), Preference>>,
}

impl MemoryRepository {
    /// Empty repository
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user directly (fixtures and imports)
    pub fn insert_user(&self, session: SessionId, user: User) {
        self.sessions.insert(session, user.id.clone());
        self.users.insert(user.id.clone(), user);
    }

    /// Number of stored preferences
    #[must_use]
    pub fn preference_count(&self) -> usize {
        self.preferences.read().len()
    }

    fn with_user<F>(&self, session: &SessionId, f: F) -> Result<User, ServerError>
    where
        F: FnOnce(&mut User),
    {
        let user_id = self
            .sessions
            .get(session)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServerError::Unauthorized("unknown session".to_string()))?;
        let mut user = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| ServerError::NotFound("user".to_string()))?;
        f(user.value_mut());
        Ok(user.value().clone())
    }
}

#[async_trait]
impl PulseRepository for MemoryRepository {
    async fn user_by_session(&self, session: &SessionId) -> Result<Option<User>, ServerError> {
        let Some(user_id) = self.sessions.get(session).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        Ok(self.users.get(&user_id).map(|u| u.value().clone()))
    }

    async fn create_user(&self, session: SessionId) -> Result<User, ServerError> {
        let user = User::new(UserId::generate());
        self.insert_user(session, user.clone());
        Ok(user)
    }

    async fn accept_standards(&self, session: &SessionId) -> Result<User, ServerError> {
        self.with_user(session, |user| user.standards_accepted = true)
    }

    async fn update_location(
        &self,
        session: &SessionId,
        update: &LocationUpdate,
    ) -> Result<User, ServerError> {
        self.with_user(session, |user| user.apply_location(update))
    }

    async fn offices(&self) -> Result<Vec<Office>, ServerError> {
        Ok(self.catalog.read().offices.values().cloned().collect())
    }

    async fn office(&self, id: &OfficeId) -> Result<Option<Office>, ServerError> {
        Ok(self.catalog.read().offices.get(id).cloned())
    }

    async fn upsert_office(&self, office: Office) -> Result<(), ServerError> {
        self.catalog.write().offices.insert(office.id.clone(), office);
        Ok(())
    }

    async fn upsert_candidate(&self, candidate: Candidate) -> Result<(), ServerError> {
        self.catalog
            .write()
            .candidates
            .insert(candidate.id.clone(), candidate);
        Ok(())
    }

    async fn candidates_for(&self, office_id: &OfficeId) -> Result<Vec<Candidate>, ServerError> {
        Ok(self
            .catalog
            .read()
            .candidates
            .values()
            .filter(|c| &c.office_id == office_id)
            .cloned()
            .collect())
    }

    async fn candidate(&self, id: &CandidateId) -> Result<Option<Candidate>, ServerError> {
        Ok(self.catalog.read().candidates.get(id).cloned())
    }

    async fn upsert_preference(
        &self,
        user_id: &UserId,
        draft: PreferenceDraft,
    ) -> Result<Preference, ServerError> {
        let mut rows = self.preferences.write();
        let key = (user_id.clone(), draft.office_id.clone());
        let row = rows
            .entry(key)
            .and_modify(|existing| {
                existing.candidate_id = draft.candidate_id.clone();
                existing.reasons = draft.reasons.clone();
            })
            .or_insert_with(|| Preference::confirmed(user_id.clone(), draft));
        Ok(row.clone())
    }

    async fn preferences_in(
        &self,
        office_id: &OfficeId,
        state: &str,
    ) -> Result<Vec<Preference>, ServerError> {
        let rows = self.preferences.read();
        Ok(rows
            .values()
            .filter(|p| &p.office_id == office_id)
            .filter(|p| {
                self.users
                    .get(&p.user_id)
                    .is_some_and(|user| user.state == state)
            })
            .cloned()
            .collect())
    }
}
