//! Typed client for the voter pulse service
//!
//! Every call goes through [`TransportAdapter::request`] with an explicit
//! bound. The session token is attached as the `vb_session` cookie once
//! known.

use crate::error::TransportError;
use crate::transport::{Request, Response, TransportAdapter};
use parking_lot::RwLock;
use pulse_model::{
    Candidate, CandidateId, LocationUpdate, Office, OfficeId, Preference, PreferenceDraft, Pulse,
    SessionId, SessionInit, User, SESSION_COOKIE,
};
use serde::Serialize;
use std::time::Duration;

/// Service paths
pub mod paths {
    /// `POST` create or recover the anonymous session
    pub const SESSION_INIT: &str = "api/session/init";
    /// `POST` accept community standards
    pub const USER_STANDARDS: &str = "api/user/standards";
    /// `POST` set location
    pub const USER_LOCATION: &str = "api/user/location";
    /// `GET` offices
    pub const OFFICES: &str = "api/offices";
    /// `GET` candidates (filtered) or `candidates/{id}`
    pub const CANDIDATES: &str = "api/candidates";
    /// `POST` upsert preference
    pub const PREFERENCES: &str = "api/preferences";
    /// `GET` aggregates for a state
    pub const PULSE: &str = "api/pulse";
}

#[derive(Serialize)]
struct StandardsBody {
    accepted: bool,
}

/// Typed remote API
#[derive(Debug)]
pub struct RemoteApi {
    adapter: TransportAdapter,
    session: RwLock<Option<SessionId>>,
    request_timeout: Duration,
}

impl RemoteApi {
    /// Create client with a default bound for every call
    #[inline]
    #[must_use]
    pub fn new(adapter: TransportAdapter, request_timeout: Duration) -> Self {
        Self {
            adapter,
            session: RwLock::new(None),
            request_timeout,
        }
    }

    /// Current session token
    #[inline]
    #[must_use]
    pub fn session(&self) -> Option<SessionId> {
        self.session.read().clone()
    }

    /// Replace the session token (e.g. restored from disk)
    #[inline]
    pub fn set_session(&self, session: Option<SessionId>) {
        *self.session.write() = session;
    }

    /// Default per-call bound
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    fn authorized(&self, request: Request) -> Request {
        match self.session() {
            Some(session) => request.header("Cookie", format!("{SESSION_COOKIE}={session}")),
            None => request,
        }
    }

    async fn call(&self, request: Request, timeout: Duration) -> Result<Response, TransportError> {
        self.adapter.request(self.authorized(request), timeout).await
    }

    /// `POST session/init`; stores the returned token
    ///
    /// # Errors
    /// Any [`TransportError`]
    pub async fn init_session(&self, timeout: Duration) -> Result<SessionInit, TransportError> {
        let response = self.call(Request::post(paths::SESSION_INIT), timeout).await?;
        let init: SessionInit = response.decode()?;
        self.set_session(Some(init.session_id.clone()));
        Ok(init)
    }

    /// `POST user/standards`
    ///
    /// # Errors
    /// Any [`TransportError`]
    pub async fn accept_standards(&self) -> Result<User, TransportError> {
        let request = Request::post(paths::USER_STANDARDS).json(&StandardsBody { accepted: true })?;
        self.call(request, self.request_timeout).await?.decode()
    }

    /// `POST user/location`
    ///
    /// # Errors
    /// `Validation` for blank state/LGA, otherwise any [`TransportError`]
    pub async fn update_location(&self, update: &LocationUpdate) -> Result<User, TransportError> {
        update.validate()?;
        let request = Request::post(paths::USER_LOCATION).json(update)?;
        self.call(request, self.request_timeout).await?.decode()
    }

    /// `GET offices`
    ///
    /// # Errors
    /// Any [`TransportError`]
    pub async fn offices(&self) -> Result<Vec<Office>, TransportError> {
        self.call(Request::get(paths::OFFICES), self.request_timeout)
            .await?
            .decode()
    }

    /// `GET candidates?officeId&state&lga&ward`
    ///
    /// # Errors
    /// Any [`TransportError`]
    pub async fn candidates(
        &self,
        office_id: &OfficeId,
        state: &str,
        lga: &str,
        ward: Option<&str>,
    ) -> Result<Vec<Candidate>, TransportError> {
        let mut request = Request::get(paths::CANDIDATES)
            .query("officeId", office_id.as_str())
            .query("state", state)
            .query("lga", lga);
        if let Some(ward) = ward {
            request = request.query("ward", ward);
        }
        self.call(request, self.request_timeout).await?.decode()
    }

    /// `GET candidates/{id}`; `None` on 404
    ///
    /// # Errors
    /// Any [`TransportError`] other than a 404
    pub async fn candidate(&self, id: &CandidateId) -> Result<Option<Candidate>, TransportError> {
        let request = Request::get(format!("{}/{}", paths::CANDIDATES, id));
        match self.call(request, self.request_timeout).await {
            Ok(response) => response.decode().map(Some),
            Err(TransportError::Http { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// `POST preferences`
    ///
    /// # Errors
    /// `Validation` for blank ids, otherwise any [`TransportError`]
    pub async fn save_preference(
        &self,
        draft: &PreferenceDraft,
    ) -> Result<Preference, TransportError> {
        draft.validate()?;
        let request = Request::post(paths::PREFERENCES).json(draft)?;
        let mut saved: Preference = self.call(request, self.request_timeout).await?.decode()?;
        saved.provisional = false;
        Ok(saved)
    }

    /// `GET pulse?state=`
    ///
    /// # Errors
    /// Any [`TransportError`]
    pub async fn pulse(&self, state: &str) -> Result<Pulse, TransportError> {
        let request = Request::get(paths::PULSE).query("state", state);
        self.call(request, self.request_timeout).await?.decode()
    }
}
