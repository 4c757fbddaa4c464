//! Testing utilities for the voter pulse workspace
//!
//! [`LoopbackTransport`] routes client requests straight into a
//! [`PulseService`] without sockets, and can simulate an unreachable
//! backend, slow responses or HTTP failures while counting what reached the
//! service.

#![allow(missing_docs)]

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use pulse_model::{
    CandidateId, LocationUpdate, PreferenceDraft, SessionId, DISCLOSURE_THRESHOLD, SESSION_COOKIE,
};
use pulse_remote::{paths, Method, Request, Response, Transport, TransportAdapter, TransportError};
use pulse_server::{seed, CandidateQuery, MemoryRepository, PulseService, ServerError};
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Seeded in-memory service with the default threshold
pub async fn seeded_service() -> Arc<PulseService> {
    let repo = Arc::new(MemoryRepository::new());
    seed::seed_catalog(&*repo).await.unwrap();
    Arc::new(PulseService::new(repo, DISCLOSURE_THRESHOLD))
}

/// Register `n` fresh users in `state` who each pick `candidate` for `office`
pub async fn cast_votes(
    service: &PulseService,
    state: &str,
    office: &str,
    candidate: &str,
    n: usize,
) {
    for _ in 0..n {
        let grant = service.init_session(None).await.unwrap();
        let session = Some(&grant.init.session_id);
        service
            .update_location(session, &LocationUpdate::new(state, "Ikeja"))
            .await
            .unwrap();
        service
            .save_preference(session, PreferenceDraft::new(office, candidate))
            .await
            .unwrap();
    }
}

/// Lagos / Ikeja location
pub fn lagos() -> LocationUpdate {
    LocationUpdate::new("Lagos", "Ikeja")
}

/// In-process transport with fault injection
#[derive(Debug)]
pub struct LoopbackTransport {
    service: Arc<PulseService>,
    offline: AtomicBool,
    delay: Mutex<Option<Duration>>,
    failures: DashMap<String, u16>,
    attempts: DashMap<String, usize>,
    served: DashMap<String, usize>,
    delivered: Mutex<Vec<PreferenceDraft>>,
}

impl LoopbackTransport {
    /// Loopback over `service`
    pub fn new(service: Arc<PulseService>) -> Arc<Self> {
        Arc::new(Self {
            service,
            offline: AtomicBool::new(false),
            delay: Mutex::new(None),
            failures: DashMap::new(),
            attempts: DashMap::new(),
            served: DashMap::new(),
            delivered: Mutex::new(Vec::new()),
        })
    }

    /// Adapter over this transport
    pub fn adapter(self: &Arc<Self>) -> TransportAdapter {
        TransportAdapter::new(self.clone())
    }

    /// Backing service
    pub fn service(&self) -> &Arc<PulseService> {
        &self.service
    }

    /// Fail every request with a network error while set
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Delay every request before it reaches the service
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock() = delay;
    }

    /// Answer requests for `path` with `status` instead of serving them
    pub fn fail_path(&self, path: &str, status: u16) {
        self.failures.insert(path.to_string(), status);
    }

    /// Stop failing requests
    pub fn clear_failures(&self) {
        self.failures.clear();
    }

    /// Requests sent for `path`, including failed ones
    pub fn attempts(&self, path: &str) -> usize {
        self.attempts.get(path).map_or(0, |n| *n)
    }

    /// Requests for `path` that reached the service
    pub fn served(&self, path: &str) -> usize {
        self.served.get(path).map_or(0, |n| *n)
    }

    /// Preference payloads that reached the service, in arrival order
    pub fn delivered(&self) -> Vec<PreferenceDraft> {
        self.delivered.lock().clone()
    }

    async fn dispatch(&self, request: &Request) -> Result<Response, ServerError> {
        let session = session_of(request);
        let service = &self.service;

        match (request.method, request.path.as_str()) {
            (Method::Post, paths::SESSION_INIT) => {
                let grant = service.init_session(session).await?;
                reply(&grant.init)
            }
            (Method::Post, paths::USER_STANDARDS) => {
                reply(&service.accept_standards(session.as_ref()).await?)
            }
            (Method::Post, paths::USER_LOCATION) => {
                let update: LocationUpdate = body_of(request)?;
                reply(&service.update_location(session.as_ref(), &update).await?)
            }
            (Method::Get, paths::OFFICES) => reply(&service.offices().await?),
            (Method::Get, paths::CANDIDATES) => {
                let office_id = request
                    .query_value("officeId")
                    .ok_or_else(|| ServerError::Validation("officeId required".to_string()))?;
                let query = CandidateQuery {
                    office_id: office_id.into(),
                    state: request.query_value("state").map(str::to_string),
                    lga: request.query_value("lga").map(str::to_string),
                    ward: request.query_value("ward").map(str::to_string),
                };
                reply(&service.candidates(&query).await?)
            }
            (Method::Get, path) if path.starts_with(paths::CANDIDATES) => {
                let id = path
                    .trim_start_matches(paths::CANDIDATES)
                    .trim_start_matches('/');
                reply(&service.candidate(&CandidateId::new(id)).await?)
            }
            (Method::Post, paths::PREFERENCES) => {
                let draft: PreferenceDraft = body_of(request)?;
                self.delivered.lock().push(draft.clone());
                reply(&service.save_preference(session.as_ref(), draft).await?)
            }
            (Method::Get, paths::PULSE) => reply(&service.pulse(request.query_value("state")).await?),
            _ => Err(ServerError::NotFound(format!("route {}", request.target()))),
        }
    }
}

fn session_of(request: &Request) -> Option<SessionId> {
    let cookies = request.header_value("cookie")?;
    cookies.split(';').find_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| SessionId::new(value))
    })
}

fn body_of<T: serde::de::DeserializeOwned>(request: &Request) -> Result<T, ServerError> {
    let body = request
        .body
        .clone()
        .ok_or_else(|| ServerError::Validation("body required".to_string()))?;
    serde_json::from_value(body).map_err(|e| ServerError::Validation(e.to_string()))
}

fn reply<T: serde::Serialize>(body: &T) -> Result<Response, ServerError> {
    Response::json(200, body).map_err(|e| ServerError::Internal(e.to_string()))
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, request: Request) -> Result<Response, TransportError> {
        *self.attempts.entry(request.path.clone()).or_insert(0) += 1;

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(TransportError::Network("offline".to_string()));
        }
        if let Some(status) = self.failures.get(&request.path).map(|s| *s) {
            return Response::json(status, &json!({ "error": "injected failure" }));
        }

        *self.served.entry(request.path.clone()).or_insert(0) += 1;
        tracing::debug!(target = %request.target(), "loopback request");
        match self.dispatch(&request).await {
            Ok(response) => Ok(response),
            Err(e) => Response::json(e.status(), &json!({ "error": e.to_string() })),
        }
    }
}
