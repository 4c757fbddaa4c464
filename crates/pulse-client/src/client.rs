//! Client facade
//!
//! The single entry point UI code talks to. Reads degrade to cached or local
//! data when the backend is unreachable; saves only fail on local
//! validation.

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::outbox::{DrainReport, SyncOutbox};
use crate::preferences::LocalPreferenceStore;
use crate::session::SessionResolver;
use crate::storage::{read_json, write_json, KeyValueStore, StorageKeys};
use crate::sync::{Connectivity, SubmitOutcome, Synchronizer};
use parking_lot::Mutex;
use pulse_model::{
    Candidate, CandidateId, LocationUpdate, Office, OfficeId, OutboxItem, Preference,
    PreferenceDraft, Pulse, User,
};
use pulse_remote::{RemoteApi, Transport, TransportAdapter};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Result of a local save
#[derive(Debug)]
pub struct SaveReceipt {
    /// Provisional record, already visible through [`PulseClient::preferences`]
    pub preference: Preference,
    /// Outcome of the remote confirmation attempt
    pub confirmation: JoinHandle<Result<SubmitOutcome, ClientError>>,
}

/// Voter pulse client core
#[derive(Clone)]
pub struct PulseClient {
    config: ClientConfig,
    keys: StorageKeys,
    store: Arc<dyn KeyValueStore>,
    api: Arc<RemoteApi>,
    preferences: Arc<LocalPreferenceStore>,
    sync: Arc<Synchronizer>,
    resolver: Arc<SessionResolver>,
    save_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for PulseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PulseClient")
            .field("config", &self.config)
            .field("sync", &self.sync)
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl PulseClient {
    /// Client over `transport`, persisting into `store`
    ///
    /// Restores the persisted session token, user, preferences and outbox.
    /// Call [`PulseClient::start`] to resolve the session and drain.
    #[must_use]
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let keys = StorageKeys::new(config.storage_namespace.clone());
        let api = Arc::new(RemoteApi::new(
            TransportAdapter::new(transport),
            config.request_timeout,
        ));
        let preferences = Arc::new(LocalPreferenceStore::new(store.clone(), keys.preferences()));
        let outbox = Arc::new(SyncOutbox::new(store.clone(), keys.outbox()));
        let sync = Arc::new(Synchronizer::new(outbox, preferences.clone(), api.clone()));
        let resolver = Arc::new(SessionResolver::new(
            api.clone(),
            store.clone(),
            keys.clone(),
            config.resolve_timeout,
            sync.clone(),
        ));

        Self {
            config,
            keys,
            store,
            api,
            preferences,
            sync,
            resolver,
            save_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// App start: resolve the session (which also drains the outbox)
    pub async fn start(&self) -> User {
        tracing::info!(version = crate::VERSION, "pulse client starting");
        self.resolver.resolve(false).await
    }

    /// Current identity; only resolves when no identity is known yet
    ///
    /// A known identity, offline or not, is returned without a network
    /// call. Re-resolution happens at [`PulseClient::start`], on
    /// [`PulseClient::refresh_user`] and on reconnect.
    pub async fn user(&self) -> User {
        match self.resolver.current() {
            Some(user) => user,
            None => self.resolver.resolve(false).await,
        }
    }

    /// Re-resolve the identity against the backend
    pub async fn refresh_user(&self) -> User {
        self.resolver.resolve(true).await
    }

    /// Last known identity without any network call
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.resolver.current()
    }

    /// Identity change notifications
    #[must_use]
    pub fn subscribe_user(&self) -> watch::Receiver<Option<User>> {
        self.resolver.subscribe()
    }

    /// Host connectivity report
    ///
    /// Coming back online drains the outbox. Without a server-confirmed
    /// identity the session is re-resolved first, since queued items need the
    /// session cookie; the resolution drains once it settles.
    pub fn set_connectivity(&self, connectivity: Connectivity) {
        if !self.sync.set_connectivity(connectivity) {
            return;
        }
        if self.resolver.is_confirmed() {
            self.sync.spawn_drain();
        } else {
            tracing::info!("reconnected without a confirmed session, resolving");
            let resolver = Arc::clone(&self.resolver);
            tokio::spawn(async move {
                resolver.resolve(true).await;
            });
        }
    }

    /// Whether remote attempts are made
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.sync.is_online()
    }

    /// Save a preference locally and queue its delivery
    ///
    /// The provisional record is visible immediately. The outbox item is
    /// written before any remote attempt; when online a confirmation runs in
    /// the background and its outcome is available through the receipt.
    ///
    /// # Errors
    /// `Validation` for blank ids; storage failures
    pub async fn save(&self, draft: PreferenceDraft) -> Result<SaveReceipt, ClientError> {
        draft.validate()?;
        let user = self.user().await;

        let preference = {
            let _guard = self.save_lock.lock();
            let preference = self.preferences.commit(&user.id, draft)?;
            self.sync
                .outbox()
                .enqueue(OutboxItem::for_preference(&preference))?;
            preference
        };

        let confirmation = self.sync.spawn_confirm(preference.id.clone());
        Ok(SaveReceipt {
            preference,
            confirmation,
        })
    }

    /// Local preferences in commit order; empty if local storage is unreadable
    #[must_use]
    pub fn preferences(&self) -> Vec<Preference> {
        self.preferences.list().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "local preferences unreadable");
            Vec::new()
        })
    }

    /// Local preference for one office
    #[must_use]
    pub fn preference(&self, office_id: &OfficeId) -> Option<Preference> {
        self.preferences.current(office_id).ok().flatten()
    }

    /// Items awaiting delivery
    #[must_use]
    pub fn pending(&self) -> Vec<OutboxItem> {
        self.sync.outbox().items().unwrap_or_default()
    }

    /// Attempt every queued item once
    ///
    /// # Errors
    /// Storage failures
    pub async fn drain(&self) -> Result<DrainReport, ClientError> {
        self.sync.drain().await
    }

    /// Accept community standards: locally first, then best effort remote
    pub async fn accept_standards(&self) -> User {
        let mut user = self.user().await;
        user.standards_accepted = true;
        self.resolver.publish(user.clone());

        if self.remote_profile_enabled(&user) {
            match self.api.accept_standards().await {
                Ok(server) => {
                    self.resolver.publish(server.clone());
                    return server;
                }
                Err(e) => tracing::warn!(error = %e, "standards kept locally"),
            }
        }
        user
    }

    /// Set location: locally first, then best effort remote
    ///
    /// # Errors
    /// `Validation` for a blank state or LGA
    pub async fn update_location(&self, update: LocationUpdate) -> Result<User, ClientError> {
        update.validate()?;
        let mut user = self.user().await;
        user.apply_location(&update);
        self.resolver.publish(user.clone());

        if self.remote_profile_enabled(&user) {
            match self.api.update_location(&update).await {
                Ok(server) => {
                    self.resolver.publish(server.clone());
                    return Ok(server);
                }
                Err(e) => tracing::warn!(error = %e, "location kept locally"),
            }
        }
        Ok(user)
    }

    fn remote_profile_enabled(&self, user: &User) -> bool {
        self.is_online() && !user.id.is_offline() && self.api.session().is_some()
    }

    /// Offices, falling back to the last fetched list
    pub async fn offices(&self) -> Vec<Office> {
        let key = self.keys.offices();
        match self.api.offices().await {
            Ok(offices) => {
                self.cache(&key, &offices);
                offices
            }
            Err(e) => {
                tracing::warn!(error = %e, "offices served from cache");
                self.cached(&key).unwrap_or_default()
            }
        }
    }

    /// Candidates for an office visible to the current user, falling back
    /// to the cache filtered locally
    pub async fn candidates(&self, office_id: &OfficeId) -> Vec<Candidate> {
        let user = self.user().await;
        let key = self.keys.candidates(office_id);

        match self
            .api
            .candidates(office_id, &user.state, &user.lga, user.ward.as_deref())
            .await
        {
            Ok(candidates) => {
                self.merge_candidates(&key, &candidates);
                candidates
            }
            Err(e) => {
                tracing::warn!(office = %office_id, error = %e, "candidates served from cache");
                let cached: Vec<Candidate> = self.cached(&key).unwrap_or_default();
                let scope = self
                    .cached::<Vec<Office>>(&self.keys.offices())
                    .unwrap_or_default()
                    .into_iter()
                    .find(|o| &o.id == office_id)
                    .map(|o| o.scope);
                match scope {
                    Some(scope) => cached
                        .into_iter()
                        .filter(|c| c.is_visible_to(scope, &user))
                        .collect(),
                    None => cached,
                }
            }
        }
    }

    /// Candidate by id, from the backend or the cache
    pub async fn candidate(&self, id: &CandidateId) -> Option<Candidate> {
        match self.api.candidate(id).await {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!(candidate = %id, error = %e, "candidate served from cache");
                let offices: Vec<Office> = self.cached(&self.keys.offices()).unwrap_or_default();
                offices.iter().find_map(|office| {
                    self.cached::<Vec<Candidate>>(&self.keys.candidates(&office.id))
                        .unwrap_or_default()
                        .into_iter()
                        .find(|c| &c.id == id)
                })
            }
        }
    }

    /// Aggregates for the user's state; empty when the user has no state or
    /// the read fails
    pub async fn pulse(&self) -> Pulse {
        let user = self.user().await;
        if user.state.trim().is_empty() {
            return Pulse::new();
        }
        self.api.pulse(&user.state).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "pulse unavailable");
            Pulse::new()
        })
    }

    /// Forget local preferences, queued items and the identity
    ///
    /// # Errors
    /// Storage failures
    pub fn clear(&self) -> Result<(), ClientError> {
        let _guard = self.save_lock.lock();
        self.preferences.clear()?;
        self.sync.outbox().clear()?;
        self.resolver.forget();
        Ok(())
    }

    fn cache<T: serde::Serialize + ?Sized>(&self, key: &str, value: &T) {
        if let Err(e) = write_json(self.store.as_ref(), key, value) {
            tracing::warn!(%key, error = %e, "reference cache write failed");
        }
    }

    fn cached<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        read_json(self.store.as_ref(), key).ok().flatten()
    }

    fn merge_candidates(&self, key: &str, fresh: &[Candidate]) {
        let mut merged: Vec<Candidate> = self.cached(key).unwrap_or_default();
        merged.retain(|c| fresh.iter().all(|f| f.id != c.id));
        merged.extend_from_slice(fresh);
        self.cache(key, &merged);
    }
}
