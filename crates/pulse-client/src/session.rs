//! Session identity resolution
//!
//! [`SessionResolver::resolve`] never fails: it yields the server's user
//! when the backend answers within the resolve bound, otherwise the last
//! known local identity, otherwise a freshly synthesized offline identity.
//!
//! Concurrent calls share one in-flight attempt. The attempt runs as its own
//! task, so it completes and persists its result even when every caller has
//! stopped waiting.

use crate::storage::{read_json, write_json, KeyValueStore, StorageKeys};
use crate::sync::Synchronizer;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use pulse_model::{SessionId, User};
use pulse_remote::RemoteApi;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

type InFlight = Shared<BoxFuture<'static, User>>;

/// Memoized session resolution
pub struct SessionResolver {
    api: Arc<RemoteApi>,
    store: Arc<dyn KeyValueStore>,
    keys: StorageKeys,
    timeout: Duration,
    sync: Arc<Synchronizer>,
    in_flight: Mutex<Option<(u64, InFlight)>>,
    generation: AtomicU64,
    confirmed: AtomicBool,
    user_tx: watch::Sender<Option<User>>,
}

impl std::fmt::Debug for SessionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionResolver")
            .field("timeout", &self.timeout)
            .field("confirmed", &self.confirmed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl SessionResolver {
    /// Resolver over `api`, restoring the persisted session token and user
    #[must_use]
    pub fn new(
        api: Arc<RemoteApi>,
        store: Arc<dyn KeyValueStore>,
        keys: StorageKeys,
        timeout: Duration,
        sync: Arc<Synchronizer>,
    ) -> Self {
        let session = load_or_warn::<SessionId>(store.as_ref(), &keys.session());
        if session.is_some() {
            api.set_session(session);
        }
        let user = load_or_warn::<User>(store.as_ref(), &keys.user());
        let (user_tx, _) = watch::channel(user);

        Self {
            api,
            store,
            keys,
            timeout,
            sync,
            in_flight: Mutex::new(None),
            generation: AtomicU64::new(0),
            confirmed: AtomicBool::new(false),
            user_tx,
        }
    }

    /// Last known user without any network call
    #[must_use]
    pub fn current(&self) -> Option<User> {
        self.user_tx.borrow().clone()
    }

    /// Receiver notified on every identity change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<User>> {
        self.user_tx.subscribe()
    }

    /// Whether a server-confirmed identity was resolved in this process
    #[inline]
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.confirmed.load(Ordering::SeqCst)
    }

    /// Resolve the current identity
    ///
    /// With `force = false`, a server-confirmed identity already resolved in
    /// this process is returned as is; otherwise the in-flight attempt is
    /// joined or a new one started. With `force = true`, the in-flight
    /// attempt is joined if there is one, otherwise a new attempt starts.
    pub async fn resolve(self: &Arc<Self>, force: bool) -> User {
        let attempt = {
            let mut slot = self.in_flight.lock();
            if let Some((_, attempt)) = slot.as_ref() {
                attempt.clone()
            } else {
                if !force && self.is_confirmed() {
                    if let Some(user) = self.current() {
                        return user;
                    }
                }
                let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
                let attempt = self.start(generation);
                *slot = Some((generation, attempt.clone()));
                attempt
            }
        };
        attempt.await
    }

    fn start(self: &Arc<Self>, generation: u64) -> InFlight {
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let user = this.attempt().await;
            this.settle(generation);
            user
        });

        let fallback = Arc::clone(self);
        async move {
            match task.await {
                Ok(user) => user,
                Err(e) => {
                    tracing::warn!(error = %e, "session resolution task failed");
                    fallback.settle(generation);
                    fallback.fallback_user()
                }
            }
        }
        .boxed()
        .shared()
    }

    fn settle(&self, generation: u64) {
        let mut slot = self.in_flight.lock();
        if matches!(slot.as_ref(), Some((g, _)) if *g == generation) {
            *slot = None;
        }
    }

    async fn attempt(self: &Arc<Self>) -> User {
        let previous = self.current();

        let user = match self.api.init_session(self.timeout).await {
            Ok(init) => {
                self.persist(&self.keys.session(), &init.session_id);
                self.confirmed.store(true, Ordering::SeqCst);
                tracing::info!(user = %init.user.id, "session resolved");

                if let Some(offline) = previous.filter(|p| p.id.is_offline()) {
                    self.spawn_offline_reconcile(offline, init.user.clone());
                }
                init.user
            }
            Err(error) => {
                tracing::warn!(%error, "session resolution failed, using local identity");
                self.fallback_user()
            }
        };

        self.publish(user.clone());
        self.sync.spawn_drain();
        user
    }

    fn fallback_user(&self) -> User {
        self.current().unwrap_or_else(|| {
            let user = User::offline();
            tracing::info!(user = %user.id, "synthesized offline identity");
            user
        })
    }

    /// Persist and broadcast `user` as the current identity
    pub fn publish(&self, user: User) {
        self.persist(&self.keys.user(), &user);
        self.user_tx.send_replace(Some(user));
    }

    /// Forget the persisted identity and session token
    pub fn forget(&self) {
        for key in [self.keys.user(), self.keys.session()] {
            if let Err(e) = self.store.remove(&key) {
                tracing::warn!(%key, error = %e, "failed to remove identity key");
            }
        }
        self.api.set_session(None);
        self.confirmed.store(false, Ordering::SeqCst);
        self.user_tx.send_replace(None);
    }

    fn persist<T: serde::Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = write_json(self.store.as_ref(), key, value) {
            tracing::warn!(%key, error = %e, "failed to persist identity");
        }
    }

    /// Push profile fields set while offline that the server user lacks
    fn spawn_offline_reconcile(self: &Arc<Self>, offline: User, server: User) {
        let push_standards = offline.standards_accepted && !server.standards_accepted;
        let location = offline.location().filter(|_| !server.onboarded());
        if !push_standards && location.is_none() {
            return;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut latest = None;
            if push_standards {
                match this.api.accept_standards().await {
                    Ok(user) => latest = Some(user),
                    Err(e) => tracing::warn!(error = %e, "offline standards not pushed"),
                }
            }
            if let Some(location) = location {
                match this.api.update_location(&location).await {
                    Ok(user) => latest = Some(user),
                    Err(e) => tracing::warn!(error = %e, "offline location not pushed"),
                }
            }
            if let Some(user) = latest {
                tracing::info!(user = %user.id, "offline profile reconciled");
                this.publish(user);
            }
        });
    }
}

fn load_or_warn<T: serde::de::DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Option<T> {
    read_json(store, key).unwrap_or_else(|e| {
        tracing::warn!(%key, error = %e, "ignoring unreadable identity");
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbox::{MockPreferenceSink, SyncOutbox};
    use crate::preferences::LocalPreferenceStore;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use pulse_model::{SessionInit, UserId};
    use pulse_remote::{paths, Request, Response, Transport, TransportAdapter, TransportError};
    use std::sync::atomic::AtomicUsize;

    struct ScriptedTransport {
        delay: Duration,
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: Request) -> Result<Response, TransportError> {
            assert_eq!(request.path, paths::SESSION_INIT);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(TransportError::Network("down".into()));
            }
            Response::json(
                200,
                &SessionInit {
                    session_id: SessionId::new("s-1"),
                    user: User::new(UserId::new("u-1")),
                },
            )
        }
    }

    fn resolver(
        delay: Duration,
        fail: bool,
        store: Arc<dyn KeyValueStore>,
    ) -> (Arc<SessionResolver>, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport {
            delay,
            fail,
            calls: AtomicUsize::new(0),
        });
        let api = Arc::new(RemoteApi::new(
            TransportAdapter::new(transport.clone()),
            Duration::from_secs(5),
        ));
        let mut sink = MockPreferenceSink::new();
        sink.expect_submit().times(0);
        let sync = Arc::new(Synchronizer::new(
            Arc::new(SyncOutbox::new(store.clone(), "t.outbox")),
            Arc::new(LocalPreferenceStore::new(store.clone(), "t.preferences")),
            Arc::new(sink),
        ));
        let resolver = Arc::new(SessionResolver::new(
            api,
            store,
            StorageKeys::new("t"),
            Duration::from_millis(2500),
            sync,
        ));
        (resolver, transport)
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_calls_share_one_attempt() {
        let (resolver, transport) = resolver(Duration::from_millis(100), false, Arc::new(MemoryStore::new()));

        let (a, b, c) = tokio::join!(
            resolver.resolve(false),
            resolver.resolve(false),
            resolver.resolve(true)
        );
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.id.as_str(), "u-1");
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_identity_is_reused_unless_forced() {
        let (resolver, transport) = resolver(Duration::ZERO, false, Arc::new(MemoryStore::new()));

        resolver.resolve(false).await;
        resolver.resolve(false).await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

        resolver.resolve(true).await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_yields_offline_identity_within_bound() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let (resolver, _) = resolver(Duration::from_secs(60), false, store.clone());

        let started = tokio::time::Instant::now();
        let user = resolver.resolve(false).await;
        assert!(started.elapsed() <= Duration::from_millis(2600));
        assert!(user.id.is_offline());
        assert!(!user.onboarded());
        assert!(!user.standards_accepted);

        let persisted: User = read_json(store.as_ref(), "t.user").unwrap().unwrap();
        assert_eq!(persisted, user);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_reuses_last_known_identity() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let known = User::new(UserId::new("u-known"));
        write_json(store.as_ref(), "t.user", &known).unwrap();

        let (resolver, _) = resolver(Duration::ZERO, true, store);
        assert_eq!(resolver.current(), Some(known.clone()));
        assert_eq!(resolver.resolve(false).await, known);
        assert!(!resolver.is_confirmed());
    }

    #[tokio::test(start_paused = true)]
    async fn offline_identity_is_stable_across_attempts() {
        let (resolver, transport) = resolver(Duration::ZERO, true, Arc::new(MemoryStore::new()));
        let first = resolver.resolve(false).await;
        let second = resolver.resolve(false).await;
        assert_eq!(first.id, second.id);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn observers_see_resolution() {
        let (resolver, _) = resolver(Duration::ZERO, false, Arc::new(MemoryStore::new()));
        let mut rx = resolver.subscribe();
        assert!(rx.borrow().is_none());

        resolver.resolve(false).await;
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_ref().map(|u| u.id.as_str().to_string()), Some("u-1".to_string()));
    }
}
