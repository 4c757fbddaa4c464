//! Delivery of local saves to the remote service
//!
//! Ties the outbox to the local preference store: every confirmation,
//! whether from the immediate attempt after a save or from a drain, is
//! reconciled into the local list.

use crate::error::ClientError;
use crate::outbox::{Delivery, DrainReport, PreferenceSink, SyncOutbox};
use crate::preferences::LocalPreferenceStore;
use pulse_model::{Preference, PreferenceId};
use pulse_remote::TransportError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Network reachability as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Connectivity {
    /// Reachable
    Online,
    /// Unreachable; saves are queued without a remote attempt
    Offline,
}

/// Outcome of confirming one save
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Delivered and reconciled into the local list
    Confirmed(Preference),
    /// Delivery failed; the item stays queued with the error recorded
    Failed(TransportError),
    /// A newer save for the same office replaced this one
    Superseded,
    /// Not attempted because the device is offline; the item stays queued
    Deferred,
}

impl SubmitOutcome {
    /// Server record, when confirmed
    #[must_use]
    pub fn confirmed(&self) -> Option<&Preference> {
        match self {
            Self::Confirmed(preference) => Some(preference),
            _ => None,
        }
    }
}

impl From<Delivery> for SubmitOutcome {
    fn from(delivery: Delivery) -> Self {
        match delivery {
            Delivery::Confirmed(preference) => Self::Confirmed(preference),
            Delivery::Failed(error) => Self::Failed(error),
            Delivery::Superseded => Self::Superseded,
        }
    }
}

/// Outbox delivery with local reconciliation
pub struct Synchronizer {
    outbox: Arc<SyncOutbox>,
    preferences: Arc<LocalPreferenceStore>,
    sink: Arc<dyn PreferenceSink>,
    online: AtomicBool,
}

impl std::fmt::Debug for Synchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("outbox", &self.outbox)
            .field("online", &self.is_online())
            .finish_non_exhaustive()
    }
}

impl Synchronizer {
    /// Start online
    #[must_use]
    pub fn new(
        outbox: Arc<SyncOutbox>,
        preferences: Arc<LocalPreferenceStore>,
        sink: Arc<dyn PreferenceSink>,
    ) -> Self {
        Self {
            outbox,
            preferences,
            sink,
            online: AtomicBool::new(true),
        }
    }

    /// Outbox
    #[inline]
    #[must_use]
    pub fn outbox(&self) -> &Arc<SyncOutbox> {
        &self.outbox
    }

    /// Whether remote attempts are made
    #[inline]
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Record connectivity; returns `true` on an offline to online
    /// transition, after which the caller is expected to drain
    #[must_use = "a reconnect should trigger a drain"]
    pub fn set_connectivity(&self, connectivity: Connectivity) -> bool {
        let online = connectivity == Connectivity::Online;
        let was_online = self.online.swap(online, Ordering::SeqCst);
        if online && !was_online {
            tracing::info!("back online");
        } else if !online && was_online {
            tracing::info!("offline, saves will be queued");
        }
        online && !was_online
    }

    /// Deliver the item queued under `local_id` and reconcile the result
    ///
    /// # Errors
    /// Storage failures
    pub async fn confirm(&self, local_id: &PreferenceId) -> Result<SubmitOutcome, ClientError> {
        if !self.is_online() {
            return Ok(SubmitOutcome::Deferred);
        }
        let delivery = self.outbox.submit(self.sink.as_ref(), local_id).await?;
        if let Delivery::Confirmed(preference) = &delivery {
            self.preferences.reconcile(local_id, preference.clone())?;
        }
        Ok(delivery.into())
    }

    /// Attempt every queued item once and reconcile confirmations
    ///
    /// # Errors
    /// Storage failures
    pub async fn drain(&self) -> Result<DrainReport, ClientError> {
        if !self.is_online() {
            return Ok(DrainReport::skipped());
        }
        let report = self.outbox.drain(self.sink.as_ref()).await?;
        for confirmation in &report.confirmations {
            self.preferences
                .reconcile(&confirmation.local_id, confirmation.preference.clone())?;
        }
        Ok(report)
    }

    /// Fire-and-forget [`Synchronizer::confirm`]
    pub fn spawn_confirm(
        self: &Arc<Self>,
        local_id: PreferenceId,
    ) -> JoinHandle<Result<SubmitOutcome, ClientError>> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.confirm(&local_id).await })
    }

    /// Fire-and-forget [`Synchronizer::drain`]
    pub fn spawn_drain(self: &Arc<Self>) -> JoinHandle<DrainReport> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.drain().await.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "outbox drain failed");
                DrainReport::skipped()
            })
        })
    }
}
