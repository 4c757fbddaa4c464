//! Durable sync outbox
//!
//! Every save is written here before any remote attempt (write-ahead), so a
//! crash between commit and confirmation never loses the write. The list
//! holds at most one item per office; a newer save replaces the older item,
//! so a superseded save can never be delivered after the one that replaced
//! it.
//!
//! Remote preference writes pass through a single async write lane. Before
//! each submission the item is re-read under the lane: if it is no longer
//! queued under the same local id it is skipped. Together these give each
//! queued item exactly one successful delivery.

use crate::error::StorageError;
use crate::storage::{read_json, write_json, KeyValueStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use pulse_model::{OutboxItem, Preference, PreferenceDraft, PreferenceId};
use pulse_remote::{RemoteApi, TransportError};
use std::sync::Arc;

/// Remote destination for preference writes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PreferenceSink: Send + Sync {
    /// Deliver one draft, returning the server record
    async fn submit(&self, draft: &PreferenceDraft) -> Result<Preference, TransportError>;
}

#[async_trait]
impl PreferenceSink for RemoteApi {
    async fn submit(&self, draft: &PreferenceDraft) -> Result<Preference, TransportError> {
        self.save_preference(draft).await
    }
}

/// Result of one remote attempt for a queued item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Delivered; the item was removed
    Confirmed(Preference),
    /// Delivery failed; the item stays queued with the error recorded
    Failed(TransportError),
    /// The item is no longer queued under this local id (replaced by a
    /// newer save or already delivered)
    Superseded,
}

impl Delivery {
    /// Server record, when confirmed
    #[must_use]
    pub fn confirmed(&self) -> Option<&Preference> {
        match self {
            Self::Confirmed(preference) => Some(preference),
            _ => None,
        }
    }
}

/// Local record confirmed during a drain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    /// Provisional id the item carried
    pub local_id: PreferenceId,
    /// Server record
    pub preference: Preference,
}

/// Summary of one drain pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Another drain was running, or the device is offline; nothing attempted
    pub skipped: bool,
    /// Remote attempts made
    pub attempted: usize,
    /// Delivered items
    pub confirmations: Vec<Confirmation>,
    /// Items that failed and stay queued
    pub failed: usize,
    /// Snapshot items no longer queued when their turn came
    pub superseded: usize,
    /// Items still queued after the pass
    pub remaining: usize,
}

impl DrainReport {
    /// Report for a pass that did nothing
    #[inline]
    #[must_use]
    pub fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// Persisted outbox with a single remote write lane
pub struct SyncOutbox {
    store: Arc<dyn KeyValueStore>,
    key: String,
    list_lock: Mutex<()>,
    lane: tokio::sync::Mutex<()>,
    draining: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for SyncOutbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOutbox")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl SyncOutbox {
    /// Outbox persisted under `key`
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            list_lock: Mutex::new(()),
            lane: tokio::sync::Mutex::new(()),
            draining: tokio::sync::Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Vec<OutboxItem>, StorageError> {
        Ok(read_json(self.store.as_ref(), &self.key)?.unwrap_or_default())
    }

    fn persist(&self, items: &[OutboxItem]) -> Result<(), StorageError> {
        if items.is_empty() {
            self.store.remove(&self.key)
        } else {
            write_json(self.store.as_ref(), &self.key, items)
        }
    }

    fn update<R>(
        &self,
        f: impl FnOnce(&mut Vec<OutboxItem>) -> R,
    ) -> Result<R, StorageError> {
        let _guard = self.list_lock.lock();
        let mut items = self.load()?;
        let result = f(&mut items);
        self.persist(&items)?;
        Ok(result)
    }

    /// Queue an item, replacing any item for the same office
    ///
    /// # Errors
    /// Storage failures
    pub fn enqueue(&self, item: OutboxItem) -> Result<(), StorageError> {
        let office = item.office_id().clone();
        let local_id = item.local_id.clone();
        let replaced = self.update(|items| {
            let before = items.len();
            items.retain(|queued| queued.office_id() != &office);
            items.push(item);
            before + 1 - items.len()
        })?;
        tracing::debug!(%office, %local_id, replaced, "outbox item queued");
        Ok(())
    }

    /// Queued items in insertion order
    ///
    /// # Errors
    /// Storage failures
    pub fn items(&self) -> Result<Vec<OutboxItem>, StorageError> {
        let _guard = self.list_lock.lock();
        self.load()
    }

    /// Number of queued items
    ///
    /// # Errors
    /// Storage failures
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.items()?.len())
    }

    /// Whether nothing is queued
    ///
    /// # Errors
    /// Storage failures
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.items()?.is_empty())
    }

    /// Drop every queued item
    ///
    /// # Errors
    /// Storage failures
    pub fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.list_lock.lock();
        self.store.remove(&self.key)
    }

    fn queued(&self, local_id: &PreferenceId) -> Result<Option<OutboxItem>, StorageError> {
        Ok(self.items()?.into_iter().find(|i| &i.local_id == local_id))
    }

    fn ack(&self, local_id: &PreferenceId) -> Result<(), StorageError> {
        self.update(|items| items.retain(|i| &i.local_id != local_id))
    }

    fn record_failure(&self, local_id: &PreferenceId, error: &TransportError) -> Result<(), StorageError> {
        self.update(|items| {
            if let Some(item) = items.iter_mut().find(|i| &i.local_id == local_id) {
                item.attempts += 1;
                item.last_error = Some(error.to_string());
            }
        })
    }

    /// Deliver the item queued under `local_id`, through the write lane
    ///
    /// # Errors
    /// Storage failures; remote failures are reported in the outcome
    pub async fn submit(
        &self,
        sink: &dyn PreferenceSink,
        local_id: &PreferenceId,
    ) -> Result<Delivery, StorageError> {
        let _lane = self.lane.lock().await;

        let Some(item) = self.queued(local_id)? else {
            return Ok(Delivery::Superseded);
        };

        match sink.submit(&item.draft).await {
            Ok(preference) => {
                self.ack(local_id)?;
                tracing::debug!(%local_id, server_id = %preference.id, "outbox item delivered");
                Ok(Delivery::Confirmed(preference))
            }
            Err(error) => {
                self.record_failure(local_id, &error)?;
                tracing::warn!(%local_id, attempts = item.attempts + 1, %error, "outbox delivery failed");
                Ok(Delivery::Failed(error))
            }
        }
    }

    /// Attempt every queued item once, in order
    ///
    /// A call made while another drain is running returns
    /// [`DrainReport::skipped`] immediately.
    ///
    /// # Errors
    /// Storage failures
    pub async fn drain(&self, sink: &dyn PreferenceSink) -> Result<DrainReport, StorageError> {
        let Ok(_draining) = self.draining.try_lock() else {
            tracing::debug!("drain already running");
            return Ok(DrainReport::skipped());
        };

        let snapshot = self.items()?;
        let mut report = DrainReport::default();
        for item in snapshot {
            match self.submit(sink, &item.local_id).await? {
                Delivery::Confirmed(preference) => {
                    report.attempted += 1;
                    report.confirmations.push(Confirmation {
                        local_id: item.local_id,
                        preference,
                    });
                }
                Delivery::Failed(_) => {
                    report.attempted += 1;
                    report.failed += 1;
                }
                Delivery::Superseded => report.superseded += 1,
            }
        }
        report.remaining = self.len()?;

        if report.attempted > 0 {
            tracing::info!(
                delivered = report.confirmations.len(),
                failed = report.failed,
                remaining = report.remaining,
                "outbox drained"
            );
        }
        Ok(report)
    }
}
