//! Local preference store
//!
//! The on-device list holds at most one record per office. Every mutation is
//! a read-modify-write of a single key inside one synchronous critical
//! section, so two saves can never interleave and each lands with exactly
//! one persisted write.

use crate::error::{ClientError, StorageError};
use crate::storage::{read_json, write_json, KeyValueStore};
use parking_lot::Mutex;
use pulse_model::{OfficeId, Preference, PreferenceDraft, PreferenceId, UserId};
use std::sync::Arc;

/// Optimistic, persisted preference list
pub struct LocalPreferenceStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
    lock: Mutex<()>,
}

impl std::fmt::Debug for LocalPreferenceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalPreferenceStore")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl LocalPreferenceStore {
    /// Store persisted under `key`
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
            lock: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<Vec<Preference>, StorageError> {
        Ok(read_json(self.store.as_ref(), &self.key)?.unwrap_or_default())
    }

    fn persist(&self, list: &[Preference]) -> Result<(), StorageError> {
        write_json(self.store.as_ref(), &self.key, list)
    }

    /// Record a provisional preference, replacing any entry for the same
    /// office
    ///
    /// # Errors
    /// `Validation` for a malformed draft, or a storage failure
    pub fn commit(&self, user_id: &UserId, draft: PreferenceDraft) -> Result<Preference, ClientError> {
        draft.validate()?;
        let record = Preference::provisional(user_id.clone(), draft);

        let _guard = self.lock.lock();
        let mut list = self.load()?;
        list.retain(|p| p.office_id != record.office_id);
        list.push(record.clone());
        self.persist(&list)?;

        tracing::debug!(office = %record.office_id, local_id = %record.id, "preference committed");
        Ok(record)
    }

    /// All records in commit order
    ///
    /// # Errors
    /// Storage failures
    pub fn list(&self) -> Result<Vec<Preference>, StorageError> {
        let _guard = self.lock.lock();
        self.load()
    }

    /// Record for one office
    ///
    /// # Errors
    /// Storage failures
    pub fn current(&self, office_id: &OfficeId) -> Result<Option<Preference>, StorageError> {
        Ok(self.list()?.into_iter().find(|p| &p.office_id == office_id))
    }

    /// Swap the provisional record `local_id` for the server's record
    ///
    /// Returns `false` (and changes nothing) when the office's entry no
    /// longer carries `local_id`, i.e. a newer save superseded it.
    ///
    /// # Errors
    /// Storage failures
    pub fn reconcile(&self, local_id: &PreferenceId, confirmed: Preference) -> Result<bool, StorageError> {
        let _guard = self.lock.lock();
        let mut list = self.load()?;
        let Some(slot) = list
            .iter_mut()
            .find(|p| p.office_id == confirmed.office_id && &p.id == local_id)
        else {
            tracing::debug!(%local_id, "confirmation for superseded record ignored");
            return Ok(false);
        };

        *slot = Preference {
            provisional: false,
            ..confirmed
        };
        self.persist(&list)?;
        Ok(true)
    }

    /// Forget every record
    ///
    /// # Errors
    /// Storage failures
    pub fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        self.store.remove(&self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn store() -> LocalPreferenceStore {
        LocalPreferenceStore::new(Arc::new(MemoryStore::new()), "vp.preferences")
    }

    fn server_copy(local: &Preference) -> Preference {
        Preference::confirmed(local.user_id.clone(), local.to_draft())
    }

    #[test]
    fn commit_replaces_same_office() {
        let prefs = store();
        let user = UserId::new("u1");

        prefs.commit(&user, PreferenceDraft::new("pres", "p1")).unwrap();
        prefs.commit(&user, PreferenceDraft::new("gov", "g1")).unwrap();
        let latest = prefs.commit(&user, PreferenceDraft::new("pres", "p2")).unwrap();

        let list = prefs.list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1], latest);
        assert!(latest.provisional);
        assert!(latest.id.is_provisional());
    }

    #[test]
    fn invalid_draft_is_not_stored() {
        let prefs = store();
        let err = prefs
            .commit(&UserId::new("u1"), PreferenceDraft::new("pres", ""))
            .unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
        assert!(prefs.list().unwrap().is_empty());
    }

    #[test]
    fn reconcile_swaps_in_place() {
        let prefs = store();
        let user = UserId::new("u1");
        let local = prefs.commit(&user, PreferenceDraft::new("pres", "p1")).unwrap();
        let confirmed = server_copy(&local);

        assert!(prefs.reconcile(&local.id, confirmed.clone()).unwrap());
        let current = prefs.current(&OfficeId::new("pres")).unwrap().unwrap();
        assert_eq!(current.id, confirmed.id);
        assert!(!current.provisional);
    }

    #[test]
    fn stale_confirmation_never_overwrites_newer_save() {
        let prefs = store();
        let user = UserId::new("u1");
        let old = prefs.commit(&user, PreferenceDraft::new("pres", "p2")).unwrap();
        let new = prefs.commit(&user, PreferenceDraft::new("pres", "p3")).unwrap();

        assert!(!prefs.reconcile(&old.id, server_copy(&old)).unwrap());
        let current = prefs.current(&OfficeId::new("pres")).unwrap().unwrap();
        assert_eq!(current, new);
    }

    #[test]
    fn corrupt_list_is_an_error() {
        let backing = Arc::new(MemoryStore::new());
        backing.set("vp.preferences", "not json").unwrap();
        let prefs = LocalPreferenceStore::new(backing, "vp.preferences");
        assert!(prefs.list().is_err());
    }

    proptest! {
        #[test]
        fn at_most_one_record_per_office(saves in proptest::collection::vec((0u8..4, 0u8..5), 1..40)) {
            let prefs = store();
            let user = UserId::new("u1");
            for (office, candidate) in &saves {
                prefs
                    .commit(&user, PreferenceDraft::new(format!("o{office}"), format!("c{candidate}")))
                    .unwrap();
            }

            let list = prefs.list().unwrap();
            let mut offices: Vec<_> = list.iter().map(|p| p.office_id.clone()).collect();
            offices.sort();
            offices.dedup();
            prop_assert_eq!(offices.len(), list.len());

            for record in &list {
                let last = saves
                    .iter()
                    .rev()
                    .find(|(o, _)| format!("o{o}") == record.office_id.as_str())
                    .unwrap();
                prop_assert_eq!(record.candidate_id.as_str(), format!("c{}", last.1));
            }
        }
    }
}
