//! Preferences, drafts and pending outbox items

use crate::error::ModelError;
use crate::ids::{CandidateId, OfficeId, PreferenceId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `POST preferences` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceDraft {
    /// Office
    pub office_id: OfficeId,
    /// Chosen candidate
    pub candidate_id: CandidateId,
    /// Ordered reason tags
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl PreferenceDraft {
    /// Create draft without reasons
    #[inline]
    #[must_use]
    pub fn new(office_id: impl Into<OfficeId>, candidate_id: impl Into<CandidateId>) -> Self {
        Self {
            office_id: office_id.into(),
            candidate_id: candidate_id.into(),
            reasons: Vec::new(),
        }
    }

    /// With reason tags
    #[inline]
    #[must_use]
    pub fn with_reasons<I, S>(mut self, reasons: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reasons = reasons.into_iter().map(Into::into).collect();
        self
    }

    /// Reject blank office or candidate
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.office_id.is_blank() {
            return Err(ModelError::MissingField("officeId"));
        }
        if self.candidate_id.is_blank() {
            return Err(ModelError::MissingField("candidateId"));
        }
        Ok(())
    }
}

/// One user's preferred candidate for one office
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preference {
    /// Preference ID (provisional until confirmed)
    pub id: PreferenceId,
    /// Owner
    pub user_id: UserId,
    /// Office
    pub office_id: OfficeId,
    /// Chosen candidate
    pub candidate_id: CandidateId,
    /// Ordered reason tags
    #[serde(default)]
    pub reasons: Vec<String>,
    /// Creation time (epoch millis on the wire)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Local record not yet confirmed by the server
    #[serde(default)]
    pub provisional: bool,
}

impl Preference {
    /// Optimistic on-device record for a draft
    #[must_use]
    pub fn provisional(user_id: UserId, draft: PreferenceDraft) -> Self {
        Self {
            id: PreferenceId::provisional(),
            user_id,
            office_id: draft.office_id,
            candidate_id: draft.candidate_id,
            reasons: draft.reasons,
            created_at: Utc::now(),
            provisional: true,
        }
    }

    /// Server record for a draft
    #[must_use]
    pub fn confirmed(user_id: UserId, draft: PreferenceDraft) -> Self {
        Self {
            id: PreferenceId::generate(),
            user_id,
            office_id: draft.office_id,
            candidate_id: draft.candidate_id,
            reasons: draft.reasons,
            created_at: Utc::now(),
            provisional: false,
        }
    }

    /// Draft equivalent of this record
    #[must_use]
    pub fn to_draft(&self) -> PreferenceDraft {
        PreferenceDraft {
            office_id: self.office_id.clone(),
            candidate_id: self.candidate_id.clone(),
            reasons: self.reasons.clone(),
        }
    }
}

/// Locally committed preference awaiting remote confirmation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxItem {
    /// Provisional id of the local record this item delivers
    pub local_id: PreferenceId,
    /// Payload
    #[serde(flatten)]
    pub draft: PreferenceDraft,
    /// Enqueue time
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub queued_at: DateTime<Utc>,
    /// Failed delivery attempts so far
    #[serde(default)]
    pub attempts: u32,
    /// Last delivery error
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl OutboxItem {
    /// Item delivering `preference`
    #[must_use]
    pub fn for_preference(preference: &Preference) -> Self {
        Self {
            local_id: preference.id.clone(),
            draft: preference.to_draft(),
            queued_at: Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }

    /// Office this item targets
    #[inline]
    #[must_use]
    pub fn office_id(&self) -> &OfficeId {
        &self.draft.office_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_validation() {
        assert!(PreferenceDraft::new("pres", "p1").validate().is_ok());
        assert_eq!(
            PreferenceDraft::new("", "p1").validate(),
            Err(ModelError::MissingField("officeId"))
        );
        assert_eq!(
            PreferenceDraft::new("pres", " ").validate(),
            Err(ModelError::MissingField("candidateId"))
        );
    }

    #[test]
    fn provisional_record_is_flagged() {
        let pref = Preference::provisional(
            UserId::new("u1"),
            PreferenceDraft::new("pres", "p1").with_reasons(["economy", "security"]),
        );
        assert!(pref.provisional);
        assert!(pref.id.is_provisional());
        assert_eq!(pref.reasons, vec!["economy", "security"]);
    }

    #[test]
    fn created_at_travels_as_millis() {
        let pref = Preference::confirmed(UserId::new("u1"), PreferenceDraft::new("pres", "p1"));
        let value = serde_json::to_value(&pref).unwrap();
        assert_eq!(value["createdAt"], pref.created_at.timestamp_millis());
        assert_eq!(value["officeId"], "pres");
    }

    #[test]
    fn outbox_item_carries_flat_payload() {
        let pref = Preference::provisional(UserId::new("u1"), PreferenceDraft::new("pres", "p2"));
        let item = OutboxItem::for_preference(&pref);
        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["officeId"], "pres");
        assert_eq!(value["candidateId"], "p2");
        assert_eq!(value["localId"], pref.id.as_str());

        let back: OutboxItem = serde_json::from_value(value).unwrap();
        assert_eq!(back.office_id().as_str(), "pres");
    }
}
