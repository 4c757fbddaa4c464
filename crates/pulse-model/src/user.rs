//! Anonymous user identity and location

use crate::error::ModelError;
use crate::ids::{SessionId, UserId};
use serde::{Deserialize, Serialize};

/// Whether a user has completed onboarding
///
/// Onboarding is never stored: it holds iff both `state` and `lga` are
/// non-blank. Every caller derives it through this function.
#[inline]
#[must_use]
pub fn is_onboarded(state: &str, lga: &str) -> bool {
    !state.trim().is_empty() && !lga.trim().is_empty()
}

/// Anonymous user record
///
/// A persisted or received `onboarded` field is ignored on deserialization;
/// it is emitted on serialization only as a convenience for UI readers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// User ID
    pub id: UserId,
    /// State of residence (empty until onboarded)
    #[serde(default)]
    pub state: String,
    /// Local government area (empty until onboarded)
    #[serde(default)]
    pub lga: String,
    /// Ward, optional
    #[serde(default)]
    pub ward: Option<String>,
    /// Community standards accepted
    #[serde(default)]
    pub standards_accepted: bool,
    /// Default privacy preference
    #[serde(default = "default_privacy")]
    pub privacy_default: bool,
}

fn default_privacy() -> bool {
    true
}

impl User {
    /// Create a fresh, not yet onboarded user
    #[inline]
    #[must_use]
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            state: String::new(),
            lga: String::new(),
            ward: None,
            standards_accepted: false,
            privacy_default: true,
        }
    }

    /// Create an identity synthesized without the backend
    #[inline]
    #[must_use]
    pub fn offline() -> Self {
        Self::new(UserId::offline())
    }

    /// Derived onboarding flag
    #[inline]
    #[must_use]
    pub fn onboarded(&self) -> bool {
        is_onboarded(&self.state, &self.lga)
    }

    /// Apply a location update
    pub fn apply_location(&mut self, update: &LocationUpdate) {
        self.state = update.state.trim().to_string();
        self.lga = update.lga.trim().to_string();
        self.ward = update
            .ward
            .as_deref()
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .map(str::to_string);
        if let Some(privacy) = update.privacy_default {
            self.privacy_default = privacy;
        }
    }

    /// Location payload equivalent to this user's stored location
    #[must_use]
    pub fn location(&self) -> Option<LocationUpdate> {
        self.onboarded().then(|| LocationUpdate {
            state: self.state.clone(),
            lga: self.lga.clone(),
            ward: self.ward.clone(),
            privacy_default: Some(self.privacy_default),
        })
    }
}

impl Serialize for User {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;

        let mut s = serializer.serialize_struct("User", 7)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("state", &self.state)?;
        s.serialize_field("lga", &self.lga)?;
        s.serialize_field("ward", &self.ward)?;
        s.serialize_field("standardsAccepted", &self.standards_accepted)?;
        s.serialize_field("privacyDefault", &self.privacy_default)?;
        s.serialize_field("onboarded", &self.onboarded())?;
        s.end()
    }
}

/// `POST user/location` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    /// State
    pub state: String,
    /// Local government area
    pub lga: String,
    /// Ward
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ward: Option<String>,
    /// Privacy default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privacy_default: Option<bool>,
}

impl LocationUpdate {
    /// Create update for state and LGA
    #[inline]
    #[must_use]
    pub fn new(state: impl Into<String>, lga: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            lga: lga.into(),
            ward: None,
            privacy_default: None,
        }
    }

    /// With ward
    #[inline]
    #[must_use]
    pub fn with_ward(mut self, ward: impl Into<String>) -> Self {
        self.ward = Some(ward.into());
        self
    }

    /// Reject blank state or LGA
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.state.trim().is_empty() {
            return Err(ModelError::MissingField("state"));
        }
        if self.lga.trim().is_empty() {
            return Err(ModelError::MissingField("lga"));
        }
        Ok(())
    }
}

/// `POST session/init` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInit {
    /// Session token (also set as cookie)
    pub session_id: SessionId,
    /// User bound to the session
    pub user: User,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn onboarding_requires_state_and_lga() {
        assert!(is_onboarded("Lagos", "Ikeja"));
        assert!(!is_onboarded("Lagos", ""));
        assert!(!is_onboarded("", "Ikeja"));
        assert!(!is_onboarded("  ", "Ikeja"));
    }

    #[test]
    fn stored_onboarded_flag_is_ignored() {
        let json = r#"{"id":"u1","state":"","lga":"","onboarded":true}"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert!(!user.onboarded());

        let json = r#"{"id":"u1","state":"Lagos","lga":"Ikeja","onboarded":false}"#;
        let user: User = serde_json::from_str(json).unwrap();
        assert!(user.onboarded());
    }

    #[test]
    fn serialized_onboarded_follows_location() {
        let mut user = User::new(UserId::new("u1"));
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["onboarded"], false);

        user.apply_location(&LocationUpdate::new("Lagos", "Ikeja").with_ward(" "));
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["onboarded"], true);
        assert!(user.ward.is_none());
    }

    #[test]
    fn offline_identity_is_not_onboarded() {
        let user = User::offline();
        assert!(user.id.is_offline());
        assert!(!user.onboarded());
        assert!(!user.standards_accepted);
    }

    #[test]
    fn location_update_validation() {
        assert!(LocationUpdate::new("Lagos", "Ikeja").validate().is_ok());
        assert_eq!(
            LocationUpdate::new("", "Ikeja").validate(),
            Err(ModelError::MissingField("state"))
        );
        assert_eq!(
            LocationUpdate::new("Lagos", " ").validate(),
            Err(ModelError::MissingField("lga"))
        );
    }

    proptest! {
        #[test]
        fn prop_onboarded_matches_location_fields(state in "[a-zA-Z ]{0,8}", lga in "[a-zA-Z ]{0,8}") {
            let mut user = User::new(UserId::new("u"));
            user.state = state.clone();
            user.lga = lga.clone();
            prop_assert_eq!(user.onboarded(), !state.trim().is_empty() && !lga.trim().is_empty());
        }
    }
}
