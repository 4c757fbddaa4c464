//! Opaque string identifiers
//!
//! Server-issued ids are ULIDs (sortable by creation), session tokens are
//! UUIDv4. Ids minted on a device before the server has seen them carry a
//! prefix so they can never collide with a server id.

use serde::{Deserialize, Serialize};
use ulid::Ulid;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing id
            #[inline]
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the raw id
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// True if the id is empty or whitespace
            #[inline]
            #[must_use]
            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// User identifier
    UserId
);
string_id!(
    /// Office identifier
    OfficeId
);
string_id!(
    /// Candidate identifier
    CandidateId
);
string_id!(
    /// Preference identifier (server-issued or provisional)
    PreferenceId
);
string_id!(
    /// Anonymous session token
    SessionId
);

const LOCAL_PREFIX: &str = "local-";
const OFFLINE_PREFIX: &str = "offline-";

impl UserId {
    /// Mint a server user id
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Mint an id for an identity synthesized without the backend
    #[inline]
    #[must_use]
    pub fn offline() -> Self {
        Self(format!("{OFFLINE_PREFIX}{}", Uuid::new_v4()))
    }

    /// Whether the id was synthesized offline
    #[inline]
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.0.starts_with(OFFLINE_PREFIX)
    }
}

impl PreferenceId {
    /// Mint a server preference id
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Mint a provisional on-device id
    #[inline]
    #[must_use]
    pub fn provisional() -> Self {
        Self(format!("{LOCAL_PREFIX}{}", Ulid::new()))
    }

    /// Whether the id was minted on the device
    #[inline]
    #[must_use]
    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(LOCAL_PREFIX)
    }
}

impl SessionId {
    /// Mint a new session token
    #[inline]
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}
