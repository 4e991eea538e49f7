//! User profile model stored in Firestore.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role assigned to every self-registered user.
pub const ROLE_USER: &str = "user";
/// Status written when a profile is first created.
pub const STATUS_ACTIVE: &str = "active";
/// Status set out-of-band by an administrator to block submissions.
pub const STATUS_REVOKED: &str = "revoked";

/// User profile document, `users/{uid}`.
///
/// Field names are camelCase on the wire to match the documents the
/// administrative tooling reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Provider user ID (also used as document ID)
    pub uid: String,
    /// Display name captured at sign-in
    pub name: String,
    /// Email address (email sign-in only)
    #[serde(default)]
    pub email: Option<String>,
    /// E.164 phone number (phone sign-in only)
    #[serde(default)]
    pub phone: Option<String>,
    /// Always `user` for client-created profiles
    #[serde(default)]
    pub role: Option<String>,
    /// `active`, `revoked`, or absent on legacy documents
    #[serde(default)]
    pub status: Option<String>,
    /// When the profile was first written (server clock)
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "firestore::serialize_as_optional_timestamp"
    )]
    pub registered_at: Option<DateTime<Utc>>,
    /// Last successful sign-in (server clock)
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "firestore::serialize_as_optional_timestamp"
    )]
    pub last_login: Option<DateTime<Utc>>,
}

impl UserProfile {
    /// Build the document written on first sign-in. Timestamps are left for
    /// the store to stamp at write time.
    pub fn new_active(uid: &str, fields: &ProfileFields) -> Self {
        Self {
            uid: uid.to_string(),
            name: fields.name.clone(),
            email: fields.email.clone(),
            phone: fields.phone.clone(),
            role: Some(ROLE_USER.to_string()),
            status: Some(STATUS_ACTIVE.to_string()),
            registered_at: None,
            last_login: None,
        }
    }

    /// Only an exact `revoked` blocks submissions; absent or unknown values
    /// do not.
    pub fn is_revoked(&self) -> bool {
        self.status.as_deref() == Some(STATUS_REVOKED)
    }
}

/// Fields a user submits during sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProfileFields {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl ProfileFields {
    pub fn for_email(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: Some(email.into()),
            phone: None,
        }
    }

    pub fn for_phone(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: None,
            phone: Some(phone.into()),
        }
    }
}
