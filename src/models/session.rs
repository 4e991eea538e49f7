// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Provider session and the transient phone verification record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live authenticated identity granted by the identity provider.
///
/// Kept in the durable device store between runs so a restart can resume
/// it; the refresh token renews the ID token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub uid: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_anonymous: bool,
    /// Provider ID token, used as the bearer for profile store calls
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// True if the ID token expires within `margin` from now.
    pub fn expires_within(&self, margin: chrono::Duration) -> bool {
        Utc::now() + margin >= self.expires_at
    }
}

/// Name and number held between an OTP request and its confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPhoneVerification {
    pub name: String,
    pub phone: String,
}
