// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Profile writes deferred until connectivity returns.

use super::ProfileFields;
use serde::{Deserialize, Serialize};

/// A profile create/update that failed and waits in the retry queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingProfileWrite {
    pub uid: String,
    /// Session details needed to rebuild the write
    #[serde(default)]
    pub session_email: Option<String>,
    #[serde(default)]
    pub session_phone: Option<String>,
    pub fields: ProfileFields,
    /// Failed attempts so far, including the original one
    pub attempts: u32,
    pub enqueued_at: String,
}
