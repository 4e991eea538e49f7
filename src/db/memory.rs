// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory profile store for offline runs and tests.

use super::ProfileStore;
use crate::error::{AuthError, Result};
use crate::models::UserProfile;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Profile store backed by a `HashMap`, with failure injection.
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<HashMap<String, UserProfile>>,
    /// Number of upcoming calls that fail with a database error
    fail_next: AtomicUsize,
    /// Per-uid count of upcoming failing calls
    fail_uids: Mutex<HashMap<String, usize>>,
    /// Total calls received, failed ones included
    calls: AtomicUsize,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` store calls fail.
    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` calls touching `uid` fail, whatever other
    /// uids do in between.
    pub fn fail_uid(&self, uid: &str, count: usize) {
        self.fail_uids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(uid.to_string(), count);
    }

    /// Number of store calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Snapshot of a stored profile.
    pub fn profile(&self, uid: &str) -> Option<UserProfile> {
        self.lock().get(uid).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Overwrite a document directly, the way an administrator would.
    pub fn put(&self, profile: UserProfile) {
        self.lock().insert(profile.uid.clone(), profile);
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, UserProfile>> {
        self.profiles.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_failure(&self, uid: &str) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if let Some(left) = self
            .fail_uids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(uid)
            .filter(|n| **n > 0)
        {
            *left -= 1;
            injected = true;
        }
        if injected {
            return Err(AuthError::Database("injected failure (offline)".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>> {
        self.check_failure(uid)?;
        Ok(self.lock().get(uid).cloned())
    }

    async fn create_profile(&self, profile: &UserProfile) -> Result<()> {
        self.check_failure(&profile.uid)?;
        let mut profiles = self.lock();
        if profiles.contains_key(&profile.uid) {
            return Err(AuthError::Database(format!(
                "Document users/{} already exists",
                profile.uid
            )));
        }
        let now = Utc::now();
        profiles.insert(
            profile.uid.clone(),
            UserProfile {
                registered_at: Some(now),
                last_login: Some(now),
                ..profile.clone()
            },
        );
        Ok(())
    }

    async fn touch_last_login(&self, uid: &str) -> Result<()> {
        self.check_failure(uid)?;
        let mut profiles = self.lock();
        let profile = profiles
            .get_mut(uid)
            .ok_or_else(|| AuthError::Database(format!("No document users/{}", uid)))?;
        profile.last_login = Some(Utc::now());
        Ok(())
    }
}
