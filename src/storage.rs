// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! On-device key/value storage.
//!
//! Two namespaces are used: a durable one that survives restarts (offline
//! resume flags, queued profile writes, the provider session) and a
//! session-scoped one that lives only as long as the process (pending phone
//! verification).

use crate::error::{AuthError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

/// Storage keys.
pub mod keys {
    pub const USER_AUTHENTICATED: &str = "userAuthenticated";
    pub const AUTHENTICATED_USER_NAME: &str = "authenticatedUserName";
    pub const PENDING_PROFILE_WRITES: &str = "pendingProfileWrites";
    pub const DEAD_PROFILE_WRITES: &str = "deadProfileWrites";
    pub const PENDING_PHONE_USER: &str = "pendingPhoneUser";
    pub const PROVIDER_SESSION: &str = "providerSession";
}

/// A string-to-string store.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Session-scoped store; contents vanish with the process.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock().remove(key);
        Ok(())
    }
}

/// Durable store kept as a single JSON object on disk.
///
/// Every mutation rewrites the file through a temporary sibling and a
/// rename, so a crash leaves either the old or the new contents. Memory is
/// only updated once the file write succeeds.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    const FILE_NAME: &'static str = "device-store.json";

    /// Open (or create) the store inside `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            AuthError::Storage(format!("Failed to create {}: {}", dir.display(), e))
        })?;
        let path = dir.join(Self::FILE_NAME);

        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Device store unreadable, starting empty");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(AuthError::Storage(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        tracing::debug!(path = %path.display(), keys = entries.len(), "Device store opened");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let raw = serde_json::to_string_pretty(entries)
            .map_err(|e| AuthError::Storage(format!("Failed to encode device store: {}", e)))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)
            .and_then(|_| std::fs::rename(&tmp, &self.path))
            .map_err(|e| {
                AuthError::Storage(format!("Failed to write {}: {}", self.path.display(), e))
            })
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.lock();
        let mut next = entries.clone();
        next.insert(key.to_string(), value.to_string());
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.lock();
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }
}

/// The two storage namespaces available on the device.
#[derive(Clone)]
pub struct DeviceStorage {
    pub durable: Arc<dyn KeyValueStore>,
    pub session: Arc<dyn KeyValueStore>,
}

impl DeviceStorage {
    pub fn new(durable: Arc<dyn KeyValueStore>, session: Arc<dyn KeyValueStore>) -> Self {
        Self { durable, session }
    }

    /// Both namespaces in memory (tests, kiosk demos).
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(MemoryStore::new()))
    }

    /// Durable namespace on disk under `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        Ok(Self::new(
            Arc::new(FileStore::open(dir)?),
            Arc::new(MemoryStore::new()),
        ))
    }

    pub fn session_cache(&self) -> LocalSessionCache {
        LocalSessionCache {
            store: self.durable.clone(),
        }
    }
}

/// Read a JSON value stored under `key`.
pub fn get_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    match store.get(key)? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| AuthError::Storage(format!("Corrupt value under {}: {}", key, e))),
        None => Ok(None),
    }
}

/// Store a value as JSON under `key`.
pub fn set_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let raw = serde_json::to_string(value)
        .map_err(|e| AuthError::Storage(format!("Failed to encode {}: {}", key, e)))?;
    store.set(key, &raw)
}

/// Flags that let the app shell resume offline without contacting the
/// provider. Not a credential.
#[derive(Clone)]
pub struct LocalSessionCache {
    store: Arc<dyn KeyValueStore>,
}

impl LocalSessionCache {
    /// Display name of the previously authenticated user, when both flags
    /// are present.
    pub fn resumable_user(&self) -> Option<String> {
        let authenticated = self.store.get(keys::USER_AUTHENTICATED).ok().flatten();
        let name = self.store.get(keys::AUTHENTICATED_USER_NAME).ok().flatten();
        match (authenticated.as_deref(), name) {
            (Some("true"), Some(name)) if !name.is_empty() => Some(name),
            _ => None,
        }
    }

    pub fn is_populated(&self) -> bool {
        self.resumable_user().is_some()
    }

    pub fn remember(&self, name: &str) -> Result<()> {
        self.store.set(keys::USER_AUTHENTICATED, "true")?;
        self.store.set(keys::AUTHENTICATED_USER_NAME, name)
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(keys::USER_AUTHENTICATED)?;
        self.store.remove(keys::AUTHENTICATED_USER_NAME)
    }
}
