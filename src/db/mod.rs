//! Profile store layer (Firestore, plus an in-memory store for offline runs).

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryProfileStore;

use crate::error::Result;
use crate::models::UserProfile;
use async_trait::async_trait;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
}

/// Document fields stamped with the server's request time.
pub mod fields {
    pub const REGISTERED_AT: &str = "registeredAt";
    pub const LAST_LOGIN: &str = "lastLogin";
}

/// Storage for user profile documents, keyed by uid.
///
/// Timestamps are owned by the store and taken from its clock at write
/// time. `create_profile` stamps `registeredAt` and `lastLogin`;
/// `touch_last_login` stamps `lastLogin` only.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Read a profile. `Ok(None)` means the document does not exist.
    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>>;

    /// Create a profile. Fails if one already exists for the uid.
    async fn create_profile(&self, profile: &UserProfile) -> Result<()>;

    /// Merge-update only the last-login timestamp. Fails if the document
    /// does not exist.
    async fn touch_last_login(&self, uid: &str) -> Result<()>;
}
