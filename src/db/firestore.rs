// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper for the `users` collection.
//!
//! Outside the emulator, requests are authorized with the signed-in user's
//! provider ID token so the project's security rules apply.

use super::{collections, fields, ProfileStore};
use crate::error::{AuthError, Result};
use crate::models::{Session, UserProfile};
use async_trait::async_trait;
use firestore::{FirestoreTransformServerValue, FirestoreWritePrecondition};
use tokio::sync::watch;

/// Longest time gcloud-sdk may cache an ID token before asking again.
const TOKEN_REFRESH_SECS: i64 = 60;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a Firestore client bound to the current provider session.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(
        project_id: &str,
        database_id: &str,
        sessions: watch::Receiver<Option<Session>>,
    ) -> Result<Self> {
        let options = firestore::FirestoreDbOptions::new(project_id.to_string())
            .with_database_id(database_id.to_string());

        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id, options).await;
        }

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(move || {
            let (token, expiry) = session_token(&sessions);
            async move {
                Ok(gcloud_sdk::Token {
                    token_type: "Bearer".to_string(),
                    token: gcloud_sdk::SecretValue::new(token.into()),
                    expiry,
                })
            }
        });

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| AuthError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(
            project = project_id,
            database = database_id,
            "Connected to Firestore"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(
        project_id: &str,
        options: firestore::FirestoreDbOptions,
    ) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AuthError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a disconnected client (offline mode).
    ///
    /// All database operations will return an error if called, which sends
    /// every profile write to the retry queue.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb> {
        self.client
            .as_ref()
            .ok_or_else(|| AuthError::Database("Database not connected (offline mode)".to_string()))
    }
}

#[async_trait]
impl ProfileStore for FirestoreDb {
    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(uid)
            .await
            .map_err(|e| AuthError::Database(format!("Failed to read profile: {}", e)))
    }

    /// Create-only write. Both timestamps come from the server clock, so a
    /// write replayed from the queue is stamped when it lands.
    async fn create_profile(&self, profile: &UserProfile) -> Result<()> {
        let client = self.get_client()?;
        let unstamped = UserProfile {
            registered_at: None,
            last_login: None,
            ..profile.clone()
        };

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AuthError::Database(format!("Failed to begin transaction: {}", e)))?;

        client
            .fluent()
            .update()
            .in_col(collections::USERS)
            .precondition(FirestoreWritePrecondition::Exists(false))
            .document_id(&unstamped.uid)
            .object(&unstamped)
            .transforms(|t| {
                t.fields([
                    t.field(fields::REGISTERED_AT)
                        .server_value(FirestoreTransformServerValue::RequestTime),
                    t.field(fields::LAST_LOGIN)
                        .server_value(FirestoreTransformServerValue::RequestTime),
                ])
            })
            .add_to_transaction(&mut transaction)
            .map_err(|e| AuthError::Database(format!("Failed to stage profile create: {}", e)))?;

        transaction
            .commit()
            .await
            .map_err(|e| AuthError::Database(format!("Failed to create profile: {}", e)))?;
        Ok(())
    }

    /// Server-stamp `lastLogin` on an existing document. A missing document
    /// fails the precondition instead of being created bare.
    async fn touch_last_login(&self, uid: &str) -> Result<()> {
        let client = self.get_client()?;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AuthError::Database(format!("Failed to begin transaction: {}", e)))?;

        client
            .fluent()
            .update()
            .in_col(collections::USERS)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(uid)
            .transforms(|t| {
                t.fields([t
                    .field(fields::LAST_LOGIN)
                    .server_value(FirestoreTransformServerValue::RequestTime)])
            })
            .only_transform()
            .add_to_transaction(&mut transaction)
            .map_err(|e| AuthError::Database(format!("Failed to stage last login update: {}", e)))?;

        transaction
            .commit()
            .await
            .map_err(|e| AuthError::Database(format!("Failed to update last login: {}", e)))?;
        Ok(())
    }
}

/// Bearer token and cache expiry for the current session.
///
/// Without a session the token is empty; Firestore rejects the call and the
/// write is queued until the next sign-in.
fn session_token(
    sessions: &watch::Receiver<Option<Session>>,
) -> (String, chrono::DateTime<chrono::Utc>) {
    let refresh_at = chrono::Utc::now() + chrono::Duration::seconds(TOKEN_REFRESH_SECS);
    match sessions.borrow().as_ref() {
        Some(session) => (session.id_token.clone(), refresh_at.min(session.expires_at)),
        None => (String::new(), refresh_at),
    }
}
