// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity provider boundary.
//!
//! The production provider talks to the Firebase Identity Toolkit REST API:
//! - `accounts:signInWithCustomToken` + `accounts:lookup` for email PIN sign-in
//! - `accounts:sendVerificationCode` / `accounts:signInWithPhoneNumber` for SMS
//! - Secure Token `v1/token` to renew the ID token from the refresh token
//!
//! Session changes are published on a `watch` channel so observers are told
//! about sign-in, sign-out and expiry without polling. With a durable store
//! attached, the session also survives restarts.

use crate::config::DEFAULT_SECURE_TOKEN_URL;
use crate::error::{AuthError, Result};
use crate::models::Session;
use crate::storage::{get_json, keys, set_json, KeyValueStore};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Provider sessions last an hour unless the server says otherwise.
const DEFAULT_SESSION_SECS: i64 = 3600;

/// ID tokens this close to expiry are renewed before use.
const REFRESH_MARGIN_SECS: i64 = 300;

const NETWORK_FAILED: &str = "auth/network-request-failed";

/// Handle for an in-flight phone verification challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneChallenge {
    /// Opaque provider session info echoed back on confirmation
    pub session_info: String,
    pub phone: String,
}

/// Operations consumed from the identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Resolves once the provider client can take requests.
    async fn ready(&self) -> Result<()> {
        Ok(())
    }

    /// Exchange a backend-minted custom token for a session.
    async fn sign_in_with_custom_token(&self, token: &str) -> Result<Session>;

    /// Send an SMS code to `phone`. `verification_token` proves a human
    /// solved the verification widget.
    async fn start_phone_verification(
        &self,
        phone: &str,
        verification_token: &str,
    ) -> Result<PhoneChallenge>;

    /// Confirm an SMS code and sign in.
    async fn confirm_phone_verification(
        &self,
        challenge: &PhoneChallenge,
        code: &str,
    ) -> Result<Session>;

    /// Terminate the current session.
    async fn sign_out(&self) -> Result<()>;

    /// Current live session, if any.
    fn current_session(&self) -> Option<Session>;

    /// Current session, renewed first when its ID token is about to
    /// expire.
    async fn refresh_session(&self) -> Result<Option<Session>> {
        Ok(self.current_session())
    }

    /// Session change notifications.
    fn subscribe(&self) -> watch::Receiver<Option<Session>>;
}

/// How the human verification widget is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerificationWidget {
    #[default]
    Invisible,
    Visible,
}

/// Source of human verification tokens for phone sign-in.
#[async_trait]
pub trait HumanVerifier: Send + Sync {
    fn widget(&self) -> VerificationWidget {
        VerificationWidget::Invisible
    }

    /// Produce a fresh verification token.
    async fn token(&self) -> Result<String>;

    /// Drop any cached widget state after a failed attempt.
    fn reset(&self) {}
}

/// Verifier returning a token solved out of band (configured, or injected
/// by the hosting shell).
pub struct StaticVerifier {
    token: Option<String>,
}

impl StaticVerifier {
    pub fn new(token: Option<String>) -> Self {
        Self { token }
    }
}

#[async_trait]
impl HumanVerifier for StaticVerifier {
    async fn token(&self) -> Result<String> {
        self.token.clone().ok_or_else(|| {
            AuthError::provider(
                AuthError::MISSING_RECAPTCHA_TOKEN,
                "Human verification is not available",
            )
        })
    }
}

/// Current-session slot shared by provider implementations.
pub struct SessionSlot {
    tx: watch::Sender<Option<Session>>,
    /// Durable copy of the last session, kept across restarts
    store: Option<Arc<dyn KeyValueStore>>,
}

impl Default for SessionSlot {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx, store: None }
    }
}

impl SessionSlot {
    /// Slot that mirrors the session into `store`.
    pub fn persistent(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::default()
        }
    }

    pub fn publish(&self, session: Session) {
        if let Some(store) = &self.store {
            if let Err(e) = set_json(store.as_ref(), keys::PROVIDER_SESSION, &session) {
                tracing::warn!(error = %e, "Failed to persist provider session");
            }
        }
        tracing::info!(uid = %session.uid, "User signed in");
        self.tx.send_replace(Some(session));
    }

    /// Forget the session, including the durable copy.
    pub fn clear(&self) {
        if let Some(store) = &self.store {
            if let Err(e) = store.remove(keys::PROVIDER_SESSION) {
                tracing::warn!(error = %e, "Failed to remove persisted provider session");
            }
        }
        if self.tx.send_replace(None).is_some() {
            tracing::info!("User signed out");
        }
    }

    /// Live session. An expired session is withdrawn and observers
    /// notified; the durable copy stays so its refresh token can renew it.
    pub fn current(&self) -> Option<Session> {
        let session = self.tx.borrow().clone()?;
        if session.is_expired() {
            tracing::info!(uid = %session.uid, "Session expired");
            self.tx.send_replace(None);
            return None;
        }
        Some(session)
    }

    /// Session saved by this or an earlier run, expired or not.
    pub fn stored(&self) -> Option<Session> {
        let store = self.store.as_ref()?;
        get_json(store.as_ref(), keys::PROVIDER_SESSION).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Persisted provider session unreadable");
            None
        })
    }

    /// Most recent session, live or persisted.
    pub fn latest(&self) -> Option<Session> {
        self.tx.borrow().clone().or_else(|| self.stored())
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.tx.subscribe()
    }
}

/// Identity Toolkit REST client.
pub struct IdentityToolkitClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    api_key: String,
    sessions: SessionSlot,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CustomTokenRequest<'a> {
    token: &'a str,
    return_secure_token: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    id_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
    #[serde(default)]
    local_id: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LookupRequest<'a> {
    id_token: &'a str,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone_number: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendCodeRequest<'a> {
    phone_number: &'a str,
    recaptcha_token: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendCodeResponse {
    session_info: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PhoneSignInRequest<'a> {
    session_info: &'a str,
    code: &'a str,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

/// Secure Token responses use snake_case, unlike Identity Toolkit.
#[derive(Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    #[serde(default)]
    expires_in: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

impl IdentityToolkitClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                AuthError::Internal(anyhow::anyhow!("failed building identity client: {e}"))
            })?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token_url: DEFAULT_SECURE_TOKEN_URL.to_string(),
            api_key: api_key.to_string(),
            sessions: SessionSlot::default(),
        })
    }

    /// Use a different Secure Token endpoint.
    pub fn with_token_url(mut self, token_url: &str) -> Self {
        self.token_url = token_url.trim_end_matches('/').to_string();
        self
    }

    /// Persist sessions in `store` so they survive restarts.
    pub fn with_session_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.sessions = SessionSlot::persistent(store);
        self
    }

    async fn call<B, T>(&self, method: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/v1/accounts:{}", self.base_url, method);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::provider(NETWORK_FAILED, e.to_string()))?;

        Self::read_response(method, response).await
    }

    async fn read_response<T>(method: &str, response: reqwest::Response) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let raw = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| format!("HTTP {}", status));
            tracing::warn!(method, status = status.as_u16(), error = %raw, "Identity Toolkit error");
            return Err(map_provider_error(&raw));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::provider("auth/internal-error", e.to_string()))
    }

    fn session_from(
        &self,
        tokens: TokenResponse,
        uid: String,
        email: Option<String>,
        phone: Option<String>,
    ) -> Session {
        let secs = tokens
            .expires_in
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(DEFAULT_SESSION_SECS);

        Session {
            uid,
            email,
            phone,
            is_anonymous: false,
            id_token: tokens.id_token,
            refresh_token: tokens.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(secs),
        }
    }

    /// Exchange the session's refresh token for a fresh ID token.
    async fn refresh(&self, session: &Session) -> Result<Session> {
        if session.refresh_token.is_empty() {
            return Err(AuthError::provider(
                "auth/user-token-expired",
                "Session has no refresh token",
            ));
        }

        let url = format!("{}/v1/token", self.token_url);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .form(&RefreshRequest {
                grant_type: "refresh_token",
                refresh_token: &session.refresh_token,
            })
            .send()
            .await
            .map_err(|e| AuthError::provider(NETWORK_FAILED, e.to_string()))?;
        let tokens: RefreshResponse = Self::read_response("token", response).await?;

        let secs = tokens
            .expires_in
            .as_deref()
            .and_then(|s| s.parse::<i64>().ok())
            .unwrap_or(DEFAULT_SESSION_SECS);
        let refreshed = Session {
            uid: tokens.user_id.unwrap_or_else(|| session.uid.clone()),
            id_token: tokens.id_token,
            refresh_token: tokens.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(secs),
            ..session.clone()
        };
        tracing::debug!(uid = %refreshed.uid, "ID token refreshed");
        self.sessions.publish(refreshed.clone());
        Ok(refreshed)
    }
}

#[async_trait]
impl IdentityProvider for IdentityToolkitClient {
    /// Resume the session saved by an earlier run, renewing it if needed.
    /// A network failure leaves the saved session for the next start; a
    /// rejected refresh token discards it.
    async fn ready(&self) -> Result<()> {
        if self.sessions.current().is_some() {
            return Ok(());
        }
        let Some(stored) = self.sessions.stored() else {
            return Ok(());
        };

        if !stored.expires_within(chrono::Duration::seconds(REFRESH_MARGIN_SECS)) {
            tracing::info!(uid = %stored.uid, "Resuming persisted session");
            self.sessions.publish(stored);
            return Ok(());
        }

        match self.refresh(&stored).await {
            Ok(session) => tracing::info!(uid = %session.uid, "Resumed persisted session"),
            Err(e) if e.provider_code() == Some(NETWORK_FAILED) => {
                tracing::warn!(error = %e, "Could not renew persisted session, keeping it for later");
            }
            Err(e) => {
                tracing::warn!(uid = %stored.uid, error = %e, "Persisted session rejected, discarding");
                self.sessions.clear();
            }
        }
        Ok(())
    }

    async fn sign_in_with_custom_token(&self, token: &str) -> Result<Session> {
        let tokens: TokenResponse = self
            .call(
                "signInWithCustomToken",
                &CustomTokenRequest {
                    token,
                    return_secure_token: true,
                },
            )
            .await?;

        let lookup: LookupResponse = self
            .call(
                "lookup",
                &LookupRequest {
                    id_token: &tokens.id_token,
                },
            )
            .await?;
        let user = lookup
            .users
            .into_iter()
            .next()
            .ok_or_else(|| AuthError::provider("auth/user-not-found", "No user for token"))?;

        let session = self.session_from(tokens, user.local_id, user.email, user.phone_number);
        self.sessions.publish(session.clone());
        Ok(session)
    }

    async fn start_phone_verification(
        &self,
        phone: &str,
        verification_token: &str,
    ) -> Result<PhoneChallenge> {
        let response: SendCodeResponse = self
            .call(
                "sendVerificationCode",
                &SendCodeRequest {
                    phone_number: phone,
                    recaptcha_token: verification_token,
                },
            )
            .await?;

        Ok(PhoneChallenge {
            session_info: response.session_info,
            phone: phone.to_string(),
        })
    }

    async fn confirm_phone_verification(
        &self,
        challenge: &PhoneChallenge,
        code: &str,
    ) -> Result<Session> {
        let mut tokens: TokenResponse = self
            .call(
                "signInWithPhoneNumber",
                &PhoneSignInRequest {
                    session_info: &challenge.session_info,
                    code,
                },
            )
            .await?;

        let uid = tokens
            .local_id
            .take()
            .ok_or_else(|| AuthError::provider("auth/internal-error", "Missing localId"))?;
        let phone = tokens
            .phone_number
            .take()
            .unwrap_or_else(|| challenge.phone.clone());

        let session = self.session_from(tokens, uid, None, Some(phone));
        self.sessions.publish(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        self.sessions.clear();
        Ok(())
    }

    fn current_session(&self) -> Option<Session> {
        self.sessions.current()
    }

    async fn refresh_session(&self) -> Result<Option<Session>> {
        let Some(session) = self.sessions.latest() else {
            return Ok(None);
        };
        if !session.expires_within(chrono::Duration::seconds(REFRESH_MARGIN_SECS)) {
            return Ok(Some(session));
        }
        self.refresh(&session).await.map(Some)
    }

    fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.sessions.subscribe()
    }
}

/// Map an Identity Toolkit error string (`CODE : detail`) to a provider
/// error with an `auth/...` code.
pub fn map_provider_error(raw: &str) -> AuthError {
    let (server_code, detail) = match raw.split_once(" : ") {
        Some((code, detail)) => (code.trim(), detail.trim()),
        None => (raw.trim(), ""),
    };

    let code = match server_code {
        "INVALID_PHONE_NUMBER" => AuthError::INVALID_PHONE_NUMBER.to_string(),
        "TOO_MANY_ATTEMPTS_TRY_LATER" | "QUOTA_EXCEEDED" => {
            AuthError::TOO_MANY_REQUESTS.to_string()
        }
        "MISSING_RECAPTCHA_TOKEN" => AuthError::MISSING_RECAPTCHA_TOKEN.to_string(),
        "CAPTCHA_CHECK_FAILED" | "INVALID_RECAPTCHA_TOKEN" => {
            AuthError::CAPTCHA_CHECK_FAILED.to_string()
        }
        "INVALID_CODE" => "auth/invalid-verification-code".to_string(),
        "SESSION_EXPIRED" => "auth/code-expired".to_string(),
        "INVALID_CUSTOM_TOKEN" => "auth/invalid-custom-token".to_string(),
        "CREDENTIAL_MISMATCH" => "auth/custom-token-mismatch".to_string(),
        "USER_DISABLED" => "auth/user-disabled".to_string(),
        other => format!("auth/{}", other.to_ascii_lowercase().replace('_', "-")),
    };

    let message = if detail.is_empty() {
        server_code.to_string()
    } else {
        detail.to_string()
    };
    AuthError::Provider { code, message }
}
