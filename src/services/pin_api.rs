// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Client for the remote email PIN API.
//!
//! Handles:
//! - PIN issuance (`POST /api/auth/request-pin`)
//! - PIN verification, returning a provider custom token
//!   (`POST /api/auth/verify-pin`)
//! - Error bodies of the form `{"message": "..."}`, falling back to the raw
//!   body text

use crate::error::{AuthError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// PIN API client.
#[derive(Clone)]
pub struct PinApiClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct RequestPinBody<'a> {
    email: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
struct VerifyPinBody<'a> {
    email: &'a str,
    pin: &'a str,
}

/// Successful issuance response.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestPinResponse {
    #[serde(default)]
    pub message: Option<String>,
}

/// Successful verification response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPinResponse {
    /// Custom token to exchange with the identity provider
    pub custom_token: String,
    /// Display name the backend has on file for this email
    pub name: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl PinApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("failed building PIN API client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Ask the backend to email a 6-digit PIN.
    pub async fn request_pin(&self, email: &str, name: &str) -> Result<RequestPinResponse> {
        let url = format!("{}/api/auth/request-pin", self.base_url);
        tracing::debug!(email = %email, "Requesting email PIN");

        self.post_json(&url, &RequestPinBody { email, name })
            .await
            .map_err(|message| AuthError::PinApi(format!("Failed to send PIN: {}", message)))
    }

    /// Check a PIN and receive a custom token for it.
    pub async fn verify_pin(&self, email: &str, pin: &str) -> Result<VerifyPinResponse> {
        let url = format!("{}/api/auth/verify-pin", self.base_url);
        tracing::debug!(email = %email, pin_len = pin.len(), "Verifying email PIN");

        self.post_json(&url, &VerifyPinBody { email, pin })
            .await
            .map_err(AuthError::PinApi)
    }

    /// POST a JSON body and parse a JSON response. Errors are returned as the
    /// message to show the user.
    async fn post_json<B, T>(&self, url: &str, body: &B) -> std::result::Result<T, String>
    where
        B: Serialize + ?Sized,
        T: for<'de> Deserialize<'de>,
    {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    "The server did not respond in time".to_string()
                } else {
                    format!("Network error: {}", e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "PIN API returned an error");
            return Err(error_message(&text, status));
        }

        response
            .json()
            .await
            .map_err(|e| format!("Unexpected response from server: {}", e))
    }
}

/// Extract the user-facing message from an error body.
fn error_message(body: &str, status: reqwest::StatusCode) -> String {
    let parsed = serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty());

    match parsed {
        Some(message) => message,
        None if !body.trim().is_empty() => body.trim().to_string(),
        None => format!("HTTP {}", status),
    }
}
