// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Startup decision: resume offline, resume a live provider session, or
//! ask the user to sign in.

use crate::error::{AuthError, Result};
use crate::flow::{CredentialFlow, View};
use crate::launch::{LaunchGate, LaunchOutcome};
use crate::services::AuthService;
use std::sync::Arc;
use std::time::Duration;

/// Which startup branch was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootOutcome {
    /// Local session cache was populated; no service call was made.
    OfflineResume(LaunchOutcome),
    /// The provider still had a live session.
    SessionResume(LaunchOutcome),
    /// Method selection is showing.
    SignInRequired,
    /// The provider never became ready; the offline notice is showing.
    ProviderUnavailable,
}

pub struct Bootstrapper {
    auth: Arc<AuthService>,
    flow: Arc<CredentialFlow>,
    gate: Arc<LaunchGate>,
    view: Arc<dyn View>,
    ready_timeout: Duration,
}

impl Bootstrapper {
    pub fn new(
        auth: Arc<AuthService>,
        flow: Arc<CredentialFlow>,
        gate: Arc<LaunchGate>,
        view: Arc<dyn View>,
        ready_timeout: Duration,
    ) -> Self {
        Self {
            auth,
            flow,
            gate,
            view,
            ready_timeout,
        }
    }

    pub async fn run(&self) -> BootOutcome {
        tracing::info!("Auth bootstrap starting");

        if let Err(e) = self.wait_for_service().await {
            tracing::error!(error = %e, "Authentication service unavailable");
            if let Some(name) = self.auth.session_cache().resumable_user() {
                tracing::info!(user = %name, "Provider unavailable, resuming offline");
                return BootOutcome::OfflineResume(self.gate.launch());
            }
            self.view.show_offline_notice();
            return BootOutcome::ProviderUnavailable;
        }

        if let Some(name) = self.auth.session_cache().resumable_user() {
            tracing::info!(user = %name, "Found previously authenticated user, starting app directly");
            return BootOutcome::OfflineResume(self.gate.launch());
        }

        if let Some(session) = self.auth.current_session() {
            tracing::info!(uid = %session.uid, "Provider session still live, starting app");
            self.auth.on_signed_in(&session, None).await;
            return BootOutcome::SessionResume(self.gate.launch());
        }

        tracing::info!("User not authenticated - showing sign-in");
        self.flow.show_method_selection();
        BootOutcome::SignInRequired
    }

    async fn wait_for_service(&self) -> Result<()> {
        tokio::time::timeout(self.ready_timeout, async {
            self.auth.init().await?;
            self.auth.ready().await
        })
        .await
        .map_err(|_| AuthError::Timeout("provider readiness"))?
    }
}
