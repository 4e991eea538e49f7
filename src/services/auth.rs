// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Identity & profile service.
//!
//! Wraps the identity provider and the PIN API for both sign-in paths, keeps
//! the user's profile document up to date, and parks failed profile writes
//! in the durable retry queue so sign-in never fails because of them.

use crate::config::Config;
use crate::db::ProfileStore;
use crate::error::{AuthError, Result};
use crate::models::{PendingPhoneVerification, PendingProfileWrite, ProfileFields, Session, UserProfile};
use crate::services::identity::{HumanVerifier, IdentityProvider, PhoneChallenge};
use crate::services::pin_api::PinApiClient;
use crate::services::profile_queue::{DrainReport, ProfileWriteQueue, QueueEvent, RequeueOutcome};
use crate::storage::{get_json, keys, set_json, DeviceStorage, LocalSessionCache};
use crate::time_utils::{age, now_timestamp};
use crate::validate;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};

/// Lifecycle of the service. `Ready` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Uninitialized,
    WaitingForProvider,
    Ready,
}

/// What `ensure_profile` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileOutcome {
    Created,
    Updated,
    /// The write failed and was queued for the next sign-in.
    Queued,
}

/// Collaborators the service talks to.
pub struct AuthDeps {
    pub provider: Arc<dyn IdentityProvider>,
    pub profiles: Arc<dyn ProfileStore>,
    pub pin_api: PinApiClient,
    pub verifier: Arc<dyn HumanVerifier>,
    pub storage: DeviceStorage,
}

pub struct AuthService {
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    pin_api: PinApiClient,
    verifier: Arc<dyn HumanVerifier>,
    storage: DeviceStorage,
    queue: ProfileWriteQueue,
    /// Outstanding SMS challenge between request and confirmation
    challenge: Mutex<Option<PhoneChallenge>>,
    state: watch::Sender<ServiceState>,
    request_timeout: Duration,
    profile_timeout: Duration,
}

impl AuthService {
    pub fn new(config: &Config, deps: AuthDeps) -> Self {
        let queue = ProfileWriteQueue::load(
            deps.storage.durable.clone(),
            config.queue_capacity,
            config.queue_max_attempts,
        );
        let (state, _) = watch::channel(ServiceState::Uninitialized);

        Self {
            provider: deps.provider,
            profiles: deps.profiles,
            pin_api: deps.pin_api,
            verifier: deps.verifier,
            storage: deps.storage,
            queue,
            challenge: Mutex::new(None),
            state,
            request_timeout: config.request_timeout,
            profile_timeout: config.profile_write_timeout,
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────

    /// Bring the service up. Safe to call more than once; only the first
    /// call waits on the provider.
    pub async fn init(&self) -> Result<()> {
        let first = self.state.send_if_modified(|state| {
            if *state == ServiceState::Uninitialized {
                *state = ServiceState::WaitingForProvider;
                true
            } else {
                false
            }
        });
        if !first {
            return Ok(());
        }

        if let Err(e) = self.provider.ready().await {
            tracing::error!(error = %e, "Identity provider failed to initialize");
            self.state.send_replace(ServiceState::Uninitialized);
            return Err(e);
        }

        self.state.send_replace(ServiceState::Ready);
        tracing::info!("Authentication service ready");
        Ok(())
    }

    /// Resolves once the service has reached `Ready`.
    pub async fn ready(&self) -> Result<()> {
        let mut rx = self.state.subscribe();
        rx.wait_for(|state| *state == ServiceState::Ready)
            .await
            .map(|_| ())
            .map_err(|_| AuthError::NotReady)
    }

    pub fn state(&self) -> ServiceState {
        *self.state.borrow()
    }

    // ─── Email PIN ───────────────────────────────────────────────

    /// Email a PIN. Returns the confirmation message to show.
    pub async fn request_email_pin(&self, email: &str, name: &str) -> Result<String> {
        timed(
            self.request_timeout,
            "PIN request",
            self.pin_api.request_pin(email, name),
        )
        .await?;
        tracing::info!(email = %email, "PIN sent");
        Ok("PIN sent to your email".to_string())
    }

    /// Verify a PIN, sign in with the returned custom token and record the
    /// sign-in.
    pub async fn verify_email_pin(&self, email: &str, pin: &str) -> Result<Session> {
        let verified = timed(
            self.request_timeout,
            "PIN verification",
            self.pin_api.verify_pin(email, pin),
        )
        .await?;

        let session = timed(
            self.request_timeout,
            "sign-in",
            self.provider
                .sign_in_with_custom_token(&verified.custom_token),
        )
        .await?;
        tracing::info!(uid = %session.uid, "Email sign-in complete");

        let fields = ProfileFields::for_email(verified.name.clone(), email);
        self.on_signed_in(&session, Some(&fields)).await;
        self.remember(&verified.name);

        Ok(session)
    }

    // ─── Phone OTP ───────────────────────────────────────────────

    /// Send an SMS code. Returns the confirmation message to show.
    pub async fn request_phone_otp(&self, phone: &str, name: &str) -> Result<String> {
        if !validate::is_valid_phone(phone) {
            return Err(AuthError::Validation(validate::MSG_INVALID_PHONE.to_string()));
        }

        let result = async {
            tracing::debug!(widget = ?self.verifier.widget(), "Requesting human verification");
            let token = self.verifier.token().await?;
            timed(
                self.request_timeout,
                "SMS request",
                self.provider.start_phone_verification(phone, &token),
            )
            .await
        }
        .await;

        let challenge = match result {
            Ok(challenge) => challenge,
            Err(e) => {
                tracing::warn!(error = %e, "Phone OTP request failed");
                self.verifier.reset();
                return Err(translate_sms_error(e));
            }
        };

        *self.lock_challenge() = Some(challenge);
        let pending = PendingPhoneVerification {
            name: name.to_string(),
            phone: phone.to_string(),
        };
        set_json(
            self.storage.session.as_ref(),
            keys::PENDING_PHONE_USER,
            &pending,
        )?;

        tracing::info!("SMS code sent");
        Ok("SMS code sent to your phone".to_string())
    }

    /// Confirm the SMS code from the last `request_phone_otp`.
    pub async fn verify_phone_otp(&self, otp: &str) -> Result<Session> {
        let challenge = self
            .lock_challenge()
            .clone()
            .ok_or(AuthError::NoPendingChallenge)?;

        let session = timed(
            self.request_timeout,
            "code verification",
            self.provider.confirm_phone_verification(&challenge, otp),
        )
        .await
        .map_err(|e| match e {
            AuthError::Provider { code, message } => AuthError::Provider {
                code,
                message: format!("Invalid OTP: {}", message),
            },
            other => other,
        })?;
        *self.lock_challenge() = None;
        tracing::info!(uid = %session.uid, "Phone sign-in complete");

        let pending: Option<PendingPhoneVerification> =
            get_json(self.storage.session.as_ref(), keys::PENDING_PHONE_USER).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Pending phone verification unreadable");
                None
            });
        if let Err(e) = self.storage.session.remove(keys::PENDING_PHONE_USER) {
            tracing::warn!(error = %e, "Failed to clear pending phone verification");
        }

        match pending {
            Some(pending) => {
                let fields = ProfileFields::for_phone(pending.name.clone(), pending.phone);
                self.on_signed_in(&session, Some(&fields)).await;
                self.remember(&pending.name);
            }
            None => self.on_signed_in(&session, None).await,
        }

        Ok(session)
    }

    // ─── Profile ─────────────────────────────────────────────────

    /// Post-sign-in housekeeping: retry queued writes first, then record
    /// this sign-in. Without submitted fields (a resumed session) only the
    /// last-login time is touched.
    pub async fn on_signed_in(&self, session: &Session, fields: Option<&ProfileFields>) {
        let report = self.drain_pending_writes().await;
        if !report.is_empty() {
            tracing::info!(
                succeeded = report.succeeded,
                requeued = report.requeued,
                exhausted = report.exhausted,
                "Drained pending profile writes"
            );
        }

        match fields {
            Some(fields) => {
                self.ensure_profile(session, fields).await;
            }
            None => {
                let touched = timed(
                    self.profile_timeout,
                    "last login update",
                    self.profiles.touch_last_login(&session.uid),
                )
                .await;
                if let Err(e) = touched {
                    tracing::warn!(uid = %session.uid, error = %e, "Failed to update last login");
                }
            }
        }
    }

    /// Create the profile if absent, otherwise bump `lastLogin`. Failures
    /// are queued, never returned.
    pub async fn ensure_profile(&self, session: &Session, fields: &ProfileFields) -> ProfileOutcome {
        let write = PendingProfileWrite {
            uid: session.uid.clone(),
            session_email: session.email.clone(),
            session_phone: session.phone.clone(),
            fields: fields.clone(),
            attempts: 1,
            enqueued_at: now_timestamp(),
        };

        match self.write_profile(&write).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(uid = %write.uid, transient = e.is_transient(), error = %e, "Profile write failed, queueing");
                if let Err(e) = self.queue.enqueue(write) {
                    tracing::error!(error = %e, "Failed to queue profile write");
                }
                ProfileOutcome::Queued
            }
        }
    }

    /// Retry every queued write once, in enqueue order. Each entry stays
    /// persisted until its own retry settles.
    pub async fn drain_pending_writes(&self) -> DrainReport {
        let mut report = DrainReport::default();

        for mut entry in self.queue.snapshot() {
            match self.write_profile(&entry).await {
                Ok(_) => {
                    if let Err(e) = self.queue.delivered(&entry) {
                        tracing::error!(uid = %entry.uid, error = %e, "Failed to settle delivered profile write");
                    }
                    report.succeeded += 1;
                }
                Err(e) => {
                    entry.attempts += 1;
                    tracing::warn!(
                        uid = %entry.uid,
                        attempts = entry.attempts,
                        age_secs = age(&entry.enqueued_at).map(|a| a.num_seconds()),
                        error = %e,
                        "Queued profile write failed again"
                    );
                    match self.queue.requeue(entry) {
                        Ok(RequeueOutcome::Requeued) => report.requeued += 1,
                        Ok(RequeueOutcome::Exhausted) => report.exhausted += 1,
                        Err(e) => tracing::error!(error = %e, "Failed to requeue profile write"),
                    }
                }
            }
        }
        report
    }

    async fn write_profile(&self, write: &PendingProfileWrite) -> Result<ProfileOutcome> {
        let existing = timed(
            self.profile_timeout,
            "profile read",
            self.profiles.get_profile(&write.uid),
        )
        .await?;

        if existing.is_some() {
            timed(
                self.profile_timeout,
                "last login update",
                self.profiles.touch_last_login(&write.uid),
            )
            .await?;
            tracing::debug!(uid = %write.uid, "Profile last login updated");
            return Ok(ProfileOutcome::Updated);
        }

        let fields = ProfileFields {
            name: write.fields.name.clone(),
            email: write.fields.email.clone().or_else(|| write.session_email.clone()),
            phone: write.fields.phone.clone().or_else(|| write.session_phone.clone()),
        };
        let profile = UserProfile::new_active(&write.uid, &fields);
        timed(
            self.profile_timeout,
            "profile create",
            self.profiles.create_profile(&profile),
        )
        .await?;
        tracing::info!(uid = %write.uid, "Profile created");
        Ok(ProfileOutcome::Created)
    }

    /// Profile of the signed-in user, or `None` when signed out, missing or
    /// unreadable.
    pub async fn check_user_status(&self) -> Option<UserProfile> {
        let refreshed = timed(
            self.request_timeout,
            "session refresh",
            self.provider.refresh_session(),
        )
        .await;
        let session = match refreshed {
            Ok(session) => session?,
            Err(e) => {
                tracing::warn!(error = %e, "Session refresh failed, using current token");
                self.provider.current_session()?
            }
        };
        let result = timed(
            self.profile_timeout,
            "profile read",
            self.profiles.get_profile(&session.uid),
        )
        .await;

        match result {
            Ok(Some(profile)) => Some(profile),
            Ok(None) => {
                tracing::info!(uid = %session.uid, "User profile not found");
                None
            }
            Err(e) => {
                tracing::warn!(uid = %session.uid, error = %e, "Failed to check user status");
                None
            }
        }
    }

    /// Whether the user may submit data. Only a profile whose status is
    /// exactly `revoked` blocks; new users and unreadable profiles pass.
    pub async fn can_submit_data(&self) -> bool {
        let Some(profile) = self.check_user_status().await else {
            return true;
        };
        if profile.is_revoked() {
            tracing::warn!(uid = %profile.uid, "Revoked user attempted to submit data");
            return false;
        }
        true
    }

    // ─── Session ─────────────────────────────────────────────────

    /// End the session and forget the offline-resume flags.
    pub async fn sign_out(&self) -> Result<()> {
        timed(self.request_timeout, "sign-out", self.provider.sign_out()).await?;
        *self.lock_challenge() = None;
        self.storage.session.remove(keys::PENDING_PHONE_USER)?;
        self.session_cache().clear()?;
        tracing::info!("Signed out");
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.provider.current_session().is_some()
    }

    pub fn current_session(&self) -> Option<Session> {
        self.provider.current_session()
    }

    /// Session change notifications.
    pub fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.provider.subscribe()
    }

    pub fn session_cache(&self) -> LocalSessionCache {
        self.storage.session_cache()
    }

    pub fn queue(&self) -> &ProfileWriteQueue {
        &self.queue
    }

    /// Overflow and exhaustion signals from the retry queue.
    pub fn queue_events(&self) -> broadcast::Receiver<QueueEvent> {
        self.queue.subscribe()
    }

    fn remember(&self, name: &str) {
        if let Err(e) = self.session_cache().remember(name) {
            tracing::warn!(error = %e, "Failed to store offline session flags");
        }
    }

    fn lock_challenge(&self) -> std::sync::MutexGuard<'_, Option<PhoneChallenge>> {
        self.challenge.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Await `fut`, failing with [`AuthError::Timeout`] after `limit`.
async fn timed<T>(
    limit: Duration,
    op: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(op, timeout_ms = limit.as_millis() as u64, "Operation timed out");
            Err(AuthError::Timeout(op))
        }
    }
}

/// User-facing text for SMS issuance failures.
fn translate_sms_error(err: AuthError) -> AuthError {
    let AuthError::Provider { code, message } = err else {
        return err;
    };

    let message = match code.as_str() {
        AuthError::INVALID_PHONE_NUMBER => {
            "Invalid phone number format. Please include country code (e.g., +1 for US)."
                .to_string()
        }
        AuthError::TOO_MANY_REQUESTS => "Too many requests. Please try again later.".to_string(),
        AuthError::MISSING_RECAPTCHA_TOKEN | AuthError::CAPTCHA_CHECK_FAILED => {
            "reCAPTCHA verification failed. Please refresh and try again.".to_string()
        }
        _ => format!("Failed to send SMS: {}", message),
    };
    AuthError::Provider { code, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sms_errors_are_translated() {
        let err = translate_sms_error(AuthError::provider(AuthError::TOO_MANY_REQUESTS, "x"));
        assert_eq!(err.to_string(), "Too many requests. Please try again later.");

        let err = translate_sms_error(AuthError::provider("auth/quota", "quota exceeded"));
        assert_eq!(err.to_string(), "Failed to send SMS: quota exceeded");

        let err = translate_sms_error(AuthError::Timeout("SMS request"));
        assert!(matches!(err, AuthError::Timeout(_)));
    }

    #[tokio::test]
    async fn timed_reports_timeout() {
        let result: Result<()> = timed(Duration::from_millis(5), "slow op", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(AuthError::Timeout("slow op"))));
    }
}
