// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Credential flow: the five sign-in screens and their transitions.
//!
//! ```text
//! method-selection ─┬─▶ email-form ─▶ email-pin-entry ─▶ launch
//!                   └─▶ phone-form ─▶ phone-otp-entry ─▶ launch
//! ```
//!
//! The flow validates fields, delegates to [`AuthService`] and renders
//! through a [`View`]. It holds no other logic.

pub mod terminal;

use crate::error::{AuthError, Result};
use crate::launch::{LaunchGate, LaunchOutcome};
use crate::services::AuthService;
use crate::validate;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Current screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    MethodSelection,
    EmailForm,
    EmailPin,
    PhoneForm,
    PhoneOtp,
}

/// What a view is asked to draw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    /// `offline_user` is set when "continue offline" should be offered.
    MethodSelection { offline_user: Option<String> },
    EmailForm,
    EmailPinEntry { email: String },
    PhoneForm,
    PhoneOtpEntry { phone: String },
}

impl Screen {
    pub fn step(&self) -> Step {
        match self {
            Screen::MethodSelection { .. } => Step::MethodSelection,
            Screen::EmailForm => Step::EmailForm,
            Screen::EmailPinEntry { .. } => Step::EmailPin,
            Screen::PhoneForm => Step::PhoneForm,
            Screen::PhoneOtpEntry { .. } => Step::PhoneOtp,
        }
    }
}

/// Inline message area under each form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Email,
    Pin,
    Phone,
    Otp,
}

/// Submit controls that show a busy state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    EmailSubmit,
    PinSubmit,
    PhoneSubmit,
    OtpSubmit,
}

impl Button {
    pub fn label(self) -> &'static str {
        match self {
            Button::EmailSubmit => "Send PIN Code",
            Button::PinSubmit => "Verify PIN",
            Button::PhoneSubmit => "Send OTP",
            Button::OtpSubmit => "Verify Code",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub text: String,
}

impl Message {
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Error,
            text: text.into(),
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Success,
            text: text.into(),
        }
    }
}

/// Presentation surface for the sign-in overlay.
pub trait View: Send + Sync {
    fn render(&self, screen: &Screen);
    fn show_message(&self, slot: Slot, message: &Message);
    fn set_busy(&self, button: Button, busy: bool);
    /// Shown when the identity provider cannot be reached.
    fn show_offline_notice(&self);
    fn hide_overlay(&self);
}

#[derive(Debug, Default)]
struct FlowState {
    step: Option<Step>,
    name: String,
    email: String,
    phone: String,
}

pub struct CredentialFlow {
    auth: Arc<AuthService>,
    gate: Arc<LaunchGate>,
    view: Arc<dyn View>,
    success_delay: Duration,
    state: Mutex<FlowState>,
}

impl CredentialFlow {
    pub fn new(
        auth: Arc<AuthService>,
        gate: Arc<LaunchGate>,
        view: Arc<dyn View>,
        success_delay: Duration,
    ) -> Self {
        Self {
            auth,
            gate,
            view,
            success_delay,
            state: Mutex::new(FlowState::default()),
        }
    }

    /// Screen currently shown, `None` before the first render.
    pub fn step(&self) -> Option<Step> {
        self.lock().step
    }

    // ─── Navigation ──────────────────────────────────────────────

    pub fn show_method_selection(&self) {
        let offline_user = self.auth.session_cache().resumable_user();
        self.show(Screen::MethodSelection { offline_user });
    }

    pub fn show_email_form(&self) {
        self.show(Screen::EmailForm);
    }

    pub fn show_phone_form(&self) {
        self.show(Screen::PhoneForm);
    }

    /// The "← Back" link of each screen.
    pub fn back(&self) {
        match self.step() {
            Some(Step::EmailPin) => self.show_email_form(),
            Some(Step::PhoneOtp) => self.show_phone_form(),
            _ => self.show_method_selection(),
        }
    }

    /// "Continue offline" from method selection; only offered when the
    /// local session cache is populated.
    pub fn continue_offline(&self) -> Result<LaunchOutcome> {
        if !self.auth.session_cache().is_populated() {
            return Err(AuthError::Validation(
                "No previous sign-in on this device".to_string(),
            ));
        }
        Ok(self.gate.launch())
    }

    // ─── Email ───────────────────────────────────────────────────

    pub async fn submit_email(&self, name: &str, email: &str) -> Result<()> {
        let form = validate::validate_email_form(name, email)
            .inspect_err(|e| self.error(Slot::Email, e))?;

        {
            let mut state = self.lock();
            state.name = form.name.clone();
            state.email = form.email.clone();
        }

        self.view.set_busy(Button::EmailSubmit, true);
        let result = self.auth.request_email_pin(&form.email, &form.name).await;
        self.view.set_busy(Button::EmailSubmit, false);

        match result {
            Ok(message) => {
                self.view
                    .show_message(Slot::Email, &Message::success(message));
                self.show(Screen::EmailPinEntry { email: form.email });
                Ok(())
            }
            Err(e) => {
                self.error(Slot::Email, &e);
                Err(e)
            }
        }
    }

    pub async fn submit_pin(&self, pin: &str) -> Result<()> {
        let pin = validate::validate_pin(pin).inspect_err(|e| self.error(Slot::Pin, e))?;
        let email = self.lock().email.clone();

        self.view.set_busy(Button::PinSubmit, true);
        let result = self.auth.verify_email_pin(&email, &pin).await;
        self.view.set_busy(Button::PinSubmit, false);

        match result {
            Ok(_) => {
                self.hand_off(Slot::Pin).await;
                Ok(())
            }
            Err(e) => {
                self.error(Slot::Pin, &e);
                Err(e)
            }
        }
    }

    /// Re-send the PIN to the same address; the screen does not change.
    pub async fn resend_pin(&self) -> Result<()> {
        let (email, name) = {
            let state = self.lock();
            (state.email.clone(), state.name.clone())
        };

        match self.auth.request_email_pin(&email, &name).await {
            Ok(_) => {
                self.view
                    .show_message(Slot::Pin, &Message::success("PIN resent to your email"));
                Ok(())
            }
            Err(e) => {
                self.error(Slot::Pin, &e);
                Err(e)
            }
        }
    }

    // ─── Phone ───────────────────────────────────────────────────

    pub async fn submit_phone(&self, name: &str, phone: &str) -> Result<()> {
        let form = validate::validate_phone_form(name, phone)
            .inspect_err(|e| self.error(Slot::Phone, e))?;

        {
            let mut state = self.lock();
            state.name = form.name.clone();
            state.phone = form.phone.clone();
        }

        self.view.set_busy(Button::PhoneSubmit, true);
        let result = self.auth.request_phone_otp(&form.phone, &form.name).await;
        self.view.set_busy(Button::PhoneSubmit, false);

        match result {
            Ok(message) => {
                self.view
                    .show_message(Slot::Phone, &Message::success(message));
                self.show(Screen::PhoneOtpEntry { phone: form.phone });
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Phone sign-in error");
                self.error(Slot::Phone, &e);
                Err(e)
            }
        }
    }

    pub async fn submit_otp(&self, otp: &str) -> Result<()> {
        let otp = validate::validate_otp(otp).inspect_err(|e| self.error(Slot::Otp, e))?;

        self.view.set_busy(Button::OtpSubmit, true);
        let result = self.auth.verify_phone_otp(&otp).await;
        self.view.set_busy(Button::OtpSubmit, false);

        match result {
            Ok(_) => {
                self.hand_off(Slot::Otp).await;
                Ok(())
            }
            Err(e) => {
                self.error(Slot::Otp, &e);
                Err(e)
            }
        }
    }

    // ─── Helpers ─────────────────────────────────────────────────

    async fn hand_off(&self, slot: Slot) {
        self.view
            .show_message(slot, &Message::success("Sign in successful!"));
        tokio::time::sleep(self.success_delay).await;
        self.gate.launch();
    }

    fn show(&self, screen: Screen) {
        self.lock().step = Some(screen.step());
        self.view.render(&screen);
    }

    fn error(&self, slot: Slot, err: &AuthError) {
        self.view
            .show_message(slot, &Message::error(err.user_message()));
    }

    fn lock(&self) -> MutexGuard<'_, FlowState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
