// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sign-in screens end to end: validation, email PIN, phone OTP, launch.

use kpr_auth::error::AuthError;
use kpr_auth::flow::{Button, Message, Screen, Slot, Step};
use kpr_auth::launch::LaunchOutcome;
use kpr_auth::validate::{
    MSG_INVALID_EMAIL, MSG_INVALID_OTP, MSG_INVALID_PHONE, MSG_INVALID_PIN, MSG_MISSING_FIELDS,
};
use std::sync::atomic::Ordering;

mod common;
use common::{Harness, ViewEvent, GOOD_OTP, GOOD_PIN};

// ═══════════════════════════════════════════════════════════════════════════
// VALIDATION
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_email_form_validated_before_network() {
    let h = Harness::new().await;
    let flow = &h.app.flow;
    flow.show_email_form();

    assert!(flow.submit_email("", "alice@example.com").await.is_err());
    assert_eq!(
        h.view.last_message(Slot::Email),
        Some(Message::error(MSG_MISSING_FIELDS))
    );

    assert!(flow.submit_email("Alice", "alice@").await.is_err());
    assert_eq!(
        h.view.last_message(Slot::Email),
        Some(Message::error(MSG_INVALID_EMAIL))
    );

    assert_eq!(h.pin_api.hits(), 0);
    assert_eq!(flow.step(), Some(Step::EmailForm));
}

#[tokio::test]
async fn test_phone_form_validated_before_network() {
    let h = Harness::new().await;
    let flow = &h.app.flow;
    flow.show_phone_form();

    assert!(flow.submit_phone("Carol", "").await.is_err());
    assert_eq!(
        h.view.last_message(Slot::Phone),
        Some(Message::error(MSG_MISSING_FIELDS))
    );

    for bad in ["5551234567", "+0551234567", "+1 555 123 4567"] {
        assert!(flow.submit_phone("Carol", bad).await.is_err());
        assert_eq!(
            h.view.last_message(Slot::Phone),
            Some(Message::error(MSG_INVALID_PHONE)),
            "{} should be rejected",
            bad
        );
    }
    assert_eq!(h.provider.network_calls(), 0);
}

#[tokio::test]
async fn test_short_codes_rejected_before_network() {
    let h = Harness::new().await;
    let flow = &h.app.flow;

    assert!(flow.submit_pin("12345").await.is_err());
    assert_eq!(
        h.view.last_message(Slot::Pin),
        Some(Message::error(MSG_INVALID_PIN))
    );

    assert!(flow.submit_otp("12a45").await.is_err());
    assert_eq!(
        h.view.last_message(Slot::Otp),
        Some(Message::error(MSG_INVALID_OTP))
    );

    assert_eq!(h.pin_api.hits(), 0);
    assert_eq!(h.provider.network_calls(), 0);
}

// ═══════════════════════════════════════════════════════════════════════════
// EMAIL PIN
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_email_sign_in_launches_app_once() {
    let h = Harness::new().await;
    let flow = &h.app.flow;
    flow.show_method_selection();
    flow.show_email_form();

    flow.submit_email(" Alice ", "alice@example.com ")
        .await
        .unwrap();
    assert_eq!(
        h.view.last_screen(),
        Some(Screen::EmailPinEntry {
            email: "alice@example.com".to_string()
        })
    );
    assert_eq!(
        h.view.last_message(Slot::Email),
        Some(Message::success("PIN sent to your email"))
    );
    assert_eq!(h.view.count(&ViewEvent::Busy(Button::EmailSubmit, true)), 1);
    assert_eq!(h.view.count(&ViewEvent::Busy(Button::EmailSubmit, false)), 1);

    let body = h.pin_api.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(body["name"], "Alice");

    flow.submit_pin(GOOD_PIN).await.unwrap();
    assert_eq!(
        h.view.last_message(Slot::Pin),
        Some(Message::success("Sign in successful!"))
    );

    // Profile, offline flags and launch
    let profile = h.profiles.profile("user-alice").expect("profile created");
    assert_eq!(profile.name, "Alice");
    assert_eq!(profile.email.as_deref(), Some("alice@example.com"));
    assert_eq!(
        h.auth().session_cache().resumable_user().as_deref(),
        Some("Alice")
    );
    assert!(h.app.gate.is_launched());
    assert_eq!(h.loader.loads(), 1);
    assert_eq!(h.view.count(&ViewEvent::HideOverlay), 1);
    assert_eq!(
        h.loader.last_version.lock().unwrap().as_deref(),
        Some(h.config.service_worker_version.as_str())
    );

    // A second launch request is a no-op
    assert_eq!(h.app.gate.launch(), LaunchOutcome::AlreadyLaunched);
    assert_eq!(h.loader.loads(), 1);
}

#[tokio::test]
async fn test_alice_first_sign_in() {
    let h = Harness::new().await;
    h.app.bootstrapper.run().await;

    h.app.flow.show_email_form();
    h.app.flow.submit_email("Alice", "a@b.com").await.unwrap();
    h.app.flow.submit_pin("482913").await.unwrap();

    let profile = h.profiles.profile("user-a").expect("profile created");
    assert_eq!(profile.email.as_deref(), Some("a@b.com"));
    assert_eq!(profile.role.as_deref(), Some("user"));
    assert_eq!(profile.status.as_deref(), Some("active"));
    assert_eq!(h.loader.loads(), 1);
}

#[tokio::test]
async fn test_wrong_pin_stays_on_entry_screen() {
    let h = Harness::new().await;
    let flow = &h.app.flow;
    flow.submit_email("Alice", "alice@example.com").await.unwrap();

    assert!(flow.submit_pin("000000").await.is_err());
    assert_eq!(
        h.view.last_message(Slot::Pin),
        Some(Message::error("Invalid or expired PIN"))
    );
    assert_eq!(flow.step(), Some(Step::EmailPin));
    assert!(!h.app.gate.is_launched());
    assert!(!h.auth().session_cache().is_populated());
}

#[tokio::test]
async fn test_resend_pin_keeps_screen() {
    let h = Harness::new().await;
    let flow = &h.app.flow;
    flow.submit_email("Alice", "alice@example.com").await.unwrap();

    flow.resend_pin().await.unwrap();
    assert_eq!(h.pin_api.request_hits.load(Ordering::SeqCst), 2);
    assert_eq!(
        h.view.last_message(Slot::Pin),
        Some(Message::success("PIN resent to your email"))
    );
    assert_eq!(flow.step(), Some(Step::EmailPin));

    let body = h.pin_api.last_request.lock().unwrap().clone().unwrap();
    assert_eq!(body["email"], "alice@example.com");
}

#[tokio::test]
async fn test_pin_api_failure_shown_inline() {
    let h = Harness::new().await;
    *h.pin_api.request_failure.lock().unwrap() =
        Some(r#"{"message":"Rate limit exceeded"}"#.to_string());

    h.app.flow.show_email_form();
    assert!(h
        .app
        .flow
        .submit_email("Alice", "alice@example.com")
        .await
        .is_err());
    assert_eq!(
        h.view.last_message(Slot::Email),
        Some(Message::error("Failed to send PIN: Rate limit exceeded"))
    );
    assert_eq!(h.app.flow.step(), Some(Step::EmailForm));
}

#[tokio::test]
async fn test_sign_in_succeeds_while_profile_store_offline() {
    let h = Harness::new().await;
    h.profiles.fail_next(1);

    h.app
        .flow
        .submit_email("Alice", "alice@example.com")
        .await
        .unwrap();
    h.app.flow.submit_pin(GOOD_PIN).await.unwrap();

    assert!(h.app.gate.is_launched());
    assert!(h.profiles.is_empty());
    assert_eq!(h.auth().queue().len(), 1);
}

// ═══════════════════════════════════════════════════════════════════════════
// PHONE OTP
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_phone_sign_in_creates_profile_and_launches() {
    let h = Harness::new().await;
    let flow = &h.app.flow;
    flow.show_phone_form();

    flow.submit_phone("Carol", "+15551234567").await.unwrap();
    assert_eq!(
        h.view.last_screen(),
        Some(Screen::PhoneOtpEntry {
            phone: "+15551234567".to_string()
        })
    );
    assert_eq!(
        h.view.last_message(Slot::Phone),
        Some(Message::success("SMS code sent to your phone"))
    );
    assert_eq!(
        h.provider.last_verification_token.lock().unwrap().as_deref(),
        Some("recaptcha-ok")
    );

    flow.submit_otp(GOOD_OTP).await.unwrap();

    let profile = h.profiles.profile("phone-15551234567").expect("profile");
    assert_eq!(profile.name, "Carol");
    assert_eq!(profile.phone.as_deref(), Some("+15551234567"));
    assert_eq!(profile.email, None);
    assert_eq!(
        h.auth().session_cache().resumable_user().as_deref(),
        Some("Carol")
    );
    assert_eq!(h.loader.loads(), 1);
}

#[tokio::test]
async fn test_wrong_otp_is_prefixed() {
    let h = Harness::new().await;
    let flow = &h.app.flow;
    flow.submit_phone("Carol", "+15551234567").await.unwrap();

    assert!(flow.submit_otp("111111").await.is_err());
    assert_eq!(
        h.view.last_message(Slot::Otp),
        Some(Message::error(
            "Invalid OTP: The SMS verification code is invalid."
        ))
    );
    assert!(!h.app.gate.is_launched());

    // The challenge survives a wrong code
    flow.submit_otp(GOOD_OTP).await.unwrap();
    assert!(h.app.gate.is_launched());
}

#[tokio::test]
async fn test_otp_without_request_is_rejected() {
    let h = Harness::new().await;

    let err = h.auth().verify_phone_otp(GOOD_OTP).await.unwrap_err();
    assert!(matches!(err, AuthError::NoPendingChallenge));
    assert_eq!(
        err.to_string(),
        "No OTP request found. Please request OTP first."
    );
    assert_eq!(h.provider.confirm_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_sms_failures_are_translated() {
    let cases = [
        (
            AuthError::TOO_MANY_REQUESTS,
            "Too many requests. Please try again later.",
        ),
        (
            AuthError::INVALID_PHONE_NUMBER,
            "Invalid phone number format. Please include country code (e.g., +1 for US).",
        ),
        (
            AuthError::CAPTCHA_CHECK_FAILED,
            "reCAPTCHA verification failed. Please refresh and try again.",
        ),
        ("auth/quota-exceeded", "Failed to send SMS: quota exceeded"),
    ];

    for (code, expected) in cases {
        let h = Harness::new().await;
        h.provider
            .fail_sms_with(AuthError::provider(code, "quota exceeded"));

        assert!(h
            .app
            .flow
            .submit_phone("Carol", "+15551234567")
            .await
            .is_err());
        assert_eq!(
            h.view.last_message(Slot::Phone),
            Some(Message::error(expected))
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// NAVIGATION
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_back_links() {
    let h = Harness::new().await;
    let flow = &h.app.flow;

    flow.submit_email("Alice", "alice@example.com").await.unwrap();
    flow.back();
    assert_eq!(flow.step(), Some(Step::EmailForm));
    flow.back();
    assert_eq!(flow.step(), Some(Step::MethodSelection));

    flow.submit_phone("Carol", "+15551234567").await.unwrap();
    flow.back();
    assert_eq!(flow.step(), Some(Step::PhoneForm));
    flow.back();
    assert_eq!(
        h.view.last_screen(),
        Some(Screen::MethodSelection { offline_user: None })
    );
}

#[tokio::test]
async fn test_continue_offline_needs_previous_sign_in() {
    let h = Harness::new().await;
    assert!(h.app.flow.continue_offline().is_err());
    assert!(!h.app.gate.is_launched());

    h.auth().session_cache().remember("Alice").unwrap();
    h.app.flow.show_method_selection();
    assert_eq!(
        h.view.last_screen(),
        Some(Screen::MethodSelection {
            offline_user: Some("Alice".to_string())
        })
    );

    assert_eq!(h.app.flow.continue_offline().unwrap(), LaunchOutcome::Launched);
    assert_eq!(h.provider.network_calls(), 0);
}

#[tokio::test]
async fn test_sign_out_forgets_offline_flags() {
    let h = Harness::new().await;
    h.app
        .flow
        .submit_email("Alice", "alice@example.com")
        .await
        .unwrap();
    h.app.flow.submit_pin(GOOD_PIN).await.unwrap();
    assert!(h.auth().is_authenticated());

    h.auth().sign_out().await.unwrap();
    assert!(!h.auth().is_authenticated());
    assert!(!h.auth().session_cache().is_populated());
}
