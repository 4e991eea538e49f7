// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Field validation for the sign-in forms.
//!
//! All checks run before any network call; failures carry the inline
//! message shown under the form.

use crate::error::{AuthError, Result};
use regex::Regex;
use std::sync::LazyLock;
use validator::{Validate, ValidationErrors};

/// `local@domain.tld` shape check, no whitespace and a single `@`.
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

/// E.164: `+`, a non-zero leading digit, 2 to 15 digits in total.
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+[1-9]\d{1,14}$").expect("phone pattern compiles"));

/// PINs and OTPs are exactly this many digits.
pub const CODE_LENGTH: usize = 6;

pub const MSG_MISSING_FIELDS: &str = "Please fill in all fields";
pub const MSG_INVALID_EMAIL: &str = "Please enter a valid email address";
pub const MSG_INVALID_PHONE: &str =
    "Please enter a valid phone number with country code (e.g., +1234567890)";
pub const MSG_INVALID_PIN: &str = "Please enter a valid 6-digit PIN";
pub const MSG_INVALID_OTP: &str = "Please enter a valid 6-digit code";

/// Email sign-in form, trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct EmailForm {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1), regex(path = *EMAIL_RE))]
    pub email: String,
}

/// Phone sign-in form, trimmed.
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct PhoneForm {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1), regex(path = *PHONE_RE))]
    pub phone: String,
}

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}

/// Strip everything but ASCII digits and cap at [`CODE_LENGTH`], the way the
/// code inputs filter keystrokes.
pub fn sanitize_code(input: &str) -> String {
    input
        .chars()
        .filter(|c| c.is_ascii_digit())
        .take(CODE_LENGTH)
        .collect()
}

pub fn is_valid_code(code: &str) -> bool {
    code.len() == CODE_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

pub fn validate_email_form(name: &str, email: &str) -> Result<EmailForm> {
    let form = EmailForm {
        name: name.trim().to_string(),
        email: email.trim().to_string(),
    };
    form.validate()
        .map_err(|e| form_error(&e, MSG_INVALID_EMAIL))?;
    Ok(form)
}

pub fn validate_phone_form(name: &str, phone: &str) -> Result<PhoneForm> {
    let form = PhoneForm {
        name: name.trim().to_string(),
        phone: phone.trim().to_string(),
    };
    form.validate()
        .map_err(|e| form_error(&e, MSG_INVALID_PHONE))?;
    Ok(form)
}

/// Sanitize and check an email PIN.
pub fn validate_pin(input: &str) -> Result<String> {
    validate_code(input, MSG_INVALID_PIN)
}

/// Sanitize and check an SMS code.
pub fn validate_otp(input: &str) -> Result<String> {
    validate_code(input, MSG_INVALID_OTP)
}

fn validate_code(input: &str, message: &str) -> Result<String> {
    let code = sanitize_code(input.trim());
    if is_valid_code(&code) {
        Ok(code)
    } else {
        Err(AuthError::Validation(message.to_string()))
    }
}

/// Missing fields take precedence over a malformed one.
fn form_error(errors: &ValidationErrors, invalid: &str) -> AuthError {
    let missing = errors
        .field_errors()
        .values()
        .flat_map(|errs| errs.iter())
        .any(|e| e.code == "length");

    AuthError::Validation(if missing { MSG_MISSING_FIELDS } else { invalid }.to_string())
}
