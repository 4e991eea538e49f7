// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod pending;
pub mod session;
pub mod user;

pub use pending::PendingProfileWrite;
pub use session::{PendingPhoneVerification, Session};
pub use user::{ProfileFields, UserProfile};
