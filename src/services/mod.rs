// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod auth;
pub mod identity;
pub mod pin_api;
pub mod profile_queue;

pub use auth::{AuthDeps, AuthService, ProfileOutcome, ServiceState};
pub use identity::{
    HumanVerifier, IdentityProvider, IdentityToolkitClient, PhoneChallenge, SessionSlot,
    StaticVerifier, VerificationWidget,
};
pub use pin_api::{PinApiClient, VerifyPinResponse};
pub use profile_queue::{DrainReport, ProfileWriteQueue, QueueEvent, RequeueOutcome};
