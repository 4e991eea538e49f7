// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! KPR Monitoring sign-in front end.
//!
//! Email PIN and phone OTP sign-in backed by Firebase Auth and a Firestore
//! user profile, with offline resume and a durable retry queue for profile
//! writes. Once a session exists the embedded app runtime is launched.

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod error;
pub mod flow;
pub mod launch;
pub mod models;
pub mod services;
pub mod storage;
pub mod time_utils;
pub mod validate;

use bootstrap::Bootstrapper;
use flow::{CredentialFlow, View};
use launch::LaunchGate;
use services::AuthService;
use std::sync::Arc;

/// The sign-in components, wired together once at startup.
pub struct AuthApp {
    pub auth: Arc<AuthService>,
    pub gate: Arc<LaunchGate>,
    pub flow: Arc<CredentialFlow>,
    pub bootstrapper: Bootstrapper,
}

impl AuthApp {
    /// Wire the flow, gate and bootstrapper around an existing service.
    pub fn assemble(
        config: &config::Config,
        auth: Arc<AuthService>,
        view: Arc<dyn View>,
        loader: Option<Arc<dyn launch::AppLoader>>,
    ) -> Self {
        let gate = Arc::new(LaunchGate::new(
            view.clone(),
            loader,
            launch::LoaderConfig {
                service_worker_version: config.service_worker_version.clone(),
            },
        ));
        let flow = Arc::new(CredentialFlow::new(
            auth.clone(),
            gate.clone(),
            view.clone(),
            config.success_delay,
        ));
        let bootstrapper = Bootstrapper::new(
            auth.clone(),
            flow.clone(),
            gate.clone(),
            view,
            config.ready_timeout,
        );

        Self {
            auth,
            gate,
            flow,
            bootstrapper,
        }
    }
}
