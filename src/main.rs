// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! KPR Monitoring sign-in front end.
//!
//! Resumes a previous session when possible, otherwise walks the user
//! through email PIN or phone OTP sign-in, then starts the app runtime.

use kpr_auth::{
    config::Config,
    db::FirestoreDb,
    flow::terminal::{self, TerminalView},
    launch::{AppLoader, ProcessLoader},
    services::{AuthDeps, AuthService, IdentityProvider, IdentityToolkitClient, PinApiClient, StaticVerifier},
    storage::DeviceStorage,
    AuthApp,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    init_logging(config.json_logs);
    tracing::info!(project = %config.firebase_project_id, "Starting KPR Monitoring sign-in");

    let storage = DeviceStorage::open(&config.data_dir)?;

    // The provider session is kept on the device so a restart can resume it
    let provider = Arc::new(
        IdentityToolkitClient::new(
            &config.identity_toolkit_url,
            &config.firebase_api_key,
            config.request_timeout,
        )?
        .with_token_url(&config.secure_token_url)
        .with_session_store(storage.durable.clone()),
    );

    // Profile writes authenticate as the signed-in user
    let profiles = FirestoreDb::new(
        &config.firebase_project_id,
        &config.firestore_database_id,
        provider.subscribe(),
    )
    .await
    .unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Firestore unavailable, profile writes will be queued");
        FirestoreDb::new_mock()
    });

    let auth = Arc::new(AuthService::new(
        &config,
        AuthDeps {
            provider,
            profiles: Arc::new(profiles),
            pin_api: PinApiClient::new(&config.pin_api_base_url, config.request_timeout)?,
            verifier: Arc::new(StaticVerifier::new(config.recaptcha_token.clone())),
            storage,
        },
    ));

    let loader = config
        .app_command
        .as_deref()
        .map(|cmd| Arc::new(ProcessLoader::new(cmd)) as Arc<dyn AppLoader>);

    let app = AuthApp::assemble(&config, auth, Arc::new(TerminalView::new()), loader);
    terminal::run(&app.bootstrapper, &app.flow, &app.gate).await?;

    tracing::info!(launched = app.gate.is_launched(), "Sign-in front end exiting");
    Ok(())
}

/// Initialize logging on stderr: JSON for log collectors, compact otherwise.
fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("kpr_auth=debug,info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .with_current_span(true)
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
