// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! App launch gate: hides the sign-in surface and boots the embedded app
//! runtime exactly once.

use crate::error::{AuthError, Result};
use crate::flow::View;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Fixed bootstrap configuration handed to the runtime loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Cache-busting version token for the runtime's service worker
    pub service_worker_version: String,
}

/// Entry point of the embedded app runtime. The load is fire-and-forget.
pub trait AppLoader: Send + Sync {
    fn load(&self, config: &LoaderConfig) -> Result<()>;
}

/// Result of a launch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    Launched,
    AlreadyLaunched,
    /// No loader, or the loader failed. Not retried.
    LoaderUnavailable,
}

pub struct LaunchGate {
    launched: AtomicBool,
    loader: Option<Arc<dyn AppLoader>>,
    view: Arc<dyn View>,
    config: LoaderConfig,
}

impl LaunchGate {
    pub fn new(view: Arc<dyn View>, loader: Option<Arc<dyn AppLoader>>, config: LoaderConfig) -> Self {
        Self {
            launched: AtomicBool::new(false),
            loader,
            view,
            config,
        }
    }

    /// Start the app. Only the first call has any effect.
    pub fn launch(&self) -> LaunchOutcome {
        if self.launched.swap(true, Ordering::SeqCst) {
            tracing::debug!("App already started, skipping");
            return LaunchOutcome::AlreadyLaunched;
        }

        tracing::info!("Starting app - user is authenticated");
        self.view.hide_overlay();

        let Some(loader) = self.loader.as_ref() else {
            tracing::error!("App loader not available");
            return LaunchOutcome::LoaderUnavailable;
        };

        match loader.load(&self.config) {
            Ok(()) => {
                tracing::info!(version = %self.config.service_worker_version, "App loader called");
                LaunchOutcome::Launched
            }
            Err(e) => {
                tracing::error!(error = %e, "App loader failed");
                LaunchOutcome::LoaderUnavailable
            }
        }
    }

    pub fn is_launched(&self) -> bool {
        self.launched.load(Ordering::SeqCst)
    }
}

/// Loader that spawns the app runtime as a child process.
///
/// The version token is passed as `APP_SERVICE_WORKER_VERSION`. The child
/// is not awaited.
pub struct ProcessLoader {
    command: String,
}

impl ProcessLoader {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl AppLoader for ProcessLoader {
    fn load(&self, config: &LoaderConfig) -> Result<()> {
        let mut parts = self.command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| AuthError::Launch("empty app command".to_string()))?;

        let child = std::process::Command::new(program)
            .args(parts)
            .env("APP_SERVICE_WORKER_VERSION", &config.service_worker_version)
            .spawn()
            .map_err(|e| AuthError::Launch(format!("failed to start {}: {}", program, e)))?;

        tracing::info!(pid = child.id(), program, "App runtime spawned");
        Ok(())
    }
}
