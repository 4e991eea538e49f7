// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use kpr_auth::config::Config;
use kpr_auth::db::{FirestoreDb, MemoryProfileStore};
use kpr_auth::error::{AuthError, Result};
use kpr_auth::flow::{Button, Message, Screen, Slot, View};
use kpr_auth::launch::{AppLoader, LoaderConfig};
use kpr_auth::models::Session;
use kpr_auth::services::{
    AuthDeps, AuthService, IdentityProvider, PhoneChallenge, PinApiClient, SessionSlot,
    StaticVerifier,
};
use kpr_auth::storage::DeviceStorage;
use kpr_auth::AuthApp;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// PIN every mock backend accepts.
#[allow(dead_code)]
pub const GOOD_PIN: &str = "482913";

/// SMS code the fake provider accepts.
#[allow(dead_code)]
pub const GOOD_OTP: &str = "654321";

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a Firestore connection to the emulator. The session channel is
/// never fed, so requests go out with the emulator's owner credentials.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    let (_tx, rx) = watch::channel(None);
    FirestoreDb::new("test-project", "(default)", rx)
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// A session that expires in an hour.
#[allow(dead_code)]
pub fn test_session(uid: &str) -> Session {
    Session {
        uid: uid.to_string(),
        email: None,
        phone: None,
        is_anonymous: false,
        id_token: format!("id-token-{}", uid),
        refresh_token: format!("refresh-{}", uid),
        expires_at: Utc::now() + chrono::Duration::hours(1),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// IDENTITY PROVIDER
// ═══════════════════════════════════════════════════════════════════════════

/// Scriptable identity provider. Custom tokens look like `token:<uid>`.
#[derive(Default)]
pub struct FakeIdentityProvider {
    sessions: SessionSlot,
    pub never_ready: AtomicBool,
    pub fail_ready: AtomicBool,
    pub sms_error: Mutex<Option<AuthError>>,
    pub ready_calls: AtomicUsize,
    pub custom_token_calls: AtomicUsize,
    pub sms_calls: AtomicUsize,
    pub confirm_calls: AtomicUsize,
    pub last_verification_token: Mutex<Option<String>>,
}

#[allow(dead_code)]
impl FakeIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend the provider restored a session from a previous run.
    pub fn restore(&self, session: Session) {
        self.sessions.publish(session);
    }

    pub fn fail_sms_with(&self, err: AuthError) {
        *self.sms_error.lock().unwrap() = Some(err);
    }

    /// Total calls that would have hit the network.
    pub fn network_calls(&self) -> usize {
        self.custom_token_calls.load(Ordering::SeqCst)
            + self.sms_calls.load(Ordering::SeqCst)
            + self.confirm_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn ready(&self) -> Result<()> {
        self.ready_calls.fetch_add(1, Ordering::SeqCst);
        if self.never_ready.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_ready.load(Ordering::SeqCst) {
            return Err(AuthError::provider(
                "auth/network-request-failed",
                "provider unreachable",
            ));
        }
        Ok(())
    }

    async fn sign_in_with_custom_token(&self, token: &str) -> Result<Session> {
        self.custom_token_calls.fetch_add(1, Ordering::SeqCst);
        let uid = token
            .strip_prefix("token:")
            .ok_or_else(|| AuthError::provider("auth/invalid-custom-token", "bad token"))?;
        let session = test_session(uid);
        self.sessions.publish(session.clone());
        Ok(session)
    }

    async fn start_phone_verification(
        &self,
        phone: &str,
        verification_token: &str,
    ) -> Result<PhoneChallenge> {
        self.sms_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_verification_token.lock().unwrap() = Some(verification_token.to_string());
        if let Some(err) = self.sms_error.lock().unwrap().take() {
            return Err(err);
        }
        Ok(PhoneChallenge {
            session_info: format!("session-info-{}", phone),
            phone: phone.to_string(),
        })
    }

    async fn confirm_phone_verification(
        &self,
        challenge: &PhoneChallenge,
        code: &str,
    ) -> Result<Session> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        if code != GOOD_OTP {
            return Err(AuthError::provider(
                "auth/invalid-verification-code",
                "The SMS verification code is invalid.",
            ));
        }
        let uid = format!("phone-{}", challenge.phone.trim_start_matches('+'));
        let mut session = test_session(&uid);
        session.phone = Some(challenge.phone.clone());
        self.sessions.publish(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        self.sessions.clear();
        Ok(())
    }

    fn current_session(&self) -> Option<Session> {
        self.sessions.current()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Session>> {
        self.sessions.subscribe()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// VIEW AND LOADER
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    Render(Screen),
    Message(Slot, Message),
    Busy(Button, bool),
    OfflineNotice,
    HideOverlay,
}

/// View that records everything it is asked to show.
#[derive(Default)]
pub struct RecordingView {
    events: Mutex<Vec<ViewEvent>>,
}

#[allow(dead_code)]
impl RecordingView {
    pub fn events(&self) -> Vec<ViewEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn last_screen(&self) -> Option<Screen> {
        self.events().into_iter().rev().find_map(|e| match e {
            ViewEvent::Render(screen) => Some(screen),
            _ => None,
        })
    }

    /// Text of the most recent message shown in `slot`.
    pub fn last_message(&self, slot: Slot) -> Option<Message> {
        self.events().into_iter().rev().find_map(|e| match e {
            ViewEvent::Message(s, message) if s == slot => Some(message),
            _ => None,
        })
    }

    pub fn count(&self, wanted: &ViewEvent) -> usize {
        self.events().iter().filter(|e| *e == wanted).count()
    }

    fn push(&self, event: ViewEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl View for RecordingView {
    fn render(&self, screen: &Screen) {
        self.push(ViewEvent::Render(screen.clone()));
    }

    fn show_message(&self, slot: Slot, message: &Message) {
        self.push(ViewEvent::Message(slot, message.clone()));
    }

    fn set_busy(&self, button: Button, busy: bool) {
        self.push(ViewEvent::Busy(button, busy));
    }

    fn show_offline_notice(&self) {
        self.push(ViewEvent::OfflineNotice);
    }

    fn hide_overlay(&self) {
        self.push(ViewEvent::HideOverlay);
    }
}

/// App loader that counts invocations.
#[derive(Default)]
pub struct RecordingLoader {
    pub loads: AtomicUsize,
    pub last_version: Mutex<Option<String>>,
}

#[allow(dead_code)]
impl RecordingLoader {
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl AppLoader for RecordingLoader {
    fn load(&self, config: &LoaderConfig) -> Result<()> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        *self.last_version.lock().unwrap() = Some(config.service_worker_version.clone());
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// MOCK PIN API
// ═══════════════════════════════════════════════════════════════════════════

/// Hit counters and switches for the mock PIN backend.
#[derive(Default)]
pub struct PinApiState {
    pub request_hits: AtomicUsize,
    pub verify_hits: AtomicUsize,
    /// When set, request-pin answers 503 with this body
    pub request_failure: Mutex<Option<String>>,
    pub last_request: Mutex<Option<Value>>,
}

#[allow(dead_code)]
impl PinApiState {
    pub fn hits(&self) -> usize {
        self.request_hits.load(Ordering::SeqCst) + self.verify_hits.load(Ordering::SeqCst)
    }
}

async fn request_pin(
    State(state): State<Arc<PinApiState>>,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    state.request_hits.fetch_add(1, Ordering::SeqCst);
    *state.last_request.lock().unwrap() = Some(body);
    if let Some(failure) = state.request_failure.lock().unwrap().clone() {
        return (StatusCode::SERVICE_UNAVAILABLE, failure);
    }
    (StatusCode::OK, json!({ "message": "PIN sent" }).to_string())
}

/// Accepts [`GOOD_PIN`] for any address; the custom token names the uid
/// `user-<local part>`.
async fn verify_pin(
    State(state): State<Arc<PinApiState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state.verify_hits.fetch_add(1, Ordering::SeqCst);
    let email = body["email"].as_str().unwrap_or_default();
    if body["pin"].as_str() != Some(GOOD_PIN) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid or expired PIN" })),
        );
    }
    let local = email.split('@').next().unwrap_or_default();
    (
        StatusCode::OK,
        Json(json!({ "customToken": format!("token:user-{}", local), "name": "Alice" })),
    )
}

/// Serve `router` on an ephemeral local port and return its base URL.
#[allow(dead_code)]
pub async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Start the mock PIN backend.
#[allow(dead_code)]
pub async fn spawn_pin_api() -> (String, Arc<PinApiState>) {
    let state = Arc::new(PinApiState::default());
    let router = Router::new()
        .route("/api/auth/request-pin", post(request_pin))
        .route("/api/auth/verify-pin", post(verify_pin))
        .with_state(state.clone());
    (serve(router).await, state)
}

// ═══════════════════════════════════════════════════════════════════════════
// HARNESS
// ═══════════════════════════════════════════════════════════════════════════

/// Fully wired sign-in stack with fakes at every external boundary.
#[allow(dead_code)]
pub struct Harness {
    pub config: Config,
    pub provider: Arc<FakeIdentityProvider>,
    pub profiles: Arc<MemoryProfileStore>,
    pub storage: DeviceStorage,
    pub pin_api: Arc<PinApiState>,
    pub view: Arc<RecordingView>,
    pub loader: Arc<RecordingLoader>,
    pub app: AuthApp,
}

#[allow(dead_code)]
impl Harness {
    pub async fn new() -> Self {
        Self::with_storage(DeviceStorage::in_memory()).await
    }

    pub async fn with_storage(storage: DeviceStorage) -> Self {
        Self::build(storage, Arc::new(FakeIdentityProvider::new())).await
    }

    pub async fn build(storage: DeviceStorage, provider: Arc<FakeIdentityProvider>) -> Self {
        Self::configured(storage, provider, |_| {}).await
    }

    /// Build with config overrides applied on top of the test defaults.
    pub async fn configured(
        storage: DeviceStorage,
        provider: Arc<FakeIdentityProvider>,
        tweak: impl FnOnce(&mut Config),
    ) -> Self {
        let (base_url, pin_api) = spawn_pin_api().await;
        let mut config = Config {
            pin_api_base_url: base_url,
            ready_timeout: Duration::from_millis(200),
            ..Config::test_default()
        };
        tweak(&mut config);
        let profiles = Arc::new(MemoryProfileStore::new());
        let view = Arc::new(RecordingView::default());
        let loader = Arc::new(RecordingLoader::default());

        let auth = Arc::new(AuthService::new(
            &config,
            AuthDeps {
                provider: provider.clone(),
                profiles: profiles.clone(),
                pin_api: PinApiClient::new(&config.pin_api_base_url, config.request_timeout)
                    .unwrap(),
                verifier: Arc::new(StaticVerifier::new(Some("recaptcha-ok".to_string()))),
                storage: storage.clone(),
            },
        ));
        let app = AuthApp::assemble(&config, auth, view.clone(), Some(loader.clone()));

        Self {
            config,
            provider,
            profiles,
            storage,
            pin_api,
            view,
            loader,
            app,
        }
    }

    pub fn auth(&self) -> &AuthService {
        &self.app.auth
    }
}
