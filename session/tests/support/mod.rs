#![allow(dead_code)]
use cohortflow_session::{
    api::ApiClient,
    clock::ManualClock,
    session::store::{
        ACCESS_EXPIRY_KEY, ACCESS_TOKEN_KEY, REFRESH_EXPIRY_KEY, REFRESH_TOKEN_KEY, USER_KEY,
    },
    utils::storage::{KeyValueStore, MemoryStorage},
    AuthEvent, SessionConfig, SessionManager,
};
use httpmock::MockServer;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast::Receiver;

pub const NOW: i64 = 1_700_000_000_000;
pub const HOUR_MILLIS: i64 = 3_600_000;
pub const WEEK_MILLIS: i64 = 7 * 86_400_000;

pub fn user_json(role: &str) -> Value {
    json!({
        "id": "u1",
        "name": "Ada Lovelace",
        "email": "ada@example.com",
        "role": role,
        "avatar": "https://cdn.example.com/ada.png"
    })
}

pub fn session_json(access: &str, refresh: &str, expires_in: u64) -> Value {
    json!({
        "accessToken": access,
        "refreshToken": refresh,
        "expiresIn": expires_in,
        "user": user_json("admin")
    })
}

pub fn test_config(server: &MockServer) -> SessionConfig {
    SessionConfig {
        api_base_url: server.url("/api/v1"),
        request_timeout_secs: 5,
        ..SessionConfig::default()
    }
}

pub struct Harness {
    pub session: SessionManager,
    pub storage: Arc<MemoryStorage>,
    pub clock: Arc<ManualClock>,
    pub config: SessionConfig,
}

pub fn harness(server: &MockServer) -> Harness {
    harness_with_storage(server, Arc::new(MemoryStorage::new()))
}

pub fn harness_with_storage(server: &MockServer, storage: Arc<MemoryStorage>) -> Harness {
    harness_with_config(test_config(server), storage)
}

pub fn harness_with_config(config: SessionConfig, storage: Arc<MemoryStorage>) -> Harness {
    let clock = Arc::new(ManualClock::new(NOW));
    let api = ApiClient::new(&config).expect("build api client");
    let session = SessionManager::with_parts(api, storage.clone(), clock.clone(), &config);
    Harness {
        session,
        storage,
        clock,
        config,
    }
}

/// Storage holding a session as a previous process run would have left it.
pub fn seeded_storage(access_expiry: i64, refresh_expiry: i64, role: &str) -> Arc<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new());
    storage
        .set_items(&[
            (ACCESS_TOKEN_KEY, "access-1".into()),
            (ACCESS_EXPIRY_KEY, access_expiry.to_string()),
            (REFRESH_TOKEN_KEY, "refresh-1".into()),
            (REFRESH_EXPIRY_KEY, refresh_expiry.to_string()),
            (USER_KEY, user_json(role).to_string()),
        ])
        .expect("seed storage");
    storage
}

pub async fn next_event(events: &mut Receiver<AuthEvent>) -> AuthEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("auth event within timeout")
        .expect("auth event channel open")
}
