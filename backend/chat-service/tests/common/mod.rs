#![allow(dead_code)]

use chat_service::config::{Config, StoreBackend, WsConfig};
use chat_service::models::UserId;
use chat_service::state::AppState;
use chat_service::store::{MemoryStore, SharedStore};
use chat_service::websocket::WireEvent;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub state: AppState,
}

pub fn test_config() -> Config {
    Config {
        port: 0,
        store_backend: StoreBackend::Memory,
        db: None,
        identity_header: actix_middleware::DEFAULT_IDENTITY_HEADER.to_string(),
        max_page_size: 50,
        ws: WsConfig::default(),
        seed_users: Vec::new(),
    }
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let shared: SharedStore = store.clone();
        let state = AppState::new(shared, Arc::new(test_config()));
        Self { store, state }
    }

    pub async fn user(&self, name: &str) -> UserId {
        self.store.add_user(name).await.id
    }

    /// Request from `a`, accepted by `b`
    pub async fn befriend(&self, a: UserId, b: UserId) {
        let request = self
            .state
            .friends
            .request_friend(a, b, "hi")
            .await
            .expect("friend request");
        self.state
            .coordinator
            .accept_friend_request(b, request.id)
            .await
            .expect("accept");
    }
}

/// Next frame queued for a connection, failing the test after one second
pub async fn next_frame(rx: &mut UnboundedReceiver<String>) -> WireEvent {
    let raw = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("timed out waiting for a frame")
        .expect("outbound queue closed");
    serde_json::from_str(&raw).expect("frame is a WireEvent")
}

/// Every frame already queued
pub fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<WireEvent> {
    let mut frames = Vec::new();
    while let Ok(raw) = rx.try_recv() {
        frames.push(serde_json::from_str(&raw).expect("frame is a WireEvent"));
    }
    frames
}
