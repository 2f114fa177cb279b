// tests/common/mod.rs
pub use axum::Router;
pub use tokio::task::JoinHandle;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::Client;

use crate::parser::token_codec::{encode_unsigned, ClaimSet};
use crate::session::{AuthTokenListener, CorrelationId, SessionCoordinator};
use crate::sources::AuthTokenProvider;

pub static REST_URI: &str = "https://api.sandbox.example/rest/v3/";
pub static GRAPHQL_URI: &str = "https://api.sandbox.example/graphql";

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

pub fn claims(issued_at: i64, expires_at: i64) -> ClaimSet {
    ClaimSet {
        issued_at,
        expires_at,
        subject: "usr-3c1b2a9e".into(),
        issuer: Some("prg-7d4e8f10".into()),
        rest_uri: REST_URI.into(),
        graphql_uri: GRAPHQL_URI.into(),
        insights_uri: None,
        environment: Some("SANDBOX".into()),
    }
}

/// Unsigned credential valid for `lifetime_seconds`.
pub fn token(lifetime_seconds: i64) -> String {
    encode_unsigned(&claims(1_700_000_000, 1_700_000_000 + lifetime_seconds)).unwrap()
}

/// Provider that records every request and answers only when told to.
#[derive(Default)]
pub struct RecordingProvider {
    requests: Mutex<Vec<(CorrelationId, AuthTokenListener)>>,
}

impl RecordingProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, index: usize) -> (CorrelationId, AuthTokenListener) {
        self.requests.lock().unwrap()[index].clone()
    }

    pub fn succeed(&self, index: usize, raw_token: &str) {
        let (id, listener) = self.request(index);
        listener.on_success(id, raw_token);
    }

    pub fn fail(&self, index: usize, reason: &str) {
        let (id, listener) = self.request(index);
        listener.on_failure(id, reason);
    }
}

impl AuthTokenProvider for RecordingProvider {
    fn request_token(&self, correlation_id: CorrelationId, listener: AuthTokenListener) {
        self.requests.lock().unwrap().push((correlation_id, listener));
    }
}

/// Yield until `expected` callers are queued on the coordinator.
pub async fn wait_for_waiters(coordinator: &SessionCoordinator, expected: usize) {
    while coordinator.waiting_callers() != expected {
        tokio::task::yield_now().await;
    }
}
