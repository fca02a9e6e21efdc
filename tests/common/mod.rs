//! Shared test utilities and fixtures

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use switchwatch_api::ApiState;
use switchwatch_core::StateRegistry;
use switchwatch_providers::SlackNotifier;
use switchwatch_types::SecretString;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const VERIFICATION_TOKEN: &str = "verify-me";

/// A running HTTP server bound to an ephemeral loopback port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Arc<StateRegistry>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind local listener");
        let addr = listener.local_addr().expect("listener local_addr");
        let registry = Arc::new(StateRegistry::new());
        let state = Arc::new(ApiState {
            registry: Arc::clone(&registry),
            verification_token: SecretString::new(VERIFICATION_TOKEN),
        });
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(switchwatch_api::serve(listener, state, cancel.clone()));

        Self {
            addr,
            registry,
            cancel,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        timeout(Duration::from_secs(2), self.handle)
            .await
            .expect("server stops on cancel")
            .expect("server task did not panic");
    }
}

/// Mock Slack Web API that accepts every `chat.postMessage`.
pub async fn start_slack_mock() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat.postMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "ok": true,
            "channel": "C0DOOR",
            "ts": "1700000000.000100"
        })))
        .mount(&server)
        .await;
    server
}

pub fn slack_notifier(server: &MockServer) -> SlackNotifier {
    SlackNotifier::new(
        &format!("{}/api", server.uri()),
        SecretString::new("xoxb-test"),
        "#door",
        Duration::from_secs(2),
    )
    .expect("client builds")
}

/// Texts of every `chat.postMessage` the mock received, in order.
pub async fn posted_texts(server: &MockServer) -> Vec<String> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| {
            let body: serde_json::Value =
                serde_json::from_slice(&request.body).expect("JSON request body");
            body["text"].as_str().unwrap_or_default().to_string()
        })
        .collect()
}
