//! Pin readings through the monitor and dispatcher to a mock Slack.

use std::sync::Arc;
use std::time::Duration;

use switchwatch_core::{EdgeMonitor, ScriptedPin, StateRegistry, dispatch_queue, run_dispatcher};
use switchwatch_types::{Level, SwitchState};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{TestServer, posted_texts, slack_notifier, start_slack_mock};

const POLL: Duration = Duration::from_millis(5);

/// Run the monitor over `levels`, then let the dispatcher drain.
async fn drive(levels: &[Level], registry: Arc<StateRegistry>, slack: &MockServer) {
    let (queue, rx) = dispatch_queue(64);
    let dispatcher = tokio::spawn(run_dispatcher(
        Arc::new(slack_notifier(slack)),
        rx,
        CancellationToken::new(),
    ));

    let monitor_cancel = CancellationToken::new();
    let monitor = tokio::spawn(
        EdgeMonitor::new(ScriptedPin::from_levels(levels.to_vec()), registry).run(
            POLL,
            queue,
            monitor_cancel.clone(),
        ),
    );

    // Enough ticks to consume every scripted reading, with slack for CI.
    sleep(POLL * (levels.len() as u32 + 100)).await;
    monitor_cancel.cancel();
    monitor.await.unwrap();

    // The monitor dropped the only queue handle, so the dispatcher exits once drained.
    timeout(Duration::from_secs(5), dispatcher)
        .await
        .expect("dispatcher drains")
        .unwrap();
}

#[tokio::test]
async fn one_notification_per_level_change() {
    let slack = start_slack_mock().await;
    let levels = [
        Level::High,
        Level::High,
        Level::Low,
        Level::Low,
        Level::Low,
        Level::High,
        Level::Low,
        Level::High,
    ];

    drive(&levels, Arc::new(StateRegistry::new()), &slack).await;

    assert_eq!(
        posted_texts(&slack).await,
        vec![
            "Switch state changed to: true",
            "Switch state changed to: false",
            "Switch state changed to: true",
            "Switch state changed to: false",
        ]
    );
}

#[tokio::test]
async fn startup_level_is_not_announced() {
    let slack = start_slack_mock().await;
    let registry = Arc::new(StateRegistry::new());

    drive(&[Level::Low, Level::Low, Level::Low], Arc::clone(&registry), &slack).await;

    assert!(posted_texts(&slack).await.is_empty());
    assert_eq!(registry.get(), SwitchState::ON);
}

#[tokio::test]
async fn status_endpoint_sees_transition() {
    let slack = start_slack_mock().await;
    let server = TestServer::start().await;

    drive(&[Level::High, Level::Low], Arc::clone(&server.registry), &slack).await;

    let body: serde_json::Value = reqwest::get(server.url("/status"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, serde_json::json!({ "state": true }));
    assert_eq!(posted_texts(&slack).await, vec!["Switch state changed to: true"]);

    server.stop().await;
}

#[tokio::test]
async fn slack_outage_does_not_stop_monitoring() {
    let slack = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&slack)
        .await;
    let registry = Arc::new(StateRegistry::new());

    drive(
        &[Level::High, Level::Low, Level::High, Level::Low],
        Arc::clone(&registry),
        &slack,
    )
    .await;

    // One attempt per change, no retries.
    assert_eq!(slack.received_requests().await.unwrap().len(), 3);
    assert_eq!(registry.get(), SwitchState::ON);
}
