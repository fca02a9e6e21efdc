//! Slack Web API client for `chat.postMessage`.
//!
//! Slack answers most application-level failures with HTTP 200 and a body of
//! `{"ok": false, "error": "<code>"}`, so success requires both a 2xx status
//! and `ok: true`.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use switchwatch_types::SecretString;

use crate::{
    Notifier, NotifyError, NotifyFut, http_client_with_timeout, truncate_error_body,
};

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct PostMessageResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct SlackNotifier {
    client: reqwest::Client,
    endpoint: String,
    token: SecretString,
    channel: String,
}

impl fmt::Debug for SlackNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlackNotifier")
            .field("endpoint", &self.endpoint)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl SlackNotifier {
    /// `api_base` is the Web API root, e.g. `https://slack.com/api`.
    pub fn new(
        api_base: &str,
        token: SecretString,
        channel: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        Ok(Self {
            client: http_client_with_timeout(timeout)?,
            endpoint: format!("{}/chat.postMessage", api_base.trim_end_matches('/')),
            token,
            channel: channel.into(),
        })
    }

    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub async fn post_message(&self, text: &str) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.token.expose_secret())
            .json(&PostMessageRequest {
                channel: &self.channel,
                text,
            })
            .send()
            .await
            .map_err(NotifyError::from_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(NotifyError::from_transport)?;

        if !status.is_success() {
            return Err(NotifyError::Status {
                status: status.as_u16(),
                body: truncate_error_body(&body),
            });
        }

        let parsed: PostMessageResponse = serde_json::from_str(&body)
            .map_err(|e| NotifyError::Decode(format!("{e}: {}", truncate_error_body(&body))))?;

        if parsed.ok {
            tracing::debug!(channel = %self.channel, "Slack message delivered");
            Ok(())
        } else {
            Err(NotifyError::Rejected(
                parsed.error.unwrap_or_else(|| "unknown_error".to_string()),
            ))
        }
    }
}

impl Notifier for SlackNotifier {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn send<'a>(&'a self, text: &'a str) -> NotifyFut<'a> {
        Box::pin(self.post_message(text))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use switchwatch_types::SecretString;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::SlackNotifier;
    use crate::{Notifier, NotifyError};

    fn notifier(server: &MockServer, timeout: Duration) -> SlackNotifier {
        SlackNotifier::new(
            &format!("{}/api/", server.uri()),
            SecretString::new("xoxb-test"),
            "#door",
            timeout,
        )
        .expect("client builds")
    }

    #[tokio::test]
    async fn posts_channel_and_text_with_bearer_token() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat.postMessage"))
            .and(header("authorization", "Bearer xoxb-test"))
            .and(body_json(serde_json::json!({
                "channel": "#door",
                "text": "Switch state changed to: true"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": true,
                "channel": "C123",
                "ts": "1700000000.000100"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let slack = notifier(&server, Duration::from_secs(5));
        slack
            .send("Switch state changed to: true")
            .await
            .expect("delivery succeeds");
    }

    #[tokio::test]
    async fn ok_false_is_rejected_after_one_attempt() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat.postMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "ok": false,
                "error": "channel_not_found"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = notifier(&server, Duration::from_secs(5))
            .send("hello")
            .await
            .unwrap_err();

        match err {
            NotifyError::Rejected(code) => assert_eq!(code, "channel_not_found"),
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_error_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat.postMessage"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
            .expect(1)
            .mount(&server)
            .await;

        let err = notifier(&server, Duration::from_secs(5))
            .send("hello")
            .await
            .unwrap_err();

        match err {
            NotifyError::Status { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "upstream down");
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat.postMessage"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "ok": true }))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let err = notifier(&server, Duration::from_millis(200))
            .send("hello")
            .await
            .unwrap_err();

        assert!(matches!(err, NotifyError::Timeout), "got {err:?}");
    }

    #[tokio::test]
    async fn non_json_success_body_is_a_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/chat.postMessage"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let err = notifier(&server, Duration::from_secs(5))
            .send("hello")
            .await
            .unwrap_err();

        assert!(matches!(err, NotifyError::Decode(_)), "got {err:?}");
    }

    #[test]
    fn debug_does_not_leak_token() {
        let slack = SlackNotifier::new(
            "https://slack.com/api",
            SecretString::new("xoxb-secret"),
            "#door",
            Duration::from_secs(1),
        )
        .unwrap();
        let rendered = format!("{slack:?}");
        assert!(!rendered.contains("xoxb-secret"));
        assert!(rendered.contains("https://slack.com/api/chat.postMessage"));
    }
}
