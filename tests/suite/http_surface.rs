//! `/status` and `/optin` over a real socket.

use switchwatch_types::{SubscriberId, SwitchState};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::common::{TestServer, VERIFICATION_TOKEN};

fn client() -> reqwest::Client {
    reqwest::Client::new()
}

#[tokio::test]
async fn status_reports_current_state() {
    let server = TestServer::start().await;

    let body: serde_json::Value = client()
        .get(server.url("/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, serde_json::json!({ "state": false }));

    server.registry.set(SwitchState::ON);
    let response = client().get(server.url("/status")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/json"
    );
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "state": true }));

    server.stop().await;
}

#[tokio::test]
async fn opt_in_with_valid_token() {
    let server = TestServer::start().await;

    let response = client()
        .post(server.url("/optin"))
        .form(&[("user_id", "U024BE7LH"), ("token", VERIFICATION_TOKEN)])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(
        body,
        serde_json::json!({
            "response_type": "ephemeral",
            "text": "You have opted in for notifications, <@U024BE7LH>."
        })
    );
    assert!(
        server
            .registry
            .is_opted_in(&SubscriberId::new("U024BE7LH").unwrap())
    );

    server.stop().await;
}

#[tokio::test]
async fn opt_in_with_wrong_token_is_rejected() {
    let server = TestServer::start().await;

    let response = client()
        .post(server.url("/optin"))
        .form(&[("user_id", "U024BE7LH"), ("token", "guess")])
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    assert_eq!(response.text().await.unwrap().trim(), "Invalid user or token");
    assert_eq!(server.registry.subscriber_count(), 0);

    server.stop().await;
}

#[tokio::test]
async fn repeated_opt_in_is_idempotent() {
    let server = TestServer::start().await;

    for _ in 0..3 {
        let response = client()
            .post(server.url("/optin"))
            .form(&[("user_id", "U1"), ("token", VERIFICATION_TOKEN)])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }
    assert_eq!(server.registry.subscriber_count(), 1);

    server.stop().await;
}

#[tokio::test]
async fn concurrent_opt_ins_all_land() {
    let server = TestServer::start().await;
    let client = client();

    let requests = (0..20).map(|n| {
        let client = client.clone();
        let url = server.url("/optin");
        async move {
            client
                .post(url)
                .form(&[("user_id", format!("U{n}")), ("token", VERIFICATION_TOKEN.to_string())])
                .send()
                .await
                .unwrap()
                .status()
        }
    });
    let mut handles = Vec::new();
    for request in requests {
        handles.push(tokio::spawn(request));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), 200);
    }

    assert_eq!(server.registry.subscriber_count(), 20);
    server.stop().await;
}

#[tokio::test]
async fn unknown_path_and_wrong_method() {
    let server = TestServer::start().await;

    let missing = client().get(server.url("/nope")).send().await.unwrap();
    assert_eq!(missing.status(), 404);

    let wrong = client().get(server.url("/optin")).send().await.unwrap();
    assert_eq!(wrong.status(), 405);
    assert_eq!(wrong.headers()["allow"].to_str().unwrap(), "POST");

    server.stop().await;
}

#[tokio::test]
async fn oversized_body_is_refused() {
    let server = TestServer::start().await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream
        .write_all(b"POST /optin HTTP/1.1\r\nHost: pi\r\nContent-Length: 1000000\r\n\r\n")
        .await
        .unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8(response).unwrap();
    assert!(response.starts_with("HTTP/1.1 413 "), "got {response}");

    server.stop().await;
}

#[tokio::test]
async fn garbage_request_gets_400_and_server_keeps_serving() {
    let server = TestServer::start().await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    stream.write_all(b"\x00\x01garbage\r\n\r\n").await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    assert!(response.starts_with(b"HTTP/1.1 400 "));

    let status = client().get(server.url("/status")).send().await.unwrap();
    assert_eq!(status.status(), 200);

    server.stop().await;
}
