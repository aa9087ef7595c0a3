//! The WebSocket connector against a local tokio-tungstenite server.

use chia_api::transport::Message;
use chia_api::{ChiaApi, ChiaError, ClientConfig, QueryStatus};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as Frame;

/// Accept one connection and answer requests with `respond`, pushing
/// `push` after the first `get_version` reply.
async fn serve_once(
    respond: impl Fn(&Message) -> Value + Send + 'static,
    push: Option<Message>,
) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut socket = tokio_tungstenite::accept_async(tcp).await.unwrap();
        let mut push = push;

        while let Some(Ok(frame)) = socket.next().await {
            let Frame::Text(text) = frame else {
                continue;
            };
            let request: Message = serde_json::from_str(&text).unwrap();
            let reply = request.response(respond(&request));
            socket
                .send(Frame::Text(serde_json::to_string(&reply).unwrap()))
                .await
                .unwrap();

            if request.command == "get_version" {
                if let Some(event) = push.take() {
                    socket
                        .send(Frame::Text(serde_json::to_string(&event).unwrap()))
                        .await
                        .unwrap();
                }
            }
        }
    });

    url
}

fn daemon_reply(request: &Message) -> Value {
    match request.command.as_str() {
        "register_service" => json!({"success": true}),
        "get_version" => json!({"success": true, "version": "2.4.1"}),
        "is_running" => json!({
            "success": true,
            "service_name": request.data["service"],
            "is_running": true,
        }),
        other => json!({"success": false, "error": format!("Unknown command: {}", other)}),
    }
}

#[tokio::test]
async fn test_query_over_websocket() {
    let url = serve_once(daemon_reply, None).await;
    let api = ChiaApi::new();
    api.initialize_config(ClientConfig::new(url));

    let version = api.query("getVersion", Value::Null).unwrap();
    let state = version.settled().await;
    assert_eq!(state.status, QueryStatus::Fulfilled);
    assert_eq!(state.data, Some(json!("2.4.1")));

    let running = api
        .fetch("isServiceRunning", &json!({"service": "chia_wallet"}))
        .await
        .unwrap();
    assert_eq!(running, json!(true));

    let unknown = api.fetch("getKeys", &json!({})).await;
    match unknown {
        Err(ChiaError::Remote { command, message }) => {
            assert_eq!(command, "get_keys");
            assert!(message.contains("Unknown command"));
        }
        other => panic!("Expected Remote error, got: {:?}", other),
    }

    api.shutdown().await;
}

#[tokio::test]
async fn test_push_reaches_listener_over_websocket() {
    let event = Message::event(
        "daemon",
        "wallet_ui",
        "keyring_status_changed",
        json!({"is_keyring_locked": false}),
    );
    let url = serve_once(daemon_reply, Some(event)).await;
    let api = ChiaApi::new();
    api.initialize_config(ClientConfig::new(url));

    let client = api.registry().client().await.unwrap();
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let _listener = client.add_listener(std::sync::Arc::new(move |message: &Message| {
        let _ = tx.send(message.command.clone());
    }));
    api.fetch("getVersion", &Value::Null).await.unwrap();

    let command = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap();
    assert_eq!(command.as_deref(), Some("keyring_status_changed"));
}

#[tokio::test]
async fn test_connection_refused() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    drop(listener);

    let api = ChiaApi::new();
    api.initialize_config(ClientConfig::new(url));
    let result = api.fetch("getVersion", &Value::Null).await;
    assert!(matches!(result, Err(ChiaError::Connection { .. })), "{:?}", result);
}

#[tokio::test]
async fn test_invalid_url_is_rejected() {
    let api = ChiaApi::new();
    api.initialize_config(ClientConfig::new("http://localhost:55400"));
    let result = api.fetch("getVersion", &Value::Null).await;
    assert!(matches!(result, Err(ChiaError::Config { .. })), "{:?}", result);
}
