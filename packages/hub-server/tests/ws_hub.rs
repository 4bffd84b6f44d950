//! End-to-end tests over real sockets: a hub per test on an OS-assigned
//! port, tokio-tungstenite workers talking to it.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use tradehub_server::{HubConfig, HubModule};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SECRET: &str = "hub-test-secret";

fn hub_config() -> HubConfig {
    HubConfig {
        shared_secret: SECRET.to_owned(),
        ..HubConfig::default()
    }
}

/// Starts a hub and returns its port plus the handle keeping it alive;
/// dropping the sender shuts the server down.
async fn spawn_hub(config: HubConfig) -> (u16, tokio::sync::watch::Sender<bool>) {
    let mut module = HubModule::new(config);
    let port = module.start().await.expect("bind");
    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        let _ = module
            .serve(async move {
                let _ = stop_rx.changed().await;
            })
            .await;
    });
    (port, stop_tx)
}

async fn connect(port: u16, instance_id: &str) -> Socket {
    let (socket, _) = connect_async(format!("ws://127.0.0.1:{port}/ws/{instance_id}"))
        .await
        .expect("connect");
    socket
}

async fn send_json(socket: &mut Socket, value: &Value) {
    socket
        .send(Message::Text(value.to_string().into()))
        .await
        .expect("send");
}

async fn recv_message(socket: &mut Socket) -> Message {
    tokio::time::timeout(Duration::from_secs(5), socket.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream ended")
        .expect("transport error")
}

async fn recv_json(socket: &mut Socket) -> Value {
    match recv_message(socket).await {
        Message::Text(text) => serde_json::from_str(&text).expect("frame is json"),
        other => panic!("expected text frame, got {other:?}"),
    }
}

async fn expect_close(socket: &mut Socket, code: u16) {
    loop {
        match recv_message(socket).await {
            Message::Close(Some(frame)) => {
                assert_eq!(u16::from(frame.code), code);
                return;
            }
            Message::Close(None) => panic!("close frame carried no code, expected {code}"),
            _ => {}
        }
    }
}

async fn authenticate(socket: &mut Socket, role: &str) {
    send_json(
        socket,
        &json!({"type": "auth", "id": "auth-1", "payload": {"token": SECRET, "role": role}}),
    )
    .await;
    let ack = recv_json(socket).await;
    assert_eq!(ack["payload"]["status"], "authenticated", "auth ack: {ack}");
}

#[tokio::test]
async fn auth_handshake_returns_identity() {
    let (port, _hub) = spawn_hub(hub_config()).await;
    let mut socket = connect(port, "p1").await;

    send_json(
        &mut socket,
        &json!({"type": "auth", "id": "a1", "payload": {"token": SECRET, "role": "preditor"}}),
    )
    .await;
    let ack = recv_json(&mut socket).await;

    assert_eq!(ack["type"], "ack");
    assert_eq!(ack["payload"]["ref_id"], "a1");
    assert_eq!(ack["payload"]["status"], "authenticated");
    assert_eq!(ack["payload"]["result"]["instance_id"], "p1");
    assert_eq!(ack["payload"]["result"]["role"], "preditor");
}

#[tokio::test]
async fn bad_token_is_rejected_then_closed_4001() {
    let (port, _hub) = spawn_hub(hub_config()).await;
    let mut socket = connect(port, "p1").await;

    send_json(
        &mut socket,
        &json!({"type": "auth", "id": "a1", "payload": {"token": "wrong"}}),
    )
    .await;
    let error = recv_json(&mut socket).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["payload"]["message"], "Invalid token");
    assert_eq!(error["payload"]["code"], 4001);

    expect_close(&mut socket, 4001).await;
}

#[tokio::test]
async fn silent_connection_is_closed_4001_after_grace() {
    let (port, _hub) = spawn_hub(HubConfig {
        auth_timeout: Duration::from_millis(300),
        ..hub_config()
    })
    .await;
    let mut socket = connect(port, "quiet-1").await;

    expect_close(&mut socket, 4001).await;
}

#[tokio::test]
async fn bar_fans_out_to_preditor() {
    let (port, _hub) = spawn_hub(hub_config()).await;
    let mut connector = connect(port, "conn-01").await;
    let mut preditor = connect(port, "pred-01").await;
    authenticate(&mut connector, "connector").await;
    authenticate(&mut preditor, "preditor").await;

    send_json(
        &mut connector,
        &json!({"type": "bar", "payload": {"symbol": "EURUSD", "close": 1.085}}),
    )
    .await;

    let frame = recv_json(&mut preditor).await;
    assert_eq!(frame["type"], "bar");
    assert_eq!(frame["from"], "conn-01");
    assert_eq!(frame["payload"]["symbol"], "EURUSD");
    assert_eq!(frame["payload"]["close"], 1.085);
}

#[tokio::test]
async fn reconnect_replaces_and_closes_old_with_4000() {
    let (port, _hub) = spawn_hub(hub_config()).await;
    let mut first = connect(port, "bot-7").await;
    authenticate(&mut first, "bot").await;

    let mut second = connect(port, "bot-7").await;
    expect_close(&mut first, 4000).await;

    // The replacement starts a fresh, unauthenticated session.
    authenticate(&mut second, "bot").await;
}

#[tokio::test]
async fn command_ack_round_trip_relabels_for_issuer() {
    let (port, _hub) = spawn_hub(hub_config()).await;
    let mut admin = connect(port, "admin-01").await;
    let mut bot = connect(port, "bot-01").await;
    authenticate(&mut admin, "admin").await;
    authenticate(&mut bot, "bot").await;

    send_json(
        &mut admin,
        &json!({"type": "command", "id": "u-42", "payload": {"target": "bot-01", "action": "pause"}}),
    )
    .await;

    let command = recv_json(&mut bot).await;
    assert_eq!(command["type"], "command");
    assert_eq!(command["payload"]["action"], "pause");
    let cmd_id = command["id"].as_str().expect("command id").to_owned();
    assert!(cmd_id.starts_with("cmd-"));

    send_json(
        &mut bot,
        &json!({"type": "ack", "payload": {"ref_id": cmd_id, "status": "success", "result": {"paused": true}}}),
    )
    .await;

    let ack = recv_json(&mut admin).await;
    assert_eq!(ack["type"], "ack");
    assert_eq!(ack["payload"]["ref_id"], "u-42");
    assert_eq!(ack["payload"]["status"], "success");
    assert_eq!(ack["payload"]["result"]["paused"], true);
}

#[tokio::test]
async fn telemetry_is_acked_and_visible_over_rest() {
    let (port, _hub) = spawn_hub(hub_config()).await;
    let mut bot = connect(port, "bot-01").await;
    authenticate(&mut bot, "bot").await;

    send_json(
        &mut bot,
        &json!({"type": "telemetry", "id": "t1", "payload": {"balance": 10000.0}}),
    )
    .await;
    let ack = recv_json(&mut bot).await;
    assert_eq!(ack["payload"]["status"], "telemetry_ok");
    assert_eq!(ack["payload"]["result"]["count"], 1);

    let latest: Value = reqwest::get(format!("http://127.0.0.1:{port}/api/v1/telemetry/bot-01"))
        .await
        .expect("request")
        .json()
        .await
        .expect("json body");
    assert_eq!(latest["balance"], 10000.0);
    assert_eq!(latest["instance_id"], "bot-01");
}

#[tokio::test]
async fn rest_command_reaches_websocket_worker() {
    let (port, _hub) = spawn_hub(hub_config()).await;
    let mut bot = connect(port, "bot-01").await;
    authenticate(&mut bot, "bot").await;

    let response: Value = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{port}/api/v1/command"))
        .json(&json!({"token": SECRET, "target": "bot-01", "action": "pause"}))
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json body");
    assert_eq!(response["status"], "sent");
    let cmd_id = response["cmd_id"].as_str().expect("cmd id");

    let command = recv_json(&mut bot).await;
    assert_eq!(command["id"], cmd_id);
    assert_eq!(command["payload"]["action"], "pause");
}

#[tokio::test]
async fn health_reflects_connections() {
    let (port, _hub) = spawn_hub(hub_config()).await;
    let mut bot = connect(port, "bot-01").await;
    authenticate(&mut bot, "bot").await;

    let health: Value = reqwest::get(format!("http://127.0.0.1:{port}/health"))
        .await
        .expect("request")
        .json()
        .await
        .expect("json body");
    assert_eq!(health["status"], "ok");
    assert_eq!(health["connections"], 1);
    assert_eq!(health["authenticated"], 1);
    assert!(health["uptime_s"].is_number());
}

#[tokio::test]
async fn messages_before_auth_are_rejected() {
    let (port, _hub) = spawn_hub(hub_config()).await;
    let mut socket = connect(port, "x1").await;

    send_json(&mut socket, &json!({"type": "bar", "payload": {}})).await;
    let error = recv_json(&mut socket).await;
    assert_eq!(error["type"], "error");
    assert!(error["payload"]["message"]
        .as_str()
        .expect("message")
        .contains("Not authenticated"));
    assert_eq!(error["payload"]["code"], 4001);

    // A non-auth first frame also costs the connection.
    expect_close(&mut socket, 4001).await;
}
