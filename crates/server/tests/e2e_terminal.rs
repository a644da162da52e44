//! End-to-end tests for the terminal service.
//!
//! These tests run the real HTTP/WebSocket server with the container
//! backend disabled, so every connection exercises the fallback chain
//! down to a live local shell. No Docker daemon is required.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use server::config::Config;
use server::http::{router, AppState};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Start a server on an ephemeral port with the container backend
/// disabled, returning its address.
async fn start_test_server() -> SocketAddr {
    let mut config = Config::default();
    config.container.enabled = false;
    config.session.default_shell = "/bin/sh".to_string();
    config.session.workspace_dir = std::env::temp_dir();

    let state = AppState::new(config);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    addr
}

/// Open a terminal WebSocket against the test server.
async fn connect_terminal(addr: SocketAddr, query: &str) -> WsClient {
    let url = format!("ws://{}/ws/pty{}", addr, query);
    let (ws, _) = connect_async(url.as_str())
        .await
        .expect("websocket connect failed");
    ws
}

/// Read messages until the collected output contains `needle` or the
/// timeout elapses. Returns everything collected either way.
async fn collect_until(ws: &mut WsClient, needle: &str, timeout: Duration) -> String {
    let mut collected = String::new();
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline && !collected.contains(needle) {
        match tokio::time::timeout(Duration::from_millis(250), ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => collected.push_str(&text),
            Ok(Some(Ok(_))) => {}
            Ok(Some(Err(_))) | Ok(None) => break,
            Err(_) => {}
        }
    }

    collected
}

// =============================================================================
// Fallback Chain
// =============================================================================

#[tokio::test]
async fn test_fallback_produces_working_shell() {
    let addr = start_test_server().await;
    let mut ws = connect_terminal(addr, "").await;

    // The degradation notice arrives before any shell output.
    let banner = collect_until(&mut ws, "local shell fallback", Duration::from_secs(5)).await;
    assert!(
        banner.contains("Docker not available on server; using local shell fallback."),
        "missing fallback notice, got: {banner:?}"
    );

    ws.send(Message::Text("echo integration_marker_1".to_string()))
        .await
        .unwrap();

    let output = collect_until(&mut ws, "integration_marker_1", Duration::from_secs(10)).await;
    assert!(
        output.contains("integration_marker_1"),
        "shell did not execute the command, got: {output:?}"
    );

    ws.close(None).await.ok();
}

#[tokio::test]
async fn test_image_query_parameter_is_accepted_on_fallback() {
    // The image keyword only matters for the container backend, but the
    // connection must still come up when it is present.
    let addr = start_test_server().await;
    let mut ws = connect_terminal(addr, "?image=python").await;

    ws.send(Message::Text("echo image_param_ok".to_string()))
        .await
        .unwrap();

    let output = collect_until(&mut ws, "image_param_ok", Duration::from_secs(10)).await;
    assert!(output.contains("image_param_ok"));

    ws.close(None).await.ok();
}

// =============================================================================
// Control Frames
// =============================================================================

#[tokio::test]
async fn test_resize_roundtrip() {
    let addr = start_test_server().await;
    let mut ws = connect_terminal(addr, "").await;

    ws.send(Message::Text(
        r#"{"type":"resize","cols":100,"rows":40}"#.to_string(),
    ))
    .await
    .unwrap();

    // Same-connection ordering: the resize is applied before the command
    // below reaches the shell.
    ws.send(Message::Text("stty size".to_string())).await.unwrap();

    let output = collect_until(&mut ws, "40 100", Duration::from_secs(10)).await;
    assert!(
        output.contains("40 100"),
        "PTY did not report the new geometry, got: {output:?}"
    );

    ws.close(None).await.ok();
}

#[tokio::test]
async fn test_control_frame_is_never_echoed_as_input() {
    let addr = start_test_server().await;
    let mut ws = connect_terminal(addr, "").await;

    ws.send(Message::Text(
        r#"{"type":"resize","cols":90,"rows":30}"#.to_string(),
    ))
    .await
    .unwrap();
    ws.send(Message::Text("echo after_control".to_string()))
        .await
        .unwrap();

    let output = collect_until(&mut ws, "after_control", Duration::from_secs(10)).await;
    // A forwarded control frame would be echoed back by the PTY.
    assert!(
        !output.contains(r#""type":"resize""#),
        "control frame leaked into terminal input: {output:?}"
    );
    assert!(output.contains("after_control"));

    ws.close(None).await.ok();
}

#[tokio::test]
async fn test_malformed_json_is_forwarded_as_input() {
    let addr = start_test_server().await;
    let mut ws = connect_terminal(addr, "").await;

    // Wait for the shell to come up before typing.
    ws.send(Message::Text("echo ready_marker".to_string()))
        .await
        .unwrap();
    collect_until(&mut ws, "ready_marker", Duration::from_secs(10)).await;

    ws.send(Message::Text("{not json".to_string())).await.unwrap();

    // The PTY echoes typed input, so the garbage line must come back.
    let output = collect_until(&mut ws, "{not json", Duration::from_secs(10)).await;
    assert!(
        output.contains("{not json"),
        "malformed JSON was swallowed instead of forwarded: {output:?}"
    );

    ws.close(None).await.ok();
}

#[tokio::test]
async fn test_check_tools_returns_structured_replies() {
    let addr = start_test_server().await;
    let mut ws = connect_terminal(addr, "").await;

    ws.send(Message::Text(r#"{"type":"check_tools"}"#.to_string()))
        .await
        .unwrap();

    // One tool frame per probed binary; pip3 is probed last.
    let output = collect_until(&mut ws, r#""tool":"pip3""#, Duration::from_secs(15)).await;
    for tool in ["node", "npm", "python3", "pip3"] {
        assert!(
            output.contains(&format!(r#""tool":"{}""#, tool)),
            "missing tool report for {tool}: {output:?}"
        );
    }

    ws.close(None).await.ok();
}

#[tokio::test]
async fn test_signal_terminates_shell() {
    let addr = start_test_server().await;
    let mut ws = connect_terminal(addr, "").await;

    // Make sure the shell is alive first.
    ws.send(Message::Text("echo alive_marker".to_string()))
        .await
        .unwrap();
    collect_until(&mut ws, "alive_marker", Duration::from_secs(10)).await;

    ws.send(Message::Text(
        r#"{"type":"signal","signal":"SIGKILL"}"#.to_string(),
    ))
    .await
    .unwrap();

    let output = collect_until(&mut ws, "exited with code", Duration::from_secs(10)).await;
    assert!(
        output.contains("Shell process exited with code"),
        "no exit notice after SIGKILL: {output:?}"
    );
}

// =============================================================================
// Operational HTTP Surface
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let addr = start_test_server().await;

    let body = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    assert_eq!(body, "OK");
}

#[tokio::test]
async fn test_sessions_listing_is_empty_without_containers() {
    let addr = start_test_server().await;

    // Fallback connections are not container sessions and must not
    // appear in the registry.
    let mut ws = connect_terminal(addr, "").await;
    ws.send(Message::Text("echo hi".to_string())).await.unwrap();
    collect_until(&mut ws, "hi", Duration::from_secs(10)).await;

    let sessions: Vec<serde_json::Value> =
        reqwest::get(format!("http://{}/sessions", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

    assert!(sessions.is_empty());

    ws.close(None).await.ok();
}

#[tokio::test]
async fn test_kill_unknown_session_returns_not_found() {
    let addr = start_test_server().await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/sessions/s-missing-abcdef/kill", addr))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "No such session");
}
