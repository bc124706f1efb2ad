//! Transport tests: SSE event framing over an in-memory stream, and
//! stdio subprocess supervision against real child processes.

use std::time::Duration;
use tokio::io::AsyncReadExt;

use crate::errors::Error;
use crate::protocol::{ JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, RequestId };
use crate::transport::{ SseServerOptions, SseServerTransport, StdioConfig, StdioTransport, Transport };

/// Read from `reader` until `buffer` contains `needle` (or time out).
async fn read_until(reader: &mut (impl AsyncReadExt + Unpin), needle: &str) -> String {
    let mut collected = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let mut chunk = [0u8; 256];
        let n = tokio::time
            ::timeout_at(deadline, reader.read(&mut chunk)).await
            .expect("timed out reading stream")
            .expect("stream read");
        assert!(n > 0, "stream closed before {needle:?} arrived");
        collected.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&collected);
        if text.contains(needle) {
            return text.into_owned();
        }
    }
}

fn ping_request() -> JsonRpcMessage {
    JsonRpcMessage::Request(JsonRpcRequest::new(RequestId::Number(1), "ping", None))
}

#[tokio::test]
async fn sse_emits_endpoint_event_first_then_messages() {
    crate::test_support::init_tracing();
    let (server_end, mut client_end) = tokio::io::duplex(4096);
    let transport = SseServerTransport::new(server_end, SseServerOptions::default());
    transport.start().await.unwrap();

    let text = read_until(&mut client_end, "\n\n").await;
    assert!(
        text.starts_with("event: endpoint\ndata: /message\n\n"),
        "endpoint event must come first, got: {text}"
    );

    transport.send(&ping_request()).await.unwrap();
    let text = read_until(&mut client_end, "\n\n").await;
    assert!(text.starts_with("event: message\ndata: {"), "got: {text}");
    assert!(text.contains(r#""method":"ping""#), "got: {text}");

    transport.close().await.unwrap();
}

#[tokio::test]
async fn sse_send_before_start_is_not_connected() {
    crate::test_support::init_tracing();
    let (server_end, _client_end) = tokio::io::duplex(4096);
    let transport = SseServerTransport::new(server_end, SseServerOptions::default());

    match transport.send(&ping_request()).await {
        Err(Error::NotConnected { .. }) => {}
        other => panic!("expected NotConnected, got {other:?}"),
    }
}

#[tokio::test]
async fn sse_routes_out_of_band_messages_inbound() {
    crate::test_support::init_tracing();
    let (server_end, mut client_end) = tokio::io::duplex(4096);
    let transport = SseServerTransport::new(server_end, SseServerOptions::default());
    transport.start().await.unwrap();
    read_until(&mut client_end, "\n\n").await;

    let message = JsonRpcMessage::Notification(
        JsonRpcNotification::new("notifications/initialized", None)
    );
    transport.on_message_received(message.clone()).await.unwrap();
    assert_eq!(transport.receive().await, Some(message));
}

#[tokio::test]
async fn sse_close_is_idempotent_and_ends_the_stream() {
    crate::test_support::init_tracing();
    let (server_end, mut client_end) = tokio::io::duplex(4096);
    let transport = SseServerTransport::new(server_end, SseServerOptions::default());
    transport.start().await.unwrap();
    read_until(&mut client_end, "\n\n").await;

    transport.close().await.unwrap();
    transport.close().await.unwrap();
    assert!(!transport.is_connected());
    assert!(transport.receive().await.is_none());

    match transport.send(&ping_request()).await {
        Err(Error::NotConnected { .. }) => {}
        other => panic!("expected NotConnected after close, got {other:?}"),
    }
}

#[tokio::test]
async fn sse_respects_custom_endpoint_url() {
    crate::test_support::init_tracing();
    let (server_end, mut client_end) = tokio::io::duplex(4096);
    let options = SseServerOptions {
        message_endpoint: "/message?session_id=abc".to_string(),
        ..SseServerOptions::default()
    };
    let transport = SseServerTransport::new(server_end, options);
    transport.start().await.unwrap();

    let text = read_until(&mut client_end, "\n\n").await;
    assert!(text.starts_with("event: endpoint\ndata: /message?session_id=abc\n\n"));
}

#[tokio::test]
async fn stdio_round_trips_frames_through_a_subprocess() {
    crate::test_support::init_tracing();
    let transport = StdioTransport::new(StdioConfig::new("cat"));
    transport.start().await.unwrap();
    assert!(transport.is_connected());

    let message = ping_request();
    transport.send(&message).await.unwrap();
    let echoed = tokio::time
        ::timeout(Duration::from_secs(5), transport.receive()).await
        .expect("timed out")
        .expect("echoed frame");
    assert_eq!(echoed, message);

    transport.close().await.unwrap();
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn stdio_send_after_child_exit_reports_the_exit_status() {
    crate::test_support::init_tracing();
    let transport = StdioTransport::new(StdioConfig::new("true"));
    transport.start().await.unwrap();

    // Let the child exit and the reader observe EOF.
    tokio::time::sleep(Duration::from_millis(500)).await;

    match transport.send(&ping_request()).await {
        Err(Error::NotConnected { cause }) => {
            let cause = cause.expect("cause should carry the exit status");
            assert!(cause.contains("exit"), "cause: {cause}");
        }
        other => panic!("expected NotConnected, got {other:?}"),
    }
}

#[tokio::test]
async fn stdio_receive_yields_end_of_stream_after_child_exit() {
    crate::test_support::init_tracing();
    let transport = StdioTransport::new(StdioConfig::new("true"));
    transport.start().await.unwrap();

    let received = tokio::time
        ::timeout(Duration::from_secs(5), transport.receive()).await
        .expect("timed out");
    assert!(received.is_none());
}

#[tokio::test]
async fn stdio_close_is_idempotent() {
    crate::test_support::init_tracing();
    let transport = StdioTransport::new(StdioConfig::new("cat"));
    transport.start().await.unwrap();
    transport.close().await.unwrap();
    transport.close().await.unwrap();
    assert!(!transport.is_connected());
    assert!(transport.exit_status().is_some());
}
