//! Client façade tests: pagination, preconditions, and level mapping.

use futures::StreamExt;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::client::{ Arguments, Client };
use crate::errors::Error;
use crate::protocol::{ Cursor, JsonRpcMessage, LogSeverity, LoggingLevel, Reference };
use crate::test_support::{ response, started_session, Harness };

async fn started_client() -> (Client, Harness) {
    let (session, harness) = started_session().await;
    (Client::new(session), harness)
}

/// Answer `tools/list` with page A (`nextCursor: "c1"`) then page B.
async fn serve_two_tool_pages(harness: &mut Harness) -> Vec<Option<String>> {
    let mut cursors = Vec::new();
    for page in 0..2 {
        let request = harness.sent_request().await;
        assert_eq!(request.method, "tools/list");
        let cursor = request.params
            .as_ref()
            .and_then(|params| params.get("cursor"))
            .and_then(|cursor| cursor.as_str())
            .map(String::from);
        cursors.push(cursor);

        let id = match request.id {
            crate::protocol::RequestId::Number(n) => n,
            other => panic!("expected numeric id, got {other:?}"),
        };
        let result = if page == 0 {
            json!({ "tools": [{ "name": "t1" }, { "name": "t2" }], "nextCursor": "c1" })
        } else {
            json!({ "tools": [{ "name": "t3" }] })
        };
        harness.push(response(id, result));
    }
    cursors
}

#[tokio::test]
async fn list_tools_gathers_all_pages_in_order() {
    let (client, mut harness) = started_client().await;
    let ctx = CancellationToken::new();

    let task = tokio::spawn(async move { serve_two_tool_pages(&mut harness).await });
    let tools = client.list_tools(&ctx).await.unwrap();

    let names: Vec<_> = tools.iter().map(|tool| tool.name.as_str()).collect();
    assert_eq!(names, vec!["t1", "t2", "t3"]);

    // Exactly two requests: the first without a cursor, the second with "c1".
    let cursors = task.await.unwrap();
    assert_eq!(cursors, vec![None, Some("c1".to_string())]);
}

#[tokio::test]
async fn stream_tools_yields_the_same_sequence_lazily() {
    let (client, mut harness) = started_client().await;
    let ctx = CancellationToken::new();

    let server = tokio::spawn(async move { serve_two_tool_pages(&mut harness).await });

    let mut names = Vec::new();
    let mut stream = std::pin::pin!(client.stream_tools(ctx));
    while let Some(tool) = stream.next().await {
        names.push(tool.unwrap().name);
    }
    assert_eq!(names, vec!["t1", "t2", "t3"]);
    server.await.unwrap();
}

#[tokio::test]
async fn list_tools_page_requests_a_single_page() {
    let (client, mut harness) = started_client().await;
    let ctx = CancellationToken::new();

    let server = tokio::spawn(async move {
        let request = harness.sent_request().await;
        assert_eq!(request.params.unwrap()["cursor"], json!("c7"));
        harness.push(response(1, json!({ "tools": [] })));
    });

    let page = client.list_tools_page(Some(Cursor::from("c7")), &ctx).await.unwrap();
    assert!(page.tools.is_empty());
    assert!(page.next_cursor.is_none());
    server.await.unwrap();
}

#[tokio::test]
async fn failed_page_aborts_the_gather() {
    let (client, mut harness) = started_client().await;
    let ctx = CancellationToken::new();

    let server = tokio::spawn(async move {
        let request = harness.sent_request().await;
        let id = request.id.clone();
        harness.push(
            response(
                match id {
                    crate::protocol::RequestId::Number(n) => n,
                    _ => unreachable!(),
                },
                json!({ "tools": [{ "name": "t1" }], "nextCursor": "c1" })
            )
        );
        let request = harness.sent_request().await;
        harness.push(
            JsonRpcMessage::Error(
                crate::protocol::JsonRpcError::new(
                    request.id,
                    crate::errors::ErrorData::new(-32603, "backend down")
                )
            )
        );
    });

    match client.list_tools(&ctx).await {
        Err(Error::Rpc(data)) => assert_eq!(data.message, "backend down"),
        other => panic!("expected rpc error, got {other:?}"),
    }
    server.await.unwrap();
}

#[tokio::test]
async fn call_tool_round_trip() {
    let (client, mut harness) = started_client().await;
    let ctx = CancellationToken::new();

    let server = tokio::spawn(async move {
        let request = harness.sent_request().await;
        assert_eq!(request.method, "tools/call");
        let params = request.params.unwrap();
        assert_eq!(params["name"], json!("echo"));
        assert_eq!(params["arguments"]["text"], json!("hello"));
        assert_eq!(params["arguments"]["count"], json!(2));
        harness.push(
            response(1, json!({ "content": [{ "type": "text", "text": "hello hello" }] }))
        );
    });

    let result = client.call_tool(
        "echo",
        Arguments::new().with("text", "hello").with("count", 2),
        &ctx
    ).await.unwrap();
    assert_eq!(result.content.len(), 1);
    server.await.unwrap();
}

#[tokio::test]
async fn blank_names_fail_before_any_wire_activity() {
    let (client, harness) = started_client().await;
    let ctx = CancellationToken::new();

    for result in [
        client.call_tool("", Arguments::new(), &ctx).await.err(),
        client.call_tool("   ", Arguments::new(), &ctx).await.err(),
        client.get_prompt(" ", Arguments::new(), &ctx).await.err(),
        client.read_resource("", &ctx).await.err(),
        client.subscribe_resource("  ", &ctx).await.err(),
    ] {
        match result {
            Some(Error::InvalidArgument(_)) => {}
            other => panic!("expected InvalidArgument, got {other:?}"),
        }
    }

    // Nothing reached the transport.
    let mut harness = harness;
    assert!(harness.outbound.try_recv().is_err());
}

#[tokio::test]
async fn blank_argument_name_is_rejected() {
    let (client, mut harness) = started_client().await;
    let ctx = CancellationToken::new();

    match client.call_tool("echo", Arguments::new().with(" ", 1), &ctx).await {
        Err(Error::InvalidArgument(_)) => {}
        other => panic!("expected InvalidArgument, got {other:?}"),
    }
    assert!(harness.outbound.try_recv().is_err());
}

#[tokio::test]
async fn invalid_reference_is_rejected() {
    let (client, mut harness) = started_client().await;
    let ctx = CancellationToken::new();

    let reference = Reference::Prompt { name: "".to_string() };
    match client.complete(reference, "arg", "val", &ctx).await {
        Err(Error::InvalidArgument(_)) => {}
        other => panic!("expected InvalidArgument, got {other:?}"),
    }
    assert!(harness.outbound.try_recv().is_err());
}

#[tokio::test]
async fn complete_sends_reference_and_argument() {
    let (client, mut harness) = started_client().await;
    let ctx = CancellationToken::new();

    let server = tokio::spawn(async move {
        let request = harness.sent_request().await;
        assert_eq!(request.method, "completion/complete");
        let params = request.params.unwrap();
        assert_eq!(params["ref"]["type"], json!("ref/prompt"));
        assert_eq!(params["ref"]["name"], json!("greeting"));
        assert_eq!(params["argument"]["name"], json!("language"));
        harness.push(response(1, json!({ "completion": { "values": ["english"] } })));
    });

    let result = client.complete(
        Reference::Prompt { name: "greeting".to_string() },
        "language",
        "eng",
        &ctx
    ).await.unwrap();
    assert_eq!(result.completion.values, vec!["english"]);
    server.await.unwrap();
}

#[tokio::test]
async fn set_logging_level_accepts_generic_severity() {
    let (client, mut harness) = started_client().await;
    let ctx = CancellationToken::new();

    let server = tokio::spawn(async move {
        let request = harness.sent_request().await;
        assert_eq!(request.method, "logging/setLevel");
        assert_eq!(request.params.unwrap()["level"], json!("warning"));
        harness.push(response(1, json!({})));
    });

    client.set_logging_level(LogSeverity::Warn, &ctx).await.unwrap();
    server.await.unwrap();
}

#[test]
fn severity_table_matches_the_fixed_mapping() {
    let table = [
        (LogSeverity::Trace, LoggingLevel::Debug),
        (LogSeverity::Debug, LoggingLevel::Debug),
        (LogSeverity::Info, LoggingLevel::Info),
        (LogSeverity::Warn, LoggingLevel::Warning),
        (LogSeverity::Error, LoggingLevel::Error),
        (LogSeverity::Critical, LoggingLevel::Critical),
        (LogSeverity::None, LoggingLevel::Emergency),
    ];
    for (severity, expected) in table {
        assert_eq!(LoggingLevel::from(severity), expected);
    }
}

#[tokio::test]
async fn initialize_handshake_and_acknowledgement() {
    let (client, mut harness) = started_client().await;
    let ctx = CancellationToken::new();

    let server = tokio::spawn(async move {
        let request = harness.sent_request().await;
        assert_eq!(request.method, "initialize");
        let params = request.params.unwrap();
        assert_eq!(params["protocolVersion"], json!("2024-11-05"));
        harness.push(
            response(
                1,
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": { "tools": { "listChanged": true } },
                    "serverInfo": { "name": "test-server", "version": "0.1.0" }
                })
            )
        );

        // The handshake ends with the initialized notification.
        match harness.sent().await {
            JsonRpcMessage::Notification(n) => {
                assert_eq!(n.method, "notifications/initialized");
            }
            other => panic!("expected initialized notification, got {other}"),
        }
    });

    let result = client.initialize(&ctx).await.unwrap();
    assert_eq!(result.server_info.name, "test-server");
    server.await.unwrap();
    assert!(client.server_info().await.is_some());
}

#[tokio::test]
async fn ping_returns_unit() {
    let (client, mut harness) = started_client().await;
    let ctx = CancellationToken::new();

    let server = tokio::spawn(async move {
        let request = harness.sent_request().await;
        assert_eq!(request.method, "ping");
        harness.push(response(1, json!({})));
    });

    client.ping(&ctx).await.unwrap();
    server.await.unwrap();
}
