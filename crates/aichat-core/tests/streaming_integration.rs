//! Integration tests for the streaming chat client.
//! Uses a minimal in-process HTTP server (no mocks).

use std::time::Duration;

use aichat_core::{ChatError, ChatMessage, OpenAIClient, Timeouts};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

const SSE_HEADERS: &str =
    "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n";

/// Read one HTTP request (headers plus Content-Length body) and return it as text
async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(header_end) = text.find("\r\n\r\n") {
            let content_length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

/// Serve a single connection, writing each part after its delay, then close
async fn serve_once(parts: Vec<(Duration, Vec<u8>)>) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        for (delay, bytes) in parts {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if socket.write_all(&bytes).await.is_err() {
                break;
            }
            let _ = socket.flush().await;
        }
        let _ = socket.shutdown().await;
        request
    });
    (format!("http://127.0.0.1:{}/v1", port), handle)
}

fn now(bytes: &str) -> (Duration, Vec<u8>) {
    (Duration::ZERO, bytes.as_bytes().to_vec())
}

fn later(ms: u64, bytes: &str) -> (Duration, Vec<u8>) {
    (Duration::from_millis(ms), bytes.as_bytes().to_vec())
}

#[tokio::test]
async fn streams_deltas_split_across_writes() {
    let (base_url, server) = serve_once(vec![
        now(SSE_HEADERS),
        now("data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n"),
        later(20, "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\nda"),
        later(20, "ta: {\"choices\":[{\"delta\":{\"content\":\"lo, \"}}]}\n\n"),
        later(20, "data: {\"choices\":[{\"delta\":{\"content\":\"world!\"}}]}\n\ndata: [DONE]\n\n"),
    ])
    .await;

    let client = OpenAIClient::new("sk-test", &base_url).unwrap();
    let messages = vec![ChatMessage::user("Say hello")];
    let mut stream = client
        .chat_stream("deepseek-chat", &messages)
        .await
        .expect("request should succeed");

    let mut deltas = Vec::new();
    while let Some(delta) = stream.next_delta().await.expect("stream should not fail") {
        deltas.push(delta);
    }
    assert_eq!(deltas.concat(), "Hello, world!");
    assert_eq!(deltas.len(), 3);

    let request = server.await.unwrap();
    let lower = request.to_lowercase();
    assert!(lower.starts_with("post /v1/chat/completions "));
    assert!(lower.contains("authorization: bearer sk-test"));
    assert!(request.contains("\"stream\":true"));
    assert!(request.contains("\"model\":\"deepseek-chat\""));
    assert!(request.contains("\"content\":\"Say hello\""));
}

#[tokio::test]
async fn stream_without_done_ends_at_eof() {
    let (base_url, _server) = serve_once(vec![
        now(SSE_HEADERS),
        now("data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}"),
    ])
    .await;

    let client = OpenAIClient::new("sk-test", &base_url).unwrap();
    let stream = client
        .chat_stream("m", &[ChatMessage::user("hi")])
        .await
        .unwrap();
    assert_eq!(stream.collect_text().await.unwrap(), "partial");
}

#[tokio::test]
async fn api_error_body_is_surfaced() {
    let body = r#"{"error":{"message":"Invalid API key","type":"invalid_request_error"}}"#;
    let response = format!(
        "HTTP/1.1 401 Unauthorized\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let (base_url, _server) = serve_once(vec![now(&response)]).await;

    let client = OpenAIClient::new("bad-key", &base_url).unwrap();
    let err = client
        .chat_stream("m", &[ChatMessage::user("hi")])
        .await
        .err()
        .expect("request should fail");

    match err {
        ChatError::Api { status, message } => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid API key");
        }
        other => panic!("expected API error, got {:?}", other),
    }
}

#[tokio::test]
async fn stalled_stream_times_out() {
    let (base_url, _server) = serve_once(vec![
        now(SSE_HEADERS),
        now("data: {\"choices\":[{\"delta\":{\"content\":\"first\"}}]}\n\n"),
        later(2_000, "data: [DONE]\n\n"),
    ])
    .await;

    let timeouts = Timeouts {
        connect: Duration::from_secs(1),
        read: Duration::from_millis(200),
    };
    let client = OpenAIClient::with_timeouts("sk-test", &base_url, timeouts).unwrap();
    let mut stream = client
        .chat_stream("m", &[ChatMessage::user("hi")])
        .await
        .unwrap();

    assert_eq!(stream.next_delta().await.unwrap().as_deref(), Some("first"));
    assert!(matches!(stream.next_delta().await, Err(ChatError::Timeout(_))));
}

#[tokio::test]
async fn lists_models_sorted() {
    let body = r#"{"object":"list","data":[{"id":"deepseek-reasoner","object":"model"},{"id":"deepseek-chat","object":"model"}]}"#;
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let (base_url, server) = serve_once(vec![now(&response)]).await;

    let client = OpenAIClient::new("sk-test", &base_url).unwrap();
    let models = client.list_models().await.unwrap();
    assert_eq!(models, vec!["deepseek-chat", "deepseek-reasoner"]);

    let request = server.await.unwrap();
    assert!(request.to_lowercase().starts_with("get /v1/models "));
}

#[tokio::test]
async fn slow_model_list_times_out() {
    let (base_url, _server) = serve_once(vec![later(
        2_000,
        "HTTP/1.1 200 OK\r\nContent-Length: 11\r\nConnection: close\r\n\r\n{\"data\":[]}",
    )])
    .await;

    let timeouts = Timeouts {
        connect: Duration::from_secs(1),
        read: Duration::from_millis(200),
    };
    let client = OpenAIClient::with_timeouts("sk-test", &base_url, timeouts).unwrap();
    assert!(matches!(client.list_models().await, Err(ChatError::Timeout(_))));
}
