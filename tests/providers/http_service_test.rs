//! HTTP intent service client against a one-shot local server.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use mailsift::providers::http::parse_service_response;
use mailsift::providers::{
    check_http_response, HttpIntentService, IntentService, ServiceError,
};
use mailsift::types::Message;

/// Serve one response, returning the URL and the raw request received.
async fn serve_once(status_line: &str, body: &str) -> (String, oneshot::Receiver<String>) {
    let listener = match TcpListener::bind("127.0.0.1:0").await {
        Ok(listener) => listener,
        Err(err) => panic!("listener should bind: {err}"),
    };
    let addr = match listener.local_addr() {
        Ok(addr) => addr,
        Err(err) => panic!("listener should expose local addr: {err}"),
    };

    let (tx, rx) = oneshot::channel();
    let status_line_owned = status_line.to_owned();
    let body_owned = body.to_owned();
    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {status_line_owned}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body_owned}",
            body_owned.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
        let _ = tx.send(request);
    });

    (format!("http://{addr}/classify"), rx)
}

/// Read headers plus a `Content-Length` body.
async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        let read = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..read]);
        let text = String::from_utf8_lossy(&buf).into_owned();
        if let Some(split) = text.find("\r\n\r\n") {
            let length = text[..split]
                .lines()
                .find_map(|line| {
                    let lower = line.to_ascii_lowercase();
                    lower
                        .strip_prefix("content-length:")
                        .and_then(|v| v.trim().parse::<usize>().ok())
                })
                .unwrap_or(0);
            if buf.len() >= split.saturating_add(4).saturating_add(length) {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

fn service(url: &str) -> HttpIntentService {
    match HttpIntentService::new(url, Duration::from_secs(5)) {
        Ok(service) => service,
        Err(err) => panic!("service should build: {err}"),
    }
}

fn message() -> Message {
    Message::new("m1", "alice@example.com", None, "Can we meet Tuesday?")
        .with_subject("Catch up")
}

#[tokio::test]
async fn successful_response_is_parsed() {
    let (url, request) =
        serve_once("200 OK", r#"{"intent":"calendar.event","confidence":0.92}"#).await;
    let result = service(&url).classify(&message()).await;
    let intent = match result {
        Ok(intent) => intent,
        Err(err) => panic!("service should answer: {err}"),
    };
    assert_eq!(intent.intent, "calendar.event");
    assert!((intent.confidence - 0.92).abs() < 1e-9);

    let raw = match request.await {
        Ok(raw) => raw,
        Err(err) => panic!("server should report the request: {err}"),
    };
    assert!(raw.starts_with("POST /classify"));
    assert!(raw.contains(r#""subject":"Catch up""#));
    assert!(raw.contains(r#""id":"m1""#));
}

#[tokio::test]
async fn error_status_is_reported_with_redacted_body() {
    let (url, _request) = serve_once(
        "500 Internal Server Error",
        r#"{"error":"cannot classify mail from alice@example.com"}"#,
    )
    .await;
    match service(&url).classify(&message()).await {
        Err(ServiceError::HttpStatus { status, body }) => {
            assert_eq!(status, 500);
            assert!(!body.contains("alice@example.com"));
            assert!(body.contains("[REDACTED]"));
        }
        other => panic!("expected http status error, got: {other:?}"),
    }
}

#[tokio::test]
async fn long_error_bodies_are_truncated() {
    let body = "x".repeat(2000);
    let (url, _request) = serve_once("503 Service Unavailable", &body).await;
    let response = match reqwest::get(&url).await {
        Ok(response) => response,
        Err(err) => panic!("request should complete: {err}"),
    };
    match check_http_response(response).await {
        Err(ServiceError::HttpStatus { body, .. }) => {
            assert!(body.ends_with("...[truncated]"));
        }
        other => panic!("expected http status error, got: {other:?}"),
    }
}

#[tokio::test]
async fn malformed_success_body_is_a_parse_error() {
    let (url, _request) = serve_once("200 OK", "not json").await;
    let result = service(&url).classify(&message()).await;
    assert!(matches!(result, Err(ServiceError::Parse(_))));
}

#[test]
fn invalid_endpoints_are_rejected() {
    assert!(matches!(
        HttpIntentService::new("not a url", Duration::from_secs(1)),
        Err(ServiceError::InvalidUrl(_))
    ));
    assert!(matches!(
        HttpIntentService::new("ftp://example.com/classify", Duration::from_secs(1)),
        Err(ServiceError::InvalidUrl(_))
    ));
}

#[test]
fn service_is_named_after_its_host() {
    let service = service("https://intents.example.com/v1/classify");
    assert_eq!(service.name(), "intents.example.com");
    assert_eq!(service.endpoint().path(), "/v1/classify");
}

#[test]
fn response_bounds_are_checked() {
    assert!(parse_service_response(r#"{"intent":"finance.payment","confidence":1.0}"#).is_ok());
    assert!(matches!(
        parse_service_response(r#"{"intent":"finance.payment","confidence":1.2}"#),
        Err(ServiceError::Parse(_))
    ));
    assert!(matches!(
        parse_service_response(r#"{"intent":"  ","confidence":0.5}"#),
        Err(ServiceError::Parse(_))
    ));
    assert!(matches!(
        parse_service_response(r#"{"confidence":0.5}"#),
        Err(ServiceError::Parse(_))
    ));
}
