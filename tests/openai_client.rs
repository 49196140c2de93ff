//! HTTP-level tests for the OpenAI client against a local mock endpoint

#![cfg(feature = "openai")]

use serde_json::Value;
use sketchforge::{Error, Inference, OpenAiClient, ProcessKey, SynthConfig, SynthesisRequest};
use std::io::Read;
use std::sync::mpsc::{self, Receiver};
use std::time::Duration;
use tiny_http::{Response, Server};

struct Captured {
    authorization: String,
    body: Value,
}

/// Start a mock completions endpoint that answers every request with
/// `status` and `body`, and reports what it received.
fn mock_endpoint(status: u16, body: &'static str) -> (String, Receiver<Captured>) {
    let server = Server::http("127.0.0.1:0").unwrap();
    let url = format!("http://{}/v1/chat/completions", server.server_addr());
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for mut request in server.incoming_requests() {
            let mut raw = String::new();
            request.as_reader().read_to_string(&mut raw).unwrap();
            let authorization = request
                .headers()
                .iter()
                .find(|h| h.field.equiv("Authorization"))
                .map(|h| h.value.as_str().to_string())
                .unwrap_or_default();
            let _ = tx.send(Captured {
                authorization,
                body: serde_json::from_str(&raw).unwrap_or(Value::Null),
            });
            let resp = Response::from_string(body).with_status_code(status).with_header(
                "Content-Type: application/json"
                    .parse::<tiny_http::Header>()
                    .unwrap(),
            );
            let _ = request.respond(resp);
        }
    });
    (url, rx)
}

fn client(endpoint: String, process_key: Option<&str>) -> OpenAiClient {
    let config = SynthConfig { endpoint, ..Default::default() };
    OpenAiClient::new(config, ProcessKey::Fixed(process_key.map(str::to_string))).unwrap()
}

fn request(api_key: Option<&str>) -> SynthesisRequest {
    SynthesisRequest {
        image: "data:image/png;base64,iVBORw0KGgo=".into(),
        prior_markup: "No previous design has been provided this time.".into(),
        api_key: api_key.map(str::to_string),
    }
}

const OK_BODY: &str = r#"{"id":"chatcmpl-1","model":"gpt-4-vision-preview","choices":[{"index":0,"message":{"role":"assistant","content":"<!DOCTYPE html><html></html>"},"finish_reason":"stop"}]}"#;

#[tokio::test]
async fn sends_vision_request_with_process_key() {
    let (url, seen) = mock_endpoint(200, OK_BODY);
    let payload = client(url, Some("sk-process"))
        .infer(&request(Some("sk-caller")))
        .await
        .unwrap();

    assert_eq!(payload.primary_text(), Some("<!DOCTYPE html><html></html>"));

    let captured = seen.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(captured.authorization, "Bearer sk-process");
    let body = captured.body;
    assert_eq!(body["model"], "gpt-4-vision-preview");
    assert_eq!(body["temperature"], 0.0);
    assert_eq!(body["max_tokens"], 4096);
    assert_eq!(body["messages"][1]["content"][0]["image_url"]["detail"], "high");
    assert_eq!(
        body["messages"][1]["content"][2]["text"],
        "No previous design has been provided this time."
    );
}

#[tokio::test]
async fn falls_back_to_caller_key() {
    let (url, seen) = mock_endpoint(200, OK_BODY);
    client(url, None).infer(&request(Some("sk-caller"))).await.unwrap();
    let captured = seen.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(captured.authorization, "Bearer sk-caller");
}

#[tokio::test]
async fn missing_key_fails_before_network() {
    let (url, seen) = mock_endpoint(200, OK_BODY);
    let err = client(url, None).infer(&request(None)).await.unwrap_err();
    assert!(matches!(err, Error::MissingCredentials));
    assert!(seen.recv_timeout(Duration::from_millis(200)).is_err());
}

#[tokio::test]
async fn structured_error_becomes_api_error() {
    let (url, _seen) = mock_endpoint(
        401,
        r#"{"error":{"message":"Incorrect API key provided: sk-caller. You can find your API key at https://platform.openai.com/account/api-keys. Please check it and try again.","type":"invalid_request_error","code":"invalid_api_key"}}"#,
    );
    let err = client(url, None).infer(&request(Some("sk-caller"))).await.unwrap_err();
    match err {
        Error::ApiError { preview } => {
            assert_eq!(preview.chars().count(), 100);
            assert!(preview.starts_with("Incorrect API key provided"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn raw_send_passes_error_bodies_through() {
    let (url, _seen) = mock_endpoint(429, r#"{"error":{"message":"Rate limit reached"}}"#);
    let value = client(url, Some("k")).send_raw(&request(None)).await.unwrap();
    assert_eq!(value["error"]["message"], "Rate limit reached");
}

#[tokio::test]
async fn non_json_failure_is_remote_error() {
    let (url, _seen) = mock_endpoint(502, "Bad Gateway");
    let err = client(url, Some("k")).infer(&request(None)).await.unwrap_err();
    assert!(matches!(err, Error::RemoteError(_)));
}

#[tokio::test]
async fn unreachable_endpoint_is_remote_error() {
    // Bind and drop to get a port nothing listens on
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let err = client(format!("http://127.0.0.1:{port}/v1/chat/completions"), Some("k"))
        .infer(&request(None))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::RemoteError(_)));
}
