//! Local service tests: auth gate, routing, and the client round trip

#![cfg(feature = "service")]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sketchforge::rendering::Color;
use sketchforge::{
    BasicCredentials, Error, Inference, LocalService, MemoryCanvas, ProcessKey, ServiceClient,
    ServiceConfig, Shape, ShapeProps, SynthConfig, SynthesisRequest, Synthesizer,
};
use std::sync::Arc;
use tiny_http::{Response, Server};

const PAGE_COMPLETION: &str = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"Here it is:\n<!DOCTYPE html><html><body>ok</body></html>\nThanks"}}]}"#;

fn mock_endpoint(status: u16, body: &'static str) -> String {
    let server = Server::http("127.0.0.1:0").unwrap();
    let url = format!("http://{}/v1/chat/completions", server.server_addr());
    std::thread::spawn(move || {
        for request in server.incoming_requests() {
            let resp = Response::from_string(body).with_status_code(status).with_header(
                "Content-Type: application/json"
                    .parse::<tiny_http::Header>()
                    .unwrap(),
            );
            let _ = request.respond(resp);
        }
    });
    url
}

fn creds() -> BasicCredentials {
    BasicCredentials { username: "ada".into(), password: "s3cret".into() }
}

fn config(endpoint: String, auth: Option<BasicCredentials>, key: Option<&str>) -> ServiceConfig {
    ServiceConfig {
        addr: "127.0.0.1:0".parse().unwrap(),
        auth,
        process_key: ProcessKey::Fixed(key.map(str::to_string)),
        synth: SynthConfig { endpoint, ..Default::default() },
    }
}

fn body() -> serde_json::Value {
    serde_json::json!({ "image": "data:image/png;base64,AAAA", "html": "none", "apiKey": "sk-ui" })
}

#[tokio::test(flavor = "multi_thread")]
async fn forwards_raw_completion() {
    let upstream = mock_endpoint(200, PAGE_COMPLETION);
    let service = LocalService::bind(config(upstream, None, Some("sk-env"))).unwrap().spawn();

    let resp = reqwest::Client::new()
        .post(format!("{}/api/toHtml", service.base_url()))
        .json(&body())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert!(json["choices"][0]["message"]["content"].as_str().unwrap().contains("<!DOCTYPE html>"));

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn requires_basic_auth_when_configured() {
    let upstream = mock_endpoint(200, PAGE_COMPLETION);
    let service = LocalService::bind(config(upstream, Some(creds()), Some("sk-env"))).unwrap().spawn();
    let http = reqwest::Client::new();
    let url = format!("{}/api/toHtml", service.base_url());

    let denied = http.post(&url).json(&body()).send().await.unwrap();
    assert_eq!(denied.status().as_u16(), 401);
    assert_eq!(
        denied.headers()["www-authenticate"].to_str().unwrap(),
        "Basic realm=\"Secure Area\""
    );

    let allowed = http
        .post(&url)
        .header("Authorization", format!("Basic {}", BASE64.encode("ada:s3cret")))
        .json(&body())
        .send()
        .await
        .unwrap();
    assert_eq!(allowed.status().as_u16(), 200);

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn rejects_other_methods_and_paths() {
    let upstream = mock_endpoint(200, PAGE_COMPLETION);
    let service = LocalService::bind(config(upstream, None, Some("sk-env"))).unwrap().spawn();
    let http = reqwest::Client::new();

    let get = http.get(format!("{}/api/toHtml", service.base_url())).send().await.unwrap();
    assert_eq!(get.status().as_u16(), 405);
    let missing = http.post(format!("{}/nope", service.base_url())).send().await.unwrap();
    assert_eq!(missing.status().as_u16(), 404);

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn malformed_body_is_generic_500() {
    let upstream = mock_endpoint(200, PAGE_COMPLETION);
    let service = LocalService::bind(config(upstream, None, Some("sk-env"))).unwrap().spawn();

    let resp = reqwest::Client::new()
        .post(format!("{}/api/toHtml/route", service.base_url()))
        .body("not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 500);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["message"], "Server error");

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn client_maps_missing_credentials_back() {
    let upstream = mock_endpoint(200, PAGE_COMPLETION);
    let service = LocalService::bind(config(upstream, None, None)).unwrap().spawn();

    let request = SynthesisRequest {
        image: "data:image/png;base64,AAAA".into(),
        prior_markup: "none".into(),
        api_key: None,
    };
    let err = ServiceClient::new(&service.base_url())
        .unwrap()
        .infer(&request)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MissingCredentials));

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn client_surfaces_upstream_api_error() {
    let upstream = mock_endpoint(400, r#"{"error":{"message":"Invalid image."}}"#);
    let service = LocalService::bind(config(upstream, None, Some("sk-env"))).unwrap().spawn();

    let request = SynthesisRequest {
        image: "data:image/png;base64,AAAA".into(),
        prior_markup: "none".into(),
        api_key: None,
    };
    let err = ServiceClient::new(&service.base_url())
        .unwrap()
        .infer(&request)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Invalid image....");

    service.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn pipeline_through_service_commits_page() {
    let upstream = mock_endpoint(200, PAGE_COMPLETION);
    let service = LocalService::bind(config(upstream, Some(creds()), None)).unwrap().spawn();

    let canvas = Arc::new(MemoryCanvas::new());
    canvas.insert(Shape::new(
        0.0,
        0.0,
        ShapeProps::Geo { w: 120.0, h: 80.0, fill: Color::TRANSPARENT, stroke: Color::BLACK },
    ));
    canvas.select_all();
    let client = ServiceClient::new(&service.base_url()).unwrap().with_basic_auth(creds());
    let synth = Synthesizer::new(canvas.clone(), Arc::new(client), SynthConfig::default());

    let id = synth.synthesize_selection(Some("sk-ui")).await.unwrap();
    let markup = canvas.get(&id).unwrap().preview().unwrap().markup().unwrap().to_string();
    assert_eq!(markup, "<!DOCTYPE html><html><body>ok</body></html>");

    service.shutdown().await.unwrap();
}
