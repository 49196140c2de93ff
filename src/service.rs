//! Local HTTP service: the hop between a browser-side canvas and the model.
//!
//! One route, `POST /api/toHtml`, takes `{image, html, apiKey}` and answers
//! with the model's raw completion payload, structured error bodies
//! included. Every other failure is a 500 with a generic body. When basic
//! auth credentials are configured, every request must carry them.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Read;
use std::sync::Arc;
use tiny_http::{Header, Method, Request, Response, Server};

use crate::inference::{CompletionPayload, Inference, OpenAiClient, SynthesisRequest};
use crate::{BasicCredentials, Error, Result, ServiceConfig};

pub const ROUTE: &str = "/api/toHtml";
/// Older clients post to this path
pub const LEGACY_ROUTE: &str = "/api/toHtml/route";

const REALM: &str = "Basic realm=\"Secure Area\"";
const MAX_BODY_BYTES: u64 = 32 * 1024 * 1024;

/// Why the service answered 500
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MissingCredentials,
    BadRequest,
    Remote,
}

/// Body of every 500 response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceErrorBody {
    pub message: String,
    #[serde(default)]
    pub kind: Option<FailureKind>,
}

impl ServiceErrorBody {
    fn generic(kind: FailureKind) -> Self {
        Self { message: "Server error".into(), kind: Some(kind) }
    }
}

struct State {
    auth: Option<BasicCredentials>,
    client: OpenAiClient,
}

struct Reply {
    status: u16,
    body: String,
    json: bool,
    challenge: bool,
}

impl Reply {
    fn json(status: u16, value: &impl Serialize) -> Self {
        let body = serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string());
        Self { status, body, json: true, challenge: false }
    }

    fn text(status: u16, body: &str) -> Self {
        Self { status, body: body.to_string(), json: false, challenge: false }
    }

    fn failure(kind: FailureKind) -> Self {
        Self::json(500, &ServiceErrorBody::generic(kind))
    }

    fn unauthorized() -> Self {
        Self { challenge: true, ..Self::text(401, "Authentication required.") }
    }

    fn into_response(self) -> Response<std::io::Cursor<Vec<u8>>> {
        let mut resp = Response::from_string(self.body).with_status_code(self.status);
        let content_type = if self.json { "application/json" } else { "text/plain; charset=utf-8" };
        if let Ok(h) = Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes()) {
            resp = resp.with_header(h);
        }
        if self.challenge {
            if let Ok(h) = Header::from_bytes(&b"WWW-Authenticate"[..], REALM.as_bytes()) {
                resp = resp.with_header(h);
            }
        }
        resp
    }
}

/// Check an `Authorization` header value against the configured pair.
pub fn check_basic_auth(header: Option<&str>, expected: &BasicCredentials) -> bool {
    let Some(encoded) = header.and_then(|h| h.trim().strip_prefix("Basic ")) else {
        return false;
    };
    let Ok(decoded) = BASE64.decode(encoded.trim()) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    match decoded.split_once(':') {
        Some((user, pass)) => user == expected.username && pass == expected.password,
        None => false,
    }
}

fn route_of(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

async fn handle(state: &State, method: &Method, url: &str, authorization: Option<&str>, body: &str) -> Reply {
    if let Some(expected) = &state.auth {
        if !check_basic_auth(authorization, expected) {
            return Reply::unauthorized();
        }
    }

    let path = route_of(url);
    if path != ROUTE && path != LEGACY_ROUTE {
        return Reply::text(404, "Not Found");
    }
    if *method != Method::Post {
        return Reply::text(405, "Method Not Allowed");
    }

    let request: SynthesisRequest = match serde_json::from_str(body) {
        Ok(r) => r,
        Err(e) => {
            error!("malformed synthesis request: {e}");
            return Reply::failure(FailureKind::BadRequest);
        }
    };

    match state.client.send_raw(&request).await {
        Ok(payload) => Reply::json(200, &payload),
        Err(Error::MissingCredentials) => {
            error!("{}", Error::MissingCredentials);
            Reply::failure(FailureKind::MissingCredentials)
        }
        Err(e) => {
            error!("synthesis request failed: {e}");
            Reply::failure(FailureKind::Remote)
        }
    }
}

fn authorization_of(request: &Request) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|h| h.field.equiv("Authorization"))
        .map(|h| h.value.as_str().to_string())
}

/// The local service, bound but not yet serving.
pub struct LocalService {
    server: Arc<Server>,
    state: Arc<State>,
}

impl LocalService {
    /// Bind the listener. Without basic auth only loopback addresses are
    /// accepted.
    pub fn bind(config: ServiceConfig) -> Result<Self> {
        if config.auth.is_none() && !config.addr.ip().is_loopback() {
            return Err(Error::ConfigError(format!(
                "refusing to serve on {} without BASIC_AUTH_USERNAME and BASIC_AUTH_PASSWORD",
                config.addr
            )));
        }
        let client = OpenAiClient::new(config.synth.clone(), config.process_key.clone())?;
        let server = Server::http(config.addr)
            .map_err(|e| Error::ServiceError(format!("cannot listen on {}: {e}", config.addr)))?;
        if config.auth.is_none() {
            warn!("basic auth is not configured; the service accepts every request");
        }
        Ok(Self {
            server: Arc::new(server),
            state: Arc::new(State { auth: config.auth, client }),
        })
    }

    /// Address the server is listening on (`host:port`)
    pub fn local_addr(&self) -> String {
        self.server.server_addr().to_string()
    }

    /// Serve until the listener is unblocked.
    ///
    /// Requests are accepted on a blocking thread and handled as
    /// independent tasks on the current runtime.
    pub async fn run(self) -> Result<()> {
        info!("> Ready on http://{}", self.local_addr());
        let runtime = tokio::runtime::Handle::current();
        let server = self.server.clone();
        let state = self.state.clone();

        tokio::task::spawn_blocking(move || {
            for mut request in server.incoming_requests() {
                let mut body = String::new();
                let read = request
                    .as_reader()
                    .take(MAX_BODY_BYTES)
                    .read_to_string(&mut body);
                let state = state.clone();
                runtime.spawn(async move {
                    let method = request.method().clone();
                    let url = request.url().to_string();
                    debug!("{method} {url}");
                    let reply = match read {
                        Ok(_) => handle(&state, &method, &url, authorization_of(&request).as_deref(), &body).await,
                        Err(e) => {
                            error!("failed to read request body: {e}");
                            Reply::failure(FailureKind::BadRequest)
                        }
                    };
                    if let Err(e) = request.respond(reply.into_response()) {
                        warn!("failed to send response for {url}: {e}");
                    }
                });
            }
        })
        .await
        .map_err(|e| Error::ServiceError(format!("accept loop failed: {e}")))
    }

    /// Serve on a background task.
    pub fn spawn(self) -> ServiceHandle {
        let server = self.server.clone();
        let addr = self.local_addr();
        let task = tokio::spawn(self.run());
        ServiceHandle { server, addr, task }
    }
}

/// A running service started with `LocalService::spawn`.
pub struct ServiceHandle {
    server: Arc<Server>,
    addr: String,
    task: tokio::task::JoinHandle<Result<()>>,
}

impl ServiceHandle {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn shutdown(self) -> Result<()> {
        self.server.unblock();
        self.task
            .await
            .map_err(|e| Error::ServiceError(format!("service task failed: {e}")))?
    }
}

/// Inference through a running local service.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    http: reqwest::Client,
    url: String,
    auth: Option<BasicCredentials>,
    error_preview_len: usize,
}

impl ServiceClient {
    /// `base_url` is the service root, e.g. `http://localhost:3000`.
    pub fn new(base_url: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: format!("{}{ROUTE}", base_url.trim_end_matches('/')),
            auth: None,
            error_preview_len: crate::SynthConfig::default().error_preview_len,
        })
    }

    pub fn with_basic_auth(mut self, credentials: BasicCredentials) -> Self {
        self.auth = Some(credentials);
        self
    }

    pub fn with_error_preview_len(mut self, len: usize) -> Self {
        self.error_preview_len = len;
        self
    }
}

#[async_trait]
impl Inference for ServiceClient {
    async fn infer(&self, request: &SynthesisRequest) -> Result<CompletionPayload> {
        let mut req = self.http.post(&self.url).json(request);
        if let Some(creds) = &self.auth {
            req = req.basic_auth(&creds.username, Some(&creds.password));
        }
        let resp = req.send().await.map_err(|e| {
            warn!("local service request to {} failed: {e}", self.url);
            Error::RemoteError(e.to_string())
        })?;

        let status = resp.status();
        let text = resp.text().await?;
        if status.as_u16() == 401 {
            return Err(Error::RemoteError("the service rejected our credentials".into()));
        }
        if !status.is_success() {
            let kind = serde_json::from_str::<ServiceErrorBody>(&text)
                .ok()
                .and_then(|b| b.kind);
            return Err(match kind {
                Some(FailureKind::MissingCredentials) => Error::MissingCredentials,
                _ => Error::RemoteError(format!("service returned {status}")),
            });
        }
        let value: Value = serde_json::from_str(&text)
            .map_err(|e| Error::RemoteError(format!("service returned invalid JSON: {e}")))?;
        CompletionPayload::from_value(value)?.into_result(self.error_preview_len)
    }
}
