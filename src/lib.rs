//! Sketchforge
//!
//! Turns a hand-drawn wireframe on a drawing canvas into a runnable web page.
//! The selected shapes are rasterized, sent to a vision-capable chat model
//! together with any previously generated page in the selection, and the
//! HTML document in the answer is placed back on the canvas as a new shape.
//!
//! # Features
//!
//! - **openai** (default): direct client for an OpenAI-compatible chat
//!   completions endpoint
//! - **service** (default): a small HTTP service that forwards synthesis
//!   requests to the model, plus the client that talks to it
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use sketchforge::{MemoryCanvas, OpenAiClient, ProcessKey, SynthConfig, Synthesizer};
//!
//! # async fn run() -> sketchforge::Result<()> {
//! let canvas = Arc::new(MemoryCanvas::load("wireframe.json")?);
//! canvas.select_all();
//!
//! let config = SynthConfig::default();
//! let client = OpenAiClient::new(config.clone(), ProcessKey::Environment)?;
//! let synth = Synthesizer::new(canvas.clone(), Arc::new(client), config);
//!
//! let page = synth.synthesize_selection(None).await?;
//! println!("created {page}");
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;

pub mod error;
pub use error::{Error, Result};

pub mod canvas;
pub mod capture;
pub mod data_uri;
pub mod extract;
pub mod inference;
pub mod memory;
pub mod prior_art;
pub mod rendering;
pub mod synth;

// Local HTTP hop between a browser-side canvas and the model
#[cfg(feature = "service")]
pub mod service;

pub use canvas::{Bounds, Canvas, PreviewState, Shape, ShapeId, ShapeProps};
pub use capture::CapturedImage;
pub use inference::{CompletionPayload, ImageDetail, Inference, ProcessKey, SynthesisRequest};
pub use memory::MemoryCanvas;
pub use prior_art::PriorArt;
pub use synth::Synthesizer;

#[cfg(feature = "openai")]
pub use inference::OpenAiClient;

#[cfg(feature = "service")]
pub use service::{LocalService, ServiceClient};

/// Configuration for a synthesis pipeline
///
/// The defaults match the public OpenAI endpoint and a vision model, with
/// deterministic-leaning sampling and room for a full HTML document.
///
/// # Examples
///
/// ```
/// let cfg = sketchforge::SynthConfig::default();
/// assert_eq!(cfg.temperature, 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct SynthConfig {
    /// Chat completions endpoint
    pub endpoint: String,
    /// Model name sent with every request
    pub model: String,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f32,
    /// Vision detail level for the captured image
    pub image_detail: ImageDetail,
    /// Horizontal gap between the selection and the new page shape
    pub preview_gap: f64,
    /// How many characters of a remote error message to surface
    pub error_preview_len: usize,
}

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4-vision-preview";

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            temperature: 0.0,
            image_detail: ImageDetail::High,
            preview_gap: 60.0,
            error_preview_len: 100,
        }
    }
}

impl SynthConfig {
    /// Defaults overlaid with `SKETCHFORGE_ENDPOINT` / `SKETCHFORGE_MODEL`.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(endpoint) = env_var("SKETCHFORGE_ENDPOINT") {
            cfg.endpoint = endpoint;
        }
        if let Some(model) = env_var("SKETCHFORGE_MODEL") {
            cfg.model = model;
        }
        cfg
    }
}

/// Username/password pair for HTTP basic auth
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

/// Configuration for the local service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on
    pub addr: SocketAddr,
    /// Gate every request behind basic auth when set
    pub auth: Option<BasicCredentials>,
    /// Process-level API key source
    pub process_key: ProcessKey,
    pub synth: SynthConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            auth: None,
            process_key: ProcessKey::Environment,
            synth: SynthConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Read `PORT`, `BASIC_AUTH_USERNAME` and `BASIC_AUTH_PASSWORD`.
    ///
    /// Auth is enabled only when both credentials are present.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self {
            synth: SynthConfig::from_env(),
            ..Self::default()
        };
        if let Some(port) = env_var("PORT") {
            let port: u16 = port
                .parse()
                .map_err(|_| Error::ConfigError(format!("PORT must be a port number, got {port:?}")))?;
            cfg.addr.set_port(port);
        }
        cfg.auth = match (env_var("BASIC_AUTH_USERNAME"), env_var("BASIC_AUTH_PASSWORD")) {
            (Some(username), Some(password)) => Some(BasicCredentials { username, password }),
            (None, None) => None,
            _ => {
                return Err(Error::ConfigError(
                    "set both BASIC_AUTH_USERNAME and BASIC_AUTH_PASSWORD, or neither".into(),
                ))
            }
        };
        Ok(cfg)
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SynthConfig::default();
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.preview_gap, 60.0);
        assert_eq!(config.image_detail, ImageDetail::High);
    }

    #[test]
    fn test_default_service_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.addr.port(), 3000);
        assert!(config.auth.is_none());
    }
}
