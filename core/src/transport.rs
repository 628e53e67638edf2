//! Transports that execute an `HttpRequest`.
//!
//! # Design
//! `Transport` is the seam between the engine and the network. The engine
//! decides session settings (timeout, pinning) per endpoint and passes them
//! in `SessionOptions`; a transport only executes. `LiveTransport` sends
//! through reqwest. `MockTransport` answers from memory and records what it
//! was asked, for tests and offline development.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rustls::RootCertStore;

use crate::config::{build_http_client, build_pinned_client, ConfigError, HttpConfig};
use crate::error::TransportError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, TransportOutcome};
use crate::pinning::{platform_roots, trust_roots, PinningValidator};

/// Per-request session settings chosen by the engine.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub timeout: Duration,
    /// Set when the endpoint enables pinning. Such requests use an ephemeral
    /// session with this validator as the server-trust handler.
    pub pinning: Option<Arc<PinningValidator>>,
}

/// Executes one request and reports its outcome.
///
/// Implementations must not panic for network conditions; every failure is
/// a `TransportOutcome::Failure`. Dropping the returned future aborts the
/// request.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, request: HttpRequest, options: SessionOptions) -> TransportOutcome;

    /// Directory that named pinned certificates resolve against.
    fn certificate_dir(&self) -> Option<&Path> {
        None
    }

    /// Trust anchors for the standard step of pinned handshakes.
    fn root_store(&self) -> Arc<RootCertStore> {
        platform_roots()
    }
}

/// Transport backed by a persistent reqwest client.
#[derive(Debug, Clone)]
pub struct LiveTransport {
    client: reqwest::Client,
    config: HttpConfig,
    roots: Arc<RootCertStore>,
}

impl LiveTransport {
    pub fn new(config: HttpConfig) -> Result<Self, ConfigError> {
        let client = build_http_client(&config)?;
        let extra = config.load_root_certificates()?;
        let roots = if extra.is_empty() {
            platform_roots()
        } else {
            Arc::new(trust_roots(&extra))
        };
        Ok(Self {
            client,
            config,
            roots,
        })
    }

    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    fn client_for(&self, options: &SessionOptions) -> Result<reqwest::Client, TransportError> {
        match &options.pinning {
            Some(validator) => build_pinned_client(&self.config, validator.clone())
                .map_err(|e| TransportError::Other(e.to_string())),
            None => Ok(self.client.clone()),
        }
    }
}

fn reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Patch => reqwest::Method::PATCH,
    }
}

#[async_trait]
impl Transport for LiveTransport {
    async fn send(&self, request: HttpRequest, options: SessionOptions) -> TransportOutcome {
        let client = match self.client_for(&options) {
            Ok(client) => client,
            Err(e) => return TransportOutcome::Failure(e),
        };

        let mut builder = client
            .request(reqwest_method(request.method), request.url)
            .timeout(options.timeout);
        for (name, value) in request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return TransportOutcome::Failure(e.into()),
        };
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        match response.bytes().await {
            Ok(body) => TransportOutcome::Response(HttpResponse {
                status,
                headers,
                body,
            }),
            Err(e) => TransportOutcome::Failure(e.into()),
        }
    }

    fn certificate_dir(&self) -> Option<&Path> {
        self.config.certificate_dir.as_deref()
    }

    fn root_store(&self) -> Arc<RootCertStore> {
        self.roots.clone()
    }
}

/// Transport that answers every request with a canned outcome.
#[derive(Debug, Clone)]
pub struct MockTransport {
    outcome: TransportOutcome,
    delay: Duration,
    seen: Arc<Mutex<Vec<HttpRequest>>>,
}

impl MockTransport {
    pub fn new(outcome: TransportOutcome) -> Self {
        Self {
            outcome,
            delay: Duration::ZERO,
            seen: Arc::default(),
        }
    }

    /// Respond with `status` and `body`.
    pub fn respond(status: u16, body: impl Into<Bytes>) -> Self {
        Self::new(TransportOutcome::Response(HttpResponse::new(status, body)))
    }

    /// Respond 200 with `value` serialized as JSON.
    pub fn json(value: &serde_json::Value) -> Self {
        Self::respond(200, value.to_string())
    }

    /// Fail without a response.
    pub fn fail(error: TransportError) -> Self {
        Self::new(TransportOutcome::Failure(error))
    }

    /// Respond 200 with the contents of a file. An unreadable file yields an
    /// empty body.
    pub fn from_file(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let body = std::fs::read(path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "mock response file unreadable");
            Vec::new()
        });
        Self::respond(200, body)
    }

    /// Wait this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Requests received so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.seen.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: HttpRequest, options: SessionOptions) -> TransportOutcome {
        self.seen.lock().push(request);
        if self.delay > options.timeout {
            tokio::time::sleep(options.timeout).await;
            return TransportOutcome::Failure(TransportError::TimedOut(format!(
                "no response within {:?}",
                options.timeout
            )));
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcome.clone()
    }
}
