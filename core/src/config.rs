//! Configuration for the live transport.
//!
//! `HttpConfig` holds settings shared by every request a client sends. The
//! per-request timeout lives on the `Endpoint`, not here.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::CertificateDer;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pinning::PinningValidator;

/// Errors building an HTTP client from configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid proxy URL: {0}")]
    InvalidProxy(String),

    #[error("invalid header '{name}': {reason}")]
    InvalidHeader { name: String, reason: String },

    #[error("invalid root certificate {path}: {reason}")]
    RootCertificate { path: PathBuf, reason: String },

    #[error("TLS configuration failed: {0}")]
    Tls(#[from] rustls::Error),

    #[error("failed to create HTTP client: {0}")]
    Client(String),
}

/// Client-wide HTTP settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(with = "duration_secs_option")]
    pub connect_timeout: Option<Duration>,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    /// Headers sent with every request, underneath endpoint headers.
    pub headers: HashMap<String, String>,
    /// Directory holding named pinned certificates as `<name>.der`.
    pub certificate_dir: Option<PathBuf>,
    /// Extra DER trust anchors, e.g. a private CA, trusted alongside the
    /// platform store.
    pub root_certificates: Vec<PathBuf>,
}

impl HttpConfig {
    /// Read every configured root certificate.
    pub fn load_root_certificates(&self) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
        self.root_certificates
            .iter()
            .map(|path| read_der(path).map(CertificateDer::from))
            .collect()
    }
}

fn read_der(path: &Path) -> Result<Vec<u8>, ConfigError> {
    match std::fs::read(path) {
        Ok(bytes) if !bytes.is_empty() => Ok(bytes),
        Ok(_) => Err(ConfigError::RootCertificate {
            path: path.to_path_buf(),
            reason: "file is empty".to_string(),
        }),
        Err(e) => Err(ConfigError::RootCertificate {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

impl HttpConfig {
    pub fn builder() -> HttpConfigBuilder {
        HttpConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct HttpConfigBuilder {
    config: HttpConfig,
}

impl HttpConfigBuilder {
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = Some(timeout);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.config.proxy = Some(proxy.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name.into(), value.into());
        self
    }

    pub fn certificate_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.certificate_dir = Some(dir.into());
        self
    }

    pub fn root_certificate(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.root_certificates.push(path.into());
        self
    }

    pub fn build(self) -> HttpConfig {
        self.config
    }
}

fn base_builder(config: &HttpConfig) -> Result<reqwest::ClientBuilder, ConfigError> {
    // Cookies are never stored: the `cookies` feature stays off.
    let mut builder = reqwest::Client::builder();

    if let Some(timeout) = config.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }
    if let Some(proxy_url) = &config.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ConfigError::InvalidProxy(format!("{proxy_url}: {e}")))?;
        builder = builder.proxy(proxy);
    }
    if let Some(user_agent) = &config.user_agent {
        builder = builder.user_agent(user_agent);
    }
    if !config.headers.is_empty() {
        let mut headers = reqwest::header::HeaderMap::new();
        for (k, v) in &config.headers {
            let name = reqwest::header::HeaderName::from_bytes(k.as_bytes()).map_err(|e| {
                ConfigError::InvalidHeader {
                    name: k.clone(),
                    reason: e.to_string(),
                }
            })?;
            let value = reqwest::header::HeaderValue::from_str(v).map_err(|e| {
                ConfigError::InvalidHeader {
                    name: k.clone(),
                    reason: e.to_string(),
                }
            })?;
            headers.insert(name, value);
        }
        builder = builder.default_headers(headers);
    }
    for cert in config.load_root_certificates()? {
        let cert = reqwest::Certificate::from_der(&cert).map_err(|e| ConfigError::Client(e.to_string()))?;
        builder = builder.add_root_certificate(cert);
    }
    Ok(builder)
}

/// Persistent client whose connection pool is reused across requests.
pub fn build_http_client(config: &HttpConfig) -> Result<reqwest::Client, ConfigError> {
    base_builder(config)?
        .build()
        .map_err(|e| ConfigError::Client(e.to_string()))
}

/// Ephemeral client that pins server certificates through `validator` and
/// keeps no idle connections.
pub fn build_pinned_client(
    config: &HttpConfig,
    validator: Arc<PinningValidator>,
) -> Result<reqwest::Client, ConfigError> {
    let tls = validator.client_config()?;
    base_builder(config)?
        .pool_max_idle_per_host(0)
        .use_preconfigured_tls(tls)
        .build()
        .map_err(|e| ConfigError::Client(e.to_string()))
}

mod duration_secs_option {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&d.as_secs_f64()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        secs.map(|s| Duration::try_from_secs_f64(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}
