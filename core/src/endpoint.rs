//! Declarative description of a single HTTP call.
//!
//! # Design
//! `Endpoint` is a plain configuration struct with explicit defaults. It is
//! built once through `EndpointBuilder` and treated as immutable afterwards;
//! the engine only ever reads it.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::coding::CodingStrategy;
use crate::delivery::Delivery;
use crate::http::HttpMethod;
use crate::pinning::PinnedCertificate;

/// Untyped key-value parameters. Keys keep the order they were inserted in.
pub type Parameters = Map<String, Value>;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How a request may use cached responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CachePolicy {
    UseProtocolCachePolicy,
    ReloadIgnoringLocalCacheData,
    ReloadIgnoringLocalAndRemoteCacheData,
    #[default]
    ReturnCacheDataElseLoad,
    ReturnCacheDataDontLoad,
}

impl CachePolicy {
    /// Request headers expressing this policy to caches along the way.
    pub fn headers(self) -> &'static [(&'static str, &'static str)] {
        match self {
            CachePolicy::UseProtocolCachePolicy => &[],
            CachePolicy::ReloadIgnoringLocalCacheData => &[("Cache-Control", "no-cache")],
            CachePolicy::ReloadIgnoringLocalAndRemoteCacheData => {
                &[("Cache-Control", "no-cache"), ("Pragma", "no-cache")]
            }
            CachePolicy::ReturnCacheDataElseLoad => &[("Cache-Control", "max-stale")],
            CachePolicy::ReturnCacheDataDontLoad => &[("Cache-Control", "only-if-cached")],
        }
    }
}

/// Request body media type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    Json,
    FormUrlEncoded,
    Other(String),
}

impl ContentType {
    pub fn as_str(&self) -> &str {
        match self {
            ContentType::Json => "application/json",
            ContentType::FormUrlEncoded => "application/x-www-form-urlencoded",
            ContentType::Other(mime) => mime,
        }
    }
}

impl From<&str> for ContentType {
    fn from(mime: &str) -> Self {
        match mime {
            "application/json" => ContentType::Json,
            "application/x-www-form-urlencoded" => ContentType::FormUrlEncoded,
            other => ContentType::Other(other.to_string()),
        }
    }
}

/// One HTTP call.
///
/// `query_parameters` apply to GET/DELETE and `body_parameters` to
/// POST/PUT/PATCH; the other one is ignored for a given method. When
/// `ssl_pinning_enabled` is set, `pinned_certificate` must resolve or the
/// TLS handshake is rejected.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub target: String,
    pub method: HttpMethod,
    pub body_parameters: Option<Value>,
    pub query_parameters: Option<Parameters>,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    pub cache_policy: CachePolicy,
    pub content_type: ContentType,
    pub ssl_pinning_enabled: bool,
    pub pinned_certificate: Option<PinnedCertificate>,
    pub delivery: Delivery,
    pub coding: CodingStrategy,
}

impl Endpoint {
    pub fn builder(target: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder::new(target)
    }

    pub fn get(target: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder::new(target).method(HttpMethod::Get)
    }

    pub fn post(target: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder::new(target).method(HttpMethod::Post)
    }

    pub fn put(target: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder::new(target).method(HttpMethod::Put)
    }

    pub fn patch(target: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder::new(target).method(HttpMethod::Patch)
    }

    pub fn delete(target: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder::new(target).method(HttpMethod::Delete)
    }
}

/// Builder producing an immutable `Endpoint`.
#[derive(Debug, Clone)]
pub struct EndpointBuilder {
    endpoint: Endpoint,
}

impl EndpointBuilder {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            endpoint: Endpoint {
                target: target.into(),
                method: HttpMethod::Get,
                body_parameters: None,
                query_parameters: None,
                headers: Vec::new(),
                timeout: DEFAULT_TIMEOUT,
                cache_policy: CachePolicy::default(),
                content_type: ContentType::default(),
                ssl_pinning_enabled: false,
                pinned_certificate: None,
                delivery: Delivery::default(),
                coding: CodingStrategy::default(),
            },
        }
    }

    pub fn method(mut self, method: HttpMethod) -> Self {
        self.endpoint.method = method;
        self
    }

    pub fn body(mut self, params: impl Into<Value>) -> Self {
        self.endpoint.body_parameters = Some(params.into());
        self
    }

    pub fn query(mut self, params: Parameters) -> Self {
        self.endpoint.query_parameters = Some(params);
        self
    }

    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.endpoint
            .query_parameters
            .get_or_insert_with(Parameters::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.endpoint.headers.push((name.into(), value.into()));
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.endpoint
            .headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// A zero timeout is ignored; the transport needs a positive duration.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.endpoint.timeout = timeout;
        }
        self
    }

    pub fn cache_policy(mut self, policy: CachePolicy) -> Self {
        self.endpoint.cache_policy = policy;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<ContentType>) -> Self {
        self.endpoint.content_type = content_type.into();
        self
    }

    /// Enable pinning against `certificate`.
    pub fn pinned(mut self, certificate: PinnedCertificate) -> Self {
        self.endpoint.ssl_pinning_enabled = true;
        self.endpoint.pinned_certificate = Some(certificate);
        self
    }

    pub fn ssl_pinning(mut self, enabled: bool) -> Self {
        self.endpoint.ssl_pinning_enabled = enabled;
        self
    }

    pub fn delivery(mut self, delivery: Delivery) -> Self {
        self.endpoint.delivery = delivery;
        self
    }

    pub fn coding(mut self, coding: CodingStrategy) -> Self {
        self.endpoint.coding = coding;
        self
    }

    pub fn build(self) -> Endpoint {
        self.endpoint
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let endpoint = Endpoint::builder("https://api.example.com/items").build();
        assert_eq!(endpoint.method, HttpMethod::Get);
        assert_eq!(endpoint.timeout, Duration::from_secs(30));
        assert_eq!(endpoint.cache_policy, CachePolicy::ReturnCacheDataElseLoad);
        assert_eq!(endpoint.content_type.as_str(), "application/json");
        assert!(!endpoint.ssl_pinning_enabled);
        assert!(endpoint.pinned_certificate.is_none());
        assert!(matches!(endpoint.delivery, Delivery::Inline));
    }

    #[test]
    fn zero_timeout_keeps_default() {
        let endpoint = Endpoint::get("https://api.example.com/")
            .timeout(Duration::ZERO)
            .build();
        assert_eq!(endpoint.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn pinned_enables_pinning() {
        let endpoint = Endpoint::get("https://api.example.com/")
            .pinned(PinnedCertificate::named("api"))
            .build();
        assert!(endpoint.ssl_pinning_enabled);
        assert!(endpoint.pinned_certificate.is_some());
    }

    #[test]
    fn query_param_preserves_order() {
        let endpoint = Endpoint::get("https://api.example.com/")
            .query_param("zeta", "1")
            .query_param("alpha", 2)
            .build();
        let keys: Vec<_> = endpoint.query_parameters.unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn content_type_from_mime() {
        assert_eq!(
            ContentType::from("application/x-www-form-urlencoded"),
            ContentType::FormUrlEncoded
        );
        assert_eq!(
            ContentType::from("text/csv"),
            ContentType::Other("text/csv".to_string())
        );
    }
}
