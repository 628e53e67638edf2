//! HTTP transport types and request building.
//!
//! # Design
//! Requests and responses are plain data. `build_request` turns an
//! `Endpoint` into an `HttpRequest` without touching the network; a
//! `Transport` executes it and reports a `TransportOutcome`. Keeping the
//! request shape inspectable lets tests assert on URLs, headers, and bodies
//! without a server.

use std::fmt;

use bytes::Bytes;
use serde_json::Value;
use url::Url;

use crate::endpoint::{ContentType, Endpoint, Parameters};
use crate::error::TransportError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
        }
    }

    /// GET and DELETE carry their parameters in the query string.
    pub fn uses_query(self) -> bool {
        matches!(self, HttpMethod::Get | HttpMethod::Delete)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace any header with the same name, then append.
    fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }
}

impl fmt::Display for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.body {
            Some(body) => write!(f, "<{}> <{}> ({} bytes)", self.method, self.url, body.len()),
            None => write!(f, "<{}> <{}> (no body)", self.method, self.url),
        }
    }
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// What a transport reports for one dispatched request. Produced once.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOutcome {
    /// A status line was received, whatever the code.
    Response(HttpResponse),
    /// No response was obtained.
    Failure(TransportError),
}

impl From<Result<HttpResponse, TransportError>> for TransportOutcome {
    fn from(result: Result<HttpResponse, TransportError>) -> Self {
        match result {
            Ok(response) => TransportOutcome::Response(response),
            Err(error) => TransportOutcome::Failure(error),
        }
    }
}

/// Build the transport request for `endpoint`.
///
/// Query parameters are appended for GET/DELETE; POST/PUT/PATCH carry the
/// body parameters, form-encoded or as JSON depending on the content type.
///
/// # Panics
/// Panics if `endpoint.target` is not an absolute URL. A malformed endpoint
/// URL is a bug in the calling code, not a runtime condition.
pub fn build_request(endpoint: &Endpoint) -> HttpRequest {
    let mut url = match Url::parse(&endpoint.target) {
        Ok(url) => url,
        Err(e) => panic!("endpoint target is not a valid URL: {:?} ({e})", endpoint.target),
    };

    if endpoint.method.uses_query() {
        if let Some(query) = endpoint.query_parameters.as_ref().filter(|q| !q.is_empty()) {
            append_query(&mut url, query);
        }
    }

    let mut request = HttpRequest {
        method: endpoint.method,
        url,
        headers: endpoint.headers.clone(),
        body: None,
    };
    request.set_header("Content-Type", endpoint.content_type.as_str());
    for (name, value) in endpoint.cache_policy.headers() {
        request.set_header(name, *value);
    }

    if !endpoint.method.uses_query() {
        match endpoint.content_type {
            ContentType::FormUrlEncoded => {
                let body = form_body(endpoint.body_parameters.as_ref());
                request.set_header("Content-Length", body.len().to_string());
                request.body = Some(Bytes::from(body));
            }
            _ => {
                let empty = Value::Object(Parameters::new());
                let params = endpoint.body_parameters.as_ref().unwrap_or(&empty);
                request.body = Some(Bytes::from(endpoint.coding.encode_value(params)));
            }
        }
    }

    request
}

/// Append `query` to the URL, percent-encoding names and values (a space
/// becomes `%20`). Any query already present on the target is kept.
fn append_query(url: &mut Url, query: &Parameters) {
    let encoded = encode_pairs(query);
    let combined = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{encoded}"),
        _ => encoded,
    };
    url.set_query(Some(&combined));
}

fn form_body(params: Option<&Value>) -> String {
    match params {
        Some(Value::Object(map)) => encode_pairs(map),
        _ => String::new(),
    }
}

/// `key=value` pairs joined by `&`, in insertion order.
fn encode_pairs(params: &Parameters) -> String {
    params
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(&parameter_text(value))
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Text form of an untyped parameter value.
fn parameter_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
