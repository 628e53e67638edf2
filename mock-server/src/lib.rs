//! Canned HTTP endpoints for exercising a client end to end.
//!
//! Every route is stateless: it answers from the request alone, so tests can
//! share one server and run in any order.

use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, RawQuery},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;

/// What `/echo` saw, returned as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub content_length: Option<String>,
    pub cache_control: Option<String>,
    pub body: String,
}

/// Message sent with every 403.
pub const PROHIBITED_MESSAGE: &str = "account is suspended";

pub fn app() -> Router {
    Router::new()
        .route("/status/{code}", any(status))
        .route("/echo", any(echo))
        .route("/empty", any(empty))
        .route("/no-content", any(no_content))
        .route("/delay/{ms}", get(delay))
        .route("/malformed", get(malformed))
        .route("/profile", get(profile))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn status(Path(code): Path<u16>) -> Response {
    let Ok(status) = StatusCode::from_u16(code) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    tracing::debug!(code, "canned status");
    if status == StatusCode::FORBIDDEN {
        return (status, Json(json!({ "message": PROHIBITED_MESSAGE }))).into_response();
    }
    (status, Json(json!({ "status": code }))).into_response()
}

fn header_text(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

async fn echo(method: Method, RawQuery(query): RawQuery, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    Json(Echo {
        method: method.to_string(),
        query,
        content_type: header_text(&headers, header::CONTENT_TYPE),
        content_length: header_text(&headers, header::CONTENT_LENGTH),
        cache_control: header_text(&headers, header::CACHE_CONTROL),
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn empty() -> StatusCode {
    StatusCode::OK
}

async fn no_content() -> StatusCode {
    StatusCode::NO_CONTENT
}

async fn delay(Path(ms): Path<u64>) -> Json<serde_json::Value> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Json(json!({ "delayed_ms": ms }))
}

async fn malformed() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/json")],
        r#"{"id": 1, "name": "#,
    )
}

async fn profile() -> Json<serde_json::Value> {
    Json(json!({
        "user_id": 7,
        "display_name": "Ada Lovelace",
        "last_seen_at": "2024-05-01T12:00:00Z",
    }))
}
