use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, Echo, PROHIBITED_MESSAGE};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn request(method: &str, uri: &str) -> Request<String> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(String::new())
        .unwrap()
}

// --- status ---

#[tokio::test]
async fn status_route_returns_requested_code() {
    for code in [200u16, 400, 401, 404, 408, 422, 500, 503] {
        let resp = app().oneshot(request("GET", &format!("/status/{code}"))).await.unwrap();
        assert_eq!(resp.status().as_u16(), code);
        let json: serde_json::Value = body_json(resp).await;
        assert_eq!(json["status"], code);
    }
}

#[tokio::test]
async fn status_403_carries_message() {
    let resp = app().oneshot(request("POST", "/status/403")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let json: serde_json::Value = body_json(resp).await;
    assert_eq!(json["message"], PROHIBITED_MESSAGE);
}

#[tokio::test]
async fn status_out_of_range_is_400() {
    let resp = app().oneshot(request("GET", "/status/42")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- echo ---

#[tokio::test]
async fn echo_reports_query_and_method() {
    let resp = app()
        .oneshot(request("DELETE", "/echo?name=Ada%20Lovelace&id=3"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.method, "DELETE");
    assert_eq!(echo.query.as_deref(), Some("name=Ada%20Lovelace&id=3"));
    assert_eq!(echo.body, "");
}

#[tokio::test]
async fn echo_reports_body_and_headers() {
    let req = Request::builder()
        .method("PATCH")
        .uri("/echo")
        .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(http::header::CACHE_CONTROL, "no-cache")
        .body("a=1&b=2".to_string())
        .unwrap();
    let echo: Echo = body_json(app().oneshot(req).await.unwrap()).await;
    assert_eq!(echo.method, "PATCH");
    assert_eq!(echo.content_type.as_deref(), Some("application/x-www-form-urlencoded"));
    assert_eq!(echo.cache_control.as_deref(), Some("no-cache"));
    assert_eq!(echo.body, "a=1&b=2");
    assert!(echo.query.is_none());
}

// --- empty bodies ---

#[tokio::test]
async fn empty_and_no_content_have_no_body() {
    let resp = app().oneshot(request("GET", "/empty")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(body_bytes(resp).await.is_empty());

    let resp = app().oneshot(request("PUT", "/no-content")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(body_bytes(resp).await.is_empty());
}

// --- misc ---

#[tokio::test]
async fn malformed_is_not_json() {
    let resp = app().oneshot(request("GET", "/malformed")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = body_bytes(resp).await;
    assert!(serde_json::from_slice::<serde_json::Value>(&bytes).is_err());
}

#[tokio::test]
async fn delay_answers_after_waiting() {
    let resp = app().oneshot(request("GET", "/delay/5")).await.unwrap();
    let json: serde_json::Value = body_json(resp).await;
    assert_eq!(json["delayed_ms"], 5);
}

#[tokio::test]
async fn profile_uses_snake_case_keys() {
    let resp = app().oneshot(request("GET", "/profile")).await.unwrap();
    let json: serde_json::Value = body_json(resp).await;
    assert_eq!(json["user_id"], 7);
    assert_eq!(json["display_name"], "Ada Lovelace");
}
