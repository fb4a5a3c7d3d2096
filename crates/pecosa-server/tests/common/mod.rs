#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, Response, StatusCode};
use axum::Router;
use pecosa_server::{router, AppState, Config};
use serde_json::Value;
use tower::ServiceExt;

pub async fn app_with(configure: impl FnOnce(&mut Config)) -> Router {
    let mut config = Config::default();
    config.database.url = "sqlite::memory:".to_string();
    config.auth.session_secret = "test-secret".to_string();
    configure(&mut config);
    router(AppState::new(config).await.unwrap())
}

pub async fn app() -> Router {
    app_with(|_| {}).await
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.unwrap()
}

pub fn json_request(method: &str, uri: &str, body: Value, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Every Set-Cookie header of a response
pub fn set_cookies<B>(response: &Response<B>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(str::to_string)
        .collect()
}

/// `name=value` pair of a cookie set by the response, ready for a Cookie header
pub fn cookie_pair<B>(response: &Response<B>, name: &str) -> Option<String> {
    set_cookies(response).into_iter().find_map(|cookie| {
        let pair = cookie.split(';').next()?.trim().to_string();
        pair.starts_with(&format!("{}=", name)).then_some(pair)
    })
}

/// Log in through the JSON endpoint and return the session cookie pair
pub async fn login(app: &Router, username: &str, password: &str) -> String {
    let response = send(
        app,
        json_request(
            "POST",
            "/api/auth/login",
            serde_json::json!({ "username": username, "password": password }),
            None,
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK, "login as {} failed", username);
    cookie_pair(&response, "user_session").unwrap()
}
