// ABOUTME: In-process HTTP testing utilities for the auth core's axum routers
// ABOUTME: Builds requests with JSON/form bodies and captures status, headers and body
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 epicflare

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde::Serialize;
use tower::ServiceExt;

/// Helper to build and execute HTTP requests against axum routers
pub struct AxumTestRequest {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    body: Option<String>,
}

impl AxumTestRequest {
    /// Create a new GET request
    pub fn get(uri: &str) -> Self {
        Self {
            method: Method::GET,
            uri: uri.to_owned(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Create a new POST request
    pub fn post(uri: &str) -> Self {
        Self {
            method: Method::POST,
            uri: uri.to_owned(),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Add a header to the request
    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.push((key.to_owned(), value.to_owned()));
        self
    }

    /// Add a bearer `Authorization` header
    pub fn bearer(self, token: &str) -> Self {
        self.header(header::AUTHORIZATION.as_str(), &format!("Bearer {token}"))
    }

    /// Add a `Cookie` header from a `Set-Cookie` value, keeping only the
    /// name=value pair
    pub fn session_cookie(self, set_cookie: &str) -> Self {
        let pair = set_cookie.split(';').next().unwrap_or_default().trim();
        self.header(header::COOKIE.as_str(), pair)
    }

    /// Ask for a JSON response instead of the browser redirect delivery
    pub fn accept_json(self) -> Self {
        self.header(header::ACCEPT.as_str(), "application/json")
    }

    /// Add a JSON body to the request
    pub fn json<T: Serialize>(mut self, data: &T) -> Self {
        self.body = Some(serde_json::to_string(data).expect("Failed to serialize JSON"));
        self.headers.push((
            header::CONTENT_TYPE.as_str().to_owned(),
            "application/json".to_owned(),
        ));
        self
    }

    /// Add a raw string body to the request
    pub fn raw_body(mut self, body: &str) -> Self {
        self.body = Some(body.to_owned());
        self
    }

    /// Add a form-encoded body to the request
    pub fn form<T: Serialize>(mut self, data: &T) -> Self {
        self.body = Some(serde_urlencoded::to_string(data).expect("Failed to serialize form"));
        self.headers.push((
            header::CONTENT_TYPE.as_str().to_owned(),
            "application/x-www-form-urlencoded".to_owned(),
        ));
        self
    }

    /// Execute the request against an axum router
    pub async fn send(self, app: Router) -> AxumTestResponse {
        let mut builder = Request::builder().method(self.method).uri(self.uri);

        for (key, value) in self.headers {
            builder = builder.header(key, value);
        }

        let body = self.body.unwrap_or_default();
        let request = builder
            .body(Body::from(body))
            .expect("Failed to build request");

        let response = app
            .oneshot(request)
            .await
            .expect("Failed to execute request");

        AxumTestResponse::from_response(response).await
    }
}

/// Captured HTTP response: status, headers and the fully read body
pub struct AxumTestResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl AxumTestResponse {
    /// Create from a response by eagerly reading the body
    async fn from_response(response: axum::http::Response<Body>) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read response body")
            .to_vec();
        Self {
            status,
            headers,
            body,
        }
    }

    /// Get the response status code as u16 for easy assertion
    pub fn status(&self) -> u16 {
        self.status.as_u16()
    }

    /// Get the response status code as `StatusCode`
    pub const fn status_code(&self) -> StatusCode {
        self.status
    }

    /// Get a response header value, if present
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned)
    }

    /// Get the `Set-Cookie` header, panicking when absent
    pub fn set_cookie(&self) -> String {
        self.header(header::SET_COOKIE.as_str())
            .expect("Expected a Set-Cookie header")
    }

    /// Get the `Location` header, panicking when absent
    pub fn location(&self) -> String {
        self.header(header::LOCATION.as_str())
            .expect("Expected a Location header")
    }

    /// Get the response body as a JSON value
    pub fn json<T: serde::de::DeserializeOwned>(self) -> T {
        serde_json::from_slice(&self.body).expect("Failed to deserialize JSON response")
    }

    /// Get the response body as a string
    pub fn text(&self) -> String {
        String::from_utf8(self.body.clone()).expect("Failed to decode response as UTF-8")
    }

    /// Assert that the status code matches
    pub fn assert_status(self, expected: StatusCode) -> Self {
        assert_eq!(
            self.status, expected,
            "Expected status {}, got {}",
            expected, self.status
        );
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, routing::post, Json};

    #[tokio::test]
    async fn test_get_request_and_text_body() {
        let app = Router::new().route("/test", get(|| async { "Hello" }));
        let response = AxumTestRequest::get("/test").send(app).await;
        assert_eq!(response.status(), 200);
        assert_eq!(response.text(), "Hello");
    }

    #[tokio::test]
    async fn test_post_with_json_body() {
        let app = Router::new().route(
            "/test",
            post(|Json(body): Json<serde_json::Value>| async move {
                Json(serde_json::json!({"received": body}))
            }),
        );
        let response = AxumTestRequest::post("/test")
            .json(&serde_json::json!({"key": "value"}))
            .send(app)
            .await;
        assert_eq!(response.status(), 200);
        let json: serde_json::Value = response.json();
        assert_eq!(json["received"]["key"], "value");
    }

    #[tokio::test]
    async fn test_post_with_form_body() {
        let app = Router::new().route("/test", post(|body: String| async move { body }));
        let response = AxumTestRequest::post("/test")
            .form(&[("decision", "deny"), ("email", "a@b.com")])
            .send(app)
            .await;
        assert_eq!(response.text(), "decision=deny&email=a%40b.com");
    }

    #[tokio::test]
    async fn test_bearer_and_cookie_headers() {
        let app = Router::new().route(
            "/test",
            get(|headers: HeaderMap| async move {
                format!(
                    "{}|{}",
                    headers
                        .get(header::AUTHORIZATION)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or(""),
                    headers
                        .get(header::COOKIE)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or(""),
                )
            }),
        );
        let response = AxumTestRequest::get("/test")
            .bearer("tok-123")
            .session_cookie("session=abc; HttpOnly; Path=/")
            .send(app)
            .await;
        assert_eq!(response.text(), "Bearer tok-123|session=abc");
    }

    #[tokio::test]
    async fn test_response_captures_headers() {
        let app = Router::new().route(
            "/test",
            get(|| async {
                (
                    [(header::SET_COOKIE, "session=abc; HttpOnly")],
                    "ok",
                )
            }),
        );
        let response = AxumTestRequest::get("/test").send(app).await;
        assert_eq!(response.set_cookie(), "session=abc; HttpOnly");
        assert!(response.header("x-missing").is_none());
    }
}
