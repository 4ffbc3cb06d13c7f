use axum::{
    Json,
    body::Body,
    http::{Method, Request, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{ApiError, ErrorResponse};

/// Per-request carrier of the raw request, the matched route params and the
/// response writers. Every writer consumes the context, so a request gets
/// exactly one response.
pub struct Context {
    request: Request<Body>,
    params: Vec<String>,
}

impl Context {
    pub fn new(request: Request<Body>, params: Vec<String>) -> Self {
        Self { request, params }
    }

    pub fn method(&self) -> &Method {
        self.request.method()
    }

    pub fn path(&self) -> &str {
        self.request.uri().path()
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn param(&self, idx: usize) -> Option<&str> {
        self.params.get(idx).map(String::as_str)
    }

    pub fn into_request(self) -> Request<Body> {
        self.request
    }

    /// Reads at most `limit` bytes of body and decodes them as `T`. The body
    /// is left empty afterwards.
    pub async fn decode_json<T: DeserializeOwned>(&mut self, limit: usize) -> Result<T, ApiError> {
        let body = std::mem::take(self.request.body_mut());
        let bytes = axum::body::to_bytes(body, limit)
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Serializes `payload` with `Content-Type: application/json`.
    pub fn json<T: Serialize>(self, status: StatusCode, payload: T) -> Response {
        (status, Json(payload)).into_response()
    }

    /// Writes `{"error": message}`.
    pub fn error(self, status: StatusCode, message: impl Into<String>) -> Response {
        self.json(
            status,
            ErrorResponse {
                error: message.into(),
            },
        )
    }

    pub fn fail(self, err: ApiError) -> Response {
        err.into_response()
    }

    pub fn empty(self, status: StatusCode) -> Response {
        status.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    fn ctx_with_body(body: &'static str) -> Context {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/api/save")
            .body(Body::from(body))
            .unwrap();
        Context::new(req, vec![])
    }

    async fn body_json(res: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_json_sets_status_and_content_type() {
        let res = ctx_with_body("").json(StatusCode::CREATED, serde_json::json!({ "ok": true }));

        assert_eq!(res.status(), StatusCode::CREATED);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body_json(res).await["ok"], true);
    }

    #[tokio::test]
    async fn test_error_wraps_message() {
        let res = ctx_with_body("").error(StatusCode::NOT_FOUND, "Not found");

        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(res).await, serde_json::json!({ "error": "Not found" }));
    }

    #[tokio::test]
    async fn test_decode_json_reads_body() {
        let mut ctx = ctx_with_body(r#"{"a": 1}"#);
        let value: serde_json::Value = ctx.decode_json(1024).await.unwrap();
        assert_eq!(value["a"], 1);
    }

    #[tokio::test]
    async fn test_decode_json_rejects_garbage_and_oversized_bodies() {
        let mut garbage = ctx_with_body("\u{1}\u{2}not json");
        let err = garbage.decode_json::<serde_json::Value>(1024).await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));

        let mut oversized = ctx_with_body(r#"{"a": "0123456789"}"#);
        let err = oversized.decode_json::<serde_json::Value>(4).await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[test]
    fn test_params_access() {
        let req = Request::builder().uri("/api/article/abc").body(Body::empty()).unwrap();
        let ctx = Context::new(req, vec!["abc".to_string()]);

        assert_eq!(ctx.param(0), Some("abc"));
        assert_eq!(ctx.param(1), None);
        assert_eq!(ctx.path(), "/api/article/abc");
    }
}
