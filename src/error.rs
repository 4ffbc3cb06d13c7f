use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Failures of the document store adapter.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to connect to store: {0}")]
    Connect(#[source] libsql::Error),
    #[error("failed to apply migration {name}: {source}")]
    Migration {
        name: String,
        #[source]
        source: libsql::Error,
    },
    #[error("invalid collection name: {0:?}")]
    InvalidCollection(String),
    #[error("invalid article id: {0:?}")]
    InvalidId(String),
    #[error("article not found: {0}")]
    NotFound(String),
    #[error("query failed: {0}")]
    Query(#[source] libsql::Error),
    #[error("write failed: {0}")]
    Write(#[source] libsql::Error),
    #[error("corrupt document: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_write(&self) -> bool {
        matches!(self, StoreError::Write(_))
    }
}

/// Every failure a handler can surface, each mapped to exactly one status
/// code and message policy.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("decode error: {0}")]
    Decode(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Decode(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::StoreUnavailable(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Message shown to clients. Write failures carry the raw store text;
    /// read failures are redacted.
    pub fn public_message(&self) -> String {
        match self {
            ApiError::Decode(_) => "invalid request".to_string(),
            ApiError::NotFound(_) => "Not found".to_string(),
            ApiError::StoreUnavailable(e) if e.is_write() => e.to_string(),
            ApiError::StoreUnavailable(_) => "Nothing".to_string(),
            ApiError::Validation(msg) => msg.clone(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::InvalidId(id) | StoreError::NotFound(id) => ApiError::NotFound(id),
            other => ApiError::StoreUnavailable(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::StoreUnavailable(e) => {
                tracing::error!(error = %crate::unpack_error(e), "store request failed")
            }
            other => tracing::info!(error = %other, "request rejected"),
        }
        let body = ErrorResponse {
            error: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_not_found_and_bad_id_are_indistinguishable() {
        let bad_id = ApiError::from(StoreError::InvalidId("zzz".to_string()));
        let missing = ApiError::from(StoreError::NotFound("abc".to_string()));

        assert_eq!(bad_id.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(bad_id.public_message(), missing.public_message());
    }

    #[test]
    fn test_read_failures_are_redacted() {
        let err = ApiError::from(StoreError::Corrupt("bad ctime".to_string()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "Nothing");
    }

    #[test]
    fn test_decode_message_is_fixed() {
        let err = ApiError::Decode("expected value at line 1".to_string());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.public_message(), "invalid request");
    }
}
