//! services/api/src/web/error.rs
//!
//! The error type returned by HTTP handlers and middleware.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

use crate::inference::InferenceError;

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
}

/// An HTTP status plus a human-readable `detail`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    pub status: StatusCode,
    pub detail: String,
    bearer_challenge: bool,
}

impl HttpError {
    pub fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
            bearer_challenge: false,
        }
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, detail)
    }

    /// A 401 carrying `WWW-Authenticate: Bearer`.
    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            detail: detail.into(),
            bearer_challenge: true,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(ErrorBody { detail: &self.detail })).into_response();
        if self.bearer_challenge {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

impl From<InferenceError> for HttpError {
    fn from(e: InferenceError) -> Self {
        match e {
            InferenceError::MissingInput
            | InferenceError::UnsupportedFormat(_)
            | InferenceError::FetchFailed(_)
            | InferenceError::InvalidImage(_)
            | InferenceError::InvalidVideo(_)
            | InferenceError::InvalidParameters(_) => HttpError::bad_request(e.to_string()),
            InferenceError::Failed(cause) => {
                error!("Inference failed: {}", cause);
                HttpError::internal(cause)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(InferenceError::MissingInput, StatusCode::BAD_REQUEST)]
    #[case(InferenceError::UnsupportedFormat("a.txt".into()), StatusCode::BAD_REQUEST)]
    #[case(InferenceError::InvalidVideo("eof".into()), StatusCode::BAD_REQUEST)]
    #[case(InferenceError::InvalidParameters("too big".into()), StatusCode::BAD_REQUEST)]
    #[case(InferenceError::Failed("model exploded".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    fn inference_errors_map_to_statuses(#[case] error: InferenceError, #[case] status: StatusCode) {
        assert_eq!(HttpError::from(error).status, status);
    }

    #[test]
    fn unauthorized_carries_a_bearer_challenge() {
        let response = HttpError::unauthorized("nope").into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    }
}
