use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use thiserror::Error;

/// Closed enumeration of every way `play()` can fail. No generic exceptions
/// cross the API boundary — every path here maps 1:1 to the response-code
/// table in the spec.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    #[error("token not found")]
    TokenNotFound,
    #[error("token already used")]
    TokenAlreadyUsed,
    #[error("token belongs to a different promotion")]
    TokenWrongPromotion,
    #[error("customer not found")]
    CustomerNotFound,
    #[error("customer belongs to a different promotion")]
    CustomerWrongPromotion,
    #[error("internal error")]
    Internal,
}

impl FailureKind {
    pub fn status_code(self) -> StatusCode {
        match self {
            FailureKind::TokenNotFound => StatusCode::NOT_FOUND,
            FailureKind::TokenAlreadyUsed => StatusCode::BAD_REQUEST,
            FailureKind::TokenWrongPromotion => StatusCode::BAD_REQUEST,
            FailureKind::CustomerNotFound => StatusCode::NOT_FOUND,
            FailureKind::CustomerWrongPromotion => StatusCode::FORBIDDEN,
            FailureKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            FailureKind::TokenNotFound => "TOKEN_NOT_FOUND",
            FailureKind::TokenAlreadyUsed => "TOKEN_ALREADY_USED",
            FailureKind::TokenWrongPromotion => "TOKEN_WRONG_PROMOTION",
            FailureKind::CustomerNotFound => "CUSTOMER_NOT_FOUND",
            FailureKind::CustomerWrongPromotion => "CUSTOMER_WRONG_PROMOTION",
            FailureKind::Internal => "INTERNAL",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for FailureKind {
    fn into_response(self) -> Response {
        let body = ApiError {
            error: self.code(),
            message: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

/// Converts any transient backing-store failure into `FailureKind::Internal`
/// — the play transaction is all-or-nothing, so the caller never sees a raw
/// `sqlx`/`anyhow` error.
impl From<anyhow::Error> for FailureKind {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "play transaction failed internally");
        FailureKind::Internal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_spec_table() {
        assert_eq!(FailureKind::TokenNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(FailureKind::TokenAlreadyUsed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(FailureKind::TokenWrongPromotion.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(FailureKind::CustomerNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            FailureKind::CustomerWrongPromotion.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(FailureKind::Internal.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
