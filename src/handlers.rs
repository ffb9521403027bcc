use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{engine::SystemClock, errors::FailureKind, oracle::ConcurrencyOracle, play, AppState};

/// Boundary-only rejection: the per-customer oracle deny (§4.8) is not one
/// of C8's closed failure kinds (§6) — it never enters the transaction at
/// all, so it gets its own response rather than being folded into
/// `FailureKind::Internal`.
pub enum PlayRejection {
    RateLimited,
    Core(FailureKind),
}

impl From<FailureKind> for PlayRejection {
    fn from(kind: FailureKind) -> Self {
        Self::Core(kind)
    }
}

impl IntoResponse for PlayRejection {
    fn into_response(self) -> Response {
        match self {
            Self::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(crate::errors::ApiError {
                    error: "RATE_LIMITED",
                    message: "too many play attempts, slow down".to_string(),
                }),
            )
                .into_response(),
            Self::Core(kind) => kind.into_response(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PlayRequest {
    pub token_code: String,
}

#[derive(Debug, Serialize)]
pub struct PlayResponse {
    pub is_winner: bool,
    pub prize_type_id: Option<Uuid>,
    pub prize_code: Option<String>,
}

/// The caller's authenticated principal (spec §4.8: "never trusts a
/// client-supplied id"). Session/JWT validation is out of scope for the
/// core (§1) — this extractor reads the customer id an upstream auth layer
/// is assumed to have already verified and attached as a header.
pub struct AuthenticatedCustomer(pub Uuid);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthenticatedCustomer
where
    S: Send + Sync,
{
    type Rejection = FailureKind;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get("x-customer-id")
            .and_then(|v| v.to_str().ok())
            .ok_or(FailureKind::CustomerNotFound)?;
        let id = Uuid::parse_str(raw).map_err(|_| FailureKind::CustomerNotFound)?;
        Ok(AuthenticatedCustomer(id))
    }
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, FailureKind> {
    let body = state.metrics.render().map_err(FailureKind::from)?;
    Ok((StatusCode::OK, body))
}

/// C9, spec §4.8: enforces the per-customer admission oracle, then
/// delegates to the C8 play transaction.
pub async fn play_handler(
    State(state): State<Arc<AppState>>,
    Path(promotion_id): Path<Uuid>,
    AuthenticatedCustomer(customer_id): AuthenticatedCustomer,
    Json(request): Json<PlayRequest>,
) -> Result<impl IntoResponse, PlayRejection> {
    if !state.oracle.allow(&customer_id.to_string()).await {
        return Err(PlayRejection::RateLimited);
    }

    let clock = SystemClock;
    let result = play::play(
        &state.store,
        &clock,
        state.rng.as_ref(),
        &state.metrics,
        state.config.prize_code_retry_attempts,
        state.config.play_transaction_timeout,
        promotion_id,
        &request.token_code,
        customer_id,
    )
    .await?;

    Ok((
        StatusCode::OK,
        Json(PlayResponse {
            is_winner: result.is_winner,
            prize_type_id: result.prize_type_id,
            prize_code: result.prize_code,
        }),
    ))
}
