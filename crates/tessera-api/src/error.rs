//! HTTP-layer error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tessera_core::error::EngineError;
use thiserror::Error;

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
    /// For hook rejections: the hook's reason, verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Request-level error that implements `IntoResponse`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// An engine operation failed.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// A mutation arrived without the required `If-Match` version header.
    #[error("the If-Match header carrying the expected version is required")]
    MissingIfMatch,

    /// The `If-Match` header is not a version number.
    #[error("invalid If-Match header: '{0}' is not a version number")]
    InvalidIfMatch(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            Self::Engine(err) => {
                let status = match err {
                    EngineError::Validation(_)
                    | EngineError::HookRejected { .. }
                    | EngineError::HookTimeout { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    EngineError::Conflict { .. } => StatusCode::CONFLICT,
                    EngineError::EntityNotFound(_) | EngineError::RecordNotFound { .. } => {
                        StatusCode::NOT_FOUND
                    }
                };
                (status, err.code())
            }
            Self::MissingIfMatch => (StatusCode::PRECONDITION_REQUIRED, "missing_if_match"),
            Self::InvalidIfMatch(_) => (StatusCode::BAD_REQUEST, "invalid_if_match"),
        };

        let reason = match &self {
            Self::Engine(EngineError::HookRejected { reason, .. }) => Some(reason.clone()),
            _ => None,
        };

        let body = ErrorBody {
            error: error_code,
            message: self.to_string(),
            reason,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_validation_maps_to_422() {
        assert_eq!(
            status_of(EngineError::Validation("bad input".into()).into()),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_hook_rejection_maps_to_422() {
        assert_eq!(
            status_of(
                EngineError::HookRejected {
                    hook: "require_positive_amount".into(),
                    reason: "amount must be positive".into(),
                }
                .into()
            ),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_conflict_maps_to_409() {
        assert_eq!(
            status_of(
                EngineError::Conflict {
                    entity: "users".into(),
                    id: 1,
                    expected: 1,
                    actual: 2,
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_not_found_maps_to_404() {
        assert_eq!(
            status_of(EngineError::EntityNotFound("ghosts".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(
                EngineError::RecordNotFound {
                    entity: "users".into(),
                    id: 9,
                }
                .into()
            ),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_missing_if_match_maps_to_428() {
        assert_eq!(
            status_of(ApiError::MissingIfMatch),
            StatusCode::PRECONDITION_REQUIRED
        );
    }

    #[tokio::test]
    async fn test_hook_rejection_body_carries_the_reason_verbatim() {
        use http_body_util::BodyExt;

        let err: ApiError = EngineError::HookRejected {
            hook: "require_positive_amount".into(),
            reason: "amount must be positive".into(),
        }
        .into();

        let response = err.into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(json["error"], "hook_rejected");
        assert_eq!(json["reason"], "amount must be positive");
    }
}
