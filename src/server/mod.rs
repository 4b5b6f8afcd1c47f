//! REST API over the store and the evaluation service.
//!
//! Errors are returned as `{"detail": "..."}`. Weight and criteria
//! validation failures use `{"detail": {"error": CODE, "message": "..."}}`.

pub mod routes;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

use crate::error::Error;

pub use routes::{app_router, AppState};

/// Status code and JSON body for a domain error.
pub fn error_response(err: &Error) -> (StatusCode, Value) {
    match err {
        Error::NotFound(msg) => (StatusCode::NOT_FOUND, json!({ "detail": msg })),
        Error::Conflict(msg) => (StatusCode::CONFLICT, json!({ "detail": msg })),
        Error::Validation { code, message } => (
            StatusCode::BAD_REQUEST,
            json!({ "detail": { "error": code.as_str(), "message": message } }),
        ),
        Error::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, json!({ "detail": msg })),
        Error::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "detail": msg })),
        other => {
            tracing::error!(error = %other, "request failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "detail": "Internal server error" }),
            )
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, body) = error_response(&self);
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationCode;

    #[test]
    fn test_error_mapping() {
        let (status, body) = error_response(&Error::not_found("Rubric"));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"detail": "Rubric not found"}));

        let (status, body) = error_response(&Error::validation(
            ValidationCode::InvalidWeightSum,
            "Weights must sum to 1. Current total: 0.90",
        ));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"]["error"], "INVALID_WEIGHT_SUM");

        let (status, _) = error_response(&Error::Unprocessable("Invalid rubric id".into()));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) = error_response(&Error::Internal("boom".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["detail"], "Internal server error");
    }
}
