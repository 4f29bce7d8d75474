pub mod batch;
pub mod health;
pub mod info;
pub mod user;

use axum::{Json, extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse};
use pingops_common::error::PingOpsError;

pub struct ApiError(pub PingOpsError);

impl From<PingOpsError> for ApiError {
    fn from(value: PingOpsError) -> Self {
        Self(value)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        Self(PingOpsError::InvalidInput(value.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match self.0 {
            PingOpsError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PingOpsError::AccessDenied(_) => StatusCode::FORBIDDEN,
            PingOpsError::JobNotFound(_) => StatusCode::NOT_FOUND,
            PingOpsError::StreamUnavailable(_) => StatusCode::CONFLICT,
            PingOpsError::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (
            status,
            Json(serde_json::json!({
                "code": self.0.error_code(),
                "message": self.0.to_string(),
            })),
        )
            .into_response()
    }
}
