use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use pingops_common::error::PingOpsError;
use tracing::debug;

use crate::{AdminSys, handlers::ApiError};

pub async fn admin_auth(State(admin): State<Arc<AdminSys>>, req: Request, next: Next) -> Response {
    let Some(expected) = admin.admin_token() else {
        return next.run(req).await;
    };

    let presented = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    let Some(presented) = presented else {
        return ApiError(PingOpsError::AccessDenied(
            "admin api requires a bearer token".to_string(),
        ))
        .into_response();
    };

    if !constant_time_eq(presented.as_bytes(), expected.as_bytes()) {
        debug!(path = %req.uri().path(), "rejected admin token");
        return ApiError(PingOpsError::AccessDenied("invalid admin token".to_string()))
            .into_response();
    }

    next.run(req).await
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    left.len() == right.len()
        && left
            .iter()
            .zip(right)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}
