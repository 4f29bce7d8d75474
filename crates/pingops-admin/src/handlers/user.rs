use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use pingops_common::error::PingOpsError;
use pingops_jobs::{BatchExecutor, ExecuteError, Operation, Record};

use crate::{AdminSys, handlers::ApiError, types::RecordResponse};

pub async fn apply_record(
    State(admin): State<Arc<AdminSys>>,
    Path(operation): Path<String>,
    record: Result<Json<Record>, JsonRejection>,
) -> Result<Json<RecordResponse>, ApiError> {
    let operation: Operation = operation.parse()?;
    let Json(record) = record?;
    if record.is_empty() {
        return Err(PingOpsError::InvalidInput("record has no values".to_string()).into());
    }

    let outcome = admin
        .executor()
        .execute(&record, operation)
        .await
        .map_err(|err| match err {
            ExecuteError::Record(err) => PingOpsError::Upstream(match err.code {
                Some(code) => format!("{code}: {}", err.message),
                None => err.message,
            }),
            ExecuteError::Fatal(message) => PingOpsError::Upstream(message),
        })?;

    Ok(Json(RecordResponse {
        operation,
        record: record.label(0),
        outcome,
    }))
}
