use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use pingops_jobs::{JobSnapshot, ProgressEvent};
use tracing::debug;

use crate::{
    AdminSys,
    handlers::ApiError,
    types::{BatchSubmitRequest, CancelResponse},
};

pub async fn submit_batch_job(
    State(admin): State<Arc<AdminSys>>,
    payload: Result<Json<BatchSubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<JobSnapshot>), ApiError> {
    let Json(payload) = payload?;
    let job = admin.jobs().submit(payload.records, payload.operation)?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn list_batch_jobs(
    State(admin): State<Arc<AdminSys>>,
) -> Result<Json<Vec<JobSnapshot>>, ApiError> {
    Ok(Json(admin.jobs().list()?))
}

pub async fn get_batch_job(
    State(admin): State<Arc<AdminSys>>,
    Path(job_id): Path<String>,
) -> Result<Json<JobSnapshot>, ApiError> {
    Ok(Json(admin.jobs().status(&job_id)?))
}

pub async fn cancel_batch_job(
    State(admin): State<Arc<AdminSys>>,
    Path(job_id): Path<String>,
) -> Result<Json<CancelResponse>, ApiError> {
    let outcome = admin.jobs().request_cancel(&job_id)?;
    Ok(Json(CancelResponse { job_id, outcome }))
}

pub async fn stream_batch_events(
    State(admin): State<Arc<AdminSys>>,
    Path(job_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let subscriber = admin.jobs().subscribe(&job_id)?;
    debug!(job_id, "progress stream attached");

    let stream = subscriber.into_stream().map(|event| to_sse_event(&event));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse_event(event: &ProgressEvent) -> Result<Event, axum::Error> {
    Event::default()
        .event(event.kind.as_str())
        .id(event.sequence.to_string())
        .json_data(event)
}
