use std::sync::Arc;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{AdminSys, handlers, middleware::admin_auth};

pub fn admin_router(admin: Arc<AdminSys>) -> Router {
    let api = Router::new()
        .route("/api/v1/info", get(handlers::info::server_info))
        .route(
            "/api/v1/jobs",
            get(handlers::batch::list_batch_jobs).post(handlers::batch::submit_batch_job),
        )
        .route("/api/v1/jobs/{job_id}", get(handlers::batch::get_batch_job))
        .route(
            "/api/v1/jobs/{job_id}/cancel",
            post(handlers::batch::cancel_batch_job),
        )
        .route(
            "/api/v1/jobs/{job_id}/events",
            get(handlers::batch::stream_batch_events),
        )
        .route(
            "/api/v1/users/{operation}",
            post(handlers::user::apply_record),
        )
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&admin),
            admin_auth,
        ));

    Router::new()
        .route("/health/live", get(handlers::health::health_live))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(admin)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode, header},
    };
    use http_body_util::BodyExt;
    use pingops_jobs::{
        BatchExecutor, EventKind, ExecuteError, JobController, JobSnapshot, Operation, Outcome,
        ProgressEvent, Record, RecordError,
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::admin_router;
    use crate::AdminSys;

    struct FakeExecutor;

    #[async_trait]
    impl BatchExecutor for FakeExecutor {
        async fn execute(
            &self,
            record: &Record,
            _operation: Operation,
        ) -> Result<Outcome, ExecuteError> {
            match record.get("username") {
                Some("bad") => Err(RecordError::new("username is malformed")
                    .with_code("INVALID_DATA")
                    .into()),
                Some(username) => Ok(Outcome {
                    user_id: Some(format!("u-{username}")),
                }),
                None => Err(RecordError::new("username missing").into()),
            }
        }
    }

    fn app(token: Option<&str>) -> Router {
        let admin = AdminSys::new(JobController::new(Arc::new(FakeExecutor)))
            .with_admin_token(token.map(str::to_string));
        admin_router(Arc::new(admin))
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn submit(app: &Router, usernames: &[&str]) -> JobSnapshot {
        let records: Vec<Value> = usernames
            .iter()
            .map(|username| json!({ "username": username }))
            .collect();
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/jobs",
                json!({ "operation": "import", "records": records }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        serde_json::from_value(body_json(response).await).unwrap()
    }

    async fn submit_value(app: &Router, body: Value) -> axum::response::Response {
        app.clone()
            .oneshot(json_request("POST", "/api/v1/jobs", body))
            .await
            .unwrap()
    }

    fn parse_sse(body: &str) -> Vec<(String, ProgressEvent)> {
        body.split("\n\n")
            .filter(|frame| !frame.trim().is_empty())
            .filter_map(|frame| {
                let mut name = None;
                let mut data = None;
                for line in frame.lines() {
                    if let Some(value) = line.strip_prefix("event:") {
                        name = Some(value.trim().to_string());
                    } else if let Some(value) = line.strip_prefix("data:") {
                        data = Some(value.trim().to_string());
                    }
                }
                Some((name?, serde_json::from_str(&data?).unwrap()))
            })
            .collect()
    }

    #[tokio::test]
    async fn submitted_job_streams_progress_until_terminal_event() {
        let app = app(None);
        let job = submit(&app, &["ada", "bad", "grace"]).await;
        assert_eq!(job.total_items, 3);

        let response = app
            .clone()
            .oneshot(get(&format!("/api/v1/jobs/{}/events", job.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let frames = parse_sse(&String::from_utf8(bytes.to_vec()).unwrap());

        assert_eq!(frames.len(), 7);
        for (sequence, (name, event)) in frames.iter().enumerate() {
            assert_eq!(event.sequence, sequence as u64);
            assert_eq!(name, event.kind.as_str());
        }
        let (_, terminal) = frames.last().unwrap();
        assert_eq!(terminal.kind, EventKind::Completed);
        let summary = terminal.payload.summary.unwrap();
        assert_eq!((summary.success_count, summary.failure_count), (2, 1));

        let response = app
            .clone()
            .oneshot(get(&format!("/api/v1/jobs/{}", job.id)))
            .await
            .unwrap();
        let status = body_json(response).await;
        assert_eq!(status["state"], "completed");
        assert_eq!(status["failureCount"], 1);
    }

    #[tokio::test]
    async fn progress_stream_can_only_be_claimed_once() {
        let app = app(None);
        let job = submit(&app, &["ada"]).await;
        let uri = format!("/api/v1/jobs/{}/events", job.id);

        let first = app.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = app.clone().oneshot(get(&uri)).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(second).await["code"], "StreamUnavailable");
    }

    #[tokio::test]
    async fn empty_batch_is_rejected() {
        let response = app(None)
            .oneshot(json_request(
                "POST",
                "/api/v1/jobs",
                json!({ "operation": "delete", "records": [] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "InvalidInput");
    }

    #[tokio::test]
    async fn malformed_submissions_get_a_json_error_body() {
        let app = app(None);

        let job = submit_value(
            &app,
            json!({ "operation": "import", "records": [{ "username": "ada", "enabled": true, "age": 36 }] }),
        )
        .await;
        assert_eq!(job.status(), StatusCode::CREATED);

        let nested = submit_value(
            &app,
            json!({ "operation": "import", "records": [{ "username": { "first": "ada" } }] }),
        )
        .await;
        assert_eq!(nested.status(), StatusCode::BAD_REQUEST);
        let body = body_json(nested).await;
        assert_eq!(body["code"], "InvalidInput");
        assert!(body["message"].as_str().is_some_and(|message| !message.is_empty()));

        let unknown_operation = submit_value(&app, json!({ "operation": "purge", "records": [] })).await;
        assert_eq!(unknown_operation.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(unknown_operation).await["code"], "InvalidInput");
    }

    #[tokio::test]
    async fn cancel_reports_unknown_jobs() {
        let response = app(None)
            .oneshot(json_request("POST", "/api/v1/jobs/nope/cancel", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "JobNotFound");
    }

    #[tokio::test]
    async fn cancel_acknowledges_known_jobs() {
        let app = app(None);
        let job = submit(&app, &["ada", "grace"]).await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/api/v1/jobs/{}/cancel", job.id),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["jobId"], job.id.as_str());
        assert!(matches!(
            body["outcome"].as_str(),
            Some("requested" | "alreadyTerminal")
        ));
    }

    #[tokio::test]
    async fn api_requires_token_when_configured() {
        let app = app(Some("s3cret"));

        let denied = app.clone().oneshot(get("/api/v1/jobs")).await.unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let allowed = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/v1/jobs")
                    .header(header::AUTHORIZATION, "Bearer s3cret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);

        let health = app.oneshot(get("/health/live")).await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn single_record_operations_bypass_jobs() {
        let app = app(None);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/users/import",
                json!({ "username": "ada" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["userId"], "u-ada");
        assert_eq!(body["record"], "ada");

        let rejected = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/users/modify",
                json!({ "username": "bad" }),
            ))
            .await
            .unwrap();
        assert_eq!(rejected.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            body_json(rejected).await["message"],
            "upstream error: INVALID_DATA: username is malformed"
        );

        let unknown = app
            .oneshot(json_request(
                "POST",
                "/api/v1/users/purge",
                json!({ "username": "ada" }),
            ))
            .await
            .unwrap();
        assert_eq!(unknown.status(), StatusCode::BAD_REQUEST);
    }
}
