use std::sync::Arc;

use async_trait::async_trait;
use pingops_jobs::{BatchExecutor, ExecuteError, Operation, Outcome, Record, RecordError};
use tracing::debug;

use crate::{
    client::{ClientError, PingOneClient},
    user::{user_id, user_payload},
};

pub struct PingOneExecutor {
    client: Arc<PingOneClient>,
}

impl PingOneExecutor {
    pub fn new(client: Arc<PingOneClient>) -> Self {
        Self { client }
    }

    async fn import(&self, record: &Record) -> Result<Outcome, ClientError> {
        let body = user_payload(
            record,
            Operation::Import,
            self.client.config().population_id.as_deref(),
        )?;
        let user = self.client.create_user(&body).await?;
        debug!(user_id = %user.id, "created PingOne user");
        Ok(Outcome {
            user_id: Some(user.id),
        })
    }

    async fn modify(&self, record: &Record) -> Result<Outcome, ClientError> {
        let body = user_payload(record, Operation::Modify, None)?;
        let id = self.resolve_user_id(record).await?;
        let user = self.client.update_user(&id, &body).await?;
        Ok(Outcome {
            user_id: Some(user.id),
        })
    }

    async fn delete(&self, record: &Record) -> Result<Outcome, ClientError> {
        let id = self.resolve_user_id(record).await?;
        self.client.delete_user(&id).await?;
        Ok(Outcome { user_id: Some(id) })
    }

    async fn resolve_user_id(&self, record: &Record) -> Result<String, ClientError> {
        if let Some(id) = user_id(record) {
            return Ok(id.to_string());
        }

        let username = record.get("username").ok_or_else(|| {
            ClientError::InvalidRecord("record needs an id or a username".to_string())
        })?;
        self.client
            .find_user_id(username)
            .await?
            .ok_or_else(|| ClientError::UserNotFound(username.to_string()))
    }
}

#[async_trait]
impl BatchExecutor for PingOneExecutor {
    async fn execute(&self, record: &Record, operation: Operation) -> Result<Outcome, ExecuteError> {
        let result = match operation {
            Operation::Import => self.import(record).await,
            Operation::Modify => self.modify(record).await,
            Operation::Delete => self.delete(record).await,
        };
        result.map_err(classify)
    }
}

// Transport failures and credential rejection stop the batch; anything
// PingOne says about an individual user only fails that record.
fn classify(err: ClientError) -> ExecuteError {
    match err {
        ClientError::Unreachable { .. } | ClientError::Unauthorized { .. } => {
            ExecuteError::Fatal(err.to_string())
        }
        ClientError::Api {
            status,
            code,
            message,
        } => {
            let error = RecordError::new(message).with_status(status);
            ExecuteError::Record(match code {
                Some(code) => error.with_code(code),
                None => error,
            })
        }
        ClientError::UserNotFound(_) => {
            ExecuteError::Record(RecordError::new(err.to_string()).with_status(404))
        }
        ClientError::InvalidRecord(_) | ClientError::Decode(_) => {
            ExecuteError::Record(RecordError::new(err.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use axum::{
        Json, Router,
        extract::{Path, Query, State},
        http::{HeaderMap, StatusCode, header::AUTHORIZATION},
        response::{IntoResponse, Response},
        routing::{delete, post},
    };
    use pingops_jobs::{BatchExecutor, ExecuteError, Operation, Record};
    use serde_json::{Value, json};

    use super::{PingOneExecutor, classify};
    use crate::{
        client::{ClientError, PingOneClient},
        config::PingOneConfig,
    };

    #[derive(Default)]
    struct FakePingOne {
        token_requests: AtomicUsize,
        deleted: std::sync::Mutex<Vec<String>>,
    }

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == "Bearer worker-token")
    }

    async fn issue_token(State(fake): State<Arc<FakePingOne>>) -> Json<Value> {
        fake.token_requests.fetch_add(1, Ordering::SeqCst);
        Json(json!({ "access_token": "worker-token", "token_type": "Bearer", "expires_in": 3600 }))
    }

    async fn create_user(headers: HeaderMap, Json(body): Json<Value>) -> Response {
        if !authorized(&headers) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        let username = body["username"].as_str().unwrap_or_default().to_string();
        if username == "taken" {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "code": "INVALID_DATA",
                    "message": "The request could not be completed.",
                    "details": [{ "code": "UNIQUENESS_VIOLATION", "target": "username", "message": "must be unique" }],
                })),
            )
                .into_response();
        }
        (
            StatusCode::CREATED,
            Json(json!({ "id": format!("u-{username}"), "username": username })),
        )
            .into_response()
    }

    async fn find_users(
        headers: HeaderMap,
        Query(query): Query<HashMap<String, String>>,
    ) -> Response {
        if !authorized(&headers) {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        let users = match query.get("filter").map(String::as_str) {
            Some(r#"username eq "ada""#) => vec![json!({ "id": "u-ada", "username": "ada" })],
            _ => Vec::new(),
        };
        Json(json!({ "_embedded": { "users": users }, "count": users.len() })).into_response()
    }

    async fn delete_user(
        State(fake): State<Arc<FakePingOne>>,
        headers: HeaderMap,
        Path((_env, id)): Path<(String, String)>,
    ) -> StatusCode {
        if !authorized(&headers) {
            return StatusCode::UNAUTHORIZED;
        }
        if let Ok(mut deleted) = fake.deleted.lock() {
            deleted.push(id);
        }
        StatusCode::NO_CONTENT
    }

    async fn spawn_fake() -> (Arc<FakePingOne>, String) {
        let fake = Arc::new(FakePingOne::default());
        let app = Router::new()
            .route("/{env}/as/token", post(issue_token))
            .route(
                "/v1/environments/{env}/users",
                post(create_user).get(find_users),
            )
            .route("/v1/environments/{env}/users/{id}", delete(delete_user))
            .with_state(Arc::clone(&fake));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (fake, format!("http://{addr}"))
    }

    fn config(base: &str) -> PingOneConfig {
        PingOneConfig {
            environment_id: "env-1".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            api_url: format!("{base}/v1"),
            auth_url: base.to_string(),
            population_id: Some("pop-1".to_string()),
            request_timeout: Duration::from_secs(5),
        }
    }

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn imports_and_deletes_against_pingone() {
        let (fake, base) = spawn_fake().await;
        let client = Arc::new(PingOneClient::new(config(&base)).unwrap());
        let executor = PingOneExecutor::new(client);

        let created = executor
            .execute(&record(&[("username", "grace")]), Operation::Import)
            .await
            .unwrap();
        assert_eq!(created.user_id.as_deref(), Some("u-grace"));

        let deleted = executor
            .execute(&record(&[("username", "ada")]), Operation::Delete)
            .await
            .unwrap();
        assert_eq!(deleted.user_id.as_deref(), Some("u-ada"));
        assert_eq!(*fake.deleted.lock().unwrap(), vec!["u-ada".to_string()]);
        assert_eq!(fake.token_requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_user_is_a_record_error() {
        let (_fake, base) = spawn_fake().await;
        let client = Arc::new(PingOneClient::new(config(&base)).unwrap());
        let executor = PingOneExecutor::new(client);

        let err = executor
            .execute(&record(&[("username", "taken")]), Operation::Import)
            .await
            .unwrap_err();
        let ExecuteError::Record(err) = err else {
            panic!("expected a record error, got {err:?}");
        };
        assert_eq!(err.status, Some(400));
        assert_eq!(err.code.as_deref(), Some("INVALID_DATA"));
        assert!(err.message.contains("username: must be unique"));

        let missing = executor
            .execute(&record(&[("username", "ghost")]), Operation::Delete)
            .await
            .unwrap_err();
        assert!(matches!(missing, ExecuteError::Record(err) if err.status == Some(404)));
    }

    #[tokio::test]
    async fn unreachable_pingone_is_fatal() {
        let client = Arc::new(PingOneClient::new(config("http://127.0.0.1:1")).unwrap());
        let executor = PingOneExecutor::new(client);

        let err = executor
            .execute(&record(&[("username", "ada")]), Operation::Import)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecuteError::Fatal(_)));
    }

    #[test]
    fn invalid_records_never_stop_the_batch() {
        let err = classify(ClientError::InvalidRecord("no username".to_string()));
        assert!(matches!(err, ExecuteError::Record(_)));
        let err = classify(ClientError::Unauthorized {
            status: 401,
            message: "bad secret".to_string(),
        });
        assert!(matches!(err, ExecuteError::Fatal(_)));
    }
}
