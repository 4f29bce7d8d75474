use std::time::{Duration, Instant};

use pingops_common::error::{PingOpsError, Result};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::PingOneConfig;

const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("cannot reach PingOne at {url}: {message}")]
    Unreachable { url: String, message: String },
    #[error("PingOne rejected the worker credentials ({status}): {message}")]
    Unauthorized { status: u16, message: String },
    #[error("PingOne returned {status}: {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("unexpected PingOne response: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PingOneUser {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    details: Vec<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserPage {
    #[serde(rename = "_embedded", default)]
    embedded: EmbeddedUsers,
}

#[derive(Debug, Default, Deserialize)]
struct EmbeddedUsers {
    #[serde(default)]
    users: Vec<PingOneUser>,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct PingOneClient {
    config: PingOneConfig,
    http: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl PingOneClient {
    pub fn new(config: PingOneConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| {
                PingOpsError::InternalError(format!("failed to build PingOne http client: {err}"))
            })?;

        Ok(Self {
            config,
            http,
            token: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &PingOneConfig {
        &self.config
    }

    pub async fn create_user(&self, body: &Value) -> std::result::Result<PingOneUser, ClientError> {
        let url = self.config.users_url();
        let request = self.http.post(&url).json(body);
        let response = self.send(request, &url).await?;
        decode(response).await
    }

    pub async fn update_user(
        &self,
        user_id: &str,
        body: &Value,
    ) -> std::result::Result<PingOneUser, ClientError> {
        let url = format!("{}/{user_id}", self.config.users_url());
        let request = self.http.patch(&url).json(body);
        let response = self.send(request, &url).await?;
        decode(response).await
    }

    pub async fn delete_user(&self, user_id: &str) -> std::result::Result<(), ClientError> {
        let url = format!("{}/{user_id}", self.config.users_url());
        let request = self.http.delete(&url);
        self.send(request, &url).await?;
        Ok(())
    }

    pub async fn find_user_id(
        &self,
        username: &str,
    ) -> std::result::Result<Option<String>, ClientError> {
        let url = self.config.users_url();
        let filter = format!("username eq \"{}\"", username.replace('"', "\\\""));
        let request = self.http.get(&url).query(&[("filter", filter)]);
        let response = self.send(request, &url).await?;
        let page: UserPage = decode(response).await?;
        Ok(page.embedded.users.into_iter().next().map(|user| user.id))
    }

    async fn send(
        &self,
        request: RequestBuilder,
        url: &str,
    ) -> std::result::Result<Response, ClientError> {
        let token = self.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| transport_error(url, &err))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            self.token.lock().await.take();
            return Err(ClientError::Unauthorized {
                status: status.as_u16(),
                message: "access token was rejected".to_string(),
            });
        }

        Err(api_error(status, response).await)
    }

    async fn access_token(&self) -> std::result::Result<String, ClientError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && token.expires_at > Instant::now()
        {
            return Ok(token.value.clone());
        }

        let url = self.config.token_url();
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|err| transport_error(&url, &err))?;

        let status = response.status();
        if !status.is_success() {
            let message = match api_error(status, response).await {
                ClientError::Api { message, .. } => message,
                other => other.to_string(),
            };
            return Err(ClientError::Unauthorized {
                status: status.as_u16(),
                message,
            });
        }

        let token: TokenResponse = decode(response).await?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        debug!(expires_in = token.expires_in, "obtained PingOne worker token");
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }
}

fn transport_error(url: &str, err: &reqwest::Error) -> ClientError {
    ClientError::Unreachable {
        url: url.to_string(),
        message: err.to_string(),
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: Response,
) -> std::result::Result<T, ClientError> {
    response
        .json::<T>()
        .await
        .map_err(|err| ClientError::Decode(err.to_string()))
}

async fn api_error(status: StatusCode, response: Response) -> ClientError {
    let text = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ApiErrorBody>(&text) {
        Ok(body) => {
            let mut message = body
                .message
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
            for detail in body.details {
                match (detail.target, detail.message) {
                    (Some(target), Some(text)) => message.push_str(&format!("; {target}: {text}")),
                    (None, Some(text)) => message.push_str(&format!("; {text}")),
                    _ => {}
                }
            }
            (body.code, message)
        }
        Err(_) if !text.trim().is_empty() => (None, text.trim().to_string()),
        Err(_) => (
            None,
            status.canonical_reason().unwrap_or("request failed").to_string(),
        ),
    };

    ClientError::Api {
        status: status.as_u16(),
        code,
        message,
    }
}
