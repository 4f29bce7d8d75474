use std::collections::VecDeque;

use async_trait::async_trait;
use pingops_jobs::{JobSnapshot, Operation, ProgressEvent, Record};
use reqwest::{Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize};

use crate::{
    error::ConsoleError,
    renderer::CancelJob,
    sse::{SseDecoder, SseFrame},
};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelAck {
    pub job_id: String,
    pub outcome: String,
}

#[derive(Serialize)]
struct SubmitBody<'a> {
    operation: Operation,
    records: &'a [Record],
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

#[derive(Debug, Clone)]
pub struct ConsoleClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl ConsoleClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, ConsoleError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConsoleError::InvalidInput(format!(
                "server url must start with http:// or https://, got {base_url}"
            )));
        }

        Ok(Self {
            base_url,
            token,
            http: reqwest::Client::new(),
        })
    }

    pub async fn submit(
        &self,
        operation: Operation,
        records: &[Record],
    ) -> Result<JobSnapshot, ConsoleError> {
        let request = self
            .request(Method::POST, "/api/v1/jobs")
            .json(&SubmitBody { operation, records });
        let response = checked(request.send().await?).await?;
        Ok(response.json().await?)
    }

    pub async fn status(&self, job_id: &str) -> Result<JobSnapshot, ConsoleError> {
        let request = self.request(Method::GET, &format!("/api/v1/jobs/{job_id}"));
        let response = checked(request.send().await?).await?;
        Ok(response.json().await?)
    }

    pub async fn cancel(&self, job_id: &str) -> Result<CancelAck, ConsoleError> {
        let request = self.request(Method::POST, &format!("/api/v1/jobs/{job_id}/cancel"));
        let response = checked(request.send().await?).await?;
        Ok(response.json().await?)
    }

    pub async fn events(&self, job_id: &str) -> Result<EventStream, ConsoleError> {
        let request = self
            .request(Method::GET, &format!("/api/v1/jobs/{job_id}/events"))
            .header(reqwest::header::ACCEPT, "text/event-stream");
        let response = checked(request.send().await?).await?;
        Ok(EventStream::new(response))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.http.request(method, format!("{}{path}", self.base_url));
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl CancelJob for ConsoleClient {
    async fn request_cancel(&self, job_id: &str) -> Result<(), ConsoleError> {
        self.cancel(job_id).await.map(|_| ())
    }
}

async fn checked(response: Response) -> Result<Response, ConsoleError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => (body.code, body.message),
        Err(_) => (
            status.canonical_reason().unwrap_or("Error").to_string(),
            text,
        ),
    };
    Err(ConsoleError::Api {
        status: status.as_u16(),
        code,
        message,
    })
}

pub struct EventStream {
    response: Response,
    decoder: SseDecoder,
    pending: VecDeque<SseFrame>,
}

impl EventStream {
    fn new(response: Response) -> Self {
        Self {
            response,
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
        }
    }

    pub async fn next(&mut self) -> Option<Result<ProgressEvent, ConsoleError>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(serde_json::from_str(&frame.data).map_err(ConsoleError::from));
            }

            match self.response.chunk().await {
                Ok(Some(bytes)) => self.pending.extend(self.decoder.push(&bytes)),
                Ok(None) => return None,
                Err(err) => return Some(Err(ConsoleError::Stream(err.to_string()))),
            }
        }
    }
}
