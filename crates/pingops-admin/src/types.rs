use chrono::{DateTime, Utc};
use pingops_jobs::{CancelOutcome, Operation, Outcome, Record};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSubmitRequest {
    pub operation: Operation,
    pub records: Vec<Record>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub job_id: String,
    pub outcome: CancelOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordResponse {
    pub operation: Operation,
    pub record: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminInfo {
    pub version: String,
    pub uptime_seconds: u64,
    pub boot_time: DateTime<Utc>,
    pub jobs: JobCounts,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounts {
    pub total: usize,
    pub active: usize,
    pub finished: usize,
}
