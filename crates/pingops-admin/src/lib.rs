pub mod handlers;
pub mod middleware;
pub mod router;
pub mod types;

use std::{sync::Arc, time::Instant};

use chrono::{DateTime, Utc};
use pingops_jobs::{BatchExecutor, JobController};

#[derive(Clone)]
pub struct AdminSys {
    jobs: JobController,
    admin_token: Option<String>,
    started_at: Instant,
    boot_time: DateTime<Utc>,
}

impl AdminSys {
    pub fn new(jobs: JobController) -> Self {
        Self {
            jobs,
            admin_token: None,
            started_at: Instant::now(),
            boot_time: Utc::now(),
        }
    }

    pub fn with_admin_token(mut self, token: Option<String>) -> Self {
        self.admin_token = token.filter(|value| !value.trim().is_empty());
        self
    }

    pub fn jobs(&self) -> &JobController {
        &self.jobs
    }

    pub fn executor(&self) -> Arc<dyn BatchExecutor> {
        self.jobs.executor()
    }

    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token.as_deref()
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn boot_time(&self) -> DateTime<Utc> {
        self.boot_time
    }
}
