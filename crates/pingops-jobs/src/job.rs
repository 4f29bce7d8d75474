use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use chrono::{DateTime, Utc};
use pingops_common::{
    error::{PingOpsError, Result},
    time,
};
use uuid::Uuid;

use crate::types::{JobSnapshot, JobState, JobSummary, Operation, Record};

#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn request(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct BatchJob {
    id: String,
    operation: Operation,
    state: JobState,
    items: Vec<Record>,
    cursor: usize,
    success_count: usize,
    failure_count: usize,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    cancel: CancelFlag,
    error: Option<String>,
}

impl BatchJob {
    pub fn new(operation: Operation, items: Vec<Record>) -> Result<Self> {
        if items.is_empty() {
            return Err(PingOpsError::InvalidInput(
                "batch must contain at least one record".to_string(),
            ));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            operation,
            state: JobState::Pending,
            items,
            cursor: 0,
            success_count: 0,
            failure_count: 0,
            started_at: time::now(),
            completed_at: None,
            cancel: CancelFlag::default(),
            error: None,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn total_items(&self) -> usize {
        self.items.len()
    }

    pub fn success_count(&self) -> usize {
        self.success_count
    }

    pub fn failure_count(&self) -> usize {
        self.failure_count
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel.is_requested()
    }

    pub fn transition(&mut self, next: JobState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(PingOpsError::InternalError(format!(
                "job {} cannot move from {} to {next}",
                self.id, self.state
            )));
        }

        self.state = next;
        if next.is_terminal() {
            self.completed_at = Some(time::now());
        }
        Ok(())
    }

    pub fn next_record(&self) -> Option<(usize, &Record)> {
        self.items.get(self.cursor).map(|record| (self.cursor, record))
    }

    pub fn resolve(&mut self, succeeded: bool) {
        if self.cursor >= self.items.len() {
            return;
        }
        if succeeded {
            self.success_count += 1;
        } else {
            self.failure_count += 1;
        }
        self.cursor += 1;
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.error = Some(message.into());
        self.transition(JobState::Failed)
    }

    pub fn summary(&self) -> JobSummary {
        let end = self.completed_at.unwrap_or_else(time::now);
        JobSummary {
            total_items: self.items.len(),
            success_count: self.success_count,
            failure_count: self.failure_count,
            not_attempted: self.items.len() - self.cursor,
            elapsed_ms: time::elapsed_millis(self.started_at, end),
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            operation: self.operation,
            state: self.state,
            total_items: self.items.len(),
            cursor: self.cursor,
            success_count: self.success_count,
            failure_count: self.failure_count,
            cancel_requested: self.cancel.is_requested(),
            started_at: self.started_at,
            completed_at: self.completed_at,
            error: self.error.clone(),
        }
    }
}
