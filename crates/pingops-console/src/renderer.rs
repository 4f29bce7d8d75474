use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pingops_common::time::{elapsed_millis, format_elapsed};
use pingops_jobs::{EventKind, JobSnapshot, JobSummary, Operation, ProgressEvent};
use tracing::{debug, warn};

use crate::error::ConsoleError;

const BAR_WIDTH: usize = 30;

#[async_trait]
pub trait CancelJob: Send + Sync {
    async fn request_cancel(&self, job_id: &str) -> Result<(), ConsoleError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub index: usize,
    pub record: String,
    pub status: StepStatus,
    pub user_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderPhase {
    Running,
    Cancelling,
    Finished {
        kind: EventKind,
        summary: JobSummary,
        error: Option<String>,
    },
    Interrupted(String),
}

#[derive(Debug)]
pub struct ProgressRenderer {
    job_id: String,
    operation: Operation,
    total_items: usize,
    started_at: DateTime<Utc>,
    steps: Vec<Step>,
    positions: HashMap<usize, usize>,
    success_count: usize,
    failure_count: usize,
    next_sequence: u64,
    elapsed_secs: u64,
    phase: RenderPhase,
}

impl ProgressRenderer {
    pub fn attach(snapshot: &JobSnapshot) -> Self {
        Self {
            job_id: snapshot.id.clone(),
            operation: snapshot.operation,
            total_items: snapshot.total_items,
            started_at: snapshot.started_at,
            steps: Vec::new(),
            positions: HashMap::new(),
            success_count: 0,
            failure_count: 0,
            next_sequence: 0,
            elapsed_secs: 0,
            phase: RenderPhase::Running,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn phase(&self) -> &RenderPhase {
        &self.phase
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn success_count(&self) -> usize {
        self.success_count
    }

    pub fn failure_count(&self) -> usize {
        self.failure_count
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed_secs
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.phase,
            RenderPhase::Finished { .. } | RenderPhase::Interrupted(_)
        )
    }

    pub fn percent(&self) -> usize {
        if self.total_items == 0 {
            return 0;
        }
        ((self.success_count + self.failure_count) * 100 / self.total_items).min(100)
    }

    pub fn apply(&mut self, event: &ProgressEvent) {
        if self.is_finished() {
            return;
        }
        if event.job_id != self.job_id {
            warn!(expected = %self.job_id, got = %event.job_id, "ignoring event for another job");
            return;
        }
        if event.sequence < self.next_sequence {
            debug!(sequence = event.sequence, "ignoring duplicate progress event");
            return;
        }
        if event.sequence > self.next_sequence {
            self.phase = RenderPhase::Interrupted(format!(
                "missed progress events {} to {}",
                self.next_sequence,
                event.sequence - 1
            ));
            return;
        }
        self.next_sequence += 1;

        let payload = &event.payload;
        match event.kind {
            EventKind::StepStart => {
                if let Some(index) = payload.index {
                    self.step_mut(index, payload.record.as_deref());
                }
            }
            EventKind::StepSuccess | EventKind::StepFailure => {
                let succeeded = event.kind == EventKind::StepSuccess;
                if let Some(index) = payload.index {
                    let step = self.step_mut(index, payload.record.as_deref());
                    step.status = if succeeded {
                        StepStatus::Succeeded
                    } else {
                        StepStatus::Failed
                    };
                    step.user_id = payload.user_id.clone();
                    step.error = payload.error.clone();
                }
                if succeeded {
                    self.success_count += 1;
                } else {
                    self.failure_count += 1;
                }
            }
            EventKind::Cancelled | EventKind::Completed | EventKind::Failed => {
                let summary = payload.summary.unwrap_or(JobSummary {
                    total_items: self.total_items,
                    success_count: self.success_count,
                    failure_count: self.failure_count,
                    not_attempted: self
                        .total_items
                        .saturating_sub(self.success_count + self.failure_count),
                    elapsed_ms: self.elapsed_secs * 1000,
                });
                self.success_count = summary.success_count;
                self.failure_count = summary.failure_count;
                self.elapsed_secs = summary.elapsed_ms / 1000;
                self.phase = RenderPhase::Finished {
                    kind: event.kind,
                    summary,
                    error: payload.error.clone(),
                };
            }
        }
    }

    pub fn tick(&mut self, now: DateTime<Utc>) {
        if !self.is_finished() {
            self.elapsed_secs = elapsed_millis(self.started_at, now) / 1000;
        }
    }

    pub async fn cancel(&mut self, api: &dyn CancelJob) -> Result<(), ConsoleError> {
        if self.phase != RenderPhase::Running {
            return Ok(());
        }

        self.phase = RenderPhase::Cancelling;
        if let Err(err) = api.request_cancel(&self.job_id).await {
            self.phase = RenderPhase::Running;
            return Err(err);
        }
        Ok(())
    }

    pub fn disconnected(&mut self, reason: impl Into<String>) {
        if !self.is_finished() {
            self.phase = RenderPhase::Interrupted(reason.into());
        }
    }

    pub fn exit_code(&self) -> i32 {
        match &self.phase {
            RenderPhase::Finished {
                kind: EventKind::Completed,
                ..
            } => 0,
            RenderPhase::Finished {
                kind: EventKind::Cancelled,
                ..
            } => 2,
            _ => 1,
        }
    }

    pub fn lines(&self, max_steps: usize) -> Vec<String> {
        let percent = self.percent();
        let filled = percent * BAR_WIDTH / 100;
        let mut lines = vec![
            format!("{} job {}", self.operation, self.job_id),
            format!(
                "[{}{}] {percent:>3}%  {}/{}  elapsed {}",
                "#".repeat(filled),
                "-".repeat(BAR_WIDTH - filled),
                self.success_count + self.failure_count,
                self.total_items,
                format_elapsed(self.elapsed_secs),
            ),
        ];

        let hidden = self.steps.len().saturating_sub(max_steps);
        if hidden > 0 {
            lines.push(format!("  ... {hidden} earlier records"));
        }
        lines.extend(self.steps.iter().skip(hidden).map(render_step));
        lines.push(self.status_line());
        lines
    }

    fn status_line(&self) -> String {
        match &self.phase {
            RenderPhase::Running => format!(
                "running: {} succeeded, {} failed",
                self.success_count, self.failure_count
            ),
            RenderPhase::Cancelling => "cancelling... waiting for in-flight record".to_string(),
            RenderPhase::Finished {
                kind,
                summary,
                error,
            } => {
                let elapsed = format_elapsed(summary.elapsed_ms / 1000);
                match kind {
                    EventKind::Cancelled => format!(
                        "operation cancelled by user: {} succeeded, {} failed, {} not attempted ({elapsed})",
                        summary.success_count, summary.failure_count, summary.not_attempted
                    ),
                    EventKind::Failed => format!(
                        "job failed: {}. {} succeeded, {} failed, {} not attempted ({elapsed})",
                        error.as_deref().unwrap_or("unknown error"),
                        summary.success_count,
                        summary.failure_count,
                        summary.not_attempted
                    ),
                    _ => format!(
                        "completed: {} succeeded, {} failed ({elapsed})",
                        summary.success_count, summary.failure_count
                    ),
                }
            }
            RenderPhase::Interrupted(reason) => format!(
                "interrupted: {reason}. Final outcome unknown; check `pingops-console status {}`",
                self.job_id
            ),
        }
    }

    fn step_mut(&mut self, index: usize, record: Option<&str>) -> &mut Step {
        let position = match self.positions.get(&index).copied() {
            Some(position) => position,
            None => {
                self.steps.push(Step {
                    index,
                    record: record
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("record #{}", index + 1)),
                    status: StepStatus::Running,
                    user_id: None,
                    error: None,
                });
                self.positions.insert(index, self.steps.len() - 1);
                self.steps.len() - 1
            }
        };
        &mut self.steps[position]
    }
}

fn render_step(step: &Step) -> String {
    match step.status {
        StepStatus::Running => format!("  [..]     {}", step.record),
        StepStatus::Succeeded => match &step.user_id {
            Some(user_id) => format!("  [ok]     {} ({user_id})", step.record),
            None => format!("  [ok]     {}", step.record),
        },
        StepStatus::Failed => format!(
            "  [failed] {}: {}",
            step.record,
            step.error.as_deref().unwrap_or("failed")
        ),
    }
}
