use std::{
    collections::HashMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use chrono::{DateTime, Duration, Utc};
use pingops_common::{
    error::{PingOpsError, Result},
    time,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::{
    channel::{ChannelError, ProgressPublisher, ProgressSubscriber, progress_channel},
    executor::{BatchExecutor, ExecuteError},
    job::{BatchJob, CancelFlag},
    types::{EventKind, EventPayload, JobSnapshot, JobState, Operation, Record},
};

const DEFAULT_RETENTION_SECS: i64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CancelOutcome {
    Requested,
    AlreadyRequested,
    AlreadyTerminal,
}

#[derive(Debug)]
pub struct StartedJob {
    pub snapshot: JobSnapshot,
    pub events: ProgressSubscriber,
}

struct JobEntry {
    snapshot: JobSnapshot,
    cancel: CancelFlag,
    subscriber: Option<ProgressSubscriber>,
}

#[derive(Clone)]
pub struct JobController {
    executor: Arc<dyn BatchExecutor>,
    jobs: Arc<RwLock<HashMap<String, JobEntry>>>,
    retention: Duration,
}

impl JobController {
    pub fn new(executor: Arc<dyn BatchExecutor>) -> Self {
        Self {
            executor,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            retention: Duration::seconds(DEFAULT_RETENTION_SECS),
        }
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn executor(&self) -> Arc<dyn BatchExecutor> {
        Arc::clone(&self.executor)
    }

    pub fn start(&self, items: Vec<Record>, operation: Operation) -> Result<StartedJob> {
        let mut job = BatchJob::new(operation, items)?;
        let (publisher, subscriber) = progress_channel(job.id());
        job.transition(JobState::Running)?;

        let snapshot = job.snapshot();
        self.jobs_write()?.insert(
            snapshot.id.clone(),
            JobEntry {
                snapshot: snapshot.clone(),
                cancel: job.cancel_flag(),
                subscriber: None,
            },
        );
        info!(
            job_id = %snapshot.id,
            operation = %operation,
            total = snapshot.total_items,
            "batch job started"
        );

        let controller = self.clone();
        tokio::spawn(async move {
            controller.drive(job, publisher).await;
        });

        Ok(StartedJob {
            snapshot,
            events: subscriber,
        })
    }

    // Starts a job and parks its progress stream until `subscribe` claims it.
    // The job runs whether or not anyone ever subscribes.
    pub fn submit(&self, items: Vec<Record>, operation: Operation) -> Result<JobSnapshot> {
        self.prune_finished(time::now())?;

        let started = self.start(items, operation)?;
        if let Some(entry) = self.jobs_write()?.get_mut(&started.snapshot.id) {
            entry.subscriber = Some(started.events);
        }
        Ok(started.snapshot)
    }

    pub fn subscribe(&self, job_id: &str) -> Result<ProgressSubscriber> {
        let mut jobs = self.jobs_write()?;
        let entry = jobs
            .get_mut(job_id)
            .ok_or_else(|| PingOpsError::JobNotFound(job_id.to_string()))?;
        entry.subscriber.take().ok_or_else(|| {
            PingOpsError::StreamUnavailable(format!(
                "progress stream for job {job_id} was already claimed"
            ))
        })
    }

    pub fn request_cancel(&self, job_id: &str) -> Result<CancelOutcome> {
        let mut jobs = self.jobs_write()?;
        let entry = jobs
            .get_mut(job_id)
            .ok_or_else(|| PingOpsError::JobNotFound(job_id.to_string()))?;

        if entry.snapshot.state.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal);
        }
        if !entry.cancel.request() {
            return Ok(CancelOutcome::AlreadyRequested);
        }

        entry.snapshot.cancel_requested = true;
        info!(job_id, "batch job cancel requested");
        Ok(CancelOutcome::Requested)
    }

    pub fn status(&self, job_id: &str) -> Result<JobSnapshot> {
        self.jobs_read()?
            .get(job_id)
            .map(|entry| entry.snapshot.clone())
            .ok_or_else(|| PingOpsError::JobNotFound(job_id.to_string()))
    }

    pub fn list(&self) -> Result<Vec<JobSnapshot>> {
        let mut jobs: Vec<JobSnapshot> = self
            .jobs_read()?
            .values()
            .map(|entry| entry.snapshot.clone())
            .collect();
        jobs.sort_by(|left, right| right.started_at.cmp(&left.started_at));
        Ok(jobs)
    }

    pub fn prune_finished(&self, now: DateTime<Utc>) -> Result<usize> {
        let retention = self.retention;
        let mut jobs = self.jobs_write()?;
        let before = jobs.len();
        jobs.retain(|_, entry| {
            !entry
                .snapshot
                .completed_at
                .and_then(|completed_at| completed_at.checked_add_signed(retention))
                .is_some_and(|deadline| deadline <= now)
        });

        let pruned = before - jobs.len();
        if pruned > 0 {
            debug!(pruned, "pruned finished batch jobs");
        }
        Ok(pruned)
    }

    async fn drive(&self, mut job: BatchJob, mut publisher: ProgressPublisher) {
        let operation = job.operation();

        loop {
            if job.cancel_requested() {
                self.finish_cancelled(&mut job, &mut publisher);
                break;
            }

            let Some((index, record)) = job.next_record() else {
                self.finish_completed(&mut job, &mut publisher);
                break;
            };

            let label = record.label(index);
            emit(
                &mut publisher,
                EventKind::StepStart,
                EventPayload::step(index, label.clone()),
            );

            let result = self.executor.execute(record, operation).await;
            match result {
                Ok(outcome) => {
                    job.resolve(true);
                    debug!(job_id = %job.id(), index, record = %label, "record succeeded");
                    emit(
                        &mut publisher,
                        EventKind::StepSuccess,
                        EventPayload {
                            user_id: outcome.user_id,
                            ..EventPayload::step(index, label)
                        },
                    );
                }
                Err(ExecuteError::Record(err)) => {
                    job.resolve(false);
                    warn!(job_id = %job.id(), index, record = %label, error = %err, "record failed");
                    emit(
                        &mut publisher,
                        EventKind::StepFailure,
                        EventPayload {
                            error: Some(err.to_string()),
                            ..EventPayload::step(index, label)
                        },
                    );
                }
                Err(ExecuteError::Fatal(message)) => {
                    job.resolve(false);
                    emit(
                        &mut publisher,
                        EventKind::StepFailure,
                        EventPayload {
                            error: Some(message.clone()),
                            ..EventPayload::step(index, label)
                        },
                    );
                    self.finish_failed(&mut job, &mut publisher, message);
                    break;
                }
            }

            self.publish(&job);
        }

        self.publish(&job);
    }

    fn finish_completed(&self, job: &mut BatchJob, publisher: &mut ProgressPublisher) {
        if let Err(err) = job.transition(JobState::Completed) {
            error!(job_id = %job.id(), error = %err, "failed to complete batch job");
            return;
        }

        let summary = job.summary();
        info!(
            job_id = %job.id(),
            succeeded = summary.success_count,
            failed = summary.failure_count,
            "batch job completed"
        );
        emit(publisher, EventKind::Completed, EventPayload::terminal(summary));
    }

    fn finish_cancelled(&self, job: &mut BatchJob, publisher: &mut ProgressPublisher) {
        let transitioned = job
            .transition(JobState::Cancelling)
            .and_then(|()| job.transition(JobState::Cancelled));
        if let Err(err) = transitioned {
            error!(job_id = %job.id(), error = %err, "failed to cancel batch job");
            return;
        }

        let summary = job.summary();
        info!(
            job_id = %job.id(),
            succeeded = summary.success_count,
            failed = summary.failure_count,
            not_attempted = summary.not_attempted,
            "batch job cancelled"
        );
        emit(publisher, EventKind::Cancelled, EventPayload::terminal(summary));
    }

    fn finish_failed(&self, job: &mut BatchJob, publisher: &mut ProgressPublisher, message: String) {
        if let Err(err) = job.fail(message.clone()) {
            error!(job_id = %job.id(), error = %err, "failed to mark batch job failed");
            return;
        }

        let summary = job.summary();
        error!(
            job_id = %job.id(),
            error = %message,
            not_attempted = summary.not_attempted,
            "batch job failed"
        );
        emit(
            publisher,
            EventKind::Failed,
            EventPayload {
                error: Some(message),
                ..EventPayload::terminal(summary)
            },
        );
    }

    fn publish(&self, job: &BatchJob) {
        match self.jobs.write() {
            Ok(mut jobs) => {
                if let Some(entry) = jobs.get_mut(job.id()) {
                    entry.snapshot = job.snapshot();
                }
            }
            Err(_) => warn!(job_id = %job.id(), "job registry lock poisoned"),
        }
    }

    fn jobs_read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, JobEntry>>> {
        self.jobs
            .read()
            .map_err(|_| PingOpsError::InternalError("job registry lock poisoned".to_string()))
    }

    fn jobs_write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, JobEntry>>> {
        self.jobs
            .write()
            .map_err(|_| PingOpsError::InternalError("job registry lock poisoned".to_string()))
    }
}

fn emit(publisher: &mut ProgressPublisher, kind: EventKind, payload: EventPayload) {
    match publisher.emit(kind, payload) {
        Ok(_) | Err(ChannelError::Disconnected) => {}
        Err(ChannelError::Closed) => {
            warn!(job_id = %publisher.job_id(), kind = kind.as_str(), "event emitted after terminal event");
        }
    }
}
