use thiserror::Error;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use crate::types::{EventKind, EventPayload, ProgressEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("progress channel already delivered its terminal event")]
    Closed,
    #[error("progress subscriber disconnected")]
    Disconnected,
}

pub fn progress_channel(job_id: &str) -> (ProgressPublisher, ProgressSubscriber) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressPublisher {
            job_id: job_id.to_string(),
            next_sequence: 0,
            tx: Some(tx),
            detached: false,
        },
        ProgressSubscriber {
            job_id: job_id.to_string(),
            rx,
        },
    )
}

#[derive(Debug)]
pub struct ProgressPublisher {
    job_id: String,
    next_sequence: u64,
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
    detached: bool,
}

impl ProgressPublisher {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_none()
    }

    pub fn emit(&mut self, kind: EventKind, payload: EventPayload) -> Result<u64, ChannelError> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(ChannelError::Closed);
        };

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let delivered = tx
            .send(ProgressEvent {
                job_id: self.job_id.clone(),
                sequence,
                kind,
                payload,
            })
            .is_ok();

        if kind.is_terminal() {
            self.tx = None;
        }

        if !delivered {
            if !self.detached {
                self.detached = true;
                debug!(job_id = %self.job_id, sequence, "progress subscriber went away");
            }
            return Err(ChannelError::Disconnected);
        }

        Ok(sequence)
    }
}

#[derive(Debug)]
pub struct ProgressSubscriber {
    job_id: String,
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressSubscriber {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    pub fn into_stream(self) -> UnboundedReceiverStream<ProgressEvent> {
        UnboundedReceiverStream::new(self.rx)
    }
}

#[cfg(test)]
mod tests {
    use super::{ChannelError, progress_channel};
    use crate::types::{EventKind, EventPayload};

    #[tokio::test]
    async fn sequences_start_at_zero_and_close_after_terminal() {
        let (mut publisher, mut subscriber) = progress_channel("job-1");

        assert_eq!(
            publisher.emit(EventKind::StepStart, EventPayload::step(0, "ada")),
            Ok(0)
        );
        assert_eq!(
            publisher.emit(EventKind::StepSuccess, EventPayload::step(0, "ada")),
            Ok(1)
        );
        assert_eq!(
            publisher.emit(EventKind::Completed, EventPayload::default()),
            Ok(2)
        );
        assert!(publisher.is_closed());
        assert_eq!(
            publisher.emit(EventKind::StepStart, EventPayload::default()),
            Err(ChannelError::Closed)
        );

        let mut sequences = Vec::new();
        while let Some(event) = subscriber.recv().await {
            assert_eq!(event.job_id, "job-1");
            sequences.push(event.sequence);
        }
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn dropped_subscriber_reports_disconnect() {
        let (mut publisher, subscriber) = progress_channel("job-2");
        drop(subscriber);

        assert_eq!(
            publisher.emit(EventKind::StepStart, EventPayload::step(0, "ada")),
            Err(ChannelError::Disconnected)
        );
        assert!(!publisher.is_closed());
    }
}
