use std::{io::Write, time::Duration};

use pingops_common::time;
use tracing::warn;

use crate::{
    client::{ConsoleClient, EventStream},
    error::ConsoleError,
    renderer::{ProgressRenderer, RenderPhase},
};

pub struct Screen<W: Write> {
    out: W,
    max_steps: usize,
    drawn: usize,
}

impl<W: Write> Screen<W> {
    pub fn new(out: W, max_steps: usize) -> Self {
        Self {
            out,
            max_steps,
            drawn: 0,
        }
    }

    pub fn draw(&mut self, renderer: &ProgressRenderer) -> Result<(), ConsoleError> {
        if self.drawn > 0 {
            write!(self.out, "\x1b[{}A\x1b[J", self.drawn)?;
        }
        let lines = renderer.lines(self.max_steps);
        for line in &lines {
            writeln!(self.out, "{line}")?;
        }
        self.out.flush()?;
        self.drawn = lines.len();
        Ok(())
    }
}

pub async fn watch<W: Write>(
    client: &ConsoleClient,
    renderer: &mut ProgressRenderer,
    mut events: EventStream,
    screen: &mut Screen<W>,
) -> Result<(), ConsoleError> {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    screen.draw(renderer)?;

    while !renderer.is_finished() {
        tokio::select! {
            event = events.next() => match event {
                Some(Ok(event)) => renderer.apply(&event),
                Some(Err(err)) => renderer.disconnected(err.to_string()),
                None => renderer.disconnected("progress stream closed before the job finished"),
            },
            _ = ticker.tick() => renderer.tick(time::now()),
            signal = tokio::signal::ctrl_c() => {
                signal?;
                if *renderer.phase() == RenderPhase::Running {
                    if let Err(err) = renderer.cancel(client).await {
                        warn!(error = %err, "cancel request failed");
                    }
                } else {
                    renderer.disconnected("detached by user while the job was still running");
                }
            }
        }
        screen.draw(renderer)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use pingops_jobs::{JobSnapshot, JobState, Operation};

    use super::Screen;
    use crate::renderer::ProgressRenderer;

    #[test]
    fn redraw_moves_cursor_over_previous_frame() {
        let renderer = ProgressRenderer::attach(&JobSnapshot {
            id: "job-1".to_string(),
            operation: Operation::Delete,
            state: JobState::Running,
            total_items: 2,
            cursor: 0,
            success_count: 0,
            failure_count: 0,
            cancel_requested: false,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        });

        let mut screen = Screen::new(Vec::new(), 5);
        screen.draw(&renderer).unwrap();
        screen.draw(&renderer).unwrap();

        let output = String::from_utf8(screen.out).unwrap();
        assert!(output.starts_with("delete job job-1\n"));
        assert_eq!(output.matches("\x1b[3A\x1b[J").count(), 1);
    }
}
