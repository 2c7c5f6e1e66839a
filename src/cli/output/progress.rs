//! Progress bar for running jobs, drawn on stderr with indicatif.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::domain::models::job::JobState;
use crate::services::job_scheduler::SchedulerEvent;

const PROGRESS_TEMPLATE: &str = "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}";
const PROGRESS_CHARS: &str = "█▓▒░ ";

/// Create the job progress bar.
pub fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr());
    pb.set_style(
        ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars(PROGRESS_CHARS),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Running failure count shown in the bar message.
#[derive(Debug, Default)]
struct EventTally {
    failed: usize,
}

impl EventTally {
    fn apply(&mut self, pb: &ProgressBar, event: SchedulerEvent) {
        match event {
            SchedulerEvent::JobStarted { package } => {
                if self.failed == 0 {
                    pb.set_message(package);
                }
            }
            SchedulerEvent::JobFinished { state, .. } => {
                if state != JobState::Succeeded {
                    self.failed += 1;
                }
                pb.inc(1);
                if self.failed > 0 {
                    pb.set_message(format!("{} failed", self.failed));
                }
            }
        }
    }
}

/// Drive `pb` from scheduler events until the sender side is dropped.
pub fn track_events(pb: ProgressBar, mut events: mpsc::Receiver<SchedulerEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tally = EventTally::default();
        while let Some(event) = events.recv().await {
            tally.apply(&pb, event);
        }
        pb.finish_and_clear();
    })
}

/// Writer that hides the progress bar while writing, so streamed test
/// output never interleaves with a half-drawn bar.
pub struct SuspendingWriter<W> {
    pb: ProgressBar,
    inner: W,
}

impl<W: Write> SuspendingWriter<W> {
    pub fn new(pb: ProgressBar, inner: W) -> Self {
        Self { pb, inner }
    }
}

impl<W: Write> Write for SuspendingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let inner = &mut self.inner;
        self.pb.suspend(|| inner.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        let inner = &mut self.inner;
        self.pb.suspend(|| inner.flush())
    }
}
