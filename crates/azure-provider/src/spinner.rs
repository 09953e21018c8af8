use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::log_writer::LogSink;

pub const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(200);

const CLEAR_LINE: &str = "\r\x1b[K";

/// Animated status line written to a log sink until stopped.
///
/// Every tick writes `"{frame} {status}\r"`. Stopping clears the line and
/// writes `"{done}\n"`. Dropping the handle without stopping clears the
/// line and writes nothing else.
pub struct Spinner {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Spinner {
    pub fn start(
        sink: Arc<dyn LogSink>,
        status: impl Into<String>,
        done: impl Into<String>,
        interval: Duration,
    ) -> Self {
        let status = status.into();
        let done = done.into();
        let (stop, mut stopped) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut frame = 0usize;

            loop {
                tokio::select! {
                    biased;
                    result = &mut stopped => {
                        sink.write(CLEAR_LINE.as_bytes());
                        if result.is_ok() {
                            sink.write(format!("{done}\n").as_bytes());
                        }
                        return;
                    }
                    _ = ticker.tick() => {
                        let glyph = FRAMES[frame % FRAMES.len()];
                        sink.write(format!("{glyph} {status}\r").as_bytes());
                        frame += 1;
                    }
                }
            }
        });

        Self { stop, task }
    }

    /// Stop the animation and wait until the final line is written.
    pub async fn stop(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "spinner task failed");
        }
    }
}
