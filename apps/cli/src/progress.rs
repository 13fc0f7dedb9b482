//! Terminal progress display driven by run progress events.

use std::time::Duration;

use dealscout_core::{ProgressEvent, ProgressState, ProgressStatus};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

/// indicatif bar mirroring a run's [`ProgressState`].
pub(crate) struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    pub(crate) fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "✔"])
                .progress_chars("=> "),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
        Self { bar }
    }

    /// A display that draws nothing (for `--json` output).
    pub(crate) fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Render events until the run's tracker goes away.
    pub(crate) async fn drive(self, mut events: broadcast::Receiver<ProgressEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => self.render(&event.state),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "progress display fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
        self.bar.finish_and_clear();
    }

    fn render(&self, state: &ProgressState) {
        self.bar.set_length(state.total as u64);
        self.bar.set_position(completed(state) as u64);
        self.bar.set_message(status_line(state));

        if state.status == ProgressStatus::Error {
            if let Some(error) = &state.error {
                self.bar.println(format!("  ! {error}"));
            }
        }
    }
}

/// Sources finished so far: the current one counts once the run is over.
fn completed(state: &ProgressState) -> usize {
    match state.status {
        ProgressStatus::Complete => state.total,
        ProgressStatus::Error | ProgressStatus::Idle => state.current,
        _ => state.current.saturating_sub(1),
    }
}

fn status_line(state: &ProgressState) -> String {
    match &state.message {
        Some(message) => format!("{:<10} {message}", state.status.as_str()),
        None => state.status.as_str().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(status: ProgressStatus, current: usize, total: usize) -> ProgressState {
        ProgressState {
            status,
            current,
            total,
            message: Some("Source 2 of 4: https://a.example".into()),
            error: None,
        }
    }

    #[test]
    fn in_flight_source_is_not_counted() {
        assert_eq!(completed(&state(ProgressStatus::Analyzing, 2, 4)), 1);
        assert_eq!(completed(&state(ProgressStatus::Scraping, 0, 4)), 0);
        assert_eq!(completed(&state(ProgressStatus::Error, 2, 4)), 2);
        assert_eq!(completed(&state(ProgressStatus::Complete, 4, 4)), 4);
    }

    #[test]
    fn status_line_leads_with_status() {
        let line = status_line(&state(ProgressStatus::Processing, 2, 4));
        assert!(line.starts_with("processing"));
        assert!(line.ends_with("https://a.example"));
    }

    #[tokio::test]
    async fn drive_stops_when_sender_drops() {
        let (tx, rx) = broadcast::channel(4);
        tx.send(ProgressEvent {
            sequence: 1,
            previous: ProgressStatus::Idle,
            state: state(ProgressStatus::Scraping, 0, 4),
        })
        .unwrap();
        drop(tx);
        CliProgress::hidden().drive(rx).await;
    }
}
