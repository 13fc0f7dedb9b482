//! Run progress as an explicit state machine.
//!
//! ```text
//! idle → scraping ⇄ analyzing ⇄ processing → complete
//!            ↑           ↓           ↓
//!            └────────  error  ←─────┘        (any active state → idle on cancel)
//! ```
//!
//! Every accepted update fully replaces the previous [`ProgressState`] and is
//! published twice: as the latest value on a `watch` channel (for pollers)
//! and as a [`ProgressEvent`] on a `broadcast` channel (for subscribers).
//! The orchestrator is the only writer.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use dealscout_sources::SourcePhase;

/// Capacity of the event channel; slow subscribers see `Lagged`.
const EVENT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Coarse status of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    #[default]
    Idle,
    Scraping,
    Analyzing,
    Processing,
    Complete,
    Error,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scraping => "scraping",
            Self::Analyzing => "analyzing",
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    /// A source is being worked on.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Scraping | Self::Analyzing | Self::Processing)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: ProgressStatus) -> bool {
        use ProgressStatus::*;
        match (self, next) {
            (Idle, Scraping) => true,
            (Idle, _) => false,
            (Complete, Scraping | Idle) => true,
            (Complete, _) => false,
            // Active states and transient per-source errors may move anywhere.
            (Scraping | Analyzing | Processing | Error, _) => true,
        }
    }
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<SourcePhase> for ProgressStatus {
    fn from(phase: SourcePhase) -> Self {
        match phase {
            SourcePhase::Scraping => Self::Scraping,
            SourcePhase::Analyzing => Self::Analyzing,
            SourcePhase::Processing => Self::Processing,
        }
    }
}

/// Observable progress of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProgressState {
    pub status: ProgressStatus,
    /// 1-based index of the source being (or last) processed.
    pub current: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One accepted transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    /// Monotonic per tracker, starting at 1.
    pub sequence: u64,
    pub previous: ProgressStatus,
    pub state: ProgressState,
}

/// Why an update was refused.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("illegal transition {from} -> {to}")]
    Illegal {
        from: ProgressStatus,
        to: ProgressStatus,
    },

    #[error("current {current} exceeds total {total}")]
    PastTotal { current: usize, total: usize },

    #[error("current went backwards from {from} to {to}")]
    Regressed { from: usize, to: usize },

    #[error("complete requires current == total (got {current}/{total})")]
    IncompleteCompletion { current: usize, total: usize },

    #[error("error status requires a non-empty error message")]
    MissingError,
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Holds the progress of one run and publishes every change.
pub struct ProgressTracker {
    state: watch::Sender<ProgressState>,
    events: broadcast::Sender<ProgressEvent>,
    sequence: AtomicU64,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ProgressState::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state,
            events,
            sequence: AtomicU64::new(0),
        }
    }

    /// The current state.
    pub fn snapshot(&self) -> ProgressState {
        self.state.borrow().clone()
    }

    /// Latest-value receiver, for pollers.
    pub fn watch(&self) -> watch::Receiver<ProgressState> {
        self.state.subscribe()
    }

    /// Event stream of transitions accepted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.events.subscribe()
    }

    /// Replace the whole state, if the transition is legal.
    pub fn update(&self, next: ProgressState) -> Result<(), TransitionError> {
        self.apply(next, false)
    }

    fn apply(&self, next: ProgressState, fresh_run: bool) -> Result<(), TransitionError> {
        let previous = self.snapshot();
        check_transition(&previous, &next, fresh_run)?;

        debug!(
            from = %previous.status,
            to = %next.status,
            current = next.current,
            total = next.total,
            "progress transition"
        );

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        self.state.send_replace(next.clone());
        // No subscribers is fine.
        let _ = self.events.send(ProgressEvent {
            sequence,
            previous: previous.status,
            state: next,
        });
        Ok(())
    }

    // -- named transitions --------------------------------------------------

    /// Begin a run over `total` sources, discarding the previous run's
    /// counters. Refused while another run is still active.
    pub fn start(&self, total: usize) -> Result<(), TransitionError> {
        self.apply(
            ProgressState {
                status: ProgressStatus::Scraping,
                current: 0,
                total,
                message: Some(format!("Starting search across {total} sources")),
                error: None,
            },
            true,
        )
    }

    /// Begin work on the 1-based source `current`.
    pub fn source_started(&self, current: usize, source: &str) -> Result<(), TransitionError> {
        let total = self.snapshot().total;
        self.update(ProgressState {
            status: ProgressStatus::Scraping,
            current,
            total,
            message: Some(format!("Source {current} of {total}: {source}")),
            error: None,
        })
    }

    /// A processor moved into `phase` on the current source.
    pub fn phase(&self, phase: SourcePhase, detail: &str) -> Result<(), TransitionError> {
        let now = self.snapshot();
        self.update(ProgressState {
            status: phase.into(),
            current: now.current,
            total: now.total,
            message: Some(detail.to_string()),
            error: None,
        })
    }

    /// The current source failed; the run carries on.
    pub fn source_failed(&self, error: &str) -> Result<(), TransitionError> {
        let now = self.snapshot();
        self.update(ProgressState {
            status: ProgressStatus::Error,
            current: now.current,
            total: now.total,
            message: Some(format!("Source {} of {} failed", now.current, now.total)),
            error: Some(error.to_string()),
        })
    }

    /// Terminal success. `error` carries a retained per-source error, if any.
    pub fn complete(&self, message: String, error: Option<String>) -> Result<(), TransitionError> {
        let total = self.snapshot().total;
        self.update(ProgressState {
            status: ProgressStatus::Complete,
            current: total,
            total,
            message: Some(message),
            error,
        })
    }

    /// Terminal failure.
    pub fn fail(&self, error: String) -> Result<(), TransitionError> {
        let now = self.snapshot();
        self.update(ProgressState {
            status: ProgressStatus::Error,
            current: now.current,
            total: now.total,
            message: Some("Search failed".into()),
            error: Some(error),
        })
    }

    /// Cancellation: back to idle, keeping the counters reached.
    pub fn reset(&self, message: String) -> Result<(), TransitionError> {
        let now = self.snapshot();
        self.update(ProgressState {
            status: ProgressStatus::Idle,
            current: now.current,
            total: now.total,
            message: Some(message),
            error: None,
        })
    }
}

fn check_transition(
    previous: &ProgressState,
    next: &ProgressState,
    fresh_run: bool,
) -> Result<(), TransitionError> {
    if !previous.status.can_transition_to(next.status) || (fresh_run && previous.status.is_active())
    {
        return Err(TransitionError::Illegal {
            from: previous.status,
            to: next.status,
        });
    }
    if next.current > next.total {
        return Err(TransitionError::PastTotal {
            current: next.current,
            total: next.total,
        });
    }
    // Within a run the counter only moves forward. Leaving idle or complete
    // starts over.
    let same_run = !fresh_run
        && (previous.status.is_active() || previous.status == ProgressStatus::Error);
    if same_run && next.current < previous.current {
        return Err(TransitionError::Regressed {
            from: previous.current,
            to: next.current,
        });
    }
    if next.status == ProgressStatus::Complete && next.current != next.total {
        return Err(TransitionError::IncompleteCompletion {
            current: next.current,
            total: next.total,
        });
    }
    if next.status == ProgressStatus::Error
        && next.error.as_deref().is_none_or(|e| e.trim().is_empty())
    {
        return Err(TransitionError::MissingError);
    }
    Ok(())
}
