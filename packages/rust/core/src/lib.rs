//! Extraction orchestration for DealScout.
//!
//! This crate runs a [`SourceConfiguration`](dealscout_shared::SourceConfiguration)
//! through its processor source by source, applying tier limits, publishing
//! progress, and honouring cooperative cancellation.

pub mod cancel;
pub mod limiter;
pub mod pipeline;
pub mod progress;

pub use cancel::CancellationController;
pub use limiter::{BatchConfig, TierPolicy};
pub use pipeline::{
    ExtractionOrchestrator, OrchestratorSettings, RunHandle, RunReport, RunRequest, RunStatus,
    SourceFailure,
};
pub use progress::{ProgressEvent, ProgressState, ProgressStatus, ProgressTracker, TransitionError};
