//! Extraction pipeline: sources → processors → tier limits → candidates.
//!
//! Sources are processed strictly one after another in the order given.
//! A failing source is logged and skipped; it never aborts the run.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use dealscout_shared::{
    CandidateDeal, DealScoutError, PipelineConfig, Result, RunId, SourceConfiguration,
};
use dealscout_sources::{
    KeywordFilter, PhaseReporter, ProcessorRegistry, SourcePhase, SourceProcessor,
};

use crate::cancel::CancellationController;
use crate::limiter::{self, BatchConfig, TierPolicy};
use crate::progress::{ProgressEvent, ProgressState, ProgressTracker};

/// Default time budget for a single source.
const DEFAULT_SOURCE_TIMEOUT: Duration = Duration::from_secs(90);

// ---------------------------------------------------------------------------
// Request / report
// ---------------------------------------------------------------------------

/// Everything a caller supplies to start a run.
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Snapshot of the source configuration; not re-read during the run.
    pub config: SourceConfiguration,
    pub policy: TierPolicy,
    pub batch: BatchConfig,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// At least one candidate was found.
    Completed,
    /// Sources were processed but none yielded a candidate.
    NoResults,
    /// Every processed source failed.
    Exhausted,
    /// Stopped early at the caller's request; partial results kept.
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::NoResults => "no_results",
            Self::Exhausted => "exhausted",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A source whose processor raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    /// 1-based position in the working source list.
    pub index: usize,
    pub source: String,
    pub error: String,
}

/// Result of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub status: RunStatus,
    /// In source order, then processor order within a source.
    pub candidates: Vec<CandidateDeal>,
    /// Size of the working source list.
    pub sources_total: usize,
    /// Sources whose processor was invoked.
    pub sources_processed: usize,
    pub failures: Vec<SourceFailure>,
    /// Final progress state.
    pub progress: ProgressState,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl RunReport {
    pub fn sources_succeeded(&self) -> usize {
        self.sources_processed - self.failures.len()
    }
}

mod duration_ms {
    use std::time::Duration;

    pub fn serialize<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Orchestrator tuning.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// A source taking longer than this is recorded as failed.
    pub source_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            source_timeout: DEFAULT_SOURCE_TIMEOUT,
        }
    }
}

impl From<&PipelineConfig> for OrchestratorSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            source_timeout: config.source_timeout(),
        }
    }
}

/// A validated request, ready to execute.
struct PreparedRun {
    keywords: KeywordFilter,
    processor: Arc<dyn SourceProcessor>,
    sources: Vec<String>,
    policy: TierPolicy,
}

/// Drives extraction runs over a [`ProcessorRegistry`].
#[derive(Debug)]
pub struct ExtractionOrchestrator {
    registry: ProcessorRegistry,
    settings: OrchestratorSettings,
}

impl ExtractionOrchestrator {
    pub fn new(registry: ProcessorRegistry, settings: OrchestratorSettings) -> Self {
        Self { registry, settings }
    }

    /// Check a request without running it.
    pub fn validate(&self, request: &RunRequest) -> Result<()> {
        self.prepare(request).map(|_| ())
    }

    fn prepare(&self, request: &RunRequest) -> Result<PreparedRun> {
        let config = &request.config;

        let keywords = KeywordFilter::new(&config.include_keywords, &config.exclude_keywords)?;
        if keywords.include_keywords().is_empty() {
            return Err(DealScoutError::validation(
                "at least one include keyword is required",
            ));
        }
        if config.source_urls.iter().all(|s| s.trim().is_empty()) {
            return Err(DealScoutError::validation("at least one source is required"));
        }

        let sources: Vec<String> = config
            .source_urls
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let sources = limiter::select_sources(&sources, &request.policy, &request.batch)?.to_vec();
        let processor = self.registry.get(config.source_type)?;

        Ok(PreparedRun {
            keywords,
            processor,
            sources,
            policy: request.policy,
        })
    }

    /// Run to completion on the current task.
    ///
    /// Returns `Err` only for invalid requests, before `tracker` is touched.
    /// Per-source failures, empty results, and cancellation are reported
    /// through [`RunReport::status`].
    pub async fn run(
        &self,
        request: &RunRequest,
        cancel: &CancellationController,
        tracker: &ProgressTracker,
    ) -> Result<RunReport> {
        let prepared = self.prepare(request)?;
        Ok(self.execute(RunId::new(), prepared, cancel, tracker).await)
    }

    /// Validate, then run on a spawned tokio task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_run(self: &Arc<Self>, request: RunRequest) -> Result<RunHandle> {
        let prepared = self.prepare(&request)?;

        let id = RunId::new();
        let cancel = CancellationController::new();
        let tracker = Arc::new(ProgressTracker::new());
        let events = tracker.subscribe();
        let progress = tracker.watch();

        let orchestrator = Arc::clone(self);
        let task = {
            let id = id.clone();
            let cancel = cancel.clone();
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                orchestrator
                    .execute(id, prepared, &cancel, &tracker)
                    .await
            })
        };

        Ok(RunHandle {
            id,
            cancel,
            progress,
            events,
            task,
        })
    }

    #[instrument(skip_all, fields(run_id = %run_id, kind = %prepared.processor.kind(), sources = prepared.sources.len()))]
    async fn execute(
        &self,
        run_id: RunId,
        prepared: PreparedRun,
        cancel: &CancellationController,
        tracker: &ProgressTracker,
    ) -> RunReport {
        let start = Instant::now();
        let PreparedRun {
            keywords,
            processor,
            sources,
            policy,
        } = prepared;
        let total = sources.len();

        info!(tier = %policy.tier, cap = policy.max_per_source, "starting extraction run");
        record(tracker.start(total));

        let mut candidates: Vec<CandidateDeal> = Vec::new();
        let mut failures: Vec<SourceFailure> = Vec::new();
        let mut processed = 0usize;
        let mut cancelled = false;

        for (i, source) in sources.iter().enumerate() {
            let index = i + 1;

            if cancel.is_signalled() {
                info!(processed, remaining = total - processed, "cancellation observed, stopping");
                cancelled = true;
                break;
            }

            record(tracker.source_started(index, source));
            let phases = TrackerPhases { tracker };

            let outcome = tokio::time::timeout(
                self.settings.source_timeout,
                processor.process(source, &keywords, &phases),
            )
            .await
            .unwrap_or_else(|_| Err(DealScoutError::Timeout(self.settings.source_timeout)));
            processed += 1;

            match outcome {
                Ok(found) => {
                    let found_count = found.len();
                    let kept = limiter::limit(found, &policy);
                    debug!(index, source = %source, found = found_count, kept = kept.len(), "source done");
                    candidates.extend(kept);
                }
                Err(e) => {
                    let e = DealScoutError::source(source.as_str(), e);
                    warn!(index, source = %source, error = %e, "source failed, continuing");
                    record(tracker.source_failed(&e.to_string()));
                    failures.push(SourceFailure {
                        index,
                        source: source.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let last_error = failures.last().map(|f| f.error.clone());
        let status = if cancelled {
            record(tracker.reset(format!(
                "Search cancelled after {processed} of {total} sources"
            )));
            RunStatus::Cancelled
        } else if processed > 0 && failures.len() == processed {
            record(tracker.fail(
                last_error.unwrap_or_else(|| "every source failed".to_string()),
            ));
            RunStatus::Exhausted
        } else if candidates.is_empty() {
            record(tracker.complete(
                "No candidates found. Try broader keywords or different sources.".into(),
                last_error,
            ));
            RunStatus::NoResults
        } else {
            record(tracker.complete(
                format!("Found {} candidates across {total} sources", candidates.len()),
                None,
            ));
            RunStatus::Completed
        };

        let report = RunReport {
            run_id,
            status,
            candidates,
            sources_total: total,
            sources_processed: processed,
            failures,
            progress: tracker.snapshot(),
            elapsed: start.elapsed(),
        };

        info!(
            status = report.status.as_str(),
            candidates = report.candidates.len(),
            processed = report.sources_processed,
            failed = report.failures.len(),
            elapsed_ms = report.elapsed.as_millis(),
            "extraction run finished"
        );

        report
    }
}

/// Log a refused progress transition. The orchestrator only issues legal
/// transitions, so this firing indicates a bug, not a runtime condition.
fn record(result: std::result::Result<(), crate::progress::TransitionError>) {
    if let Err(e) = result {
        warn!(error = %e, "progress update rejected");
    }
}

/// Forwards processor phases into the run's tracker.
struct TrackerPhases<'a> {
    tracker: &'a ProgressTracker,
}

impl PhaseReporter for TrackerPhases<'_> {
    fn phase(&self, phase: SourcePhase, detail: &str) {
        record(self.tracker.phase(phase, detail));
    }
}

// ---------------------------------------------------------------------------
// Run handle
// ---------------------------------------------------------------------------

/// Handle to a run started with [`ExtractionOrchestrator::start_run`].
pub struct RunHandle {
    id: RunId,
    cancel: CancellationController,
    progress: watch::Receiver<ProgressState>,
    events: broadcast::Receiver<ProgressEvent>,
    task: JoinHandle<RunReport>,
}

impl RunHandle {
    pub fn id(&self) -> &RunId {
        &self.id
    }

    /// Ask the run to stop before its next source.
    pub fn cancel(&self) {
        self.cancel.signal();
    }

    /// A controller sharing this run's signal (e.g. for a Ctrl-C handler).
    pub fn cancellation(&self) -> CancellationController {
        self.cancel.clone()
    }

    /// Latest-value progress receiver.
    pub fn progress(&self) -> watch::Receiver<ProgressState> {
        self.progress.clone()
    }

    /// Progress events. The first call yields every event since the run
    /// started; later calls only see events from then on.
    pub fn events(&mut self) -> broadcast::Receiver<ProgressEvent> {
        let fresh = self.events.resubscribe();
        std::mem::replace(&mut self.events, fresh)
    }

    /// Wait for the run to finish.
    pub async fn join(self) -> Result<RunReport> {
        self.task
            .await
            .map_err(|e| DealScoutError::Extraction(format!("run task failed: {e}")))
    }
}

impl std::fmt::Debug for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunHandle")
            .field("id", &self.id)
            .field("cancelled", &self.cancel.is_signalled())
            .finish()
    }
}
