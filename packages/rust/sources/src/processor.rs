//! The source-processing strategy trait.

use async_trait::async_trait;

use dealscout_shared::{CandidateDeal, Result, SourceType};

use crate::keywords::KeywordFilter;

/// Sub-step a processor is in while handling one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourcePhase {
    /// Fetching raw content or querying the remote origin.
    Scraping,
    /// Running AI extraction over fetched content.
    Analyzing,
    /// Shaping and filtering the extracted candidates.
    Processing,
}

impl SourcePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scraping => "scraping",
            Self::Analyzing => "analyzing",
            Self::Processing => "processing",
        }
    }
}

/// Receives phase changes from a processor while it works on a source.
pub trait PhaseReporter: Send + Sync {
    fn phase(&self, phase: SourcePhase, detail: &str);
}

/// No-op phase reporter for headless/test usage.
pub struct SilentPhases;

impl PhaseReporter for SilentPhases {
    fn phase(&self, _phase: SourcePhase, _detail: &str) {}
}

/// Produces candidate deals for a single source.
///
/// Implementations are independent of each other and keep no per-call state;
/// a processor may be invoked many times within one run.
#[async_trait]
pub trait SourceProcessor: Send + Sync {
    /// The source kind this processor handles.
    fn kind(&self) -> SourceType;

    /// Produce keyword-annotated candidates for `source`.
    ///
    /// Every returned candidate names at least one matched include keyword
    /// and matches no exclude keyword. Errors are attributed to `source`.
    async fn process(
        &self,
        source: &str,
        keywords: &KeywordFilter,
        phases: &dyn PhaseReporter,
    ) -> Result<Vec<CandidateDeal>>;
}
