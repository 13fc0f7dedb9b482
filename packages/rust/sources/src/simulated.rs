//! Marketplace, API, and manual strategies.
//!
//! These sources have no scraping step: candidates come from a pluggable
//! [`CandidateSupplier`]. Production wires in [`RandomSupplier`]; tests
//! supply fixed fixtures.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::instrument;

use dealscout_shared::{CandidateDeal, DealScoutError, Result, SourceType};

use crate::keywords::KeywordFilter;
use crate::processor::{PhaseReporter, SourcePhase, SourceProcessor};

// ---------------------------------------------------------------------------
// Supplier seam
// ---------------------------------------------------------------------------

/// What a supplier is asked to produce candidates for.
#[derive(Debug, Clone, Copy)]
pub struct SupplyRequest<'a> {
    pub kind: SourceType,
    pub source: &'a str,
    pub include_keywords: &'a [String],
}

/// Produces raw candidates for a non-website source.
#[async_trait]
pub trait CandidateSupplier: Send + Sync {
    async fn supply(&self, request: &SupplyRequest<'_>) -> Result<Vec<CandidateDeal>>;
}

/// Fabricates a small, keyword-bearing batch of candidates per source.
pub struct RandomSupplier {
    rng: Mutex<StdRng>,
    max_candidates: usize,
}

const COMPANY_STEMS: &[&str] = &[
    "Northwind", "Bluepeak", "Cobalt", "Harbor", "Lumen", "Meridian", "Quartz", "Summit",
];

const DEAL_SUFFIXES: &[&str] = &[
    "acquisition target",
    "growth round",
    "platform licence",
    "strategic partnership",
    "expansion contract",
];

impl RandomSupplier {
    /// `seed` fixes the sequence; `None` seeds from the OS.
    pub fn new(max_candidates: usize, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng: Mutex::new(rng),
            max_candidates: max_candidates.max(1),
        }
    }
}

#[async_trait]
impl CandidateSupplier for RandomSupplier {
    async fn supply(&self, request: &SupplyRequest<'_>) -> Result<Vec<CandidateDeal>> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| DealScoutError::Extraction("candidate generator poisoned".into()))?;

        let count = rng.random_range(1..=self.max_candidates);
        let mut candidates = Vec::with_capacity(count);

        for _ in 0..count {
            let keyword = match request.include_keywords.len() {
                0 => "general",
                n => request.include_keywords[rng.random_range(0..n)].as_str(),
            };
            let company = COMPANY_STEMS[rng.random_range(0..COMPANY_STEMS.len())];
            let suffix = DEAL_SUFFIXES[rng.random_range(0..DEAL_SUFFIXES.len())];
            let slug = company.to_lowercase();

            candidates.push(CandidateDeal {
                deal_name: format!("{keyword} {suffix}"),
                company_name: format!("{company} {}", title_case(request.kind.as_str())),
                amount: f64::from(rng.random_range(10u32..500) * 1_000),
                company_url: format!("https://{slug}.example.com"),
                contact_email: format!("deals@{slug}.example.com"),
                notes: format!(
                    "Listed on {} source {} matching \"{keyword}\"",
                    request.kind, request.source
                ),
                confidence_score: Some(rng.random_range(55..=95)),
                source_url: request.source.to_string(),
                matched_keywords: vec![keyword.to_string()],
                relevance_score: None,
            });
        }

        Ok(candidates)
    }
}

fn title_case(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// Processor for marketplace, API, and manual sources.
pub struct SimulatedProcessor {
    kind: SourceType,
    supplier: Arc<dyn CandidateSupplier>,
}

impl SimulatedProcessor {
    pub fn new(kind: SourceType, supplier: Arc<dyn CandidateSupplier>) -> Self {
        Self { kind, supplier }
    }
}

#[async_trait]
impl SourceProcessor for SimulatedProcessor {
    fn kind(&self) -> SourceType {
        self.kind
    }

    #[instrument(skip_all, fields(kind = %self.kind, source = %source))]
    async fn process(
        &self,
        source: &str,
        keywords: &KeywordFilter,
        phases: &dyn PhaseReporter,
    ) -> Result<Vec<CandidateDeal>> {
        let include = keywords.include_keywords();

        phases.phase(
            SourcePhase::Scraping,
            &format!("Querying {} source {source}", self.kind),
        );
        let raw = self
            .supplier
            .supply(&SupplyRequest {
                kind: self.kind,
                source,
                include_keywords: &include,
            })
            .await
            .map_err(|e| DealScoutError::source(source, e))?;

        phases.phase(SourcePhase::Processing, &format!("Processing {source}"));
        Ok(keywords.apply(raw, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::SilentPhases;

    fn keywords(include: &[&str], exclude: &[&str]) -> KeywordFilter {
        let include: Vec<String> = include.iter().map(|s| s.to_string()).collect();
        let exclude: Vec<String> = exclude.iter().map(|s| s.to_string()).collect();
        KeywordFilter::new(&include, &exclude).unwrap()
    }

    #[tokio::test]
    async fn seeded_supplier_is_deterministic() {
        let include = vec!["fintech".to_string(), "health".to_string()];
        let request = SupplyRequest {
            kind: SourceType::Marketplace,
            source: "acme-market",
            include_keywords: &include,
        };

        let a = RandomSupplier::new(5, Some(7)).supply(&request).await.unwrap();
        let b = RandomSupplier::new(5, Some(7)).supply(&request).await.unwrap();
        assert_eq!(a, b);
        assert!((1..=5).contains(&a.len()));
    }

    #[tokio::test]
    async fn random_candidates_are_bounded_and_keyworded() {
        let supplier = Arc::new(RandomSupplier::new(4, Some(11)));
        let processor = SimulatedProcessor::new(SourceType::Api, supplier);
        let kw = keywords(&["fintech"], &[]);

        for i in 0..20 {
            let source = format!("api-feed-{i}");
            let out = processor.process(&source, &kw, &SilentPhases).await.unwrap();
            assert!((1..=4).contains(&out.len()));
            for candidate in &out {
                assert_eq!(candidate.matched_keywords, vec!["fintech"]);
                assert_eq!(candidate.source_url, source);
                assert!(candidate.amount >= 0.0);
            }
        }
    }

    struct FixedSupplier(Vec<CandidateDeal>);

    #[async_trait]
    impl CandidateSupplier for FixedSupplier {
        async fn supply(&self, _request: &SupplyRequest<'_>) -> Result<Vec<CandidateDeal>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn exclude_keywords_filter_supplied_candidates() {
        let supplier = Arc::new(FixedSupplier(vec![
            CandidateDeal {
                deal_name: "Fintech ledger".into(),
                ..Default::default()
            },
            CandidateDeal {
                deal_name: "Fintech gambling app".into(),
                ..Default::default()
            },
        ]));
        let processor = SimulatedProcessor::new(SourceType::Manual, supplier);
        let out = processor
            .process("manual-list", &keywords(&["fintech"], &["gambling"]), &SilentPhases)
            .await
            .unwrap();

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].deal_name, "Fintech ledger");
    }

    struct FailingSupplier;

    #[async_trait]
    impl CandidateSupplier for FailingSupplier {
        async fn supply(&self, _request: &SupplyRequest<'_>) -> Result<Vec<CandidateDeal>> {
            Err(DealScoutError::Network("marketplace offline".into()))
        }
    }

    #[tokio::test]
    async fn supplier_errors_are_attributed() {
        let processor = SimulatedProcessor::new(SourceType::Marketplace, Arc::new(FailingSupplier));
        let err = processor
            .process("market-1", &keywords(&["x"], &[]), &SilentPhases)
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "source market-1 failed: network error: marketplace offline"
        );
    }
}
