//! Website strategy: remote scrape, then remote AI extraction.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};
use url::Url;

use dealscout_shared::{CandidateDeal, DealScoutError, Result, SourceType};

use crate::keywords::KeywordFilter;
use crate::processor::{PhaseReporter, SourcePhase, SourceProcessor};
use crate::services::{AiExtractionRequest, DealServices, ScrapeRequest};

/// Processes website sources through the remote [`DealServices`].
pub struct WebsiteProcessor {
    services: Arc<dyn DealServices>,
}

impl WebsiteProcessor {
    pub fn new(services: Arc<dyn DealServices>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl SourceProcessor for WebsiteProcessor {
    fn kind(&self) -> SourceType {
        SourceType::Website
    }

    #[instrument(skip_all, fields(source = %source))]
    async fn process(
        &self,
        source: &str,
        keywords: &KeywordFilter,
        phases: &dyn PhaseReporter,
    ) -> Result<Vec<CandidateDeal>> {
        check_website_url(source).map_err(|e| DealScoutError::source(source, e))?;

        let include = keywords.include_keywords();
        let exclude = keywords.exclude_keywords();

        phases.phase(SourcePhase::Scraping, &format!("Scraping {source}"));
        let scraped = self
            .services
            .fetch_metadata(&ScrapeRequest {
                url: source,
                include_keywords: &include,
                exclude_keywords: &exclude,
            })
            .await
            .map_err(|e| DealScoutError::source(source, e))?;

        if !scraped.success {
            info!(
                message = scraped.message.as_deref().unwrap_or("no detail"),
                "scrape unsuccessful, source yields nothing"
            );
            return Ok(Vec::new());
        }

        phases.phase(SourcePhase::Analyzing, &format!("Analyzing {source}"));
        let extracted = self
            .services
            .extract_deals(&AiExtractionRequest {
                metadata: &scraped.metadata,
                source_type: SourceType::Website,
                include_keywords: &include,
            })
            .await
            .map_err(|e| DealScoutError::source(source, e))?;

        if !extracted.success {
            warn!("ai extraction unsuccessful, keeping scraped candidates only");
        }

        phases.phase(SourcePhase::Processing, &format!("Processing {source}"));
        let mut combined = scraped.candidates;
        if extracted.success {
            combined.extend(extracted.candidates);
        }

        Ok(keywords.apply(combined, source))
    }
}

/// Website sources must be absolute http(s) URLs.
fn check_website_url(source: &str) -> Result<()> {
    let url = Url::parse(source)
        .map_err(|e| DealScoutError::validation(format!("'{source}' is not a valid URL: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(DealScoutError::validation(format!(
            "unsupported URL scheme '{other}' for website source"
        ))),
    }
}
