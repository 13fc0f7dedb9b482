//! Remote collaborators used by the website strategy.
//!
//! Two operations are consumed: fetch-and-extract-metadata (scrape) and
//! AI deal extraction. [`HttpDealServices`] posts JSON to both.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use dealscout_shared::{CandidateDeal, DealScoutError, Result, ServicesConfig, SourceType};

/// User-Agent string for service requests.
const USER_AGENT: &str = concat!("DealScout/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Input of the fetch-and-extract-metadata operation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest<'a> {
    pub url: &'a str,
    pub include_keywords: &'a [String],
    pub exclude_keywords: &'a [String],
}

/// Output of the fetch-and-extract-metadata operation.
///
/// `success == false` is a soft negative: the page could not be used, but
/// nothing went wrong.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResponse {
    pub success: bool,
    #[serde(default)]
    pub metadata: serde_json::Value,
    #[serde(default, alias = "deals", deserialize_with = "candidate_list")]
    pub candidates: Vec<CandidateDeal>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Input of the AI deal extraction operation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiExtractionRequest<'a> {
    pub metadata: &'a serde_json::Value,
    pub source_type: SourceType,
    pub include_keywords: &'a [String],
}

/// Output of the AI deal extraction operation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiExtractionResponse {
    pub success: bool,
    #[serde(default, alias = "deals", deserialize_with = "candidate_list")]
    pub candidates: Vec<CandidateDeal>,
}

/// Read a candidate array, skipping entries that are not deal objects
/// instead of failing the whole response.
fn candidate_list<'de, D>(deserializer: D) -> std::result::Result<Vec<CandidateDeal>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<Vec<serde_json::Value>>::deserialize(deserializer)?.unwrap_or_default();
    let total = raw.len();
    let candidates: Vec<CandidateDeal> = raw
        .into_iter()
        .filter_map(|value| match serde_json::from_value(value) {
            Ok(candidate) => Some(candidate),
            Err(e) => {
                warn!(error = %e, "skipping unreadable candidate");
                None
            }
        })
        .collect();
    if candidates.len() < total {
        debug!(skipped = total - candidates.len(), "candidate list had unreadable entries");
    }
    Ok(candidates)
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// The remote operations the website strategy depends on.
#[async_trait]
pub trait DealServices: Send + Sync {
    async fn fetch_metadata(&self, request: &ScrapeRequest<'_>) -> Result<ScrapeResponse>;

    async fn extract_deals(&self, request: &AiExtractionRequest<'_>)
    -> Result<AiExtractionResponse>;
}

// ---------------------------------------------------------------------------
// HTTP implementation
// ---------------------------------------------------------------------------

/// JSON-over-HTTP client for the remote deal services.
pub struct HttpDealServices {
    client: Client,
    scrape_url: Url,
    extract_url: Url,
    api_key: Option<String>,
}

impl HttpDealServices {
    /// Build a client from the `[services]` config section.
    pub fn new(config: &ServicesConfig) -> Result<Self> {
        Self::with_endpoints(
            endpoint(&config.base_url, &config.scrape_path)?,
            endpoint(&config.base_url, &config.extract_path)?,
            config.request_timeout(),
            config.api_key(),
        )
    }

    /// Build a client with explicit endpoint URLs.
    pub fn with_endpoints(
        scrape_url: Url,
        extract_url: Url,
        timeout: Duration,
        api_key: Option<String>,
    ) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| DealScoutError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            scrape_url,
            extract_url,
            api_key,
        })
    }

    async fn post_json<Req, Resp>(&self, url: &Url, body: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let mut request = self.client.post(url.as_str()).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DealScoutError::Network(format!("{url}: request timed out"))
            } else {
                DealScoutError::Network(format!("{url}: {e}"))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DealScoutError::Network(format!(
                "{url}: HTTP {status} {}",
                detail.trim()
            )));
        }

        response
            .json::<Resp>()
            .await
            .map_err(|e| DealScoutError::Extraction(format!("{url}: malformed response: {e}")))
    }
}

#[async_trait]
impl DealServices for HttpDealServices {
    #[instrument(skip_all, fields(url = request.url))]
    async fn fetch_metadata(&self, request: &ScrapeRequest<'_>) -> Result<ScrapeResponse> {
        let response: ScrapeResponse = self.post_json(&self.scrape_url, request).await?;
        debug!(
            success = response.success,
            candidates = response.candidates.len(),
            "scrape response"
        );
        Ok(response)
    }

    #[instrument(skip_all, fields(source_type = %request.source_type))]
    async fn extract_deals(
        &self,
        request: &AiExtractionRequest<'_>,
    ) -> Result<AiExtractionResponse> {
        let response: AiExtractionResponse = self.post_json(&self.extract_url, request).await?;
        debug!(
            success = response.success,
            candidates = response.candidates.len(),
            "ai extraction response"
        );
        Ok(response)
    }
}

/// Join a function path onto a base URL, keeping every base segment.
fn endpoint(base: &str, path: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    Url::parse(&joined)
        .map_err(|e| DealScoutError::config(format!("invalid service endpoint '{joined}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn services_for(server: &MockServer, api_key: Option<&str>) -> HttpDealServices {
        let base = server.uri();
        HttpDealServices::with_endpoints(
            endpoint(&base, "scrape-website").unwrap(),
            endpoint(&base, "ai-deal-extraction").unwrap(),
            Duration::from_secs(5),
            api_key.map(String::from),
        )
        .unwrap()
    }

    #[test]
    fn endpoint_keeps_base_path() {
        let url = endpoint("http://localhost:54321/functions/v1/", "/scrape-website").unwrap();
        assert_eq!(url.as_str(), "http://localhost:54321/functions/v1/scrape-website");
    }

    #[tokio::test]
    async fn fetch_metadata_posts_camel_case_and_auth() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/scrape-website"))
            .and(header("authorization", "Bearer secret"))
            .and(body_partial_json(serde_json::json!({
                "url": "https://target.example",
                "includeKeywords": ["saas"],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "metadata": {"title": "Target"},
                "deals": [{"dealName": "SaaS rollout", "companyName": "Target"}],
            })))
            .mount(&server)
            .await;

        let services = services_for(&server, Some("secret"));
        let include = vec!["saas".to_string()];
        let response = services
            .fetch_metadata(&ScrapeRequest {
                url: "https://target.example",
                include_keywords: &include,
                exclude_keywords: &[],
            })
            .await
            .expect("fetch");

        assert!(response.success);
        assert_eq!(response.candidates.len(), 1);
        assert_eq!(response.metadata["title"], "Target");
    }

    #[tokio::test]
    async fn loosely_typed_candidates_are_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/scrape-website"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "candidates": [
                    {"dealName": "SaaS rollout", "amount": null, "confidenceScore": 72.5},
                    {"dealName": "SaaS expansion", "amount": 5000, "confidenceScore": 300,
                     "companyUrl": null, "matchedKeywords": null},
                    "not a deal",
                ],
            })))
            .mount(&server)
            .await;

        let services = services_for(&server, None);
        let include = vec!["saas".to_string()];
        let response = services
            .fetch_metadata(&ScrapeRequest {
                url: "https://target.example",
                include_keywords: &include,
                exclude_keywords: &[],
            })
            .await
            .expect("fetch");

        assert_eq!(response.candidates.len(), 2);
        assert_eq!(response.candidates[0].amount, 0.0);
        assert_eq!(response.candidates[0].confidence_score, Some(73));
        assert_eq!(response.candidates[1].confidence_score, Some(100));
        assert!(response.candidates[1].matched_keywords.is_empty());
    }

    #[tokio::test]
    async fn ai_candidates_with_null_fields_are_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ai-deal-extraction"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "deals": [{"dealName": "Fleet deal", "notes": null, "relevanceScore": null}],
            })))
            .mount(&server)
            .await;

        let services = services_for(&server, None);
        let metadata = serde_json::json!({});
        let response = services
            .extract_deals(&AiExtractionRequest {
                metadata: &metadata,
                source_type: SourceType::Website,
                include_keywords: &[],
            })
            .await
            .expect("extract");

        assert_eq!(response.candidates.len(), 1);
        assert!(response.candidates[0].notes.is_empty());
        assert_eq!(response.candidates[0].relevance_score, None);
    }

    #[tokio::test]
    async fn http_error_becomes_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/ai-deal-extraction"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let services = services_for(&server, None);
        let metadata = serde_json::json!({});
        let err = services
            .extract_deals(&AiExtractionRequest {
                metadata: &metadata,
                source_type: SourceType::Website,
                include_keywords: &[],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DealScoutError::Network(_)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn malformed_body_becomes_extraction_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/scrape-website"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&server)
            .await;

        let services = services_for(&server, None);
        let err = services
            .fetch_metadata(&ScrapeRequest {
                url: "https://target.example",
                include_keywords: &[],
                exclude_keywords: &[],
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DealScoutError::Extraction(_)));
    }
}
