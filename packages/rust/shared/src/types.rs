//! Core domain types for DealScout source configurations and candidate deals.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::DealScoutError;

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for extraction run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// SourceType
// ---------------------------------------------------------------------------

/// Kind of origin a source configuration searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Website,
    Marketplace,
    Api,
    Manual,
}

impl SourceType {
    /// All source kinds, in declaration order.
    pub const ALL: [SourceType; 4] = [
        SourceType::Website,
        SourceType::Marketplace,
        SourceType::Api,
        SourceType::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Website => "website",
            Self::Marketplace => "marketplace",
            Self::Api => "api",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = DealScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "website" => Ok(Self::Website),
            "marketplace" => Ok(Self::Marketplace),
            "api" => Ok(Self::Api),
            "manual" => Ok(Self::Manual),
            other => Err(DealScoutError::validation(format!(
                "unknown source type '{other}': expected website, marketplace, api, or manual"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// SubscriptionTier
// ---------------------------------------------------------------------------

/// Subscription level that gates per-source caps and batching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Pro,
    Unlimited,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Unlimited => "unlimited",
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionTier {
    type Err = DealScoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "unlimited" => Ok(Self::Unlimited),
            other => Err(DealScoutError::validation(format!(
                "unknown subscription tier '{other}': expected free, pro, or unlimited"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// SourceConfiguration
// ---------------------------------------------------------------------------

/// A persisted search recipe. The orchestrator reads a snapshot; it is never
/// mutated during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfiguration {
    pub source_type: SourceType,
    /// Processed in order. Duplicates are allowed and processed independently.
    pub source_urls: Vec<String>,
    pub include_keywords: Vec<String>,
    #[serde(default)]
    pub exclude_keywords: Vec<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl SourceConfiguration {
    /// Build a configuration, normalising keyword lists (trimmed, blank
    /// entries dropped, case-insensitive duplicates removed).
    pub fn new(
        source_type: SourceType,
        source_urls: Vec<String>,
        include_keywords: Vec<String>,
        exclude_keywords: Vec<String>,
    ) -> Self {
        Self {
            source_type,
            source_urls: source_urls
                .into_iter()
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect(),
            include_keywords: normalize_keywords(include_keywords),
            exclude_keywords: normalize_keywords(exclude_keywords),
            is_active: true,
        }
    }
}

/// Trim, drop blanks, and de-duplicate keywords case-insensitively while
/// keeping first-seen order.
pub fn normalize_keywords(keywords: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    keywords
        .into_iter()
        .map(|k| k.trim().to_string())
        .filter(|k| !k.is_empty())
        .filter(|k| seen.insert(k.to_lowercase()))
        .collect()
}

// ---------------------------------------------------------------------------
// CandidateDeal
// ---------------------------------------------------------------------------

/// An extracted deal awaiting human promotion to a committed deal.
///
/// Field names are camelCase on the wire to match the remote extraction
/// services.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDeal {
    /// Blank when the extractor omitted it; such candidates are filtered out.
    #[serde(default, deserialize_with = "lenient::string")]
    pub deal_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub company_name: String,
    /// Non-negative deal value.
    #[serde(default, deserialize_with = "lenient::amount")]
    pub amount: f64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub company_url: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub contact_email: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub notes: String,
    /// 0–100.
    #[serde(
        default,
        deserialize_with = "lenient::confidence",
        skip_serializing_if = "Option::is_none"
    )]
    pub confidence_score: Option<u8>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub source_url: String,
    #[serde(default, deserialize_with = "lenient::keywords")]
    pub matched_keywords: Vec<String>,
    #[serde(
        default,
        deserialize_with = "lenient::score",
        skip_serializing_if = "Option::is_none"
    )]
    pub relevance_score: Option<f64>,
}

/// Deserializers for loosely typed extractor output: nulls become defaults,
/// numbers may arrive as strings, and scores are rounded and clamped.
mod lenient {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Number(f64),
        Text(String),
        Flag(bool),
    }

    impl Loose {
        fn as_f64(&self) -> Option<f64> {
            let value = match self {
                Self::Number(n) => *n,
                Self::Text(s) => s
                    .trim()
                    .trim_start_matches('$')
                    .replace(',', "")
                    .parse()
                    .ok()?,
                Self::Flag(_) => return None,
            };
            value.is_finite().then_some(value)
        }
    }

    pub(super) fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Option::<Loose>::deserialize(d)? {
            Some(Loose::Text(s)) => s,
            Some(Loose::Number(n)) => n.to_string(),
            Some(Loose::Flag(_)) | None => String::new(),
        })
    }

    pub(super) fn amount<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(Option::<Loose>::deserialize(d)?
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0))
    }

    pub(super) fn score<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        Ok(Option::<Loose>::deserialize(d)?.and_then(|v| v.as_f64()))
    }

    pub(super) fn confidence<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u8>, D::Error> {
        Ok(score(d)?.map(|c| c.round().clamp(0.0, 100.0) as u8))
    }

    pub(super) fn keywords<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(Option::<Vec<Option<Loose>>>::deserialize(d)?
            .unwrap_or_default()
            .into_iter()
            .filter_map(|k| match k {
                Some(Loose::Text(s)) => Some(s),
                _ => None,
            })
            .collect())
    }
}

impl CandidateDeal {
    /// Text that keyword matching runs against.
    pub fn searchable_text(&self) -> String {
        [
            self.deal_name.as_str(),
            self.company_name.as_str(),
            self.notes.as_str(),
            self.company_url.as_str(),
        ]
        .join("\n")
    }

    /// Stable SHA-256 fingerprint over the identifying fields.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.deal_name.trim().to_lowercase().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.company_name.trim().to_lowercase().as_bytes());
        hasher.update([0u8]);
        hasher.update(self.source_url.trim().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let parsed: RunId = id.to_string().parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn source_type_parsing() {
        assert_eq!("Website".parse::<SourceType>().unwrap(), SourceType::Website);
        assert_eq!(" api ".parse::<SourceType>().unwrap(), SourceType::Api);
        assert!("ftp".parse::<SourceType>().is_err());

        let json = serde_json::to_string(&SourceType::Marketplace).unwrap();
        assert_eq!(json, "\"marketplace\"");
    }

    #[test]
    fn tier_parsing() {
        assert_eq!("PRO".parse::<SubscriptionTier>().unwrap(), SubscriptionTier::Pro);
        assert_eq!(SubscriptionTier::default(), SubscriptionTier::Free);
        assert!("gold".parse::<SubscriptionTier>().is_err());
    }

    #[test]
    fn configuration_normalizes_keywords() {
        let config = SourceConfiguration::new(
            SourceType::Website,
            vec![" https://a.example ".into(), "".into(), "https://a.example".into()],
            vec!["SaaS".into(), " saas ".into(), "".into(), "fintech".into()],
            vec!["crypto".into()],
        );
        // URL duplicates are kept on purpose; only blanks are dropped.
        assert_eq!(config.source_urls.len(), 2);
        assert_eq!(config.include_keywords, vec!["SaaS", "fintech"]);
        assert!(config.is_active);
    }

    #[test]
    fn candidate_deserializes_from_camel_case() {
        let json = r#"{
            "dealName": "Acme expansion",
            "companyName": "Acme",
            "amount": 25000,
            "confidenceScore": 80,
            "matchedKeywords": ["saas"]
        }"#;
        let deal: CandidateDeal = serde_json::from_str(json).expect("deserialize");
        assert_eq!(deal.deal_name, "Acme expansion");
        assert_eq!(deal.amount, 25000.0);
        assert_eq!(deal.confidence_score, Some(80));
        assert!(deal.contact_email.is_empty());
    }

    #[test]
    fn candidate_tolerates_loosely_typed_fields() {
        let json = r#"{
            "dealName": "Beta raise",
            "companyName": null,
            "amount": null,
            "confidenceScore": 72.5,
            "relevanceScore": "40",
            "matchedKeywords": ["saas", null, 3]
        }"#;
        let deal: CandidateDeal = serde_json::from_str(json).expect("deserialize");
        assert_eq!(deal.amount, 0.0);
        assert!(deal.company_name.is_empty());
        assert_eq!(deal.confidence_score, Some(73));
        assert_eq!(deal.relevance_score, Some(40.0));
        assert_eq!(deal.matched_keywords, vec!["saas"]);
    }

    #[test]
    fn candidate_confidence_is_clamped_and_amount_parsed() {
        let high: CandidateDeal =
            serde_json::from_str(r#"{"dealName": "x", "confidenceScore": 300, "amount": "$1,200"}"#)
                .expect("deserialize");
        assert_eq!(high.confidence_score, Some(100));
        assert_eq!(high.amount, 1200.0);

        let low: CandidateDeal =
            serde_json::from_str(r#"{"dealName": "x", "confidenceScore": -5}"#).expect("deserialize");
        assert_eq!(low.confidence_score, Some(0));

        let nameless: CandidateDeal =
            serde_json::from_str(r#"{"companyName": "Acme"}"#).expect("deserialize");
        assert!(nameless.deal_name.is_empty());
    }

    #[test]
    fn fingerprint_ignores_case_and_padding() {
        let a = CandidateDeal {
            deal_name: "Acme Expansion".into(),
            company_name: "Acme".into(),
            source_url: "https://a.example".into(),
            ..Default::default()
        };
        let b = CandidateDeal {
            deal_name: " acme expansion ".into(),
            company_name: "ACME".into(),
            source_url: "https://a.example".into(),
            amount: 10.0,
            ..Default::default()
        };
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }
}
