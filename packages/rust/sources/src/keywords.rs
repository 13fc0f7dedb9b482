//! Include/exclude keyword matching shared by every source strategy.
//!
//! Keywords match case-insensitively on word boundaries, so `ai` matches
//! "AI tooling" but not "retail".

use regex::{Regex, RegexBuilder};
use tracing::debug;

use dealscout_shared::{CandidateDeal, DealScoutError, Result, normalize_keywords};

/// A compiled keyword.
#[derive(Debug, Clone)]
struct Keyword {
    text: String,
    pattern: Regex,
}

impl Keyword {
    fn compile(text: String) -> Result<Self> {
        let word_char = |c: char| c.is_alphanumeric() || c == '_';
        let start = if text.starts_with(word_char) { r"\b" } else { "" };
        let end = if text.ends_with(word_char) { r"\b" } else { "" };

        let pattern = RegexBuilder::new(&format!("{start}{}{end}", regex::escape(&text)))
            .case_insensitive(true)
            .build()
            .map_err(|e| DealScoutError::validation(format!("invalid keyword '{text}': {e}")))?;

        Ok(Self { text, pattern })
    }

    fn is_match(&self, haystack: &str) -> bool {
        self.pattern.is_match(haystack)
    }
}

/// Compiled include/exclude keyword sets for one run.
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    include: Vec<Keyword>,
    exclude: Vec<Keyword>,
}

impl KeywordFilter {
    /// Compile keyword sets. Blank entries and case-insensitive duplicates are dropped.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        let include = normalize_keywords(include.iter().cloned())
            .into_iter()
            .map(Keyword::compile)
            .collect::<Result<Vec<_>>>()?;
        let exclude = normalize_keywords(exclude.iter().cloned())
            .into_iter()
            .map(Keyword::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { include, exclude })
    }

    pub fn include_keywords(&self) -> Vec<String> {
        self.include.iter().map(|k| k.text.clone()).collect()
    }

    pub fn exclude_keywords(&self) -> Vec<String> {
        self.exclude.iter().map(|k| k.text.clone()).collect()
    }

    /// First exclude keyword found in `text`, if any.
    pub fn excluded_by(&self, text: &str) -> Option<&str> {
        self.exclude
            .iter()
            .find(|k| k.is_match(text))
            .map(|k| k.text.as_str())
    }

    /// Include keywords found in `text`, in include order.
    pub fn matched_includes(&self, text: &str) -> Vec<String> {
        self.include
            .iter()
            .filter(|k| k.is_match(text))
            .map(|k| k.text.clone())
            .collect()
    }

    /// Normalise, annotate, and filter raw candidates from one source.
    ///
    /// Candidates without a deal name or hitting an exclude keyword are
    /// dropped, as are candidates that match no include keyword. Survivors
    /// keep their relative order.
    pub fn apply(&self, candidates: Vec<CandidateDeal>, source: &str) -> Vec<CandidateDeal> {
        let total = candidates.len();
        let kept: Vec<CandidateDeal> = candidates
            .into_iter()
            .filter_map(|candidate| self.annotate(candidate, source))
            .collect();

        if kept.len() < total {
            debug!(
                source,
                dropped = total - kept.len(),
                kept = kept.len(),
                "keyword filter dropped candidates"
            );
        }
        kept
    }

    fn annotate(&self, mut candidate: CandidateDeal, source: &str) -> Option<CandidateDeal> {
        let name = candidate.deal_name.trim();
        if name.is_empty() {
            return None;
        }
        if name.len() != candidate.deal_name.len() {
            candidate.deal_name = name.to_string();
        }
        if !candidate.amount.is_finite() || candidate.amount < 0.0 {
            candidate.amount = 0.0;
        }
        candidate.confidence_score = candidate.confidence_score.map(|c| c.min(100));
        if candidate.source_url.trim().is_empty() {
            candidate.source_url = source.to_string();
        }

        let text = candidate.searchable_text();
        if let Some(keyword) = self.excluded_by(&text) {
            debug!(deal = %candidate.deal_name, keyword, "excluded by keyword");
            return None;
        }

        // Remote extractors may report matches the text alone does not show;
        // only those naming one of our include keywords are honoured.
        let matched: Vec<String> = self
            .include
            .iter()
            .filter(|k| {
                k.is_match(&text)
                    || candidate
                        .matched_keywords
                        .iter()
                        .any(|reported| reported.trim().eq_ignore_ascii_case(&k.text))
            })
            .map(|k| k.text.clone())
            .collect();

        if matched.is_empty() {
            return None;
        }

        candidate.relevance_score = Some(match candidate.relevance_score {
            Some(score) if score.is_finite() => score.clamp(0.0, 100.0),
            _ => (matched.len() as f64 / self.include.len() as f64 * 100.0).round(),
        });
        candidate.matched_keywords = matched;
        Some(candidate)
    }
}
