//! Tier policy: per-source result caps and source batching.

use serde::Serialize;
use tracing::debug;

use dealscout_shared::{
    CandidateDeal, DealScoutError, Result, SubscriptionTier, TierLimits, TiersConfig,
};

/// Resolved limits for the tier a run executes under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierPolicy {
    pub tier: SubscriptionTier,
    pub max_per_source: usize,
    pub allows_batching: bool,
}

impl TierPolicy {
    pub fn new(tier: SubscriptionTier, limits: TierLimits) -> Self {
        Self {
            tier,
            max_per_source: limits.max_per_source,
            allows_batching: limits.allows_batching,
        }
    }

    /// Look up `tier` in the configured tier table.
    pub fn for_tier(tier: SubscriptionTier, tiers: &TiersConfig) -> Self {
        Self::new(tier, tiers.limits(tier))
    }
}

/// Caller's request to process only a leading batch of sources.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchConfig {
    pub enabled: bool,
    pub batch_size: usize,
}

impl BatchConfig {
    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn of(batch_size: usize) -> Self {
        Self {
            enabled: true,
            batch_size,
        }
    }
}

/// Maximum number of candidates kept per source for `tier`.
pub fn max_per_source(tier: SubscriptionTier, tiers: &TiersConfig) -> usize {
    tiers.limits(tier).max_per_source
}

/// Keep the first `policy.max_per_source` candidates, in original order.
pub fn limit(mut candidates: Vec<CandidateDeal>, policy: &TierPolicy) -> Vec<CandidateDeal> {
    candidates.truncate(policy.max_per_source);
    candidates
}

/// The sources a run will process.
///
/// The full list is used unless the tier allows batching *and* the caller
/// enabled it, in which case the first `batch_size` sources are used.
pub fn select_sources<'a>(
    sources: &'a [String],
    policy: &TierPolicy,
    batch: &BatchConfig,
) -> Result<&'a [String]> {
    if !batch.enabled {
        return Ok(sources);
    }
    if !policy.allows_batching {
        debug!(tier = %policy.tier, "tier does not allow batching, using all sources");
        return Ok(sources);
    }
    if batch.batch_size == 0 {
        return Err(DealScoutError::validation(
            "batch size must be at least 1 when batching is enabled",
        ));
    }
    Ok(&sources[..batch.batch_size.min(sources.len())])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(n: usize) -> Vec<CandidateDeal> {
        (0..n)
            .map(|i| CandidateDeal {
                deal_name: format!("deal {i}"),
                ..Default::default()
            })
            .collect()
    }

    fn sources(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://s{i}.example")).collect()
    }

    #[test]
    fn default_tier_table() {
        let tiers = TiersConfig::default();
        assert_eq!(max_per_source(SubscriptionTier::Free, &tiers), 3);
        assert_eq!(max_per_source(SubscriptionTier::Pro, &tiers), 10);
        assert_eq!(max_per_source(SubscriptionTier::Unlimited, &tiers), 25);
        assert!(
            max_per_source(SubscriptionTier::Unlimited, &tiers)
                > max_per_source(SubscriptionTier::Free, &tiers)
        );
    }

    #[test]
    fn limit_is_an_order_preserving_prefix() {
        let tiers = TiersConfig::default();
        for tier in [
            SubscriptionTier::Free,
            SubscriptionTier::Pro,
            SubscriptionTier::Unlimited,
        ] {
            let policy = TierPolicy::for_tier(tier, &tiers);
            for n in [0, 1, 3, 5, 10, 30] {
                let input = candidates(n);
                let out = limit(input.clone(), &policy);
                assert!(out.len() <= policy.max_per_source);
                assert_eq!(out.len(), n.min(policy.max_per_source));
                assert_eq!(out[..], input[..out.len()]);
            }
        }
    }

    #[test]
    fn batching_takes_leading_sources() {
        let policy = TierPolicy::for_tier(SubscriptionTier::Pro, &TiersConfig::default());
        let all = sources(5);
        let picked = select_sources(&all, &policy, &BatchConfig::of(2)).unwrap();
        assert_eq!(picked, &all[..2]);
    }

    #[test]
    fn batching_ignored_when_tier_disallows() {
        let policy = TierPolicy::for_tier(SubscriptionTier::Free, &TiersConfig::default());
        let all = sources(5);
        let picked = select_sources(&all, &policy, &BatchConfig::of(2)).unwrap();
        assert_eq!(picked.len(), 5);
    }

    #[test]
    fn batching_disabled_uses_everything() {
        let policy = TierPolicy::for_tier(SubscriptionTier::Unlimited, &TiersConfig::default());
        let all = sources(4);
        let picked = select_sources(&all, &policy, &BatchConfig::disabled()).unwrap();
        assert_eq!(picked.len(), 4);
    }

    #[test]
    fn oversized_batch_uses_full_list() {
        let policy = TierPolicy::for_tier(SubscriptionTier::Pro, &TiersConfig::default());
        let all = sources(3);
        let picked = select_sources(&all, &policy, &BatchConfig::of(10)).unwrap();
        assert_eq!(picked.len(), 3);
    }

    #[test]
    fn zero_batch_is_rejected() {
        let policy = TierPolicy::for_tier(SubscriptionTier::Pro, &TiersConfig::default());
        let err = select_sources(&sources(3), &policy, &BatchConfig::of(0)).unwrap_err();
        assert!(err.is_validation());
    }
}
