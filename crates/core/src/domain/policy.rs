use anyhow::ensure;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bounds must be whole cents, or rounding the recommendation could step past them.
const MAX_BOUND_SCALE: u32 = 2;

/// Pricing policy exactly as it appears in `settings.yaml` (or a JSON body).
///
/// Nothing here is trusted yet: call [`PricingPolicyFile::validate_and_into_policy`] before the
/// values reach the recommender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingPolicyFile {
    pub min_rate: Decimal,
    pub max_rate: Decimal,
    pub weekend_uplift: Decimal,
    pub undercut: Decimal,
    #[serde(default)]
    pub lead_buckets: BTreeMap<i64, Decimal>,
    pub max_change_pct: Decimal,
}

/// Validated, read-only pricing policy.
///
/// `lead_buckets` maps a days-out cutoff to an adjustment; the map is kept sorted by cutoff so the
/// lookup never depends on how the buckets were written down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricingPolicy {
    min_rate: Decimal,
    max_rate: Decimal,
    weekend_uplift: Decimal,
    undercut: Decimal,
    lead_buckets: BTreeMap<i64, Decimal>,
    max_change_pct: Decimal,
}

impl PricingPolicyFile {
    pub fn validate_and_into_policy(self) -> anyhow::Result<PricingPolicy> {
        ensure!(
            self.min_rate >= Decimal::ZERO,
            "pricing.min_rate must be >= 0 (got {})",
            self.min_rate
        );
        ensure!(
            self.max_rate >= Decimal::ZERO,
            "pricing.max_rate must be >= 0 (got {})",
            self.max_rate
        );
        ensure!(
            self.min_rate.normalize().scale() <= MAX_BOUND_SCALE,
            "pricing.min_rate must have at most {MAX_BOUND_SCALE} decimal places (got {})",
            self.min_rate
        );
        ensure!(
            self.max_rate.normalize().scale() <= MAX_BOUND_SCALE,
            "pricing.max_rate must have at most {MAX_BOUND_SCALE} decimal places (got {})",
            self.max_rate
        );
        ensure!(
            self.min_rate <= self.max_rate,
            "pricing.min_rate must be <= pricing.max_rate (got {} > {})",
            self.min_rate,
            self.max_rate
        );

        Ok(PricingPolicy {
            min_rate: self.min_rate,
            max_rate: self.max_rate,
            weekend_uplift: self.weekend_uplift,
            undercut: self.undercut,
            lead_buckets: self.lead_buckets,
            max_change_pct: self.max_change_pct,
        })
    }
}

impl PricingPolicy {
    pub fn new(
        min_rate: Decimal,
        max_rate: Decimal,
        weekend_uplift: Decimal,
        undercut: Decimal,
        lead_buckets: BTreeMap<i64, Decimal>,
        max_change_pct: Decimal,
    ) -> anyhow::Result<Self> {
        PricingPolicyFile {
            min_rate,
            max_rate,
            weekend_uplift,
            undercut,
            lead_buckets,
            max_change_pct,
        }
        .validate_and_into_policy()
    }

    pub fn min_rate(&self) -> Decimal {
        self.min_rate
    }

    pub fn max_rate(&self) -> Decimal {
        self.max_rate
    }

    pub fn weekend_uplift(&self) -> Decimal {
        self.weekend_uplift
    }

    /// Signed margin added to the lowest competitor price.
    pub fn undercut(&self) -> Decimal {
        self.undercut
    }

    pub fn lead_buckets(&self) -> &BTreeMap<i64, Decimal> {
        &self.lead_buckets
    }

    /// Largest allowed relative move away from a known live rate, in either direction.
    pub fn max_change_pct(&self) -> Decimal {
        self.max_change_pct
    }

    pub fn to_file(&self) -> PricingPolicyFile {
        PricingPolicyFile {
            min_rate: self.min_rate,
            max_rate: self.max_rate,
            weekend_uplift: self.weekend_uplift,
            undercut: self.undercut,
            lead_buckets: self.lead_buckets.clone(),
            max_change_pct: self.max_change_pct,
        }
    }
}
