use crate::domain::policy::PricingPolicy;
use crate::domain::recommendation::{RateQuery, RateRecommendation};
use crate::pricing::lead_time::lead_adjustment;
use chrono::{Datelike, NaiveDate, Weekday};
use rust_decimal::{Decimal, RoundingStrategy};

/// Fractional digits of every recommended rate.
pub const RATE_SCALE: u32 = 2;

/// Recommends the rate for one night.
///
/// Pure: `evaluation_date` is the caller's "today" and is the only notion of time used here.
/// Rounding is half away from zero, so 10.005 becomes 10.01 and -10.005 becomes -10.01.
pub fn recommend_rate(
    target_date: NaiveDate,
    evaluation_date: NaiveDate,
    competitor_prices: &[Decimal],
    current_rate: Option<Decimal>,
    policy: &PricingPolicy,
) -> Decimal {
    let mut base = match competitor_prices.iter().min() {
        Some(lowest) => *lowest + policy.undercut(),
        None => current_rate.unwrap_or(policy.min_rate()),
    };

    if is_weekend_night(target_date) {
        base += policy.weekend_uplift();
    }

    let days_out = (target_date - evaluation_date).num_days();
    base += lead_adjustment(days_out, policy.lead_buckets());

    let mut bounded = clamp(base, policy.min_rate(), policy.max_rate());

    // May land outside [min_rate, max_rate] when the live rate itself is out of bounds.
    if let Some(current) = current_rate {
        let cap = (current * policy.max_change_pct()).abs();
        let (lo, hi) = change_band(current, cap);
        bounded = clamp(bounded, lo, hi);
    }

    round_rate(bounded)
}

/// Friday and Saturday nights carry the weekend uplift.
pub fn is_weekend_night(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Fri | Weekday::Sat)
}

pub fn round_rate(value: Decimal) -> Decimal {
    let mut rounded =
        value.round_dp_with_strategy(RATE_SCALE, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(RATE_SCALE);
    rounded
}

/// `[current - cap, current + cap]` shrunk to whole cents, so the final rounding stays inside.
fn change_band(current: Decimal, cap: Decimal) -> (Decimal, Decimal) {
    let lo = (current - cap)
        .round_dp_with_strategy(RATE_SCALE, RoundingStrategy::ToPositiveInfinity);
    let hi = (current + cap)
        .round_dp_with_strategy(RATE_SCALE, RoundingStrategy::ToNegativeInfinity);
    (lo, hi)
}

fn clamp(value: Decimal, lo: Decimal, hi: Decimal) -> Decimal {
    lo.max(value.min(hi))
}

impl RateQuery {
    pub fn lowest_competitor(&self) -> Option<Decimal> {
        self.competitor_prices.iter().min().copied()
    }

    pub fn recommend(
        &self,
        evaluation_date: NaiveDate,
        policy: &PricingPolicy,
    ) -> RateRecommendation {
        RateRecommendation {
            date: self.target_date,
            recommended_rate: recommend_rate(
                self.target_date,
                evaluation_date,
                &self.competitor_prices,
                self.current_rate,
                policy,
            ),
            lowest_competitor: self.lowest_competitor(),
        }
    }
}
