use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Adjustment for a night `days_out` days away from the evaluation date.
///
/// Picks the smallest cutoff that `days_out` does not exceed. Past the largest cutoff the last
/// bucket keeps applying; with no buckets the adjustment is zero.
pub fn lead_adjustment(days_out: i64, buckets: &BTreeMap<i64, Decimal>) -> Decimal {
    buckets
        .range(days_out..)
        .next()
        .or_else(|| buckets.iter().next_back())
        .map(|(_, adjustment)| *adjustment)
        .unwrap_or(Decimal::ZERO)
}
