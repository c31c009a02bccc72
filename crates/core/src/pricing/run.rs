use crate::clients::channel_manager::ChannelManagerClient;
use crate::clients::competitor_rates::CompetitorRateProvider;
use crate::config::{HotelConfig, RunConfig};
use crate::domain::policy::PricingPolicy;
use crate::domain::recommendation::{RateQuery, RateRecommendation, RunRequest};
use crate::time::calendar::{date_range, nights_inclusive};
use anyhow::Context;
use chrono::NaiveDate;
use rust_decimal::Decimal;

/// Prices every night of `request` against one evaluation date.
///
/// Competitor rates and live rates are fetched once for the whole range; the recommender then
/// runs independently per night.
pub async fn run_pricing(
    rates: &dyn CompetitorRateProvider,
    channel: &dyn ChannelManagerClient,
    hotel: &HotelConfig,
    run_cfg: &RunConfig,
    policy: &PricingPolicy,
    request: &RunRequest,
    evaluation_date: NaiveDate,
) -> anyhow::Result<Vec<RateRecommendation>> {
    let span = nights_inclusive(request.start_date, request.end_date);
    anyhow::ensure!(
        span <= i64::from(run_cfg.horizon_days),
        "range {}..={} is {span} nights; at most {} allowed",
        request.start_date,
        request.end_date,
        run_cfg.horizon_days
    );
    let nights = date_range(request.start_date, request.end_date)?;
    anyhow::ensure!(request.occupancy >= 1, "occupancy must be >= 1");

    let matrix = rates
        .fetch_competitor_rates(
            &hotel.property_id,
            request.start_date,
            request.end_date,
            request.occupancy,
        )
        .await
        .with_context(|| format!("{} competitor rates fetch failed", rates.provider_name()))?;

    let current_rates = channel
        .get_current_rates(
            &hotel.property_id,
            &hotel.rate_plan_id,
            request.start_date,
            request.end_date,
        )
        .await
        .with_context(|| format!("{} current rates fetch failed", channel.provider_name()))?;

    let mut out = Vec::with_capacity(nights.len());
    let mut nights_without_competitors = 0usize;
    for night in nights {
        let competitor_prices: Vec<Decimal> = matrix
            .get(&night)
            .map(|by_name| by_name.values().copied().collect())
            .unwrap_or_default();
        if competitor_prices.is_empty() {
            nights_without_competitors += 1;
        }

        let query = RateQuery {
            target_date: night,
            competitor_prices,
            current_rate: current_rates.get(&night).copied(),
        };
        let rec = query.recommend(evaluation_date, policy);

        tracing::debug!(
            date = %rec.date,
            recommended_rate = %rec.recommended_rate,
            lowest_competitor = ?rec.lowest_competitor,
            current_rate = ?query.current_rate,
            "priced night"
        );
        out.push(rec);
    }

    tracing::info!(
        start_date = %request.start_date,
        end_date = %request.end_date,
        %evaluation_date,
        nights = out.len(),
        nights_without_competitors,
        live_rates = current_rates.len(),
        provider = rates.provider_name(),
        "pricing run computed"
    );

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::channel_manager::MockChannelManager;
    use crate::clients::competitor_rates::{CompetitorRateMatrix, MockCompetitorRateProvider};
    use std::collections::BTreeMap;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn hotel() -> HotelConfig {
        HotelConfig {
            currency: "EUR".into(),
            property_id: "p-1".into(),
            rate_plan_id: "BAR".into(),
            utc_offset_hours: 0,
        }
    }

    fn run_cfg() -> RunConfig {
        RunConfig {
            horizon_days: 30,
            occupancy: 2,
        }
    }

    fn policy() -> PricingPolicy {
        PricingPolicy::new(
            Decimal::from(80),
            Decimal::from(200),
            Decimal::ZERO,
            Decimal::from(-2),
            BTreeMap::new(),
            Decimal::ONE,
        )
        .unwrap()
    }

    fn request(start: NaiveDate, end: NaiveDate) -> RunRequest {
        RunRequest {
            start_date: start,
            end_date: end,
            dry_run: true,
            occupancy: 2,
        }
    }

    /// Only knows about one night.
    struct SparseProvider;

    #[async_trait::async_trait]
    impl CompetitorRateProvider for SparseProvider {
        fn provider_name(&self) -> &'static str {
            "sparse"
        }

        async fn fetch_competitor_rates(
            &self,
            _property_id: &str,
            start_date: NaiveDate,
            _end_date: NaiveDate,
            _occupancy: u32,
        ) -> anyhow::Result<CompetitorRateMatrix> {
            Ok(BTreeMap::from([(
                start_date,
                BTreeMap::from([("Hotel A".to_string(), Decimal::from(150))]),
            )]))
        }
    }

    #[tokio::test]
    async fn prices_every_night_from_mock_matrix() {
        let start = d(2026, 3, 2);
        let end = d(2026, 3, 4);
        let recs = run_pricing(
            &MockCompetitorRateProvider,
            &MockChannelManager::default(),
            &hotel(),
            &run_cfg(),
            &policy(),
            &request(start, end),
            start,
        )
        .await
        .unwrap();

        let rates: Vec<String> = recs.iter().map(|r| r.recommended_rate.to_string()).collect();
        // Lowest competitor is COMP_C (base - 3), minus the 2.00 undercut.
        assert_eq!(rates, vec!["95.00", "100.00", "105.00"]);
        assert_eq!(recs[0].lowest_competitor, Some(Decimal::from(97)));
        assert_eq!(recs[2].date, end);
    }

    #[tokio::test]
    async fn nights_without_data_fall_back_to_live_rate_or_floor() {
        let start = d(2026, 3, 2);
        let end = d(2026, 3, 4);
        let channel = MockChannelManager {
            current_rates: BTreeMap::from([(d(2026, 3, 3), Decimal::from(120))]),
        };
        let recs = run_pricing(
            &SparseProvider,
            &channel,
            &hotel(),
            &run_cfg(),
            &policy(),
            &request(start, end),
            start,
        )
        .await
        .unwrap();

        assert_eq!(recs[0].recommended_rate, Decimal::from(148));
        assert_eq!(recs[1].recommended_rate, Decimal::from(120));
        assert_eq!(recs[1].lowest_competitor, None);
        assert_eq!(recs[2].recommended_rate, Decimal::from(80));
    }

    #[tokio::test]
    async fn rejects_inverted_and_oversized_ranges() {
        let inverted = run_pricing(
            &MockCompetitorRateProvider,
            &MockChannelManager::default(),
            &hotel(),
            &run_cfg(),
            &policy(),
            &request(d(2026, 3, 4), d(2026, 3, 2)),
            d(2026, 3, 1),
        )
        .await;
        assert!(inverted.is_err());

        let too_long = run_pricing(
            &MockCompetitorRateProvider,
            &MockChannelManager::default(),
            &hotel(),
            &run_cfg(),
            &policy(),
            &request(d(2026, 3, 1), d(2026, 4, 30)),
            d(2026, 3, 1),
        )
        .await;
        assert!(too_long.is_err());

        // Rejected from the night count alone, before any dates are materialized.
        let absurd = run_pricing(
            &MockCompetitorRateProvider,
            &MockChannelManager::default(),
            &hotel(),
            &run_cfg(),
            &policy(),
            &request(d(2026, 3, 1), NaiveDate::MAX),
            d(2026, 3, 1),
        )
        .await
        .unwrap_err();
        assert!(absurd.to_string().contains("at most 30 allowed"));
    }
}
