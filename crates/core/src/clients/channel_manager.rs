use anyhow::Result;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One nightly rate to publish, amount already formatted with two decimals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateUpdate {
    pub date: NaiveDate,
    pub amount: String,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReceipt {
    pub status: String,
    pub num_updates: usize,
}

impl RateUpdate {
    pub fn new(date: NaiveDate, amount: Decimal, currency: &str) -> Self {
        Self {
            date,
            amount: format!("{:.2}", amount),
            currency: currency.to_string(),
        }
    }
}

/// Booking engine side: where live rates are read from and recommendations are pushed to.
#[async_trait::async_trait]
pub trait ChannelManagerClient: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Live rate per date; dates without a known rate are absent.
    async fn get_current_rates(
        &self,
        property_id: &str,
        rate_plan_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, Decimal>>;

    async fn push_rates(
        &self,
        property_id: &str,
        rate_plan_id: &str,
        updates: &[RateUpdate],
    ) -> Result<PushReceipt>;
}

/// Knows no live rates and accepts every push without sending anything.
#[derive(Debug, Clone, Default)]
pub struct MockChannelManager {
    pub current_rates: BTreeMap<NaiveDate, Decimal>,
}

#[async_trait::async_trait]
impl ChannelManagerClient for MockChannelManager {
    fn provider_name(&self) -> &'static str {
        "mock"
    }

    async fn get_current_rates(
        &self,
        _property_id: &str,
        _rate_plan_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<BTreeMap<NaiveDate, Decimal>> {
        Ok(self
            .current_rates
            .range(start_date..=end_date)
            .map(|(d, r)| (*d, *r))
            .collect())
    }

    async fn push_rates(
        &self,
        property_id: &str,
        rate_plan_id: &str,
        updates: &[RateUpdate],
    ) -> Result<PushReceipt> {
        tracing::info!(
            property_id,
            rate_plan_id,
            num_updates = updates.len(),
            "mock rate push"
        );
        Ok(PushReceipt {
            status: "mocked".to_string(),
            num_updates: updates.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_amount_has_two_decimals() {
        let d = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        let u = RateUpdate::new(d, Decimal::from(93), "EUR");
        assert_eq!(u.amount, "93.00");
        let u = RateUpdate::new(d, Decimal::new(8925, 2), "EUR");
        assert_eq!(u.amount, "89.25");
    }

    #[tokio::test]
    async fn mock_push_counts_updates() {
        let d = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        let updates = vec![
            RateUpdate::new(d, Decimal::from(100), "EUR"),
            RateUpdate::new(d.succ_opt().unwrap(), Decimal::from(110), "EUR"),
        ];
        let receipt = MockChannelManager::default()
            .push_rates("p", "BAR", &updates)
            .await
            .unwrap();
        assert_eq!(receipt.status, "mocked");
        assert_eq!(receipt.num_updates, 2);
    }

    #[tokio::test]
    async fn mock_current_rates_are_range_filtered() {
        let d1 = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2026, 5, 9).unwrap();
        let cm = MockChannelManager {
            current_rates: BTreeMap::from([(d1, Decimal::from(120)), (d2, Decimal::from(130))]),
        };
        let rates = cm.get_current_rates("p", "BAR", d1, d1).await.unwrap();
        assert_eq!(rates.len(), 1);
        assert!(MockChannelManager::default()
            .get_current_rates("p", "BAR", d1, d2)
            .await
            .unwrap()
            .is_empty());
    }
}
