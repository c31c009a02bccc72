use crate::config::Settings;
use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, NaiveDate};
use reqwest::header::{HeaderMap, HeaderValue};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PATH: &str = "/v1/competitor_rates";
const DEFAULT_RETRIES: u32 = 3;
const MAX_RETRIES: u32 = 10;

/// Competitor name -> nightly price, per date. Dates without data are simply absent.
pub type CompetitorRateMatrix = BTreeMap<NaiveDate, BTreeMap<String, Decimal>>;

#[async_trait::async_trait]
pub trait CompetitorRateProvider: Send + Sync {
    fn provider_name(&self) -> &'static str;

    async fn fetch_competitor_rates(
        &self,
        property_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        occupancy: u32,
    ) -> Result<CompetitorRateMatrix>;
}

/// HTTP provider when `LIGHTHOUSE_BASE_URL` is configured, the deterministic mock otherwise.
pub fn from_settings(settings: &Settings) -> Result<Arc<dyn CompetitorRateProvider>> {
    if settings.lighthouse_base_url.is_some() {
        return Ok(Arc::new(HttpCompetitorRateProvider::from_settings(settings)?));
    }
    tracing::warn!("LIGHTHOUSE_BASE_URL not set; using mock competitor rates");
    Ok(Arc::new(MockCompetitorRateProvider))
}

/// Three fake competitors whose prices cycle weekly around 100.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockCompetitorRateProvider;

#[async_trait::async_trait]
impl CompetitorRateProvider for MockCompetitorRateProvider {
    fn provider_name(&self) -> &'static str {
        "mock"
    }

    async fn fetch_competitor_rates(
        &self,
        _property_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        _occupancy: u32,
    ) -> Result<CompetitorRateMatrix> {
        let mut out = CompetitorRateMatrix::new();
        let mut d = start_date;
        let mut i: i64 = 0;
        while d <= end_date {
            let base = Decimal::from(100 + (i % 7) * 5);
            out.insert(
                d,
                BTreeMap::from([
                    ("COMP_A".to_string(), base),
                    ("COMP_B".to_string(), base + Decimal::from(7)),
                    ("COMP_C".to_string(), base - Decimal::from(3)),
                ]),
            );
            d += ChronoDuration::days(1);
            i += 1;
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitorRatesResponse {
    pub items: Vec<CompetitorRateItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitorRateItem {
    pub date: NaiveDate,
    pub competitor: String,
    pub rate: Decimal,
}

#[derive(Debug, Clone)]
pub struct HttpCompetitorRateProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    path: String,
    retries: u32,
}

impl HttpCompetitorRateProvider {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let base_url = settings.require_lighthouse_base_url()?.to_string();
        let api_key = settings.lighthouse_api_key.clone();

        let timeout_secs = std::env::var("LIGHTHOUSE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let retries = parse_retries(std::env::var("LIGHTHOUSE_RETRIES").ok().as_deref());

        let path = std::env::var("LIGHTHOUSE_RATES_PATH")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PATH.to_string());

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build competitor rates http client")?;

        Ok(Self {
            http,
            base_url,
            api_key,
            path,
            retries,
        })
    }

    fn url(&self) -> String {
        let path = if self.path.starts_with('/') {
            self.path.clone()
        } else {
            format!("/{}", self.path)
        };

        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(api_key) = &self.api_key {
            headers.insert("x-api-key", HeaderValue::from_str(api_key)?);
        }
        Ok(headers)
    }

    async fn fetch_once(
        &self,
        property_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        occupancy: u32,
    ) -> Result<CompetitorRatesResponse> {
        let res = self
            .http
            .get(self.url())
            .headers(self.headers()?)
            .query(&[
                ("property_id", property_id.to_string()),
                ("start_date", start_date.to_string()),
                ("end_date", end_date.to_string()),
                ("occupancy", occupancy.to_string()),
            ])
            .send()
            .await
            .context("competitor rates request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read competitor rates response")?;
        let raw_json = serde_json::from_str::<Value>(&text)
            .with_context(|| format!("competitor rates response is not valid JSON: {text}"))?;

        if !status.is_success() {
            anyhow::bail!("competitor rates HTTP {status}: {raw_json}");
        }

        serde_json::from_value::<CompetitorRatesResponse>(raw_json)
            .context("failed to parse competitor rates response")
    }
}

#[async_trait::async_trait]
impl CompetitorRateProvider for HttpCompetitorRateProvider {
    fn provider_name(&self) -> &'static str {
        "lighthouse_http_json"
    }

    async fn fetch_competitor_rates(
        &self,
        property_id: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
        occupancy: u32,
    ) -> Result<CompetitorRateMatrix> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self
                .fetch_once(property_id, start_date, end_date, occupancy)
                .await
            {
                Ok(resp) => return into_matrix(resp, start_date, end_date),
                Err(err) => {
                    if attempt >= self.retries {
                        return Err(err);
                    }
                    let backoff = backoff_for(attempt);
                    tracing::warn!(attempt, ?backoff, error = %err, "competitor rates fetch failed; retrying");
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

/// Attempts per fetch, kept within `1..=MAX_RETRIES`.
fn parse_retries(raw: Option<&str>) -> u32 {
    raw.and_then(|s| s.trim().parse::<u32>().ok())
        .unwrap_or(DEFAULT_RETRIES)
        .clamp(1, MAX_RETRIES)
}

/// 1s, 2s, 4s, ... after the given failed attempt.
fn backoff_for(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(MAX_RETRIES);
    Duration::from_secs(1u64 << exp)
}

fn into_matrix(
    resp: CompetitorRatesResponse,
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> Result<CompetitorRateMatrix> {
    let mut out = CompetitorRateMatrix::new();
    for item in resp.items {
        validate_item(&item, start_date, end_date)?;
        out.entry(item.date)
            .or_default()
            .insert(item.competitor.trim().to_string(), item.rate);
    }
    Ok(out)
}

fn validate_item(item: &CompetitorRateItem, start_date: NaiveDate, end_date: NaiveDate) -> Result<()> {
    anyhow::ensure!(
        !item.competitor.trim().is_empty(),
        "competitor must be non-empty"
    );
    anyhow::ensure!(
        item.rate >= Decimal::ZERO,
        "competitor rate must be >= 0 (got {} for {} on {})",
        item.rate,
        item.competitor,
        item.date
    );
    anyhow::ensure!(
        (start_date..=end_date).contains(&item.date),
        "competitor rate date {} outside requested range {start_date}..={end_date}",
        item.date
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[tokio::test]
    async fn mock_cycles_weekly() {
        let start = d(2026, 3, 1);
        let end = d(2026, 3, 8);
        let m = MockCompetitorRateProvider
            .fetch_competitor_rates("", start, end, 2)
            .await
            .unwrap();

        assert_eq!(m.len(), 8);
        let day0 = &m[&start];
        assert_eq!(day0["COMP_A"], Decimal::from(100));
        assert_eq!(day0["COMP_B"], Decimal::from(107));
        assert_eq!(day0["COMP_C"], Decimal::from(97));
        assert_eq!(m[&d(2026, 3, 3)]["COMP_A"], Decimal::from(110));
        // Day index 7 wraps back to the base.
        assert_eq!(m[&end]["COMP_A"], Decimal::from(100));
    }

    #[test]
    fn groups_items_by_date() {
        let v = json!({
            "items": [
                {"date": "2026-03-01", "competitor": "Hotel A", "rate": "119.90"},
                {"date": "2026-03-01", "competitor": "Hotel B", "rate": 99},
                {"date": "2026-03-02", "competitor": "Hotel A", "rate": 125}
            ]
        });
        let resp: CompetitorRatesResponse = serde_json::from_value(v).unwrap();
        let m = into_matrix(resp, d(2026, 3, 1), d(2026, 3, 3)).unwrap();

        assert_eq!(m.len(), 2);
        assert_eq!(m[&d(2026, 3, 1)]["Hotel A"], Decimal::new(11990, 2));
        assert_eq!(m[&d(2026, 3, 1)].len(), 2);
        assert!(!m.contains_key(&d(2026, 3, 3)));
    }

    #[test]
    fn rejects_out_of_range_and_negative_items() {
        let out_of_range = CompetitorRatesResponse {
            items: vec![CompetitorRateItem {
                date: d(2026, 4, 1),
                competitor: "Hotel A".into(),
                rate: Decimal::from(100),
            }],
        };
        assert!(into_matrix(out_of_range, d(2026, 3, 1), d(2026, 3, 3)).is_err());

        let negative = CompetitorRatesResponse {
            items: vec![CompetitorRateItem {
                date: d(2026, 3, 1),
                competitor: "Hotel A".into(),
                rate: Decimal::from(-1),
            }],
        };
        assert!(into_matrix(negative, d(2026, 3, 1), d(2026, 3, 3)).is_err());
    }

    #[test]
    fn retries_are_bounded() {
        assert_eq!(parse_retries(None), DEFAULT_RETRIES);
        assert_eq!(parse_retries(Some("nope")), DEFAULT_RETRIES);
        assert_eq!(parse_retries(Some("0")), 1);
        assert_eq!(parse_retries(Some("5")), 5);
        assert_eq!(parse_retries(Some("70")), MAX_RETRIES);
    }

    #[test]
    fn backoff_doubles_and_never_overflows() {
        assert_eq!(backoff_for(1), Duration::from_secs(1));
        assert_eq!(backoff_for(3), Duration::from_secs(4));
        assert_eq!(backoff_for(u32::MAX), Duration::from_secs(1 << MAX_RETRIES));
    }

    #[test]
    fn uses_mock_without_base_url() {
        let provider = from_settings(&Settings::default()).unwrap();
        assert_eq!(provider.provider_name(), "mock");
    }
}
