use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inputs for pricing a single night.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateQuery {
    pub target_date: NaiveDate,
    pub competitor_prices: Vec<Decimal>,
    pub current_rate: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateRecommendation {
    pub date: NaiveDate,
    pub recommended_rate: Decimal,
    pub lowest_competitor: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub dry_run: bool,
    pub occupancy: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingRun {
    pub id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub dry_run: bool,
    pub occupancy: u32,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Competitor {
    pub id: i64,
    pub name: String,
    pub website: Option<String>,
    pub active: bool,
    pub lighthouse_hotel_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewCompetitor {
    pub name: String,
    #[serde(default)]
    pub website: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompetitorPatch {
    pub name: Option<String>,
    pub website: Option<String>,
    pub active: Option<bool>,
    pub lighthouse_hotel_id: Option<String>,
}

fn default_active() -> bool {
    true
}

impl NewCompetitor {
    pub fn validate(self) -> anyhow::Result<Self> {
        let name = self.name.trim().to_string();
        anyhow::ensure!(!name.is_empty(), "competitor name must be non-empty");

        let website = self
            .website
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        if let Some(url) = &website {
            validate_website(url)?;
        }

        Ok(Self {
            name,
            website,
            active: self.active,
        })
    }
}

impl CompetitorPatch {
    pub fn validate(self) -> anyhow::Result<Self> {
        let name = match self.name {
            Some(name) => {
                let name = name.trim().to_string();
                anyhow::ensure!(!name.is_empty(), "competitor name must be non-empty");
                Some(name)
            }
            None => None,
        };
        if let Some(url) = &self.website {
            validate_website(url)?;
        }

        Ok(Self { name, ..self })
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.website.is_none()
            && self.active.is_none()
            && self.lighthouse_hotel_id.is_none()
    }
}

fn validate_website(url: &str) -> anyhow::Result<()> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|e| anyhow::anyhow!("invalid competitor website {url:?}: {e}"))?;
    anyhow::ensure!(
        matches!(parsed.scheme(), "http" | "https"),
        "competitor website must be http(s) (got {url:?})"
    );
    Ok(())
}
