use crate::domain::policy::{PricingPolicy, PricingPolicyFile};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_SETTINGS_PATH: &str = "config/settings.yaml";
const DEFAULT_CURRENCY: &str = "EUR";
const DEFAULT_HORIZON_DAYS: u32 = 120;
const DEFAULT_OCCUPANCY: u32 = 2;

/// Process environment (secrets, endpoints, paths).
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub database_url: Option<String>,
    pub sentry_dsn: Option<String>,
    pub settings_path: Option<String>,
    pub lighthouse_base_url: Option<String>,
    pub lighthouse_api_key: Option<String>,
    pub sb_base_url: Option<String>,
    pub sb_api_key: Option<String>,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env_non_empty("DATABASE_URL"),
            sentry_dsn: env_non_empty("SENTRY_DSN"),
            settings_path: env_non_empty("PRICING_SETTINGS_PATH"),
            lighthouse_base_url: env_non_empty("LIGHTHOUSE_BASE_URL"),
            lighthouse_api_key: env_non_empty("LIGHTHOUSE_API_KEY"),
            sb_base_url: env_non_empty("SB_BASE_URL"),
            sb_api_key: env_non_empty("SB_API_KEY"),
        })
    }

    pub fn require_database_url(&self) -> anyhow::Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL is required")
    }

    pub fn require_lighthouse_base_url(&self) -> anyhow::Result<&str> {
        self.lighthouse_base_url
            .as_deref()
            .context("LIGHTHOUSE_BASE_URL is required")
    }

    /// Explicit path, else `config/settings.yaml`, else the same file one directory up
    /// (running from inside a crate directory).
    pub fn resolve_settings_path(&self) -> PathBuf {
        if let Some(p) = &self.settings_path {
            return PathBuf::from(p);
        }
        let local = PathBuf::from(DEFAULT_SETTINGS_PATH);
        if local.exists() {
            return local;
        }
        Path::new("..").join(DEFAULT_SETTINGS_PATH)
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

#[derive(Debug, Clone, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    hotel: HotelSection,
    #[serde(default)]
    run: RunSection,
    pricing: PricingPolicyFile,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct HotelSection {
    currency: Option<String>,
    property_id: Option<String>,
    rate_plan_id: Option<String>,
    #[serde(default)]
    utc_offset_hours: i32,
}

#[derive(Debug, Clone, Deserialize)]
struct RunSection {
    #[serde(default = "default_horizon_days")]
    horizon_days: u32,
    #[serde(default = "default_occupancy")]
    occupancy: u32,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            horizon_days: default_horizon_days(),
            occupancy: default_occupancy(),
        }
    }
}

fn default_horizon_days() -> u32 {
    DEFAULT_HORIZON_DAYS
}

fn default_occupancy() -> u32 {
    DEFAULT_OCCUPANCY
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HotelConfig {
    pub currency: String,
    pub property_id: String,
    pub rate_plan_id: String,
    pub utc_offset_hours: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunConfig {
    pub horizon_days: u32,
    pub occupancy: u32,
}

/// Everything read from `settings.yaml`, with env overrides applied and the pricing policy
/// validated.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub hotel: HotelConfig,
    pub run: RunConfig,
    pub pricing: PricingPolicy,
}

/// Env vars that take precedence over the YAML file.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    pub currency: Option<String>,
    pub property_id: Option<String>,
    pub rate_plan_id: Option<String>,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self {
            currency: env_non_empty("CURRENCY"),
            property_id: env_non_empty("SB_PROPERTY_ID"),
            rate_plan_id: env_non_empty("SB_RATE_PLAN_ID"),
        }
    }
}

impl AppConfig {
    pub fn load(settings: &Settings) -> anyhow::Result<Self> {
        let path = settings.resolve_settings_path();
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let cfg = Self::from_yaml_str(&raw, &EnvOverrides::from_env())
            .with_context(|| format!("invalid settings file {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            property_id = %cfg.hotel.property_id,
            horizon_days = cfg.run.horizon_days,
            "loaded pricing settings"
        );
        Ok(cfg)
    }

    pub fn from_yaml_str(raw: &str, overrides: &EnvOverrides) -> anyhow::Result<Self> {
        let file: SettingsFile =
            serde_yaml_bw::from_str(raw).context("failed to parse settings YAML")?;

        anyhow::ensure!(file.run.horizon_days >= 1, "run.horizon_days must be >= 1");
        anyhow::ensure!(file.run.occupancy >= 1, "run.occupancy must be >= 1");

        // Property currency: the file wins over CURRENCY, which only fills a gap.
        let currency = file
            .hotel
            .currency
            .or_else(|| overrides.currency.clone())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        let property_id = overrides
            .property_id
            .clone()
            .or(file.hotel.property_id)
            .unwrap_or_default();
        let rate_plan_id = overrides
            .rate_plan_id
            .clone()
            .or(file.hotel.rate_plan_id)
            .unwrap_or_default();

        let pricing = file
            .pricing
            .validate_and_into_policy()
            .context("invalid pricing section")?;

        Ok(Self {
            hotel: HotelConfig {
                currency,
                property_id,
                rate_plan_id,
                utc_offset_hours: file.hotel.utc_offset_hours,
            },
            run: RunConfig {
                horizon_days: file.run.horizon_days,
                occupancy: file.run.occupancy,
            },
            pricing,
        })
    }
}
