use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use hotel_pricing_core::clients::channel_manager::{
    ChannelManagerClient, MockChannelManager, PushReceipt, RateUpdate,
};
use hotel_pricing_core::clients::competitor_rates::{self, CompetitorRateProvider};
use hotel_pricing_core::config::{AppConfig, HotelConfig, RunConfig, Settings};
use hotel_pricing_core::domain::policy::PricingPolicyFile;
use hotel_pricing_core::domain::recommendation::{
    Competitor, CompetitorPatch, NewCompetitor, PricingRun, RunRequest,
};
use hotel_pricing_core::storage;
use hotel_pricing_core::time::calendar;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    // Without a valid pricing policy there is nothing sensible to serve.
    let config = AppConfig::load(&settings)?;

    let pool: Option<SqlitePool> = match settings.require_database_url() {
        Ok(db_url) => match storage::connect(db_url).await {
            Ok(pool) => match storage::migrate(&pool).await {
                Ok(()) => Some(pool),
                Err(e) => {
                    sentry_anyhow::capture_anyhow(&e);
                    tracing::error!(error = %e, "db migrations failed; starting API in degraded mode");
                    None
                }
            },
            Err(e) => {
                sentry_anyhow::capture_anyhow(&e);
                tracing::error!(error = %e, "db connect failed; starting API in degraded mode");
                None
            }
        },
        Err(e) => {
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(error = %e, "DATABASE_URL missing; starting API in degraded mode");
            None
        }
    };

    let state = AppState {
        pool,
        config: Arc::new(config),
        rates: competitor_rates::from_settings(&settings)?,
        channel: Arc::new(MockChannelManager::default()),
    };

    let app = router(state).layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/config", get(get_config))
        .route("/competitors", post(create_competitor).get(get_competitors))
        .route(
            "/competitors/:id",
            patch(update_competitor).delete(remove_competitor),
        )
        .route("/runs", post(start_run))
        .route("/runs/:run_id/push", post(push_run_rates))
        .route("/recommendations/:run_id", get(recommendations_for_run))
        .with_state(state)
}

#[derive(Clone)]
struct AppState {
    pool: Option<SqlitePool>,
    config: Arc<AppConfig>,
    rates: Arc<dyn CompetitorRateProvider>,
    channel: Arc<dyn ChannelManagerClient>,
}

type ApiError = (StatusCode, String);

impl AppState {
    fn pool(&self) -> Result<&SqlitePool, ApiError> {
        self.pool.as_ref().ok_or((
            StatusCode::SERVICE_UNAVAILABLE,
            "database unavailable".to_string(),
        ))
    }
}

fn internal(e: anyhow::Error) -> ApiError {
    sentry_anyhow::capture_anyhow(&e);
    tracing::error!(error = %format!("{e:#}"), "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal error".to_string(),
    )
}

fn bad_request(e: anyhow::Error) -> ApiError {
    (StatusCode::BAD_REQUEST, format!("{e:#}"))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({"ok": true}))
}

#[derive(Debug, Serialize)]
struct ApiConfig {
    hotel: HotelConfig,
    run: RunConfig,
    pricing: PricingPolicyFile,
}

/// Non-secret configuration, as used by the dashboard.
async fn get_config(State(state): State<AppState>) -> Json<ApiConfig> {
    Json(ApiConfig {
        hotel: state.config.hotel.clone(),
        run: state.config.run.clone(),
        pricing: state.config.pricing.to_file(),
    })
}

async fn create_competitor(
    State(state): State<AppState>,
    Json(payload): Json<NewCompetitor>,
) -> Result<Json<Competitor>, ApiError> {
    let pool = state.pool()?;
    let payload = payload.validate().map_err(bad_request)?;
    let competitor = storage::competitors::add_competitor(pool, &payload)
        .await
        .map_err(internal)?;

    tracing::info!(id = competitor.id, name = %competitor.name, "competitor added");
    Ok(Json(competitor))
}

async fn get_competitors(
    State(state): State<AppState>,
) -> Result<Json<Vec<Competitor>>, ApiError> {
    let pool = state.pool()?;
    let competitors = storage::competitors::list_competitors(pool)
        .await
        .map_err(internal)?;
    Ok(Json(competitors))
}

async fn remove_competitor(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let pool = state.pool()?;
    let removed = storage::competitors::delete_competitor(pool, id)
        .await
        .map_err(internal)?;

    tracing::info!(id, removed, "competitor delete");
    Ok(Json(json!({"ok": true})))
}

async fn update_competitor(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<CompetitorPatch>,
) -> Result<Json<Competitor>, ApiError> {
    let pool = state.pool()?;
    let payload = payload.validate().map_err(bad_request)?;

    storage::competitors::update_competitor(pool, id, &payload)
        .await
        .map_err(internal)?
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, "Competitor not found".to_string()))
}

#[derive(Debug, Deserialize)]
struct RunCreate {
    start_date: String,
    end_date: String,
    #[serde(default = "default_dry_run")]
    dry_run: bool,
    occupancy: Option<u32>,
}

fn default_dry_run() -> bool {
    true
}

impl RunCreate {
    fn into_request(self, run_cfg: &RunConfig) -> anyhow::Result<RunRequest> {
        let start_date = calendar::parse_date(&self.start_date)?;
        let end_date = calendar::parse_date(&self.end_date)?;
        anyhow::ensure!(
            start_date <= end_date,
            "end_date {end_date} is before start_date {start_date}"
        );
        let nights = calendar::nights_inclusive(start_date, end_date);
        anyhow::ensure!(
            nights <= i64::from(run_cfg.horizon_days),
            "range is {nights} nights; at most {} allowed",
            run_cfg.horizon_days
        );

        let occupancy = self.occupancy.unwrap_or(run_cfg.occupancy);
        anyhow::ensure!(occupancy >= 1, "occupancy must be >= 1");

        Ok(RunRequest {
            start_date,
            end_date,
            dry_run: self.dry_run,
            occupancy,
        })
    }
}

async fn start_run(
    State(state): State<AppState>,
    Json(payload): Json<RunCreate>,
) -> Result<Json<PricingRun>, ApiError> {
    let pool = state.pool()?;
    let cfg = &state.config;
    let request = payload.into_request(&cfg.run).map_err(bad_request)?;

    let now = Utc::now();
    let evaluation_date = calendar::resolve_evaluation_date(None, now, cfg.hotel.utc_offset_hours)
        .map_err(internal)?;

    let recs = hotel_pricing_core::pricing::run::run_pricing(
        state.rates.as_ref(),
        state.channel.as_ref(),
        &cfg.hotel,
        &cfg.run,
        &cfg.pricing,
        &request,
        evaluation_date,
    )
    .await
    .map_err(internal)?;

    let run = storage::runs::persist_run(pool, &request, now, &recs)
        .await
        .map_err(internal)?;

    tracing::info!(run_id = %run.id, nights = recs.len(), dry_run = run.dry_run, "pricing run stored");
    Ok(Json(run))
}

#[derive(Debug, Serialize)]
struct ApiRecommendation {
    run_id: Uuid,
    date: chrono::NaiveDate,
    recommended_rate: rust_decimal::Decimal,
    lowest_competitor: Option<rust_decimal::Decimal>,
}

async fn recommendations_for_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<Vec<ApiRecommendation>>, ApiError> {
    let pool = state.pool()?;
    let recs = storage::runs::get_recommendations(pool, run_id)
        .await
        .map_err(internal)?;

    Ok(Json(
        recs.into_iter()
            .map(|r| ApiRecommendation {
                run_id,
                date: r.date,
                recommended_rate: r.recommended_rate,
                lowest_competitor: r.lowest_competitor,
            })
            .collect(),
    ))
}

#[derive(Debug, Default, Deserialize)]
struct PushRequest {
    currency: Option<String>,
}

async fn push_run_rates(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
    payload: Option<Json<PushRequest>>,
) -> Result<Json<PushReceipt>, ApiError> {
    let pool = state.pool()?;
    let recs = storage::runs::get_recommendations(pool, run_id)
        .await
        .map_err(internal)?;
    if recs.is_empty() {
        return Err((
            StatusCode::NOT_FOUND,
            "No recommendations found for run".to_string(),
        ));
    }

    let hotel = &state.config.hotel;
    let currency = payload
        .and_then(|Json(p)| p.currency)
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| hotel.currency.clone());

    let updates: Vec<RateUpdate> = recs
        .iter()
        .map(|r| RateUpdate::new(r.date, r.recommended_rate, &currency))
        .collect();

    let receipt = state
        .channel
        .push_rates(&hotel.property_id, &hotel.rate_plan_id, &updates)
        .await
        .map_err(internal)?;

    tracing::info!(%run_id, num_updates = receipt.num_updates, status = %receipt.status, "rates pushed");
    Ok(Json(receipt))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use hotel_pricing_core::clients::competitor_rates::MockCompetitorRateProvider;
    use hotel_pricing_core::config::EnvOverrides;
    use serde_json::Value;
    use tower::ServiceExt;

    const YAML: &str = r#"
hotel:
  currency: EUR
  property_id: "p-1"
  rate_plan_id: "BAR"
pricing:
  min_rate: 80
  max_rate: 200
  weekend_uplift: 0
  undercut: -2
  max_change_pct: 1.0
"#;

    async fn state(with_db: bool) -> AppState {
        let pool = if with_db {
            let pool = sqlx::sqlite::SqlitePoolOptions::new()
                .max_connections(1)
                .connect("sqlite::memory:")
                .await
                .unwrap();
            storage::migrate(&pool).await.unwrap();
            Some(pool)
        } else {
            None
        };

        AppState {
            pool,
            config: Arc::new(AppConfig::from_yaml_str(YAML, &EnvOverrides::default()).unwrap()),
            rates: Arc::new(MockCompetitorRateProvider),
            channel: Arc::new(MockChannelManager::default()),
        }
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                req = req.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };

        let res = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_and_config() {
        let app = router(state(false).await);

        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true}));

        let (status, body) = call(&app, "GET", "/config", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["hotel"]["currency"], "EUR");
        assert_eq!(body["run"]["horizon_days"], 120);
        assert!(body["pricing"]["lead_buckets"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn db_routes_are_unavailable_without_pool() {
        let app = router(state(false).await);
        let (status, _) = call(&app, "GET", "/competitors", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn competitor_crud() {
        let app = router(state(true).await);

        let (status, created) = call(
            &app,
            "POST",
            "/competitors",
            Some(json!({"name": "Hotel A", "website": "https://a.example"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["active"], true);
        let id = created["id"].as_i64().unwrap();

        let (status, _) = call(&app, "POST", "/competitors", Some(json!({"name": " "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, patched) = call(
            &app,
            "PATCH",
            &format!("/competitors/{id}"),
            Some(json!({"active": false})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(patched["active"], false);
        assert_eq!(patched["name"], "Hotel A");

        let (status, _) = call(&app, "PATCH", "/competitors/999", Some(json!({"active": true}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&app, "DELETE", &format!("/competitors/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"ok": true}));

        let (_, list) = call(&app, "GET", "/competitors", None).await;
        assert!(list.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_recommend_and_push() {
        let app = router(state(true).await);

        // 2030-03-04..06 are Monday to Wednesday.
        let (status, run) = call(
            &app,
            "POST",
            "/runs",
            Some(json!({"start_date": "2030-03-04", "end_date": "2030-03-06"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(run["status"], "completed");
        assert_eq!(run["dry_run"], true);
        assert_eq!(run["occupancy"], 2);
        let run_id = run["id"].as_str().unwrap().to_string();

        let (status, recs) = call(&app, "GET", &format!("/recommendations/{run_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        let rates: Vec<&str> = recs
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["recommended_rate"].as_str().unwrap())
            .collect();
        assert_eq!(rates, vec!["95.00", "100.00", "105.00"]);
        assert_eq!(recs[0]["date"], "2030-03-04");

        let (status, receipt) = call(
            &app,
            "POST",
            &format!("/runs/{run_id}/push"),
            Some(json!({"currency": "USD"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(receipt, json!({"status": "mocked", "num_updates": 3}));

        let missing = Uuid::new_v4();
        let (status, _) = call(&app, "POST", &format!("/runs/{missing}/push"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn rejects_bad_run_ranges() {
        let app = router(state(true).await);

        let (status, _) = call(
            &app,
            "POST",
            "/runs",
            Some(json!({"start_date": "2030-03-06", "end_date": "2030-03-04"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(
            &app,
            "POST",
            "/runs",
            Some(json!({"start_date": "03/04/2030", "end_date": "2030-03-04"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
