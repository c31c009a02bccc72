use anyhow::Context;
use chrono::{Duration, NaiveDate};
use clap::Parser;
use hotel_pricing_core::clients::channel_manager::MockChannelManager;
use hotel_pricing_core::clients::competitor_rates;
use hotel_pricing_core::config::{AppConfig, RunConfig, Settings};
use hotel_pricing_core::domain::recommendation::RunRequest;
use hotel_pricing_core::time::calendar;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "hotel_pricing_worker")]
struct Args {
    /// First night to price (YYYY-MM-DD). Defaults to the evaluation date.
    #[arg(long)]
    start_date: Option<String>,

    /// Last night to price, inclusive. Defaults to start + run.horizon_days - 1.
    #[arg(long)]
    end_date: Option<String>,

    /// "Today" for lead-time buckets (YYYY-MM-DD). Defaults to the hotel's local date.
    #[arg(long)]
    evaluation_date: Option<String>,

    /// Guests per room; defaults to run.occupancy from the settings file.
    #[arg(long)]
    occupancy: Option<u32>,

    /// Compute and log recommendations without writing to the database.
    #[arg(long)]
    dry_run: bool,
}

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

    let args = Args::parse();

    match run(args, &settings).await {
        Ok(()) => Ok(()),
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(error = %format!("{err:#}"), "pricing run failed");
            Err(err)
        }
    }
}

async fn run(args: Args, settings: &Settings) -> anyhow::Result<()> {
    let config = AppConfig::load(settings)?;

    let now = chrono::Utc::now();
    let evaluation_date = calendar::resolve_evaluation_date(
        args.evaluation_date.as_deref(),
        now,
        config.hotel.utc_offset_hours,
    )?;
    let request = resolve_request(&args, evaluation_date, &config.run)?;

    let rates = competitor_rates::from_settings(settings)?;
    let channel = MockChannelManager::default();

    let recs = hotel_pricing_core::pricing::run::run_pricing(
        rates.as_ref(),
        &channel,
        &config.hotel,
        &config.run,
        &config.pricing,
        &request,
        evaluation_date,
    )
    .await?;

    if request.dry_run {
        for rec in &recs {
            tracing::info!(
                date = %rec.date,
                recommended_rate = %rec.recommended_rate,
                lowest_competitor = ?rec.lowest_competitor,
                "recommendation (dry-run)"
            );
        }
        tracing::info!(
            start_date = %request.start_date,
            end_date = %request.end_date,
            %evaluation_date,
            nights = recs.len(),
            dry_run = true,
            "pricing run finished without persisting"
        );
        return Ok(());
    }

    let db_url = settings.require_database_url()?;
    let pool = hotel_pricing_core::storage::connect(db_url).await?;
    hotel_pricing_core::storage::migrate(&pool).await?;

    let run = hotel_pricing_core::storage::runs::persist_run(&pool, &request, now, &recs)
        .await
        .context("persist pricing run failed")?;

    tracing::info!(
        run_id = %run.id,
        start_date = %run.start_date,
        end_date = %run.end_date,
        nights = recs.len(),
        "persisted pricing run"
    );
    Ok(())
}

fn resolve_request(
    args: &Args,
    evaluation_date: NaiveDate,
    run_cfg: &RunConfig,
) -> anyhow::Result<RunRequest> {
    let start_date = match args.start_date.as_deref() {
        Some(s) => calendar::parse_date(s)?,
        None => evaluation_date,
    };
    let end_date = match args.end_date.as_deref() {
        Some(s) => calendar::parse_date(s)?,
        None => default_end_date(start_date, run_cfg.horizon_days)?,
    };

    Ok(RunRequest {
        start_date,
        end_date,
        dry_run: args.dry_run,
        occupancy: args.occupancy.unwrap_or(run_cfg.occupancy),
    })
}

fn default_end_date(start_date: NaiveDate, horizon_days: u32) -> anyhow::Result<NaiveDate> {
    start_date
        .checked_add_signed(Duration::days(i64::from(horizon_days) - 1))
        .with_context(|| {
            format!("start_date {start_date} + {horizon_days} nights is past the last representable date")
        })
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
