use crate::domain::recommendation::{PricingRun, RateRecommendation, RunRequest};
use crate::storage::parse_decimal;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

pub const RUN_STATUS_COMPLETED: &str = "completed";

pub async fn create_run(
    pool: &SqlitePool,
    request: &RunRequest,
    created_at: DateTime<Utc>,
) -> anyhow::Result<PricingRun> {
    let run = new_run(request, created_at);
    let mut tx = pool.begin().await.context("begin transaction failed")?;
    insert_run(&mut tx, &run).await?;
    tx.commit().await.context("commit transaction failed")?;
    Ok(run)
}

/// Stores a run together with its recommendations in one transaction.
pub async fn persist_run(
    pool: &SqlitePool,
    request: &RunRequest,
    created_at: DateTime<Utc>,
    recs: &[RateRecommendation],
) -> anyhow::Result<PricingRun> {
    let run = new_run(request, created_at);

    let mut tx = pool.begin().await.context("begin transaction failed")?;
    insert_run(&mut tx, &run).await?;
    let inserted = insert_recommendations(&mut tx, run.id, recs).await?;
    tx.commit().await.context("commit transaction failed")?;

    tracing::debug!(run_id = %run.id, inserted, "persisted pricing run");
    Ok(run)
}

fn new_run(request: &RunRequest, created_at: DateTime<Utc>) -> PricingRun {
    PricingRun {
        id: Uuid::new_v4(),
        start_date: request.start_date,
        end_date: request.end_date,
        dry_run: request.dry_run,
        occupancy: request.occupancy,
        status: RUN_STATUS_COMPLETED.to_string(),
        created_at,
    }
}

async fn insert_run(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    run: &PricingRun,
) -> anyhow::Result<()> {
    sqlx::query(
        "INSERT INTO runs (id, start_date, end_date, dry_run, occupancy, status, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(run.id)
    .bind(run.start_date)
    .bind(run.end_date)
    .bind(run.dry_run)
    .bind(i64::from(run.occupancy))
    .bind(&run.status)
    .bind(run.created_at)
    .execute(&mut **tx)
    .await
    .context("insert runs failed")?;

    Ok(())
}

pub async fn get_run(pool: &SqlitePool, run_id: Uuid) -> anyhow::Result<Option<PricingRun>> {
    let row = sqlx::query_as::<_, (Uuid, NaiveDate, NaiveDate, bool, i64, String, DateTime<Utc>)>(
        "SELECT id, start_date, end_date, dry_run, occupancy, status, created_at \
         FROM runs WHERE id = ?",
    )
    .bind(run_id)
    .fetch_optional(pool)
    .await
    .context("select runs failed")?;

    let Some((id, start_date, end_date, dry_run, occupancy, status, created_at)) = row else {
        return Ok(None);
    };

    Ok(Some(PricingRun {
        id,
        start_date,
        end_date,
        dry_run,
        occupancy: u32::try_from(occupancy)
            .with_context(|| format!("invalid occupancy in DB for run_id={id}: {occupancy}"))?,
        status,
        created_at,
    }))
}

pub async fn save_recommendations(
    pool: &SqlitePool,
    run_id: Uuid,
    recs: &[RateRecommendation],
) -> anyhow::Result<u64> {
    let mut tx = pool.begin().await.context("begin transaction failed")?;
    let inserted = insert_recommendations(&mut tx, run_id, recs).await?;
    tx.commit().await.context("commit transaction failed")?;
    Ok(inserted)
}

async fn insert_recommendations(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    run_id: Uuid,
    recs: &[RateRecommendation],
) -> anyhow::Result<u64> {
    let mut inserted: u64 = 0;
    for rec in recs {
        let res = sqlx::query(
            "INSERT INTO recommendations (run_id, date, recommended_rate, lowest_competitor) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(run_id)
        .bind(rec.date)
        .bind(rec.recommended_rate.to_string())
        .bind(rec.lowest_competitor.map(|d| d.to_string()))
        .execute(&mut **tx)
        .await
        .context("insert recommendations failed")?;
        inserted += res.rows_affected();
    }
    Ok(inserted)
}

/// Ordered by date; empty for unknown runs.
pub async fn get_recommendations(
    pool: &SqlitePool,
    run_id: Uuid,
) -> anyhow::Result<Vec<RateRecommendation>> {
    let rows = sqlx::query_as::<_, (NaiveDate, String, Option<String>)>(
        "SELECT date, recommended_rate, lowest_competitor \
         FROM recommendations \
         WHERE run_id = ? \
         ORDER BY date ASC",
    )
    .bind(run_id)
    .fetch_all(pool)
    .await
    .context("select recommendations failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for (date, recommended_rate, lowest_competitor) in rows {
        out.push(RateRecommendation {
            date,
            recommended_rate: parse_decimal(&recommended_rate, "recommended_rate")?,
            lowest_competitor: lowest_competitor
                .as_deref()
                .map(|raw| parse_decimal(raw, "lowest_competitor"))
                .transpose()?,
        });
    }
    Ok(out)
}
