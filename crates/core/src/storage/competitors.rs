use crate::domain::recommendation::{Competitor, CompetitorPatch, NewCompetitor};
use anyhow::Context;
use sqlx::SqlitePool;

type CompetitorRow = (i64, String, Option<String>, bool, Option<String>);

fn from_row((id, name, website, active, lighthouse_hotel_id): CompetitorRow) -> Competitor {
    Competitor {
        id,
        name,
        website,
        active,
        lighthouse_hotel_id,
    }
}

pub async fn add_competitor(pool: &SqlitePool, new: &NewCompetitor) -> anyhow::Result<Competitor> {
    let res = sqlx::query("INSERT INTO competitors (name, website, active) VALUES (?, ?, ?)")
        .bind(&new.name)
        .bind(&new.website)
        .bind(new.active)
        .execute(pool)
        .await
        .context("insert competitors failed")?;

    Ok(Competitor {
        id: res.last_insert_rowid(),
        name: new.name.clone(),
        website: new.website.clone(),
        active: new.active,
        lighthouse_hotel_id: None,
    })
}

/// Newest first.
pub async fn list_competitors(pool: &SqlitePool) -> anyhow::Result<Vec<Competitor>> {
    let rows = sqlx::query_as::<_, CompetitorRow>(
        "SELECT id, name, website, active, lighthouse_hotel_id FROM competitors ORDER BY id DESC",
    )
    .fetch_all(pool)
    .await
    .context("select competitors failed")?;

    Ok(rows.into_iter().map(from_row).collect())
}

pub async fn get_competitor(pool: &SqlitePool, id: i64) -> anyhow::Result<Option<Competitor>> {
    let row = sqlx::query_as::<_, CompetitorRow>(
        "SELECT id, name, website, active, lighthouse_hotel_id FROM competitors WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .context("select competitor failed")?;

    Ok(row.map(from_row))
}

/// Returns whether a row was removed.
pub async fn delete_competitor(pool: &SqlitePool, id: i64) -> anyhow::Result<bool> {
    let res = sqlx::query("DELETE FROM competitors WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await
        .context("delete competitors failed")?;
    Ok(res.rows_affected() > 0)
}

/// Applies the set fields of `patch`; `None` when `id` does not exist.
pub async fn update_competitor(
    pool: &SqlitePool,
    id: i64,
    patch: &CompetitorPatch,
) -> anyhow::Result<Option<Competitor>> {
    if patch.is_empty() {
        return get_competitor(pool, id).await;
    }

    let mut qb = sqlx::QueryBuilder::<sqlx::Sqlite>::new("UPDATE competitors SET ");
    let mut cols = qb.separated(", ");
    if let Some(name) = &patch.name {
        cols.push("name = ").push_bind_unseparated(name.clone());
    }
    if let Some(website) = &patch.website {
        cols.push("website = ").push_bind_unseparated(website.clone());
    }
    if let Some(active) = patch.active {
        cols.push("active = ").push_bind_unseparated(active);
    }
    if let Some(lighthouse_hotel_id) = &patch.lighthouse_hotel_id {
        cols.push("lighthouse_hotel_id = ")
            .push_bind_unseparated(lighthouse_hotel_id.clone());
    }
    qb.push(" WHERE id = ").push_bind(id);

    let res = qb
        .build()
        .execute(pool)
        .await
        .context("update competitors failed")?;
    if res.rows_affected() == 0 {
        return Ok(None);
    }

    get_competitor(pool, id).await
}
