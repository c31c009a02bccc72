pub mod competitors;
pub mod runs;

use anyhow::Context;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Opens (creating if needed) the SQLite database behind `database_url`.
pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let opts = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("invalid DATABASE_URL: {database_url}"))?
        .create_if_missing(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(opts)
        .await
        .context("connect DATABASE_URL failed")
}

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

fn parse_decimal(raw: &str, column: &str) -> anyhow::Result<rust_decimal::Decimal> {
    rust_decimal::Decimal::from_str(raw)
        .with_context(|| format!("invalid decimal in {column}: {raw:?}"))
}

#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    // One connection: every `:memory:` connection is its own database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    migrate(&pool).await.unwrap();
    pool
}
