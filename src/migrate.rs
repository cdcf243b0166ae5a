use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create the index tables. Idempotent.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // One row per (contract, non-library file hash)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS contract_hashes (
            contract_id TEXT NOT NULL,
            hash TEXT NOT NULL,
            PRIMARY KEY (contract_id, hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_contract_hashes_hash ON contract_hashes(hash)")
        .execute(pool)
        .await?;

    Ok(())
}
