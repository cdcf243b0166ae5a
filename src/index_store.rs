//! SQLite persistence of the content-hash index.
//!
//! The index lives in memory while a command runs; `contract_hashes` holds it
//! between runs. Each contract's rows are replaced as a unit.

use anyhow::Result;
use source_sieve_core::hash::ContentHash;
use source_sieve_core::index::{ContentHashIndex, ContractRecord};
use sqlx::SqlitePool;
use std::collections::BTreeSet;

/// Load every persisted record into a fresh index.
pub async fn load_index(pool: &SqlitePool) -> Result<ContentHashIndex> {
    let rows: Vec<(String, String)> =
        sqlx::query_as("SELECT contract_id, hash FROM contract_hashes ORDER BY contract_id, hash")
            .fetch_all(pool)
            .await?;

    let mut records: Vec<ContractRecord> = Vec::new();
    for (contract_id, hash) in rows {
        match records.last_mut() {
            Some(last) if last.contract_id == contract_id => {
                last.file_hashes.insert(ContentHash::from_hex(hash));
            }
            _ => records.push(ContractRecord {
                contract_id,
                file_hashes: BTreeSet::from([ContentHash::from_hex(hash)]),
            }),
        }
    }

    Ok(ContentHashIndex::from_records(records))
}

/// Replace the stored hash set of one contract.
pub async fn save_record(
    pool: &SqlitePool,
    contract_id: &str,
    hashes: &BTreeSet<ContentHash>,
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM contract_hashes WHERE contract_id = ?")
        .bind(contract_id)
        .execute(&mut *tx)
        .await?;

    for hash in hashes {
        sqlx::query("INSERT INTO contract_hashes (contract_id, hash) VALUES (?, ?)")
            .bind(contract_id)
            .bind(hash.as_str())
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Drop every persisted record.
pub async fn clear(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM contract_hashes")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Number of distinct contracts and distinct hashes stored.
pub async fn counts(pool: &SqlitePool) -> Result<(i64, i64)> {
    let contracts: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT contract_id) FROM contract_hashes")
        .fetch_one(pool)
        .await?;
    let hashes: i64 = sqlx::query_scalar("SELECT COUNT(DISTINCT hash) FROM contract_hashes")
        .fetch_one(pool)
        .await?;
    Ok((contracts, hashes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::create_schema;
    use source_sieve_core::hash::hash_of;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let pool = memory_pool().await;
        let a = BTreeSet::from([hash_of("a"), hash_of("shared")]);
        let b = BTreeSet::from([hash_of("b"), hash_of("shared")]);
        save_record(&pool, "0x01", &a).await.unwrap();
        save_record(&pool, "0x02", &b).await.unwrap();

        let index = load_index(&pool).await.unwrap();
        assert_eq!(index.contract_count(), 2);
        assert_eq!(index.hashes_of("0x01"), a);
        assert_eq!(index.lookup(&hash_of("shared")).len(), 2);
        assert_eq!(counts(&pool).await.unwrap(), (2, 3));
    }

    #[tokio::test]
    async fn test_save_replaces_previous_rows() {
        let pool = memory_pool().await;
        save_record(&pool, "0x01", &BTreeSet::from([hash_of("old")]))
            .await
            .unwrap();
        save_record(&pool, "0x01", &BTreeSet::from([hash_of("new")]))
            .await
            .unwrap();

        let index = load_index(&pool).await.unwrap();
        assert_eq!(index.hashes_of("0x01"), BTreeSet::from([hash_of("new")]));
        assert!(index.lookup(&hash_of("old")).is_empty());
    }

    #[tokio::test]
    async fn test_clear_and_schema_idempotent() {
        let pool = memory_pool().await;
        create_schema(&pool).await.unwrap();
        save_record(&pool, "0x01", &BTreeSet::from([hash_of("x")]))
            .await
            .unwrap();
        assert_eq!(clear(&pool).await.unwrap(), 1);
        assert_eq!(load_index(&pool).await.unwrap().contract_count(), 0);
    }
}
