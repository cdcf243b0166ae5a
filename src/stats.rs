//! Ledger and index overview.
//!
//! Used by `sieve stats` to show what has been fetched and how it was
//! classified: ledger counts, per-chain breakdown, and the size of the
//! persisted hash index.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::config::Config;
use crate::db;
use crate::index_store;
use crate::ledger::{self, ContractEntry};
use crate::migrate;

/// Per-chain breakdown of ledger entries.
#[derive(Debug, Default, PartialEq, Eq)]
struct ChainStats {
    contracts: u64,
    library_only: u64,
    duplicates: u64,
    last_fetch: Option<DateTime<Utc>>,
}

fn chain_stats(entries: &[ContractEntry]) -> BTreeMap<String, ChainStats> {
    let mut by_chain: BTreeMap<String, ChainStats> = BTreeMap::new();
    for entry in entries {
        let stats = by_chain.entry(entry.chain_id.clone()).or_default();
        stats.contracts += 1;
        if entry.is_library() {
            stats.library_only += 1;
        }
        if entry.similar.is_some() {
            stats.duplicates += 1;
        }
        if entry.fetched_at > stats.last_fetch {
            stats.last_fetch = entry.fetched_at;
        }
    }
    by_chain
}

/// Run the stats command: read the ledger and database and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let entries = ledger::read_ledger(&config.ledger_path())?;
    let by_chain = chain_stats(&entries);

    let pool = db::connect(config).await?;
    migrate::create_schema(&pool).await?;
    let (indexed_contracts, indexed_hashes) = index_store::counts(&pool).await?;
    pool.close().await;

    let db_size = std::fs::metadata(&config.storage.db_path)
        .map(|m| m.len())
        .unwrap_or(0);

    let library_only: u64 = by_chain.values().map(|s| s.library_only).sum();
    let duplicates: u64 = by_chain.values().map(|s| s.duplicates).sum();

    println!("Source Sieve Stats");
    println!("==================");
    println!();
    println!("  Contracts:   {}", config.storage.contracts_dir.display());
    println!("  Database:    {}", config.storage.db_path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Ledger:      {}", entries.len());
    println!("  Library:     {}", library_only);
    println!("  Duplicates:  {}", duplicates);
    println!("  Indexed:     {} contracts, {} hashes", indexed_contracts, indexed_hashes);

    if !by_chain.is_empty() {
        println!();
        println!("  By chain:");
        println!(
            "  {:<10} {:>10} {:>8} {:>10}   {}",
            "CHAIN", "CONTRACTS", "LIBRARY", "DUPLICATE", "LAST FETCH"
        );
        println!("  {}", "-".repeat(60));
        for (chain, s) in &by_chain {
            let fetched = match s.last_fetch {
                Some(ts) => format_ts_relative(ts.timestamp()),
                None => "unknown".to_string(),
            };
            println!(
                "  {:<10} {:>10} {:>8} {:>10}   {}",
                chain, s.contracts, s.library_only, s.duplicates, fetched
            );
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use source_sieve_core::models::MatchResult;

    #[test]
    fn test_chain_breakdown() {
        let mut a = ContractEntry::new("0x01", "0x1", "A", "v1");
        a.apply_result(&MatchResult::LibraryOnly);
        let mut b = ContractEntry::new("0x02", "0x1", "B", "v1");
        b.similar = Some("0x03".into());
        let mut c = ContractEntry::new("0x03", "0xa4b1", "C", "v1");
        c.fetched_at = None;

        let stats = chain_stats(&[a, b.clone(), c]);
        let mainnet = &stats["0x1"];
        assert_eq!(mainnet.contracts, 2);
        assert_eq!(mainnet.library_only, 1);
        assert_eq!(mainnet.duplicates, 1);
        assert!(mainnet.last_fetch >= b.fetched_at);
        assert_eq!(stats["0xa4b1"].last_fetch, None);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_format_ts_relative() {
        let now = Utc::now().timestamp();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - 7200), "2 hours ago");
        assert_eq!(format_ts_relative(0), "1970-01-01 00:00");
    }
}
