//! Match pipeline (`sieve match`).
//!
//! Walks the ledger in order and classifies each contract against the
//! persisted index: library-only, duplicate of an earlier contract, or novel.
//! Results go back into the ledger (`lib` / `similar`); the hashes of every
//! registered contract go into `contract_hashes`, so a later run only looks
//! at contracts fetched since.
//!
//! Each flush writes the ledger before the hashes of the contracts it covers,
//! so a contract is never in the persisted index without its ledger result.

use anyhow::Result;
use source_sieve_core::index::ContentHashIndex;
use source_sieve_core::matcher::DuplicateMatcher;
use source_sieve_core::models::MatchResult;
use sqlx::SqlitePool;
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::index_store;
use crate::ledger;
use crate::libraries;
use crate::migrate;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::store::ContractStore;

/// Ledger is rewritten after this many classifications.
const LEDGER_FLUSH_EVERY: u64 = 100;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct MatchSummary {
    pub entries: u64,
    pub skipped: u64,
    pub missing_sources: u64,
    pub library_only: u64,
    pub duplicates: u64,
    pub novel: u64,
}

impl MatchSummary {
    fn record(&mut self, result: &MatchResult) {
        match result {
            MatchResult::LibraryOnly => self.library_only += 1,
            MatchResult::Duplicate { .. } => self.duplicates += 1,
            MatchResult::Novel => self.novel += 1,
        }
    }
}

pub async fn match_ledger(
    config: &Config,
    rebuild: bool,
    reporter: &dyn ProgressReporter,
) -> Result<MatchSummary> {
    let pool = db::connect(config).await?;
    migrate::create_schema(&pool).await?;
    if rebuild {
        let removed = index_store::clear(&pool).await?;
        tracing::info!(rows = removed, "cleared persisted index");
    }

    let index = index_store::load_index(&pool).await?;
    let libs = libraries::load_filter(config)?;
    let store = ContractStore::new(&config.storage.contracts_dir);
    let matcher = DuplicateMatcher::new(&index, &libs, config.matching.to_match_config());
    tracing::info!(
        contracts = index.contract_count(),
        hashes = index.hash_count(),
        "index loaded"
    );

    let ledger_path = config.ledger_path();
    let mut entries = ledger::read_ledger(&ledger_path)?;
    let mut summary = MatchSummary {
        entries: entries.len() as u64,
        ..MatchSummary::default()
    };
    let total = summary.entries;
    let mut unflushed = 0u64;
    let mut unsaved: Vec<String> = Vec::new();

    for n in 0..entries.len() {
        let id = entries[n].contract_id();
        if !rebuild && (entries[n].is_library() || index.contains_contract(&id)) {
            summary.skipped += 1;
            continue;
        }

        let sources = match store.read_files(&id) {
            Ok(sources) => sources,
            Err(e) => {
                tracing::warn!(contract = %id, error = %e, "no stored sources, skipping");
                summary.missing_sources += 1;
                continue;
            }
        };

        let result = matcher.classify(&id, &sources, &store);
        tracing::debug!(contract = %id, result = result.label(), "classified");
        if !matches!(result, MatchResult::LibraryOnly) {
            unsaved.push(id);
        }
        entries[n].apply_result(&result);
        summary.record(&result);

        unflushed += 1;
        if unflushed >= LEDGER_FLUSH_EVERY {
            flush(&pool, &ledger_path, &entries, &index, &mut unsaved).await?;
            unflushed = 0;
        }
        reporter.report(ProgressEvent::Matching {
            n: n as u64 + 1,
            total,
        });
    }

    if unflushed > 0 {
        flush(&pool, &ledger_path, &entries, &index, &mut unsaved).await?;
    }
    pool.close().await;
    Ok(summary)
}

/// Rewrite the ledger, then persist the hashes of contracts registered since
/// the last flush.
async fn flush(
    pool: &SqlitePool,
    ledger_path: &Path,
    entries: &[ledger::ContractEntry],
    index: &ContentHashIndex,
    unsaved: &mut Vec<String>,
) -> Result<()> {
    ledger::write_ledger(ledger_path, entries)?;
    for id in unsaved.drain(..) {
        index_store::save_record(pool, &id, &index.hashes_of(&id)).await?;
    }
    Ok(())
}

/// `sieve match`.
pub async fn run_match(
    config: &Config,
    rebuild: bool,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    let s = match_ledger(config, rebuild, reporter).await?;

    println!("match{}", if rebuild { " (rebuild)" } else { "" });
    println!("  ledger entries: {}", s.entries);
    println!("  skipped (already indexed): {}", s.skipped);
    println!("  missing sources: {}", s.missing_sources);
    println!("  library only: {}", s.library_only);
    println!("  duplicates: {}", s.duplicates);
    println!("  novel: {}", s.novel);
    println!("ok");
    Ok(())
}
