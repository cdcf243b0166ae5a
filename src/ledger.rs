//! Contract ledger: one JSON object per line in `<contracts_dir>/contracts.json`.
//!
//! `fetch` appends a line per stored contract; `match` rewrites the file with
//! the classification fields filled in. Fields this module does not know
//! about are carried through untouched.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use source_sieve_core::models::MatchResult;
use std::io::Write;
use std::path::Path;

pub const LEDGER_FILE: &str = "contracts.json";

/// Field names owned by [`ContractEntry`]; never copied into `extra`.
pub const RESERVED_FIELDS: &[&str] = &[
    "address",
    "chain_id",
    "name",
    "compiler",
    "fetched_at",
    "lib",
    "similar",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractEntry {
    pub address: String,
    pub chain_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub compiler: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
    /// Every file is a known library file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lib: Option<bool>,
    /// Address of the stored contract this one duplicates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similar: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContractEntry {
    pub fn new(address: &str, chain_id: &str, name: &str, compiler: &str) -> Self {
        Self {
            address: address.to_ascii_lowercase(),
            chain_id: chain_id.to_string(),
            name: name.to_string(),
            compiler: compiler.to_string(),
            fetched_at: Some(Utc::now()),
            lib: None,
            similar: None,
            extra: Map::new(),
        }
    }

    /// Identifier used in the hash index.
    pub fn contract_id(&self) -> String {
        self.address.to_ascii_lowercase()
    }

    pub fn is_library(&self) -> bool {
        self.lib == Some(true)
    }

    /// Record a classification. `Novel` clears earlier results.
    pub fn apply_result(&mut self, result: &MatchResult) {
        self.lib = None;
        self.similar = None;
        match result {
            MatchResult::LibraryOnly => self.lib = Some(true),
            MatchResult::Duplicate { contract_id, .. } => self.similar = Some(contract_id.clone()),
            MatchResult::Novel => {}
        }
    }
}

/// Read all entries. A missing ledger is empty; malformed lines are skipped.
pub fn read_ledger(path: &Path) -> Result<Vec<ContractEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read ledger: {}", path.display()))?;

    let mut entries = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ContractEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => tracing::warn!(
                ledger = %path.display(),
                line = lineno + 1,
                error = %e,
                "skipping malformed ledger line"
            ),
        }
    }
    Ok(entries)
}

pub fn append_entry(path: &Path, entry: &ContractEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open ledger: {}", path.display()))?;
    let line = serde_json::to_string(entry)?;
    writeln!(file, "{}", line)?;
    Ok(())
}

/// Rewrite the whole ledger. Written to a sibling file first, then renamed.
pub fn write_ledger(path: &Path, entries: &[ContractEntry]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let mut out = String::new();
    for entry in entries {
        out.push_str(&serde_json::to_string(entry)?);
        out.push('\n');
    }
    std::fs::write(&tmp, out).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace ledger: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use source_sieve_core::models::Overlap;
    use tempfile::TempDir;

    #[test]
    fn test_unknown_fields_preserved() {
        let line = r#"{"address":"0xAbC","chain_id":"0x1","name":"Vault","compiler":"v0.8.19","tvl":123,"tags":["x"]}"#;
        let entry: ContractEntry = serde_json::from_str(line).unwrap();
        assert_eq!(entry.contract_id(), "0xabc");
        assert_eq!(entry.extra["tvl"], 123);

        let out = serde_json::to_string(&entry).unwrap();
        assert!(out.contains("\"tvl\":123"), "lost extra field: {}", out);
        assert!(!out.contains("lib"), "unexpected lib field: {}", out);
    }

    #[test]
    fn test_apply_result_fields() {
        let mut entry = ContractEntry::new("0x01", "0x1", "A", "v0.8.0");
        entry.apply_result(&MatchResult::LibraryOnly);
        assert!(entry.is_library());
        assert_eq!(entry.similar, None);

        entry.apply_result(&MatchResult::Duplicate {
            contract_id: "0x02".into(),
            overlap: Overlap {
                forward: 1.0,
                reverse: 1.0,
            },
        });
        assert_eq!(entry.lib, None);
        assert_eq!(entry.similar.as_deref(), Some("0x02"));

        entry.apply_result(&MatchResult::Novel);
        assert_eq!((entry.lib, entry.similar), (None, None));
    }

    #[test]
    fn test_append_read_rewrite() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("contracts").join(LEDGER_FILE);
        assert!(read_ledger(&path).unwrap().is_empty());

        append_entry(&path, &ContractEntry::new("0x01", "0x1", "A", "v1")).unwrap();
        append_entry(&path, &ContractEntry::new("0x02", "0x1", "B", "v1")).unwrap();
        std::fs::write(
            &path,
            format!("{}not json\n", std::fs::read_to_string(&path).unwrap()),
        )
        .unwrap();

        let mut entries = read_ledger(&path).unwrap();
        assert_eq!(entries.len(), 2);
        entries[1].apply_result(&MatchResult::LibraryOnly);
        write_ledger(&path, &entries).unwrap();

        let reread = read_ledger(&path).unwrap();
        assert_eq!(reread, entries);
        assert!(!path.with_extension("json.tmp").exists());
    }
}
