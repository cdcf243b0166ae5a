//! Fetch and flatten pipelines.
//!
//! `sieve fetch` reads a JSON-lines file of `{"address": ...}` objects,
//! downloads each contract not yet on disk (bounded by
//! `fetch.concurrency`), flattens it, writes its files through
//! [`ContractStore`] and appends a ledger line. `sieve flatten` does the
//! flattening step alone for one saved payload.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use source_sieve_core::flatten::flatten_payload;
use source_sieve_core::models::{FlatContract, FlattenOutcome, RawPayload};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::config::Config;
use crate::explorer::{self, ExplorerClient};
use crate::ledger::{self, ContractEntry};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::store::{self, ContractStore};

/// One line of the fetch input. Extra fields are copied to the ledger.
#[derive(Debug, Deserialize)]
struct InputLine {
    address: String,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Distinct, lowercased input lines in file order.
fn read_input(path: &Path) -> Result<Vec<InputLine>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read input: {}", path.display()))?;
    let mut seen = HashSet::new();
    let mut lines = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<InputLine>(line) {
            Ok(mut input) => {
                input.address = input.address.to_ascii_lowercase();
                if seen.insert(input.address.clone()) {
                    lines.push(input);
                }
            }
            Err(e) => tracing::warn!(line = lineno + 1, error = %e, "skipping malformed input line"),
        }
    }
    Ok(lines)
}

enum Fetched {
    NoPayload,
    Empty,
    Discarded,
    Flattened(FlatContract),
}

async fn fetch_one(client: &ExplorerClient, address: &str) -> Fetched {
    let Some(payload) = client.get_raw_source(address).await else {
        return Fetched::NoPayload;
    };
    match flatten_payload(&payload) {
        FlattenOutcome::Flattened(contract) => Fetched::Flattened(contract),
        FlattenOutcome::Empty => Fetched::Empty,
        FlattenOutcome::Discarded => Fetched::Discarded,
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct FetchSummary {
    pub addresses: u64,
    pub skipped_existing: u64,
    pub no_payload: u64,
    pub empty: u64,
    pub discarded: u64,
    pub stored: u64,
    pub files_written: u64,
    pub failed: u64,
}

/// Download, flatten and store every new address of `input`.
pub async fn fetch_contracts(
    config: &Config,
    input: &Path,
    chain_id: &str,
    limit: Option<usize>,
    reporter: &dyn ProgressReporter,
) -> Result<FetchSummary> {
    let client = ExplorerClient::new(config.chain(chain_id)?, &config.fetch)?;
    let store = ContractStore::new(&config.storage.contracts_dir);
    let ledger_path = config.ledger_path();

    let mut lines = read_input(input)?;
    if let Some(lim) = limit {
        lines.truncate(lim);
    }

    let mut summary = FetchSummary {
        addresses: lines.len() as u64,
        ..FetchSummary::default()
    };
    let total = summary.addresses;
    let mut done = 0u64;

    let semaphore = Arc::new(Semaphore::new(config.fetch.concurrency));
    let mut tasks = JoinSet::new();
    for line in lines {
        if store.exists(&line.address) {
            tracing::debug!(address = %line.address, "already stored, skipping");
            summary.skipped_existing += 1;
            done += 1;
            continue;
        }
        let client = client.clone();
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            // The semaphore is never closed.
            let _permit = semaphore.acquire_owned().await.ok();
            let fetched = fetch_one(&client, &line.address).await;
            (line, fetched)
        });
    }
    reporter.report(ProgressEvent::Fetching {
        chain_id: chain_id.to_string(),
        n: done,
        total,
    });

    while let Some(joined) = tasks.join_next().await {
        let (line, fetched) = joined.context("fetch task panicked")?;
        match fetched {
            Fetched::NoPayload => summary.no_payload += 1,
            Fetched::Empty => summary.empty += 1,
            Fetched::Discarded => summary.discarded += 1,
            Fetched::Flattened(contract) => {
                match store.write_contract(&line.address, &contract) {
                    Ok(files) => {
                        let mut entry = ContractEntry::new(
                            &line.address,
                            chain_id,
                            &contract.name,
                            &contract.compiler_version,
                        );
                        entry.extra = line.extra;
                        for key in ledger::RESERVED_FIELDS {
                            entry.extra.remove(*key);
                        }
                        ledger::append_entry(&ledger_path, &entry)?;
                        summary.stored += 1;
                        summary.files_written += files as u64;
                    }
                    Err(e) => {
                        tracing::warn!(address = %line.address, error = %e, "failed to store contract");
                        summary.failed += 1;
                    }
                }
            }
        }
        done += 1;
        reporter.report(ProgressEvent::Fetching {
            chain_id: chain_id.to_string(),
            n: done,
            total,
        });
    }

    Ok(summary)
}

/// `sieve fetch`.
pub async fn run_fetch(
    config: &Config,
    input: &Path,
    chain_id: &str,
    limit: Option<usize>,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    let s = fetch_contracts(config, input, chain_id, limit, reporter).await?;

    println!("fetch {}", chain_id);
    println!("  addresses: {}", s.addresses);
    println!("  skipped (already stored): {}", s.skipped_existing);
    println!("  no payload: {}", s.no_payload);
    println!("  empty source: {}", s.empty);
    println!("  non-solidity: {}", s.discarded);
    println!("  failed to store: {}", s.failed);
    println!("  stored contracts: {}", s.stored);
    println!("  files written: {}", s.files_written);
    println!("ok");
    Ok(())
}

/// Read a saved payload: either a bare `{SourceCode, ...}` object or a whole
/// `getsourcecode` response.
fn read_payload(path: &Path) -> Result<RawPayload> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read payload: {}", path.display()))?;
    let json: Value = serde_json::from_str(&content)
        .with_context(|| format!("Payload is not JSON: {}", path.display()))?;
    if let Some(payload) = explorer::parse_response(&json) {
        return Ok(payload);
    }
    serde_json::from_value(json)
        .with_context(|| format!("Payload has no source fields: {}", path.display()))
}

/// `sieve flatten`: flatten one saved payload into `output`.
pub fn run_flatten(payload_path: &Path, output: &Path) -> Result<()> {
    let payload = read_payload(payload_path)?;
    let contract = match flatten_payload(&payload) {
        FlattenOutcome::Flattened(contract) => contract,
        FlattenOutcome::Empty => bail!("Payload carries no source code; nothing written"),
        FlattenOutcome::Discarded => bail!("Payload is not Solidity; nothing written"),
    };

    let written = store::write_files(output, &contract.files)?;
    println!("flatten {}", contract.name);
    println!("  compiler: {}", contract.compiler_version);
    for file in &contract.files {
        println!("  {}", file.flat_name);
    }
    println!("  files written: {} to {}", written, output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer every request with the payload whose address appears in the URL.
    async fn explorer_stub(payloads: Vec<(&'static str, Value)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let request = String::from_utf8_lossy(&buf[..n]).to_string();
                let result = payloads
                    .iter()
                    .find(|(address, _)| request.contains(address))
                    .map(|(_, payload)| serde_json::json!([payload]))
                    .unwrap_or_else(|| Value::String("Contract source code not verified".into()));
                let body = serde_json::json!({ "status": "1", "result": result }).to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}/api?module=contract&action=getsourcecode", addr)
    }

    fn config_for(root: &Path, endpoint: &str) -> Config {
        let src = format!(
            "[storage]\ncontracts_dir = \"{root}/contracts\"\ndb_path = \"{root}/sieve.sqlite\"\n\n[fetch]\nconcurrency = 2\nmax_retries = 0\nretry_delay_secs = 0\n\n[chains.\"0x1\"]\nendpoint = \"{endpoint}\"\napi_key = \"k\"\n",
            root = root.display(),
            endpoint = endpoint
        );
        toml::from_str(&src).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_stores_and_skips() {
        let bundle = serde_json::json!({
            "language": "Solidity",
            "sources": {
                "src/Vault.sol": { "content": "import \"../lib/Math.sol\";\ncontract Vault {}" },
                "lib/Math.sol": { "content": "library Math {}" }
            }
        });
        let endpoint = explorer_stub(vec![
            (
                "0xaaaa01",
                serde_json::json!({
                    "SourceCode": format!("{{{}}}", bundle),
                    "ContractName": "Vault",
                    "CompilerVersion": "v0.8.19"
                }),
            ),
            (
                "0xbbbb02",
                serde_json::json!({ "SourceCode": "", "ContractName": "", "CompilerVersion": "" }),
            ),
        ])
        .await;

        let tmp = TempDir::new().unwrap();
        let config = config_for(tmp.path(), &endpoint);
        let input = tmp.path().join("input.jsonl");
        std::fs::write(
            &input,
            "{\"address\": \"0xAAAA01\", \"tvl\": 10}\n{\"address\": \"0xbbbb02\"}\n{\"address\": \"0xcccc03\"}\n{\"address\": \"0xaaaa01\"}\n",
        )
        .unwrap();

        let summary = fetch_contracts(&config, &input, "0x1", None, &NoProgress)
            .await
            .unwrap();
        assert_eq!(
            summary,
            FetchSummary {
                addresses: 3,
                empty: 1,
                no_payload: 1,
                stored: 1,
                files_written: 2,
                ..FetchSummary::default()
            }
        );

        let dir = tmp.path().join("contracts").join("aa").join("aaaa01");
        let vault = std::fs::read_to_string(dir.join("Vault.sol")).unwrap();
        assert_eq!(vault, "import \"./Math.sol\";\ncontract Vault {}");

        let entries = ledger::read_ledger(&config.ledger_path()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].address, "0xaaaa01");
        assert_eq!(entries[0].name, "Vault");
        assert_eq!(entries[0].extra["tvl"], 10);

        let again = fetch_contracts(&config, &input, "0x1", Some(1), &NoProgress)
            .await
            .unwrap();
        assert_eq!(again.skipped_existing, 1);
        assert_eq!(ledger::read_ledger(&config.ledger_path()).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_unknown_chain_fails() {
        let tmp = TempDir::new().unwrap();
        let config = config_for(tmp.path(), "http://127.0.0.1:9/api?x=y");
        let input = tmp.path().join("input.jsonl");
        std::fs::write(&input, "").unwrap();
        assert!(fetch_contracts(&config, &input, "0x89", None, &NoProgress)
            .await
            .is_err());
    }

    #[test]
    fn test_flatten_accepts_response_or_payload() {
        let tmp = TempDir::new().unwrap();
        let response = tmp.path().join("response.json");
        std::fs::write(
            &response,
            r#"{"status":"1","result":[{"SourceCode":"contract A {}","ContractName":"A","CompilerVersion":"v1"}]}"#,
        )
        .unwrap();
        let out = tmp.path().join("out");
        run_flatten(&response, &out).unwrap();
        assert_eq!(std::fs::read_to_string(out.join("A.sol")).unwrap(), "contract A {}");

        let bare = tmp.path().join("bare.json");
        std::fs::write(&bare, r#"{"SourceCode":"","ContractName":"B"}"#).unwrap();
        assert!(run_flatten(&bare, &tmp.path().join("out2")).is_err());
    }
}
