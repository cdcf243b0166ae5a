//! On-disk contract store.
//!
//! Flattened files of contract `0xabcdef...` live in
//! `<contracts_dir>/ab/abcdef.../<flat_name>`. The store is also the
//! [`SourceReader`] the matcher uses to read candidates back.

use anyhow::{bail, Context, Result};
use source_sieve_core::matcher::SourceReader;
use source_sieve_core::models::{FlatContract, FlatFile};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ContractStore {
    root: PathBuf,
}

impl ContractStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn contract_dir(&self, address: &str) -> Result<PathBuf> {
        let address = address.to_ascii_lowercase();
        let hex = address.strip_prefix("0x").unwrap_or(&address);
        if hex.len() < 2 || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            bail!("Invalid contract address: '{}'", address);
        }
        Ok(self.root.join(&hex[..2]).join(hex))
    }

    pub fn exists(&self, address: &str) -> bool {
        self.contract_dir(address).map(|d| d.exists()).unwrap_or(false)
    }

    /// Write every file of `contract`. Returns the number of files written.
    ///
    /// Either the whole contract lands on disk or its directory is left absent,
    /// so [`exists`](Self::exists) never reports a partial write.
    pub fn write_contract(&self, address: &str, contract: &FlatContract) -> Result<usize> {
        let dir = self.contract_dir(address)?;
        write_files(&dir, &contract.files)
    }

    /// File contents of a stored contract, ordered by file name.
    pub fn read_files(&self, address: &str) -> Result<Vec<String>> {
        let dir = self.contract_dir(address)?;
        let mut paths: Vec<PathBuf> = std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect();
        paths.sort();

        paths
            .iter()
            .map(|path| {
                std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))
            })
            .collect()
    }
}

impl SourceReader for ContractStore {
    fn read_sources(&self, contract_id: &str) -> Result<Vec<String>> {
        self.read_files(contract_id)
    }
}

fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\'])
}

/// Write flat files into `dir`, creating it if needed.
///
/// Every name is checked before anything touches the disk. If a write fails
/// and `dir` did not exist beforehand, it is removed again.
pub fn write_files(dir: &Path, files: &[FlatFile]) -> Result<usize> {
    if let Some(file) = files.iter().find(|f| !is_safe_file_name(&f.flat_name)) {
        bail!("Refusing to write file named '{}'", file.flat_name);
    }

    let created = !dir.exists();
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let result = files.iter().try_for_each(|file| {
        let path = dir.join(&file.flat_name);
        std::fs::write(&path, &file.content)
            .with_context(|| format!("Failed to write {}", path.display()))
    });
    if let Err(e) = result {
        if created {
            if let Err(cleanup) = std::fs::remove_dir_all(dir) {
                tracing::warn!(
                    dir = %dir.display(),
                    error = %cleanup,
                    "failed to remove partially written directory"
                );
            }
        }
        return Err(e);
    }
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn contract(files: &[(&str, &str)]) -> FlatContract {
        FlatContract {
            name: "Vault".into(),
            compiler_version: "v0.8.19".into(),
            files: files
                .iter()
                .map(|(name, content)| FlatFile {
                    flat_name: name.to_string(),
                    content: content.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_directory_layout() {
        let store = ContractStore::new("/data");
        assert_eq!(
            store.contract_dir("0xABCDEF01").unwrap(),
            PathBuf::from("/data/ab/abcdef01")
        );
        assert!(store.contract_dir("0x").is_err());
        assert!(store.contract_dir("0x../..").is_err());
        assert!(store.contract_dir("0x..").is_err());
        assert!(store.contract_dir("0xab.cd").is_err());
        assert!(!store.exists("0x.."));
    }

    #[test]
    fn test_write_then_read_sorted() {
        let tmp = TempDir::new().unwrap();
        let store = ContractStore::new(tmp.path());
        assert!(!store.exists("0xabc1"));

        let written = store
            .write_contract("0xabc1", &contract(&[("Z.sol", "contract Z {}"), ("A.sol", "contract A {}")]))
            .unwrap();
        assert_eq!(written, 2);
        assert!(store.exists("0xABC1"));
        assert_eq!(
            store.read_sources("0xabc1").unwrap(),
            vec!["contract A {}".to_string(), "contract Z {}".to_string()]
        );
    }

    #[test]
    fn test_missing_contract_is_error() {
        let tmp = TempDir::new().unwrap();
        let store = ContractStore::new(tmp.path());
        assert!(store.read_sources("0xdead").is_err());
    }

    #[test]
    fn test_unsafe_names_rejected() {
        let tmp = TempDir::new().unwrap();
        let result = write_files(
            tmp.path(),
            &[FlatFile {
                flat_name: "..".into(),
                content: String::new(),
            }],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejected_contract_leaves_nothing_behind() {
        let tmp = TempDir::new().unwrap();
        let store = ContractStore::new(tmp.path());
        let bad = contract(&[("A.sol", "contract A {}"), ("..", "contract B {}")]);

        assert!(store.write_contract("0xabcd", &bad).is_err());
        assert!(!store.exists("0xabcd"));
        assert!(!tmp.path().join("ab").join("abcd").exists());

        let good = contract(&[("A.sol", "contract A {}")]);
        assert_eq!(store.write_contract("0xabcd", &good).unwrap(), 1);
        assert!(store.exists("0xabcd"));
    }

    #[test]
    fn test_failed_write_keeps_existing_directory() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("out");
        // A directory where a file should go makes the second write fail.
        std::fs::create_dir_all(out.join("B.sol")).unwrap();

        let files = [
            FlatFile {
                flat_name: "A.sol".into(),
                content: "contract A {}".into(),
            },
            FlatFile {
                flat_name: "B.sol".into(),
                content: "contract B {}".into(),
            },
        ];
        assert!(write_files(&out, &files).is_err());
        assert!(out.join("B.sol").is_dir());
    }
}
