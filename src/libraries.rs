//! Known-library hash lists.
//!
//! A hash list is a JSON array of hex content hashes. Two lists feed the
//! [`KnownLibraryFilter`]: popular files and library versions. `sieve hashes`
//! builds such a list from a checked-out library tree.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use source_sieve_core::hash::{hash_of, ContentHash};
use source_sieve_core::library::KnownLibraryFilter;
use std::collections::BTreeSet;
use std::path::Path;
use walkdir::WalkDir;

use crate::config::Config;

pub const DEFAULT_INCLUDE: &str = "**/*.sol";

pub fn load_hash_list(path: &Path) -> Result<Vec<ContentHash>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read hash list: {}", path.display()))?;
    let hashes: Vec<String> = serde_json::from_str(&content)
        .with_context(|| format!("Hash list is not a JSON array of strings: {}", path.display()))?;
    Ok(hashes.into_iter().map(ContentHash::from_hex).collect())
}

fn load_optional(path: Option<&Path>, what: &str) -> Result<Vec<ContentHash>> {
    match path {
        Some(path) if path.exists() => load_hash_list(path),
        Some(path) => {
            tracing::warn!(list = what, path = %path.display(), "hash list not found, skipping");
            Ok(Vec::new())
        }
        None => Ok(Vec::new()),
    }
}

/// Build the filter from the configured lists.
pub fn load_filter(config: &Config) -> Result<KnownLibraryFilter> {
    let popular = load_optional(config.libraries.popular_hashes.as_deref(), "popular")?;
    let libraries = load_optional(config.libraries.library_hashes.as_deref(), "libraries")?;
    let filter = KnownLibraryFilter::from_lists(popular, libraries);
    tracing::info!(hashes = filter.len(), "known library filter loaded");
    Ok(filter)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Distinct content hashes of every matching file under `root`, sorted.
pub fn collect_hashes(
    root: &Path,
    include_globs: &[String],
    exclude_globs: &[String],
) -> Result<Vec<ContentHash>> {
    if !root.is_dir() {
        bail!("Library root does not exist: {}", root.display());
    }
    let include_set = build_globset(include_globs)?;
    let mut excludes = vec!["**/.git/**".to_string(), "**/node_modules/**".to_string()];
    excludes.extend(exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut hashes = BTreeSet::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        if exclude_set.is_match(relative) || !include_set.is_match(relative) {
            continue;
        }
        match std::fs::read_to_string(path) {
            Ok(content) => {
                hashes.insert(hash_of(&content));
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file"),
        }
    }

    Ok(hashes.into_iter().collect())
}

/// `sieve hashes`: write the hash list of a library checkout.
pub fn run_hashes(
    root: &Path,
    output: &Path,
    include_globs: &[String],
    exclude_globs: &[String],
) -> Result<()> {
    let hashes = collect_hashes(root, include_globs, exclude_globs)?;
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(&hashes)?;
    std::fs::write(output, json)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("hashes {}", root.display());
    println!("  unique file hashes: {}", hashes.len());
    println!("  written to: {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_collect_dedups_and_filters() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        write(root, "contracts/token/ERC20.sol", "contract ERC20 {}\n");
        write(root, "contracts/v4/token/ERC20.sol", "contract ERC20 {}");
        write(root, "contracts/access/Ownable.sol", "contract Ownable {}");
        write(root, "contracts/mocks/Mock.sol", "contract Mock {}");
        write(root, "README.md", "# readme");
        write(root, "node_modules/x/X.sol", "contract X {}");

        let hashes = collect_hashes(
            root,
            &[DEFAULT_INCLUDE.to_string()],
            &["**/mocks/**".to_string()],
        )
        .unwrap();
        assert_eq!(hashes.len(), 2);
        assert!(hashes.contains(&hash_of("contract ERC20 {}")));
        assert!(hashes.windows(2).all(|w| w[0] < w[1]), "not sorted");
    }

    #[test]
    fn test_written_list_loads_back() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "lib/A.sol", "library A {}");
        let out = tmp.path().join("out").join("hashes.json");
        run_hashes(tmp.path(), &out, &[DEFAULT_INCLUDE.to_string()], &[]).unwrap();

        let loaded = load_hash_list(&out).unwrap();
        assert_eq!(loaded, vec![hash_of("library A {}")]);
    }

    #[test]
    fn test_hash_list_is_lowercased() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("list.json");
        std::fs::write(&path, r#"["ABCDEF"]"#).unwrap();
        assert_eq!(load_hash_list(&path).unwrap()[0].as_str(), "abcdef");

        std::fs::write(&path, r#"{"not": "a list"}"#).unwrap();
        assert!(load_hash_list(&path).is_err());
    }

    #[test]
    fn test_missing_root_fails() {
        let tmp = TempDir::new().unwrap();
        assert!(collect_hashes(&tmp.path().join("nope"), &[DEFAULT_INCLUDE.to_string()], &[]).is_err());
    }
}
