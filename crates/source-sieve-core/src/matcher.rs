//! Duplicate classification against the content-hash index.
//!
//! A new contract is compared with every stored contract sharing at least one
//! non-library file hash. Candidates whose hash overlap clears the threshold in
//! both directions are confirmed either by near-total overlap or by a line diff
//! of the files that differ. Whatever the outcome (short of library-only), the
//! new contract is registered afterwards so later contracts can match it.

use std::collections::{BTreeMap, BTreeSet};

use crate::diff::all_similar;
use crate::hash::{hash_of, ContentHash};
use crate::index::ContentHashIndex;
use crate::library::KnownLibraryFilter;
use crate::models::{MatchResult, Overlap};

/// Thresholds used by [`DuplicateMatcher`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchConfig {
    /// Minimum forward and reverse overlap for a candidate (inclusive).
    pub overlap_threshold: f64,
    /// Overlap above which no diff is needed (exclusive).
    pub exact_threshold: f64,
    /// Maximum unified-diff length per combined line count (exclusive).
    pub diff_ratio: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            overlap_threshold: 0.66,
            exact_threshold: 0.99,
            diff_ratio: 0.1,
        }
    }
}

/// Reads back the file contents of a stored contract.
pub trait SourceReader {
    fn read_sources(&self, contract_id: &str) -> anyhow::Result<Vec<String>>;
}

/// A stored contract passing both overlap thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub contract_id: String,
    pub hashes: BTreeSet<ContentHash>,
    pub overlap: Overlap,
}

pub struct DuplicateMatcher<'a> {
    index: &'a ContentHashIndex,
    libraries: &'a KnownLibraryFilter,
    config: MatchConfig,
}

impl<'a> DuplicateMatcher<'a> {
    pub fn new(
        index: &'a ContentHashIndex,
        libraries: &'a KnownLibraryFilter,
        config: MatchConfig,
    ) -> Self {
        Self {
            index,
            libraries,
            config,
        }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Classify `contract_id` from its flattened file contents and register it.
    pub fn classify<R>(&self, contract_id: &str, sources: &[String], reader: &R) -> MatchResult
    where
        R: SourceReader + ?Sized,
    {
        let files = self.non_library_files(sources);
        if files.is_empty() {
            return MatchResult::LibraryOnly;
        }
        let new_hashes: BTreeSet<ContentHash> = files.keys().cloned().collect();

        let mut result = MatchResult::Novel;
        for candidate in self.candidates(contract_id, &new_hashes) {
            let exact = candidate.overlap.forward > self.config.exact_threshold
                && candidate.overlap.reverse > self.config.exact_threshold;
            if exact || self.is_near_duplicate(&candidate, &files, reader) {
                tracing::debug!(
                    contract = contract_id,
                    similar = %candidate.contract_id,
                    forward = candidate.overlap.forward,
                    reverse = candidate.overlap.reverse,
                    exact,
                    "duplicate found"
                );
                result = MatchResult::Duplicate {
                    contract_id: candidate.contract_id,
                    overlap: candidate.overlap,
                };
                break;
            }
        }

        self.index.register(contract_id, new_hashes);
        result
    }

    /// Non-library files keyed by hash. Files with identical content collapse.
    fn non_library_files<'s>(&self, sources: &'s [String]) -> BTreeMap<ContentHash, &'s str> {
        sources
            .iter()
            .map(|source| (hash_of(source), source.as_str()))
            .filter(|(hash, _)| !self.libraries.contains(hash))
            .collect()
    }

    /// Stored contracts passing both overlap thresholds, strongest combined
    /// overlap first, ties by contract id.
    pub fn candidates(
        &self,
        contract_id: &str,
        new_hashes: &BTreeSet<ContentHash>,
    ) -> Vec<Candidate> {
        let mut ids = BTreeSet::new();
        for hash in new_hashes {
            ids.extend(self.index.lookup(hash));
        }
        ids.remove(contract_id);

        let threshold = self.config.overlap_threshold;
        let mut candidates = Vec::new();
        for id in ids {
            let hashes = self.index.hashes_of(&id);
            if hashes.is_empty() {
                continue;
            }
            let shared = hashes.intersection(new_hashes).count() as f64;
            let forward = shared / hashes.len() as f64;
            if forward < threshold {
                continue;
            }
            let reverse = shared / new_hashes.len() as f64;
            if reverse < threshold {
                continue;
            }
            candidates.push(Candidate {
                contract_id: id,
                hashes,
                overlap: Overlap { forward, reverse },
            });
        }

        candidates.sort_by(|a, b| {
            b.overlap
                .combined()
                .total_cmp(&a.overlap.combined())
                .then_with(|| a.contract_id.cmp(&b.contract_id))
        });
        candidates
    }

    fn is_near_duplicate<R>(
        &self,
        candidate: &Candidate,
        files: &BTreeMap<ContentHash, &str>,
        reader: &R,
    ) -> bool
    where
        R: SourceReader + ?Sized,
    {
        let stored = match reader.read_sources(&candidate.contract_id) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!(
                    candidate = %candidate.contract_id,
                    error = %e,
                    "cannot read candidate sources, treating as not similar"
                );
                return false;
            }
        };

        let theirs: Vec<&str> = stored
            .iter()
            .map(String::as_str)
            .filter(|source| {
                let hash = hash_of(source);
                !self.libraries.contains(&hash) && !files.contains_key(&hash)
            })
            .collect();
        let ours: Vec<&str> = files
            .iter()
            .filter(|(hash, _)| !candidate.hashes.contains(*hash))
            .map(|(_, source)| *source)
            .collect();

        all_similar(&ours, &theirs, self.config.diff_ratio)
    }
}
