//! Core data models shared by the flattener and the matcher.
//!
//! These types describe what flows through one ingestion call: the raw
//! explorer payload, the flattened file set, and the classification that
//! ends up on the contract's ledger line.

use serde::{Deserialize, Serialize};

/// Raw `getsourcecode` result as returned by a block explorer.
///
/// `source_code` is either a plain Solidity file or a JSON-encoded file map,
/// frequently wrapped in a redundant pair of braces.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawPayload {
    #[serde(rename = "SourceCode", default)]
    pub source_code: String,
    #[serde(rename = "ContractName", default)]
    pub contract_name: String,
    #[serde(rename = "CompilerVersion", default)]
    pub compiler_version: String,
}

/// A single file after flattening. `flat_name` has no path separators and is
/// unique within its contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatFile {
    pub flat_name: String,
    pub content: String,
}

/// A flattened contract ready to be written to disk.
#[derive(Debug, Clone)]
pub struct FlatContract {
    pub name: String,
    pub compiler_version: String,
    pub files: Vec<FlatFile>,
}

/// Result of flattening one payload.
#[derive(Debug, Clone)]
pub enum FlattenOutcome {
    Flattened(FlatContract),
    /// The payload carried no source at all.
    Empty,
    /// The payload is for a language other than Solidity.
    Discarded,
}

impl FlattenOutcome {
    pub fn into_contract(self) -> Option<FlatContract> {
        match self {
            FlattenOutcome::Flattened(contract) => Some(contract),
            FlattenOutcome::Empty | FlattenOutcome::Discarded => None,
        }
    }
}

/// Hash overlap between a new contract and a stored candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlap {
    /// Share of the candidate's files also present in the new contract.
    pub forward: f64,
    /// Share of the new contract's files also present in the candidate.
    pub reverse: f64,
}

impl Overlap {
    pub fn combined(&self) -> f64 {
        self.forward + self.reverse
    }
}

/// Classification of one contract.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchResult {
    /// Every file is a known library file.
    LibraryOnly,
    /// Exact or near-duplicate of a stored contract.
    Duplicate { contract_id: String, overlap: Overlap },
    Novel,
}

impl MatchResult {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, MatchResult::Duplicate { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            MatchResult::LibraryOnly => "library-only",
            MatchResult::Duplicate { .. } => "duplicate",
            MatchResult::Novel => "novel",
        }
    }
}
