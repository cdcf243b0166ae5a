//! Bundle flattening.
//!
//! Turns a raw explorer payload into a flat file set: parses the (usually
//! double-brace wrapped) JSON file map, assigns flat names with
//! [`assign_flat_names`], strips the explorer's verification header, and
//! rewrites imports so they resolve against the flat names.
//!
//! Flattening never fails. Payloads without usable source come back as
//! [`FlattenOutcome::Empty`], non-Solidity payloads as
//! [`FlattenOutcome::Discarded`]; the caller skips those contracts.

use serde_json::{Map, Value};

use crate::disambiguate::{assign_flat_names, clean_name};
use crate::imports::{collapse_multiline_imports, rewrite_imports};
use crate::models::{FlatContract, FlatFile, FlattenOutcome, RawPayload};

/// Phrase opening the comment block explorers prepend to verified sources.
pub const VERIFICATION_MARKER: &str = "Submitted for verification at ";

/// The marker must appear within this many leading characters.
const HEADER_WINDOW_CHARS: usize = 70;

const EXPECTED_LANGUAGE: &str = "Solidity";
const DEFAULT_CONTRACT_NAME: &str = "Contract";

/// Drop the explorer's verification comment if it opens the file.
///
/// Everything up to and including the first `*/`, plus the line breaks right
/// after it, is removed.
pub fn strip_verification_header(source: &str) -> &str {
    let window_end = source
        .char_indices()
        .nth(HEADER_WINDOW_CHARS)
        .map(|(i, _)| i)
        .unwrap_or(source.len());
    if !source[..window_end].contains(VERIFICATION_MARKER) {
        return source;
    }
    match source.find("*/") {
        Some(pos) => source[pos + 2..].trim_start_matches(|c| c == '\r' || c == '\n'),
        None => source,
    }
}

fn unwrap_double_braces(raw: &str) -> &str {
    if raw.starts_with("{{") {
        raw.strip_prefix('{')
            .and_then(|s| s.strip_suffix('}'))
            .unwrap_or(raw)
    } else {
        raw
    }
}

/// Flatten one explorer payload.
pub fn flatten_payload(payload: &RawPayload) -> FlattenOutcome {
    let raw = payload.source_code.as_str();
    match serde_json::from_str::<Value>(unwrap_double_braces(raw)) {
        Ok(Value::Object(map)) => flatten_bundle(payload, &map),
        Ok(_) => flatten_single(payload),
        Err(e) if raw.trim_start().starts_with('{') => {
            tracing::warn!(
                contract = %payload.contract_name,
                error = %e,
                "malformed source bundle JSON"
            );
            FlattenOutcome::Empty
        }
        Err(_) => flatten_single(payload),
    }
}

fn contract_file_name(contract_name: &str) -> String {
    let name = clean_name(contract_name);
    if name.is_empty() {
        format!("{}.sol", DEFAULT_CONTRACT_NAME)
    } else {
        format!("{}.sol", name)
    }
}

fn flatten_single(payload: &RawPayload) -> FlattenOutcome {
    if payload.source_code.is_empty() {
        return FlattenOutcome::Empty;
    }
    FlattenOutcome::Flattened(FlatContract {
        name: payload.contract_name.clone(),
        compiler_version: payload.compiler_version.clone(),
        files: vec![FlatFile {
            flat_name: contract_file_name(&payload.contract_name),
            content: strip_verification_header(&payload.source_code).to_string(),
        }],
    })
}

fn flatten_bundle(payload: &RawPayload, map: &Map<String, Value>) -> FlattenOutcome {
    if let Some(language) = map.get("language").and_then(Value::as_str) {
        if language != EXPECTED_LANGUAGE {
            tracing::debug!(
                contract = %payload.contract_name,
                language,
                "discarding non-Solidity bundle"
            );
            return FlattenOutcome::Discarded;
        }
    }

    let root = match map.get("sources") {
        Some(Value::Object(sources)) => sources,
        _ => map,
    };

    let mut sources: Vec<(&str, &str)> = Vec::with_capacity(root.len());
    for (key, entry) in root {
        match entry.get("content").and_then(Value::as_str) {
            Some(content) => sources.push((key.as_str(), content)),
            None => tracing::warn!(
                contract = %payload.contract_name,
                key = %key,
                "bundle entry has no string content, skipping"
            ),
        }
    }
    if sources.is_empty() {
        return FlattenOutcome::Empty;
    }

    let assignment = assign_flat_names(sources.iter().map(|(key, _)| *key));

    let files = sources
        .iter()
        .map(|(key, content)| {
            let content = strip_verification_header(content);
            let content = collapse_multiline_imports(content);
            FlatFile {
                flat_name: assignment.get(key).unwrap_or_default().to_string(),
                content: rewrite_imports(&content, Some(&assignment)),
            }
        })
        .collect();

    FlattenOutcome::Flattened(FlatContract {
        name: payload.contract_name.clone(),
        compiler_version: payload.compiler_version.clone(),
        files,
    })
}
