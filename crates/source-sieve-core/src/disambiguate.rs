//! Flat file-name assignment for hierarchical bundle paths.
//!
//! Explorer bundles address files by paths such as
//! `@openzeppelin/contracts/token/ERC20/ERC20.sol`. Flattening keeps only the
//! basename unless two paths share it, in which case the colliding paths are
//! extended leftward one segment at a time (`ERC20_ERC20.sol`,
//! `token_ERC20_ERC20.sol`, ...) until each is unique.
//!
//! Names that are still colliding at a given depth are never reserved, so a
//! candidate tried at one depth is free again at the next. Paths that still
//! collide after [`MAX_EXTRA_SEGMENTS`] fall back to the full joined path with
//! a numeric suffix if needed, so the assignment is total.
//!
//! Every flat name is a single segment: never empty, `.` or `..`, and free of
//! path separators and literal delimiters.

use std::collections::{HashMap, HashSet};

use crate::imports::{LITERAL_DELIMITERS, PATH_SEPARATORS};

/// Maximum number of parent segments added in front of a colliding basename.
pub const MAX_EXTRA_SEGMENTS: usize = 8;

const SEGMENT_JOINER: &str = "_";

/// Name given to keys with no usable segment, such as `/` or `lib/..`.
pub const UNNAMED_FILE: &str = "unnamed.sol";

/// Mapping from original bundle path to its flat name, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct NameAssignment {
    entries: Vec<(String, String)>,
    by_key: HashMap<String, usize>,
    flat_names: HashSet<String>,
}

impl NameAssignment {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.by_key.get(key).map(|&i| self.entries[i].1.as_str())
    }

    /// `(path key, flat name)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn has_flat_name(&self, name: &str) -> bool {
        self.flat_names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Flat name of the key sharing the longest common segment suffix with
    /// `reference`. Ties go to the first declared key; `None` when no key
    /// shares even the last segment.
    pub fn resolve(&self, reference: &[&str]) -> Option<&str> {
        let mut best: Option<(&str, usize)> = None;
        for (key, flat) in self.iter() {
            let key_segments: Vec<&str> = key.split(PATH_SEPARATORS).collect();
            let score = common_suffix_len(&key_segments, reference);
            if score > best.map_or(0, |(_, s)| s) {
                best = Some((flat, score));
            }
        }
        best.map(|(flat, _)| flat)
    }

    fn push(&mut self, key: String, flat: String) {
        self.by_key.insert(key.clone(), self.entries.len());
        self.flat_names.insert(flat.clone());
        self.entries.push((key, flat));
    }
}

fn common_suffix_len(a: &[&str], b: &[&str]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Keep only printable ASCII (`0x20..=0x7E`). Path separators and literal
/// delimiters become `_`.
pub fn clean_name(name: &str) -> String {
    name.chars()
        .filter(|c| (' '..='~').contains(c))
        .map(|c| {
            if PATH_SEPARATORS.contains(&c) || LITERAL_DELIMITERS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

fn segments_of(key: &str) -> Vec<String> {
    let segments: Vec<String> = key
        .split(PATH_SEPARATORS)
        .map(clean_name)
        .filter(|s| !s.is_empty() && s != "." && s != "..")
        .collect();
    if segments.is_empty() {
        vec![UNNAMED_FILE.to_string()]
    } else {
        segments
    }
}

fn join_tail(segments: &[String], depth: usize) -> String {
    let start = segments.len().saturating_sub(depth);
    segments[start..].join(SEGMENT_JOINER)
}

/// First variant of `name` not in `taken`: `name`, then `stem_1.ext`, ...
fn unique_variant(name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(pos) if pos > 0 => (&name[..pos], &name[pos..]),
        _ => (name, ""),
    };
    (1..)
        .map(|n| format!("{}{}{}{}", stem, SEGMENT_JOINER, n, ext))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_default()
}

/// Assign a unique flat name to every distinct key.
///
/// Duplicate keys are assigned once (first occurrence). The result is a
/// bijection from distinct keys to names and depends only on the input order.
pub fn assign_flat_names<'a, I>(keys: I) -> NameAssignment
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    let keys: Vec<&str> = keys.into_iter().filter(|k| seen.insert(*k)).collect();
    let segments: Vec<Vec<String>> = keys.iter().map(|k| segments_of(k)).collect();

    let mut basename_counts: HashMap<String, usize> = HashMap::new();
    for segs in &segments {
        *basename_counts.entry(join_tail(segs, 1)).or_default() += 1;
    }

    let mut names: Vec<Option<String>> = vec![None; keys.len()];
    let mut taken: HashSet<String> = HashSet::new();
    let mut pending = Vec::new();

    for (i, segs) in segments.iter().enumerate() {
        let basename = join_tail(segs, 1);
        if basename_counts[&basename] == 1 {
            taken.insert(basename.clone());
            names[i] = Some(basename);
        } else {
            pending.push(i);
        }
    }

    for depth in 2..=MAX_EXTRA_SEGMENTS + 1 {
        if pending.is_empty() {
            break;
        }
        let candidates: Vec<(usize, String)> = pending
            .iter()
            .map(|&i| (i, join_tail(&segments[i], depth)))
            .collect();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for (_, name) in &candidates {
            *counts.entry(name.as_str()).or_default() += 1;
        }

        let mut still_colliding = Vec::new();
        for (i, name) in &candidates {
            if counts[name.as_str()] == 1 && !taken.contains(name) {
                taken.insert(name.clone());
                names[*i] = Some(name.clone());
            } else {
                still_colliding.push(*i);
            }
        }
        pending = still_colliding;
    }

    for i in pending {
        let full = segments[i].join(SEGMENT_JOINER);
        let name = unique_variant(&full, &taken);
        tracing::warn!(
            key = keys[i],
            name = %name,
            "path collision not resolved within {} segments, using full path",
            MAX_EXTRA_SEGMENTS + 1
        );
        taken.insert(name.clone());
        names[i] = Some(name);
    }

    let mut assignment = NameAssignment::default();
    for (key, name) in keys.into_iter().zip(names) {
        assignment.push(key.to_string(), name.unwrap_or_default());
    }
    assignment
}
