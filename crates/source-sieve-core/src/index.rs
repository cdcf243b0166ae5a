//! Content-hash index over previously seen contracts.
//!
//! Two maps kept in lockstep behind one [`Mutex`]:
//!
//! - forward: file hash → contracts containing a file with that hash
//! - reverse: contract → its file hashes
//!
//! Every hash in a contract's reverse entry lists that contract in its forward
//! entry and vice versa. Only [`ContentHashIndex::register`] mutates, and it
//! updates both maps under the same guard, so no reader can observe one
//! without the other.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::hash::ContentHash;

/// A contract and the set of its (non-library) file hashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractRecord {
    pub contract_id: String,
    pub file_hashes: BTreeSet<ContentHash>,
}

#[derive(Default)]
struct IndexMaps {
    by_hash: HashMap<ContentHash, BTreeSet<String>>,
    by_contract: HashMap<String, BTreeSet<ContentHash>>,
}

/// Process-wide index of contract file hashes. Safe to share across threads.
#[derive(Default)]
pub struct ContentHashIndex {
    maps: Mutex<IndexMaps>,
}

impl ContentHashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from persisted records.
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = ContractRecord>,
    {
        let index = Self::new();
        for record in records {
            index.register(&record.contract_id, record.file_hashes);
        }
        index
    }

    fn lock(&self) -> MutexGuard<'_, IndexMaps> {
        // The maps are only mutated inside `register`, which cannot panic halfway.
        self.maps.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Contracts known to contain a file with this hash.
    pub fn lookup(&self, hash: &ContentHash) -> BTreeSet<String> {
        self.lock().by_hash.get(hash).cloned().unwrap_or_default()
    }

    /// Stored file hashes of a contract; empty when unknown.
    pub fn hashes_of(&self, contract_id: &str) -> BTreeSet<ContentHash> {
        self.lock()
            .by_contract
            .get(contract_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn contains_contract(&self, contract_id: &str) -> bool {
        self.lock().by_contract.contains_key(contract_id)
    }

    /// Record `hashes` as the file set of `contract_id`.
    ///
    /// Overwrites a previous registration of the same id; hashes dropped from
    /// the set no longer list the contract.
    pub fn register<I>(&self, contract_id: &str, hashes: I)
    where
        I: IntoIterator<Item = ContentHash>,
    {
        let hashes: BTreeSet<ContentHash> = hashes.into_iter().collect();
        let mut maps = self.lock();

        if let Some(previous) = maps.by_contract.remove(contract_id) {
            for stale in previous.difference(&hashes) {
                if let Some(ids) = maps.by_hash.get_mut(stale) {
                    ids.remove(contract_id);
                    if ids.is_empty() {
                        maps.by_hash.remove(stale);
                    }
                }
            }
        }

        for hash in &hashes {
            maps.by_hash
                .entry(hash.clone())
                .or_default()
                .insert(contract_id.to_string());
        }
        maps.by_contract.insert(contract_id.to_string(), hashes);
    }

    pub fn contract_count(&self) -> usize {
        self.lock().by_contract.len()
    }

    pub fn hash_count(&self) -> usize {
        self.lock().by_hash.len()
    }

    /// Snapshot of every contract record, ordered by contract id.
    pub fn records(&self) -> Vec<ContractRecord> {
        let maps = self.lock();
        let mut records: Vec<ContractRecord> = maps
            .by_contract
            .iter()
            .map(|(id, hashes)| ContractRecord {
                contract_id: id.clone(),
                file_hashes: hashes.clone(),
            })
            .collect();
        records.sort_by(|a, b| a.contract_id.cmp(&b.contract_id));
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_of;
    use std::sync::Arc;
    use std::thread;

    fn assert_consistent(index: &ContentHashIndex) {
        let maps = index.lock();
        for (id, hashes) in &maps.by_contract {
            for h in hashes {
                assert!(
                    maps.by_hash.get(h).is_some_and(|ids| ids.contains(id)),
                    "forward entry for {} missing {}",
                    h,
                    id
                );
            }
        }
        for (h, ids) in &maps.by_hash {
            assert!(!ids.is_empty());
            for id in ids {
                assert!(
                    maps.by_contract.get(id).is_some_and(|hs| hs.contains(h)),
                    "reverse entry for {} missing {}",
                    id,
                    h
                );
            }
        }
    }

    #[test]
    fn test_unknown_lookups_are_empty() {
        let index = ContentHashIndex::new();
        assert!(index.lookup(&hash_of("x")).is_empty());
        assert!(index.hashes_of("0xabc").is_empty());
        assert!(!index.contains_contract("0xabc"));
    }

    #[test]
    fn test_register_round_trip() {
        let index = ContentHashIndex::new();
        let (a, b, c) = (hash_of("a"), hash_of("b"), hash_of("c"));
        index.register("0x1", [a.clone(), b.clone()]);
        index.register("0x2", [b.clone(), c.clone()]);

        assert_eq!(index.hashes_of("0x1"), BTreeSet::from([a.clone(), b.clone()]));
        assert_eq!(index.lookup(&a), BTreeSet::from(["0x1".to_string()]));
        assert_eq!(
            index.lookup(&b),
            BTreeSet::from(["0x1".to_string(), "0x2".to_string()])
        );
        assert_eq!(index.contract_count(), 2);
        assert_eq!(index.hash_count(), 3);
        assert_consistent(&index);
    }

    #[test]
    fn test_reregister_drops_stale_hashes() {
        let index = ContentHashIndex::new();
        let (a, b, c) = (hash_of("a"), hash_of("b"), hash_of("c"));
        index.register("0x1", [a.clone(), b.clone()]);
        index.register("0x1", [b.clone(), c.clone()]);

        assert!(index.lookup(&a).is_empty());
        assert_eq!(index.lookup(&c), BTreeSet::from(["0x1".to_string()]));
        assert_eq!(index.hash_count(), 2);
        assert_consistent(&index);
    }

    #[test]
    fn test_records_round_trip() {
        let index = ContentHashIndex::new();
        index.register("0x2", [hash_of("b")]);
        index.register("0x1", [hash_of("a"), hash_of("b")]);

        let records = index.records();
        assert_eq!(records[0].contract_id, "0x1");
        let rebuilt = ContentHashIndex::from_records(records.clone());
        assert_eq!(rebuilt.records(), records);
        assert_consistent(&rebuilt);
    }

    #[test]
    fn test_concurrent_registration_order_independent() {
        let index = Arc::new(ContentHashIndex::new());
        let shared = hash_of("shared");
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let index = Arc::clone(&index);
                let shared = shared.clone();
                thread::spawn(move || {
                    let own = hash_of(&format!("own-{}", i));
                    index.register(&format!("0x{}", i), [shared, own]);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(index.lookup(&shared).len(), 8);
        assert_eq!(index.contract_count(), 8);
        assert_eq!(index.hash_count(), 9);
        assert_consistent(&index);
    }
}
