//! Known library file filter.
//!
//! A static set of content hashes (popular files plus every released version
//! of common libraries) excluded before matching. Library files carry no
//! signal: nearly every contract shares them.

use std::collections::HashSet;

use crate::hash::{hash_of, ContentHash};

#[derive(Debug, Clone, Default)]
pub struct KnownLibraryFilter {
    hashes: HashSet<ContentHash>,
}

impl KnownLibraryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Union of the popular-files list and the library-versions list.
    pub fn from_lists<P, L>(popular: P, libraries: L) -> Self
    where
        P: IntoIterator<Item = ContentHash>,
        L: IntoIterator<Item = ContentHash>,
    {
        let mut filter = Self::new();
        filter.extend(popular);
        filter.extend(libraries);
        filter
    }

    pub fn extend<I>(&mut self, hashes: I)
    where
        I: IntoIterator<Item = ContentHash>,
    {
        self.hashes.extend(hashes);
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.hashes.contains(hash)
    }

    pub fn is_library_source(&self, source: &str) -> bool {
        self.contains(&hash_of(source))
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_lists_is_union() {
        let popular = vec![hash_of("a"), hash_of("b")];
        let libs = vec![hash_of("b"), hash_of("c")];
        let filter = KnownLibraryFilter::from_lists(popular, libs);
        assert_eq!(filter.len(), 3);
        assert!(filter.contains(&hash_of("c")));
        assert!(!filter.contains(&hash_of("d")));
    }

    #[test]
    fn test_library_source_ignores_trailing_whitespace() {
        let filter = KnownLibraryFilter::from_lists([hash_of("library SafeMath {}")], Vec::new());
        assert!(filter.is_library_source("library SafeMath {}\n\n"));
        assert!(!filter.is_library_source("library SafeMath2 {}"));
    }
}
