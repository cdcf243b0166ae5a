//! # Source Sieve Core
//!
//! Pure logic for Source Sieve: flattening verified contract source bundles
//! into a single directory level, rewriting their imports, and classifying
//! contracts as library-only, near-duplicate, or novel against a growing
//! content-hash index.
//!
//! This crate contains no tokio, sqlx, filesystem, or network code. Reading
//! stored contract sources goes through the [`matcher::SourceReader`] seam,
//! implemented by the `source-sieve` binary crate.
//!
//! ## Pipeline
//!
//! ```text
//! RawPayload ──▶ flatten ──▶ FlatFile set ──▶ hash ─┬─▶ library filter
//!   (disambiguate + imports)                        └─▶ matcher ◀──▶ index
//! ```

pub mod diff;
pub mod disambiguate;
pub mod flatten;
pub mod hash;
pub mod imports;
pub mod index;
pub mod library;
pub mod matcher;
pub mod models;
