//! # Source Sieve
//!
//! Fetch verified smart-contract sources from block explorers, flatten each
//! bundle into a single directory level, and sieve out library-only and
//! near-duplicate contracts before they reach downstream analysis.
//!
//! The algorithms live in [`source_sieve_core`]; this crate is the glue
//! around them: configuration, the explorer client, on-disk storage, SQLite
//! persistence of the hash index, and the `sieve` CLI pipelines.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌──────────────────┐
//! │ Explorer │──▶│  flatten  │──▶│ contracts/ab/... │
//! │   API    │   │  (core)   │   │ + contracts.json │
//! └──────────┘   └───────────┘   └────────┬─────────┘
//!                                         ▼
//!                ┌───────────┐   ┌──────────────────┐
//!                │  SQLite   │◀─▶│  match (core)    │
//!                │  hashes   │   │  lib / similar   │
//!                └───────────┘   └──────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sieve init
//! sieve hashes --root ./openzeppelin-contracts/contracts --output ./data/oz_hashes.json
//! sieve fetch --input addresses.jsonl --chain-id 0x1
//! sieve match
//! sieve stats
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`explorer`] | `getsourcecode` client with bounded retry |
//! | [`store`] | Per-contract directory layout |
//! | [`ledger`] | `contracts.json` metadata lines |
//! | [`ingest`] | `fetch` and `flatten` pipelines |
//! | [`matching`] | `match` pipeline |
//! | [`libraries`] | Known-library hash lists |
//! | [`index_store`] | Hash index persistence |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod explorer;
pub mod index_store;
pub mod ingest;
pub mod ledger;
pub mod libraries;
pub mod matching;
pub mod migrate;
pub mod progress;
pub mod stats;
pub mod store;
