#![forbid(unsafe_code)]

//! Core library for `opx`, the OPEX/PAX ingest preparation pipeline.
//!
//! A run starts from a flat drop of preservation masters plus a staging
//! area of zipped access bundles, and ends with one `.pax.zip` package
//! and one `.opex` sidecar per archival object, ready for Preservica's
//! OPEX incremental ingest.
//!
//! Everything here operates on a project root directory. The root holds
//! the run's bookkeeping (`run_state.json`, `validation_error_log.txt`,
//! `access_ids.txt`) and exactly one working container directory per
//! run. Stages are separate CLI invocations, so every function re-reads
//! whatever state it needs from disk rather than carrying it in memory.
//!
//! # Conventions
//!
//! - Fail-fast errors (typed per module) mean the tree is in a state an
//!   operator must inspect; nothing attempts automatic repair.
//! - Per-asset and per-bundle failures are counted into `*Report`
//!   structs and logged, never escalated, so one bad delivery cannot
//!   stall the rest of the batch.
//! - Mutating stages take the advisory [`lock::RunLock`] first.

pub mod bag;
pub mod bundle;
pub mod config;
pub mod container;
pub mod errorlog;
pub mod group;
pub mod lock;
pub mod merge;
pub mod opex;
pub mod pax;
pub mod reconcile;
pub mod state;
pub mod xml;
