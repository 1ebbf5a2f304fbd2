//! Storage abstractions for the flood exposure pipeline.
//!
//! Provides unified interfaces for:
//! - Object storage (S3, local filesystem or in-memory) for rasters and boundaries
//! - PostgreSQL for exposure statistics and climatology snapshots

pub mod memory;
pub mod object_store;
pub mod stats_db;

pub use self::object_store::{ObjectStorage, ObjectStorageConfig, StorageBackend, StoragePath};
pub use memory::MemoryStatsStore;
pub use stats_db::{dedupe_last_wins, PgStatsStore, StatsStore};
