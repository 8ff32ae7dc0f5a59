//! Gateway-to-store reflection: idempotent upserts for every observed
//! event, batched writes, resumable backfill, attachment URL refresh and a
//! circuit breaker that pauses ingestion when the store misbehaves.

pub mod adapter;
pub mod backfill;
pub mod batch;
pub mod breaker;
pub mod error;
pub mod ingest;
pub mod refresh;

pub use error::IndexError;
pub use ingest::{IndexEvent, Indexer};
