//! wikidat: streaming ETL of encyclopedia dumps into a relational store
//!
//! Compressed page/revision/log exports are decoded into typed records,
//! fanned out to transform workers over TCP channels and bulk-loaded in
//! large batches:
//! - Bounded-memory XML decoding with quick-xml (bzip2 in-process)
//! - Producer → processor fan-out → sink pipeline per line, one OS process
//!   or tokio task per stage
//! - Readiness and drain handshakes instead of settle delays
//! - Staged TSV bulk loads into SQLite or MySQL with isolated chunk failures

pub mod config;
pub mod import;
pub mod load;
pub mod pipeline;
pub mod storage;
pub mod transform;
pub mod transport;
pub mod types;

pub use config::Config;
pub use types::*;
