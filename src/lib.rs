//! # NSDb
//!
//! A distributed time-series database core: a time-aware SQL dialect, a
//! cluster metadata coordinator that maps metrics to time-sharded
//! locations, and the read/write coordination protocol routing statements
//! through schema validation to per-namespace data actors.
//!
//! ## Key properties
//!
//! - **Deterministic sharding**: a write's location is a pure function of
//!   its timestamp and the metric's shard interval, so locations for one
//!   metric are contiguous, non-overlapping and interval-aligned
//! - **Monotone schemas**: a metric's schema grows by field addition only;
//!   a field's type never changes once pinned
//! - **At-least-once writes**: partially delivered writes are not rolled
//!   back, and the shard index deduplicates redelivery by record identity
//!
//! ## Architecture
//!
//! - **SQL parser**: text to statement AST, `NOW` resolved at parse time
//! - **Schema actor**: validates and evolves per-metric schemas on write
//! - **Metadata coordinator**: assigns time-bucket locations, announces
//!   changes on the cluster broadcast
//! - **Write/read coordinators**: orchestrate schema, metadata and shard
//!   delivery per statement
//! - **Namespace data actor**: one indexer child per metric, periodic
//!   flush to shard segments

pub mod bit;
pub mod clock;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod index;
pub mod ingester;
pub mod metadata;
pub mod query;
pub mod schema;
pub mod sql;

mod actor;
mod error;

pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::bit::{Bit, NsdbValue, ValueType};
    pub use crate::config::NsdbConfig;
    pub use crate::engine::{Nsdb, StatementResult};
    pub use crate::ingester::InputMapped;
    pub use crate::metadata::{Location, MetricInfo};
    pub use crate::schema::Schema;
    pub use crate::sql::{SqlParser, Statement};
    pub use crate::{Error, Result};
}
