//! Connection, stream and server statistics.
//!
//! This module provides:
//! - Per connection byte and frame counters with windowed rate sampling
//! - Per published stream counters and metadata derived properties
//! - Server wide connection counts

pub mod metrics;

pub use metrics::{ConnectionStats, ServerStats, StatsSample, StreamStats};
