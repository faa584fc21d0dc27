//! sysprobe-core: system and process telemetry from kernel interfaces.
//!
//! Provides:
//! - `collector`: `/proc` readers, the `FileSystem` seam, `SystemSampler`
//! - `os`: native calls behind the `OsQuery` trait
//! - `sample`: typed system samples (CPU, memory, disks, network, sockets)
//! - `rates`: pure functions turning two samples into percentages and rates
//! - `rate_cache`: "since last call" CPU utilization (`CpuMonitor`)
//! - `process`: pid-reuse-safe process handles over a platform capability
//! - `error`: the crate-wide `Error`

pub mod collector;
pub mod error;
pub mod os;
pub mod process;
pub mod rate_cache;
pub mod rates;
pub mod sample;

pub use error::{Error, Result};
