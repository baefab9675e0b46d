//! The benchmark driver (spec.md §4.7, §6): CLI surface, workload
//! generation, the two-gate barrier, and throughput/latency aggregation.

pub mod barrier;
pub mod config;
pub mod op;
pub mod run;
pub mod stats;
pub mod workload;

pub use config::{Args, Config, ConfigError};
pub use run::{run, Report};
