//! CLI surface (spec.md §6) and its validated form.

use clap::Parser;
use thiserror::Error;

/// Maximum MwCAS arity the descriptor engine supports
/// ([`crate::descriptor`]'s `MAX_ENTRIES`).
const MAX_ARITY: usize = 8;

#[derive(Parser, Debug)]
#[command(author, version, about = "Multi-word CAS benchmarking harness", long_about = None)]
pub struct Args {
    /// Total operations to perform across all worker threads.
    #[arg(long, default_value_t = 100_000)]
    pub num_exec: usize,

    /// Number of worker threads.
    #[arg(long, default_value_t = 4)]
    pub num_thread: usize,

    /// Size of the shared field array operations target.
    #[arg(long, default_value_t = 1_000)]
    pub num_field: usize,

    /// MwCAS arity per operation (1..=8).
    #[arg(long, default_value_t = 2)]
    pub num_target: usize,

    /// Zipf skew parameter for target field selection (0 = uniform).
    #[arg(long, default_value_t = 0.0)]
    pub skew_parameter: f64,

    /// RNG seed. Omit for a run-specific seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Run the MwCAS-based implementation.
    #[arg(long)]
    pub ours: bool,

    /// Run the PMwCAS baseline (unsupported — rejected at validation).
    #[arg(long)]
    pub pmwcas: bool,

    /// Run the single-word-CAS baseline.
    #[arg(long)]
    pub single: bool,

    /// Emit a single CSV row instead of text lines.
    #[arg(long)]
    pub csv: bool,

    /// Measure throughput instead of latency percentiles.
    #[arg(long)]
    pub throughput: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("num_thread must be positive")]
    ZeroThreads,
    #[error("num_exec must be positive")]
    ZeroExec,
    #[error("num_field must be positive")]
    ZeroField,
    #[error("num_target must be between 1 and {max}, got {got}")]
    ArityOutOfRange { got: usize, max: usize },
    #[error("num_target ({num_target}) cannot exceed num_field ({num_field}): addresses within one op must be distinct")]
    TargetsExceedFields { num_target: usize, num_field: usize },
    #[error("no implementation selected: pass --ours and/or --single")]
    NoImplementationSelected,
    #[error("--ours and --single cannot both be set: one run drives exactly one implementation's op list")]
    AmbiguousImplementation,
    #[error("PMwCAS is a comparison baseline only; this crate has no persistent-memory layer")]
    PersistentMemoryUnsupported,
}

/// Which lock-free implementation(s) a run exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Implementations {
    pub ours: bool,
    pub single: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum Mode {
    Throughput,
    Latency,
}

#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    Text,
    Csv,
}

/// A validated, run-ready configuration (spec.md §6).
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub num_exec: usize,
    pub num_thread: usize,
    pub num_field: usize,
    pub num_target: usize,
    pub skew_parameter: f64,
    pub seed: Option<u64>,
    pub implementations: Implementations,
    pub mode: Mode,
    pub output: OutputFormat,
}

impl Args {
    pub fn into_config(self) -> Result<Config, ConfigError> {
        if self.pmwcas {
            return Err(ConfigError::PersistentMemoryUnsupported);
        }
        if self.num_thread == 0 {
            return Err(ConfigError::ZeroThreads);
        }
        if self.num_exec == 0 {
            return Err(ConfigError::ZeroExec);
        }
        if self.num_field == 0 {
            return Err(ConfigError::ZeroField);
        }
        if self.num_target == 0 || self.num_target > MAX_ARITY {
            return Err(ConfigError::ArityOutOfRange {
                got: self.num_target,
                max: MAX_ARITY,
            });
        }
        if self.num_target > self.num_field {
            return Err(ConfigError::TargetsExceedFields {
                num_target: self.num_target,
                num_field: self.num_field,
            });
        }
        if !self.ours && !self.single {
            return Err(ConfigError::NoImplementationSelected);
        }
        if self.ours && self.single {
            return Err(ConfigError::AmbiguousImplementation);
        }

        Ok(Config {
            num_exec: self.num_exec,
            num_thread: self.num_thread,
            num_field: self.num_field,
            num_target: self.num_target,
            skew_parameter: self.skew_parameter,
            seed: self.seed,
            implementations: Implementations {
                ours: self.ours,
                single: self.single,
            },
            mode: if self.throughput {
                Mode::Throughput
            } else {
                Mode::Latency
            },
            output: if self.csv {
                OutputFormat::Csv
            } else {
                OutputFormat::Text
            },
        })
    }
}
