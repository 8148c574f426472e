//! psytk-extract - Aggregate PsyToolkit behavioral-task results
//!
//! Turns a PsyToolkit results export into one table per experiment through a
//! deterministic pipeline: input preparation → participant resolution →
//! task-specific parsing → pivot → table output.
//!
//! ## Modules
//!
//! - **Tasks**: raw-format parsers for the digit-span, flanker and n-back tasks
//! - **Resolver**: maps participants to their raw result files via `data.csv`
//! - **Table / Pipeline**: pivots parsed metrics into per-task tables

pub mod archive;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod resolver;
pub mod table;
pub mod tasks;
pub mod types;

pub use config::{ExtractConfig, FailurePolicy};
pub use error::ExtractError;
pub use pipeline::{extract_results, Extractor, RunReport};
pub use table::{pivot, unpivot, AggregatedTable, TaskSchemas};
pub use tasks::{TaskKind, TaskParser, TaskRegistry};
pub use types::{MetricRecord, MetricValue};

/// Crate version reported in run reports
pub const EXTRACT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported in run reports
pub const PRODUCER_NAME: &str = "psytk-extract";
