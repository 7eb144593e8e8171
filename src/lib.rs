//! carbon-scheduler: decide when to run deferrable workloads so they draw
//! the lowest-carbon electricity, and keep an auditable record of each run.

pub mod carbon_aware;
pub mod clock;
pub mod config;
pub mod error;
pub mod evidence;
pub mod measure;
pub mod runner;
pub mod telemetry;
pub mod workload;

pub use crate::error::{Error, Result};
