//! Carbon-aware scheduling
//!
//! This module obtains a carbon intensity signal (live or historical),
//! picks low-carbon windows, and decides when a deferrable workload runs.

pub mod api;
pub mod history;
pub mod scheduler;
pub mod types;
pub mod window;

pub use api::{CarbonIntensityApi, IntensitySource};
pub use history::{Aggregate, HistoricalRow, IntensityTable};
pub use scheduler::{DecisionEngine, DecisionPolicy, DecisionRequest, Signal};
pub use types::{
    Action, CarbonProvider, IntensitySample, RunMode, SchedulingDecision, SourceMode,
};
pub use window::{SelectionStage, WindowSelection, WindowSelector};
