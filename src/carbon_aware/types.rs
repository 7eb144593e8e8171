//! Types for carbon-aware scheduling

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Region used when neither the table nor the caller names one
pub const UNKNOWN_REGION: &str = "UNKNOWN";

/// A single carbon intensity reading
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct IntensitySample {
    /// Region identifier (e.g., "GB", "DE")
    pub region: String,
    /// Hour of day in UTC (0-23), absent when the source has no temporal dimension
    pub hour_of_day: Option<u8>,
    /// Carbon intensity in gCO2/kWh, never negative
    pub intensity_g_per_kwh: f64,
}

impl IntensitySample {
    pub fn new(region: impl Into<String>, hour_of_day: Option<u8>, intensity: f64) -> Self {
        Self {
            region: region.into(),
            hour_of_day,
            intensity_g_per_kwh: intensity,
        }
    }
}

/// What the engine decided to do with the workload
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Intensity was below threshold at the first reading
    Run,
    /// Waited, and a later reading dropped below threshold
    DeferThenRun,
    /// Ran at or above threshold because the wait budget ran out
    ForcedRun,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Action::Run => "RUN",
            Action::DeferThenRun => "DEFER_THEN_RUN",
            Action::ForcedRun => "FORCED_RUN",
        };
        f.write_str(s)
    }
}

/// Uninformed (baseline) versus carbon-aware (optimized) scheduling
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Baseline,
    Optimized,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Baseline => "baseline",
            RunMode::Optimized => "optimized",
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the intensity signal comes from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Live point reading from a provider
    Live,
    /// Historical table loaded from CSV
    Csv,
}

/// Immutable record of one scheduling attempt
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct SchedulingDecision {
    pub timestamp_utc: DateTime<Utc>,
    pub region: String,
    pub mode: RunMode,
    pub source: SourceMode,
    pub threshold_g_per_kwh: f64,
    pub horizon_hours: u32,
    /// First reading observed before any waiting
    pub naive_intensity: f64,
    /// Reading the workload actually runs under; never above `naive_intensity`
    pub chosen_intensity: f64,
    /// Total time slept while polling
    pub waited_seconds: f64,
    pub action: Action,
    /// Number of live fetches performed, including the first
    pub fetches: u32,
    /// Hour of the selected historical sample, if any
    pub selected_hour: Option<u8>,
}

impl SchedulingDecision {
    /// Absolute and relative intensity reduction versus the naive reading
    pub fn savings(&self) -> (f64, f64) {
        let absolute = self.naive_intensity - self.chosen_intensity;
        let percent = if self.naive_intensity > 0.0 {
            absolute / self.naive_intensity * 100.0
        } else {
            0.0
        };
        (absolute, percent)
    }
}

/// Carbon intensity data providers
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CarbonProvider {
    /// UK National Grid carbon intensity API
    NationalGrid {
        /// API base URL
        url: String,
    },
    /// ElectricityMap API
    ElectricityMap {
        /// API base URL
        url: String,
        /// API token
        token: String,
    },
    /// Constant reading for offline runs
    Fixed {
        /// Intensity returned on every fetch
        intensity: f64,
    },
}

impl Default for CarbonProvider {
    fn default() -> Self {
        Self::NationalGrid {
            url: "https://api.carbonintensity.org.uk".to_string(),
        }
    }
}

impl CarbonProvider {
    pub fn name(&self) -> &'static str {
        match self {
            CarbonProvider::NationalGrid { .. } => "NationalGrid",
            CarbonProvider::ElectricityMap { .. } => "ElectricityMap",
            CarbonProvider::Fixed { .. } => "Fixed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn decision(naive: f64, chosen: f64) -> SchedulingDecision {
        SchedulingDecision {
            timestamp_utc: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            region: "GB".to_string(),
            mode: RunMode::Optimized,
            source: SourceMode::Live,
            threshold_g_per_kwh: 200.0,
            horizon_hours: 0,
            naive_intensity: naive,
            chosen_intensity: chosen,
            waited_seconds: 60.0,
            action: Action::DeferThenRun,
            fetches: 2,
            selected_hour: None,
        }
    }

    #[test]
    fn test_action_serializes_screaming_snake() {
        let json = serde_json::to_string(&Action::DeferThenRun).unwrap();
        assert_eq!(json, "\"DEFER_THEN_RUN\"");
        assert_eq!(Action::ForcedRun.to_string(), "FORCED_RUN");
    }

    #[test]
    fn test_savings() {
        let (abs, pct) = decision(250.0, 150.0).savings();
        assert_eq!(abs, 100.0);
        assert_eq!(pct, 40.0);

        let (abs, pct) = decision(0.0, 0.0).savings();
        assert_eq!(abs, 0.0);
        assert_eq!(pct, 0.0);
    }

    #[test]
    fn test_provider_toml_shape() {
        let provider: CarbonProvider = toml::from_str(
            r#"
            kind = "electricity_map"
            url = "https://api.electricitymap.org"
            token = "abc"
            "#,
        )
        .unwrap();
        assert_eq!(provider.name(), "ElectricityMap");
    }
}
