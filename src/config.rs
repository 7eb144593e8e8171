//! Scheduler configuration
//!
//! Values come from defaults, then an optional TOML file, then CLI flags.

use crate::carbon_aware::scheduler::DecisionPolicy;
use crate::carbon_aware::types::CarbonProvider;
use crate::error::{Error, Result};
use crate::measure::DEFAULT_ASSUMED_KW;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Carbon-aware scheduling configuration
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Grid region the workload runs in
    pub region: String,
    /// Readings strictly below this run immediately (gCO2/kWh)
    pub threshold_g_per_kwh: f64,
    /// Hard ceiling on any requested wait
    pub safety_cap_seconds: u64,
    /// Delay between live polls
    pub poll_interval_seconds: u64,
    /// Per-request timeout for live fetches
    pub request_timeout_seconds: u64,
    /// Assumed power draw for the energy proxy (kW)
    pub assumed_kw: f64,
    /// Live carbon intensity provider
    pub provider: CarbonProvider,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            region: "GB".to_string(),
            threshold_g_per_kwh: 200.0,
            safety_cap_seconds: 300,
            poll_interval_seconds: 60,
            request_timeout_seconds: 8,
            assumed_kw: DEFAULT_ASSUMED_KW,
            provider: CarbonProvider::default(),
        }
    }
}

impl SchedulerConfig {
    /// Load from a TOML file; missing keys take their defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidConfiguration(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: Self = toml::from_str(&raw).map_err(|e| {
            Error::InvalidConfiguration(format!("cannot parse {}: {e}", path.display()))
        })?;
        debug!(path = %path.display(), "Loaded scheduler config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.region.trim().is_empty() {
            return Err(Error::InvalidConfiguration("region must not be empty".into()));
        }
        if !self.threshold_g_per_kwh.is_finite() || self.threshold_g_per_kwh < 0.0 {
            return Err(Error::InvalidConfiguration(format!(
                "threshold must be a non-negative number, got {}",
                self.threshold_g_per_kwh
            )));
        }
        if self.poll_interval_seconds == 0 {
            return Err(Error::InvalidConfiguration(
                "poll interval must be at least 1 second".into(),
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(Error::InvalidConfiguration(
                "request timeout must be at least 1 second".into(),
            ));
        }
        if !self.assumed_kw.is_finite() || self.assumed_kw <= 0.0 {
            return Err(Error::InvalidConfiguration(format!(
                "assumed power must be positive, got {} kW",
                self.assumed_kw
            )));
        }
        if let CarbonProvider::Fixed { intensity } = self.provider {
            if !intensity.is_finite() || intensity < 0.0 {
                return Err(Error::InvalidConfiguration(format!(
                    "fixed provider intensity must be non-negative, got {intensity}"
                )));
            }
        }
        Ok(())
    }

    pub fn policy(&self) -> DecisionPolicy {
        DecisionPolicy {
            threshold_g_per_kwh: self.threshold_g_per_kwh,
            safety_cap: Duration::from_secs(self.safety_cap_seconds),
            poll_interval: Duration::from_secs(self.poll_interval_seconds),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}
