//! Chronological JSON log of scheduling decisions
//!
//! Each append reads the whole list, pushes one entry and rewrites the file
//! through a temporary file + rename. An unreadable or corrupt log is treated
//! as empty.

use crate::carbon_aware::types::{Action, RunMode, SchedulingDecision};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct DecisionLogEntry {
    pub timestamp: DateTime<Utc>,
    pub region: String,
    pub mode: RunMode,
    pub action: Action,
    pub threshold: f64,
    pub naive_run: NaiveRun,
    pub green_run: GreenRun,
    pub savings: Savings,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct NaiveRun {
    pub carbon_intensity: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct GreenRun {
    pub carbon_intensity: f64,
    pub deferred_seconds: f64,
    pub horizon_hours: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_hour: Option<u8>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Savings {
    pub intensity_g_per_kwh: f64,
    pub percent: f64,
}

impl DecisionLogEntry {
    /// Entry for a decision whose workload started at `started_at`
    pub fn new(decision: &SchedulingDecision, started_at: DateTime<Utc>) -> Self {
        let (absolute, percent) = decision.savings();
        Self {
            timestamp: started_at,
            region: decision.region.clone(),
            mode: decision.mode,
            action: decision.action,
            threshold: decision.threshold_g_per_kwh,
            naive_run: NaiveRun {
                carbon_intensity: decision.naive_intensity,
            },
            green_run: GreenRun {
                carbon_intensity: decision.chosen_intensity,
                deferred_seconds: decision.waited_seconds,
                horizon_hours: decision.horizon_hours,
                selected_hour: decision.selected_hour,
            },
            savings: Savings {
                intensity_g_per_kwh: absolute,
                percent,
            },
        }
    }
}

/// Decision log stored as a JSON array at a fixed path
#[derive(Clone, Debug)]
pub struct DecisionLog {
    path: PathBuf,
}

impl DecisionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current entries. Missing or corrupt files read as an empty log.
    pub fn load(&self) -> Vec<DecisionLogEntry> {
        match self.try_load() {
            Ok(entries) => entries,
            Err(e) => {
                let err = Error::DecisionLogCorrupt(e.to_string());
                warn!(path = %self.path.display(), error = %err, "Starting a fresh decision log");
                Vec::new()
            }
        }
    }

    fn try_load(&self) -> Result<Vec<DecisionLogEntry>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Append one entry and atomically rewrite the file
    pub fn append(&self, entry: DecisionLogEntry) -> Result<usize> {
        let mut entries = self.load();
        entries.push(entry);

        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                parent.to_path_buf()
            }
            None => PathBuf::from("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        serde_json::to_writer_pretty(&mut tmp, &entries)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        info!(
            path = %self.path.display(),
            entries = entries.len(),
            "Recorded scheduling decision"
        );
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::carbon_aware::types::SourceMode;
    use chrono::TimeZone;

    fn decision() -> SchedulingDecision {
        SchedulingDecision {
            timestamp_utc: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            region: "GB".to_string(),
            mode: RunMode::Optimized,
            source: SourceMode::Live,
            threshold_g_per_kwh: 200.0,
            horizon_hours: 3,
            naive_intensity: 250.0,
            chosen_intensity: 150.0,
            waited_seconds: 60.0,
            action: Action::DeferThenRun,
            fetches: 2,
            selected_hour: None,
        }
    }

    fn entry() -> DecisionLogEntry {
        DecisionLogEntry::new(
            &decision(),
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 1, 0).unwrap(),
        )
    }

    #[test]
    fn test_entry_shape() {
        let value = serde_json::to_value(entry()).unwrap();
        assert_eq!(value["naive_run"]["carbon_intensity"], 250.0);
        assert_eq!(value["green_run"]["carbon_intensity"], 150.0);
        assert_eq!(value["green_run"]["deferred_seconds"], 60.0);
        assert_eq!(value["green_run"]["horizon_hours"], 3);
        assert_eq!(value["action"], "DEFER_THEN_RUN");
        assert_eq!(value["savings"]["percent"], 40.0);
        assert!(value["green_run"].get("selected_hour").is_none());
        assert!(value["timestamp"].as_str().unwrap().starts_with("2024-03-01T10:01:00"));
    }

    #[test]
    fn test_append_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = DecisionLog::new(dir.path().join("logs").join("decisions.json"));

        let mut second = entry();
        second.region = "FR".to_string();

        assert_eq!(log.append(entry()).unwrap(), 1);
        assert_eq!(log.append(second).unwrap(), 2);

        let entries = log.load();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].region, "GB");
        assert_eq!(entries[1].region, "FR");
    }

    #[test]
    fn test_corrupt_log_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.json");
        std::fs::write(&path, "{ not valid json").unwrap();
        let log = DecisionLog::new(&path);

        assert!(log.load().is_empty());
        assert_eq!(log.append(entry()).unwrap(), 1);

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<DecisionLogEntry> = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed, vec![entry()]);
    }

    #[test]
    fn test_wrong_shape_treated_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.json");
        std::fs::write(&path, r#"{"entries": []}"#).unwrap();

        assert!(DecisionLog::new(&path).load().is_empty());
    }
}
