//! Append-only evidence table (CSV)
//!
//! One row per executed workload. The header is written when the file is
//! first created and existing rows are never rewritten.
//!
//! Concurrent writers against the same path are not coordinated; use a
//! distinct path per scheduler instance.

use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use tracing::info;

/// Fixed column order of the evidence table
pub const EVIDENCE_HEADER: [&str; 14] = [
    "run_id",
    "phase",
    "task",
    "dataset",
    "hardware",
    "region",
    "timestamp_utc",
    "kWh",
    "kgCO2e",
    "water_L",
    "runtime_s",
    "quality_metric_name",
    "quality_metric_value",
    "notes",
];

/// One executed workload run
#[derive(Clone, Debug, PartialEq)]
pub struct EvidenceRecord {
    pub run_id: String,
    pub phase: String,
    pub task: String,
    pub dataset: String,
    pub hardware: String,
    pub region: String,
    pub timestamp_utc: DateTime<Utc>,
    pub energy_kwh: f64,
    pub emissions_kg_co2e: f64,
    pub water_liters: Option<f64>,
    pub runtime_seconds: f64,
    pub quality_metric_name: String,
    pub quality_metric_value: f64,
    pub notes: String,
}

impl EvidenceRecord {
    /// Render as CSV fields in [`EVIDENCE_HEADER`] order
    pub fn to_fields(&self) -> [String; 14] {
        [
            self.run_id.clone(),
            self.phase.clone(),
            self.task.clone(),
            self.dataset.clone(),
            self.hardware.clone(),
            self.region.clone(),
            self.timestamp_utc
                .to_rfc3339_opts(SecondsFormat::Micros, false),
            format!("{:.8}", self.energy_kwh),
            format!("{:.8}", self.emissions_kg_co2e),
            self.water_liters
                .map(|w| format!("{w:.6}"))
                .unwrap_or_default(),
            format!("{:.6}", self.runtime_seconds),
            self.quality_metric_name.clone(),
            format!("{:.6}", self.quality_metric_value),
            self.notes.clone(),
        ]
    }
}

/// A row read back from an evidence table
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct EvidenceRow {
    pub run_id: String,
    pub phase: String,
    pub task: String,
    pub dataset: String,
    pub hardware: String,
    pub region: String,
    pub timestamp_utc: String,
    #[serde(rename = "kWh")]
    pub kwh: f64,
    #[serde(rename = "kgCO2e")]
    pub kg_co2e: f64,
    #[serde(rename = "water_L")]
    pub water_l: Option<f64>,
    pub runtime_s: f64,
    pub quality_metric_name: String,
    pub quality_metric_value: f64,
    pub notes: String,
}

/// Append-only evidence table at a fixed path
#[derive(Clone, Debug)]
pub struct EvidenceTable {
    path: PathBuf,
}

impl EvidenceTable {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record, writing the header only if the file is new or empty
    pub fn append(&self, record: &EvidenceRecord) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let needs_header = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        if !needs_header && self.run_ids()?.contains(&record.run_id) {
            return Err(Error::DuplicateRunId(record.run_id.clone()));
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            writer.write_record(EVIDENCE_HEADER)?;
        }
        writer.write_record(record.to_fields())?;
        writer.flush()?;

        info!(
            path = %self.path.display(),
            run_id = %record.run_id,
            kg_co2e = record.emissions_kg_co2e,
            "Appended evidence row"
        );
        Ok(())
    }

    /// Read every row back
    pub fn read_all(&self) -> Result<Vec<EvidenceRow>> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let rows = reader.deserialize().collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn run_ids(&self) -> Result<HashSet<String>> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let mut ids = HashSet::new();
        for record in reader.records() {
            if let Some(id) = record?.get(0) {
                ids.insert(id.to_string());
            }
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(run_id: &str, phase: &str) -> EvidenceRecord {
        EvidenceRecord {
            run_id: run_id.to_string(),
            phase: phase.to_string(),
            task: "regression".to_string(),
            dataset: "synthetic".to_string(),
            hardware: "x86_64_8cpu".to_string(),
            region: "GB".to_string(),
            timestamp_utc: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            energy_kwh: 0.0001,
            emissions_kg_co2e: 0.00002,
            water_liters: None,
            runtime_seconds: 3.6,
            quality_metric_name: "MAE".to_string(),
            quality_metric_value: 0.5,
            notes: "Proxy".to_string(),
        }
    }

    #[test]
    fn test_fields_formatting() {
        let fields = record("baseline_1", "baseline").to_fields();
        assert_eq!(fields[7], "0.00010000");
        assert_eq!(fields[8], "0.00002000");
        assert_eq!(fields[9], "");
        assert_eq!(fields[10], "3.600000");
        assert_eq!(fields[12], "0.500000");
    }

    #[test]
    fn test_two_appends_single_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifacts").join("evidence.csv");
        let table = EvidenceTable::new(&path);

        table.append(&record("baseline_1", "baseline")).unwrap();
        table.append(&record("optimized_2", "optimized")).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], EVIDENCE_HEADER.join(","));
        assert_eq!(content.matches("run_id").count(), 1);

        let rows = table.read_all().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].phase, "baseline");
        assert_eq!(rows[1].phase, "optimized");
        assert_eq!(rows[1].water_l, None);
        assert_eq!(rows[0].kwh, 0.0001);
    }

    #[test]
    fn test_existing_rows_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evidence.csv");
        let table = EvidenceTable::new(&path);

        table.append(&record("a", "baseline")).unwrap();
        let before = std::fs::read_to_string(&path).unwrap();
        table.append(&record("b", "baseline")).unwrap();
        let after = std::fs::read_to_string(&path).unwrap();

        assert!(after.starts_with(&before));
    }

    #[test]
    fn test_duplicate_run_id_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let table = EvidenceTable::new(dir.path().join("evidence.csv"));

        table.append(&record("same", "baseline")).unwrap();
        let err = table.append(&record("same", "optimized")).unwrap_err();

        assert!(matches!(err, Error::DuplicateRunId(id) if id == "same"));
        assert_eq!(table.read_all().unwrap().len(), 1);
    }

    #[test]
    fn test_notes_with_commas_are_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let table = EvidenceTable::new(dir.path().join("evidence.csv"));
        let mut rec = record("quoted", "baseline");
        rec.notes = "proxy, deferred".to_string();

        table.append(&rec).unwrap();

        assert_eq!(table.read_all().unwrap()[0].notes, "proxy, deferred");
    }
}
