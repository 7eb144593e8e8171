//! Historical carbon intensity tables
//!
//! A table is loaded from CSV with the fixed column names below. Only the
//! intensity column is mandatory; region and hour-of-day are optional.

use crate::carbon_aware::types::IntensitySample;
use crate::error::{Error, Result};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

pub const REGION_COLUMN: &str = "region";
pub const HOUR_COLUMN: &str = "UTC_hour";
pub const INTENSITY_COLUMN: &str = "carbon_intensity_gco2_per_kwh";

/// One row of a historical table
#[derive(Clone, Debug, PartialEq)]
pub struct HistoricalRow {
    pub region: Option<String>,
    pub hour_of_day: Option<u8>,
    pub intensity_g_per_kwh: f64,
}

impl HistoricalRow {
    pub fn new(region: Option<&str>, hour_of_day: Option<u8>, intensity: f64) -> Self {
        Self {
            region: region.map(str::to_string),
            hour_of_day,
            intensity_g_per_kwh: intensity,
        }
    }

    /// Convert to a sample, naming a region even if the row carries none
    pub fn to_sample(&self, fallback_region: &str) -> IntensitySample {
        IntensitySample::new(
            self.region.as_deref().unwrap_or(fallback_region),
            self.hour_of_day,
            self.intensity_g_per_kwh,
        )
    }
}

/// Historical carbon intensity table
#[derive(Clone, Debug, Default)]
pub struct IntensityTable {
    rows: Vec<HistoricalRow>,
    has_region: bool,
    has_hour: bool,
}

/// How to summarise a set of intensities
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Aggregate {
    Mean,
    Median,
    Min,
}

impl Aggregate {
    /// Apply to a set of values; `None` when empty
    pub fn apply(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        match self {
            Aggregate::Mean => Some(values.iter().sum::<f64>() / values.len() as f64),
            Aggregate::Min => values.iter().copied().reduce(f64::min),
            Aggregate::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(f64::total_cmp);
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    Some((sorted[mid - 1] + sorted[mid]) / 2.0)
                } else {
                    Some(sorted[mid])
                }
            }
        }
    }
}

impl IntensityTable {
    /// Build a table from rows; column presence is inferred from the rows
    pub fn from_rows(rows: Vec<HistoricalRow>) -> Self {
        let has_region = rows.iter().any(|r| r.region.is_some());
        let has_hour = rows.iter().any(|r| r.hour_of_day.is_some());
        Self {
            rows,
            has_region,
            has_hour,
        }
    }

    /// Load a table from a CSV file
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let table = Self::from_csv_reader(file)?;
        info!(
            path = %path.display(),
            rows = table.len(),
            "Loaded historical carbon intensity table"
        );
        Ok(table)
    }

    /// Parse CSV with a header row. Rows with an unparseable intensity are skipped.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers = csv_reader.headers()?.clone();

        let column = |name: &str| headers.iter().position(|h| h == name);
        let intensity_idx = column(INTENSITY_COLUMN).ok_or_else(|| {
            Error::InvalidConfiguration(format!(
                "intensity table has no '{INTENSITY_COLUMN}' column"
            ))
        })?;
        let region_idx = column(REGION_COLUMN);
        let hour_idx = column(HOUR_COLUMN);

        let mut rows = Vec::new();
        for (line, record) in csv_reader.records().enumerate() {
            let record = record?;

            let intensity = match record.get(intensity_idx).map(str::parse::<f64>) {
                Some(Ok(v)) if v.is_finite() && v >= 0.0 => v,
                other => {
                    warn!(line = line + 2, value = ?other, "Skipping row with invalid intensity");
                    continue;
                }
            };

            let region = region_idx
                .and_then(|i| record.get(i))
                .filter(|s| !s.is_empty())
                .map(str::to_string);

            let hour_of_day = hour_idx
                .and_then(|i| record.get(i))
                .filter(|s| !s.is_empty())
                .and_then(|s| parse_hour(s, line + 2));

            rows.push(HistoricalRow {
                region,
                hour_of_day,
                intensity_g_per_kwh: intensity,
            });
        }

        Ok(Self {
            rows,
            has_region: region_idx.is_some(),
            has_hour: hour_idx.is_some(),
        })
    }

    pub fn rows(&self) -> &[HistoricalRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_region(&self) -> bool {
        self.has_region
    }

    pub fn has_hour(&self) -> bool {
        self.has_hour
    }

    /// Rows for `region`, or every row when the filter matches nothing.
    ///
    /// Regions are advisory: a missing region column or an unknown region
    /// widens to the full table instead of failing.
    pub fn region_rows(&self, region: Option<&str>) -> Vec<&HistoricalRow> {
        let all = || self.rows.iter().collect::<Vec<_>>();
        let Some(region) = region.filter(|_| self.has_region) else {
            return all();
        };

        let filtered: Vec<&HistoricalRow> = self
            .rows
            .iter()
            .filter(|r| r.region.as_deref() == Some(region))
            .collect();

        if filtered.is_empty() && !self.rows.is_empty() {
            warn!(region, "No rows for region, using full table");
            return all();
        }
        filtered
    }

    /// Representative intensity for `region` (LookupAggregate).
    ///
    /// An empty table aggregates to 0.0.
    pub fn lookup_aggregate(&self, region: Option<&str>, aggregate: Aggregate) -> f64 {
        let values: Vec<f64> = self
            .region_rows(region)
            .iter()
            .map(|r| r.intensity_g_per_kwh)
            .collect();

        match aggregate.apply(&values) {
            Some(v) => {
                debug!(?aggregate, value = v, rows = values.len(), "Aggregated intensity");
                v
            }
            None => {
                warn!(?aggregate, "Intensity table is empty, aggregate defaults to 0.0");
                0.0
            }
        }
    }

    /// Median over the whole table, ignoring region
    pub fn median(&self) -> f64 {
        self.lookup_aggregate(None, Aggregate::Median)
    }
}

fn parse_hour(raw: &str, line: usize) -> Option<u8> {
    let value = raw.parse::<f64>().ok().filter(|v| v.fract() == 0.0);
    match value {
        Some(v) if (0.0..24.0).contains(&v) => Some(v as u8),
        _ => {
            warn!(line, value = raw, "Ignoring out-of-range UTC hour");
            None
        }
    }
}
