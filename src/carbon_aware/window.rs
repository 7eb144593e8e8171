//! Lowest-intensity window selection over a historical table
//!
//! Candidate sets are produced by an ordered list of stages. The first stage
//! that yields any rows wins; if none do, the table median is returned.
//!
//! | Stage       | Candidates                                               |
//! |-------------|----------------------------------------------------------|
//! | `Horizon`   | region rows whose hour is within the forward horizon     |
//! | `Region`    | region rows (or the full table if the region is unknown) |
//! | `Global`    | every row                                                |
//! | `Median`    | terminal: median of the full table, no row selected      |

use crate::carbon_aware::history::{HistoricalRow, IntensityTable};
use crate::carbon_aware::types::{IntensitySample, UNKNOWN_REGION};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

const HOURS_PER_DAY: i32 = 24;

/// Which stage produced the selection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStage {
    Horizon,
    Region,
    Global,
    Median,
}

impl fmt::Display for SelectionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SelectionStage::Horizon => "horizon",
            SelectionStage::Region => "region",
            SelectionStage::Global => "global",
            SelectionStage::Median => "median",
        };
        f.write_str(s)
    }
}

/// Result of a window selection
#[derive(Clone, Debug, PartialEq)]
pub struct WindowSelection {
    pub sample: IntensitySample,
    pub stage: SelectionStage,
}

/// Forward-looking circular hour check: `((hour - now) mod 24) <= horizon`
pub fn within_horizon(hour: u8, current_hour: u8, horizon_hours: u32) -> bool {
    let offset = (i32::from(hour) - i32::from(current_hour)).rem_euclid(HOURS_PER_DAY);
    // offset is in [0, 23], so the cast cannot lose information
    (offset as u32) <= horizon_hours
}

/// Selects the lowest-intensity historical sample near "now"
#[derive(Clone, Copy, Debug)]
pub struct WindowSelector<'a> {
    table: &'a IntensityTable,
    region: Option<&'a str>,
    horizon_hours: u32,
    current_hour: u8,
}

impl<'a> WindowSelector<'a> {
    pub fn new(
        table: &'a IntensityTable,
        region: Option<&'a str>,
        horizon_hours: u32,
        current_hour: u8,
    ) -> Self {
        Self {
            table,
            region,
            horizon_hours,
            current_hour,
        }
    }

    /// Candidate set produced by one stage; `None` when the stage does not apply
    pub fn candidates(&self, stage: SelectionStage) -> Option<Vec<&'a HistoricalRow>> {
        match stage {
            SelectionStage::Horizon => {
                if self.horizon_hours == 0 || !self.table.has_hour() {
                    return None;
                }
                Some(
                    self.table
                        .region_rows(self.region)
                        .into_iter()
                        .filter(|row| {
                            row.hour_of_day.is_some_and(|h| {
                                within_horizon(h, self.current_hour, self.horizon_hours)
                            })
                        })
                        .collect(),
                )
            }
            SelectionStage::Region => Some(self.table.region_rows(self.region)),
            SelectionStage::Global => Some(self.table.rows().iter().collect()),
            SelectionStage::Median => None,
        }
    }

    /// Pick the minimum-intensity row from the first non-empty stage
    pub fn select(&self) -> WindowSelection {
        let fallback_region = self.region.unwrap_or(UNKNOWN_REGION);

        for stage in [
            SelectionStage::Horizon,
            SelectionStage::Region,
            SelectionStage::Global,
        ] {
            let Some(candidates) = self.candidates(stage) else {
                continue;
            };

            match lowest(&candidates) {
                Some(row) => {
                    debug!(
                        %stage,
                        candidates = candidates.len(),
                        hour = ?row.hour_of_day,
                        intensity = row.intensity_g_per_kwh,
                        "Selected historical window"
                    );
                    return WindowSelection {
                        sample: row.to_sample(fallback_region),
                        stage,
                    };
                }
                None => warn!(%stage, "No candidates, falling back to next stage"),
            }
        }

        let median = self.table.median();
        warn!(median, "No candidate rows at all, using table median");
        WindowSelection {
            sample: IntensitySample::new(fallback_region, None, median),
            stage: SelectionStage::Median,
        }
    }
}

/// Minimum intensity; ties keep the earliest row
fn lowest<'r>(rows: &[&'r HistoricalRow]) -> Option<&'r HistoricalRow> {
    rows.iter().copied().fold(None, |best, row| match best {
        Some(b) if b.intensity_g_per_kwh <= row.intensity_g_per_kwh => Some(b),
        _ => Some(row),
    })
}
