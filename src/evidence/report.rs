//! Per-phase summary of an evidence table

use crate::evidence::table::EvidenceRow;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PhaseSummary {
    pub phase: String,
    pub runs: usize,
    pub mean_kwh: f64,
    pub mean_kg_co2e: f64,
    pub mean_runtime_s: f64,
    pub mean_quality: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EvidenceReport {
    pub phases: Vec<PhaseSummary>,
    /// Relative reduction of mean emissions, optimized vs baseline
    pub emissions_reduction_percent: Option<f64>,
}

impl EvidenceReport {
    pub fn from_rows(rows: &[EvidenceRow]) -> Self {
        let mut grouped: BTreeMap<&str, Vec<&EvidenceRow>> = BTreeMap::new();
        for row in rows {
            grouped.entry(row.phase.as_str()).or_default().push(row);
        }

        let phases: Vec<PhaseSummary> = grouped
            .into_iter()
            .map(|(phase, rows)| {
                let n = rows.len() as f64;
                let mean = |f: fn(&EvidenceRow) -> f64| rows.iter().map(|r| f(r)).sum::<f64>() / n;
                PhaseSummary {
                    phase: phase.to_string(),
                    runs: rows.len(),
                    mean_kwh: mean(|r| r.kwh),
                    mean_kg_co2e: mean(|r| r.kg_co2e),
                    mean_runtime_s: mean(|r| r.runtime_s),
                    mean_quality: mean(|r| r.quality_metric_value),
                }
            })
            .collect();

        let co2 = |name: &str| {
            phases
                .iter()
                .find(|p| p.phase == name)
                .map(|p| p.mean_kg_co2e)
        };
        let emissions_reduction_percent = match (co2("baseline"), co2("optimized")) {
            (Some(base), Some(opt)) if base > 0.0 => Some((base - opt) / base * 100.0),
            _ => None,
        };

        Self {
            phases,
            emissions_reduction_percent,
        }
    }
}

impl fmt::Display for EvidenceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<12} {:>5} {:>14} {:>14} {:>12} {:>12}",
            "phase", "runs", "mean_kWh", "mean_kgCO2e", "runtime_s", "quality"
        )?;
        for p in &self.phases {
            writeln!(
                f,
                "{:<12} {:>5} {:>14.8} {:>14.8} {:>12.4} {:>12.6}",
                p.phase, p.runs, p.mean_kwh, p.mean_kg_co2e, p.mean_runtime_s, p.mean_quality
            )?;
        }
        match self.emissions_reduction_percent {
            Some(pct) => write!(f, "emissions reduction (optimized vs baseline): {pct:.2}%"),
            None => write!(f, "emissions reduction: n/a (need baseline and optimized runs)"),
        }
    }
}
