//! End-to-end orchestration of one carbon-aware run
//!
//! validate -> decide -> execute -> measure -> append evidence -> log decision
//!
//! Nothing is written unless the workload completes.

use crate::carbon_aware::api::{CarbonIntensityApi, IntensitySource};
use crate::carbon_aware::history::IntensityTable;
use crate::carbon_aware::scheduler::{DecisionEngine, DecisionRequest, Signal};
use crate::carbon_aware::types::{RunMode, SchedulingDecision, SourceMode};
use crate::clock::{Clock, SystemClock};
use crate::config::SchedulerConfig;
use crate::error::{Error, Result};
use crate::evidence::{DecisionLog, DecisionLogEntry, EvidenceRecord, EvidenceTable};
use crate::measure::{energy_co2_proxy, timed};
use crate::workload::Workload;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, instrument};

/// Per-run inputs
#[derive(Clone, Debug, PartialEq)]
pub struct RunRequest {
    pub mode: RunMode,
    pub source: SourceMode,
    /// Historical table; required when `source` is CSV
    pub table_path: Option<PathBuf>,
    pub requested_wait: Duration,
    pub horizon_hours: u32,
    pub evidence_path: PathBuf,
    pub decision_log_path: Option<PathBuf>,
    pub task: String,
    pub dataset: String,
    pub notes: Option<String>,
}

impl RunRequest {
    pub fn new(mode: RunMode, source: SourceMode, evidence_path: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            source,
            table_path: None,
            requested_wait: Duration::ZERO,
            horizon_hours: 0,
            evidence_path: evidence_path.into(),
            decision_log_path: None,
            task: "regression".to_string(),
            dataset: "synthetic".to_string(),
            notes: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.source == SourceMode::Csv && self.table_path.is_none() {
            return Err(Error::InvalidConfiguration(
                "CSV intensity source requires a table path".to_string(),
            ));
        }
        if self.evidence_path.as_os_str().is_empty() {
            return Err(Error::InvalidConfiguration(
                "evidence path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Decision plus the evidence row written for it
#[derive(Clone, Debug, PartialEq)]
pub struct RunOutcome {
    pub decision: SchedulingDecision,
    pub record: EvidenceRecord,
}

/// Carbon-aware workload runner
pub struct Runner<C> {
    config: SchedulerConfig,
    engine: DecisionEngine<C>,
    source: Box<dyn IntensitySource>,
}

impl Runner<SystemClock> {
    /// Runner using the configured live provider and real time
    pub fn from_config(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;
        let api = CarbonIntensityApi::new(config.provider.clone(), config.request_timeout())?;
        Self::new(config, SystemClock, Box::new(api))
    }
}

impl<C: Clock> Runner<C> {
    pub fn new(config: SchedulerConfig, clock: C, source: Box<dyn IntensitySource>) -> Result<Self> {
        config.validate()?;
        let engine = DecisionEngine::new(config.policy(), clock);
        Ok(Self {
            config,
            engine,
            source,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Decide, execute the workload, then record evidence and the decision
    #[instrument(skip_all, fields(mode = %request.mode, source = ?request.source))]
    pub async fn run_once(
        &self,
        request: &RunRequest,
        mut workload: Box<dyn Workload>,
    ) -> Result<RunOutcome> {
        request.validate()?;

        let table = match (&request.source, &request.table_path) {
            (SourceMode::Csv, Some(path)) => Some(IntensityTable::from_csv_path(path)?),
            _ => None,
        };
        let signal = match &table {
            Some(table) => Signal::Historical(table),
            None => Signal::Live(self.source.as_ref()),
        };

        let decision_request = DecisionRequest {
            region: self.config.region.clone(),
            mode: request.mode,
            requested_wait: request.requested_wait,
            horizon_hours: request.horizon_hours,
        };
        let decision = self.engine.decide(signal, &decision_request).await?;

        let started_at = self.engine.clock().now();
        let (output, elapsed) = tokio::task::spawn_blocking(move || timed(|| workload.execute()))
            .await
            .map_err(|e| Error::Workload(format!("workload task failed: {e}")))?;
        let output = output?;

        let runtime_s = elapsed.as_secs_f64();
        let footprint = energy_co2_proxy(runtime_s, decision.chosen_intensity, self.config.assumed_kw);

        let record = EvidenceRecord {
            run_id: new_run_id(request.mode, started_at),
            phase: request.mode.to_string(),
            task: request.task.clone(),
            dataset: request.dataset.clone(),
            hardware: hardware_descriptor(),
            region: decision.region.clone(),
            timestamp_utc: started_at,
            energy_kwh: footprint.energy_kwh,
            emissions_kg_co2e: footprint.emissions_kg_co2e,
            water_liters: None,
            runtime_seconds: runtime_s,
            quality_metric_name: output.quality_metric_name,
            quality_metric_value: output.quality_metric_value,
            notes: request.notes.clone().unwrap_or_else(|| "Proxy".to_string()),
        };

        EvidenceTable::new(&request.evidence_path).append(&record)?;

        if let Some(path) = &request.decision_log_path {
            DecisionLog::new(path).append(DecisionLogEntry::new(&decision, started_at))?;
        }

        info!(
            run_id = %record.run_id,
            action = %decision.action,
            runtime_s,
            kg_co2e = record.emissions_kg_co2e,
            "Run complete"
        );

        Ok(RunOutcome { decision, record })
    }

    /// Alternate baseline and optimized runs, starting with baseline
    pub async fn run_experiment<F>(
        &self,
        template: &RunRequest,
        runs: usize,
        mut make_workload: F,
    ) -> Result<Vec<RunOutcome>>
    where
        F: FnMut(RunMode, usize) -> Box<dyn Workload>,
    {
        let mut outcomes = Vec::with_capacity(runs);
        for i in 0..runs {
            let mode = if i % 2 == 0 {
                RunMode::Baseline
            } else {
                RunMode::Optimized
            };
            let request = RunRequest {
                mode,
                ..template.clone()
            };
            outcomes.push(self.run_once(&request, make_workload(mode, i)).await?);
        }
        Ok(outcomes)
    }
}

/// `{phase}_{YYYYMMDDTHHMMSS}_{8 hex}`
pub fn new_run_id(mode: RunMode, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{:08x}",
        mode,
        at.format("%Y%m%dT%H%M%S"),
        rand::random::<u32>()
    )
}

/// `{arch}_{n}cpu`
pub fn hardware_descriptor() -> String {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    format!("{}_{}cpu", std::env::consts::ARCH, cpus)
}
