use std::path::PathBuf;
use std::time::Duration;

use carbon_scheduler::carbon_aware::{RunMode, SourceMode};
use carbon_scheduler::config::SchedulerConfig;
use carbon_scheduler::evidence::{EvidenceReport, EvidenceTable};
use carbon_scheduler::runner::{RunRequest, Runner};
use carbon_scheduler::telemetry::{init_tracing, LogFormat};
use carbon_scheduler::workload::{CommandWorkload, SyntheticRegression, Workload};
use carbon_scheduler::Error;
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; CLI flags override its values
    #[arg(long, global = true, env = "CARBON_SCHEDULER_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one baseline/optimized job and append it to the evidence table
    Run(RunArgs),
    /// Run alternating baseline/optimized jobs
    Experiment(ExperimentArgs),
    /// Summarise an evidence table per phase
    Report(ReportArgs),
}

#[derive(ClapArgs, Debug)]
struct ScheduleArgs {
    /// Carbon intensity source
    #[arg(long = "ci", value_enum, default_value_t = SourceMode::Live)]
    source: SourceMode,

    /// Historical intensity table, required with --ci csv
    #[arg(long = "ci-csv")]
    table: Option<PathBuf>,

    /// Grid region
    #[arg(long, env = "CARBON_REGION")]
    region: Option<String>,

    /// Run immediately when intensity is strictly below this (gCO2/kWh)
    #[arg(long)]
    threshold: Option<f64>,

    /// Longest time to wait for a greener window (live mode)
    #[arg(long, alias = "defer-seconds", default_value_t = 0)]
    max_wait_seconds: u64,

    /// Look-ahead window when picking from a historical table
    #[arg(long, default_value_t = 0)]
    horizon_hours: u32,

    /// Delay between live polls
    #[arg(long)]
    poll_interval_seconds: Option<u64>,

    /// Assumed power draw for the energy proxy (kW)
    #[arg(long)]
    assumed_kw: Option<f64>,

    /// Evidence table to append to
    #[arg(long)]
    out: PathBuf,

    /// JSON decision log to append to
    #[arg(long)]
    log_decision: Option<PathBuf>,

    /// Free-text notes stored with each evidence row
    #[arg(long)]
    notes: Option<String>,

    /// Seed for the synthetic workload
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Command to run instead of the synthetic workload
    #[arg(last = true)]
    command: Vec<String>,
}

#[derive(ClapArgs, Debug)]
struct RunArgs {
    #[arg(long, value_enum)]
    mode: RunMode,

    #[command(flatten)]
    schedule: ScheduleArgs,
}

#[derive(ClapArgs, Debug)]
struct ExperimentArgs {
    /// Number of runs, alternating baseline and optimized
    #[arg(long, default_value_t = 10)]
    runs: usize,

    #[command(flatten)]
    schedule: ScheduleArgs,
}

#[derive(ClapArgs, Debug)]
struct ReportArgs {
    /// Evidence table to summarise
    #[arg(long)]
    evidence: PathBuf,

    /// Emit JSON instead of a text table
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = match &args.config {
        Some(path) => SchedulerConfig::from_file(path)?,
        None => SchedulerConfig::default(),
    };

    match args.command {
        Commands::Run(run_args) => run(config, run_args).await,
        Commands::Experiment(exp_args) => experiment(config, exp_args).await,
        Commands::Report(report_args) => report(report_args),
    }
}

async fn run(config: SchedulerConfig, args: RunArgs) -> Result<(), Error> {
    let config = apply_overrides(config, &args.schedule);
    let request = build_request(args.mode, &args.schedule)?;
    let runner = Runner::from_config(config)?;

    let command = command_workload(&args.schedule)?;
    let workload = make_workload(command.as_ref(), args.mode, args.schedule.seed);
    let outcome = runner.run_once(&request, workload).await?;

    println!("{}", serde_json::to_string_pretty(&outcome.decision)?);
    println!(
        "Wrote evidence row {} to {}",
        outcome.record.run_id,
        request.evidence_path.display()
    );
    Ok(())
}

async fn experiment(config: SchedulerConfig, args: ExperimentArgs) -> Result<(), Error> {
    let config = apply_overrides(config, &args.schedule);
    let template = build_request(RunMode::Baseline, &args.schedule)?;
    let runner = Runner::from_config(config)?;

    let command = command_workload(&args.schedule)?;
    let seed = args.schedule.seed;
    let outcomes = runner
        .run_experiment(&template, args.runs, |mode, i| -> Box<dyn Workload> {
            make_workload(command.as_ref(), mode, seed.wrapping_add(i as u64))
        })
        .await?;

    info!(runs = outcomes.len(), "Experiment complete");
    let rows = EvidenceTable::new(&template.evidence_path).read_all()?;
    println!("{}", EvidenceReport::from_rows(&rows));
    Ok(())
}

fn report(args: ReportArgs) -> Result<(), Error> {
    let rows = EvidenceTable::new(&args.evidence).read_all()?;
    let report = EvidenceReport::from_rows(&rows);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn apply_overrides(mut config: SchedulerConfig, args: &ScheduleArgs) -> SchedulerConfig {
    if let Some(region) = &args.region {
        config.region = region.clone();
    }
    if let Some(threshold) = args.threshold {
        config.threshold_g_per_kwh = threshold;
    }
    if let Some(interval) = args.poll_interval_seconds {
        config.poll_interval_seconds = interval;
    }
    if let Some(kw) = args.assumed_kw {
        config.assumed_kw = kw;
    }
    config
}

fn build_request(mode: RunMode, args: &ScheduleArgs) -> Result<RunRequest, Error> {
    let mut request = RunRequest::new(mode, args.source, &args.out);
    request.table_path = args.table.clone();
    request.requested_wait = Duration::from_secs(args.max_wait_seconds);
    request.horizon_hours = args.horizon_hours;
    request.decision_log_path = args.log_decision.clone();
    request.notes = args.notes.clone();
    if !args.command.is_empty() {
        request.task = "command".to_string();
        request.dataset = "external".to_string();
    }
    request.validate()?;
    Ok(request)
}

fn command_workload(args: &ScheduleArgs) -> Result<Option<CommandWorkload>, Error> {
    if args.command.is_empty() {
        return Ok(None);
    }
    CommandWorkload::from_argv(&args.command).map(Some)
}

fn make_workload(command: Option<&CommandWorkload>, mode: RunMode, seed: u64) -> Box<dyn Workload> {
    match command {
        Some(command) => Box::new(command.clone()),
        None => Box::new(SyntheticRegression::new(mode, seed)),
    }
}
