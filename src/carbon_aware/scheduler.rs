//! Carbon-aware decision engine
//!
//! Decides whether a workload runs now, after waiting for a greener window,
//! or is forced to run once the wait budget is spent.
//!
//! Live mode state machine:
//!
//! ```text
//! INITIAL --(reading < threshold)--> RUN
//! INITIAL --(budget == 0)----------> FORCED_RUN
//! INITIAL --(budget > 0)-----------> POLLING
//! POLLING --(reading < threshold)--> DEFER_THEN_RUN
//! POLLING --(budget exhausted)-----> FORCED_RUN (best reading seen)
//! ```
//!
//! Historical mode never waits: baseline runs use the table median, optimized
//! runs use [`WindowSelector`].

use crate::carbon_aware::api::IntensitySource;
use crate::carbon_aware::history::{Aggregate, IntensityTable};
use crate::carbon_aware::types::{Action, RunMode, SchedulingDecision, SourceMode};
use crate::carbon_aware::window::WindowSelector;
use crate::clock::{elapsed_between, Clock};
use crate::error::Result;
use chrono::Timelike;
use std::time::Duration;
use tracing::{debug, info};

/// Default hard ceiling on waiting, whatever the caller requests
pub const DEFAULT_SAFETY_CAP: Duration = Duration::from_secs(300);

/// Default delay between live polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Fixed policy knobs for the engine
#[derive(Clone, Debug, PartialEq)]
pub struct DecisionPolicy {
    /// Readings strictly below this are eligible to run (gCO2/kWh)
    pub threshold_g_per_kwh: f64,
    pub safety_cap: Duration,
    pub poll_interval: Duration,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            threshold_g_per_kwh: 200.0,
            safety_cap: DEFAULT_SAFETY_CAP,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl DecisionPolicy {
    /// Effective wait budget: `min(requested, safety_cap)`
    pub fn wait_budget(&self, requested: Duration) -> Duration {
        requested.min(self.safety_cap)
    }

    pub fn eligible(&self, intensity: f64) -> bool {
        intensity < self.threshold_g_per_kwh
    }
}

/// Inputs that vary per scheduling attempt
#[derive(Clone, Debug, PartialEq)]
pub struct DecisionRequest {
    pub region: String,
    pub mode: RunMode,
    pub requested_wait: Duration,
    pub horizon_hours: u32,
}

/// Where a decision gets its intensity signal
pub enum Signal<'a> {
    Live(&'a dyn IntensitySource),
    Historical(&'a IntensityTable),
}

/// Carbon-aware decision engine
pub struct DecisionEngine<C> {
    policy: DecisionPolicy,
    clock: C,
}

impl<C: Clock> DecisionEngine<C> {
    pub fn new(policy: DecisionPolicy, clock: C) -> Self {
        Self { policy, clock }
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Decide using whichever signal the caller provides
    pub async fn decide(
        &self,
        signal: Signal<'_>,
        request: &DecisionRequest,
    ) -> Result<SchedulingDecision> {
        match signal {
            Signal::Live(source) => self.decide_live(source, request).await,
            Signal::Historical(table) => Ok(self.decide_historical(table, request)),
        }
    }

    /// Live policy. Any source failure aborts the decision.
    pub async fn decide_live<S>(
        &self,
        source: &S,
        request: &DecisionRequest,
    ) -> Result<SchedulingDecision>
    where
        S: IntensitySource + ?Sized,
    {
        let timestamp_utc = self.clock.now();
        let region = request.region.as_str();

        let naive = source.fetch_current(region).await?.intensity_g_per_kwh;
        let mut fetches = 1;
        let mut best = naive;
        let mut waited = Duration::ZERO;

        let budget = self.policy.wait_budget(request.requested_wait);

        let action = if self.policy.eligible(naive) {
            Action::Run
        } else if budget.is_zero() {
            Action::ForcedRun
        } else {
            info!(
                region,
                intensity = naive,
                threshold = self.policy.threshold_g_per_kwh,
                budget_secs = budget.as_secs_f64(),
                "Intensity at or above threshold, polling for a greener window"
            );

            let start = self.clock.now();
            let mut outcome = Action::ForcedRun;

            loop {
                let elapsed = elapsed_between(start, self.clock.now());
                if elapsed >= budget {
                    break;
                }

                let nap = self.policy.poll_interval.min(budget - elapsed);
                self.clock.sleep(nap).await;
                waited += nap;

                let reading = source.fetch_current(region).await?.intensity_g_per_kwh;
                fetches += 1;
                debug!(region, reading, best, fetches, "Polled carbon intensity");

                if reading < best {
                    best = reading;
                }
                if self.policy.eligible(reading) {
                    outcome = Action::DeferThenRun;
                    break;
                }
            }
            outcome
        };

        let decision = SchedulingDecision {
            timestamp_utc,
            region: request.region.clone(),
            mode: request.mode,
            source: SourceMode::Live,
            threshold_g_per_kwh: self.policy.threshold_g_per_kwh,
            horizon_hours: request.horizon_hours,
            naive_intensity: naive,
            chosen_intensity: best,
            waited_seconds: waited.as_secs_f64(),
            action,
            fetches,
            selected_hour: None,
        };
        log_decision(&decision);
        Ok(decision)
    }

    /// Historical policy. Infallible: every fallback ends in a defined value.
    pub fn decide_historical(
        &self,
        table: &IntensityTable,
        request: &DecisionRequest,
    ) -> SchedulingDecision {
        let timestamp_utc = self.clock.now();
        let region = Some(request.region.as_str());
        let naive = table.lookup_aggregate(region, Aggregate::Median);

        let (chosen, selected_hour) = match request.mode {
            RunMode::Baseline => (naive, None),
            RunMode::Optimized => {
                let current_hour = timestamp_utc.hour() as u8;
                let pick =
                    WindowSelector::new(table, region, request.horizon_hours, current_hour)
                        .select();
                let intensity = pick.sample.intensity_g_per_kwh;
                if intensity <= naive {
                    (intensity, pick.sample.hour_of_day)
                } else {
                    debug!(
                        intensity,
                        naive, "Selected window is worse than the median, keeping median"
                    );
                    (naive, None)
                }
            }
        };

        let action = if self.policy.eligible(chosen) {
            Action::Run
        } else {
            Action::ForcedRun
        };

        let decision = SchedulingDecision {
            timestamp_utc,
            region: request.region.clone(),
            mode: request.mode,
            source: SourceMode::Csv,
            threshold_g_per_kwh: self.policy.threshold_g_per_kwh,
            horizon_hours: request.horizon_hours,
            naive_intensity: naive,
            chosen_intensity: chosen,
            waited_seconds: 0.0,
            action,
            fetches: 0,
            selected_hour,
        };
        log_decision(&decision);
        decision
    }
}

fn log_decision(decision: &SchedulingDecision) {
    info!(
        region = %decision.region,
        mode = %decision.mode,
        action = %decision.action,
        naive = decision.naive_intensity,
        chosen = decision.chosen_intensity,
        waited_secs = decision.waited_seconds,
        "Scheduling decision made"
    );
}
