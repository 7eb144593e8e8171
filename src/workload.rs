//! Deferrable workloads the scheduler can run
//!
//! The engine treats a workload as an opaque callable. It only needs a quality
//! metric back to put in the evidence table.

use crate::carbon_aware::types::RunMode;
use crate::error::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::process::Command;
use tracing::debug;

/// What a workload reports once it finishes
#[derive(Clone, Debug, PartialEq)]
pub struct WorkloadOutput {
    pub quality_metric_name: String,
    pub quality_metric_value: f64,
}

impl WorkloadOutput {
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            quality_metric_name: name.into(),
            quality_metric_value: value,
        }
    }
}

/// A zero-argument unit of work.
///
/// `execute` may block; the runner calls it on tokio's blocking pool.
pub trait Workload: Send {
    fn execute(&mut self) -> Result<WorkloadOutput>;
}

impl<F> Workload for F
where
    F: FnMut() -> Result<WorkloadOutput> + Send,
{
    fn execute(&mut self) -> Result<WorkloadOutput> {
        self()
    }
}

/// Hyper-parameters for [`SyntheticRegression`]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrainingSettings {
    pub epochs: usize,
    pub learning_rate: f64,
    /// Fraction of training rows used per epoch
    pub subsample: f64,
}

impl TrainingSettings {
    pub fn for_mode(mode: RunMode) -> Self {
        match mode {
            RunMode::Baseline => Self {
                epochs: 300,
                learning_rate: 0.1,
                subsample: 1.0,
            },
            RunMode::Optimized => Self {
                epochs: 200,
                learning_rate: 0.08,
                subsample: 0.7,
            },
        }
    }
}

/// Linear regression fitted by gradient descent on seeded synthetic data.
///
/// Reports mean absolute error on a held-out 20% split.
#[derive(Clone, Debug)]
pub struct SyntheticRegression {
    pub samples: usize,
    pub features: usize,
    pub seed: u64,
    pub settings: TrainingSettings,
}

impl SyntheticRegression {
    pub fn new(mode: RunMode, seed: u64) -> Self {
        Self {
            samples: 1200,
            features: 12,
            seed,
            settings: TrainingSettings::for_mode(mode),
        }
    }

    fn dataset(&self, rng: &mut StdRng) -> (Vec<Vec<f64>>, Vec<f64>) {
        let weights: Vec<f64> = (0..self.features).map(|_| rng.gen_range(-3.0..3.0)).collect();
        let mut xs = Vec::with_capacity(self.samples);
        let mut ys = Vec::with_capacity(self.samples);
        for _ in 0..self.samples {
            let x: Vec<f64> = (0..self.features).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let y = dot(&weights, &x) + rng.gen_range(-0.5..0.5);
            xs.push(x);
            ys.push(y);
        }
        (xs, ys)
    }
}

impl Workload for SyntheticRegression {
    fn execute(&mut self) -> Result<WorkloadOutput> {
        if self.samples < 5 || self.features == 0 {
            return Err(Error::Workload(
                "synthetic regression needs at least 5 samples and 1 feature".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        let (xs, ys) = self.dataset(&mut rng);
        let split = self.samples * 4 / 5;
        let (train_x, test_x) = xs.split_at(split);
        let (train_y, test_y) = ys.split_at(split);

        let mut weights = vec![0.0; self.features];
        let mut bias = 0.0;
        for _ in 0..self.settings.epochs {
            let mut grad_w = vec![0.0; self.features];
            let mut grad_b = 0.0;
            let mut used = 0usize;
            for (x, y) in train_x.iter().zip(train_y) {
                if self.settings.subsample < 1.0 && rng.gen::<f64>() >= self.settings.subsample {
                    continue;
                }
                let err = dot(&weights, x) + bias - y;
                for (g, xi) in grad_w.iter_mut().zip(x) {
                    *g += err * xi;
                }
                grad_b += err;
                used += 1;
            }
            if used == 0 {
                continue;
            }
            let scale = 2.0 * self.settings.learning_rate / used as f64;
            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= scale * g;
            }
            bias -= scale * grad_b;
        }

        let mae = test_x
            .iter()
            .zip(test_y)
            .map(|(x, y)| (dot(&weights, x) + bias - y).abs())
            .sum::<f64>()
            / test_y.len() as f64;

        debug!(mae, epochs = self.settings.epochs, "Synthetic regression finished");
        Ok(WorkloadOutput::new("MAE", mae))
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// External process; succeeds only on exit status 0
#[derive(Clone, Debug)]
pub struct CommandWorkload {
    program: String,
    args: Vec<String>,
}

impl CommandWorkload {
    /// Build from a non-empty argv
    pub fn from_argv(argv: &[String]) -> Result<Self> {
        let (program, args) = argv.split_first().ok_or_else(|| {
            Error::InvalidConfiguration("workload command is empty".to_string())
        })?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl Workload for CommandWorkload {
    fn execute(&mut self) -> Result<WorkloadOutput> {
        debug!(program = %self.program, args = ?self.args, "Running workload command");
        let status = Command::new(&self.program)
            .args(&self.args)
            .status()
            .map_err(|e| Error::Workload(format!("failed to start {}: {e}", self.program)))?;

        match status.code() {
            Some(0) => Ok(WorkloadOutput::new("exit_code", 0.0)),
            Some(code) => Err(Error::Workload(format!(
                "{} exited with status {code}",
                self.program
            ))),
            None => Err(Error::Workload(format!(
                "{} terminated by signal",
                self.program
            ))),
        }
    }
}
