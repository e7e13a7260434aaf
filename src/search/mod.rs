//! Patch search.
//!
//! [`LocalSearch`] first evaluates the unmodified program `warmup_reps`
//! times to get a baseline, then runs independent epochs. Each epoch starts
//! from the empty patch with the baseline as best fitness and repeatedly
//! evaluates a neighbour of the current best, keeping it when
//! [`SearchHooks::is_better`] says so. Everything problem-specific (how to
//! derive a neighbour, how to compare, when to stop) lives in the hooks.

pub mod neighbour;
pub mod tabu;

pub use neighbour::RandomEdits;
pub use tabu::Tabu;

use crate::fitness::FitnessFunction;
use crate::harness::{evaluate, HarnessError, Status};
use crate::patch::Patch;
use crate::program::Program;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("no successful warmup run in {reps} attempt(s); baseline fitness is undefined")]
    UndefinedBaseline { reps: usize },

    #[error(transparent)]
    Harness(#[from] HarnessError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub warmup_reps: usize,
    pub epochs: usize,
    pub max_iter: usize,
    /// Limit for each test command run.
    pub timeout: Duration,
    /// Seed of the run's random generator; drawn from entropy when unset.
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            warmup_reps: 1,
            epochs: 5,
            max_iter: 100,
            timeout: Duration::from_secs(15),
            seed: None,
        }
    }
}

/// Problem-specific parts of a search.
pub trait SearchHooks {
    /// Derive a candidate from (a clone of) the current best patch.
    fn neighbour<'p>(&mut self, patch: Patch<'p>, rng: &mut StdRng) -> Patch<'p>;

    /// Whether `fitness` should replace `best`. Minimizing, ties favour the
    /// newer patch.
    fn is_better(&self, fitness: f64, best: f64) -> bool {
        fitness <= best
    }

    /// Checked after every successful evaluation; `true` ends the epoch as
    /// a success.
    fn stopping_criterion(&mut self, _iter: usize, _fitness: f64) -> bool {
        false
    }

    /// Called at the start of every epoch.
    fn reset(&mut self) {}
}

/// Result of one epoch.
#[derive(Debug, Clone)]
pub struct EpochReport<'p> {
    pub epoch: usize,
    pub elapsed: Duration,
    pub iterations: usize,
    pub fitness_evals: usize,
    /// Evaluations that did not end in `SUCCESS`.
    pub invalid: usize,
    pub success: bool,
    pub best: Patch<'p>,
    pub best_fitness: f64,
    /// Best fitness after the baseline and after each improvement.
    pub trace: Vec<f64>,
    pub diff: String,
}

#[derive(Debug, Clone)]
pub struct SearchReport<'p> {
    pub baseline: f64,
    pub warmup: Vec<f64>,
    pub epochs: Vec<EpochReport<'p>>,
}

pub struct LocalSearch<'p, H, F> {
    program: &'p Program,
    hooks: H,
    fitness: F,
}

/// Local search that never revisits a patch.
pub type TabuSearch<'p, H, F> = LocalSearch<'p, Tabu<H>, F>;

impl<'p, H, F> LocalSearch<'p, H, F>
where
    H: SearchHooks,
    F: FitnessFunction,
{
    pub fn new(program: &'p Program, hooks: H, fitness: F) -> Self {
        Self {
            program,
            hooks,
            fitness,
        }
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn run(&mut self, config: &SearchConfig) -> Result<SearchReport<'p>, SearchError> {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let warmup = self.warmup(config)?;
        let baseline = warmup.iter().sum::<f64>() / warmup.len() as f64;
        info!(baseline, runs = warmup.len(), "fitness of the original program");

        info!("epoch\titer\tstatus\tfitness\tpatch");
        let mut epochs = Vec::with_capacity(config.epochs);
        for epoch in 1..=config.epochs {
            epochs.push(self.epoch(epoch, baseline, config, &mut rng)?);
        }

        Ok(SearchReport {
            baseline,
            warmup,
            epochs,
        })
    }

    fn warmup(&mut self, config: &SearchConfig) -> Result<Vec<f64>, SearchError> {
        let empty = Patch::new(self.program);
        let mut samples = Vec::with_capacity(config.warmup_reps);
        for rep in 1..=config.warmup_reps {
            let evaluation = evaluate(&empty, config.timeout, &self.fitness)?;
            info!(rep, status = %evaluation.status, fitness = ?evaluation.fitness, "warmup");
            if let (Status::Success, Some(fitness)) = (evaluation.status, evaluation.fitness) {
                samples.push(fitness);
            }
        }
        if samples.is_empty() {
            return Err(SearchError::UndefinedBaseline {
                reps: config.warmup_reps,
            });
        }
        Ok(samples)
    }

    fn epoch(
        &mut self,
        epoch: usize,
        baseline: f64,
        config: &SearchConfig,
        rng: &mut StdRng,
    ) -> Result<EpochReport<'p>, SearchError> {
        self.hooks.reset();
        let start = Instant::now();

        let mut best = Patch::new(self.program);
        let mut best_fitness = baseline;
        let mut trace = vec![baseline];
        let mut fitness_evals = 0;
        let mut invalid = 0;
        let mut iterations = 0;
        let mut success = false;

        for iter in 1..=config.max_iter {
            iterations = iter;
            let candidate = self.hooks.neighbour(best.clone(), rng);
            let evaluation = evaluate(&candidate, config.timeout, &self.fitness)?;
            fitness_evals += 1;

            let fitness = match (evaluation.status, evaluation.fitness) {
                (Status::Success, Some(fitness)) => fitness,
                (status, _) => {
                    invalid += 1;
                    info!("{epoch}\t{iter}\t{status}\t-\t{candidate}");
                    continue;
                }
            };

            let improved = self.hooks.is_better(fitness, best_fitness);
            let marker = if improved { "*" } else { "" };
            info!("{epoch}\t{iter}\t{}\t{marker}{fitness}\t{candidate}", Status::Success);
            if improved {
                best = candidate;
                best_fitness = fitness;
                trace.push(fitness);
            }

            if self.hooks.stopping_criterion(iter, fitness) {
                success = true;
                break;
            }
        }

        let report = EpochReport {
            epoch,
            elapsed: start.elapsed(),
            iterations,
            fitness_evals,
            invalid,
            success,
            diff: best.diff(),
            best,
            best_fitness,
            trace,
        };
        info!(
            epoch,
            best_fitness,
            success,
            invalid,
            elapsed_ms = report.elapsed.as_millis() as u64,
            patch = %report.best,
            "epoch finished"
        );
        Ok(report)
    }
}
