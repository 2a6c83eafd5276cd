//! Randomized bisection of a failing test set.
//!
//! Each iteration samples half of the current candidates (at least one),
//! runs them, and keeps the sample only if it still fails:
//!
//! ```text
//! n = len(candidates)          k = max(n / 2, 1)
//! sample = k ids drawn without replacement
//! executor(sample) != 0  →  candidates = sample, persist
//! executor(sample) == 0  →  candidates unchanged, draw again
//! ```
//!
//! The loop stops once `len(candidates) <= max_tests`. A run of failing
//! samples converges in `O(log n)` iterations; passing samples never shrink
//! the set, so a rarely-reproducing failure can keep the loop going
//! indefinitely unless `max_iterations` is set.

use std::io::Write;
use std::time::{Duration, Instant};

use rand::SeedableRng as _;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom as _;
use tracing::instrument;

use crate::cancel::CancelToken;
use crate::candidates::CandidateSet;
use crate::config::{BisectionConfig, CandidateSource};
use crate::error::BisectError;
use crate::oracle::{Enumerator, Executor, ProbeStatus, ResultWriter, format_command};

// ---------------------------------------------------------------------------
// Sampling
// ---------------------------------------------------------------------------

/// Number of ids to sample from a set of `n`: half, rounded down, but never
/// zero.
#[must_use]
pub const fn sample_size(n: usize) -> usize {
    let half = n / 2;
    if half == 0 { 1 } else { half }
}

/// Source of random subsets.
pub trait Sampler {
    /// Pick `k` distinct positions of `candidates` and return those ids.
    /// The order of the result carries no meaning.
    fn sample(&mut self, candidates: &[String], k: usize) -> Vec<String>;
}

/// Uniform sampling without replacement from a seeded PRNG.
#[derive(Clone, Debug)]
pub struct RandomSampler {
    seed: u64,
    rng: StdRng,
}

impl RandomSampler {
    /// Reproducible sampler: the same seed draws the same subsets.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    #[must_use]
    pub const fn seed(&self) -> u64 {
        self.seed
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, candidates: &[String], k: usize) -> Vec<String> {
        candidates
            .choose_multiple(&mut self.rng, k)
            .cloned()
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// One pass of the loop. Counts only: the sampled ids themselves are not
/// kept, since a run that never reproduces can loop indefinitely.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IterationResult {
    /// 1-based iteration number.
    pub index: u64,
    /// Candidate count before the draw.
    pub candidates_before: usize,
    /// Number of ids that were run.
    pub sample_size: usize,
    /// Executor exit status.
    pub exit_code: i32,
    /// Whether the sample replaced the candidate set.
    pub adopted: bool,
}

/// Why the loop stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    /// The candidate set shrank to `max_tests` or fewer.
    Completed,
    /// An interrupt arrived; the set is whatever it was before that probe.
    Interrupted,
    /// `max_iterations` probes ran without reaching `max_tests`.
    IterationCap,
}

/// Final state of a run.
#[derive(Clone, Debug)]
pub struct BisectionOutcome {
    pub status: RunStatus,
    pub candidates: CandidateSet,
    /// Completed probes.
    pub iterations: u64,
    pub elapsed: Duration,
    /// Per-iteration counts, oldest first.
    pub history: Vec<IterationResult>,
}

// ---------------------------------------------------------------------------
// Bisector
// ---------------------------------------------------------------------------

/// Drives the bisection loop over its collaborators.
///
/// Human-readable progress goes to `report`; structured events go through
/// `tracing`.
pub struct Bisector<'a> {
    config: &'a BisectionConfig,
    executor: &'a mut dyn Executor,
    results: &'a mut dyn ResultWriter,
    sampler: &'a mut dyn Sampler,
    cancel: &'a CancelToken,
    report: &'a mut dyn Write,
}

impl<'a> Bisector<'a> {
    pub fn new(
        config: &'a BisectionConfig,
        executor: &'a mut dyn Executor,
        results: &'a mut dyn ResultWriter,
        sampler: &'a mut dyn Sampler,
        cancel: &'a CancelToken,
        report: &'a mut dyn Write,
    ) -> Self {
        Self {
            config,
            executor,
            results,
            sampler,
            cancel,
            report,
        }
    }

    /// Build the starting candidate set from the input file or the
    /// enumerator, and persist it if an output path is configured.
    ///
    /// # Errors
    /// [`BisectError::InputFile`], [`BisectError::Enumeration`], or
    /// [`BisectError::OutputFile`].
    pub fn initialize(
        &mut self,
        enumerator: &mut dyn Enumerator,
    ) -> Result<CandidateSet, BisectError> {
        let candidates = match &self.config.source {
            CandidateSource::InputFile(path) => {
                tracing::info!(path = %path.display(), "loading tests from file");
                CandidateSet::load(path)?
            }
            CandidateSource::Enumerate => {
                CandidateSet::new(enumerator.enumerate(&self.config.test_args)?)
            }
        };
        self.persist(&candidates)?;
        Ok(candidates)
    }

    /// Run the loop until the set is small enough, an interrupt arrives, or
    /// the optional iteration cap is hit.
    ///
    /// # Errors
    /// Executor invocation failures, result-file write failures, and report
    /// write failures. An interrupt is not an error.
    #[instrument(
        skip_all,
        fields(initial = candidates.len(), max_tests = self.config.max_tests.get())
    )]
    pub fn run(&mut self, mut candidates: CandidateSet) -> Result<BisectionOutcome, BisectError> {
        let max_tests = self.config.max_tests.get();
        self.banner(&candidates)?;

        let start = Instant::now();
        let mut history = Vec::new();
        let mut iterations: u64 = 0;

        let status = loop {
            if candidates.len() <= max_tests {
                break RunStatus::Completed;
            }
            if self
                .config
                .max_iterations
                .is_some_and(|cap| iterations >= cap)
            {
                break RunStatus::IterationCap;
            }
            if self.cancel.is_cancelled() {
                break RunStatus::Interrupted;
            }

            let index = iterations + 1;
            let n = candidates.len();
            writeln!(self.report, "[+] Iteration {index}: {n} tests")?;
            writeln!(self.report)?;

            let k = sample_size(n);
            let sample = self.sampler.sample(candidates.as_slice(), k);
            debug_assert_eq!(sample.len(), k);

            let exit_code = match self.executor.execute(
                &sample,
                &self.config.test_args,
                self.cancel,
                &mut *self.report,
            )? {
                ProbeStatus::Exited(code) => code,
                ProbeStatus::Interrupted => break RunStatus::Interrupted,
            };

            writeln!(self.report, "ran {k} tests/{n}")?;
            writeln!(self.report, "exit {exit_code}")?;
            let adopted = exit_code != 0;
            if adopted {
                writeln!(self.report, "Tests failed: use this new subtest")?;
                tracing::info!(
                    iteration = index,
                    from = n,
                    to = k,
                    exit_code,
                    "failure reproduced, narrowing"
                );
                candidates = CandidateSet::new(sample);
                self.persist(&candidates)?;
            } else {
                writeln!(
                    self.report,
                    "Tests succeeded: skip this subtest, try a new subset"
                )?;
                tracing::info!(iteration = index, size = k, "sample passed, redrawing");
            }
            writeln!(self.report)?;

            history.push(IterationResult {
                index,
                candidates_before: n,
                sample_size: k,
                exit_code,
                adopted,
            });
            iterations = index;
        };

        let outcome = BisectionOutcome {
            status,
            candidates,
            iterations,
            elapsed: start.elapsed(),
            history,
        };
        self.finish(&outcome)?;
        Ok(outcome)
    }

    fn banner(&mut self, candidates: &CandidateSet) -> Result<(), BisectError> {
        writeln!(self.report, "Start bisecting with {} tests", candidates.len())?;
        writeln!(
            self.report,
            "Test arguments: {}",
            format_command(&self.config.test_args)
        )?;
        writeln!(
            self.report,
            "Bisection will stop when getting {} or less tests (-n option)",
            self.config.max_tests
        )?;
        writeln!(self.report)?;
        Ok(())
    }

    fn finish(&mut self, outcome: &BisectionOutcome) -> Result<(), BisectError> {
        match outcome.status {
            RunStatus::Interrupted => {
                writeln!(self.report)?;
                writeln!(self.report, "Interrupted, exit")?;
                tracing::info!(
                    iterations = outcome.iterations,
                    remaining = outcome.candidates.len(),
                    "bisection interrupted"
                );
                return Ok(());
            }
            RunStatus::Completed => {
                writeln!(self.report, "Failing tests ({}):", outcome.candidates.len())?;
            }
            RunStatus::IterationCap => {
                writeln!(
                    self.report,
                    "Stopped after {} iterations (--max-iterations) with {} tests left:",
                    outcome.iterations,
                    outcome.candidates.len()
                )?;
            }
        }
        for id in &outcome.candidates {
            writeln!(self.report, "* {id}")?;
        }
        writeln!(self.report)?;
        let verb = if outcome.status == RunStatus::Completed {
            "completed in"
        } else {
            "stopped after"
        };
        writeln!(
            self.report,
            "Bisection {verb} {} iterations and {}",
            outcome.iterations,
            format_elapsed(outcome.elapsed)
        )?;
        tracing::info!(
            status = ?outcome.status,
            iterations = outcome.iterations,
            remaining = outcome.candidates.len(),
            elapsed_ms = u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
            "bisection finished"
        );
        Ok(())
    }

    fn persist(&mut self, candidates: &CandidateSet) -> Result<(), BisectError> {
        let Some(path) = &self.config.output else {
            return Ok(());
        };
        writeln!(
            self.report,
            "Write {} tests into {}",
            candidates.len(),
            path.display()
        )?;
        self.results.write(path, candidates)
    }
}

/// Elapsed time rounded up to whole seconds, as `H:MM:SS`.
#[must_use]
pub fn format_elapsed(elapsed: Duration) -> String {
    let mut secs = elapsed.as_secs();
    if elapsed.subsec_nanos() > 0 {
        secs += 1;
    }
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
