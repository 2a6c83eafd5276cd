use std::io;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use bisect::bisect::{Bisector, RandomSampler, RunStatus};
use bisect::cancel::CancelToken;
use bisect::config::{BisectionConfig, CandidateSource, DEFAULT_CONFIG_FILE, ExecutionContext};
use bisect::error::BisectError;
use bisect::oracle::{CommandEnumerator, CommandExecutor, FileResultWriter};
use bisect::telemetry;

/// Exit status after Ctrl-C, matching the shell convention (128 + SIGINT).
const EXIT_INTERRUPTED: u8 = 130;

/// Bisect a failing test suite down to a minimal failing subset
///
/// Repeatedly runs a random half of the current candidate tests. When the
/// half still fails it becomes the new candidate set; when it passes, another
/// half is drawn. Stops once at most -n tests remain.
///
/// EXAMPLES:
///
///   # Find the failing test of test_os, write the result into "bisect"
///   test-bisect -o bisect test_os
///
///   # Find a reference leak in test_os
///   test-bisect -o bisect -R 3:3 test_os
///
///   # Resume from an existing list (e.g. a previous run's -o file)
///   test-bisect -i bisect test_os
///
/// Commands come from .test-bisect.toml ([commands] list / run); the
/// defaults drive `python3 -m test`.
#[derive(Parser, Debug)]
#[command(name = "test-bisect")]
#[command(version, about)]
struct Cli {
    /// Test names written into a file, one per line. If not set, run the
    /// list command
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Result of the bisection, rewritten each time the candidate set shrinks
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Maximum number of tests to stop the bisection
    #[arg(short = 'n', long, value_name = "N", default_value = "1")]
    max_tests: NonZeroUsize,

    /// Seed for the random draws; printed at startup so a run can be replayed
    #[arg(long)]
    seed: Option<u64>,

    /// Give up after this many test runs (default: never)
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    max_iterations: Option<u64>,

    /// Command configuration file
    #[arg(long, value_name = "FILE", env = "TEST_BISECT_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Arguments passed to both the list and run commands, ex: -R 3:3 test_os
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "TEST_ARGS")]
    test_args: Vec<String>,
}

impl Cli {
    fn into_config(self) -> BisectionConfig {
        BisectionConfig {
            source: self
                .input
                .map_or(CandidateSource::Enumerate, CandidateSource::InputFile),
            output: self.output,
            max_tests: self.max_tests,
            test_args: self.test_args,
            max_iterations: self.max_iterations,
        }
    }
}

fn main() -> ExitCode {
    telemetry::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            let code = err
                .downcast_ref::<BisectError>()
                .map_or(1, BisectError::exit_code);
            ExitCode::from(code)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let context = ExecutionContext::load(&cli.config).map_err(BisectError::from)?;
    let seed = cli.seed.unwrap_or_else(rand::random);
    let config = cli.into_config();

    let cancel = CancelToken::new();
    cancel
        .install_interrupt_handler()
        .context("failed to install the Ctrl-C handler")?;

    let mut enumerator = CommandEnumerator::new(&context);
    let mut executor = CommandExecutor::new(&context);
    let mut results = FileResultWriter;
    let mut sampler = RandomSampler::seeded(seed);
    let mut stdout = io::stdout();

    println!(
        "Random seed: {seed} (pass --seed {seed} to replay the same draws)",
        seed = sampler.seed()
    );
    let mut bisector = Bisector::new(
        &config,
        &mut executor,
        &mut results,
        &mut sampler,
        &cancel,
        &mut stdout,
    );
    let candidates = bisector.initialize(&mut enumerator)?;
    let outcome = bisector.run(candidates)?;

    Ok(match outcome.status {
        RunStatus::Completed => ExitCode::SUCCESS,
        RunStatus::Interrupted => ExitCode::from(EXIT_INTERRUPTED),
        RunStatus::IterationCap => ExitCode::FAILURE,
    })
}
