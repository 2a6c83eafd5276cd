//! Collaborators the bisector drives: list tests, run a subset, save results.
//!
//! Each is a trait so the loop can be exercised with in-memory fakes. The
//! command-backed implementations spawn the programs configured in
//! [`ExecutionContext`] and append the pass-through arguments verbatim.

use std::io::Write;
use std::path::Path;
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use tempfile::TempPath;
use tracing::instrument;

use crate::cancel::CancelToken;
use crate::candidates::{CandidateSet, render_lines};
use crate::config::{ExecutionContext, MATCHFILE_PLACEHOLDER};
use crate::error::BisectError;

/// How long the executor sleeps between child status polls.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Signal number of SIGINT on Unix.
const SIGINT: i32 = 2;

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Produces the initial candidate list.
pub trait Enumerator {
    /// List test identifiers, in order, for the given pass-through args.
    ///
    /// # Errors
    /// [`BisectError::Enumeration`] if the listing exits nonzero.
    fn enumerate(&mut self, test_args: &[String]) -> Result<Vec<String>, BisectError>;
}

/// Result of running one sampled subset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeStatus {
    /// The run finished. Zero means every test passed.
    Exited(i32),
    /// The run was cut short by a cancellation request.
    Interrupted,
}

/// Runs a subset of tests and reports the aggregate status.
pub trait Executor {
    /// Run `subset` with the pass-through args. Progress lines (such as the
    /// command being run) go to `report`.
    ///
    /// Must return [`ProbeStatus::Interrupted`] (not an error) if `cancel`
    /// fires while the tests run.
    ///
    /// # Errors
    /// [`BisectError::ExecutorInvocation`] if the run could not be started,
    /// [`BisectError::Io`] if `report` cannot be written.
    fn execute(
        &mut self,
        subset: &[String],
        test_args: &[String],
        cancel: &CancelToken,
        report: &mut dyn Write,
    ) -> Result<ProbeStatus, BisectError>;
}

/// Persists the current candidate set.
pub trait ResultWriter {
    /// Overwrite `path` with `candidates`, one identifier per line.
    ///
    /// # Errors
    /// [`BisectError::OutputFile`] if the write fails.
    fn write(&mut self, path: &Path, candidates: &CandidateSet) -> Result<(), BisectError>;
}

// ---------------------------------------------------------------------------
// Command-backed implementations
// ---------------------------------------------------------------------------

/// Join a command line for display. Not shell-quoted.
#[must_use]
pub fn format_command(args: &[String]) -> String {
    args.join(" ")
}

/// Lists tests by running `commands.list` and reading its stdout.
#[derive(Clone, Debug)]
pub struct CommandEnumerator {
    program: Vec<String>,
}

impl CommandEnumerator {
    #[must_use]
    pub fn new(context: &ExecutionContext) -> Self {
        Self {
            program: context.commands.list.clone(),
        }
    }
}

impl Enumerator for CommandEnumerator {
    #[instrument(skip_all, fields(args = test_args.len()))]
    fn enumerate(&mut self, test_args: &[String]) -> Result<Vec<String>, BisectError> {
        let argv: Vec<String> = self.program.iter().chain(test_args).cloned().collect();
        let command = format_command(&argv);
        tracing::debug!(%command, "listing tests");

        let (program, args) = split_program(&argv, &command)
            .map_err(|source| BisectError::EnumeratorLaunch {
                command: command.clone(),
                source,
            })?;
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .stdout(Stdio::piped())
            .output()
            .map_err(|source| BisectError::EnumeratorLaunch {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(BisectError::Enumeration {
                command,
                exit_code: exit_code(output.status),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }

        let ids: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect();
        tracing::info!(count = ids.len(), "listed tests");
        Ok(ids)
    }
}

/// Runs a subset by writing it to a scratch file and spawning `commands.run`.
///
/// The child inherits stdio so test output streams straight to the terminal.
#[derive(Clone, Debug)]
pub struct CommandExecutor {
    template: Vec<String>,
    poll_interval: Duration,
}

impl CommandExecutor {
    #[must_use]
    pub fn new(context: &ExecutionContext) -> Self {
        Self {
            template: context.commands.run.clone(),
            poll_interval: POLL_INTERVAL,
        }
    }

    /// Build the argv for one run: template with the scratch path filled in,
    /// then the pass-through args.
    fn argv(&self, matchfile: &Path, test_args: &[String]) -> Vec<String> {
        let path = matchfile.to_string_lossy();
        let mut argv: Vec<String> = self
            .template
            .iter()
            .map(|arg| arg.replace(MATCHFILE_PLACEHOLDER, &path))
            .collect();
        if !self.template.iter().any(|arg| arg.contains(MATCHFILE_PLACEHOLDER)) {
            argv.push(path.into_owned());
        }
        argv.extend(test_args.iter().cloned());
        argv
    }
}

impl Executor for CommandExecutor {
    #[instrument(skip_all, fields(tests = subset.len()))]
    fn execute(
        &mut self,
        subset: &[String],
        test_args: &[String],
        cancel: &CancelToken,
        report: &mut dyn Write,
    ) -> Result<ProbeStatus, BisectError> {
        // Removed when dropped, on every return path.
        let scratch = write_scratch(subset)?;
        let argv = self.argv(&scratch, test_args);
        let command = format_command(&argv);
        writeln!(report, "+ {command}")?;
        // The child shares stdout; our line must precede its output.
        report.flush()?;
        tracing::debug!(%command, matchfile = %scratch.display(), "running subset");

        let invocation_error = |source| BisectError::ExecutorInvocation {
            command: command.clone(),
            source,
        };
        let (program, args) = split_program(&argv, &command).map_err(invocation_error)?;
        let mut child = Command::new(program)
            .args(args)
            .spawn()
            .map_err(invocation_error)?;

        loop {
            if let Some(status) = child.try_wait().map_err(invocation_error)? {
                return Ok(classify_exit(status, cancel));
            }
            if cancel.is_cancelled() {
                if let Err(e) = child.kill() {
                    tracing::warn!("failed to stop test process: {e}");
                }
                if let Err(e) = child.wait() {
                    tracing::warn!("failed to reap test process: {e}");
                }
                return Ok(ProbeStatus::Interrupted);
            }
            std::thread::sleep(self.poll_interval);
        }
    }
}

/// Classify a finished test process.
///
/// Ctrl-C reaches the whole process group, so the child can die of SIGINT
/// before the handler thread sets the token. Such a death is an interrupt,
/// not a failing run: the token is set and the sample is not adopted.
fn classify_exit(status: ExitStatus, cancel: &CancelToken) -> ProbeStatus {
    let code = exit_code(status);
    let signalled = status.code().is_none();
    if signalled && code == -SIGINT {
        cancel.cancel();
    }
    if cancel.is_cancelled() {
        return ProbeStatus::Interrupted;
    }
    if signalled {
        tracing::warn!(code, "test process was killed by a signal");
    }
    ProbeStatus::Exited(code)
}

/// Write `subset` to a fresh temp file and close it, keeping only the path.
fn write_scratch(subset: &[String]) -> Result<TempPath, BisectError> {
    let scratch_error = |source| BisectError::ExecutorInvocation {
        command: "write test list to scratch file".to_owned(),
        source,
    };
    let mut file = tempfile::Builder::new()
        .prefix("test-bisect-")
        .suffix(".txt")
        .tempfile()
        .map_err(scratch_error)?;
    file.write_all(render_lines(subset).as_bytes())
        .map_err(scratch_error)?;
    file.flush().map_err(scratch_error)?;
    Ok(file.into_temp_path())
}

fn split_program<'a>(
    argv: &'a [String],
    command: &str,
) -> std::io::Result<(&'a String, &'a [String])> {
    argv.split_first().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("empty command line '{command}'"),
        )
    })
}

/// Exit code of a finished process; on Unix a signal death maps to the
/// negated signal number so it still counts as a failure.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt as _;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    1
}

/// Writes the candidate set to a plain file.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileResultWriter;

impl ResultWriter for FileResultWriter {
    fn write(&mut self, path: &Path, candidates: &CandidateSet) -> Result<(), BisectError> {
        if candidates.is_empty() {
            tracing::warn!(path = %path.display(), "writing an empty candidate set");
        }
        candidates.write_to(path)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(all(test, unix))]
mod tests {
    use std::io;

    use super::*;
    use crate::config::CommandsConfig;

    fn context(list: &[&str], run: &[&str]) -> ExecutionContext {
        ExecutionContext {
            commands: CommandsConfig {
                list: list.iter().map(|s| (*s).to_owned()).collect(),
                run: run.iter().map(|s| (*s).to_owned()).collect(),
            },
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn enumerator_reads_stdout_lines_and_forwards_args() {
        let ctx = context(&["sh", "-c", r#"printf '%s\n' test_a "" test_b "$@""#, "sh"], &["true"]);
        let ids = CommandEnumerator::new(&ctx)
            .enumerate(&strings(&["-R", "3:3"]))
            .unwrap();
        assert_eq!(ids, strings(&["test_a", "test_b", "-R", "3:3"]));
    }

    #[test]
    fn enumerator_failure_reports_command_code_and_stderr() {
        let ctx = context(&["sh", "-c", "echo 'no such test' >&2; exit 3"], &["true"]);
        let err = CommandEnumerator::new(&ctx).enumerate(&[]).unwrap_err();
        match err {
            BisectError::Enumeration {
                command,
                exit_code,
                stderr,
            } => {
                assert!(command.starts_with("sh -c"));
                assert_eq!(exit_code, 3);
                assert_eq!(stderr, "no such test");
            }
            other => panic!("expected Enumeration, got {other:?}"),
        }
    }

    #[test]
    fn enumerator_missing_program_is_launch_error() {
        let ctx = context(&["/nonexistent/lister"], &["true"]);
        let err = CommandEnumerator::new(&ctx).enumerate(&[]).unwrap_err();
        assert!(matches!(err, BisectError::EnumeratorLaunch { .. }), "{err:?}");
    }

    #[test]
    fn executor_reports_failure_when_poison_present() {
        let ctx = context(
            &["true"],
            &["sh", "-c", r#"grep -qx poison "$1" && exit 1; exit 0"#, "sh", "{matchfile}"],
        );
        let mut exec = CommandExecutor::new(&ctx);
        let cancel = CancelToken::new();

        let mut report = Vec::new();

        let failed = exec
            .execute(&strings(&["a", "poison"]), &[], &cancel, &mut report)
            .unwrap();
        assert_eq!(failed, ProbeStatus::Exited(1));

        let passed = exec
            .execute(&strings(&["a", "b"]), &[], &cancel, &mut report)
            .unwrap();
        assert_eq!(passed, ProbeStatus::Exited(0));
    }

    #[test]
    fn executor_passes_subset_file_and_removes_it_afterwards() {
        let dir = tempfile::tempdir().unwrap();
        let copy = dir.path().join("copy");
        let ctx = context(
            &["true"],
            &["sh", "-c", r#"cp "$1" "$2"; echo "$1" > "$2.path""#, "sh", "{matchfile}"],
        );
        let status = CommandExecutor::new(&ctx)
            .execute(
                &strings(&["t1", "t2"]),
                &[copy.to_string_lossy().into_owned()],
                &CancelToken::new(),
                &mut io::sink(),
            )
            .unwrap();

        assert_eq!(status, ProbeStatus::Exited(0));
        assert_eq!(std::fs::read_to_string(&copy).unwrap(), "t1\nt2\n");
        let scratch = std::fs::read_to_string(dir.path().join("copy.path")).unwrap();
        assert!(!Path::new(scratch.trim()).exists(), "scratch file left behind");
    }

    #[test]
    fn executor_appends_matchfile_when_template_has_no_placeholder() {
        let ctx = context(&["true"], &["runner", "--quiet"]);
        let exec = CommandExecutor::new(&ctx);
        let argv = exec.argv(Path::new("/tmp/x.txt"), &strings(&["-v"]));
        assert_eq!(argv, strings(&["runner", "--quiet", "/tmp/x.txt", "-v"]));
    }

    #[test]
    fn executor_substitutes_placeholder_inside_argument() {
        let ctx = context(&["true"], &["runner", "--matchfile={matchfile}"]);
        let exec = CommandExecutor::new(&ctx);
        let argv = exec.argv(Path::new("/tmp/x.txt"), &[]);
        assert_eq!(argv, strings(&["runner", "--matchfile=/tmp/x.txt"]));
    }

    #[test]
    fn executor_missing_program_is_invocation_error() {
        let ctx = context(&["true"], &["/nonexistent/runner", "{matchfile}"]);
        let err = CommandExecutor::new(&ctx)
            .execute(&strings(&["a"]), &[], &CancelToken::new(), &mut io::sink())
            .unwrap_err();
        assert!(matches!(err, BisectError::ExecutorInvocation { .. }), "{err:?}");
    }

    #[test]
    fn executor_signal_death_counts_as_failure() {
        let ctx = context(&["true"], &["sh", "-c", "kill -TERM $$", "sh", "{matchfile}"]);
        let status = CommandExecutor::new(&ctx)
            .execute(&strings(&["a"]), &[], &CancelToken::new(), &mut io::sink())
            .unwrap();
        assert_eq!(status, ProbeStatus::Exited(-15));
    }

    #[test]
    fn sigint_death_cancels_and_interrupts() {
        use std::os::unix::process::ExitStatusExt as _;

        let cancel = CancelToken::new();
        let status = classify_exit(ExitStatus::from_raw(SIGINT), &cancel);
        assert_eq!(status, ProbeStatus::Interrupted);
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn other_exits_leave_the_token_alone() {
        use std::os::unix::process::ExitStatusExt as _;

        let cancel = CancelToken::new();
        assert_eq!(
            classify_exit(ExitStatus::from_raw(15), &cancel),
            ProbeStatus::Exited(-15)
        );
        assert_eq!(
            classify_exit(ExitStatus::from_raw(1 << 8), &cancel),
            ProbeStatus::Exited(1)
        );
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn executor_child_killed_by_sigint_is_an_interrupt() {
        let ctx = context(&["true"], &["sh", "-c", "kill -INT $$", "sh", "{matchfile}"]);
        let cancel = CancelToken::new();
        let status = CommandExecutor::new(&ctx)
            .execute(&strings(&["a"]), &[], &cancel, &mut io::sink())
            .unwrap();
        assert_eq!(status, ProbeStatus::Interrupted);
        assert!(cancel.is_cancelled());
    }

    #[test]
    fn executor_echoes_command_to_report() {
        let ctx = context(&["true"], &["sh", "-c", "exit 0", "sh", "{matchfile}"]);
        let mut report = Vec::new();
        CommandExecutor::new(&ctx)
            .execute(&strings(&["a"]), &strings(&["-v"]), &CancelToken::new(), &mut report)
            .unwrap();
        let report = String::from_utf8(report).unwrap();
        assert!(report.starts_with("+ sh -c exit 0 sh "), "{report}");
        assert!(report.trim_end().ends_with(".txt -v"), "{report}");
        assert_eq!(report.lines().count(), 1);
    }

    #[test]
    fn executor_stops_child_when_cancelled() {
        let ctx = context(&["true"], &["sh", "-c", "sleep 30", "sh", "{matchfile}"]);
        let cancel = CancelToken::new();
        cancel.cancel();
        let started = std::time::Instant::now();
        let status = CommandExecutor::new(&ctx)
            .execute(&strings(&["a"]), &[], &cancel, &mut io::sink())
            .unwrap();
        assert_eq!(status, ProbeStatus::Interrupted);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn file_writer_overwrites_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bisect");
        let mut writer = FileResultWriter;
        writer
            .write(&path, &CandidateSet::new(strings(&["a", "b"])))
            .unwrap();
        writer
            .write(&path, &CandidateSet::new(strings(&["b"])))
            .unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "b\n");
    }
}
