//! Error types for test bisection.
//!
//! Defines [`BisectError`], the unified error type for loading candidates,
//! driving the enumerator and executor commands, and persisting results.
//! Every message names what failed and ends with a hint on how to fix it.
//!
//! A failing probe (the executor exiting nonzero) is *not* an error: it is the
//! signal the bisector is looking for. Likewise an interrupt is reported
//! through [`crate::bisect::RunStatus::Interrupted`], never through this type.

use std::fmt;
use std::io;
use std::path::PathBuf;

use crate::config::ConfigError;

// ---------------------------------------------------------------------------
// BisectError
// ---------------------------------------------------------------------------

/// Unified error type for a bisection run.
#[derive(Debug)]
pub enum BisectError {
    /// The enumerator command exited with a nonzero status.
    Enumeration {
        /// The command line that was run.
        command: String,
        /// The process exit code (negative signal number if killed).
        exit_code: i32,
        /// Captured stderr (trimmed, may be empty).
        stderr: String,
    },

    /// The enumerator command could not be started.
    EnumeratorLaunch {
        /// The command line that was attempted.
        command: String,
        /// Underlying spawn error.
        source: io::Error,
    },

    /// The candidate input file could not be read.
    InputFile {
        /// Path of the input list.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The executor could not be invoked (spawn failure, scratch file I/O).
    ExecutorInvocation {
        /// The command line, or a description of the failed step.
        command: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The result file could not be written.
    OutputFile {
        /// Path of the output file.
        path: PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The command configuration file is invalid.
    Config(ConfigError),

    /// Writing the progress report failed.
    Io(io::Error),
}

impl BisectError {
    /// Process exit status to use when this error ends the program.
    ///
    /// Enumerator failures propagate the enumerator's own status when it fits
    /// in a process exit code; everything else exits with 1.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Enumeration { exit_code, .. } => u8::try_from(*exit_code)
                .ok()
                .filter(|code| *code != 0)
                .unwrap_or(1),
            _ => 1,
        }
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

impl fmt::Display for BisectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enumeration {
                command,
                exit_code,
                stderr,
            } => {
                write!(
                    f,
                    "failed to list tests: {command} failed with exit code {exit_code}"
                )?;
                if !stderr.is_empty() {
                    write!(f, "\n  stderr: {stderr}")?;
                }
                write!(
                    f,
                    "\n  To fix: run the list command by hand, or pass an existing list with -i."
                )
            }
            Self::EnumeratorLaunch { command, source } => {
                write!(
                    f,
                    "could not start list command '{command}': {source}\n  To fix: check [commands] list in the config file."
                )
            }
            Self::InputFile { path, source } => {
                write!(
                    f,
                    "could not read test list '{}': {source}\n  To fix: check the path given to -i.",
                    path.display()
                )
            }
            Self::ExecutorInvocation { command, source } => {
                write!(
                    f,
                    "could not run tests with '{command}': {source}\n  To fix: check [commands] run in the config file."
                )
            }
            Self::OutputFile { path, source } => {
                write!(
                    f,
                    "could not write result file '{}': {source}\n  To fix: check the path given to -o and its directory permissions.",
                    path.display()
                )
            }
            Self::Config(err) => write!(f, "{err}"),
            Self::Io(err) => {
                write!(f, "I/O error: {err}\n  To fix: check that stdout is writable.")
            }
        }
    }
}

// ---------------------------------------------------------------------------
// std::error::Error
// ---------------------------------------------------------------------------

impl std::error::Error for BisectError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::EnumeratorLaunch { source, .. }
            | Self::InputFile { source, .. }
            | Self::ExecutorInvocation { source, .. }
            | Self::OutputFile { source, .. }
            | Self::Io(source) => Some(source),
            Self::Config(err) => Some(err),
            Self::Enumeration { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// From impls
// ---------------------------------------------------------------------------

impl From<io::Error> for BisectError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<ConfigError> for BisectError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
