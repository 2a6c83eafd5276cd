//! Bisection configuration.
//!
//! Two layers:
//! - [`BisectionConfig`] — immutable per-run inputs built from the command
//!   line (candidate source, output path, stop threshold, pass-through args).
//! - [`ExecutionContext`] — the enumerator/executor command templates, read
//!   from an optional `.test-bisect.toml`.

use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Default location of the command configuration, relative to the working
/// directory.
pub const DEFAULT_CONFIG_FILE: &str = ".test-bisect.toml";

/// Placeholder in the run command replaced by the scratch file path.
pub const MATCHFILE_PLACEHOLDER: &str = "{matchfile}";

// ---------------------------------------------------------------------------
// BisectionConfig
// ---------------------------------------------------------------------------

/// Where the initial candidate list comes from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CandidateSource {
    /// Read identifiers from a file, one per line.
    InputFile(PathBuf),
    /// Ask the enumerator command for the list.
    Enumerate,
}

/// Immutable inputs for one bisection run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BisectionConfig {
    /// Initial candidate source.
    pub source: CandidateSource,
    /// Where to persist the candidate set each time it changes.
    pub output: Option<PathBuf>,
    /// Stop once the candidate set has at most this many entries.
    pub max_tests: NonZeroUsize,
    /// Arguments forwarded verbatim to both the enumerator and the executor.
    pub test_args: Vec<String>,
    /// Stop after this many probes even if the set is still too large.
    ///
    /// `None` keeps probing until the failure reproduces, however long that
    /// takes.
    pub max_iterations: Option<u64>,
}

impl Default for BisectionConfig {
    fn default() -> Self {
        Self {
            source: CandidateSource::Enumerate,
            output: None,
            max_tests: NonZeroUsize::MIN,
            test_args: Vec::new(),
            max_iterations: None,
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionContext
// ---------------------------------------------------------------------------

/// Command templates used to list and run tests.
///
/// Parsed from `.test-bisect.toml`. Missing file → defaults that drive the
/// CPython regression test runner.
///
/// ```toml
/// [commands]
/// list = ["python3", "-m", "test", "--list-cases"]
/// run = ["python3", "-m", "test", "--matchfile", "{matchfile}"]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ExecutionContext {
    /// Enumerator and executor commands.
    #[serde(default)]
    pub commands: CommandsConfig,
}

/// The two external commands the bisector drives.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CommandsConfig {
    /// Prints one test identifier per line. Pass-through args are appended.
    #[serde(default = "default_list_command")]
    pub list: Vec<String>,

    /// Runs the tests named in a file and exits nonzero on any failure.
    ///
    /// `{matchfile}` is replaced with the scratch file path; if no argument
    /// contains it the path is appended. Pass-through args come last.
    #[serde(default = "default_run_command")]
    pub run: Vec<String>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            list: default_list_command(),
            run: default_run_command(),
        }
    }
}

fn default_list_command() -> Vec<String> {
    ["python3", "-m", "test", "--list-cases"]
        .map(str::to_owned)
        .to_vec()
}

fn default_run_command() -> Vec<String> {
    ["python3", "-m", "test", "--matchfile", MATCHFILE_PLACEHOLDER]
        .map(str::to_owned)
        .to_vec()
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading the command configuration file.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl ExecutionContext {
    /// Load command templates from a TOML file.
    ///
    /// A missing file is not an error: the defaults are returned.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found), parse
    /// errors, or empty command arrays.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using default commands");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse command templates from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML, unknown fields, or an empty
    /// command array.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        let ctx: Self = toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })?;
        ctx.validate()?;
        Ok(ctx)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (key, command) in [("list", &self.commands.list), ("run", &self.commands.run)] {
            if command.first().is_none_or(String::is_empty) {
                return Err(ConfigError {
                    path: None,
                    message: format!("commands.{key} must name a program"),
                });
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_string() {
        let ctx = ExecutionContext::parse("").unwrap();
        assert_eq!(ctx, ExecutionContext::default());
    }

    #[test]
    fn default_commands_drive_cpython_runner() {
        let ctx = ExecutionContext::default();
        assert_eq!(ctx.commands.list.last().map(String::as_str), Some("--list-cases"));
        assert!(ctx.commands.run.iter().any(|a| a == MATCHFILE_PLACEHOLDER));
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[commands]
list = ["cargo", "nextest", "list", "--message-format", "oneline"]
run = ["./run-subset.sh", "--from", "{matchfile}"]
"#;
        let ctx = ExecutionContext::parse(toml).unwrap();
        assert_eq!(ctx.commands.list[0], "cargo");
        assert_eq!(ctx.commands.list.len(), 5);
        assert_eq!(ctx.commands.run, ["./run-subset.sh", "--from", "{matchfile}"]);
    }

    #[test]
    fn parse_partial_config_uses_defaults() {
        let ctx = ExecutionContext::parse(
            r#"
[commands]
run = ["make", "check-subset"]
"#,
        )
        .unwrap();
        assert_eq!(ctx.commands.list, default_list_command());
        assert_eq!(ctx.commands.run, ["make", "check-subset"]);
    }

    #[test]
    fn parse_rejects_unknown_field() {
        let err = ExecutionContext::parse(
            r#"
[commands]
lsit = ["x"]
"#,
        )
        .unwrap_err();
        assert!(err.message.contains("lsit"), "{}", err.message);
    }

    #[test]
    fn parse_rejects_empty_command() {
        let err = ExecutionContext::parse("[commands]\nrun = []\n").unwrap_err();
        assert!(err.message.contains("commands.run"));

        let err = ExecutionContext::parse("[commands]\nlist = [\"\"]\n").unwrap_err();
        assert!(err.message.contains("commands.list"));
    }

    #[test]
    fn parse_includes_line_number_on_error() {
        let err = ExecutionContext::parse("[commands]\nrun = 3\n").unwrap_err();
        assert!(err.message.starts_with("line 2:"), "{}", err.message);
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let ctx = ExecutionContext::load(Path::new("/nonexistent/.test-bisect.toml")).unwrap();
        assert_eq!(ctx, ExecutionContext::default());
    }

    #[test]
    fn load_invalid_file_shows_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid [[[toml").unwrap();
        let err = ExecutionContext::load(&path).unwrap_err();
        assert_eq!(err.path.as_deref(), Some(path.as_path()));
        assert!(format!("{err}").contains("bad.toml"));
    }

    #[test]
    fn config_error_display_without_path() {
        let err = ConfigError {
            path: None,
            message: "parse error".to_owned(),
        };
        let msg = format!("{err}");
        assert!(msg.contains("config error"));
        assert!(msg.contains("parse error"));
    }

    #[test]
    fn bisection_config_defaults() {
        let cfg = BisectionConfig::default();
        assert_eq!(cfg.source, CandidateSource::Enumerate);
        assert_eq!(cfg.max_tests.get(), 1);
        assert!(cfg.output.is_none());
        assert!(cfg.max_iterations.is_none());
    }
}
