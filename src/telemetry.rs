//! Telemetry initialization.
//!
//! Controlled by `TEST_BISECT_LOG`:
//! - unset or empty → no subscriber (tracing disabled, zero overhead)
//! - `"json"` → JSON events to stderr, filtered by `RUST_LOG` (default `info`)
//! - anything else → used as the `EnvFilter` directive for human-readable
//!   events on stderr, e.g. `TEST_BISECT_LOG=bisect=debug`
//!
//! Progress output on stdout is unaffected: the test runner's own output is
//! interleaved there, so diagnostics stay on stderr.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

/// Environment variable selecting the log mode.
pub const LOG_ENV: &str = "TEST_BISECT_LOG";

/// Log mode parsed from [`LOG_ENV`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogMode {
    Off,
    Json,
    Text(String),
}

impl LogMode {
    #[must_use]
    pub fn from_env_value(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::Off,
            Some("json") => Self::Json,
            Some(directive) => Self::Text(directive.to_owned()),
        }
    }
}

/// Install the global subscriber according to [`LOG_ENV`].
pub fn init() {
    let value = std::env::var(LOG_ENV).ok();
    match LogMode::from_env_value(value.as_deref()) {
        LogMode::Off => {}
        LogMode::Json => init_json(),
        LogMode::Text(directive) => init_text(&directive),
    }
}

fn init_json() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_span_events(tracing_subscriber::fmt::format::FmtSpan::CLOSE),
        )
        .init();
}

fn init_text(directive: &str) {
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|e| {
        eprintln!("warning: invalid {LOG_ENV} value '{directive}': {e}; using 'info'");
        EnvFilter::new("info")
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_or_blank_is_off() {
        assert_eq!(LogMode::from_env_value(None), LogMode::Off);
        assert_eq!(LogMode::from_env_value(Some("  ")), LogMode::Off);
    }

    #[test]
    fn json_selects_json() {
        assert_eq!(LogMode::from_env_value(Some("json")), LogMode::Json);
    }

    #[test]
    fn other_values_are_filter_directives() {
        assert_eq!(
            LogMode::from_env_value(Some("bisect=debug")),
            LogMode::Text("bisect=debug".to_owned())
        );
    }
}
