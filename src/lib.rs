//! test-bisect library crate — re-exports for the binary and integration tests.
//!
//! The primary interface is the `test-bisect` binary. The bisection loop and
//! its collaborators live here so they can be driven with fakes in tests.

pub mod bisect;
pub mod cancel;
pub mod candidates;
pub mod config;
pub mod error;
pub mod oracle;
pub mod telemetry;
