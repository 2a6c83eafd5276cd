//! Cooperative cancellation for Ctrl-C.
//!
//! The interrupt handler only flips a flag. The bisector checks it before each
//! probe, and the command executor polls it while the test process runs so it
//! can stop the child and report [`crate::oracle::ProbeStatus::Interrupted`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared "stop now" flag. Clones observe the same flag.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Route SIGINT (Ctrl-C) to this token instead of killing the process.
    ///
    /// Can only be installed once per process.
    ///
    /// # Errors
    /// Returns the handler registration error from `ctrlc`.
    pub fn install_interrupt_handler(&self) -> Result<(), ctrlc::Error> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            token.cancel();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_token_is_not_cancelled() {
        assert!(!CancelToken::new().is_cancelled());
    }

    #[test]
    fn clones_share_the_flag() {
        let token = CancelToken::new();
        let handle = token.clone();
        handle.cancel();
        assert!(token.is_cancelled());
        handle.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_is_visible_across_threads() {
        let token = CancelToken::new();
        let remote = token.clone();
        std::thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(token.is_cancelled());
    }
}
