//! Cooperative cancellation.
//!
//! The checker runs long analyses on one thread per file. An editor host can
//! request cancellation at any time; analyses poll a shared token at their
//! entry points and unwind by propagating [`Cancelled`] as an error value.
//! All engine state (pending markers, finally gates, speculative regions)
//! must be restored on the unwind path.

use std::cell::Cell;
use std::rc::Rc;

/// Error value signalling that the current top-level operation was cancelled.
///
/// This is the only recoverable failure in the analysis path; it carries no
/// payload and surfaces to the top-level caller unchanged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// A cheaply clonable cancellation flag shared between a host and the
/// analyses it drives.
///
/// Single-threaded by design: clones share one `Cell` through an `Rc`.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Rc<Cell<bool>>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Analyses observe it at their next poll.
    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }

    /// Poll the token, returning `Err(Cancelled)` if cancellation was
    /// requested. Intended for use with the `?` operator.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_clear() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert_eq!(token.check(), Ok(()));
    }

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert_eq!(token.check(), Err(Cancelled));
    }
}
