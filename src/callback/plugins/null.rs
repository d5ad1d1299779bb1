//! Null reporter.
//!
//! Produces no output at all. Used for ad-hoc execution and in tests that
//! only care about the run's outcome.

use super::super::Reporter;

/// Reporter that ignores every event.
///
/// A zero-sized type; all hooks fall back to the trait's no-op defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct NullReporter;

impl NullReporter {
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Reporter for NullReporter {}
