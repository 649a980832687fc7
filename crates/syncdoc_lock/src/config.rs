//! Lock configuration.

use std::time::Duration;

/// Default blocking/timeout parameters for a lock instance.
///
/// These apply to scoped acquisition via `guard()`; the explicit
/// `acquire(blocking, timeout)` call takes its parameters directly.
#[derive(Debug, Clone, Copy)]
pub struct LockConfig {
    /// Whether scoped acquisition blocks until the lock is available.
    pub blocking: bool,

    /// How long a blocking acquisition waits before giving up.
    ///
    /// `None` means no limit: a blocking acquire waits indefinitely.
    pub timeout: Option<Duration>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            blocking: true,
            timeout: None,
        }
    }
}

impl LockConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether scoped acquisition blocks.
    #[must_use]
    pub const fn blocking(mut self, value: bool) -> Self {
        self.blocking = value;
        self
    }

    /// Sets the blocking-acquisition timeout.
    #[must_use]
    pub const fn timeout(mut self, value: Duration) -> Self {
        self.timeout = Some(value);
        self
    }
}
