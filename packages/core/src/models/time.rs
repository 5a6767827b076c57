//! Time Provider Abstraction
//!
//! Snooze evaluation and `updated_at` stamping read the clock through
//! [`TimeProvider`] so tests can pin "now" instead of sleeping.
//!
//! # Examples
//!
//! ```rust
//! use nodegraph_core::models::time::{MockTimeProvider, SystemTimeProvider, TimeProvider};
//! use chrono::{Duration, Utc};
//!
//! let provider = SystemTimeProvider;
//! assert!(provider.now() <= Utc::now());
//!
//! let mock = MockTimeProvider::new();
//! let before = mock.now();
//! mock.advance(Duration::hours(1));
//! assert_eq!(mock.now() - before, Duration::hours(1));
//! ```

use chrono::{DateTime, Utc};
use std::sync::Mutex;

/// Trait for providing current time
pub trait TimeProvider: Send + Sync {
    /// Get the current UTC time
    fn now(&self) -> DateTime<Utc>;
}

/// System time provider using actual system clock
///
/// This is the default implementation for production use.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Mock time provider for testing
///
/// Interior mutability lets a test hold an `Arc<MockTimeProvider>` shared with
/// a `NodeStore` and move time forward while the store is alive.
#[derive(Debug)]
pub struct MockTimeProvider {
    current_time: Mutex<DateTime<Utc>>,
}

impl MockTimeProvider {
    /// Create a new mock time provider starting at the current time
    pub fn new() -> Self {
        Self::with_time(Utc::now())
    }

    /// Create a mock time provider with a specific starting time
    pub fn with_time(time: DateTime<Utc>) -> Self {
        Self {
            current_time: Mutex::new(time),
        }
    }

    /// Set the current time to a specific value
    pub fn set_time(&self, time: DateTime<Utc>) {
        let mut current = self
            .current_time
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current = time;
    }

    /// Advance time by the given duration
    pub fn advance(&self, duration: chrono::Duration) {
        let mut current = self
            .current_time
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *current += duration;
    }
}

impl TimeProvider for MockTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        *self
            .current_time
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MockTimeProvider {
    fn default() -> Self {
        Self::new()
    }
}
