// SPDX-License-Identifier: MIT OR Apache-2.0
//! Clock abstraction.
//!
//! Event and manifest timestamps flow through a [`Clock`] so tests can pin
//! them. Production code uses [`SystemClock`].

use chrono::{DateTime, Utc};

/// Source of timestamps for events, manifests, and plans.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to a fixed instant. Test helper.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// A fixed clock at an arbitrary but stable instant.
    #[must_use]
    pub fn default_epoch() -> Self {
        Self(
            DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .expect("valid rfc3339 literal")
                .with_timezone(&Utc),
        )
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_stable() {
        let clock = FixedClock::default_epoch();
        assert_eq!(clock.now(), clock.now());
    }

    #[test]
    fn system_clock_advances_monotonically_enough() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
