//! # Temporal Types: Verification Timestamps and Clocks
//!
//! Defines `Timestamp`, a UTC-only timestamp truncated to seconds, and the
//! [`Clock`] seam through which the ledger reads "now" for KYC expiry and
//! authority approval windows.
//!
//! The ledger never calls the system clock directly. Production wiring uses
//! [`SystemClock`]; tests and scenario replays pin time with [`FixedClock`].
//!
//! Expiry semantics: a record with expiry `e` is valid strictly before `e`
//! (`now < e`) and invalid at and after it.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A UTC timestamp, truncated to seconds precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current UTC time, truncated to seconds.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// From a `chrono::DateTime<Utc>`, truncating sub-seconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// From a Unix epoch timestamp (seconds).
    pub fn from_epoch_secs(secs: i64) -> Result<Self, ValidationError> {
        DateTime::from_timestamp(secs, 0)
            .map(Self)
            .ok_or(ValidationError::InvalidTimestamp(secs))
    }

    /// Parse an RFC 3339 string with a `Z` suffix.
    pub fn parse(s: &str) -> Result<Self, ValidationError> {
        if !s.ends_with('Z') {
            return Err(ValidationError::MalformedTimestamp(s.to_string()));
        }
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|_| ValidationError::MalformedTimestamp(s.to_string()))?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    /// Unix epoch seconds.
    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// Access the inner `DateTime<Utc>`.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Render as ISO8601 with Z suffix (e.g. `2026-01-15T12:00:00Z`).
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

// ─── Clocks ──────────────────────────────────────────────────────────

/// Source of the verification timestamp.
pub trait Clock: Send + Sync {
    /// The current time as seen by the ledger.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A manually driven clock. Time only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    epoch_secs: AtomicI64,
}

impl FixedClock {
    /// Pin the clock at `at`.
    pub fn new(at: Timestamp) -> Self {
        Self {
            epoch_secs: AtomicI64::new(at.epoch_secs()),
        }
    }

    /// Pin the clock at a Unix epoch second.
    pub fn at_epoch(secs: i64) -> Result<Self, ValidationError> {
        Ok(Self::new(Timestamp::from_epoch_secs(secs)?))
    }

    /// Move the clock to `at`. Moving backwards is ignored: the
    /// verification clock is monotonic.
    pub fn set(&self, at: Timestamp) {
        self.epoch_secs.fetch_max(at.epoch_secs(), Ordering::SeqCst);
    }

    /// Advance the clock by `secs` seconds.
    pub fn advance(&self, secs: u32) {
        self.epoch_secs.fetch_add(i64::from(secs), Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        let secs = self.epoch_secs.load(Ordering::SeqCst);
        DateTime::from_timestamp(secs, 0)
            .map(Timestamp)
            .unwrap_or_else(Timestamp::now)
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_from_utc_truncates() {
        let dt = Utc.with_ymd_and_hms(2026, 1, 15, 12, 30, 45).unwrap();
        let ts = Timestamp::from_utc(dt.with_nanosecond(123_456_789).unwrap());
        assert_eq!(ts.as_datetime().nanosecond(), 0);
        assert_eq!(ts.to_iso8601(), "2026-01-15T12:30:45Z");
    }

    #[test]
    fn test_parse_requires_z_suffix() {
        assert!(Timestamp::parse("2026-01-15T12:00:00Z").is_ok());
        assert!(Timestamp::parse("2026-01-15T12:00:00+00:00").is_err());
        assert!(Timestamp::parse("not-a-date").is_err());
    }

    #[test]
    fn test_epoch_roundtrip() {
        let ts = Timestamp::from_epoch_secs(9_999_999_999).unwrap();
        assert_eq!(ts.epoch_secs(), 9_999_999_999);
    }

    #[test]
    fn test_fixed_clock_advances() {
        let clock = FixedClock::at_epoch(1_000).unwrap();
        assert_eq!(clock.now().epoch_secs(), 1_000);
        clock.advance(60);
        assert_eq!(clock.now().epoch_secs(), 1_060);
    }

    #[test]
    fn test_fixed_clock_is_monotonic() {
        let clock = FixedClock::at_epoch(5_000).unwrap();
        clock.set(Timestamp::from_epoch_secs(4_000).unwrap());
        assert_eq!(clock.now().epoch_secs(), 5_000);
        clock.set(Timestamp::from_epoch_secs(6_000).unwrap());
        assert_eq!(clock.now().epoch_secs(), 6_000);
    }
}
