// workflow-core/src/time.rs
// ============================================================================
// Module: Workflow Engine Timestamps
// Description: Wall-clock timestamp type shared across the engine.
// Purpose: Provide a single, serializable ISO-8601 timestamp representation.
// Dependencies: time, serde
// ============================================================================

//! ## Overview
//! All timestamps in persisted records and emitted events are RFC 3339
//! (ISO-8601) strings. Components never format timestamps by hand; they go
//! through this wrapper so the wire representation stays consistent.

use serde::Deserialize;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// A point in wall-clock time, serialized as RFC 3339.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(#[serde(with = "time::serde::rfc3339")] OffsetDateTime);

impl Timestamp {
    /// Returns the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Wraps an existing [`OffsetDateTime`].
    #[must_use]
    pub const fn from_offset(value: OffsetDateTime) -> Self {
        Self(value)
    }

    /// Returns the inner [`OffsetDateTime`].
    #[must_use]
    pub const fn as_offset(self) -> OffsetDateTime {
        self.0
    }

    /// Returns the number of whole milliseconds elapsed from `self` to `other`.
    ///
    /// Returns `0` if `other` is earlier than `self` (clocks never run
    /// backwards in a single run's lifecycle; a negative delta indicates a
    /// caller error rather than a valid duration).
    #[must_use]
    pub fn duration_ms_since(self, other: Self) -> u64 {
        let delta = other.0 - self.0;
        u64::try_from(delta.whole_milliseconds()).unwrap_or(0)
    }

    /// Formats the timestamp as RFC 3339 text.
    #[must_use]
    pub fn to_rfc3339(self) -> String {
        self.0.format(&Rfc3339).unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]
mod tests {
    use super::*;

    #[test]
    fn duration_ms_since_is_monotonic() {
        let start = Timestamp::now();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let end = Timestamp::now();
        assert!(start.duration_ms_since(end) >= 5);
        assert_eq!(end.duration_ms_since(start), 0);
    }

    #[test]
    fn round_trips_through_rfc3339() {
        let now = Timestamp::now();
        let text = now.to_rfc3339();
        assert!(text.contains('T'));
    }
}
