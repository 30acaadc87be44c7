//! Wall-clock instants and the monotonic clock that orders appends.

use std::fmt;

use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// A wall-clock instant in unix milliseconds.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Moment(u64);

impl Moment {
    pub const ZERO: Moment = Moment(0);

    pub fn from_unix_ms(ms: u64) -> Self {
        Self(ms)
    }

    pub fn now() -> Self {
        let nanos = OffsetDateTime::now_utc().unix_timestamp_nanos();
        Self((nanos / 1_000_000).max(0) as u64)
    }

    pub fn unix_ms(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Moment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dt = OffsetDateTime::from_unix_timestamp_nanos(i128::from(self.0) * 1_000_000);
        match dt.ok().and_then(|dt| dt.format(&Rfc3339).ok()) {
            Some(text) => f.write_str(&text),
            None => write!(f, "{}ms", self.0),
        }
    }
}

/// Strictly monotonic clock.
///
/// Schema snapshots and action appends are stamped through one clock, so a
/// snapshot registered before a write always carries a strictly earlier
/// `Moment`, even when both happen within the same millisecond.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Clock {
    last_ms: u64,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resumes a clock at or after `floor`, for state loaded from an export.
    pub fn resume(floor: Moment) -> Self {
        Self {
            last_ms: floor.unix_ms(),
        }
    }

    pub fn tick(&mut self) -> Moment {
        let now = Moment::now().unix_ms();
        self.last_ms = now.max(self.last_ms + 1);
        Moment(self.last_ms)
    }
}
