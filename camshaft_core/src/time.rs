use std::{fmt::Display, time::Duration};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Logical time, measured as a duration since the origin of execution.
///
/// The scheduler never reads a wall clock; hosts that synchronize with
/// physical time translate to and from this origin-relative form at the
/// boundary.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Timestamp(Duration);

impl Timestamp {
    /// The origin of logical time.
    pub const ZERO: Self = Self(Duration::ZERO);

    pub fn as_duration(self) -> Duration {
        self.0
    }
}

impl From<Duration> for Timestamp {
    fn from(duration: Duration) -> Self {
        Self(duration)
    }
}

impl From<Timestamp> for Duration {
    fn from(timestamp: Timestamp) -> Self {
        timestamp.0
    }
}

impl std::ops::Add<Duration> for Timestamp {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + rhs)
    }
}

/// A point on the reactor timeline: a logical-time offset from the origin
/// plus the superdense microstep that orders instants sharing that offset.
///
/// Tags are totally ordered, offset first, microstep second; the scheduler
/// only ever moves to strictly larger tags.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    /// Offset from the origin of logical time.
    pub offset: Timestamp,
    /// Superdense microstep within `offset`.
    pub microstep: usize,
}

impl Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:?}, {})", self.offset.as_duration(), self.microstep)
    }
}

impl Tag {
    pub fn new(offset: impl Into<Timestamp>, microstep: usize) -> Tag {
        Self {
            offset: offset.into(),
            microstep,
        }
    }

    /// The first tag of an execution.
    pub fn origin() -> Tag {
        Self {
            offset: Timestamp::ZERO,
            microstep: 0,
        }
    }

    /// The strictly-next tag: the same logical time, one microstep later.
    pub fn next_microstep(&self) -> Tag {
        Self {
            offset: self.offset,
            microstep: self.microstep + 1,
        }
    }

    /// The tag `delay` later in logical time. Moving in logical time resets
    /// the microstep.
    pub fn after(&self, delay: Duration) -> Tag {
        Self {
            offset: self.offset + delay,
            microstep: 0,
        }
    }

    pub fn offset(&self) -> Duration {
        self.offset.as_duration()
    }
}
