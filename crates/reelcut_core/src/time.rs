use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// A point in time expressed as a value at a given rate.
///
/// Video tracks typically run at a frame rate such as 24 or 30, while
/// audio tracks use the sample rate (e.g. 48000). Arithmetic between
/// mismatched rates rescales the lower-rate operand to the higher rate
/// first, so cross-rate math stays exact for whole-frame values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RationalTime {
    pub value: f64,
    pub rate: f64,
}

impl RationalTime {
    pub const fn new(value: f64, rate: f64) -> Self {
        Self { value, rate }
    }

    /// Zero frames at the given rate.
    pub const fn zero(rate: f64) -> Self {
        Self { value: 0.0, rate }
    }

    /// The value this time would have at `rate`.
    pub fn value_rescaled_to(&self, rate: f64) -> f64 {
        if self.rate == rate {
            self.value
        } else {
            self.value * rate / self.rate
        }
    }

    /// The same instant expressed at a different rate.
    pub fn rescaled_to(&self, rate: f64) -> Self {
        Self::new(self.value_rescaled_to(rate), rate)
    }

    /// Round the value to the nearest whole frame, keeping the rate.
    pub fn round(&self) -> Self {
        Self::new(self.value.round(), self.rate)
    }

    /// Round the value down to a whole frame, keeping the rate.
    pub fn floor(&self) -> Self {
        Self::new(self.value.floor(), self.rate)
    }
}

impl fmt::Display for RationalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.value, self.rate)
    }
}

impl PartialEq for RationalTime {
    fn eq(&self, other: &Self) -> bool {
        self.value_rescaled_to(other.rate) == other.value
    }
}

impl PartialOrd for RationalTime {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.value_rescaled_to(other.rate).partial_cmp(&other.value)
    }
}

// The operand with the higher rate determines the result's rate.
impl Add for RationalTime {
    type Output = RationalTime;

    fn add(self, other: RationalTime) -> RationalTime {
        if self.rate >= other.rate {
            RationalTime::new(self.value + other.value_rescaled_to(self.rate), self.rate)
        } else {
            RationalTime::new(self.value_rescaled_to(other.rate) + other.value, other.rate)
        }
    }
}

impl Sub for RationalTime {
    type Output = RationalTime;

    fn sub(self, other: RationalTime) -> RationalTime {
        self + (-other)
    }
}

impl Neg for RationalTime {
    type Output = RationalTime;

    fn neg(self) -> RationalTime {
        RationalTime::new(-self.value, self.rate)
    }
}

impl AddAssign for RationalTime {
    fn add_assign(&mut self, other: RationalTime) {
        *self = *self + other;
    }
}

impl SubAssign for RationalTime {
    fn sub_assign(&mut self, other: RationalTime) {
        *self = *self - other;
    }
}

/// A half-open span of time: `[start_time, start_time + duration)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_time: RationalTime,
    pub duration: RationalTime,
}

impl TimeRange {
    pub const fn new(start_time: RationalTime, duration: RationalTime) -> Self {
        Self {
            start_time,
            duration,
        }
    }

    /// A range covering `[start, end)`.
    pub fn from_start_end_time(start: RationalTime, end: RationalTime) -> Self {
        Self::new(start, end - start)
    }

    /// The first time past the end of the range.
    pub fn end_time_exclusive(&self) -> RationalTime {
        self.start_time + self.duration
    }

    /// Half-open containment: the start is inside, the exclusive end is not.
    pub fn contains(&self, time: RationalTime) -> bool {
        self.start_time <= time && time < self.end_time_exclusive()
    }

    /// True when the two half-open ranges share any instant.
    pub fn intersects(&self, other: &TimeRange) -> bool {
        self.start_time < other.end_time_exclusive() && other.start_time < self.end_time_exclusive()
    }

    pub fn rescaled_to(&self, rate: f64) -> Self {
        Self::new(self.start_time.rescaled_to(rate), self.duration.rescaled_to(rate))
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start_time, self.end_time_exclusive())
    }
}
