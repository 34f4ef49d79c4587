//! Simulated time.

use std::{fmt, ops};

use serde::{Deserialize, Serialize};
use time::Duration;

use crate::error::{OrbitError, Result};

/// Universal simulated time, measured from the simulation origin.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct UT(Duration);

impl UT {
    pub const ZERO: UT = UT(Duration::ZERO);

    /// Fails for non-finite values and for times outside the range of
    /// [`Duration`].
    pub fn from_seconds(sec: f64) -> Result<UT> {
        Duration::checked_seconds_f64(sec)
            .map(UT)
            .ok_or(OrbitError::TimeOverflow(sec))
    }

    /// `self + seconds`, or an error if the result is not representable.
    pub fn checked_add_seconds(self, seconds: f64) -> Result<UT> {
        Duration::checked_seconds_f64(seconds)
            .and_then(|d| self.0.checked_add(d))
            .map(UT)
            .ok_or(OrbitError::TimeOverflow(seconds))
    }

    pub fn as_seconds_f64(self) -> f64 {
        self.0.as_seconds_f64()
    }

    /// Seconds elapsed from `earlier` to `self`.
    pub fn seconds_since(self, earlier: UT) -> f64 {
        match self.0.checked_sub(earlier.0) {
            Some(d) => d.as_seconds_f64(),
            None => self.0.as_seconds_f64() - earlier.0.as_seconds_f64(),
        }
    }
}

impl ops::Sub<UT> for UT {
    type Output = Duration;

    fn sub(self, rhs: UT) -> Self::Output {
        self.0 - rhs.0
    }
}

impl ops::Sub<Duration> for UT {
    type Output = UT;

    fn sub(self, rhs: Duration) -> Self::Output {
        UT(self.0 - rhs)
    }
}

impl ops::Add<Duration> for UT {
    type Output = UT;

    fn add(self, rhs: Duration) -> Self::Output {
        UT(self.0 + rhs)
    }
}

impl ops::AddAssign<Duration> for UT {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs;
    }
}

impl fmt::Display for UT {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UT({}s)", self.0.as_seconds_f64())
    }
}

impl fmt::Debug for UT {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arithmetic() {
        let t0 = UT::from_seconds(86_400.0 + 7_200.0 + 180.0 + 4.5).unwrap();
        assert_eq!(t0.seconds_since(UT::ZERO), 93_784.5);
        let t1 = t0 + Duration::seconds(10);
        assert_eq!(t1 - t0, Duration::seconds(10));
        assert_eq!(t1.seconds_since(t0), 10.0);
        assert!(t1 > t0);
        assert_eq!(t1 - Duration::seconds(10), t0);
        assert!(UT::from_seconds(-1.0).unwrap() < UT::ZERO);
    }

    #[test]
    fn out_of_range_times_are_errors() {
        for bad in [f64::NAN, f64::INFINITY, -1.0e20] {
            assert!(matches!(UT::from_seconds(bad), Err(OrbitError::TimeOverflow(_))));
        }
        let t = UT::from_seconds(10.0).unwrap();
        assert_eq!(t.checked_add_seconds(5.0).unwrap().as_seconds_f64(), 15.0);
        assert_eq!(t.checked_add_seconds(1.0e20), Err(OrbitError::TimeOverflow(1.0e20)));
    }
}
