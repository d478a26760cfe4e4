//! Fixed-point working duration.
//!
//! Durations are measured in minutes and stored as exact decimals, so
//! repeated add/subtract and scale/unscale round-trips do not accumulate
//! binary floating-point drift. Constructors reject negative values;
//! arithmetic results may be negative (e.g. slack computations) and carry
//! sign until the caller decides how to clamp.

use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

use crate::domain::errors::SchedulingError;

/// An exact duration in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Duration(Decimal);

impl Duration {
    /// A zero-length duration.
    pub const ZERO: Duration = Duration(Decimal::ZERO);

    /// Creates a duration from decimal minutes.
    ///
    /// # Errors
    ///
    /// Returns `SchedulingError::Validation` when `minutes` is negative.
    pub fn from_minutes(minutes: Decimal) -> Result<Self, SchedulingError> {
        if minutes.is_sign_negative() && !minutes.is_zero() {
            return Err(SchedulingError::validation(
                "duration",
                format!("duration cannot be negative, got {minutes} minutes"),
            ));
        }
        Ok(Self(minutes))
    }

    /// Creates a duration from whole minutes.
    pub fn from_minutes_i64(minutes: i64) -> Result<Self, SchedulingError> {
        Self::from_minutes(Decimal::from(minutes))
    }

    /// Creates a duration from whole hours.
    pub fn from_hours(hours: i64) -> Result<Self, SchedulingError> {
        Self::from_minutes(Decimal::from(hours) * Decimal::from(60))
    }

    /// Duration in decimal minutes. May be negative for arithmetic results.
    pub fn minutes(&self) -> Decimal {
        self.0
    }

    /// Duration in whole minutes, rounded up.
    ///
    /// The solver works on an integer minute grid; a 0.5-minute setup still
    /// occupies a full minute slot.
    pub fn ceil_minutes(&self) -> i64 {
        self.0.ceil().to_i64().unwrap_or(i64::MAX)
    }

    /// Duration in decimal hours.
    pub fn hours(&self) -> Decimal {
        self.0 / Decimal::from(60)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Clamps a (possibly negative) arithmetic result back to zero.
    pub fn max_zero(&self) -> Duration {
        if self.is_negative() {
            Duration::ZERO
        } else {
            *self
        }
    }

    /// Formats as `"2h 30m"` / `"45m"`.
    pub fn format_hours_minutes(&self) -> String {
        let total = self.0;
        let sign = if total.is_sign_negative() { "-" } else { "" };
        let abs = total.abs();
        let hours = (abs / Decimal::from(60)).floor();
        let minutes = abs - hours * Decimal::from(60);
        if hours.is_zero() {
            format!("{sign}{}m", minutes.normalize())
        } else {
            format!("{sign}{}h {}m", hours.normalize(), minutes.normalize())
        }
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0 + rhs.0)
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl Mul<Decimal> for Duration {
    type Output = Duration;

    fn mul(self, k: Decimal) -> Duration {
        Duration(self.0 * k)
    }
}

impl Div<Decimal> for Duration {
    type Output = Duration;

    /// Divides by a scalar. Division by zero panics, as for `Decimal`.
    fn div(self, k: Decimal) -> Duration {
        Duration(self.0 / k)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.0.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn mins(m: i64) -> Duration {
        Duration::from_minutes_i64(m).unwrap()
    }

    #[test]
    fn test_negative_construction_rejected() {
        let err = Duration::from_minutes(Decimal::from(-1)).unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_arithmetic_may_go_negative() {
        let d = mins(10) - mins(25);
        assert!(d.is_negative());
        assert_eq!(d.minutes(), Decimal::from(-15));
        assert_eq!(d.max_zero(), Duration::ZERO);
    }

    #[test]
    fn test_ceil_minutes() {
        let d = Duration::from_minutes(Decimal::new(105, 1)).unwrap(); // 10.5
        assert_eq!(d.ceil_minutes(), 11);
        assert_eq!(mins(10).ceil_minutes(), 10);
    }

    #[test]
    fn test_formatting() {
        assert_eq!(mins(150).format_hours_minutes(), "2h 30m");
        assert_eq!(mins(45).format_hours_minutes(), "45m");
        assert_eq!((mins(0) - mins(70)).format_hours_minutes(), "-1h 10m");
        assert_eq!(mins(90).to_string(), "90m");
    }

    #[test]
    fn test_comparisons() {
        assert!(mins(10) < mins(20));
        assert_eq!(mins(60), Duration::from_hours(1).unwrap());
    }

    proptest! {
        #[test]
        fn prop_add_sub_roundtrip(a in 0i64..1_000_000, b in 0i64..1_000_000) {
            let d1 = mins(a);
            let d2 = mins(b);
            prop_assert_eq!((d1 + d2) - d2, d1);
        }

        #[test]
        fn prop_mul_div_roundtrip(a in 0i64..1_000_000, k in 1i64..1_000) {
            let d = mins(a);
            let k = Decimal::from(k);
            // Exact for the scalar range used by efficiency/cost math.
            let roundtrip = (d * k) / k;
            let diff = (roundtrip - d).minutes().abs();
            prop_assert!(diff < Decimal::new(1, 9));
        }

        #[test]
        fn prop_no_negative_from_constructor(a in 0i64..1_000_000) {
            prop_assert!(!mins(a).is_negative());
        }
    }
}
