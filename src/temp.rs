//! Fixed-point temperatures with sentinel-preserving arithmetic.
//!
//! `temp_t` in the original design was a scaled integer with magic sentinel
//! values for disconnected/shorted/out-of-range sensors. Per the redesign
//! note in the spec this is modelled as a proper sum type instead: a valid
//! reading carries a millidegree-Celsius `i32`, anything else is one of the
//! named non-values below.

use std::fmt::{self, Display, Formatter};
use std::ops::{Add, Sub};

/// Millidegree-Celsius fixed point value, e.g. `21_500` is 21.5C.
pub type TempT = i32;

pub const MILLIDEGREES_PER_DEGREE: TempT = 1000;

pub fn from_celsius(c: f32) -> TempT {
    (c * MILLIDEGREES_PER_DEGREE as f32).round() as TempT
}

pub fn to_celsius(t: TempT) -> f32 {
    t as f32 / MILLIDEGREES_PER_DEGREE as f32
}

/// A sensor reading: either a valid temperature or one of the fault states
/// a real sensor can report. Arithmetic on `Reading` never silently produces
/// a valid-looking number out of a faulted one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reading {
    Valid(TempT),
    Disconnected,
    Shorted,
    TooHigh,
    TooLow,
    /// Last update is older than the caller's freshness requirement.
    Stale,
}

impl Reading {
    pub fn valid(&self) -> Option<TempT> {
        match self {
            Reading::Valid(t) => Some(*t),
            _ => None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid().is_some()
    }

    pub fn kind(&self) -> crate::error::ErrorKind {
        use crate::error::ErrorKind;
        match self {
            Reading::Valid(_) => unreachable!("kind() only meaningful on a fault"),
            Reading::Disconnected => ErrorKind::SensorDisconnected,
            Reading::Shorted => ErrorKind::SensorShorted,
            Reading::TooHigh => ErrorKind::TempTooHigh,
            Reading::TooLow => ErrorKind::TempTooLow,
            Reading::Stale => ErrorKind::Invalid,
        }
    }

    /// Binary op on two readings that is only defined when both are valid;
    /// propagates the first fault encountered (left before right).
    pub fn combine(self, other: Reading, f: impl FnOnce(TempT, TempT) -> TempT) -> Reading {
        match (self, other) {
            (Reading::Valid(a), Reading::Valid(b)) => Reading::Valid(f(a, b)),
            (fault, _) if !fault.is_valid() => fault,
            (_, fault) => fault,
        }
    }

    pub fn map(self, f: impl FnOnce(TempT) -> TempT) -> Reading {
        match self {
            Reading::Valid(t) => Reading::Valid(f(t)),
            fault => fault,
        }
    }

    /// Clamp a valid reading into `[min, max]`; sentinels pass through.
    pub fn clamp(self, min: TempT, max: TempT) -> Reading {
        self.map(|t| t.clamp(min, max))
    }
}

impl Add for Reading {
    type Output = Reading;

    fn add(self, rhs: Reading) -> Reading {
        self.combine(rhs, |a, b| a + b)
    }
}

impl Sub for Reading {
    type Output = Reading;

    fn sub(self, rhs: Reading) -> Reading {
        self.combine(rhs, |a, b| a - b)
    }
}

impl Display for Reading {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Reading::Valid(t) => write!(f, "{:.3}C", to_celsius(*t)),
            Reading::Disconnected => write!(f, "<disconnected>"),
            Reading::Shorted => write!(f, "<shorted>"),
            Reading::TooHigh => write!(f, "<too-high>"),
            Reading::TooLow => write!(f, "<too-low>"),
            Reading::Stale => write!(f, "<stale>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_celsius_round_trip() {
        let t = from_celsius(21.5);
        assert_eq!(t, 21_500);
        assert_eq!(to_celsius(t), 21.5);
    }

    #[test]
    fn test_sentinel_preserved_through_arithmetic() {
        let valid = Reading::Valid(from_celsius(20.0));
        let fault = Reading::Disconnected;
        assert_eq!(valid + fault, Reading::Disconnected);
        assert_eq!(fault + valid, Reading::Disconnected);
        assert_eq!(fault.map(|t| t + 1), Reading::Disconnected);
    }
}
