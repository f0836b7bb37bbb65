//! Exact rational time bases and timestamp rescaling.

use std::fmt;

use crate::error::MediaError;

/// A rational number `num/den` used as a time base or a frame rate.
///
/// The denominator is never zero and is kept positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    num: i32,
    den: i32,
}

impl Rational {
    /// One microsecond, the engine-wide fallback time base.
    pub const MICROS: Rational = Rational {
        num: 1,
        den: 1_000_000,
    };

    pub fn new(num: i32, den: i32) -> Result<Self, MediaError> {
        if den == 0 {
            return Err(MediaError::Configuration(format!(
                "rational {num}/0 has a zero denominator"
            )));
        }
        if den < 0 {
            return Ok(Self {
                num: num.saturating_neg(),
                den: den.saturating_neg(),
            });
        }
        Ok(Self { num, den })
    }

    /// Time base `1/den`, the usual shape of encoder and stream clocks.
    pub fn per_second(den: i32) -> Result<Self, MediaError> {
        Self::new(1, den)
    }

    pub fn numerator(&self) -> i32 {
        self.num
    }

    pub fn denominator(&self) -> i32 {
        self.den
    }

    /// Zero numerator. Nothing can be rescaled into a degenerate base.
    pub fn is_degenerate(&self) -> bool {
        self.num == 0
    }

    pub fn invert(&self) -> Result<Self, MediaError> {
        Self::new(self.den, self.num)
    }

    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /// Whole units per second, rounded to nearest. Used for frame rates.
    pub fn rounded(&self) -> i64 {
        div_round(self.num as i128, self.den as i128) as i64
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Converts `value` expressed in `from` units into `to` units, rounding half
/// away from zero. Intermediate math is done in 128 bits so it never
/// overflows; the result saturates to the `i64` range.
///
/// A degenerate target base leaves the value untouched.
pub fn rescale(value: i64, from: Rational, to: Rational) -> i64 {
    if to.is_degenerate() {
        return value;
    }
    let a = value as i128 * from.num as i128 * to.den as i128;
    let b = from.den as i128 * to.num as i128;
    let q = div_round(a, b);
    q.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

/// [`rescale`] lifted over unknown timestamps.
pub fn rescale_opt(value: Option<i64>, from: Rational, to: Rational) -> Option<i64> {
    value.map(|v| rescale(v, from, to))
}

/// Timestamp in seconds.
pub fn to_seconds(value: i64, time_base: Rational) -> f64 {
    value as f64 * time_base.num as f64 / time_base.den as f64
}

fn div_round(a: i128, b: i128) -> i128 {
    let (a, b) = if b < 0 { (-a, -b) } else { (a, b) };
    if a >= 0 {
        (2 * a + b) / (2 * b)
    } else {
        -((-2 * a + b) / (2 * b))
    }
}

#[cfg(test)]
#[path = "time_test.rs"]
mod time_test;
