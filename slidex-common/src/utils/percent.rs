use std::{fmt, str::FromStr};

#[derive(Clone, Copy, Debug, PartialOrd, PartialEq)]
pub struct Percent64(f64);

#[derive(thiserror::Error, Debug)]
#[error("not a valid percentage")]
pub struct PercentError;

impl Percent64 {
    pub const ZERO: Self = Percent64(0.0);
    pub const HUNDRED: Self = Percent64(100.0);

    pub fn new(float: f64) -> Result<Self, PercentError> {
        if float.is_finite() && float >= 0.0 {
            Ok(Percent64(float))
        } else {
            Err(PercentError)
        }
    }

    pub fn as_f64(self) -> f64 {
        self.0
    }

    pub fn of(part: f64, total: f64) -> Result<Self, PercentError> {
        Self::new(100.0 * part / total)
    }

    /// From a fraction in `[0, 1]`.
    pub fn from_fraction(fraction: f64) -> Result<Self, PercentError> {
        Self::new(100.0 * fraction)
    }

    pub fn min(self, other: Self) -> Self {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }
}

impl From<Percent64> for f64 {
    fn from(value: Percent64) -> Self {
        value.as_f64()
    }
}

impl FromStr for Percent64 {
    type Err = PercentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.strip_suffix('%').ok_or(PercentError)?;
        let num: f64 = s.parse().map_err(|_| PercentError)?;
        Self::new(num)
    }
}

impl fmt::Display for Percent64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn divide_zero() {
        assert!(Percent64::of(5.0, 0.0).is_err());
    }

    #[test]
    fn display_one_decimal() {
        assert_eq!("33.3%", Percent64::of(1.0, 3.0).unwrap().to_string());
        assert_eq!("100.0%", Percent64::from_fraction(1.0).unwrap().to_string());
    }

    #[test]
    fn clamp_with_min() {
        let over = Percent64::of(12.0, 10.0).unwrap();
        assert_eq!(Percent64::HUNDRED, over.min(Percent64::HUNDRED));
    }
}
