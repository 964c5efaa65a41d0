use std::{fmt, str::FromStr};

use image::RgbImage;

pub mod ssim;

pub use ssim::Ssim;

/// A normalized similarity measure between two frames. 1.0 means identical, lower
/// values mean more different. Implementations must return something in `[0, 1]`.
pub trait Similarity {
    fn score(&self, a: &RgbImage, b: &RgbImage) -> f64;
}

impl<S: Similarity + ?Sized> Similarity for &S {
    fn score(&self, a: &RgbImage, b: &RgbImage) -> f64 {
        (**self).score(a, b)
    }
}

/// The minimum score for two frames to show the same slide. Always in `(0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct Threshold(f64);

#[derive(thiserror::Error, Debug)]
#[error("the similarity threshold must be in (0, 1]")]
pub struct ThresholdError;

impl Threshold {
    pub const DEFAULT: Self = Threshold(0.9);

    pub fn new(value: f64) -> Result<Self, ThresholdError> {
        if value > 0.0 && value <= 1.0 {
            Ok(Threshold(value))
        } else {
            Err(ThresholdError)
        }
    }

    pub fn as_f64(self) -> f64 {
        self.0
    }

    pub fn is_same(self, score: f64) -> bool {
        score >= self.0
    }
}

impl Default for Threshold {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl FromStr for Threshold {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let num: f64 = s.trim().parse().map_err(|_| ThresholdError)?;
        Self::new(num)
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn threshold_range() {
        assert!(Threshold::new(0.0).is_err());
        assert!(Threshold::new(-0.5).is_err());
        assert!(Threshold::new(1.01).is_err());
        assert!(Threshold::new(f64::NAN).is_err());
        assert!(Threshold::new(1.0).is_ok());
        assert!(Threshold::new(f64::MIN_POSITIVE).is_ok());
    }

    #[test]
    fn threshold_parse() {
        assert_eq!(Threshold::new(0.75).unwrap(), "0.75".parse().unwrap());
        assert!("abc".parse::<Threshold>().is_err());
        assert!("0".parse::<Threshold>().is_err());
        assert_eq!("0.9", Threshold::DEFAULT.to_string());
    }

    #[test]
    fn same_is_inclusive() {
        let t = Threshold::new(0.8).unwrap();
        assert!(t.is_same(0.8));
        assert!(t.is_same(1.0));
        assert!(!t.is_same(0.79));
    }
}
