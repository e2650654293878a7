//! Threshold metadata for the reversal recognizers
//!
//! Every recognizer publishes its tunable thresholds as [`ParamMeta`], so a
//! caller can build a recognizer from a name/value map or sweep a grid of
//! thresholds through the backtester.
//!
//! # Example
//!
//! ```rust
//! use std::collections::HashMap;
//! use klinescope::prelude::*;
//!
//! for param in MorningStarDetector::param_meta() {
//!     println!("{}: {:?} (default: {})", param.name, param.param_type, param.default);
//! }
//!
//! let mut params = HashMap::new();
//! params.insert("min_recovery", 0.5);
//! let detector = MorningStarDetector::with_params(&params).unwrap();
//! assert_eq!(detector.min_recovery.get(), 0.5);
//! ```

use std::collections::HashMap;

use crate::{detectors::helpers::check_factor, AnalysisError, Period, Ratio, Result};

// ============================================================
// PARAMETER TYPES
// ============================================================

/// Type of parameter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// Fraction in 0.0..=1.0
    Ratio,
    /// Non-negative multiplier or percentage without an upper bound
    Factor,
    /// Positive bar count
    Period,
}

/// Metadata for a single recognizer threshold
#[derive(Debug, Clone)]
pub struct ParamMeta {
    /// Field name on the recognizer, e.g. `"min_recovery"`
    pub name: &'static str,
    pub param_type: ParamType,
    pub default: f64,
    /// Sweep range: (min, max, step)
    pub range: (f64, f64, f64),
    pub description: &'static str,
}

impl ParamMeta {
    pub const fn ratio(
        name: &'static str,
        default: f64,
        range: (f64, f64, f64),
        description: &'static str,
    ) -> Self {
        Self { name, param_type: ParamType::Ratio, default, range, description }
    }

    pub const fn factor(
        name: &'static str,
        default: f64,
        range: (f64, f64, f64),
        description: &'static str,
    ) -> Self {
        Self { name, param_type: ParamType::Factor, default, range, description }
    }

    pub const fn period(
        name: &'static str,
        default: f64,
        range: (f64, f64, f64),
        description: &'static str,
    ) -> Self {
        Self { name, param_type: ParamType::Period, default, range, description }
    }

    /// All values of the sweep range, both ends included
    pub fn generate_grid(&self) -> Vec<f64> {
        let (min, max, step) = self.range;
        if step <= 0.0 {
            return vec![min];
        }
        let steps = ((max - min) / step + 1e-9).floor() as usize;
        (0..=steps).map(|i| min + step * i as f64).collect()
    }

    /// Check a value against the sweep range and the parameter type
    pub fn validate(&self, value: f64) -> Result<()> {
        let (min, max, _) = self.range;
        if !(min..=max).contains(&value) {
            return Err(AnalysisError::OutOfRange { field: self.name, value, min, max });
        }
        match self.param_type {
            ParamType::Ratio => Ratio::new(value).map(|_| ()),
            ParamType::Factor => check_factor(self.name, value),
            ParamType::Period => {
                if value < 1.0 || value.fract() != 0.0 {
                    return Err(AnalysisError::InvalidValue("Period must be a positive integer"));
                }
                Ok(())
            }
        }
    }
}

// ============================================================
// PARAMETERIZED DETECTOR TRAIT
// ============================================================

/// Recognizers that can be rebuilt from a name/value map
pub trait ParameterizedDetector: Sized {
    fn param_meta() -> &'static [ParamMeta];

    /// Missing parameters keep their default values.
    fn with_params(params: &HashMap<&str, f64>) -> Result<Self>;

    fn pattern_id_str() -> &'static str;
}

// ============================================================
// PARAMETER VALUE HELPERS
// ============================================================

pub fn get_ratio(params: &HashMap<&str, f64>, key: &str, default: f64) -> Result<Ratio> {
    let value = params.get(key).copied().unwrap_or(default);
    Ratio::new(value)
}

pub fn get_factor(params: &HashMap<&str, f64>, key: &'static str, default: f64) -> Result<f64> {
    let value = params.get(key).copied().unwrap_or(default);
    check_factor(key, value)?;
    Ok(value)
}

pub fn get_period(params: &HashMap<&str, f64>, key: &str, default: usize) -> Result<Period> {
    let value = params.get(key).copied().unwrap_or(default as f64);
    if value < 1.0 || value.fract() != 0.0 {
        return Err(AnalysisError::InvalidValue("Period must be a positive integer"));
    }
    Period::new(value as usize)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;

    #[test]
    fn test_param_meta_constructors() {
        let meta = ParamMeta::ratio("r", 0.5, (0.3, 0.7, 0.1), "ratio");
        assert_eq!(meta.param_type, ParamType::Ratio);
        assert_eq!(ParamMeta::factor("f", 3.0, (1.0, 5.0, 1.0), "f").param_type, ParamType::Factor);
        assert_eq!(ParamMeta::period("p", 5.0, (3.0, 8.0, 1.0), "p").param_type, ParamType::Period);
    }

    #[test]
    fn test_generate_grid() {
        let meta = ParamMeta::ratio("test", 0.5, (0.3, 0.7, 0.2), "Test");

        let grid = meta.generate_grid();
        assert_eq!(grid.len(), 3);
        assert!((grid[0] - 0.3).abs() < 1e-12);
        assert!((grid[1] - 0.5).abs() < 1e-12);
        assert!((grid[2] - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_generate_grid_fractional_steps() {
        let meta = ParamMeta::ratio("test", 0.01, (0.005, 0.02, 0.005), "Test");
        assert_eq!(meta.generate_grid().len(), 4);
    }

    #[test]
    fn test_validate_by_type() {
        let ratio = ParamMeta::ratio("test", 0.5, (0.3, 0.7, 0.1), "Test");
        assert!(ratio.validate(0.3).is_ok());
        assert!(ratio.validate(0.8).is_err());

        let period = ParamMeta::period("test", 5.0, (3.0, 10.0, 1.0), "Test");
        assert!(period.validate(5.0).is_ok());
        assert!(period.validate(5.5).is_err());
        assert!(period.validate(11.0).is_err());

        let factor = ParamMeta::factor("test", 3.0, (0.0, 10.0, 1.0), "Test");
        assert!(factor.validate(9.5).is_ok());
    }

    #[test]
    fn test_helpers_fall_back_to_defaults() {
        let mut params = HashMap::new();
        params.insert("a", 0.8);
        params.insert("p", 7.0);

        assert!((get_ratio(&params, "a", 0.5).unwrap().get() - 0.8).abs() < f64::EPSILON);
        assert!((get_ratio(&params, "b", 0.5).unwrap().get() - 0.5).abs() < f64::EPSILON);
        assert_eq!(get_period(&params, "p", 5).unwrap().get(), 7);
        assert_eq!(get_period(&params, "q", 5).unwrap().get(), 5);
        assert_eq!(get_factor(&params, "f", 3.0).unwrap(), 3.0);
    }

    #[test]
    fn test_helpers_reject_bad_values() {
        let mut params = HashMap::new();
        params.insert("a", 1.5);
        params.insert("p", 0.0);
        params.insert("f", -1.0);

        assert!(get_ratio(&params, "a", 0.5).is_err());
        assert!(get_period(&params, "p", 5).is_err());
        assert!(get_factor(&params, "f", 3.0).is_err());
    }

    #[test]
    fn test_every_recognizer_round_trips_defaults() {
        let empty = HashMap::new();
        assert_eq!(HammerDetector::with_params(&empty).unwrap().trend_window.get(), 5);
        assert_eq!(BullishEngulfingDetector::with_params(&empty).unwrap().min_percent_change, 3.0);
        assert_eq!(PiercingDetector::with_params(&empty).unwrap().min_penetration.get(), 0.5);
        assert_eq!(HaramiDetector::with_params(&empty).unwrap().min_mother_body_ratio.get(), 0.03);
        assert_eq!(FlatBottomDetector::with_params(&empty).unwrap().max_low_gap.get(), 0.005);
        assert_eq!(MorningStarDetector::with_params(&empty).unwrap().min_recovery.get(), 0.3);
    }

    #[test]
    fn test_param_defaults_are_in_range() {
        let all = [
            HammerDetector::param_meta(),
            BullishEngulfingDetector::param_meta(),
            PiercingDetector::param_meta(),
            HaramiDetector::param_meta(),
            FlatBottomDetector::param_meta(),
            MorningStarDetector::param_meta(),
        ];
        for meta in all.iter().flat_map(|m| m.iter()) {
            assert!(meta.validate(meta.default).is_ok(), "{} default out of range", meta.name);
        }
    }

    #[test]
    fn test_pattern_id_str_matches_detector() {
        assert_eq!(MorningStarDetector::pattern_id_str(), PatternKind::MorningStar.id().as_str());
        assert_eq!(HammerDetector::pattern_id_str(), PatternKind::Hammer.id().as_str());
    }
}
