//! Common thresholds and helpers shared by every recognizer

use crate::{params::ParamMeta, AnalysisError, Candle, Result};

// ============================================================
// DEFAULT THRESHOLDS
// ============================================================

/// Bars in the trailing downtrend window before the pattern bar
pub const TREND_WINDOW: usize = 5;
/// Hammer: upper wick <= body * ratio
pub const HAMMER_MAX_UPPER_WICK_RATIO: f64 = 0.25;
/// Hammer: lower wick >= body * multiple
pub const HAMMER_MIN_LOWER_WICK_MULTIPLE: f64 = 2.0;
/// Bullish engulfing: minimum percent change of the engulfing bar (already x100)
pub const ENGULFING_MIN_PERCENT_CHANGE: f64 = 3.0;
/// Piercing: fraction of the prior body the rebound must recover
pub const PIERCING_MIN_PENETRATION: f64 = 0.5;
/// Long body: body height / body low
pub const LONG_BODY_RATIO: f64 = 0.03;
/// Star body: body height / body low
pub const STAR_BODY_RATIO: f64 = 0.01;
/// Morning star: fraction of the first body recovered by the third bar
pub const MORNING_STAR_MIN_RECOVERY: f64 = 0.3;
/// Flat bottom: relative difference between consecutive lows
pub const FLAT_BOTTOM_MAX_LOW_GAP: f64 = 0.005;

/// Trailing downtrend window, shared by every recognizer's parameter table
pub const TREND_WINDOW_PARAM: ParamMeta = ParamMeta::period(
    "trend_window",
    TREND_WINDOW as f64,
    (3.0, 10.0, 1.0),
    "Bars of non-increasing closes required before the pattern bar",
);

// ============================================================
// HELPER FUNCTIONS
// ============================================================

/// Closes over `[index - window, index)` never increase.
///
/// A window reaching before the first bar, or past the end, fails.
#[inline]
pub fn is_downtrend<T: Candle>(bars: &[T], index: usize, window: usize) -> bool {
    let Some(start) = index.checked_sub(window) else {
        return false;
    };
    if index > bars.len() {
        return false;
    }
    bars[start..index]
        .windows(2)
        .all(|pair| pair[1].close() <= pair[0].close())
}

/// First bar of a pattern spanning `candles` bars ending at `index`,
/// or None if the candles plus the trend window do not fit.
#[inline]
pub fn pattern_start(index: usize, candles: usize, window: usize) -> Option<usize> {
    if index < window || index + 1 < candles {
        return None;
    }
    Some(index + 1 - candles)
}

/// Finite and non-negative.
pub fn check_factor(field: &'static str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(AnalysisError::InvalidConfig(format!(
            "{field} must be finite, got {value}"
        )));
    }
    if value < 0.0 {
        return Err(AnalysisError::OutOfRange {
            field,
            value,
            min: 0.0,
            max: f64::INFINITY,
        });
    }
    Ok(())
}
