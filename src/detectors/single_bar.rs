//! Single-bar reversal recognizers

use std::collections::HashMap;

use super::helpers::{self, check_factor, is_downtrend, pattern_start};
use crate::{
    params::{get_factor, get_period, ParamMeta, ParameterizedDetector},
    Candle, CandleExt, PatternCategory, PatternDetector, PatternId, PatternMatch,
    PatternMetadata, Period, Result,
};

impl_with_defaults!(HammerDetector);

// ============================================================
// HAMMER
// ============================================================

/// Hammer: short upper wick, lower wick at least twice the body, after a downtrend.
#[derive(Debug, Clone, Copy)]
pub struct HammerDetector {
    pub max_upper_wick_ratio: f64,
    pub min_lower_wick_multiple: f64,
    pub trend_window: Period,
}

impl Default for HammerDetector {
    fn default() -> Self {
        Self {
            max_upper_wick_ratio: helpers::HAMMER_MAX_UPPER_WICK_RATIO,
            min_lower_wick_multiple: helpers::HAMMER_MIN_LOWER_WICK_MULTIPLE,
            trend_window: Period::new_const(helpers::TREND_WINDOW),
        }
    }
}

impl PatternDetector for HammerDetector {
    fn id(&self) -> PatternId {
        PatternId("HAMMER")
    }

    fn min_bars(&self) -> usize {
        self.trend_window.get() + 1
    }

    fn detect<T: Candle>(&self, bars: &[T], index: usize) -> Option<PatternMatch> {
        let start = pattern_start(index, 1, self.trend_window.get())?;
        let bar = bars.get(index)?;

        let upper = bar.upper_wick() as f64;
        let body = bar.body_height() as f64;
        let lower = bar.lower_wick();

        if upper > body * self.max_upper_wick_ratio {
            return None;
        }
        if lower <= 0 || (lower as f64) < body * self.min_lower_wick_multiple {
            return None;
        }
        if !is_downtrend(bars, index, self.trend_window.get()) {
            return None;
        }

        Some(PatternMatch {
            pattern_id: PatternDetector::id(self),
            start_index: start,
            end_index: index,
        })
    }

    fn validate_config(&self) -> Result<()> {
        check_factor("max_upper_wick_ratio", self.max_upper_wick_ratio)?;
        check_factor("min_lower_wick_multiple", self.min_lower_wick_multiple)
    }

    fn metadata(&self) -> PatternMetadata {
        PatternMetadata {
            name: "Hammer",
            description: "Small body near the high with a long lower wick",
            category: PatternCategory::SingleBar,
        }
    }
}

// ============================================================
// PARAMETERS
// ============================================================

static HAMMER_PARAMS: &[ParamMeta] = &[
    ParamMeta::factor(
        "max_upper_wick_ratio",
        helpers::HAMMER_MAX_UPPER_WICK_RATIO,
        (0.1, 0.5, 0.05),
        "Upper wick limit as a multiple of the body",
    ),
    ParamMeta::factor(
        "min_lower_wick_multiple",
        helpers::HAMMER_MIN_LOWER_WICK_MULTIPLE,
        (1.5, 3.0, 0.5),
        "Lower wick floor as a multiple of the body",
    ),
    helpers::TREND_WINDOW_PARAM,
];

impl ParameterizedDetector for HammerDetector {
    fn param_meta() -> &'static [ParamMeta] {
        HAMMER_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            max_upper_wick_ratio: get_factor(
                params,
                "max_upper_wick_ratio",
                helpers::HAMMER_MAX_UPPER_WICK_RATIO,
            )?,
            min_lower_wick_multiple: get_factor(
                params,
                "min_lower_wick_multiple",
                helpers::HAMMER_MIN_LOWER_WICK_MULTIPLE,
            )?,
            trend_window: get_period(params, "trend_window", helpers::TREND_WINDOW)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "HAMMER"
    }
}
