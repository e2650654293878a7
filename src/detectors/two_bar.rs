//! Two-bar reversal recognizers
//!
//! Bullish Engulfing, Piercing, Harami and Flat Bottom. Each one compares the
//! bar at `index` with the bar before it and requires a downtrend over the
//! trailing window.

use std::collections::HashMap;

use super::helpers::{self, check_factor, is_downtrend, pattern_start};
use crate::{
    params::{get_factor, get_period, get_ratio, ParamMeta, ParameterizedDetector},
    Candle, CandleExt, PatternCategory, PatternDetector, PatternId, PatternMatch,
    PatternMetadata, Period, Ratio, Result,
};

impl_with_defaults!(
    BullishEngulfingDetector,
    PiercingDetector,
    HaramiDetector,
    FlatBottomDetector,
);

// ============================================================
// ENGULFING
// ============================================================

/// Bullish Engulfing: a white body strictly containing the prior black body,
/// rising at least `min_percent_change` percent.
#[derive(Debug, Clone, Copy)]
pub struct BullishEngulfingDetector {
    pub min_percent_change: f64,
    pub trend_window: Period,
}

impl Default for BullishEngulfingDetector {
    fn default() -> Self {
        Self {
            min_percent_change: helpers::ENGULFING_MIN_PERCENT_CHANGE,
            trend_window: Period::new_const(helpers::TREND_WINDOW),
        }
    }
}

impl PatternDetector for BullishEngulfingDetector {
    fn id(&self) -> PatternId {
        PatternId("BULLISH_ENGULFING")
    }

    fn min_bars(&self) -> usize {
        self.trend_window.get() + 1
    }

    fn detect<T: Candle>(&self, bars: &[T], index: usize) -> Option<PatternMatch> {
        let start = pattern_start(index, 2, self.trend_window.get())?;
        let first = bars.get(index - 1)?;
        let second = bars.get(index)?;

        if !first.is_black() || !second.is_white() {
            return None;
        }
        if second.entity_high() <= first.entity_high() || second.entity_low() >= first.entity_low()
        {
            return None;
        }
        if second.percent_change() < self.min_percent_change {
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
        check_factor("min_percent_change", self.min_percent_change)
    }

    fn metadata(&self) -> PatternMetadata {
        PatternMetadata {
            name: "Bullish Engulfing",
            description: "White body engulfing the prior black body",
            category: PatternCategory::TwoBar,
        }
    }
}

// ============================================================
// PIERCING
// ============================================================

/// Piercing: a white bar whose body high climbs back past `min_penetration`
/// of the prior black body.
#[derive(Debug, Clone, Copy)]
pub struct PiercingDetector {
    pub min_penetration: Ratio,
    pub trend_window: Period,
}

impl Default for PiercingDetector {
    fn default() -> Self {
        Self {
            min_penetration: Ratio::new_const(helpers::PIERCING_MIN_PENETRATION),
            trend_window: Period::new_const(helpers::TREND_WINDOW),
        }
    }
}

impl PatternDetector for PiercingDetector {
    fn id(&self) -> PatternId {
        PatternId("PIERCING")
    }

    fn min_bars(&self) -> usize {
        self.trend_window.get() + 1
    }

    fn detect<T: Candle>(&self, bars: &[T], index: usize) -> Option<PatternMatch> {
        let start = pattern_start(index, 2, self.trend_window.get())?;
        let first = bars.get(index - 1)?;
        let second = bars.get(index)?;

        if !first.is_black() || !second.is_white() {
            return None;
        }
        let recovered = (second.entity_high() - first.entity_low()) as f64;
        if recovered < first.body_height() as f64 * self.min_penetration.get() {
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

    fn metadata(&self) -> PatternMetadata {
        PatternMetadata {
            name: "Piercing",
            description: "White bar recovering past the midpoint of the prior black body",
            category: PatternCategory::TwoBar,
        }
    }
}

// ============================================================
// HARAMI
// ============================================================

/// Harami: a long black body followed by a body strictly inside it.
///
/// Reports a match whenever every condition holds, the same as the other
/// recognizers.
#[derive(Debug, Clone, Copy)]
pub struct HaramiDetector {
    pub min_mother_body_ratio: Ratio,
    pub trend_window: Period,
}

impl Default for HaramiDetector {
    fn default() -> Self {
        Self {
            min_mother_body_ratio: Ratio::new_const(helpers::LONG_BODY_RATIO),
            trend_window: Period::new_const(helpers::TREND_WINDOW),
        }
    }
}

impl PatternDetector for HaramiDetector {
    fn id(&self) -> PatternId {
        PatternId("HARAMI")
    }

    fn min_bars(&self) -> usize {
        self.trend_window.get() + 1
    }

    fn detect<T: Candle>(&self, bars: &[T], index: usize) -> Option<PatternMatch> {
        let start = pattern_start(index, 2, self.trend_window.get())?;
        let first = bars.get(index - 1)?;
        let second = bars.get(index)?;

        if !first.is_black() {
            return None;
        }
        if first.body_ratio()? < self.min_mother_body_ratio.get() {
            return None;
        }
        if second.entity_high() >= first.entity_high() || second.entity_low() <= first.entity_low()
        {
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

    fn metadata(&self) -> PatternMetadata {
        PatternMetadata {
            name: "Harami",
            description: "Small body held inside the prior long black body",
            category: PatternCategory::TwoBar,
        }
    }
}

// ============================================================
// FLAT BOTTOM
// ============================================================

/// Flat Bottom: two consecutive lows within `max_low_gap` of each other.
#[derive(Debug, Clone, Copy)]
pub struct FlatBottomDetector {
    pub max_low_gap: Ratio,
    pub trend_window: Period,
}

impl Default for FlatBottomDetector {
    fn default() -> Self {
        Self {
            max_low_gap: Ratio::new_const(helpers::FLAT_BOTTOM_MAX_LOW_GAP),
            trend_window: Period::new_const(helpers::TREND_WINDOW),
        }
    }
}

impl PatternDetector for FlatBottomDetector {
    fn id(&self) -> PatternId {
        PatternId("FLAT_BOTTOM")
    }

    fn min_bars(&self) -> usize {
        self.trend_window.get() + 1
    }

    fn detect<T: Candle>(&self, bars: &[T], index: usize) -> Option<PatternMatch> {
        let start = pattern_start(index, 2, self.trend_window.get())?;
        let first = bars.get(index - 1)?;
        let second = bars.get(index)?;

        if first.low() <= 0 {
            return None;
        }
        let gap = (first.low() - second.low()).abs() as f64 / first.low() as f64;
        if gap > self.max_low_gap.get() {
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

    fn metadata(&self) -> PatternMetadata {
        PatternMetadata {
            name: "Flat Bottom",
            description: "Two consecutive bars sharing the same low",
            category: PatternCategory::TwoBar,
        }
    }
}

// ============================================================
// PARAMETERS
// ============================================================

static ENGULFING_PARAMS: &[ParamMeta] = &[
    ParamMeta::factor(
        "min_percent_change",
        helpers::ENGULFING_MIN_PERCENT_CHANGE,
        (1.0, 6.0, 0.5),
        "Minimum percent change of the engulfing bar",
    ),
    helpers::TREND_WINDOW_PARAM,
];

static PIERCING_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "min_penetration",
        helpers::PIERCING_MIN_PENETRATION,
        (0.3, 0.8, 0.1),
        "Fraction of the prior body the rebound recovers",
    ),
    helpers::TREND_WINDOW_PARAM,
];

static HARAMI_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "min_mother_body_ratio",
        helpers::LONG_BODY_RATIO,
        (0.01, 0.06, 0.01),
        "Minimum body ratio of the first bar",
    ),
    helpers::TREND_WINDOW_PARAM,
];

static FLAT_BOTTOM_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "max_low_gap",
        helpers::FLAT_BOTTOM_MAX_LOW_GAP,
        (0.001, 0.01, 0.001),
        "Maximum relative distance between the two lows",
    ),
    helpers::TREND_WINDOW_PARAM,
];

impl ParameterizedDetector for BullishEngulfingDetector {
    fn param_meta() -> &'static [ParamMeta] {
        ENGULFING_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            min_percent_change: get_factor(
                params,
                "min_percent_change",
                helpers::ENGULFING_MIN_PERCENT_CHANGE,
            )?,
            trend_window: get_period(params, "trend_window", helpers::TREND_WINDOW)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "BULLISH_ENGULFING"
    }
}

impl ParameterizedDetector for PiercingDetector {
    fn param_meta() -> &'static [ParamMeta] {
        PIERCING_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            min_penetration: get_ratio(
                params,
                "min_penetration",
                helpers::PIERCING_MIN_PENETRATION,
            )?,
            trend_window: get_period(params, "trend_window", helpers::TREND_WINDOW)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "PIERCING"
    }
}

impl ParameterizedDetector for HaramiDetector {
    fn param_meta() -> &'static [ParamMeta] {
        HARAMI_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            min_mother_body_ratio: get_ratio(
                params,
                "min_mother_body_ratio",
                helpers::LONG_BODY_RATIO,
            )?,
            trend_window: get_period(params, "trend_window", helpers::TREND_WINDOW)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "HARAMI"
    }
}

impl ParameterizedDetector for FlatBottomDetector {
    fn param_meta() -> &'static [ParamMeta] {
        FLAT_BOTTOM_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            max_low_gap: get_ratio(params, "max_low_gap", helpers::FLAT_BOTTOM_MAX_LOW_GAP)?,
            trend_window: get_period(params, "trend_window", helpers::TREND_WINDOW)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "FLAT_BOTTOM"
    }
}
