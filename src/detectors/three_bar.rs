//! Three-bar reversal recognizers

use std::collections::HashMap;

use super::helpers::{self, is_downtrend, pattern_start};
use crate::{
    params::{get_period, get_ratio, ParamMeta, ParameterizedDetector},
    Candle, CandleExt, PatternCategory, PatternDetector, PatternId, PatternMatch,
    PatternMetadata, Period, Ratio, Result,
};

impl_with_defaults!(MorningStarDetector);

// ============================================================
// MORNING STAR
// ============================================================

/// Morning Star: long black body, a small star body at or below it, then a
/// long white body above the star that recovers part of the first body.
#[derive(Debug, Clone, Copy)]
pub struct MorningStarDetector {
    /// Minimum body ratio of the first and third bars
    pub min_long_body_ratio: Ratio,
    /// Maximum body ratio of the star
    pub max_star_body_ratio: Ratio,
    /// Fraction of the first body the third bar's body high must climb back
    pub min_recovery: Ratio,
    pub trend_window: Period,
}

impl Default for MorningStarDetector {
    fn default() -> Self {
        Self {
            min_long_body_ratio: Ratio::new_const(helpers::LONG_BODY_RATIO),
            max_star_body_ratio: Ratio::new_const(helpers::STAR_BODY_RATIO),
            min_recovery: Ratio::new_const(helpers::MORNING_STAR_MIN_RECOVERY),
            trend_window: Period::new_const(helpers::TREND_WINDOW),
        }
    }
}

impl PatternDetector for MorningStarDetector {
    fn id(&self) -> PatternId {
        PatternId("MORNING_STAR")
    }

    fn min_bars(&self) -> usize {
        self.trend_window.get().max(2) + 1
    }

    fn detect<T: Candle>(&self, bars: &[T], index: usize) -> Option<PatternMatch> {
        let start = pattern_start(index, 3, self.trend_window.get())?;
        let first = bars.get(start)?;
        let star = bars.get(start + 1)?;
        let third = bars.get(index)?;

        // first: long black body
        if !first.is_black() || first.body_ratio()? < self.min_long_body_ratio.get() {
            return None;
        }

        // star: small body at or below the first body
        if star.entity_high() > first.entity_low() {
            return None;
        }
        if star.body_ratio()? > self.max_star_body_ratio.get() {
            return None;
        }

        // third: long white body above the star
        if third.entity_low() < star.entity_high() || !third.is_white() {
            return None;
        }
        let first_body = first.body_height();
        if first_body <= 0 {
            return None;
        }
        let recovery = (third.entity_high() - first.entity_low()) as f64 / first_body as f64;
        if recovery < self.min_recovery.get() {
            return None;
        }
        if third.body_ratio()? < self.min_long_body_ratio.get() {
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
            name: "Morning Star",
            description: "Long black body, small star below it, long white recovery",
            category: PatternCategory::ThreeBar,
        }
    }
}

static MORNING_STAR_PARAMS: &[ParamMeta] = &[
    ParamMeta::ratio(
        "min_long_body_ratio",
        helpers::LONG_BODY_RATIO,
        (0.01, 0.06, 0.01),
        "Minimum body ratio of the first and third bars",
    ),
    ParamMeta::ratio(
        "max_star_body_ratio",
        helpers::STAR_BODY_RATIO,
        (0.005, 0.02, 0.005),
        "Maximum body ratio of the star",
    ),
    ParamMeta::ratio(
        "min_recovery",
        helpers::MORNING_STAR_MIN_RECOVERY,
        (0.1, 0.7, 0.1),
        "Fraction of the first body recovered by the third bar",
    ),
    helpers::TREND_WINDOW_PARAM,
];

impl ParameterizedDetector for MorningStarDetector {
    fn param_meta() -> &'static [ParamMeta] {
        MORNING_STAR_PARAMS
    }

    fn with_params(params: &HashMap<&str, f64>) -> Result<Self> {
        Ok(Self {
            min_long_body_ratio: get_ratio(
                params,
                "min_long_body_ratio",
                helpers::LONG_BODY_RATIO,
            )?,
            max_star_body_ratio: get_ratio(
                params,
                "max_star_body_ratio",
                helpers::STAR_BODY_RATIO,
            )?,
            min_recovery: get_ratio(params, "min_recovery", helpers::MORNING_STAR_MIN_RECOVERY)?,
            trend_window: get_period(params, "trend_window", helpers::TREND_WINDOW)?,
        })
    }

    fn pattern_id_str() -> &'static str {
        "MORNING_STAR"
    }
}
