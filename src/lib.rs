//! # klinescope - kline technical analysis and simulation engine
//!
//! Turns raw vendor kline records into normalized bars, recognizes classical
//! bullish reversal patterns, and replays history through a point-in-time
//! backtest and a grid-trading simulator.
//!
//! ## Quick Start
//!
//! ```rust
//! use klinescope::prelude::*;
//!
//! // Raw records as delivered by a market-data gateway (prices in 1/100 minor units)
//! let raw = vec![
//!     RawBar { time: 20240521, open: 1_000_000, high: 1_020_000, low: 990_000,
//!              close: 1_010_000, prev_close: 1_000_000, volume: 10, value: 1_000 },
//!     RawBar { time: 20240522, open: 1_010_000, high: 1_030_000, low: 1_000_000,
//!              close: 1_020_000, prev_close: 1_010_000, volume: 12, value: 1_200 },
//! ];
//! let bars = build_bars(&raw);
//! assert_eq!(bars.len(), 2);
//!
//! // Scan with every builtin recognizer
//! let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
//! let patterns = engine.scan(&bars).unwrap();
//! assert!(patterns.is_empty());
//! ```

pub mod backtest;
pub mod bar;
pub mod cache;
pub mod detectors;
pub mod financing;
pub mod grid;
pub mod params;
pub mod screen;
pub mod source;
pub mod stats;

pub mod prelude {
    pub use crate::{
        // Simulation
        backtest::{BacktestConfig, BacktestReport, Backtester, HorizonStats, YearWindow},
        // Bars
        bar::{build_bars, smoothed_rsi, Bar, RawBar},
        // Cache
        cache::{CacheKey, CacheStore, CachedBarSource, CachedRosterSource, MemoryCache},
        // Detectors
        detectors::*,
        financing::{min_subarray_sum, DatedLedger, Financing},
        grid::{grid_trading_return, simulate_grid, GridConfig, GridOutcome},
        // Parameters
        params::{get_factor, get_period, get_ratio, ParamMeta, ParamType, ParameterizedDetector},
        // Parallel
        scan_parallel,
        // Screens
        screen::{
            GridScreenConfig, HotSectorConfig, LowScreenConfig, Screener, ScreenHit,
            SectorLeadersConfig, VolatilityScreenConfig,
        },
        stats::{
            average_amount, distance_to_low, limit_up_count, percentile_rank, roster_hits,
            volatility,
        },
        // Collaborators
        source::{
            load_bars, BarSource, InMemorySource, Instrument, Periodicity, RosterBranch,
            RosterEntry, RosterSource, UniverseCategory, UniverseSource,
        },
        // Engine
        BuiltinDetector,
        // Core traits
        Candle,
        CandleExt,
        EngineBuilder,
        PatternCategory,
        PatternDetector,
        PatternEngine,
        PatternMetadata,
        // Errors
        AnalysisError,
        PatternId,
        PatternKind,
        PatternMatch,
        Period,
        Ratio,
        Result,
        ScanError,
        ScanResult,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors raised by validation, period statistics and simulators.
///
/// Malformed vendor bars are not errors: the bar builder truncates the
/// stream instead.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AnalysisError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Insufficient data: need {need} bars, got {got}")]
    InsufficientData { need: usize, got: usize },

    #[error("Invalid range [{start}, {end}) over {len} bars")]
    InvalidRange { start: usize, end: usize, len: usize },

    #[error("Index {index} out of bounds for {len} bars")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("Invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: &'static str },

    #[error("Cache error: {0}")]
    Cache(String),
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(AnalysisError::InvalidValue(
                "Ratio cannot be NaN or infinite",
            ));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(AnalysisError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(AnalysisError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// CANDLE TRAITS
// ============================================================

/// Core candlestick data trait. Prices are integer minor currency units.
pub trait Candle {
    fn open(&self) -> i64;
    fn high(&self) -> i64;
    fn low(&self) -> i64;
    fn close(&self) -> i64;

    /// Percent change against the previous close, already scaled by 100.
    fn percent_change(&self) -> f64;

    /// Upper bound of the body: `max(open, close)`
    #[inline]
    fn entity_high(&self) -> i64 {
        self.open().max(self.close())
    }

    /// Lower bound of the body: `min(open, close)`
    #[inline]
    fn entity_low(&self) -> i64 {
        self.open().min(self.close())
    }
}

/// Extension trait with computed properties for candle data
pub trait CandleExt: Candle {
    #[inline]
    fn body_height(&self) -> i64 {
        self.entity_high() - self.entity_low()
    }

    #[inline]
    fn upper_wick(&self) -> i64 {
        self.high() - self.entity_high()
    }

    #[inline]
    fn lower_wick(&self) -> i64 {
        self.entity_low() - self.low()
    }

    /// Closed at or below the open. A doji counts as both colors.
    #[inline]
    fn is_black(&self) -> bool {
        self.close() <= self.open()
    }

    /// Closed at or above the open. A doji counts as both colors.
    #[inline]
    fn is_white(&self) -> bool {
        self.close() >= self.open()
    }

    /// Body height relative to the body's lower bound. None if the body low is not positive.
    #[inline]
    fn body_ratio(&self) -> Option<f64> {
        let low = self.entity_low();
        (low > 0).then(|| self.body_height() as f64 / low as f64)
    }

    /// Validate candle consistency
    fn validate(&self) -> Result<()> {
        if self.open() <= 0 || self.high() <= 0 || self.low() <= 0 || self.close() <= 0 {
            return Err(AnalysisError::InvalidBar {
                index: 0,
                reason: "non-positive price",
            });
        }
        if self.low() > self.entity_low() || self.entity_high() > self.high() {
            return Err(AnalysisError::InvalidBar {
                index: 0,
                reason: "body outside high/low range",
            });
        }
        if !self.percent_change().is_finite() {
            return Err(AnalysisError::InvalidBar {
                index: 0,
                reason: "non-finite percent change",
            });
        }
        Ok(())
    }
}

impl<T: Candle> CandleExt for T {}

// ============================================================
// PATTERN MATCH - result of detection (Copy, no allocations)
// ============================================================

/// Unique identifier for a pattern type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PatternId(pub &'static str);

impl PatternId {
    /// Returns the string identifier
    #[inline]
    pub fn as_str(&self) -> &'static str {
        self.0
    }
}

/// Names a builtin recognizer in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Hammer,
    BullishEngulfing,
    Piercing,
    MorningStar,
    Harami,
    FlatBottom,
}

impl PatternKind {
    pub const ALL: [PatternKind; 6] = [
        PatternKind::Hammer,
        PatternKind::BullishEngulfing,
        PatternKind::Piercing,
        PatternKind::MorningStar,
        PatternKind::Harami,
        PatternKind::FlatBottom,
    ];

    pub fn id(self) -> PatternId {
        match self {
            PatternKind::Hammer => PatternId("HAMMER"),
            PatternKind::BullishEngulfing => PatternId("BULLISH_ENGULFING"),
            PatternKind::Piercing => PatternId("PIERCING"),
            PatternKind::MorningStar => PatternId("MORNING_STAR"),
            PatternKind::Harami => PatternId("HARAMI"),
            PatternKind::FlatBottom => PatternId("FLAT_BOTTOM"),
        }
    }
}

/// A recognizer hit: the bars `start_index..=end_index` form the pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatternMatch {
    pub pattern_id: PatternId,
    pub start_index: usize,
    pub end_index: usize,
}

// ============================================================
// PATTERN DETECTOR TRAITS
// ============================================================

/// Category of pattern by number of bars
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternCategory {
    SingleBar,
    TwoBar,
    ThreeBar,
}

/// Additional metadata about a pattern
#[derive(Debug, Clone)]
pub struct PatternMetadata {
    pub name: &'static str,
    pub description: &'static str,
    pub category: PatternCategory,
}

/// Fixed-width sliding-window classifier evaluated at a single bar.
pub trait PatternDetector: Send + Sync {
    fn id(&self) -> PatternId;

    /// Bars needed up to and including `index` (candles plus the trend window).
    fn min_bars(&self) -> usize;

    fn detect<T: Candle>(&self, bars: &[T], index: usize) -> Option<PatternMatch>;

    /// Boolean form of [`PatternDetector::detect`].
    #[inline]
    fn matches<T: Candle>(&self, bars: &[T], index: usize) -> bool {
        self.detect(bars, index).is_some()
    }

    fn validate_config(&self) -> Result<()> {
        Ok(())
    }

    /// Display name and shape. Detectors spanning more than one candle
    /// override this.
    fn metadata(&self) -> PatternMetadata {
        PatternMetadata {
            name: self.id().0,
            description: "",
            category: PatternCategory::SingleBar,
        }
    }
}

// ============================================================
// BUILTIN DETECTORS - generated via macro
// ============================================================

use detectors::*;

/// Macro to generate BuiltinDetector enum without boilerplate
macro_rules! define_builtin_detectors {
    (
        $(
            $variant:ident($detector:ty)
        ),* $(,)?
    ) => {
        /// All builtin detectors - fast path via enum dispatch
        #[derive(Debug, Clone)]
        pub enum BuiltinDetector {
            $($variant($detector)),*
        }

        impl BuiltinDetector {
            #[inline]
            pub fn detect<T: Candle>(&self, bars: &[T], index: usize) -> Option<PatternMatch> {
                match self {
                    $(Self::$variant(d) => PatternDetector::detect(d, bars, index)),*
                }
            }

            #[inline]
            pub fn matches<T: Candle>(&self, bars: &[T], index: usize) -> bool {
                self.detect(bars, index).is_some()
            }

            #[inline]
            pub fn id(&self) -> PatternId {
                match self {
                    $(Self::$variant(d) => PatternDetector::id(d)),*
                }
            }

            #[inline]
            pub fn min_bars(&self) -> usize {
                match self {
                    $(Self::$variant(d) => PatternDetector::min_bars(d)),*
                }
            }

            pub fn validate_config(&self) -> Result<()> {
                match self {
                    $(Self::$variant(d) => PatternDetector::validate_config(d)),*
                }
            }

            pub fn metadata(&self) -> PatternMetadata {
                match self {
                    $(Self::$variant(d) => PatternDetector::metadata(d)),*
                }
            }

            pub fn kind(&self) -> PatternKind {
                match self {
                    $(Self::$variant(_) => PatternKind::$variant),*
                }
            }

            /// Detector for `kind` with default thresholds
            pub fn from_kind(kind: PatternKind) -> Self {
                match kind {
                    $(PatternKind::$variant => Self::$variant(Default::default())),*
                }
            }
        }
    };
}

define_builtin_detectors! {
    // Single bar
    Hammer(HammerDetector),

    // Two bar
    BullishEngulfing(BullishEngulfingDetector),
    Piercing(PiercingDetector),
    Harami(HaramiDetector),
    FlatBottom(FlatBottomDetector),

    // Three bar
    MorningStar(MorningStarDetector),
}

// ============================================================
// PATTERN ENGINE
// ============================================================

/// Engine configuration
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub validate_data: bool,
    pub pattern_filter: Option<Vec<PatternId>>,
}

/// Runs a set of recognizers over a bar sequence
pub struct PatternEngine {
    builtin: Vec<BuiltinDetector>,
    config: EngineConfig,
}

impl PatternEngine {
    /// Detect patterns at a single bar index.
    pub fn scan_at<T: Candle>(&self, bars: &[T], index: usize) -> Vec<PatternMatch> {
        let mut results = Vec::new();

        for detector in &self.builtin {
            if index + 1 >= detector.min_bars() {
                if let Some(m) = detector.detect(bars, index) {
                    if self.should_include(&m) {
                        results.push(m);
                    }
                }
            }
        }

        results
    }

    /// Detect patterns in a range of bars.
    pub fn scan_range<T: Candle>(
        &self,
        bars: &[T],
        range: std::ops::Range<usize>,
    ) -> Vec<PatternMatch> {
        let end = range.end.min(bars.len());
        (range.start..end)
            .flat_map(|i| self.scan_at(bars, i))
            .collect()
    }

    /// Scan all bars and return flat list of patterns.
    pub fn scan<T: Candle>(&self, bars: &[T]) -> Result<Vec<PatternMatch>> {
        if self.config.validate_data {
            self.validate_bars(bars)?;
        }

        Ok(self.scan_range(bars, 0..bars.len()))
    }

    /// Patterns completed by the newest bar.
    pub fn latest_matches<T: Candle>(&self, bars: &[T]) -> Vec<PatternMatch> {
        match bars.len() {
            0 => Vec::new(),
            len => self.scan_at(bars, len - 1),
        }
    }

    pub fn detectors(&self) -> &[BuiltinDetector] {
        &self.builtin
    }

    fn should_include(&self, m: &PatternMatch) -> bool {
        match self.config.pattern_filter {
            Some(ref filter) => filter.contains(&m.pattern_id),
            None => true,
        }
    }

    fn validate_bars<T: Candle>(&self, bars: &[T]) -> Result<()> {
        for (i, bar) in bars.iter().enumerate() {
            bar.validate().map_err(|e| match e {
                AnalysisError::InvalidBar { reason, .. } => {
                    AnalysisError::InvalidBar { index: i, reason }
                }
                other => other,
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for d in &self.builtin {
            d.validate_config()?;
        }
        Ok(())
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating PatternEngine instances
#[derive(Default)]
pub struct EngineBuilder {
    builtin: Vec<BuiltinDetector>,
    config: EngineConfig,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add all builtin patterns with default configurations
    pub fn with_all_defaults(mut self) -> Self {
        self.builtin
            .extend(PatternKind::ALL.into_iter().map(BuiltinDetector::from_kind));
        self
    }

    /// Add a builtin detector
    #[allow(clippy::should_implement_trait)]
    pub fn add(mut self, detector: BuiltinDetector) -> Self {
        self.builtin.push(detector);
        self
    }

    /// Add with config validation
    pub fn add_checked(mut self, detector: BuiltinDetector) -> Result<Self> {
        detector.validate_config()?;
        self.builtin.push(detector);
        Ok(self)
    }

    /// Enable/disable data validation
    pub fn validate_data(mut self, enable: bool) -> Self {
        self.config.validate_data = enable;
        self
    }

    /// Filter to specific patterns only
    pub fn only_patterns(mut self, ids: impl IntoIterator<Item = PatternId>) -> Self {
        self.config.pattern_filter = Some(ids.into_iter().collect());
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<PatternEngine> {
        let engine = PatternEngine {
            builtin: self.builtin,
            config: self.config,
        };
        engine.validate()?;
        Ok(engine)
    }
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// Result of scanning a single instrument
#[derive(Debug)]
pub struct ScanResult {
    pub symbol: String,
    pub patterns: Vec<PatternMatch>,
}

/// Error from scanning a single instrument
#[derive(Debug)]
pub struct ScanError {
    pub symbol: String,
    pub error: AnalysisError,
}

/// Parallel scanning of multiple instruments. A failing instrument never
/// aborts the others.
pub fn scan_parallel<'a, T, I>(
    engine: &PatternEngine,
    instruments: I,
) -> (Vec<ScanResult>, Vec<ScanError>)
where
    T: Candle + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T])>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, bars)| {
            engine
                .scan(bars)
                .map(|patterns| ScanResult {
                    symbol: symbol.to_string(),
                    patterns,
                })
                .map_err(|error| ScanError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
