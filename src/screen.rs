//! Screening sweeps over instrument universes
//!
//! Each sweep enumerates a universe through [`UniverseSource`], loads daily
//! bars through [`BarSource`], scores every instrument over several
//! look-back spans and keeps the ones that pass the configured thresholds.
//! Instruments are scored in parallel and reported in universe order. An
//! instrument without data is skipped, never fatal.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backtest::DEFAULT_HISTORY_BARS;
use crate::bar::Bar;
use crate::grid::{grid_trading_return, GridConfig};
use crate::source::{load_bars, BarSource, Instrument, Periodicity, RosterSource, UniverseCategory, UniverseSource};
use crate::stats::{self, LIMIT_UP_PERCENT};
use crate::{AnalysisError, PatternEngine, PatternMatch, Result};

pub const BARS_PER_YEAR: usize = 250;
pub const BARS_PER_MONTH: usize = 21;

fn require(ok: bool, what: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(AnalysisError::InvalidConfig(what.to_string()))
    }
}

/// `(span, start)` for spans `1..=max` whose `span * unit` bars fit in `len`
fn spans(len: usize, unit: usize, max: usize) -> impl Iterator<Item = (usize, usize)> {
    (1..=max).filter_map(move |span| {
        let bars = span * unit;
        (bars <= len).then(|| (span, len - bars))
    })
}

/// Mean traded value of the newest `window` bars, or of all bars if fewer.
fn recent_average_amount(bars: &[Bar], window: usize) -> Option<f64> {
    let len = bars.len();
    stats::average_amount(bars, len - window.min(len), len).ok()
}

// ============================================================
// CONFIGURATION
// ============================================================

/// Instruments trading close to their multi-year low
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LowScreenConfig {
    pub category: UniverseCategory,
    pub bars_per_year: usize,
    pub max_years: usize,
    /// Look-back the thresholds apply to
    pub target_years: usize,
    /// Upper bound on both distance to low and percentile rank
    pub max_rate: f64,
    /// Newest bar's traded value must reach this
    pub min_amount: u64,
}

impl Default for LowScreenConfig {
    fn default() -> Self {
        Self {
            category: UniverseCategory::Etfs,
            bars_per_year: BARS_PER_YEAR,
            max_years: 14,
            target_years: 5,
            max_rate: 10.0,
            min_amount: 100_000_000_000,
        }
    }
}

impl LowScreenConfig {
    pub fn validate(&self) -> Result<()> {
        require(self.bars_per_year > 0, "bars_per_year must be > 0")?;
        require(
            (1..=self.max_years).contains(&self.target_years),
            "target_years must be within 1..=max_years",
        )
    }
}

/// Instruments whose recent daily moves are wide enough to trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityScreenConfig {
    pub category: UniverseCategory,
    pub bars_per_month: usize,
    pub max_months: usize,
    pub target_months: usize,
    pub min_volatility: f64,
    /// Bars averaged for the liquidity check
    pub amount_window: usize,
    pub min_average_amount: f64,
}

impl Default for VolatilityScreenConfig {
    fn default() -> Self {
        Self {
            category: UniverseCategory::Etfs,
            bars_per_month: BARS_PER_MONTH,
            max_months: 6,
            target_months: 3,
            min_volatility: 2.0,
            amount_window: 5,
            min_average_amount: 5e9,
        }
    }
}

impl VolatilityScreenConfig {
    pub fn validate(&self) -> Result<()> {
        require(self.bars_per_month > 0, "bars_per_month must be > 0")?;
        require(self.amount_window > 0, "amount_window must be > 0")?;
        require(
            (1..=self.max_months).contains(&self.target_months),
            "target_months must be within 1..=max_months",
        )
    }
}

/// Instruments where the grid strategy would have paid recently.
///
/// An instrument with fewer bars than `target_months` months is excluded
/// rather than scored at the `min_return` floor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridScreenConfig {
    pub category: UniverseCategory,
    pub grid: GridConfig,
    pub bars_per_month: usize,
    pub max_months: usize,
    pub target_months: usize,
    /// Minimum return rate, x100
    pub min_return: f64,
    pub amount_window: usize,
    pub min_average_amount: f64,
}

impl Default for GridScreenConfig {
    fn default() -> Self {
        Self {
            category: UniverseCategory::Etfs,
            grid: GridConfig::default(),
            bars_per_month: BARS_PER_MONTH,
            max_months: 6,
            target_months: 3,
            min_return: -100.0,
            amount_window: 5,
            min_average_amount: 1e9,
        }
    }
}

impl GridScreenConfig {
    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        require(self.bars_per_month > 0, "bars_per_month must be > 0")?;
        require(self.amount_window > 0, "amount_window must be > 0")?;
        require(
            (1..=self.max_months).contains(&self.target_months),
            "target_months must be within 1..=max_months",
        )
    }
}

/// Sectors whose members hit the daily limit often
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HotSectorConfig {
    pub bars_per_year: usize,
    pub max_years: usize,
    pub target_years: usize,
    pub limit_up_percent: f64,
    /// Minimum limit-ups per constituent per year over the target look-back
    pub min_average: f64,
}

impl Default for HotSectorConfig {
    fn default() -> Self {
        Self {
            bars_per_year: BARS_PER_YEAR,
            max_years: 14,
            target_years: 5,
            limit_up_percent: LIMIT_UP_PERCENT,
            min_average: 3.0,
        }
    }
}

impl HotSectorConfig {
    pub fn validate(&self) -> Result<()> {
        require(self.bars_per_year > 0, "bars_per_year must be > 0")?;
        require(
            (1..=self.max_years).contains(&self.target_years),
            "target_years must be within 1..=max_years",
        )
    }
}

/// Most frequent limit-up constituents of selected sectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectorLeadersConfig {
    /// Sector index symbols to inspect
    pub sectors: Vec<String>,
    pub lookback_bars: usize,
    pub top: usize,
    pub limit_up_percent: f64,
}

impl Default for SectorLeadersConfig {
    fn default() -> Self {
        Self {
            sectors: Vec::new(),
            lookback_bars: BARS_PER_YEAR,
            top: 5,
            limit_up_percent: LIMIT_UP_PERCENT,
        }
    }
}

// ============================================================
// RESULTS
// ============================================================

/// Value of a metric over the newest `span` years or months
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Lookback {
    pub span: usize,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LowLookback {
    pub years: usize,
    pub distance_to_low: f64,
    pub percentile_rank: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LowScreenHit {
    pub instrument: Instrument,
    pub lookbacks: Vec<LowLookback>,
}

/// An instrument that passed a single-metric screen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenHit {
    pub instrument: Instrument,
    pub lookbacks: Vec<Lookback>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorHeat {
    pub sector: Instrument,
    pub constituents: usize,
    /// Limit-ups per constituent per year
    pub averages: Vec<Lookback>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitUpLeader {
    pub instrument: Instrument,
    pub limit_ups: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorLeaders {
    pub sector: Instrument,
    pub leaders: Vec<LimitUpLeader>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternHit {
    pub instrument: Instrument,
    pub matches: Vec<PatternMatch>,
}

// ============================================================
// PER-INSTRUMENT SCORING
// ============================================================

/// Distance to low and percentile rank of the newest bar per yearly
/// look-back. None unless the target look-back passes both thresholds and
/// the newest bar is liquid enough.
pub fn score_relative_low(bars: &[Bar], config: &LowScreenConfig) -> Option<Vec<LowLookback>> {
    let last = bars.len().checked_sub(1)?;
    let lookbacks: Vec<LowLookback> = spans(bars.len(), config.bars_per_year, config.max_years)
        .filter_map(|(years, start)| {
            Some(LowLookback {
                years,
                distance_to_low: stats::distance_to_low(bars, start, bars.len(), last).ok()?,
                percentile_rank: stats::percentile_rank(bars, start, bars.len(), last).ok()?,
            })
        })
        .collect();

    let target = lookbacks.iter().find(|l| l.years == config.target_years)?;
    let passes = target.distance_to_low <= config.max_rate
        && target.percentile_rank <= config.max_rate
        && bars[last].amount >= config.min_amount;
    passes.then_some(lookbacks)
}

/// Volatility per monthly look-back. None unless the target look-back
/// reaches the minimum and recent trading is liquid enough.
pub fn score_volatility(bars: &[Bar], config: &VolatilityScreenConfig) -> Option<Vec<Lookback>> {
    let lookbacks: Vec<Lookback> = spans(bars.len(), config.bars_per_month, config.max_months)
        .filter_map(|(span, start)| {
            let value = stats::volatility(bars, start, bars.len()).ok()?;
            Some(Lookback { span, value })
        })
        .collect();

    let target = lookbacks.iter().find(|l| l.span == config.target_months)?;
    let liquid = recent_average_amount(bars, config.amount_window)? >= config.min_average_amount;
    (target.value >= config.min_volatility && liquid).then_some(lookbacks)
}

/// Grid return rate per monthly look-back. None unless the target look-back
/// reaches the minimum and recent trading is liquid enough.
pub fn score_grid(bars: &[Bar], config: &GridScreenConfig) -> Option<Vec<Lookback>> {
    let lookbacks: Vec<Lookback> = spans(bars.len(), config.bars_per_month, config.max_months)
        .filter_map(|(span, start)| {
            let value = grid_trading_return(bars, start, bars.len(), &config.grid).ok()?;
            Some(Lookback { span, value })
        })
        .collect();

    let target = lookbacks.iter().find(|l| l.span == config.target_months)?;
    let liquid = recent_average_amount(bars, config.amount_window)? >= config.min_average_amount;
    (target.value >= config.min_return && liquid).then_some(lookbacks)
}

/// Limit-ups per constituent per year for each yearly look-back.
///
/// `members` holds the bars of the constituents that returned data, while
/// `constituents` is the size of the sector's full constituent list and is
/// the denominator. Constituents without data, or with less history than a
/// look-back, add nothing to it but still count.
pub fn sector_heat(members: &[Vec<Bar>], constituents: usize, config: &HotSectorConfig) -> Vec<Lookback> {
    let constituents = constituents.max(members.len());
    if constituents == 0 {
        return Vec::new();
    }
    (1..=config.max_years)
        .map(|years| {
            let span = years * config.bars_per_year;
            let limit_ups: usize = members
                .iter()
                .filter(|bars| bars.len() >= span)
                .filter_map(|bars| {
                    stats::limit_up_count(bars, bars.len() - span, bars.len(), config.limit_up_percent).ok()
                })
                .sum();
            Lookback {
                span: years,
                value: limit_ups as f64 / (constituents * years) as f64,
            }
        })
        .collect()
}

// ============================================================
// SWEEPS
// ============================================================

/// Runs screening sweeps against a data collaborator
pub struct Screener<'a, S: ?Sized> {
    source: &'a S,
    history_bars: usize,
}

impl<'a, S> Screener<'a, S>
where
    S: BarSource + UniverseSource + ?Sized,
{
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            history_bars: DEFAULT_HISTORY_BARS,
        }
    }

    /// Daily bars requested per instrument
    pub fn with_history_bars(mut self, history_bars: usize) -> Self {
        self.history_bars = history_bars;
        self
    }

    fn daily_bars(&self, instrument: &Instrument) -> Option<Vec<Bar>> {
        let bars = load_bars(self.source, &instrument.symbol, Periodicity::Day, self.history_bars);
        if bars.is_empty() {
            debug!(symbol = %instrument.symbol, "No bars, skipping instrument");
            return None;
        }
        Some(bars)
    }

    /// Score every instrument of `category`, in universe order.
    fn sweep<T, F>(&self, name: &'static str, category: &UniverseCategory, score: F) -> Vec<T>
    where
        T: Send,
        F: Fn(&Instrument, &[Bar]) -> Option<T> + Sync,
    {
        let universe = self.source.fetch_universe(category);
        let hits: Vec<T> = universe
            .par_iter()
            .filter_map(|instrument| {
                let bars = self.daily_bars(instrument)?;
                score(instrument, &bars)
            })
            .collect();
        info!(screen = name, universe = universe.len(), hits = hits.len(), "Screen finished");
        hits
    }

    pub fn relative_low(&self, config: &LowScreenConfig) -> Result<Vec<LowScreenHit>> {
        config.validate()?;
        Ok(self.sweep("relative_low", &config.category, |instrument, bars| {
            Some(LowScreenHit {
                instrument: instrument.clone(),
                lookbacks: score_relative_low(bars, config)?,
            })
        }))
    }

    pub fn volatility(&self, config: &VolatilityScreenConfig) -> Result<Vec<ScreenHit>> {
        config.validate()?;
        Ok(self.sweep("volatility", &config.category, |instrument, bars| {
            Some(ScreenHit {
                instrument: instrument.clone(),
                lookbacks: score_volatility(bars, config)?,
            })
        }))
    }

    pub fn grid(&self, config: &GridScreenConfig) -> Result<Vec<ScreenHit>> {
        config.validate()?;
        Ok(self.sweep("grid", &config.category, |instrument, bars| {
            Some(ScreenHit {
                instrument: instrument.clone(),
                lookbacks: score_grid(bars, config)?,
            })
        }))
    }

    /// Instruments of `category` on which `engine` fires at the newest bar
    pub fn latest_patterns(&self, category: &UniverseCategory, engine: &PatternEngine) -> Vec<PatternHit> {
        self.sweep("latest_patterns", category, |instrument, bars| {
            let matches = engine.latest_matches(bars);
            (!matches.is_empty()).then(|| PatternHit {
                instrument: instrument.clone(),
                matches,
            })
        })
    }

    fn constituents(&self, sector: &Instrument) -> Vec<(Instrument, Vec<Bar>)> {
        self.source
            .fetch_universe(&UniverseCategory::SectorConstituents(sector.symbol.clone()))
            .into_iter()
            .filter_map(|member| {
                let bars = self.daily_bars(&member)?;
                Some((member, bars))
            })
            .collect()
    }

    pub fn hot_sectors(&self, config: &HotSectorConfig) -> Result<Vec<SectorHeat>> {
        config.validate()?;
        let sectors = self.source.fetch_universe(&UniverseCategory::SectorIndices);

        let hits: Vec<SectorHeat> = sectors
            .par_iter()
            .filter_map(|sector| {
                let listed = self
                    .source
                    .fetch_universe(&UniverseCategory::SectorConstituents(sector.symbol.clone()));
                let members: Vec<Vec<Bar>> = listed
                    .iter()
                    .filter_map(|member| self.daily_bars(member))
                    .collect();
                if members.is_empty() {
                    debug!(sector = %sector.symbol, "No constituent data, skipping sector");
                    return None;
                }

                let averages = sector_heat(&members, listed.len(), config);
                let target = averages.iter().find(|l| l.span == config.target_years)?;
                (target.value >= config.min_average).then(|| SectorHeat {
                    sector: sector.clone(),
                    constituents: listed.len(),
                    averages,
                })
            })
            .collect();

        info!(screen = "hot_sectors", sectors = sectors.len(), hits = hits.len(), "Screen finished");
        Ok(hits)
    }

    /// Constituents with the most limit-ups over the newest
    /// `lookback_bars`, per selected sector. Ties keep universe order.
    pub fn sector_leaders(&self, config: &SectorLeadersConfig) -> Vec<SectorLeaders> {
        self.source
            .fetch_universe(&UniverseCategory::SectorIndices)
            .into_par_iter()
            .filter(|sector| config.sectors.contains(&sector.symbol))
            .map(|sector| {
                let mut leaders: Vec<LimitUpLeader> = self
                    .constituents(&sector)
                    .into_iter()
                    .filter(|(_, bars)| bars.len() >= config.lookback_bars)
                    .filter_map(|(instrument, bars)| {
                        let start = bars.len() - config.lookback_bars;
                        let limit_ups =
                            stats::limit_up_count(&bars, start, bars.len(), config.limit_up_percent).ok()?;
                        (limit_ups > 0).then_some(LimitUpLeader { instrument, limit_ups })
                    })
                    .collect();
                leaders.sort_by(|a, b| b.limit_ups.cmp(&a.limit_ups));
                leaders.truncate(config.top);
                SectorLeaders { sector, leaders }
            })
            .collect()
    }

    /// Roster net-buy days of `symbol` over its newest `lookback_bars` bars
    pub fn roster_activity(&self, symbol: &str, lookback_bars: usize) -> Result<usize>
    where
        S: RosterSource,
    {
        let bars = load_bars(self.source, symbol, Periodicity::Day, self.history_bars);
        let start = bars.len().saturating_sub(lookback_bars);
        stats::roster_hits(self.source, symbol, &bars, start, bars.len())
    }
}
