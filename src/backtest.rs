//! Point-in-time pattern backtest
//!
//! For every bar inside a calendar-year window where the configured
//! recognizer fires, buy a fixed notional at the next bar's open and sell at
//! the close `h + 1` bars later, for each horizon `h` in `0..holding_days`.
//! Each horizon keeps its own win/loss counts and dated cash ledger, which is
//! financed with [`DatedLedger::financing`].

use std::fmt;

use chrono::{Datelike, Local};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::bar::Bar;
use crate::financing::{DatedLedger, Financing};
use crate::source::{load_bars, BarSource, Instrument, Periodicity};
use crate::{AnalysisError, BuiltinDetector, PatternKind, Period, Ratio, Result};

pub const DEFAULT_HOLDING_DAYS: usize = 10;
pub const DEFAULT_NOTIONAL: f64 = 100_000.0;
pub const DEFAULT_BACKTEST_TAX: f64 = 0.002;
/// Fourteen years of daily bars
pub const DEFAULT_HISTORY_BARS: usize = 250 * 14;
pub const FIRST_BACKTEST_YEAR: i32 = 2010;

// ============================================================
// CONFIGURATION
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Recognizer that opens a trade
    pub pattern: PatternKind,
    /// Number of exit horizons evaluated per signal
    pub holding_days: Period,
    /// Cash committed per trade
    pub notional: f64,
    /// Transaction cost charged on both sides
    pub tax: Ratio,
    /// Daily bars requested per instrument by the sweeps
    pub history_bars: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            pattern: PatternKind::MorningStar,
            holding_days: Period::new_const(DEFAULT_HOLDING_DAYS),
            notional: DEFAULT_NOTIONAL,
            tax: Ratio::new_const(DEFAULT_BACKTEST_TAX),
            history_bars: DEFAULT_HISTORY_BARS,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.notional.is_finite() || self.notional <= 0.0 {
            return Err(AnalysisError::InvalidConfig(format!(
                "notional must be a positive finite amount, got {}",
                self.notional
            )));
        }
        Ok(())
    }
}

/// Calendar years `[begin, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct YearWindow {
    pub begin: i32,
    pub end: i32,
}

impl YearWindow {
    pub fn new(begin: i32, end: i32) -> Result<Self> {
        if begin >= end {
            return Err(AnalysisError::InvalidConfig(format!(
                "year window {begin}..{end} is empty"
            )));
        }
        Ok(Self { begin, end })
    }

    pub fn single(year: i32) -> Self {
        Self {
            begin: year,
            end: year + 1,
        }
    }

    /// One window per year from `first` through `last`, inclusive.
    pub fn yearly(first: i32, last: i32) -> Vec<Self> {
        (first..=last).map(Self::single).collect()
    }

    /// One window per year from [`FIRST_BACKTEST_YEAR`] through the current year.
    pub fn through_today() -> Vec<Self> {
        Self::yearly(FIRST_BACKTEST_YEAR, Local::now().year())
    }

    #[inline]
    pub fn contains(&self, year: i32) -> bool {
        (self.begin..self.end).contains(&year)
    }
}

impl fmt::Display for YearWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.begin, self.end)
    }
}

// ============================================================
// REPORTS
// ============================================================

/// Outcome of one exit horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonStats {
    /// Exit at the close of bar `signal + horizon + 2`
    pub horizon: usize,
    pub wins: usize,
    pub losses: usize,
    /// `wins / (wins + losses) * 100`, 0 without trades
    pub win_rate: f64,
    pub financing: Financing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub window: YearWindow,
    /// Signals that had a next bar to buy on
    pub signals: usize,
    pub horizons: Vec<HorizonStats>,
}

/// Running counts for one window, mergeable across instruments
#[derive(Debug, Clone, Default)]
pub struct BacktestTally {
    pub signals: usize,
    pub wins: Vec<usize>,
    pub losses: Vec<usize>,
    pub ledgers: Vec<DatedLedger>,
}

impl BacktestTally {
    pub fn new(horizons: usize) -> Self {
        Self {
            signals: 0,
            wins: vec![0; horizons],
            losses: vec![0; horizons],
            ledgers: vec![DatedLedger::new(); horizons],
        }
    }

    pub fn merge(&mut self, other: &BacktestTally) {
        self.signals += other.signals;
        for (a, b) in self.wins.iter_mut().zip(&other.wins) {
            *a += b;
        }
        for (a, b) in self.losses.iter_mut().zip(&other.losses) {
            *a += b;
        }
        for (a, b) in self.ledgers.iter_mut().zip(&other.ledgers) {
            a.merge(b);
        }
    }

    pub fn into_report(self, window: YearWindow) -> BacktestReport {
        let horizons = self
            .wins
            .iter()
            .zip(&self.losses)
            .zip(&self.ledgers)
            .enumerate()
            .map(|(horizon, ((&wins, &losses), ledger))| {
                let trades = wins + losses;
                HorizonStats {
                    horizon,
                    wins,
                    losses,
                    win_rate: if trades > 0 {
                        wins as f64 / trades as f64 * 100.0
                    } else {
                        0.0
                    },
                    financing: ledger.financing(),
                }
            })
            .collect();

        BacktestReport {
            window,
            signals: self.signals,
            horizons,
        }
    }
}

// ============================================================
// BACKTESTER
// ============================================================

pub struct Backtester {
    config: BacktestConfig,
    detector: BuiltinDetector,
}

impl Backtester {
    /// Backtest the configured pattern with its default thresholds
    pub fn new(config: BacktestConfig) -> Result<Self> {
        Self::with_detector(config, BuiltinDetector::from_kind(config.pattern))
    }

    /// Backtest a recognizer with custom thresholds. `config.pattern` is
    /// overwritten with the detector's kind.
    pub fn with_detector(mut config: BacktestConfig, detector: BuiltinDetector) -> Result<Self> {
        config.validate()?;
        detector.validate_config()?;
        config.pattern = detector.kind();
        Ok(Self { config, detector })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Trades of one instrument's bars inside `window`.
    pub fn tally(&self, bars: &[Bar], window: YearWindow) -> BacktestTally {
        let horizons = self.config.holding_days.get();
        let buy_cost = self.config.notional * (1.0 + self.config.tax.get());
        let sell_keep = self.config.notional * (1.0 - self.config.tax.get());
        let mut tally = BacktestTally::new(horizons);

        for index in 0..bars.len() {
            if !window.contains(bars[index].year()) {
                continue;
            }
            if !self.detector.matches(bars, index) {
                continue;
            }
            let Some(buy) = bars.get(index + 1) else {
                continue;
            };
            tally.signals += 1;

            let buy_date = buy.date_key();
            for horizon in 0..horizons {
                let Some(sell) = bars.get(index + horizon + 2) else {
                    break;
                };
                let rate = sell.close as f64 / buy.open as f64;
                if rate > 1.0 {
                    tally.wins[horizon] += 1;
                } else {
                    tally.losses[horizon] += 1;
                }
                tally.ledgers[horizon].post(buy_date, -buy_cost);
                tally.ledgers[horizon].post(sell.date_key(), sell_keep * rate);
            }
        }

        tally
    }

    /// Backtest one instrument over one window.
    pub fn simulate(&self, bars: &[Bar], window: YearWindow) -> BacktestReport {
        self.tally(bars, window).into_report(window)
    }

    /// Backtest every instrument over one window.
    pub fn run_window<S: BarSource + ?Sized>(
        &self,
        source: &S,
        instruments: &[Instrument],
        window: YearWindow,
    ) -> BacktestReport {
        self.run_years(source, instruments, &[window])
            .into_iter()
            .next()
            .unwrap_or_else(|| BacktestTally::new(self.config.holding_days.get()).into_report(window))
    }

    /// Backtest every instrument over each window independently.
    ///
    /// Bars are loaded once per instrument. Instruments without data are
    /// skipped. Tallies are merged in instrument order.
    pub fn run_years<S: BarSource + ?Sized>(
        &self,
        source: &S,
        instruments: &[Instrument],
        windows: &[YearWindow],
    ) -> Vec<BacktestReport> {
        info!(
            instruments = instruments.len(),
            windows = windows.len(),
            pattern = self.detector.id().as_str(),
            "Starting backtest sweep"
        );

        let per_instrument: Vec<Vec<BacktestTally>> = instruments
            .par_iter()
            .filter_map(|instrument| {
                let bars = load_bars(
                    source,
                    &instrument.symbol,
                    Periodicity::Day,
                    self.config.history_bars,
                );
                if bars.is_empty() {
                    debug!(symbol = %instrument.symbol, "No bars, skipping instrument");
                    return None;
                }
                Some(windows.iter().map(|&w| self.tally(&bars, w)).collect())
            })
            .collect();

        let horizons = self.config.holding_days.get();
        windows
            .iter()
            .enumerate()
            .map(|(slot, &window)| {
                let mut total = BacktestTally::new(horizons);
                for tallies in &per_instrument {
                    total.merge(&tallies[slot]);
                }
                let report = total.into_report(window);
                info!(window = %window, signals = report.signals, "Backtest window finished");
                report
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::HammerDetector;

    fn flat_year(year: i32, n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let date = format!("{year}01{:02}", i + 1);
                Bar::new(&date, 1000, 1010, 990, 1000).unwrap()
            })
            .collect()
    }

    /// Five falling bars, a hammer, then exits at rising closes.
    fn hammer_series() -> Vec<Bar> {
        let mut bars: Vec<Bar> = (0..5)
            .map(|i| {
                let c = 1000 - i * 20;
                let date = format!("202301{:02}", i + 2);
                Bar::new(&date, c + 10, c + 15, c - 5, c).unwrap()
            })
            .collect();
        bars.push(Bar::new("20230109", 900, 912, 860, 910).unwrap());
        bars.push(Bar::new("20230110", 910, 930, 905, 920).unwrap());
        bars.push(Bar::new("20230111", 920, 950, 915, 940).unwrap());
        bars.push(Bar::new("20230112", 940, 945, 890, 900).unwrap());
        bars
    }

    /// Three falling bars, a morning star ending at index 5, a buy bar at
    /// 1150 and three exits.
    fn morning_star_series() -> Vec<Bar> {
        let mut bars: Vec<Bar> = [1320, 1300, 1280]
            .iter()
            .enumerate()
            .map(|(i, &c)| {
                let date = format!("202303{:02}", i + 1);
                Bar::new(&date, c + 10, c + 20, c - 10, c).unwrap()
            })
            .collect();
        bars.push(Bar::new("20230306", 1200, 1210, 1090, 1100).unwrap());
        bars.push(Bar::new("20230307", 1090, 1098, 1080, 1095).unwrap());
        bars.push(Bar::new("20230308", 1100, 1160, 1098, 1150).unwrap());
        bars.push(Bar::new("20230309", 1150, 1170, 1145, 1160).unwrap());
        bars.push(Bar::new("20230310", 1160, 1185, 1155, 1180).unwrap());
        bars.push(Bar::new("20230313", 1180, 1182, 1135, 1140).unwrap());
        bars.push(Bar::new("20230314", 1140, 1205, 1138, 1200).unwrap());
        bars
    }

    fn hammer_backtester(holding_days: usize) -> Backtester {
        let config = BacktestConfig {
            holding_days: Period::new(holding_days).unwrap(),
            ..BacktestConfig::default()
        };
        Backtester::with_detector(config, BuiltinDetector::Hammer(HammerDetector::default())).unwrap()
    }

    #[test]
    fn test_year_without_signals_is_all_zero() {
        let backtester = Backtester::new(BacktestConfig::default()).unwrap();
        let report = backtester.simulate(&flat_year(2020, 20), YearWindow::single(2020));

        assert_eq!(report.signals, 0);
        assert_eq!(report.horizons.len(), DEFAULT_HOLDING_DAYS);
        for h in &report.horizons {
            assert_eq!((h.wins, h.losses), (0, 0));
            assert_eq!(h.win_rate, 0.0);
            assert_eq!(h.financing.investment, 0.0);
            assert_eq!(h.financing.profit, 0.0);
            assert_eq!(h.financing.return_rate, 0.0);
        }
    }

    #[test]
    fn test_default_config_trades_morning_star() {
        let backtester = Backtester::new(BacktestConfig::default()).unwrap();
        let report = backtester.simulate(&morning_star_series(), YearWindow::single(2023));

        assert_eq!(report.signals, 1);
        assert_eq!(report.horizons.len(), DEFAULT_HOLDING_DAYS);
        // bought at 1150, exits at 1180, 1140 and 1200
        let counts: Vec<(usize, usize)> = report.horizons.iter().map(|h| (h.wins, h.losses)).collect();
        assert_eq!(counts[..3], [(1, 0), (0, 1), (1, 0)]);
        assert!(counts[3..].iter().all(|&c| c == (0, 0)));

        let buy = DEFAULT_NOTIONAL * (1.0 + DEFAULT_BACKTEST_TAX);
        for h in &report.horizons[..3] {
            assert!((h.financing.investment - buy).abs() < 1e-6);
        }
        let sell = DEFAULT_NOTIONAL * (1180.0 / 1150.0) * (1.0 - DEFAULT_BACKTEST_TAX);
        assert!((report.horizons[0].financing.profit - (sell - buy)).abs() < 1e-6);
        assert_eq!(report.horizons[3].financing.investment, 0.0);
    }

    #[test]
    fn test_horizons_past_the_data_are_skipped() {
        let report = hammer_backtester(5).simulate(&hammer_series(), YearWindow::single(2023));

        assert_eq!(report.signals, 1);
        // buy at 910, exits at 940 (win) and 900 (loss); later horizons have no bar
        assert_eq!((report.horizons[0].wins, report.horizons[0].losses), (1, 0));
        assert_eq!((report.horizons[1].wins, report.horizons[1].losses), (0, 1));
        assert_eq!(report.horizons[2].wins + report.horizons[2].losses, 0);
        assert_eq!(report.horizons[0].win_rate, 100.0);
    }

    #[test]
    fn test_ledger_amounts() {
        let report = hammer_backtester(1).simulate(&hammer_series(), YearWindow::single(2023));
        let f = report.horizons[0].financing;

        let rate = 940.0 / 910.0;
        let buy = DEFAULT_NOTIONAL * (1.0 + DEFAULT_BACKTEST_TAX);
        let sell = DEFAULT_NOTIONAL * rate * (1.0 - DEFAULT_BACKTEST_TAX);
        assert!((f.investment - buy).abs() < 1e-6);
        assert!((f.profit - (sell - buy)).abs() < 1e-6);
    }

    #[test]
    fn test_window_excludes_other_years() {
        let report = hammer_backtester(2).simulate(&hammer_series(), YearWindow::single(2022));
        assert_eq!(report.signals, 0);
    }

    #[test]
    fn test_rejects_bad_config() {
        let config = BacktestConfig {
            notional: 0.0,
            ..BacktestConfig::default()
        };
        assert!(Backtester::new(config).is_err());
        assert!(YearWindow::new(2020, 2020).is_err());
    }

    #[test]
    fn test_year_windows() {
        let windows = YearWindow::yearly(2010, 2012);
        assert_eq!(windows.len(), 3);
        assert!(windows[1].contains(2011));
        assert!(!windows[1].contains(2012));
        assert_eq!(windows[2].to_string(), "2012..2013");
        assert!(YearWindow::through_today().len() >= 16);
    }

    #[test]
    fn test_config_serde() {
        let config: BacktestConfig =
            serde_json::from_str(r#"{"pattern": "hammer", "holding_days": 3}"#).unwrap();
        assert_eq!(config.pattern, PatternKind::Hammer);
        assert_eq!(config.holding_days.get(), 3);
        assert_eq!(config.notional, DEFAULT_NOTIONAL);
        assert!(serde_json::from_str::<BacktestConfig>(r#"{"holding_days": 0}"#).is_err());
    }
}
