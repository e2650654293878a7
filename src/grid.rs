//! Grid-trading simulator
//!
//! Buys a fixed lot on every `grid_step` dip and sells one on every
//! `grid_step` rise, relative to a floating grid price. The resulting cash
//! ledger is financed with [`Financing::from_ledger`].

use serde::{Deserialize, Serialize};

use crate::financing::Financing;
use crate::{AnalysisError, Candle, Ratio, Result};

pub const DEFAULT_GRID_STEP: f64 = 0.01;
pub const DEFAULT_SHARES_PER_TRADE: u64 = 100_000;
pub const DEFAULT_GRID_TAX: f64 = 0.003;

/// Grid strategy settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Fractional distance between grid levels
    pub grid_step: Ratio,
    pub shares_per_trade: u64,
    /// Transaction cost charged on both sides
    pub tax: Ratio,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            grid_step: Ratio::new_const(DEFAULT_GRID_STEP),
            shares_per_trade: DEFAULT_SHARES_PER_TRADE,
            tax: Ratio::new_const(DEFAULT_GRID_TAX),
        }
    }
}

impl GridConfig {
    pub fn with_grid_step(mut self, grid_step: Ratio) -> Self {
        self.grid_step = grid_step;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.shares_per_trade == 0 {
            return Err(AnalysisError::InvalidConfig(
                "shares_per_trade must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Everything one grid run produced
#[derive(Debug, Clone, PartialEq)]
pub struct GridOutcome {
    /// Including the opening buy
    pub buys: usize,
    pub sells: usize,
    /// Sell levels reached with no lot to sell; the grid moved to the close
    pub reanchors: usize,
    /// Lots liquidated at the end of the window
    pub forced_lots: usize,
    /// One slot per bar in the window plus a trailing empty slot
    pub ledger: Vec<f64>,
    pub financing: Financing,
}

/// Run the grid over `bars[start..end]`.
///
/// The first bar opens one lot at its open. On every later bar a buy at the
/// lower level takes priority over a sell at the upper level. Lots still held
/// at the end are sold at the last bar's body high.
pub fn simulate_grid<T: Candle>(
    bars: &[T],
    start: usize,
    end: usize,
    config: &GridConfig,
) -> Result<GridOutcome> {
    config.validate()?;
    if start > end || end > bars.len() {
        return Err(AnalysisError::InvalidRange {
            start,
            end,
            len: bars.len(),
        });
    }
    if start == end {
        return Err(AnalysisError::InsufficientData { need: 1, got: 0 });
    }

    let shares = config.shares_per_trade as f64;
    let step = config.grid_step.get();
    let buy_cost = 1.0 + config.tax.get();
    let sell_keep = 1.0 - config.tax.get();

    let mut ledger = vec![0.0; end - start + 1];
    let mut grid_price = bars[start].open();
    let mut net_lots = 1usize;
    ledger[0] -= grid_price as f64 * shares * buy_cost;

    let mut outcome = GridOutcome {
        buys: 1,
        sells: 0,
        reanchors: 0,
        forced_lots: 0,
        ledger: Vec::new(),
        financing: Financing::default(),
    };

    for (offset, bar) in bars[start + 1..end].iter().enumerate() {
        let slot = offset + 1;
        let next_buy = (grid_price as f64 * (1.0 - step)) as i64;
        let next_sell = (grid_price as f64 * (1.0 + step)) as i64;

        if next_buy >= bar.entity_low() {
            grid_price = next_buy;
            ledger[slot] -= grid_price as f64 * shares * buy_cost;
            net_lots += 1;
            outcome.buys += 1;
        } else if next_sell <= bar.entity_high() {
            if net_lots > 0 {
                grid_price = next_sell;
                ledger[slot] += grid_price as f64 * shares * sell_keep;
                net_lots -= 1;
                outcome.sells += 1;
            } else {
                grid_price = bar.close();
                outcome.reanchors += 1;
            }
        }
    }

    if net_lots > 0 {
        let exit = bars[end - 1].entity_high() as f64;
        ledger[end - start - 1] += exit * shares * sell_keep * net_lots as f64;
        outcome.forced_lots = net_lots;
    }

    outcome.financing = Financing::from_ledger(&ledger);
    outcome.ledger = ledger;
    Ok(outcome)
}

/// Return rate (x100) of a grid run over `bars[start..end]`.
pub fn grid_trading_return<T: Candle>(
    bars: &[T],
    start: usize,
    end: usize,
    config: &GridConfig,
) -> Result<f64> {
    simulate_grid(bars, start, end, config).map(|o| o.financing.return_rate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bar::Bar;

    fn flat(price: i64, n: usize) -> Vec<Bar> {
        (0..n)
            .map(|_| Bar::new("20240102", price, price, price, price).unwrap())
            .collect()
    }

    #[test]
    fn test_flat_range_pays_only_tax() {
        let bars = flat(100, 3);
        let outcome = simulate_grid(&bars, 0, 3, &GridConfig::default()).unwrap();

        assert_eq!(outcome.buys, 1);
        assert_eq!(outcome.sells, 0);
        assert_eq!(outcome.forced_lots, 1);
        assert_eq!(outcome.ledger.len(), 4);

        let expected = -0.006 / 1.003 * 100.0;
        assert!((outcome.financing.return_rate - expected).abs() < 1e-9);
    }

    #[test]
    fn test_dip_then_recovery() {
        let bars = vec![
            Bar::new("20240102", 1000, 1000, 1000, 1000).unwrap(),
            // body low 985 reaches the 990 buy level
            Bar::new("20240103", 995, 996, 980, 985).unwrap(),
            // body high 1000 reaches the 999 sell level
            Bar::new("20240104", 990, 1001, 989, 1000).unwrap(),
        ];
        let outcome = simulate_grid(&bars, 0, 3, &GridConfig::default()).unwrap();

        assert_eq!(outcome.buys, 2);
        assert_eq!(outcome.sells, 1);
        assert_eq!(outcome.forced_lots, 1);
        assert!(outcome.ledger[1] < 0.0);
        assert!(outcome.ledger[2] > 0.0);
    }

    #[test]
    fn test_reanchor_without_lots() {
        let bars = vec![
            Bar::new("20240102", 1000, 1000, 1000, 1000).unwrap(),
            Bar::new("20240103", 1010, 1012, 1008, 1011).unwrap(),
            Bar::new("20240104", 1022, 1025, 1020, 1022).unwrap(),
        ];
        let outcome = simulate_grid(&bars, 0, 3, &GridConfig::default()).unwrap();

        // 1010 sells the opening lot, then 1020 finds nothing to sell
        assert_eq!(outcome.sells, 1);
        assert_eq!(outcome.reanchors, 1);
        assert_eq!(outcome.forced_lots, 0);
        assert!(outcome.financing.profit > 0.0);
    }

    #[test]
    fn test_sub_range_uses_window_only() {
        let mut bars = flat(500, 2);
        bars.extend(flat(100, 3));
        let whole = grid_trading_return(&bars, 2, 5, &GridConfig::default()).unwrap();
        let expected = -0.006 / 1.003 * 100.0;
        assert!((whole - expected).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_bad_ranges_and_config() {
        let bars = flat(100, 3);
        let config = GridConfig::default();
        assert!(matches!(
            simulate_grid(&bars, 2, 4, &config),
            Err(AnalysisError::InvalidRange { .. })
        ));
        assert!(matches!(
            simulate_grid(&bars, 1, 1, &config),
            Err(AnalysisError::InsufficientData { .. })
        ));

        let bad = GridConfig {
            shares_per_trade: 0,
            ..GridConfig::default()
        };
        assert!(simulate_grid(&bars, 0, 3, &bad).is_err());
    }

    #[test]
    fn test_config_serde_defaults() {
        let config: GridConfig = serde_json::from_str(r#"{"grid_step": 0.02}"#).unwrap();
        assert_eq!(config.grid_step.get(), 0.02);
        assert_eq!(config.shares_per_trade, DEFAULT_SHARES_PER_TRADE);
        assert!(serde_json::from_str::<GridConfig>(r#"{"tax": 1.5}"#).is_err());
    }
}
