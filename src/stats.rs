//! Period statistics over a contiguous bar range `[start, end)`
//!
//! Every function is pure apart from [`roster_hits`], which reads the roster
//! collaborator. Ranges that are reversed or reach past the sequence are
//! rejected with [`AnalysisError::InvalidRange`], and a `target` outside the
//! sequence with [`AnalysisError::IndexOutOfBounds`].

use crate::bar::Bar;
use crate::source::RosterSource;
use crate::{AnalysisError, Candle, Result};

/// Percent-change threshold of a 10% daily limit, leaving room for rounding
pub const LIMIT_UP_PERCENT: f64 = 9.0;

fn check_range(len: usize, start: usize, end: usize) -> Result<()> {
    if start > end || end > len {
        return Err(AnalysisError::InvalidRange { start, end, len });
    }
    Ok(())
}

fn check_non_empty(len: usize, start: usize, end: usize) -> Result<()> {
    check_range(len, start, end)?;
    if start == end {
        return Err(AnalysisError::InsufficientData { need: 1, got: 0 });
    }
    Ok(())
}

fn check_target(len: usize, target: usize) -> Result<()> {
    if target >= len {
        return Err(AnalysisError::IndexOutOfBounds { index: target, len });
    }
    Ok(())
}

/// Share of closes in the range strictly below the target's close, x100.
///
/// When the target lies inside the range its own slot is left out of the
/// denominator, so the range maximum ranks 100 and the minimum ranks 0.
/// Equal closes never count as below: a target tied with another copy of
/// the maximum ranks under 100, e.g. closes `[10, 50, 50]` rank the last
/// bar at 50.
pub fn percentile_rank<T: Candle>(bars: &[T], start: usize, end: usize, target: usize) -> Result<f64> {
    check_non_empty(bars.len(), start, end)?;
    check_target(bars.len(), target)?;

    let price = bars[target].close();
    let mut closes: Vec<i64> = bars[start..end].iter().map(Candle::close).collect();
    closes.sort_unstable();
    let below = closes.partition_point(|&c| c < price);

    let slots = if (start..end).contains(&target) {
        closes.len() - 1
    } else {
        closes.len()
    };
    if slots == 0 {
        return Ok(0.0);
    }
    Ok(below as f64 / slots as f64 * 100.0)
}

/// How far the target's close would have to fall to reach the range's lowest
/// close, in percent. A zero target close yields 0.
pub fn distance_to_low<T: Candle>(bars: &[T], start: usize, end: usize, target: usize) -> Result<f64> {
    check_non_empty(bars.len(), start, end)?;
    check_target(bars.len(), target)?;

    let price = bars[target].close();
    if price == 0 {
        return Ok(0.0);
    }
    let lowest = bars[start..end]
        .iter()
        .map(Candle::close)
        .min()
        .unwrap_or(price);
    Ok((1.0 - lowest as f64 / price as f64) * 100.0)
}

/// Sample standard deviation of percent change (n - 1 denominator).
pub fn volatility<T: Candle>(bars: &[T], start: usize, end: usize) -> Result<f64> {
    check_range(bars.len(), start, end)?;
    let n = end - start;
    if n < 2 {
        return Err(AnalysisError::InsufficientData { need: 2, got: n });
    }

    let window = &bars[start..end];
    let mean = window.iter().map(Candle::percent_change).sum::<f64>() / n as f64;
    let squares: f64 = window
        .iter()
        .map(|b| (b.percent_change() - mean).powi(2))
        .sum();
    Ok((squares / (n - 1) as f64).sqrt())
}

/// Mean traded value over the range.
pub fn average_amount(bars: &[Bar], start: usize, end: usize) -> Result<f64> {
    check_non_empty(bars.len(), start, end)?;
    let total: f64 = bars[start..end].iter().map(|b| b.amount as f64).sum();
    Ok(total / (end - start) as f64)
}

/// Bars whose percent change reaches `threshold`. An empty range counts 0.
pub fn limit_up_count<T: Candle>(bars: &[T], start: usize, end: usize, threshold: f64) -> Result<usize> {
    check_range(bars.len(), start, end)?;
    Ok(bars[start..end]
        .iter()
        .filter(|b| b.percent_change() >= threshold)
        .count())
}

/// Dates in the range on which `symbol` sits on the roster with a positive
/// net buy. Each date counts at most once.
pub fn roster_hits<R: RosterSource + ?Sized>(
    roster: &R,
    symbol: &str,
    bars: &[Bar],
    start: usize,
    end: usize,
) -> Result<usize> {
    check_range(bars.len(), start, end)?;
    Ok(bars[start..end]
        .iter()
        .filter(|bar| {
            roster
                .fetch_roster(&bar.date)
                .iter()
                .any(|e| e.instrument.symbol == symbol && e.net_buy_total > 0)
        })
        .count())
}
