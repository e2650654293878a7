//! Capital requirement and return on capital from a daily cash ledger
//!
//! The capital a strategy needs is the deepest cumulative outflow any run of
//! consecutive ledger days reaches, i.e. the negated minimum subarray sum.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Investment at or below this is treated as no investment at all
pub const MIN_INVESTMENT: f64 = 1e-3;

/// Minimum sum over contiguous runs of `ledger`. None for an empty ledger.
///
/// A running sum that is `<= 0` keeps extending; a positive one restarts at
/// the next entry.
pub fn min_subarray_sum(ledger: &[f64]) -> Option<f64> {
    let (&first, rest) = ledger.split_first()?;
    let mut running = first;
    let mut lowest = first;

    for &delta in rest {
        running = if running <= 0.0 { running + delta } else { delta };
        lowest = lowest.min(running);
    }

    Some(lowest)
}

/// Capital requirement, profit and return rate of one ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Financing {
    /// Negated minimum subarray sum
    pub investment: f64,
    /// Plain sum of the ledger
    pub profit: f64,
    /// `profit / investment * 100`, or 0 when investment <= [`MIN_INVESTMENT`]
    pub return_rate: f64,
}

impl Financing {
    pub fn from_ledger(ledger: &[f64]) -> Self {
        let investment = min_subarray_sum(ledger).map_or(0.0, |m| -m);
        let profit: f64 = ledger.iter().sum();
        Self {
            investment,
            profit,
            return_rate: return_rate(profit, investment),
        }
    }
}

pub fn return_rate(profit: f64, investment: f64) -> f64 {
    if investment > MIN_INVESTMENT {
        profit / investment * 100.0
    } else {
        0.0
    }
}

/// Cash ledger keyed by `YYYYMMDD` date.
///
/// Only dates that saw a posting are stored. Financing prepends one empty
/// day, which makes the sparse ledger finance exactly like a dense calendar
/// of mostly-zero days.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatedLedger {
    entries: BTreeMap<u32, f64>,
}

impl DatedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to the running total of `date`.
    pub fn post(&mut self, date: u32, delta: f64) {
        *self.entries.entry(date).or_insert(0.0) += delta;
    }

    pub fn merge(&mut self, other: &DatedLedger) {
        for (&date, &delta) in &other.entries {
            self.post(date, delta);
        }
    }

    /// Deltas in date order
    pub fn deltas(&self) -> Vec<f64> {
        self.entries.values().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn financing(&self) -> Financing {
        let mut dense = Vec::with_capacity(self.entries.len() + 1);
        dense.push(0.0);
        dense.extend(self.entries.values().copied());
        Financing::from_ledger(&dense)
    }
}
