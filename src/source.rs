//! Collaborator contracts for market data
//!
//! The analysis engine never talks to the network. Hosts implement
//! [`BarSource`], [`RosterSource`] and [`UniverseSource`] over whatever
//! gateway they use; every call returns a complete sequence, or an empty one
//! on failure.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bar::{build_bars, Bar, RawBar};

// ============================================================
// REFERENCE DATA
// ============================================================

/// An instrument known to the gateway. `symbol` is the exchange prefix plus
/// the numeric code, e.g. `SH600000`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instrument {
    pub name: String,
    pub symbol: String,
}

impl Instrument {
    pub fn new(name: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
        }
    }
}

/// Bar period requested from the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Periodicity {
    Minute1,
    Minute5,
    Minute15,
    Minute30,
    Minute60,
    Minute120,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl Periodicity {
    pub fn as_str(self) -> &'static str {
        match self {
            Periodicity::Minute1 => "1m",
            Periodicity::Minute5 => "5m",
            Periodicity::Minute15 => "15m",
            Periodicity::Minute30 => "30m",
            Periodicity::Minute60 => "60m",
            Periodicity::Minute120 => "120m",
            Periodicity::Day => "day",
            Periodicity::Week => "week",
            Periodicity::Month => "month",
            Periodicity::Quarter => "quarter",
            Periodicity::Year => "year",
        }
    }
}

impl fmt::Display for Periodicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which list of instruments to enumerate
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniverseCategory {
    Equities,
    Etfs,
    Lofs,
    Indices,
    SectorIndices,
    Concepts,
    /// Members of the sector index with this symbol
    SectorConstituents(String),
}

// ============================================================
// INSTITUTIONAL ROSTER
// ============================================================

/// One trading desk on a roster entry. Totals are in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterBranch {
    pub code: String,
    pub name: String,
    pub buy_total: i64,
    pub sell_total: i64,
    pub net_buy_total: i64,
}

impl RosterBranch {
    /// At least one of the three totals is positive
    pub fn is_active(&self) -> bool {
        self.buy_total > 0 || self.sell_total > 0 || self.net_buy_total > 0
    }
}

/// An instrument's appearance on the institutional-activity roster for one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub instrument: Instrument,
    /// `YYYYMMDD`
    pub date: String,
    pub buy_total: i64,
    pub sell_total: i64,
    pub net_buy_total: i64,
    pub percent_change: f64,
    pub buy_branches: Vec<RosterBranch>,
    pub sell_branches: Vec<RosterBranch>,
}

impl RosterEntry {
    pub fn is_active(&self) -> bool {
        self.buy_total > 0 || self.sell_total > 0 || self.net_buy_total > 0
    }
}

/// Ingestion filter: drops entries, and branch rows, whose three totals are all <= 0.
pub fn retain_active(entries: Vec<RosterEntry>) -> Vec<RosterEntry> {
    entries
        .into_iter()
        .filter(RosterEntry::is_active)
        .map(|mut entry| {
            entry.buy_branches.retain(RosterBranch::is_active);
            entry.sell_branches.retain(RosterBranch::is_active);
            entry
        })
        .collect()
}

// ============================================================
// COLLABORATOR TRAITS
// ============================================================

/// Raw kline records for one instrument, newest first as the gateway sends
/// them. Empty on any transport or parse failure.
pub trait BarSource: Send + Sync {
    fn fetch_bars(&self, symbol: &str, periodicity: Periodicity, count: usize) -> Vec<RawBar>;
}

/// Roster entries for a `YYYYMMDD` date. Empty on failure.
pub trait RosterSource: Send + Sync {
    fn fetch_roster(&self, date: &str) -> Vec<RosterEntry>;
}

/// Instruments in a category. Empty on failure.
pub trait UniverseSource: Send + Sync {
    fn fetch_universe(&self, category: &UniverseCategory) -> Vec<Instrument>;
}

impl<S: BarSource + ?Sized> BarSource for &S {
    fn fetch_bars(&self, symbol: &str, periodicity: Periodicity, count: usize) -> Vec<RawBar> {
        (**self).fetch_bars(symbol, periodicity, count)
    }
}

impl<S: RosterSource + ?Sized> RosterSource for &S {
    fn fetch_roster(&self, date: &str) -> Vec<RosterEntry> {
        (**self).fetch_roster(date)
    }
}

impl<S: UniverseSource + ?Sized> UniverseSource for &S {
    fn fetch_universe(&self, category: &UniverseCategory) -> Vec<Instrument> {
        (**self).fetch_universe(category)
    }
}

/// Fetch and normalize in one step. Oldest bar first.
pub fn load_bars<S: BarSource + ?Sized>(
    source: &S,
    symbol: &str,
    periodicity: Periodicity,
    count: usize,
) -> Vec<Bar> {
    build_bars(&source.fetch_bars(symbol, periodicity, count))
}

// ============================================================
// IN-MEMORY SOURCE
// ============================================================

/// Fixture-backed implementation of all three collaborator traits.
///
/// Bars are stored oldest first and served newest first, trimmed to the
/// requested count. The periodicity is ignored.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    bars: HashMap<String, Vec<RawBar>>,
    rosters: HashMap<String, Vec<RosterEntry>>,
    universes: HashMap<UniverseCategory, Vec<Instrument>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records for `symbol`, in either order.
    pub fn with_bars(mut self, symbol: impl Into<String>, mut records: Vec<RawBar>) -> Self {
        records.sort_by_key(|r| r.time);
        self.bars.insert(symbol.into(), records);
        self
    }

    /// Roster for `date`, passed through the ingestion filter.
    pub fn with_roster(mut self, date: impl Into<String>, entries: Vec<RosterEntry>) -> Self {
        self.rosters.insert(date.into(), retain_active(entries));
        self
    }

    pub fn with_universe(mut self, category: UniverseCategory, instruments: Vec<Instrument>) -> Self {
        self.universes.insert(category, instruments);
        self
    }
}

impl BarSource for InMemorySource {
    fn fetch_bars(&self, symbol: &str, _periodicity: Periodicity, count: usize) -> Vec<RawBar> {
        self.bars
            .get(symbol)
            .map(|records| records.iter().rev().take(count).copied().collect())
            .unwrap_or_default()
    }
}

impl RosterSource for InMemorySource {
    fn fetch_roster(&self, date: &str) -> Vec<RosterEntry> {
        self.rosters.get(date).cloned().unwrap_or_default()
    }
}

impl UniverseSource for InMemorySource {
    fn fetch_universe(&self, category: &UniverseCategory) -> Vec<Instrument> {
        self.universes.get(category).cloned().unwrap_or_default()
    }
}
