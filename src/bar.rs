//! Kline bar model and derived-metrics builder
//!
//! Raw vendor records are normalized into [`Bar`]s ordered oldest first, with
//! body bounds, change, percent change and a 6-period smoothed RSI.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{AnalysisError, Candle, Result};

/// Vendor prices carry two extra decimal places relative to [`Bar`] prices.
pub const PRICE_DIVISOR: i64 = 100;
/// Smoothing window of the RSI pass.
pub const RSI_PERIOD: usize = 6;
/// Seed for the running averages, keeps the first ratio away from 0/0.
pub const RSI_SEED: f64 = 1e-6;

const DATE_FORMAT: &str = "%Y%m%d";

/// One kline record as delivered by the market-data gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBar {
    /// Calendar date as an 8-digit number, e.g. `20240523`
    pub time: u64,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    pub prev_close: i64,
    pub volume: u64,
    /// Traded value
    pub value: u64,
}

/// One normalized candlestick observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Seconds since the epoch at UTC midnight of `date`
    pub timestamp: i64,
    /// `YYYYMMDD`
    pub date: String,
    pub open: i64,
    pub high: i64,
    pub low: i64,
    pub close: i64,
    pub volume: u64,
    pub amount: u64,
    /// `close - open`
    pub change: i64,
    /// Percent change against the previous close, scaled by 100
    pub percent_change: f64,
    pub entity_high: i64,
    pub entity_low: i64,
    pub rsi6: Option<f64>,
}

impl Bar {
    /// Build a standalone bar. Percent change is measured against the bar's own
    /// open since no previous close is known.
    pub fn new(date: &str, open: i64, high: i64, low: i64, close: i64) -> Result<Self> {
        let timestamp = parse_date(date)
            .ok_or(AnalysisError::InvalidValue("date must be YYYYMMDD"))?;
        let percent_change = if open != 0 {
            (close - open) as f64 / open as f64 * 100.0
        } else {
            0.0
        };

        Ok(Self {
            timestamp,
            date: date.to_string(),
            open,
            high,
            low,
            close,
            volume: 0,
            amount: 0,
            change: close - open,
            percent_change,
            entity_high: open.max(close),
            entity_low: open.min(close),
            rsi6: None,
        })
    }

    pub fn with_percent_change(mut self, percent_change: f64) -> Self {
        self.percent_change = percent_change;
        self
    }

    pub fn with_amount(mut self, amount: u64) -> Self {
        self.amount = amount;
        self
    }

    pub fn with_volume(mut self, volume: u64) -> Self {
        self.volume = volume;
        self
    }

    /// The date as a number, e.g. `20240523`
    pub fn date_key(&self) -> u32 {
        self.date.parse().unwrap_or_default()
    }

    pub fn year(&self) -> i32 {
        (self.date_key() / 10_000) as i32
    }
}

impl Candle for Bar {
    #[inline]
    fn open(&self) -> i64 {
        self.open
    }

    #[inline]
    fn high(&self) -> i64 {
        self.high
    }

    #[inline]
    fn low(&self) -> i64 {
        self.low
    }

    #[inline]
    fn close(&self) -> i64 {
        self.close
    }

    #[inline]
    fn percent_change(&self) -> f64 {
        self.percent_change
    }

    #[inline]
    fn entity_high(&self) -> i64 {
        self.entity_high
    }

    #[inline]
    fn entity_low(&self) -> i64 {
        self.entity_low
    }
}

fn parse_date(date: &str) -> Option<i64> {
    if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let day = NaiveDate::parse_from_str(date, DATE_FORMAT).ok()?;
    Some(day.and_hms_opt(0, 0, 0)?.and_utc().timestamp())
}

/// Order of the stream, judged by its first two records with a valid date.
fn is_newest_first(records: &[RawBar]) -> bool {
    let mut dated = records
        .iter()
        .filter_map(|r| parse_date(&r.time.to_string()));
    matches!((dated.next(), dated.next()), (Some(first), Some(second)) if first > second)
}

/// Normalize a vendor stream into ascending bars.
///
/// Accepts records oldest-first or newest-first; a malformed date never
/// decides the order. The stream is cut at the
/// first structurally invalid record (zero price, malformed date,
/// non-positive previous close, body outside the high/low range, or a date
/// not after the previous bar); nothing after it is emitted.
pub fn build_bars(raw: &[RawBar]) -> Vec<Bar> {
    let mut records = raw.to_vec();
    if is_newest_first(&records) {
        records.reverse();
    }

    let mut bars: Vec<Bar> = Vec::with_capacity(records.len());
    for (index, record) in records.iter_mut().enumerate() {
        if index == 0 && record.prev_close == 0 {
            record.prev_close = record.close;
        }
        match normalize(record, bars.last()) {
            Some(bar) => bars.push(bar),
            None => break,
        }
    }

    let closes: Vec<i64> = bars.iter().map(|b| b.close).collect();
    for (bar, rsi) in bars.iter_mut().zip(smoothed_rsi(&closes, RSI_PERIOD)) {
        bar.rsi6 = Some(rsi);
    }

    bars
}

fn normalize(record: &RawBar, previous: Option<&Bar>) -> Option<Bar> {
    if record.open == 0 || record.close == 0 || record.high == 0 || record.low == 0 {
        return None;
    }
    if record.prev_close <= 0 {
        return None;
    }

    let date = record.time.to_string();
    let timestamp = parse_date(&date)?;
    if previous.is_some_and(|p| p.timestamp >= timestamp) {
        return None;
    }

    let open = record.open / PRICE_DIVISOR;
    let high = record.high / PRICE_DIVISOR;
    let low = record.low / PRICE_DIVISOR;
    let close = record.close / PRICE_DIVISOR;
    let prev_close = record.prev_close / PRICE_DIVISOR;
    if open <= 0 || high <= 0 || low <= 0 || close <= 0 || prev_close <= 0 {
        return None;
    }

    let entity_high = open.max(close);
    let entity_low = open.min(close);
    if low > entity_low || entity_high > high {
        return None;
    }

    Some(Bar {
        timestamp,
        date,
        open,
        high,
        low,
        close,
        volume: record.volume,
        amount: record.value / PRICE_DIVISOR as u64,
        change: close - open,
        percent_change: (close - prev_close) as f64 / prev_close as f64 * 100.0,
        entity_high,
        entity_low,
        rsi6: None,
    })
}

/// Wilder-style smoothed RSI over closes, one value per close.
///
/// Both running averages start at [`RSI_SEED`]; the first close has no
/// predecessor and contributes a zero move.
pub fn smoothed_rsi(closes: &[i64], period: usize) -> Vec<f64> {
    let n = period.max(1) as f64;
    let mut avg_gain = RSI_SEED;
    let mut avg_move = RSI_SEED;

    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let gap = if i > 0 { (close - closes[i - 1]) as f64 } else { 0.0 };
            avg_gain = ((n - 1.0) * avg_gain + gap.max(0.0)) / n;
            avg_move = ((n - 1.0) * avg_move + gap.abs()) / n;
            avg_gain / avg_move * 100.0
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(time: u64, open: i64, high: i64, low: i64, close: i64, prev_close: i64) -> RawBar {
        RawBar {
            time,
            open: open * PRICE_DIVISOR,
            high: high * PRICE_DIVISOR,
            low: low * PRICE_DIVISOR,
            close: close * PRICE_DIVISOR,
            prev_close: prev_close * PRICE_DIVISOR,
            volume: 1_000,
            value: 500_000,
        }
    }

    #[test]
    fn test_normalizes_prices_and_derives_fields() {
        let bars = build_bars(&[
            raw(20240520, 1000, 1050, 990, 1020, 1000),
            raw(20240521, 1020, 1030, 950, 960, 1020),
        ]);

        assert_eq!(bars.len(), 2);
        let second = &bars[1];
        assert_eq!(second.date, "20240521");
        assert_eq!(second.open, 1020);
        assert_eq!(second.change, -60);
        assert_eq!(second.entity_high, 1020);
        assert_eq!(second.entity_low, 960);
        assert_eq!(second.amount, 5_000);
        assert!((second.percent_change - (-60.0 / 1020.0 * 100.0)).abs() < 1e-9);
        assert!(bars[0].timestamp < second.timestamp);
    }

    #[test]
    fn test_descending_input_is_reversed() {
        let bars = build_bars(&[
            raw(20240522, 1030, 1040, 1020, 1035, 1020),
            raw(20240521, 1010, 1025, 1005, 1020, 1010),
            raw(20240520, 1000, 1015, 995, 1010, 1000),
        ]);

        let dates: Vec<&str> = bars.iter().map(|b| b.date.as_str()).collect();
        assert_eq!(dates, ["20240520", "20240521", "20240522"]);
    }

    #[test]
    fn test_malformed_newest_record_only_drops_itself() {
        let bars = build_bars(&[
            raw(0, 1030, 1040, 1020, 1035, 1020),
            raw(20240522, 1010, 1025, 1005, 1020, 1010),
            raw(20240521, 1000, 1015, 995, 1010, 1000),
        ]);

        let dates: Vec<&str> = bars.iter().map(|b| b.date.as_str()).collect();
        assert_eq!(dates, ["20240521", "20240522"]);
    }

    #[test]
    fn test_first_prev_close_filled_from_close() {
        let bars = build_bars(&[raw(20240520, 1000, 1050, 990, 1020, 0)]);
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].percent_change, 0.0);
    }

    #[test]
    fn test_truncates_at_first_invalid_record() {
        let mut bad = raw(20240521, 1020, 1030, 950, 960, 1020);
        bad.low = 0;
        let bars = build_bars(&[
            raw(20240520, 1000, 1050, 990, 1020, 1000),
            bad,
            raw(20240522, 960, 980, 950, 970, 960),
        ]);
        assert_eq!(bars.len(), 1);
    }

    #[test]
    fn test_truncates_on_malformed_date() {
        let bars = build_bars(&[
            raw(20240520, 1000, 1050, 990, 1020, 1000),
            raw(2024052, 1020, 1030, 950, 960, 1020),
        ]);
        assert_eq!(bars.len(), 1);

        let bars = build_bars(&[raw(20241340, 1000, 1050, 990, 1020, 1000)]);
        assert!(bars.is_empty());
    }

    #[test]
    fn test_truncates_on_non_positive_prev_close() {
        let mut bad = raw(20240521, 1020, 1030, 950, 960, 1020);
        bad.prev_close = -5;
        let bars = build_bars(&[raw(20240520, 1000, 1050, 990, 1020, 1000), bad]);
        assert_eq!(bars.len(), 1);
    }

    #[test]
    fn test_truncates_on_repeated_date() {
        let bars = build_bars(&[
            raw(20240520, 1000, 1050, 990, 1020, 1000),
            raw(20240521, 1020, 1030, 950, 960, 1020),
            raw(20240521, 960, 980, 950, 970, 960),
        ]);
        assert_eq!(bars.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        assert!(build_bars(&[]).is_empty());
    }

    #[test]
    fn test_rsi_first_value_reflects_seed() {
        let rsi = smoothed_rsi(&[100, 110, 105], RSI_PERIOD);
        assert!((rsi[0] - 100.0).abs() < 1e-9);
        // gain 10 then a loss of 5
        assert!(rsi[1] > 99.0);
        assert!(rsi[2] < rsi[1]);
    }

    #[test]
    fn test_rsi_falls_toward_zero_on_losses() {
        let closes: Vec<i64> = (0..30).map(|i| 1000 - i * 10).collect();
        let rsi = smoothed_rsi(&closes, RSI_PERIOD);
        assert!(rsi[29] < 1.0);
        assert!(rsi.iter().all(|v| (0.0..=100.0).contains(v)));
    }

    #[test]
    fn test_builder_sets_rsi_on_every_bar() {
        let bars = build_bars(&[
            raw(20240520, 1000, 1050, 990, 1020, 1000),
            raw(20240521, 1020, 1030, 950, 960, 1020),
        ]);
        assert!(bars.iter().all(|b| b.rsi6.is_some()));
    }

    #[test]
    fn test_bar_new_and_accessors() {
        let bar = Bar::new("20230105", 100, 110, 95, 105).unwrap();
        assert_eq!(bar.date_key(), 20230105);
        assert_eq!(bar.year(), 2023);
        assert!((bar.percent_change - 5.0).abs() < 1e-12);
        assert!(Bar::new("2023-01-05", 100, 110, 95, 105).is_err());
    }
}
