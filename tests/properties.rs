//! Property tests over randomly generated bars and ledgers.

use klinescope::prelude::*;
use proptest::prelude::*;

/// Well-formed bars: body inside the high/low range, all prices positive.
fn bars_strategy(max_len: usize) -> impl Strategy<Value = Vec<Bar>> {
    prop::collection::vec((100i64..2000, 100i64..2000, 0i64..50, 0i64..50), 0..max_len).prop_map(
        |shapes| {
            shapes
                .into_iter()
                .map(|(open, close, up, down)| {
                    let high = open.max(close) + up;
                    let low = open.min(close) - down;
                    Bar::new("20240102", open, high, low, close).unwrap()
                })
                .collect()
        },
    )
}

/// Arbitrary vendor records, including malformed ones.
fn raw_strategy() -> impl Strategy<Value = Vec<RawBar>> {
    prop::collection::vec(
        (
            20231225u64..20240210,
            0i64..300_000,
            0i64..300_000,
            0i64..300_000,
            0i64..300_000,
            0i64..300_000,
        ),
        0..40,
    )
    .prop_map(|records| {
        records
            .into_iter()
            .map(|(time, open, high, low, close, prev_close)| RawBar {
                time,
                open,
                high,
                low,
                close,
                prev_close,
                volume: 1,
                value: 100,
            })
            .collect()
    })
}

fn brute_force_min(ledger: &[f64]) -> Option<f64> {
    let mut lowest: Option<f64> = None;
    for i in 0..ledger.len() {
        let mut sum = 0.0;
        for &delta in &ledger[i..] {
            sum += delta;
            lowest = Some(lowest.map_or(sum, |l: f64| l.min(sum)));
        }
    }
    lowest
}

proptest! {
    #[test]
    fn built_bars_are_ascending_and_consistent(raw in raw_strategy()) {
        let bars = build_bars(&raw);
        prop_assert!(bars.len() <= raw.len());

        for pair in bars.windows(2) {
            prop_assert!(pair[0].timestamp < pair[1].timestamp);
        }
        for bar in &bars {
            prop_assert!(bar.low <= bar.entity_low);
            prop_assert!(bar.entity_high <= bar.high);
            prop_assert!(bar.open > 0 && bar.close > 0);
            prop_assert_eq!(bar.change, bar.close - bar.open);
            let rsi = bar.rsi6.unwrap();
            prop_assert!((0.0..=100.0).contains(&rsi));
        }
    }

    #[test]
    fn rsi_stays_in_bounds(closes in prop::collection::vec(1i64..100_000, 0..200)) {
        let rsi = smoothed_rsi(&closes, 6);
        prop_assert_eq!(rsi.len(), closes.len());
        prop_assert!(rsi.iter().all(|v| (0.0..=100.0).contains(v)));
    }

    #[test]
    fn min_subarray_sum_matches_brute_force(values in prop::collection::vec(-1000i32..1000, 0..60)) {
        let ledger: Vec<f64> = values.into_iter().map(f64::from).collect();
        prop_assert_eq!(min_subarray_sum(&ledger), brute_force_min(&ledger));
    }

    #[test]
    fn dated_ledger_never_needs_negative_capital(
        postings in prop::collection::vec((20240101u32..20240131, -1000i32..1000), 0..40)
    ) {
        let mut ledger = DatedLedger::new();
        for (date, delta) in postings {
            ledger.post(date, f64::from(delta));
        }
        let financing = ledger.financing();
        prop_assert!(financing.investment >= 0.0);
        prop_assert!(financing.profit >= -financing.investment);
    }

    #[test]
    fn matches_follow_a_downtrend(bars in bars_strategy(60)) {
        let engine = EngineBuilder::new().with_all_defaults().build().unwrap();
        for m in engine.scan(&bars).unwrap() {
            prop_assert!(m.start_index <= m.end_index);
            prop_assert!(m.end_index < bars.len());
            prop_assert!(is_downtrend(&bars, m.end_index, TREND_WINDOW));
        }
    }

    #[test]
    fn period_statistics_stay_in_range(bars in bars_strategy(80), seed in any::<prop::sample::Index>()) {
        prop_assume!(!bars.is_empty());
        let target = seed.index(bars.len());

        let rank = percentile_rank(&bars, 0, bars.len(), target).unwrap();
        prop_assert!((0.0..=100.0).contains(&rank));

        let distance = distance_to_low(&bars, 0, bars.len(), target).unwrap();
        prop_assert!((0.0..100.0).contains(&distance));
    }

    #[test]
    fn grid_never_loses_more_than_its_capital(bars in bars_strategy(80)) {
        prop_assume!(!bars.is_empty());
        let outcome = simulate_grid(&bars, 0, bars.len(), &GridConfig::default()).unwrap();

        prop_assert_eq!(outcome.ledger.len(), bars.len() + 1);
        prop_assert!(outcome.financing.investment > 0.0);
        prop_assert!(outcome.financing.return_rate >= -100.0);
        prop_assert_eq!(outcome.buys, outcome.sells + outcome.forced_lots);
    }
}
