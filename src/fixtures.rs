//! Synthetic bar series shared by unit tests.

use crate::models::bar::Bar;

pub const BAR_MS: i64 = 300_000;

pub fn bar_at(i: usize, open: f64, high: f64, low: f64, close: f64, volume: f64, buy_ratio: f64) -> Bar {
    let open_time = i as i64 * BAR_MS;
    Bar {
        open_time,
        close_time: open_time + BAR_MS - 1,
        open,
        high,
        low,
        close,
        volume,
        quote_volume: volume * close,
        trade_count: 100,
        buy_volume: volume * buy_ratio,
        buy_quote_volume: volume * buy_ratio * close,
    }
}

/// Tight sideways bar: bodies alternate between 100.0 and 100.2.
pub fn flat_bar(i: usize) -> Bar {
    let (open, close) = if i % 2 == 0 { (100.0, 100.2) } else { (100.2, 100.0) };
    bar_at(i, open, 100.35, 99.85, close, 100.0, 0.5)
}

/// Same bodies as `flat_bar` with wider wicks and volume ramping 120 -> 300
/// over bars 200..230.
pub fn accum_bar(i: usize) -> Bar {
    let (open, close) = if i % 2 == 0 { (100.0, 100.2) } else { (100.2, 100.0) };
    let k = i.saturating_sub(200) as f64;
    bar_at(i, open, 101.0, 99.3, close, 120.0 + k * 180.0 / 29.0, 0.6)
}

/// Strong bar closing about 1% above a 100.2 box top.
pub fn breakout_bar(i: usize) -> Bar {
    bar_at(i, 100.5, 101.3, 100.45, 101.25, 400.0, 0.65)
}

/// Flat 0..200, accumulation 200..230, breakout from 230 on.
pub fn scenario(n: usize) -> Vec<Bar> {
    (0..n)
        .map(|i| match i {
            0..=199 => flat_bar(i),
            200..=229 => accum_bar(i),
            _ => breakout_bar(i),
        })
        .collect()
}

pub fn flat_series(n: usize) -> Vec<Bar> {
    (0..n).map(flat_bar).collect()
}
