//! Stateless per-bar and per-window statistics.
//!
//! Every function returns a neutral value (usually 0) for empty input or a
//! zero denominator. Nothing here panics on malformed bars.

use crate::models::bar::Bar;
use statrs::statistics::{Data, Median, OrderStatistics, Statistics};

/// (high - low) / close.
pub fn range_ratio(bar: &Bar) -> f64 {
    if bar.close == 0.0 {
        return 0.0;
    }
    bar.range() / bar.close
}

/// Upper wick as a share of the full range.
pub fn upper_wick_ratio(bar: &Bar) -> f64 {
    let range = bar.range();
    if range <= 0.0 {
        return 0.0;
    }
    (bar.high - bar.body_high()).max(0.0) / range
}

/// Body as a share of the full range.
pub fn body_ratio(bar: &Bar) -> f64 {
    let range = bar.range();
    if range <= 0.0 {
        return 0.0;
    }
    bar.body() / range
}

/// Least-squares slope of `ys` against their index.
pub fn linreg_slope(ys: &[f64]) -> f64 {
    let n = ys.len();
    if n < 3 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(ys);
    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in ys.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den == 0.0 {
        return 0.0;
    }
    num / den
}

/// Sum of taker-buy volume over sum of volume.
pub fn weighted_buy_ratio(bars: &[Bar]) -> f64 {
    let (buy, total) = bars
        .iter()
        .fold((0.0, 0.0), |(b, v), bar| (b + bar.buy_volume, v + bar.volume));
    if total <= 0.0 {
        return 0.0;
    }
    buy / total
}

/// Quantile with `q` in [0, 1], linear between the two closest ranks
/// (position `(n - 1) * q`).
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut data = Data::new(values.to_vec());
    let h = (values.len() - 1) as f64 * q.clamp(0.0, 1.0);
    let lo = data.order_statistic(h.floor() as usize + 1);
    let hi = data.order_statistic(h.ceil() as usize + 1);
    lo + (h - h.floor()) * (hi - lo)
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    Data::new(values.to_vec()).median()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.mean()
}

pub fn max(values: &[f64]) -> f64 {
    values.iter().copied().fold(0.0, f64::max)
}

pub fn range_ratios(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(range_ratio).collect()
}

pub fn closes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.close).collect()
}

pub fn volumes(bars: &[Bar]) -> Vec<f64> {
    bars.iter().map(|b| b.volume).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            open_time: 0,
            close_time: 59_999,
            open,
            high,
            low,
            close,
            volume: 100.0,
            quote_volume: 100.0 * close,
            trade_count: 10,
            buy_volume: 55.0,
            buy_quote_volume: 55.0 * close,
        }
    }

    #[test]
    fn test_bar_ratios() {
        let b = bar(100.0, 102.0, 99.0, 101.0);
        assert!((range_ratio(&b) - 3.0 / 101.0).abs() < 1e-12);
        assert!((upper_wick_ratio(&b) - 1.0 / 3.0).abs() < 1e-12);
        assert!((body_ratio(&b) - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_range_and_zero_close_are_neutral() {
        let flat = bar(100.0, 100.0, 100.0, 100.0);
        assert_eq!(upper_wick_ratio(&flat), 0.0);
        assert_eq!(body_ratio(&flat), 0.0);
        assert_eq!(range_ratio(&bar(0.0, 0.0, 0.0, 0.0)), 0.0);
    }

    #[test]
    fn test_linreg_slope() {
        let ys: Vec<f64> = (0..10).map(|i| 2.0 * i as f64 + 5.0).collect();
        assert!((linreg_slope(&ys) - 2.0).abs() < 1e-9);
        assert_eq!(linreg_slope(&[1.0, 2.0]), 0.0);
        assert_eq!(linreg_slope(&[3.0, 3.0, 3.0]), 0.0);
    }

    #[test]
    fn test_percentile_interpolates_between_ranks() {
        let to_30: Vec<f64> = (1..=30).map(f64::from).collect();
        assert!((percentile(&to_30, 0.9) - 27.1).abs() < 1e-9);
        let to_20: Vec<f64> = (1..=20).map(f64::from).collect();
        assert!((percentile(&to_20, 0.95) - 19.05).abs() < 1e-9);
        assert!((percentile(&to_20, 0.05) - 1.95).abs() < 1e-9);
        // input order does not matter
        let mut rev = to_20.clone();
        rev.reverse();
        assert_eq!(percentile(&rev, 0.95), percentile(&to_20, 0.95));
    }

    #[test]
    fn test_weighted_buy_ratio() {
        let mut a = bar(1.0, 1.0, 1.0, 1.0);
        let mut b = a;
        a.volume = 100.0;
        a.buy_volume = 80.0;
        b.volume = 300.0;
        b.buy_volume = 120.0;
        assert!((weighted_buy_ratio(&[a, b]) - 0.5).abs() < 1e-12);
        assert_eq!(weighted_buy_ratio(&[]), 0.0);
    }

    #[test]
    fn test_order_statistics() {
        let v = [5.0, 1.0, 3.0, 2.0, 4.0];
        assert_eq!(median(&v), 3.0);
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 1.0), 5.0);
        assert!((percentile(&v, 0.9) - 4.6).abs() < 1e-12);
        assert_eq!(percentile(&[7.0], 0.9), 7.0);
        assert_eq!(median(&[]), 0.0);
        assert_eq!(percentile(&[], 0.5), 0.0);
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(max(&[0.2, 0.7, 0.1]), 0.7);
    }
}
