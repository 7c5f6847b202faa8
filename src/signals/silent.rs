use crate::config::SilentParams;
use crate::models::bar::Bar;
use crate::models::signal::{PriceBox, Rejection, SilentSegment};
use crate::signals::features::{closes, linreg_slope, max, percentile, range_ratios};

/// Volatility figures of a window that passed the quiet check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuietStats {
    pub p90: f64,
    pub max: f64,
    pub slope: f64,
}

/// Quiet = p90 and max range ratio under the ceilings, and the least-squares
/// slope of the trailing closes (price per bar) not below the slope floor.
pub fn is_quiet_window(bars: &[Bar], params: &SilentParams) -> Result<QuietStats, Rejection> {
    if bars.is_empty() {
        return Err(Rejection::InsufficientData { need: 1, have: 0 });
    }
    let ranges = range_ratios(bars);
    let p90 = percentile(&ranges, 0.9);
    let max = max(&ranges);
    if p90 > params.quiet_p90 || max > params.quiet_max {
        return Err(Rejection::NotQuiet { p90, max });
    }

    let slope = tail_slope(bars, params.slope_tail);
    if slope < params.forbid_down_slope {
        return Err(Rejection::DownContext { slope });
    }
    Ok(QuietStats { p90, max, slope })
}

fn tail_slope(bars: &[Bar], tail: usize) -> f64 {
    let from = bars.len().saturating_sub(tail.max(1));
    linreg_slope(&closes(&bars[from..]))
}

/// Finds the best quiet run in `window`.
///
/// A `scan_win` sub-window slides by `step`; every position covered by a quiet
/// sub-window is marked, marks coalesce into maximal runs, and runs shorter
/// than `min_silent` are dropped. Survivors are ranked by recency first, then
/// length, then quietness.
pub fn find_silent_segment(window: &[Bar], params: &SilentParams) -> Result<SilentSegment, Rejection> {
    let n = window.len();
    let need = params.min_silent.max(params.scan_win);
    if n < need {
        return Err(Rejection::InsufficientData { need, have: n });
    }

    let step = params.step.max(1);
    let mut marked = vec![false; n];
    let mut s = 0;
    while s + params.scan_win <= n {
        let sub = &window[s..s + params.scan_win];
        if is_quiet_window(sub, params).is_ok() {
            marked[s..s + params.scan_win].fill(true);
        }
        s += step;
    }

    let mut best: Option<SilentSegment> = None;
    for (start, end) in runs(&marked) {
        let len = end - start;
        if len < params.min_silent {
            continue;
        }
        let seg = &window[start..end];
        let ranges = range_ratios(seg);
        let p90 = percentile(&ranges, 0.9);
        let max = max(&ranges);
        let score = end as f64 * 3.0 + len as f64 * 2.0 - p90 * 5000.0 - max * 2000.0;
        let candidate = SilentSegment {
            start,
            end,
            len,
            p90,
            max,
            slope: tail_slope(seg, params.slope_tail),
            score,
        };
        if best.map_or(true, |b| candidate.score > b.score) {
            best = Some(candidate);
        }
    }

    best.ok_or(Rejection::NoSilentSegment)
}

/// Maximal `[start, end)` runs of `true`.
fn runs(marked: &[bool]) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, &m) in marked.iter().enumerate() {
        match (m, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                out.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push((s, marked.len()));
    }
    out
}

/// Box from body extremes: p95 of body highs, p5 of body lows. Percentiles
/// keep a single wick or spike from stretching it.
pub fn price_box(bars: &[Bar]) -> PriceBox {
    let highs: Vec<f64> = bars.iter().map(Bar::body_high).collect();
    let lows: Vec<f64> = bars.iter().map(Bar::body_low).collect();
    PriceBox {
        top: percentile(&highs, 0.95),
        bottom: percentile(&lows, 0.05),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{bar_at, flat_series, scenario};
    use crate::signals::features::median;

    #[test]
    fn test_short_window_is_insufficient() {
        let params = SilentParams::default();
        let err = find_silent_segment(&flat_series(40), &params).unwrap_err();
        assert_eq!(err.code(), "insufficient_data");
    }

    #[test]
    fn test_flat_series_is_one_silent_run() {
        let bars = flat_series(120);
        let seg = find_silent_segment(&bars, &SilentParams::default()).unwrap();
        assert_eq!((seg.start, seg.end, seg.len), (0, 120, 120));
        assert!(seg.p90 < 0.006);
    }

    #[test]
    fn test_silent_segment_stops_before_noisy_bars() {
        let bars = scenario(231);
        let seg = find_silent_segment(&bars, &SilentParams::default()).unwrap();
        assert_eq!(seg.start, 0);
        assert!(seg.end >= 200 && seg.end <= 204, "end = {}", seg.end);
    }

    #[test]
    fn test_search_is_idempotent() {
        let bars = scenario(260);
        let params = SilentParams::default();
        let a = find_silent_segment(&bars, &params).unwrap();
        let b = find_silent_segment(&bars, &params).unwrap();
        assert_eq!((a.start, a.end), (b.start, b.end));
    }

    #[test]
    fn test_downtrend_is_not_quiet() {
        // 0.1% lower every bar with tiny ranges
        let bars: Vec<Bar> = (0..60)
            .map(|i| {
                let c = 100.0 * (1.0 - 0.001 * i as f64);
                bar_at(i, c * 1.0005, c * 1.001, c * 0.999, c, 100.0, 0.5)
            })
            .collect();
        let params = SilentParams::default();
        assert_eq!(is_quiet_window(&bars, &params).unwrap_err().code(), "down_context");
        assert_eq!(find_silent_segment(&bars, &params).unwrap_err().code(), "no_silent_segment");
    }

    #[test]
    fn test_slope_floor_is_in_price_units() {
        let params = SilentParams::default();
        // 0.5 lower per bar on a 60k coin
        let heavy: Vec<Bar> = (0..60)
            .map(|i| {
                let c = 60_000.0 - 0.5 * i as f64;
                bar_at(i, c + 0.2, c + 3.0, c - 3.0, c, 100.0, 0.5)
            })
            .collect();
        assert_eq!(is_quiet_window(&heavy, &params).unwrap_err().code(), "down_context");

        // 0.1% lower per bar on a 0.01 coin is only -1e-5 per bar
        let light: Vec<Bar> = (0..60)
            .map(|i| {
                let c = 0.01 * (1.0 - 0.001 * i as f64);
                bar_at(i, c * 1.0005, c * 1.001, c * 0.999, c, 100.0, 0.5)
            })
            .collect();
        let stats = is_quiet_window(&light, &params).unwrap();
        assert!(stats.slope < 0.0 && stats.slope > params.forbid_down_slope);
    }

    #[test]
    fn test_earlier_run_kept_on_equal_score() {
        let params = SilentParams {
            min_silent: 5,
            scan_win: 5,
            step: 1,
            ..SilentParams::default()
        };
        // one wide bar at 14 splits [0, 14) and [15, 20); both score 70
        let bars: Vec<Bar> = (0..20)
            .map(|i| {
                if i == 14 {
                    bar_at(i, 100.0, 110.0, 90.0, 100.0, 100.0, 0.5)
                } else {
                    bar_at(i, 100.0, 100.1, 99.9, 100.0, 100.0, 0.5)
                }
            })
            .collect();
        let seg = find_silent_segment(&bars, &params).unwrap();
        assert_eq!((seg.start, seg.end), (0, 14));
    }

    #[test]
    fn test_wide_ranges_are_not_quiet() {
        let bars: Vec<Bar> = (0..60).map(|i| bar_at(i, 100.0, 103.0, 98.0, 100.5, 100.0, 0.5)).collect();
        let err = is_quiet_window(&bars, &SilentParams::default()).unwrap_err();
        assert_eq!(err.code(), "not_quiet");
    }

    #[test]
    fn test_box_brackets_median_close() {
        let bars = scenario(200);
        let seg = find_silent_segment(&bars, &SilentParams::default()).unwrap();
        let seg_bars = seg.slice(&bars);
        let b = price_box(seg_bars);
        let med = median(&closes(seg_bars));
        assert!(b.bottom <= med && med <= b.top);
        assert!((b.top - 100.2).abs() < 1e-9);
        assert!((b.bottom - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_box_ignores_single_spike() {
        let mut bars = flat_series(100);
        bars[50] = bar_at(50, 100.0, 106.0, 99.9, 105.0, 100.0, 0.5);
        let b = price_box(&bars);
        assert!(b.top < 101.0);
    }

    #[test]
    fn test_runs() {
        assert_eq!(runs(&[true, true, false, true]), vec![(0, 2), (3, 4)]);
        assert!(runs(&[false, false]).is_empty());
    }
}
