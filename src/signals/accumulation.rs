use crate::config::{AccumParams, SilentParams};
use crate::models::bar::Bar;
use crate::models::signal::{AccumulationPhase, AccumulationSignal, PriceBox, Rejection};
use crate::signals::features::{closes, max, mean, median, percentile, range_ratios, volumes, weighted_buy_ratio};
use crate::signals::silent::{find_silent_segment, price_box};

/// Checks a segment that follows a silent run for quiet accumulation:
/// sideways price inside the box with volume and buying building up.
///
/// Every check is a necessary condition; the first failure is returned.
pub fn validate_segment(
    seg: &[Bar],
    price_box: &PriceBox,
    base_vol: f64,
    params: &AccumParams,
) -> Result<AccumulationSignal, Rejection> {
    let len = seg.len();
    if len < params.min_len {
        return Err(Rejection::TooShort { len, min: params.min_len });
    }

    let ranges = range_ratios(seg);
    let p90 = percentile(&ranges, 0.9);
    let max_range = max(&ranges);
    if p90 > params.sideways_p90 || max_range > params.sideways_max {
        return Err(Rejection::NotSideways { p90, max: max_range });
    }

    if base_vol <= 0.0 {
        return Err(Rejection::NoBaseVolume);
    }
    let vols = volumes(seg);
    let med_vol_ratio = median(&vols) / base_vol;
    if med_vol_ratio < params.vol_floor {
        return Err(Rejection::LowVolume { ratio: med_vol_ratio, need: params.vol_floor });
    }

    // tail quarter vs the rest
    let q = (len / 4).max(5).min(len - 1);
    let head_med = median(&vols[..len - q]);
    let tail = &vols[len - q..];
    let tail_med = median(tail);
    let tail_head_ratio = if head_med > 0.0 { tail_med / head_med } else { 0.0 };
    if tail_head_ratio < params.vol_ramp {
        return Err(Rejection::NoRamp { ratio: tail_head_ratio, need: params.vol_ramp });
    }
    let tail_mean = mean(tail);
    if tail_med < tail_mean * params.spike_ratio {
        return Err(Rejection::SpikyTail { median: tail_med, mean: tail_mean });
    }

    let buy_ratio = weighted_buy_ratio(seg);
    if buy_ratio < params.buy_ratio_min {
        return Err(Rejection::WeakBuying { ratio: buy_ratio, min: params.buy_ratio_min });
    }

    let upper = price_box.top * (1.0 + params.tiny_eps);
    if let Some(b) = seg.iter().find(|b| b.close > upper) {
        return Err(Rejection::AboveBox { close: b.close, limit: upper });
    }
    let lower = price_box.bottom * (1.0 - params.floor_eps);
    if let Some(b) = seg.iter().find(|b| b.close < lower) {
        return Err(Rejection::BelowBox { close: b.close, limit: lower });
    }

    let cs = closes(seg);
    let mid = mean(&cs);
    if mid > 0.0 {
        let dev = (cs[len - 1] - mid).abs() / mid;
        if dev > params.mid_dev {
            return Err(Rejection::Drift { dev, max: params.mid_dev });
        }
    }

    Ok(AccumulationSignal { buy_ratio, med_vol_ratio, tail_head_ratio })
}

/// Classifies the tail of `bars` as accumulating or not.
///
/// Takes the last `lookback_len` bars, finds the silent run, then grows
/// segments from the run's end and keeps the longest one that validates.
/// A bar after that segment closing above the break level means the move
/// has already left the box.
pub fn classify_accumulation(
    bars: &[Bar],
    silent: &SilentParams,
    params: &AccumParams,
    break_eps: f64,
) -> Result<AccumulationPhase, Rejection> {
    let view = &bars[bars.len().saturating_sub(params.lookback_len)..];
    let n = view.len();
    let need = silent.min_silent + silent.scan_win + 10;
    if n < need {
        return Err(Rejection::InsufficientData { need, have: n });
    }

    let sil = find_silent_segment(view, silent)?;
    let silent_bars = sil.slice(view);
    let pbox = price_box(silent_bars);
    let base_vol = median(&volumes(silent_bars));

    let first_end = sil.end + params.min_len;
    let last_end = n.min(sil.end + params.max_len);
    if first_end > last_end {
        return Err(Rejection::TooShort { len: n - sil.end, min: params.min_len });
    }

    let mut first_err = None;
    let mut found = None;
    for end in (first_end..=last_end).rev() {
        match validate_segment(&view[sil.end..end], &pbox, base_vol, params) {
            Ok(signal) => {
                found = Some((end, signal));
                break;
            }
            Err(e) => {
                first_err.get_or_insert(e);
            }
        }
    }
    let Some((end, signal)) = found else {
        return Err(first_err.unwrap_or(Rejection::NoValidSegment));
    };

    let level = pbox.break_level(break_eps);
    if view[end..].iter().any(|b| b.close > level) {
        return Err(Rejection::BreakoutInProgress);
    }

    Ok(AccumulationPhase {
        start_time: view[sil.end].open_time,
        end_time: view[end - 1].open_time,
        price_box: pbox,
        silent: sil,
        signal,
    })
}
