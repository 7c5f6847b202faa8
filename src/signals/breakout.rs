use crate::config::{BreakoutParams, SilentParams};
use crate::models::bar::Bar;
use crate::models::signal::{BreakoutSignal, PriceBox, Rejection};
use crate::signals::features::{body_ratio, median, upper_wick_ratio, volumes, weighted_buy_ratio};
use crate::signals::silent::{is_quiet_window, price_box};

/// Strict breakout check over the last `window_len` bars.
///
/// The window splits into a silent portion and the trailing `confirm_len`
/// bars. Each step is a hard gate, checked in order:
///   1. silent portion quiet and not trending down
///   2. box from the silent portion
///   3. confirm volume strong and persistent against the silent baseline
///   4. last close above the break level, previous close above half of it
///   5. last candle decisive (short upper wick, real body)
///   6. recent taker buying
pub fn detect_breakout(
    bars: &[Bar],
    silent: &SilentParams,
    params: &BreakoutParams,
) -> Result<BreakoutSignal, Rejection> {
    if bars.len() < params.window_len || params.confirm_len < 2 || params.confirm_len >= params.window_len {
        return Err(Rejection::InsufficientData {
            need: params.window_len,
            have: bars.len(),
        });
    }
    let window = &bars[bars.len() - params.window_len..];
    let (quiet, confirm) = window.split_at(params.window_len - params.confirm_len);

    is_quiet_window(quiet, silent)?;
    let pbox = price_box(quiet);

    let baseline = median(&volumes(quiet));
    if baseline <= 0.0 {
        return Err(Rejection::NoBaseVolume);
    }
    let vol_ratio = median(&volumes(confirm)) / baseline;
    if vol_ratio < params.vol_mult {
        return Err(Rejection::WeakVolume { ratio: vol_ratio, need: params.vol_mult });
    }
    let strong = baseline * params.vol_mult;
    let count = confirm.iter().filter(|b| b.volume > strong).count();
    if count < params.persist_count {
        return Err(Rejection::NotPersistent { count, need: params.persist_count });
    }

    let level = pbox.break_level(params.break_eps);
    let last = &confirm[confirm.len() - 1];
    if last.close <= level {
        return Err(Rejection::NoBreak { close: last.close, level });
    }
    let prev = &confirm[confirm.len() - 2];
    let hold = pbox.break_level(params.break_eps / 2.0);
    if prev.close <= hold {
        return Err(Rejection::NoFollowThrough { close: prev.close, level: hold });
    }

    let wick = upper_wick_ratio(last);
    let body = body_ratio(last);
    if wick > params.max_wick || body < params.min_body {
        return Err(Rejection::PoorCandle { wick, body });
    }

    let recent = &confirm[confirm.len().saturating_sub(params.buy_ratio_bars)..];
    let buy_ratio = weighted_buy_ratio(recent);
    if buy_ratio < params.buy_ratio_min {
        return Err(Rejection::WeakBuying { ratio: buy_ratio, min: params.buy_ratio_min });
    }

    let magnitude = last.close / pbox.top - 1.0;
    // the last bar qualifies, so there is always a first one
    let breakout_open_time = confirm
        .iter()
        .find(|b| b.close > level)
        .map_or(last.open_time, |b| b.open_time);

    Ok(BreakoutSignal {
        breakout_open_time,
        price_box: pbox,
        break_eps: params.break_eps,
        score: breakout_score(vol_ratio, magnitude, buy_ratio, &pbox, params.vol_mult),
        vol_ratio,
        buy_ratio,
        magnitude,
    })
}

/// 0-100 confidence: volume strength (30), magnitude vs 1% (25), buy excess
/// over 0.5 vs 0.2 (20), box tightness vs 3% height (25).
pub fn breakout_score(vol_ratio: f64, magnitude: f64, buy_ratio: f64, pbox: &PriceBox, vol_mult: f64) -> f64 {
    let vol = if vol_mult > 0.0 {
        ((vol_ratio - 1.0) / vol_mult).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let mag = (magnitude / 0.01).clamp(0.0, 1.0);
    let buy = ((buy_ratio - 0.5) / 0.2).clamp(0.0, 1.0);
    let tight = (1.0 - pbox.height_ratio() / 0.03).max(0.0);
    30.0 * vol + 25.0 * mag + 20.0 * buy + 25.0 * tight
}
