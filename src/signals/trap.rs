use crate::models::bar::Bar;
use crate::models::signal::{Rejection, TrapFlag, TrapReport};
use crate::signals::features::upper_wick_ratio;

const EXTENSION: f64 = 1.005; // a close this far above the top counts as extending
const LONG_WICK: f64 = 0.6;

/// False-breakout penalty from the 2-3 bars after a breakout bar.
///
/// Points add up per triggered flag (0-140). `back_into_box` is reported on
/// its own since callers kill the candidate on it regardless of the total.
pub fn score_trap(follow: &[Bar], box_top: f64, eps: f64) -> Result<TrapReport, Rejection> {
    if follow.len() < 2 {
        return Err(Rejection::InsufficientData { need: 2, have: follow.len() });
    }
    let bars = &follow[..follow.len().min(3)];
    let (first, second) = (&bars[0], &bars[1]);

    let mut flags = Vec::new();
    if second.body() < first.body() * 0.5 {
        flags.push(TrapFlag::BodyShrink);
    }
    if second.volume < first.volume * 0.7 {
        flags.push(TrapFlag::VolumeFade);
    }
    if !bars.iter().any(|b| b.close >= box_top * EXTENSION) {
        flags.push(TrapFlag::NoExtension);
    }
    let back_into_box = bars.iter().any(|b| b.low < box_top * (1.0 - eps))
        || bars.iter().all(|b| b.close < box_top);
    if back_into_box {
        flags.push(TrapFlag::BackIntoBox);
    }
    if bars.iter().any(|b| upper_wick_ratio(b) > LONG_WICK) {
        flags.push(TrapFlag::LongWick);
    }
    if second.buy_ratio() < first.buy_ratio() * 0.85 {
        flags.push(TrapFlag::BuyDecay);
    }

    Ok(TrapReport {
        score: flags.iter().map(TrapFlag::points).sum(),
        back_into_box,
        flags,
    })
}
