//! EMA crossover entry with RSI confirmation (long only).
//!
//! A long signal fires when the fast EMA moves from at-or-below the slow EMA
//! to strictly above it between the two most recent bars, and the RSI at the
//! latest bar is still below the confirmation ceiling.

use serde::{Deserialize, Serialize};

use crate::services::{indicators::IndicatorSet, strategies::PriceSeries};

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SignalConfig {
    /// RSI must be strictly below this value at the crossover bar
    pub oscillator_max: f64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self { oscillator_max: 55.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Direction {
    Long,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    pub symbol: String,
    pub direction: Direction,
    pub detected_at_price: f64,
}

/// Last two defined points of a series, `(previous, current)`.
fn last_two(series: &[Option<f64>]) -> Option<(f64, f64)> {
    match series {
        [.., Some(prev), Some(cur)] => Some((*prev, *cur)),
        _ => None,
    }
}

/// `true` iff fast went from `<= slow` to `> slow` on the latest bar.
pub fn crossed_above(fast: &[Option<f64>], slow: &[Option<f64>]) -> bool {
    match (last_two(fast), last_two(slow)) {
        (Some((f_prev, f_cur)), Some((s_prev, s_cur))) => f_prev <= s_prev && f_cur > s_cur,
        _ => false,
    }
}

/// Evaluate the latest bar. Absence of a signal is a normal outcome.
pub fn detect(series: &PriceSeries, set: &IndicatorSet, cfg: &SignalConfig) -> Option<Signal> {
    if !crossed_above(&set.fast, &set.slow) {
        return None;
    }
    let rsi = set.latest_oscillator()?;
    if rsi >= cfg.oscillator_max {
        return None;
    }

    Some(Signal {
        symbol: series.symbol.clone(),
        direction: Direction::Long,
        detected_at_price: series.last_close()?,
    })
}
