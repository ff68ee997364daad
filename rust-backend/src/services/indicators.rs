//! Indicator engine: fast/slow EMA, Wilder RSI and a true-range ATR.
//!
//! Every output series is aligned index-for-index with the candles it was
//! computed from. Entries inside an indicator's lookback window are `None`,
//! so callers can compare "value at i" with "value at i-1" without ever
//! reading an undefined entry.

use serde::Deserialize;
use thiserror::Error;

use crate::services::strategies::{Candle, PriceSeries};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct IndicatorConfig {
    pub fast: usize,
    pub slow: usize,
    pub oscillator: usize,
    pub volatility: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            fast: 18,
            slow: 50,
            oscillator: 14,
            volatility: 14,
        }
    }
}

impl IndicatorConfig {
    /// Shortest series that yields a value at the latest index for every
    /// indicator (and two slow-average points for crossover checks).
    pub fn min_len(&self) -> usize {
        self.fast
            .max(self.slow)
            .max(self.oscillator)
            .max(self.volatility)
            + 1
    }

    fn validate(&self) -> Result<(), IndicatorError> {
        if self.fast == 0 || self.slow == 0 || self.oscillator == 0 || self.volatility == 0 {
            return Err(IndicatorError::InvalidPeriod);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndicatorError {
    #[error("insufficient data: have {have} candles, need {need}")]
    InsufficientData { have: usize, need: usize },
    #[error("indicator periods must be positive")]
    InvalidPeriod,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSet {
    pub fast: Vec<Option<f64>>,
    pub slow: Vec<Option<f64>>,
    pub oscillator: Vec<Option<f64>>,
    pub volatility: Vec<Option<f64>>,
}

impl IndicatorSet {
    pub fn len(&self) -> usize {
        self.fast.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fast.is_empty()
    }

    pub fn latest_oscillator(&self) -> Option<f64> {
        self.oscillator.last().copied().flatten()
    }

    pub fn latest_volatility(&self) -> Option<f64> {
        self.volatility.last().copied().flatten()
    }
}

/// Compute the full indicator set, or refuse when the series is too short.
pub fn compute(series: &PriceSeries, cfg: &IndicatorConfig) -> Result<IndicatorSet, IndicatorError> {
    cfg.validate()?;
    let need = cfg.min_len();
    if series.len() < need {
        return Err(IndicatorError::InsufficientData {
            have: series.len(),
            need,
        });
    }

    let closes = series.closes();
    Ok(IndicatorSet {
        fast: ema(&closes, cfg.fast),
        slow: ema(&closes, cfg.slow),
        oscillator: rsi(&closes, cfg.oscillator),
        volatility: atr(&series.candles, cfg.volatility),
    })
}

/// EMA seeded with the SMA of the first `period` values.
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(prev);

    for (i, &v) in values.iter().enumerate().skip(period) {
        prev += alpha * (v - prev);
        out[i] = Some(prev);
    }
    out
}

/// RSI with Wilder smoothing of average gain / average loss.
pub fn rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = closes.len();
    let mut out = vec![None; n];
    if period == 0 || n <= period {
        return out;
    }

    let p = period as f64;
    let (mut avg_gain, mut avg_loss) = (0.0, 0.0);
    for w in closes[..=period].windows(2) {
        let ch = w[1] - w[0];
        if ch > 0.0 {
            avg_gain += ch;
        } else {
            avg_loss -= ch;
        }
    }
    avg_gain /= p;
    avg_loss /= p;
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    for i in (period + 1)..n {
        let ch = closes[i] - closes[i - 1];
        let (gain, loss) = if ch > 0.0 { (ch, 0.0) } else { (0.0, -ch) };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        out[i] = Some(rsi_value(avg_gain, avg_loss));
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_gain == 0.0 && avg_loss == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// Per-bar true range. Undefined for the first bar, which has no prior close.
pub fn true_range(candles: &[Candle]) -> Vec<Option<f64>> {
    let mut out = vec![None; candles.len()];
    for (i, w) in candles.windows(2).enumerate() {
        let pc = w[0].close;
        let c = w[1];
        out[i + 1] = Some(
            (c.high - c.low)
                .max((c.high - pc).abs())
                .max((c.low - pc).abs()),
        );
    }
    out
}

/// ATR: mean of the first `period` true ranges, then Wilder smoothing.
pub fn atr(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let n = candles.len();
    let mut out = vec![None; n];
    if period == 0 || n <= period {
        return out;
    }

    let tr: Vec<f64> = true_range(candles).into_iter().map(|v| v.unwrap_or(0.0)).collect();
    let p = period as f64;
    let mut prev = tr[1..=period].iter().sum::<f64>() / p;
    out[period] = Some(prev);

    for i in (period + 1)..n {
        prev = (prev * (p - 1.0) + tr[i]) / p;
        out[i] = Some(prev);
    }
    out
}
