// src/services/trading_engine.rs

//! Per-instrument pipeline shared by the scheduler and the control surface:
//! fetch → indicators → signal → size → execute.
//!
//! Every step returns a value; "no signal" and "no trade" are outcomes, only
//! collaborator failures and short data are errors.

use std::sync::Arc;

use metrics::increment_counter;
use serde::Serialize;

use crate::services::bot_state::Mode;
use crate::services::exchange::MarketData;
use crate::services::executor::{ExecutionResult, OrderExecutor};
use crate::services::indicators::{self, IndicatorConfig, IndicatorError, IndicatorSet};
use crate::services::risk::{RiskSizer, Sizing};
use crate::services::strategies::ema_cross::{self, SignalConfig};
use crate::services::strategies::PriceSeries;
use crate::utils::errors::TradeError;

#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Candle interval, exchange notation (`15m`, `1h`, ...)
    pub interval: String,
    pub limit: usize,
    pub indicators: IndicatorConfig,
    pub signal: SignalConfig,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            interval: "15m".into(),
            limit: 200,
            indicators: IndicatorConfig::default(),
            signal: SignalConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TradeOutcome {
    NoSignal,
    /// Sized, but the guard said "do not trade" (zero quantity).
    NoTrade { sizing: Sizing },
    Executed {
        sizing: Sizing,
        result: ExecutionResult,
    },
}

impl TradeOutcome {
    pub fn executed(&self) -> Option<&ExecutionResult> {
        match self {
            TradeOutcome::Executed { result, .. } => Some(result),
            _ => None,
        }
    }
}

pub struct TradeEngine {
    market: Arc<dyn MarketData>,
    sizer: RiskSizer,
    executor: Arc<dyn OrderExecutor>,
    cfg: StrategyConfig,
}

impl TradeEngine {
    pub fn new(
        market: Arc<dyn MarketData>,
        sizer: RiskSizer,
        executor: Arc<dyn OrderExecutor>,
        cfg: StrategyConfig,
    ) -> Self {
        Self {
            market,
            sizer,
            executor,
            cfg,
        }
    }

    pub fn mode(&self) -> Mode {
        self.executor.mode()
    }

    async fn analyse(&self, symbol: &str) -> Result<(PriceSeries, IndicatorSet), TradeError> {
        let series = self
            .market
            .fetch_series(symbol, &self.cfg.interval, self.cfg.limit)
            .await?;
        let set = indicators::compute(&series, &self.cfg.indicators).map_err(|e| match e {
            IndicatorError::InsufficientData { have, need } => TradeError::InsufficientData {
                symbol: symbol.to_owned(),
                have,
                need,
            },
            other => TradeError::InvalidRequest(other.to_string()),
        })?;
        Ok((series, set))
    }

    fn latest_volatility(symbol: &str, set: &IndicatorSet) -> Result<f64, TradeError> {
        set.latest_volatility()
            .ok_or_else(|| TradeError::Other(format!("{symbol}: volatility undefined at latest bar")))
    }

    /// One scheduled evaluation of `symbol`.
    pub async fn evaluate(
        &self,
        symbol: &str,
        risk_percent: f64,
        leverage: u32,
    ) -> Result<TradeOutcome, TradeError> {
        let (series, set) = self.analyse(symbol).await?;
        let Some(signal) = ema_cross::detect(&series, &set, &self.cfg.signal) else {
            return Ok(TradeOutcome::NoSignal);
        };
        increment_counter!("bot_signals_total", "symbol" => symbol.to_owned());
        log::info!(
            "Signal {:?} {} at {}",
            signal.direction,
            signal.symbol,
            signal.detected_at_price
        );

        let volatility = Self::latest_volatility(symbol, &set)?;
        self.open_long(symbol, risk_percent, leverage, volatility).await
    }

    /// Operator-initiated long: same sizing and execution, no signal gate.
    pub async fn manual_long(
        &self,
        symbol: &str,
        risk_percent: f64,
        leverage: u32,
    ) -> Result<TradeOutcome, TradeError> {
        let (_, set) = self.analyse(symbol).await?;
        let volatility = Self::latest_volatility(symbol, &set)?;
        self.open_long(symbol, risk_percent, leverage, volatility).await
    }

    pub async fn open_long(
        &self,
        symbol: &str,
        risk_percent: f64,
        leverage: u32,
        volatility: f64,
    ) -> Result<TradeOutcome, TradeError> {
        let stop = self.sizer.stop_distance(volatility);
        let sizing = self.sizer.size(symbol, risk_percent, stop, leverage).await?;

        let Some(intent) = sizing.clone().into_intent() else {
            log::info!(
                "{symbol}: quantity floors to zero (risk={} stop={stop}); skipping",
                sizing.risk_amount
            );
            return Ok(TradeOutcome::NoTrade { sizing });
        };

        log::info!(
            "BUY {symbol} qty={} price={} tp={} sl={}",
            intent.quantity,
            sizing.reference_price,
            intent.take_profit,
            intent.stop_loss
        );
        let result = self.executor.submit_entry_with_bracket(&intent).await;
        let outcome = match (result.accepted, result.error.is_some()) {
            (true, false) => "accepted",
            (true, true) => "partial",
            (false, _) => "rejected",
        };
        increment_counter!(
            "bot_orders_total",
            "mode" => self.mode().to_string(),
            "outcome" => outcome,
        );

        Ok(TradeOutcome::Executed { sizing, result })
    }

    pub async fn flatten(&self, symbol: &str) -> bool {
        self.executor.flatten_position(symbol).await
    }
}
