//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use futures_signal_bot::services::bot_state::{BotState, Mode};
use futures_signal_bot::services::control::ControlSurface;
use futures_signal_bot::services::exchange::{
    ExchangeApi, MarketData, OrderAck, OrderRequest, PositionInfo,
};
use futures_signal_bot::services::executor::build_executor;
use futures_signal_bot::services::indicators::IndicatorConfig;
use futures_signal_bot::services::risk::{floor_to_decimals, RiskConfig, RiskSizer};
use futures_signal_bot::services::strategies::{Candle, PriceSeries};
use futures_signal_bot::services::trading_engine::{StrategyConfig, TradeEngine};
use futures_signal_bot::utils::errors::ApiError;

pub const OPERATOR: i64 = 777;

#[derive(Default)]
pub struct FakeExchange {
    pub equity: f64,
    pub price: f64,
    pub positions: Vec<PositionInfo>,
    pub orders: Mutex<Vec<OrderRequest>>,
}

impl FakeExchange {
    pub fn new(equity: f64, price: f64) -> Self {
        Self {
            equity,
            price,
            ..Default::default()
        }
    }

    pub fn submitted(&self) -> Vec<OrderRequest> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExchangeApi for FakeExchange {
    async fn equity(&self) -> Result<f64, ApiError> {
        Ok(self.equity)
    }

    async fn reference_price(&self, _symbol: &str) -> Result<f64, ApiError> {
        Ok(self.price)
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck, ApiError> {
        let mut orders = self.orders.lock().unwrap();
        orders.push(order.clone());
        Ok(OrderAck {
            order_id: (1000 + orders.len()).to_string(),
            status: "NEW".into(),
        })
    }

    async fn open_positions(&self, symbol: &str) -> Result<Vec<PositionInfo>, ApiError> {
        Ok(self
            .positions
            .iter()
            .filter(|p| p.symbol == symbol)
            .cloned()
            .collect())
    }

    async fn set_leverage(&self, _symbol: &str, _leverage: u32) -> Result<(), ApiError> {
        Ok(())
    }
}

/// Serves fixed closes per symbol and counts every fetch.
#[derive(Default)]
pub struct FakeMarket {
    pub closes: HashMap<String, Vec<f64>>,
    pub fetches: AtomicUsize,
}

impl FakeMarket {
    pub fn with(mut self, symbol: &str, closes: Vec<f64>) -> Self {
        self.closes.insert(symbol.to_owned(), closes);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketData for FakeMarket {
    async fn fetch_series(
        &self,
        symbol: &str,
        interval: &str,
        _limit: usize,
    ) -> Result<PriceSeries, ApiError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let closes = self
            .closes
            .get(symbol)
            .ok_or_else(|| ApiError::Other(format!("no data for {symbol}")))?;
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                open_time: Utc.timestamp_opt(i as i64 * 900, 0).unwrap(),
                open: c,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 5.0,
            })
            .collect();
        Ok(PriceSeries::new(symbol, interval, candles))
    }
}

/// Sell-off, flat base, then an uptick that crosses fast over slow.
pub fn base_breakout() -> Vec<f64> {
    let mut closes: Vec<f64> = (0..20).map(|i| 200.0 - 5.0 * i as f64).collect();
    closes.extend(std::iter::repeat(100.0).take(80));
    closes.push(100.1);
    closes
}

pub fn strategy() -> StrategyConfig {
    StrategyConfig {
        indicators: IndicatorConfig {
            fast: 2,
            slow: 3,
            oscillator: 14,
            volatility: 14,
        },
        ..StrategyConfig::default()
    }
}

pub struct Bot {
    pub state: Arc<BotState>,
    pub engine: Arc<TradeEngine>,
    pub control: ControlSurface,
    pub exchange: Arc<FakeExchange>,
    pub market: Arc<FakeMarket>,
}

pub fn bot(
    mode: Mode,
    automation: bool,
    symbols: &[&str],
    exchange: FakeExchange,
    market: FakeMarket,
) -> Bot {
    let exchange = Arc::new(exchange);
    let market = Arc::new(market);
    let ex: Arc<dyn ExchangeApi> = exchange.clone();
    let engine = Arc::new(TradeEngine::new(
        market.clone(),
        RiskSizer::new(ex.clone(), floor_to_decimals(6), RiskConfig::default()),
        build_executor(mode, ex.clone()),
        strategy(),
    ));
    let symbols = symbols.iter().map(|s| s.to_string()).collect();
    let state = Arc::new(BotState::new(mode, automation, symbols, 10, 1.0));
    let control = ControlSurface::new(OPERATOR, state.clone(), engine.clone(), ex);
    Bot {
        state,
        engine,
        control,
        exchange,
        market,
    }
}
