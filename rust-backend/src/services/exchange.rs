//! Collaborator seams: the exchange trading API and the candle provider.
//!
//! The engine only ever talks to these traits. `services::binance` is the
//! production adapter; tests plug in in-memory fakes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::services::strategies::PriceSeries;
use crate::utils::errors::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Market,
    TakeProfitMarket,
    StopMarket,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Market => "MARKET",
            OrderType::TakeProfitMarket => "TAKE_PROFIT_MARKET",
            OrderType::StopMarket => "STOP_MARKET",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Option<f64>,
    pub stop_price: Option<f64>,
    /// Close whatever position is open when triggered instead of a fixed size.
    pub close_position: bool,
}

impl OrderRequest {
    pub fn market(symbol: &str, side: Side, quantity: f64) -> Self {
        Self {
            symbol: symbol.to_owned(),
            side,
            order_type: OrderType::Market,
            quantity: Some(quantity),
            stop_price: None,
            close_position: false,
        }
    }

    /// Trigger order that closes the entire position on `side`'s opposite.
    pub fn close_on_trigger(symbol: &str, side: Side, order_type: OrderType, stop_price: f64) -> Self {
        Self {
            symbol: symbol.to_owned(),
            side,
            order_type,
            quantity: None,
            stop_price: Some(stop_price),
            close_position: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAck {
    pub order_id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub symbol: String,
    /// Signed size: positive long, negative short, zero flat.
    pub amount: f64,
    pub entry_price: f64,
}

#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Account equity in the settlement asset (USDT).
    async fn equity(&self) -> Result<f64, ApiError>;
    /// Current mark price used for sizing and bracket prices.
    async fn reference_price(&self, symbol: &str) -> Result<f64, ApiError>;
    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck, ApiError>;
    async fn open_positions(&self, symbol: &str) -> Result<Vec<PositionInfo>, ApiError>;
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ApiError>;
}

#[async_trait]
pub trait MarketData: Send + Sync {
    async fn fetch_series(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<PriceSeries, ApiError>;
}
