// src/services/binance/api.rs

//! Binance USDⓈ-M futures REST adapter.
//!
//! Implements both collaborator traits: `MarketData` (public klines) and
//! `ExchangeApi` (signed account / order endpoints).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::Value;

use crate::config::settings::Settings;
use crate::services::binance::auth;
use crate::services::exchange::{
    ExchangeApi, MarketData, OrderAck, OrderRequest, PositionInfo,
};
use crate::services::strategies::{Candle, PriceSeries};
use crate::utils::errors::ApiError;

pub const MAINNET_URL: &str = "https://fapi.binance.com";
pub const TESTNET_URL: &str = "https://testnet.binancefuture.com";

const RECV_WINDOW_MS: u64 = 5_000;
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct BinanceClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl BinanceClient {
    pub fn new(settings: &Settings) -> Result<Self, ApiError> {
        let base = if settings.binance_testnet {
            TESTNET_URL
        } else {
            MAINNET_URL
        };
        Self::with_base_url(base, &settings.binance_api_key, &settings.binance_api_secret)
    }

    pub fn with_base_url(base_url: &str, api_key: &str, api_secret: &str) -> Result<Self, ApiError> {
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            api_secret: api_secret.to_owned(),
        })
    }

    /// Unsigned GET
    async fn public_get(&self, path: &str, params: &[(&str, String)]) -> Result<Value, ApiError> {
        let url = format!("{}{}?{}", self.base_url, path, auth::encode_params(params));
        let req = self.http.get(url);
        Self::read(req).await
    }

    /// Signed request: params + timestamp + recvWindow, then `signature` appended last.
    async fn signed(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<Value, ApiError> {
        let mut all = params.to_vec();
        all.push(("timestamp", auth::current_timestamp().to_string()));
        all.push(("recvWindow", RECV_WINDOW_MS.to_string()));
        let query = auth::encode_params(&all);
        let sig = auth::sign_query(&self.api_secret, &query);

        let url = format!("{}{}?{}&signature={}", self.base_url, path, query, sig);
        let req = self
            .http
            .request(method, url)
            .header("X-MBX-APIKEY", &self.api_key);
        Self::read(req).await
    }

    async fn read(req: reqwest::RequestBuilder) -> Result<Value, ApiError> {
        let resp = req.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            let body = serde_json::from_str(&text).unwrap_or(Value::Null);
            return Err(exchange_error(status.as_u16(), &body));
        }
        Ok(serde_json::from_str(&text)?)
    }
}

fn exchange_error(status: u16, body: &Value) -> ApiError {
    ApiError::Exchange {
        code: body
            .get("code")
            .and_then(Value::as_i64)
            .unwrap_or(i64::from(status)),
        msg: body
            .get("msg")
            .and_then(Value::as_str)
            .unwrap_or("no message")
            .to_owned(),
    }
}

fn parse_f64(field: &str, raw: &str) -> Result<f64, ApiError> {
    raw.parse::<f64>()
        .map_err(|_| ApiError::Other(format!("{field}: not a number: {raw:?}")))
}

/* ─────────────────────────────────────────  wire structs ───── */

#[derive(Debug, Deserialize)]
struct BalanceRow {
    asset: String,
    balance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PremiumIndex {
    mark_price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResp {
    order_id: i64,
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRow {
    symbol: String,
    position_amt: String,
    entry_price: String,
}

/// `[openTime, open, high, low, close, volume, closeTime, ...]`
fn candle_from_row(row: &[Value]) -> Result<Candle, ApiError> {
    let num = |i: usize, name: &str| -> Result<f64, ApiError> {
        let raw = row
            .get(i)
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::Other(format!("kline row missing {name}")))?;
        parse_f64(name, raw)
    };
    let open_ms = row
        .first()
        .and_then(Value::as_i64)
        .ok_or_else(|| ApiError::Other("kline row missing open time".into()))?;
    let open_time = DateTime::<Utc>::from_timestamp_millis(open_ms)
        .ok_or_else(|| ApiError::Other(format!("kline open time out of range: {open_ms}")))?;

    Ok(Candle {
        open_time,
        open: num(1, "open")?,
        high: num(2, "high")?,
        low: num(3, "low")?,
        close: num(4, "close")?,
        volume: num(5, "volume")?,
    })
}

fn order_params(order: &OrderRequest) -> Vec<(&'static str, String)> {
    let mut p = vec![
        ("symbol", order.symbol.clone()),
        ("side", order.side.as_str().to_owned()),
        ("type", order.order_type.as_str().to_owned()),
    ];
    if let Some(q) = order.quantity {
        p.push(("quantity", q.to_string()));
    }
    if let Some(sp) = order.stop_price {
        p.push(("stopPrice", sp.to_string()));
    }
    if order.close_position {
        p.push(("closePosition", "true".to_owned()));
    }
    p
}

#[async_trait]
impl MarketData for BinanceClient {
    async fn fetch_series(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<PriceSeries, ApiError> {
        let body = self
            .public_get(
                "/fapi/v1/klines",
                &[
                    ("symbol", symbol.to_owned()),
                    ("interval", interval.to_owned()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;
        let rows: Vec<Vec<Value>> = serde_json::from_value(body)?;
        let candles = rows
            .iter()
            .map(|r| candle_from_row(r))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PriceSeries::new(symbol, interval, candles))
    }
}

#[async_trait]
impl ExchangeApi for BinanceClient {
    async fn equity(&self) -> Result<f64, ApiError> {
        let body = self.signed(Method::GET, "/fapi/v2/balance", &[]).await?;
        let rows: Vec<BalanceRow> = serde_json::from_value(body)?;
        match rows.iter().find(|r| r.asset == "USDT") {
            Some(r) => parse_f64("balance", &r.balance),
            None => Ok(0.0),
        }
    }

    async fn reference_price(&self, symbol: &str) -> Result<f64, ApiError> {
        let body = self
            .public_get("/fapi/v1/premiumIndex", &[("symbol", symbol.to_owned())])
            .await?;
        let idx: PremiumIndex = serde_json::from_value(body)?;
        parse_f64("markPrice", &idx.mark_price)
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderAck, ApiError> {
        let body = self
            .signed(Method::POST, "/fapi/v1/order", &order_params(order))
            .await?;
        let resp: OrderResp = serde_json::from_value(body)?;
        Ok(OrderAck {
            order_id: resp.order_id.to_string(),
            status: resp.status,
        })
    }

    async fn open_positions(&self, symbol: &str) -> Result<Vec<PositionInfo>, ApiError> {
        let body = self
            .signed(
                Method::GET,
                "/fapi/v2/positionRisk",
                &[("symbol", symbol.to_owned())],
            )
            .await?;
        let rows: Vec<PositionRow> = serde_json::from_value(body)?;
        rows.into_iter()
            .map(|r| {
                Ok(PositionInfo {
                    amount: parse_f64("positionAmt", &r.position_amt)?,
                    entry_price: parse_f64("entryPrice", &r.entry_price)?,
                    symbol: r.symbol,
                })
            })
            .collect()
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ApiError> {
        self.signed(
            Method::POST,
            "/fapi/v1/leverage",
            &[("symbol", symbol.to_owned()), ("leverage", leverage.to_string())],
        )
        .await?;
        log::info!("Set leverage {symbol} -> {leverage}x");
        Ok(())
    }
}

// ──────────────────────────────────────────────────────────────
// UNIT-TESTS  ▸  wire parsing helpers
// ──────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::exchange::{OrderType, Side};
    use serde_json::json;

    #[test]
    fn kline_row_parses_numeric_strings() {
        let row = json!([1700000000000i64, "1.5", "2.5", "0.5", "2.0", "99.9", 1700000899999i64]);
        let c = candle_from_row(row.as_array().unwrap()).unwrap();
        assert_eq!(c.open_time.timestamp_millis(), 1700000000000);
        assert_eq!((c.open, c.high, c.low, c.close), (1.5, 2.5, 0.5, 2.0));
        assert!((c.volume - 99.9).abs() < 1e-9);
    }

    #[test]
    fn kline_row_with_garbage_is_rejected() {
        let row = json!([1700000000000i64, "bad", "2", "0", "1", "1"]);
        assert!(candle_from_row(row.as_array().unwrap()).is_err());
        let short = json!([1700000000000i64, "1"]);
        assert!(candle_from_row(short.as_array().unwrap()).is_err());
    }

    #[test]
    fn error_body_maps_to_exchange_error() {
        let e = exchange_error(400, &json!({"code": -1121, "msg": "Invalid symbol."}));
        match e {
            ApiError::Exchange { code, msg } => {
                assert_eq!(code, -1121);
                assert_eq!(msg, "Invalid symbol.");
            }
            other => panic!("wrong error variant: {other:?}"),
        }
        // HTML error pages etc. fall back to the HTTP status
        match exchange_error(502, &json!(null)) {
            ApiError::Exchange { code, .. } => assert_eq!(code, 502),
            other => panic!("wrong error variant: {other:?}"),
        }
    }

    #[test]
    fn bracket_leg_params_close_whole_position() {
        let tp = OrderRequest::close_on_trigger("BTCUSDT", Side::Sell, OrderType::TakeProfitMarket, 50360.0);
        let p = order_params(&tp);
        assert!(p.contains(&("type", "TAKE_PROFIT_MARKET".to_owned())));
        assert!(p.contains(&("stopPrice", "50360".to_owned())));
        assert!(p.contains(&("closePosition", "true".to_owned())));
        assert!(!p.iter().any(|(k, _)| *k == "quantity"));
    }

    #[test]
    fn market_params_carry_quantity() {
        let p = order_params(&OrderRequest::market("ETHUSDT", Side::Buy, 0.25));
        assert_eq!(
            p,
            vec![
                ("symbol", "ETHUSDT".to_owned()),
                ("side", "BUY".to_owned()),
                ("type", "MARKET".to_owned()),
                ("quantity", "0.25".to_owned()),
            ]
        );
    }
}
