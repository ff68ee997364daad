//! ──────────────────────────────────────────────────────────────────────────
//! Risk-based position sizing
//! ──────────────────────────────────────────────────────────────────────────
//! * risk amount   – equity × risk% / 100
//! * quantity      – (risk amount × leverage) / (stop distance × price),
//!                   floored to the instrument's tradable precision
//! * bracket       – TP = price + stop × reward multiple, SL = price − stop,
//!                   rounded to the price precision the exchange accepts
//!
//! A non-positive stop distance or a quantity that floors to zero is a
//! normal "no trade" outcome, never an error.
//! ──────────────────────────────────────────────────────────────────────────

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::services::exchange::{ExchangeApi, Side};
use crate::services::executor::OrderIntent;
use crate::utils::errors::TradeError;

/// Rounds a raw quantity down to what the instrument accepts.
pub type QtyRounder = Arc<dyn Fn(&str, f64) -> f64 + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RiskConfig {
    /// stop distance = volatility × atr_mult
    pub atr_mult: f64,
    pub reward_multiple: f64,
    /// Decimals kept on take-profit / stop-loss trigger prices.
    #[serde(default = "default_price_decimals")]
    pub price_decimals: u32,
}

fn default_price_decimals() -> u32 {
    2
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            atr_mult: 1.2,
            reward_multiple: 3.0,
            price_decimals: default_price_decimals(),
        }
    }
}

/// Same precision for every symbol. Floors, except that a value already on
/// the grid up to binary representation error (`0.29 * 100` is
/// `28.999999999999996`) keeps its step.
pub fn floor_to_decimals(decimals: u32) -> QtyRounder {
    let factor = 10f64.powi(decimals as i32);
    Arc::new(move |_symbol: &str, qty: f64| {
        let scaled = qty * factor;
        let step = scaled.round();
        if (step - scaled).abs() <= scaled.abs() * 4.0 * f64::EPSILON {
            step / factor
        } else {
            scaled.floor() / factor
        }
    })
}

/// Nearest price on a `10^-decimals` grid.
pub fn round_price(price: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (price * factor).round() / factor
}

#[inline]
pub fn risk_amount(equity: f64, risk_percent: f64) -> f64 {
    equity * risk_percent / 100.0
}

/// Raw (unrounded) quantity. Zero whenever the stop distance or price is not positive.
pub fn position_quantity(risk_amount: f64, leverage: f64, stop_distance: f64, price: f64) -> f64 {
    if stop_distance <= 0.0 || price <= 0.0 {
        return 0.0;
    }
    let qty = (risk_amount * leverage) / (stop_distance * price);
    if qty.is_finite() {
        qty
    } else {
        0.0
    }
}

/// `(take_profit, stop_loss)` for a long entry.
pub fn bracket_prices(price: f64, stop_distance: f64, reward_multiple: f64) -> (f64, f64) {
    (price + stop_distance * reward_multiple, price - stop_distance)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sizing {
    pub symbol: String,
    pub equity: f64,
    pub reference_price: f64,
    pub stop_distance: f64,
    pub risk_amount: f64,
    pub quantity: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
}

impl Sizing {
    pub fn is_tradable(&self) -> bool {
        self.quantity > 0.0
    }

    /// `None` means "do not trade this cycle".
    pub fn into_intent(self) -> Option<OrderIntent> {
        if !self.is_tradable() {
            return None;
        }
        Some(OrderIntent {
            symbol: self.symbol,
            side: Side::Buy,
            quantity: self.quantity,
            take_profit: self.take_profit,
            stop_loss: self.stop_loss,
        })
    }
}

pub struct RiskSizer {
    exchange: Arc<dyn ExchangeApi>,
    rounder: QtyRounder,
    cfg: RiskConfig,
}

impl RiskSizer {
    pub fn new(exchange: Arc<dyn ExchangeApi>, rounder: QtyRounder, cfg: RiskConfig) -> Self {
        Self {
            exchange,
            rounder,
            cfg,
        }
    }

    pub fn stop_distance(&self, volatility: f64) -> f64 {
        volatility * self.cfg.atr_mult
    }

    /// Size a long entry against current equity and mark price.
    pub async fn size(
        &self,
        symbol: &str,
        risk_percent: f64,
        stop_distance: f64,
        leverage: u32,
    ) -> Result<Sizing, TradeError> {
        let equity = self.exchange.equity().await?;
        let price = self.exchange.reference_price(symbol).await?;

        let risk = risk_amount(equity, risk_percent);
        let raw = position_quantity(risk, f64::from(leverage), stop_distance, price);
        let quantity = if raw > 0.0 { (self.rounder)(symbol, raw) } else { 0.0 };
        let (take_profit, stop_loss) = bracket_prices(price, stop_distance, self.cfg.reward_multiple);
        let take_profit = round_price(take_profit, self.cfg.price_decimals);
        let stop_loss = round_price(stop_loss, self.cfg.price_decimals);

        Ok(Sizing {
            symbol: symbol.to_owned(),
            equity,
            reference_price: price,
            stop_distance,
            risk_amount: risk,
            quantity: quantity.max(0.0),
            take_profit,
            stop_loss,
        })
    }
}

// ======================================================================
// UNIT TESTS
// ======================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::exchange::fake::FakeExchange;

    fn sizer(equity: f64, price: f64, decimals: u32) -> RiskSizer {
        RiskSizer::new(
            Arc::new(FakeExchange::new(equity, price)),
            floor_to_decimals(decimals),
            RiskConfig::default(),
        )
    }

    fn close_to(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    // ───────────────────────────────────────── worked example
    #[tokio::test]
    async fn worked_example_sizes_and_brackets() {
        let s = sizer(10_000.0, 50_000.0, 9);
        let stop = s.stop_distance(100.0);
        assert!(close_to(stop, 120.0));

        let sz = s.size("BTCUSDT", 1.0, stop, 10).await.unwrap();
        assert!(close_to(sz.risk_amount, 100.0));
        assert!(close_to(sz.quantity, 0.000166666));
        assert!(close_to(sz.take_profit, 50_360.0));
        assert!(close_to(sz.stop_loss, 49_880.0));
        assert!(sz.is_tradable());
    }

    #[tokio::test]
    async fn quantity_that_floors_to_zero_is_not_traded() {
        // same example at three decimals: 0.000166 → 0.000
        let s = sizer(10_000.0, 50_000.0, 3);
        let sz = s.size("BTCUSDT", 1.0, 120.0, 10).await.unwrap();
        assert_eq!(sz.quantity, 0.0);
        assert!(sz.into_intent().is_none());
    }

    #[tokio::test]
    async fn non_positive_stop_distance_sizes_to_zero() {
        for (equity, lev, price) in [(10_000.0, 10, 50_000.0), (1e9, 125, 1.0), (0.0, 1, 3.0)] {
            let s = sizer(equity, price, 3);
            for stop in [0.0, -1.0, -120.0] {
                let sz = s.size("BTCUSDT", 1.0, stop, lev).await.unwrap();
                assert_eq!(sz.quantity, 0.0, "stop {stop} equity {equity}");
                assert!(sz.into_intent().is_none());
            }
        }
    }

    #[test]
    fn quantity_is_monotonic() {
        let base = position_quantity(risk_amount(10_000.0, 1.0), 10.0, 120.0, 50_000.0);
        let more_risk = position_quantity(risk_amount(10_000.0, 2.0), 10.0, 120.0, 50_000.0);
        let more_lev = position_quantity(risk_amount(10_000.0, 1.0), 20.0, 120.0, 50_000.0);
        let wider_stop = position_quantity(risk_amount(10_000.0, 1.0), 10.0, 240.0, 50_000.0);
        assert!(more_risk >= base);
        assert!(more_lev >= base);
        assert!(wider_stop <= base);

        let mut prev = 0.0;
        for pct in 1..=20 {
            let q = position_quantity(risk_amount(5_000.0, pct as f64 * 0.5), 5.0, 35.0, 2_000.0);
            assert!(q >= prev);
            prev = q;
        }
    }

    #[test]
    fn floor_never_rounds_up() {
        let r = floor_to_decimals(3);
        assert_eq!(r("BTCUSDT", 0.0019999), 0.001);
        assert_eq!(r("BTCUSDT", 0.29), 0.29);
        assert_eq!(r("BTCUSDT", 1.0), 1.0);
        assert_eq!(r("BTCUSDT", 0.0009999999996), 0.0);
        assert_eq!(r("BTCUSDT", 0.0029999999), 0.002);
        assert_eq!(floor_to_decimals(2)("BTCUSDT", 0.57), 0.57);
    }

    #[tokio::test]
    async fn bracket_prices_land_on_price_grid() {
        // ATR 0.123457 → stop 0.1481484, TP 2_000.4444452, SL 1_999.8518516
        let s = sizer(10_000.0, 2_000.0, 3);
        let sz = s.size("ETHUSDT", 1.0, s.stop_distance(0.123457), 10).await.unwrap();
        assert_eq!(sz.take_profit, 2_000.44);
        assert_eq!(sz.stop_loss, 1_999.85);

        let fine = RiskSizer::new(
            Arc::new(FakeExchange::new(10_000.0, 2_000.0)),
            floor_to_decimals(3),
            RiskConfig {
                price_decimals: 4,
                ..RiskConfig::default()
            },
        );
        let sz = fine.size("ETHUSDT", 1.0, 0.1481484, 10).await.unwrap();
        assert_eq!(sz.take_profit, 2_000.4444);
        assert_eq!(sz.stop_loss, 1_999.8519);
    }

    #[test]
    fn intent_is_long_with_bracket() {
        let sz = Sizing {
            symbol: "ETHUSDT".into(),
            equity: 1_000.0,
            reference_price: 2_000.0,
            stop_distance: 20.0,
            risk_amount: 10.0,
            quantity: 0.25,
            take_profit: 2_060.0,
            stop_loss: 1_980.0,
        };
        let intent = sz.into_intent().unwrap();
        assert_eq!(intent.side, Side::Buy);
        assert_eq!(intent.quantity, 0.25);
        assert_eq!((intent.take_profit, intent.stop_loss), (2_060.0, 1_980.0));
    }
}
