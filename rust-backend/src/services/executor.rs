// src/services/executor.rs

//! Order execution behind one capability with two behaviours.
//!
//! `PaperExecutor` journals the intent and reports synthetic refs, `LiveExecutor`
//! sends a market entry followed by close-position take-profit / stop-loss
//! triggers. Callers never branch on mode: the variant is picked once by
//! [`build_executor`].
//!
//! A filled entry whose bracket leg fails is *not* rolled back. The entry is
//! still reported as accepted and the failing leg carries [`OrderRef::Failed`],
//! so the operator sees the unprotected position.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::services::bot_state::Mode;
use crate::services::exchange::{ExchangeApi, OrderRequest, OrderType, Side};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderIntent {
    pub symbol: String,
    pub side: Side,
    /// Always positive.
    pub quantity: f64,
    pub take_profit: f64,
    pub stop_loss: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum OrderRef {
    /// Exchange order id.
    Placed(String),
    /// Synthetic marker from the paper executor.
    Simulated(String),
    /// The leg was submitted and rejected.
    Failed(String),
}

impl OrderRef {
    pub fn is_failed(&self) -> bool {
        matches!(self, OrderRef::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub accepted: bool,
    pub entry: Option<OrderRef>,
    pub take_profit: Option<OrderRef>,
    pub stop_loss: Option<OrderRef>,
    pub error: Option<String>,
}

impl ExecutionResult {
    fn rejected(error: String) -> Self {
        Self {
            accepted: false,
            entry: None,
            take_profit: None,
            stop_loss: None,
            error: Some(error),
        }
    }

    /// Which fields are populated; identical across executors for the same outcome.
    pub fn shape(&self) -> (bool, bool, bool, bool, bool) {
        (
            self.accepted,
            self.entry.is_some(),
            self.take_profit.is_some(),
            self.stop_loss.is_some(),
            self.error.is_some(),
        )
    }
}

#[async_trait]
pub trait OrderExecutor: Send + Sync {
    fn mode(&self) -> Mode;
    async fn submit_entry_with_bracket(&self, intent: &OrderIntent) -> ExecutionResult;
    /// Close every open position on `symbol`; `true` iff all closures succeeded (or none existed).
    async fn flatten_position(&self, symbol: &str) -> bool;
}

pub fn build_executor(mode: Mode, exchange: Arc<dyn ExchangeApi>) -> Arc<dyn OrderExecutor> {
    match mode {
        Mode::Paper => Arc::new(PaperExecutor::new(exchange)),
        Mode::Live => Arc::new(LiveExecutor::new(exchange)),
    }
}

fn closing_side(amount: f64) -> Side {
    if amount > 0.0 {
        Side::Sell
    } else {
        Side::Buy
    }
}

// ─────────────────────────────────────────  paper ───────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PaperAction {
    OpenLong {
        at: DateTime<Utc>,
        intent: OrderIntent,
    },
    Close {
        at: DateTime<Utc>,
        symbol: String,
        side: Side,
        quantity: f64,
    },
}

/// Default number of paper actions kept; older ones are dropped first.
pub const JOURNAL_CAP: usize = 1_000;

pub struct PaperExecutor {
    /// Read-only use: open positions for flatten journaling.
    exchange: Arc<dyn ExchangeApi>,
    journal: Mutex<VecDeque<PaperAction>>,
    cap: usize,
}

impl PaperExecutor {
    pub fn new(exchange: Arc<dyn ExchangeApi>) -> Self {
        Self::with_cap(exchange, JOURNAL_CAP)
    }

    pub fn with_cap(exchange: Arc<dyn ExchangeApi>, cap: usize) -> Self {
        Self {
            exchange,
            journal: Mutex::new(VecDeque::new()),
            cap: cap.max(1),
        }
    }

    /// Oldest first.
    pub fn journal(&self) -> Vec<PaperAction> {
        self.journal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn record(&self, action: PaperAction) {
        let mut journal = self.journal.lock().unwrap_or_else(PoisonError::into_inner);
        while journal.len() >= self.cap {
            journal.pop_front();
        }
        journal.push_back(action);
    }
}

#[async_trait]
impl OrderExecutor for PaperExecutor {
    fn mode(&self) -> Mode {
        Mode::Paper
    }

    async fn submit_entry_with_bracket(&self, intent: &OrderIntent) -> ExecutionResult {
        log::info!(
            "[PAPER] open_long {} qty={} tp={} sl={}",
            intent.symbol,
            intent.quantity,
            intent.take_profit,
            intent.stop_loss
        );
        self.record(PaperAction::OpenLong {
            at: Utc::now(),
            intent: intent.clone(),
        });

        let id = Uuid::new_v4().simple().to_string();
        ExecutionResult {
            accepted: true,
            entry: Some(OrderRef::Simulated(format!("paper-entry-{id}"))),
            take_profit: Some(OrderRef::Simulated(format!("paper-tp-{id}"))),
            stop_loss: Some(OrderRef::Simulated(format!("paper-sl-{id}"))),
            error: None,
        }
    }

    async fn flatten_position(&self, symbol: &str) -> bool {
        let positions = match self.exchange.open_positions(symbol).await {
            Ok(p) => p,
            Err(e) => {
                log::error!("[PAPER] close_all_positions {symbol}: {e}");
                return false;
            }
        };
        for p in positions.into_iter().filter(|p| p.amount != 0.0) {
            let side = closing_side(p.amount);
            let quantity = p.amount.abs();
            log::info!("[PAPER] close pos {symbol} side={} qty={quantity}", side.as_str());
            self.record(PaperAction::Close {
                at: Utc::now(),
                symbol: symbol.to_owned(),
                side,
                quantity,
            });
        }
        true
    }
}

// ─────────────────────────────────────────  live ────────────

pub struct LiveExecutor {
    exchange: Arc<dyn ExchangeApi>,
}

impl LiveExecutor {
    pub fn new(exchange: Arc<dyn ExchangeApi>) -> Self {
        Self { exchange }
    }

    async fn leg(&self, req: &OrderRequest, label: &str, errors: &mut Vec<String>) -> OrderRef {
        match self.exchange.submit_order(req).await {
            Ok(ack) => OrderRef::Placed(ack.order_id),
            Err(e) => {
                log::error!("{} {label} leg failed: {e}", req.symbol);
                errors.push(format!("{label}: {e}"));
                OrderRef::Failed(e.to_string())
            }
        }
    }
}

#[async_trait]
impl OrderExecutor for LiveExecutor {
    fn mode(&self) -> Mode {
        Mode::Live
    }

    async fn submit_entry_with_bracket(&self, intent: &OrderIntent) -> ExecutionResult {
        let entry = OrderRequest::market(&intent.symbol, intent.side, intent.quantity);
        let ack = match self.exchange.submit_order(&entry).await {
            Ok(ack) => ack,
            Err(e) => {
                log::error!("{} entry rejected: {e}", intent.symbol);
                return ExecutionResult::rejected(format!("entry: {e}"));
            }
        };

        let exit_side = intent.side.opposite();
        let tp = OrderRequest::close_on_trigger(
            &intent.symbol,
            exit_side,
            OrderType::TakeProfitMarket,
            intent.take_profit,
        );
        let sl = OrderRequest::close_on_trigger(
            &intent.symbol,
            exit_side,
            OrderType::StopMarket,
            intent.stop_loss,
        );

        let mut errors = Vec::new();
        let take_profit = self.leg(&tp, "take-profit", &mut errors).await;
        let stop_loss = self.leg(&sl, "stop-loss", &mut errors).await;
        if !errors.is_empty() {
            log::warn!(
                "{} entry {} filled without full bracket; not rolled back",
                intent.symbol,
                ack.order_id
            );
        }

        ExecutionResult {
            accepted: true,
            entry: Some(OrderRef::Placed(ack.order_id)),
            take_profit: Some(take_profit),
            stop_loss: Some(stop_loss),
            error: (!errors.is_empty()).then(|| errors.join("; ")),
        }
    }

    async fn flatten_position(&self, symbol: &str) -> bool {
        let positions = match self.exchange.open_positions(symbol).await {
            Ok(p) => p,
            Err(e) => {
                log::error!("close_all_positions {symbol}: {e}");
                return false;
            }
        };

        let mut all_ok = true;
        for p in positions.into_iter().filter(|p| p.amount != 0.0) {
            let req = OrderRequest::market(symbol, closing_side(p.amount), p.amount.abs());
            if let Err(e) = self.exchange.submit_order(&req).await {
                log::error!("close {symbol} {} failed: {e}", p.amount);
                all_ok = false;
            }
        }
        all_ok
    }
}

// =======================================================================
// UNIT TESTS
// =======================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::exchange::fake::FakeExchange;
    use crate::services::exchange::PositionInfo;

    fn intent() -> OrderIntent {
        OrderIntent {
            symbol: "BTCUSDT".into(),
            side: Side::Buy,
            quantity: 0.002,
            take_profit: 50_360.0,
            stop_loss: 49_880.0,
        }
    }

    fn position(amount: f64) -> PositionInfo {
        PositionInfo {
            symbol: "BTCUSDT".into(),
            amount,
            entry_price: 50_000.0,
        }
    }

    #[tokio::test]
    async fn paper_sends_nothing_and_journals() {
        let ex = Arc::new(FakeExchange::new(1_000.0, 50_000.0));
        let paper = PaperExecutor::new(ex.clone());
        let res = paper.submit_entry_with_bracket(&intent()).await;

        assert!(res.accepted);
        assert!(matches!(res.entry, Some(OrderRef::Simulated(_))));
        assert!(ex.submitted().is_empty());
        assert!(matches!(paper.journal()[0], PaperAction::OpenLong { .. }));
    }

    #[tokio::test]
    async fn live_sends_entry_then_close_position_bracket() {
        let ex = Arc::new(FakeExchange::new(1_000.0, 50_000.0));
        let res = LiveExecutor::new(ex.clone()).submit_entry_with_bracket(&intent()).await;
        assert!(res.accepted);
        assert_eq!(res.error, None);

        let sent = ex.submitted();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0], OrderRequest::market("BTCUSDT", Side::Buy, 0.002));
        assert_eq!(sent[1].order_type, OrderType::TakeProfitMarket);
        assert_eq!(sent[1].side, Side::Sell);
        assert_eq!(sent[1].stop_price, Some(50_360.0));
        assert!(sent[1].close_position && sent[1].quantity.is_none());
        assert_eq!(sent[2].order_type, OrderType::StopMarket);
        assert_eq!(sent[2].stop_price, Some(49_880.0));
        assert!(sent[2].close_position);
    }

    #[tokio::test]
    async fn paper_and_live_results_share_shape() {
        let paper = PaperExecutor::new(Arc::new(FakeExchange::new(1_000.0, 50_000.0)));
        let live = LiveExecutor::new(Arc::new(FakeExchange::new(1_000.0, 50_000.0)));
        let a = paper.submit_entry_with_bracket(&intent()).await;
        let b = live.submit_entry_with_bracket(&intent()).await;
        assert_eq!(a.shape(), b.shape());
        assert_ne!(a.entry, b.entry);
    }

    #[tokio::test]
    async fn failed_leg_keeps_entry_and_marks_leg() {
        let ex = Arc::new(FakeExchange {
            reject: vec![OrderType::StopMarket],
            ..FakeExchange::new(1_000.0, 50_000.0)
        });
        let res = LiveExecutor::new(ex.clone()).submit_entry_with_bracket(&intent()).await;

        assert!(res.accepted);
        assert!(matches!(res.entry, Some(OrderRef::Placed(_))));
        assert!(matches!(res.take_profit, Some(OrderRef::Placed(_))));
        assert!(res.stop_loss.as_ref().is_some_and(OrderRef::is_failed));
        assert!(res.error.as_deref().unwrap_or("").starts_with("stop-loss"));
        // no rollback order was sent
        assert_eq!(ex.submitted().len(), 2);
    }

    #[tokio::test]
    async fn rejected_entry_skips_bracket() {
        let ex = Arc::new(FakeExchange {
            reject: vec![OrderType::Market],
            ..FakeExchange::new(1_000.0, 50_000.0)
        });
        let res = LiveExecutor::new(ex.clone()).submit_entry_with_bracket(&intent()).await;
        assert!(!res.accepted);
        assert_eq!(res.shape(), (false, false, false, false, true));
        assert!(ex.submitted().is_empty());
    }

    #[tokio::test]
    async fn live_flatten_closes_each_side() {
        let ex = Arc::new(FakeExchange {
            positions: vec![position(0.5), position(0.0), position(-0.2)],
            ..FakeExchange::new(1_000.0, 50_000.0)
        });
        assert!(LiveExecutor::new(ex.clone()).flatten_position("BTCUSDT").await);
        let sent = ex.submitted();
        assert_eq!(
            sent,
            vec![
                OrderRequest::market("BTCUSDT", Side::Sell, 0.5),
                OrderRequest::market("BTCUSDT", Side::Buy, 0.2),
            ]
        );
    }

    #[tokio::test]
    async fn live_flatten_reports_partial_failure() {
        let ex = Arc::new(FakeExchange {
            positions: vec![position(0.5), position(-0.2)],
            reject: vec![OrderType::Market],
            ..FakeExchange::new(1_000.0, 50_000.0)
        });
        assert!(!LiveExecutor::new(ex).flatten_position("BTCUSDT").await);
    }

    #[tokio::test]
    async fn flatten_with_no_positions_succeeds() {
        let ex = Arc::new(FakeExchange::new(1_000.0, 50_000.0));
        assert!(LiveExecutor::new(ex.clone()).flatten_position("BTCUSDT").await);
        assert!(PaperExecutor::new(ex).flatten_position("BTCUSDT").await);
    }

    #[tokio::test]
    async fn flatten_fails_when_positions_unreadable() {
        let ex = Arc::new(FakeExchange {
            fail_positions: true,
            ..FakeExchange::new(1_000.0, 50_000.0)
        });
        assert!(!LiveExecutor::new(ex.clone()).flatten_position("BTCUSDT").await);
        assert!(!PaperExecutor::new(ex).flatten_position("BTCUSDT").await);
    }

    #[tokio::test]
    async fn paper_flatten_journals_without_sending() {
        let ex = Arc::new(FakeExchange {
            positions: vec![position(-0.3)],
            ..FakeExchange::new(1_000.0, 50_000.0)
        });
        let paper = PaperExecutor::new(ex.clone());
        assert!(paper.flatten_position("BTCUSDT").await);
        assert!(ex.submitted().is_empty());
        match &paper.journal()[0] {
            PaperAction::Close { side, quantity, .. } => {
                assert_eq!(*side, Side::Buy);
                assert!((quantity - 0.3).abs() < 1e-12);
            }
            other => panic!("unexpected journal entry {other:?}"),
        }
    }

    #[tokio::test]
    async fn paper_journal_drops_oldest_past_cap() {
        let paper = PaperExecutor::with_cap(Arc::new(FakeExchange::new(1_000.0, 50_000.0)), 3);
        for qty in [0.001, 0.002, 0.003, 0.004, 0.005] {
            let res = paper
                .submit_entry_with_bracket(&OrderIntent {
                    quantity: qty,
                    ..intent()
                })
                .await;
            assert!(res.accepted);
        }

        let kept: Vec<f64> = paper
            .journal()
            .into_iter()
            .map(|a| match a {
                PaperAction::OpenLong { intent, .. } => intent.quantity,
                other => panic!("unexpected journal entry {other:?}"),
            })
            .collect();
        assert_eq!(kept, vec![0.003, 0.004, 0.005]);
    }

    #[test]
    fn builder_honours_mode() {
        let ex: Arc<dyn ExchangeApi> = Arc::new(FakeExchange::new(1.0, 1.0));
        assert_eq!(build_executor(Mode::Paper, ex.clone()).mode(), Mode::Paper);
        assert_eq!(build_executor(Mode::Live, ex).mode(), Mode::Live);
    }
}
