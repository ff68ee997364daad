//! Periodic evaluation loop.
//!
//! Idle while automation is off, Active otherwise. The flag is read once at
//! the top of each tick, so a toggle lands on the next tick boundary and an
//! in-flight cycle always runs to completion.

use std::sync::Arc;
use std::time::Duration;

use metrics::increment_counter;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::services::bot_state::BotState;
use crate::services::trading_engine::{TradeEngine, TradeOutcome};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub instruments: usize,
    pub signals: usize,
    pub executed: usize,
    pub failures: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tick {
    Idle,
    Ran(CycleSummary),
}

pub struct Scheduler {
    state: Arc<BotState>,
    engine: Arc<TradeEngine>,
    period: Duration,
}

impl Scheduler {
    pub fn new(state: Arc<BotState>, engine: Arc<TradeEngine>, period: Duration) -> Self {
        Self {
            state,
            engine,
            period,
        }
    }

    /// One cycle across every instrument; failures stay with their instrument.
    pub async fn tick(&self) -> Tick {
        let snap = self.state.snapshot();
        if !snap.automation_enabled {
            log::debug!("automation off; tick skipped");
            return Tick::Idle;
        }
        increment_counter!("bot_cycles_total");

        let mut summary = CycleSummary {
            instruments: snap.instruments.len(),
            ..CycleSummary::default()
        };
        for symbol in &snap.instruments {
            match self
                .engine
                .evaluate(symbol, snap.risk_percent, snap.leverage)
                .await
            {
                Ok(TradeOutcome::NoSignal) => {}
                Ok(TradeOutcome::NoTrade { sizing }) => {
                    summary.signals += 1;
                    log::info!(
                        "{symbol}: signal without tradable size (risk={:.2})",
                        sizing.risk_amount
                    );
                }
                Ok(TradeOutcome::Executed { result, .. }) => {
                    summary.signals += 1;
                    if result.accepted {
                        summary.executed += 1;
                    }
                    match &result.error {
                        Some(err) => log::warn!(
                            "{symbol}: execution reported errors (accepted={}): {err}",
                            result.accepted
                        ),
                        None => log::info!("{symbol}: bracket submitted, entry={:?}", result.entry),
                    }
                }
                Err(err) => {
                    summary.failures += 1;
                    increment_counter!("bot_instrument_failures_total", "symbol" => symbol.clone());
                    log::warn!("{symbol}: skipped this cycle: {err}");
                }
            }
        }
        log::debug!("cycle finished: {summary:?}");
        Tick::Ran(summary)
    }

    /// Tick on `period` until `shutdown` flips to `true` or its sender drops.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut iv = tokio::time::interval(self.period);
        iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::info!("scheduler started, every {:?}", self.period);

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = iv.tick() => {
                    self.tick().await;
                }
            }
        }
        log::info!("scheduler stopped");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
