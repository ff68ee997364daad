// src/services/control.rs

//! Operator control surface.
//!
//! Every operation checks the caller first; an unknown caller gets the fixed
//! denial and nothing is read or written. `dispatch` turns a raw
//! `(caller, command, args)` tuple from the command channel into a text reply.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::Serialize;

use crate::services::bot_state::{BotState, Mode};
use crate::services::exchange::ExchangeApi;
use crate::services::executor::OrderRef;
use crate::services::trading_engine::{TradeEngine, TradeOutcome};
use crate::utils::errors::ControlError;

pub const DENIAL: &str = "Not authorized.";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Status,
    Signal(bool),
    Buy { symbol: String, risk: Option<f64> },
    CloseAll(Option<String>),
    Risk(f64),
}

fn parse_percent(raw: &str) -> Result<f64, ControlError> {
    let pct: f64 = raw
        .trim_end_matches('%')
        .parse()
        .map_err(|_| ControlError::BadCommand(format!("not a number: {raw}")))?;
    if !(pct > 0.0 && pct <= 100.0) {
        return Err(ControlError::BadCommand(format!(
            "risk percent must be in (0, 100], got {pct}"
        )));
    }
    Ok(pct)
}

impl Command {
    pub fn parse(name: &str, args: &[String]) -> Result<Self, ControlError> {
        let name = name.trim().trim_start_matches('/').to_lowercase();
        match name.as_str() {
            "status" => Ok(Command::Status),
            "signal" => match args.first().map(|a| a.to_lowercase()).as_deref() {
                None | Some("on") => Ok(Command::Signal(true)),
                Some("off") => Ok(Command::Signal(false)),
                Some(other) => Err(ControlError::BadCommand(format!(
                    "signal expects on|off, got {other}"
                ))),
            },
            "buy" => {
                let symbol = args
                    .first()
                    .map(|s| s.to_uppercase())
                    .ok_or_else(|| ControlError::BadCommand("usage: buy SYMBOL [side] [risk]".into()))?;
                if let Some(side) = args.get(1) {
                    if !matches!(side.to_lowercase().as_str(), "buy" | "long") {
                        return Err(ControlError::BadCommand(format!(
                            "only long entries are supported, got {side}"
                        )));
                    }
                }
                let risk = args.get(2).map(|r| parse_percent(r)).transpose()?;
                Ok(Command::Buy { symbol, risk })
            }
            "closeall" => Ok(Command::CloseAll(args.first().map(|s| s.to_uppercase()))),
            "risk" => {
                let raw = args
                    .first()
                    .ok_or_else(|| ControlError::BadCommand("usage: risk PERCENT".into()))?;
                Ok(Command::Risk(parse_percent(raw)?))
            }
            other => Err(ControlError::BadCommand(format!("unknown command: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub mode: Mode,
    /// `None` when the exchange could not be reached.
    pub equity: Option<f64>,
    pub instruments: Vec<String>,
    pub automation_enabled: bool,
    pub risk_percent: f64,
    pub leverage: u32,
}

impl StatusReport {
    pub fn render(&self) -> String {
        let balance = match self.equity {
            Some(e) => format!("{e:.2}"),
            None => "unavailable".to_owned(),
        };
        format!(
            "MODE={}\nUSDT balance: {}\nSymbols: {}",
            self.mode,
            balance,
            self.instruments.join(",")
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Ok,
    Denied,
    BadCommand,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub kind: ReplyKind,
    pub text: String,
}

impl Reply {
    fn ok(text: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Ok,
            text: text.into(),
        }
    }
}

impl From<ControlError> for Reply {
    fn from(e: ControlError) -> Self {
        let kind = match e {
            ControlError::Unauthorized => ReplyKind::Denied,
            ControlError::BadCommand(_) => ReplyKind::BadCommand,
            ControlError::Trade(_) => ReplyKind::Failed,
        };
        let text = match &e {
            ControlError::Trade(inner) => format!("Error: {inner}"),
            other => other.to_string(),
        };
        Self { kind, text }
    }
}

fn ref_text(r: &Option<OrderRef>) -> String {
    match r {
        Some(OrderRef::Placed(id)) => id.clone(),
        Some(OrderRef::Simulated(id)) => id.clone(),
        Some(OrderRef::Failed(err)) => format!("FAILED({err})"),
        None => "-".to_owned(),
    }
}

fn render_outcome(symbol: &str, outcome: &TradeOutcome) -> String {
    match outcome {
        TradeOutcome::NoSignal => format!("Manual buy {symbol}: no trade"),
        TradeOutcome::NoTrade { sizing } => format!(
            "Manual buy {symbol}: quantity rounds to zero (risk {:.2} USDT, stop {:.4}); nothing sent",
            sizing.risk_amount, sizing.stop_distance
        ),
        TradeOutcome::Executed { sizing, result } => {
            let mut text = format!(
                "Manual buy result: {symbol} accepted={} qty={} entry={} tp={}@{:.2} sl={}@{:.2}",
                result.accepted,
                sizing.quantity,
                ref_text(&result.entry),
                ref_text(&result.take_profit),
                sizing.take_profit,
                ref_text(&result.stop_loss),
                sizing.stop_loss,
            );
            if let Some(err) = &result.error {
                let _ = write!(text, "\nerror: {err}");
            }
            text
        }
    }
}

pub struct ControlSurface {
    operator_id: i64,
    state: Arc<BotState>,
    engine: Arc<TradeEngine>,
    exchange: Arc<dyn ExchangeApi>,
}

impl ControlSurface {
    pub fn new(
        operator_id: i64,
        state: Arc<BotState>,
        engine: Arc<TradeEngine>,
        exchange: Arc<dyn ExchangeApi>,
    ) -> Self {
        Self {
            operator_id,
            state,
            engine,
            exchange,
        }
    }

    fn authorize(&self, caller: i64) -> Result<(), ControlError> {
        if caller == self.operator_id {
            Ok(())
        } else {
            log::warn!("rejected command from caller {caller}");
            Err(ControlError::Unauthorized)
        }
    }

    pub async fn status(&self, caller: i64) -> Result<StatusReport, ControlError> {
        self.authorize(caller)?;
        let snap = self.state.snapshot();
        let equity = match self.exchange.equity().await {
            Ok(e) => Some(e),
            Err(e) => {
                log::error!("status: balance lookup failed: {e}");
                None
            }
        };
        Ok(StatusReport {
            mode: snap.mode,
            equity,
            instruments: snap.instruments,
            automation_enabled: snap.automation_enabled,
            risk_percent: snap.risk_percent,
            leverage: snap.leverage,
        })
    }

    pub fn set_automation(&self, caller: i64, enabled: bool) -> Result<(), ControlError> {
        self.authorize(caller)?;
        self.state.set_automation(enabled);
        log::info!("automation {}", if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    pub fn set_risk(&self, caller: i64, percent: f64) -> Result<(), ControlError> {
        self.authorize(caller)?;
        if !(percent > 0.0 && percent <= 100.0) {
            return Err(ControlError::BadCommand(format!(
                "risk percent must be in (0, 100], got {percent}"
            )));
        }
        self.state.set_risk_percent(percent);
        log::info!("risk percent set to {percent}");
        Ok(())
    }

    /// Same sizing and execution path as a scheduled signal, run inline.
    pub async fn manual_order(
        &self,
        caller: i64,
        symbol: &str,
        risk_percent: Option<f64>,
    ) -> Result<TradeOutcome, ControlError> {
        self.authorize(caller)?;
        let snap = self.state.snapshot();
        let risk = risk_percent.unwrap_or(snap.risk_percent);
        Ok(self.engine.manual_long(symbol, risk, snap.leverage).await?)
    }

    pub async fn flatten_all(&self, caller: i64, symbol: &str) -> Result<bool, ControlError> {
        self.authorize(caller)?;
        Ok(self.engine.flatten(symbol).await)
    }

    pub async fn dispatch(&self, caller: i64, name: &str, args: &[String]) -> Reply {
        match self.try_dispatch(caller, name, args).await {
            Ok(reply) => reply,
            Err(e) => e.into(),
        }
    }

    async fn try_dispatch(&self, caller: i64, name: &str, args: &[String]) -> Result<Reply, ControlError> {
        // authorize before parsing: malformed commands from strangers still get the denial
        self.authorize(caller)?;
        let reply = match Command::parse(name, args)? {
            Command::Status => Reply::ok(self.status(caller).await?.render()),
            Command::Signal(on) => {
                self.set_automation(caller, on)?;
                Reply::ok(format!("Auto signals: {}", if on { "ON" } else { "OFF" }))
            }
            Command::Buy { symbol, risk } => {
                let outcome = self.manual_order(caller, &symbol, risk).await?;
                let text = render_outcome(&symbol, &outcome);
                match outcome.executed() {
                    Some(res) if !res.accepted => Reply {
                        kind: ReplyKind::Failed,
                        text,
                    },
                    _ => Reply::ok(text),
                }
            }
            Command::CloseAll(symbol) => {
                let symbol = match symbol {
                    Some(s) => s,
                    None => self
                        .state
                        .snapshot()
                        .instruments
                        .first()
                        .cloned()
                        .ok_or_else(|| ControlError::BadCommand("no instruments configured".into()))?,
                };
                let ok = self.flatten_all(caller, &symbol).await?;
                Reply::ok(format!("Close all {symbol}: {ok}"))
            }
            Command::Risk(pct) => {
                self.set_risk(caller, pct)?;
                Reply::ok(format!("Risk per trade: {pct}%"))
            }
        };
        Ok(reply)
    }
}
