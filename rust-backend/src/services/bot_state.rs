//! Process-wide bot state shared by the scheduler (reader) and the control
//! surface (sole writer).
//!
//! All mutable fields sit behind one lock so a reader always sees a
//! consistent snapshot; a tick may act on a value that is one tick stale.

use std::fmt;
use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Orders are logged and journaled, never sent.
    Paper,
    Live,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Paper => f.write_str("paper"),
            Mode::Live => f.write_str("live"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "paper" | "simulated" | "demo" => Ok(Mode::Paper),
            "live" => Ok(Mode::Live),
            other => Err(format!("unknown mode '{other}' (expected paper or live)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BotSnapshot {
    pub mode: Mode,
    pub automation_enabled: bool,
    pub instruments: Vec<String>,
    pub leverage: u32,
    pub risk_percent: f64,
}

#[derive(Debug)]
struct Inner {
    automation_enabled: bool,
    instruments: Vec<String>,
    leverage: u32,
    risk_percent: f64,
}

#[derive(Debug)]
pub struct BotState {
    mode: Mode,
    inner: RwLock<Inner>,
}

impl BotState {
    pub fn new(
        mode: Mode,
        automation_enabled: bool,
        instruments: Vec<String>,
        leverage: u32,
        risk_percent: f64,
    ) -> Self {
        Self {
            mode,
            inner: RwLock::new(Inner {
                automation_enabled,
                instruments,
                leverage,
                risk_percent,
            }),
        }
    }

    /// Fixed at construction for the life of the process.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn snapshot(&self) -> BotSnapshot {
        let g = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        BotSnapshot {
            mode: self.mode,
            automation_enabled: g.automation_enabled,
            instruments: g.instruments.clone(),
            leverage: g.leverage,
            risk_percent: g.risk_percent,
        }
    }

    pub fn automation_enabled(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .automation_enabled
    }

    pub fn set_automation(&self, enabled: bool) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .automation_enabled = enabled;
    }

    /// Caller validates the range.
    pub fn set_risk_percent(&self, percent: f64) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .risk_percent = percent;
    }
}
