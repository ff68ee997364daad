use std::env;
use std::str::FromStr;
use std::time::Duration;

use dotenv::dotenv;
use thiserror::Error;

use crate::services::bot_state::Mode;
use crate::services::indicators::IndicatorConfig;
use crate::services::risk::RiskConfig;
use crate::services::strategies::ema_cross::SignalConfig;
use crate::services::trading_engine::StrategyConfig;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{0} missing from env")]
    Missing(&'static str),
    #[error("{key} is invalid ({value:?}): {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub server_port: u16,
    pub mode: Mode,
    pub binance_api_key: String,
    pub binance_api_secret: String,
    pub binance_testnet: bool,
    pub operator_id: i64,
    pub command_hmac_secret: Option<String>,
    pub symbols: Vec<String>,
    pub default_leverage: u32,
    pub risk_percent: f64,
    pub signal_interval: String,
    pub kline_limit: usize,
    pub check_interval: Duration,
    pub automation_on_start: bool,
    pub qty_decimals: u32,
    pub indicators: IndicatorConfig,
    pub signal: SignalConfig,
    pub risk: RiskConfig,
}

/// No exchange quotes quantities or prices finer than this.
const MAX_DECIMALS: u32 = 18;

fn ensure<T: std::fmt::Display>(
    key: &'static str,
    value: T,
    ok: bool,
    reason: &str,
) -> Result<(), SettingsError> {
    if ok {
        Ok(())
    } else {
        Err(SettingsError::Invalid {
            key,
            value: value.to_string(),
            reason: reason.to_owned(),
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Typed access to a key/value source (the process env in production).
struct Source<F> {
    lookup: F,
}

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, SettingsError> {
        self.raw(key).ok_or(SettingsError::Missing(key))
    }

    fn parsed<T>(&self, key: &'static str, default: T) -> Result<T, SettingsError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.raw(key) {
            None => Ok(default),
            Some(v) => v.trim().parse().map_err(|e: T::Err| SettingsError::Invalid {
                key,
                value: v.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, SettingsError> {
        match self.raw(key) {
            None => Ok(default),
            Some(v) => parse_bool(&v).ok_or_else(|| SettingsError::Invalid {
                key,
                value: v.clone(),
                reason: "expected true/false".into(),
            }),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, SettingsError> {
        dotenv().ok(); // loads `.env` file automatically
        Self::from_lookup(|k| env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let src = Source { lookup };

        let mode: Mode = match src.raw("MODE") {
            None => Mode::Paper,
            Some(v) => v.parse().map_err(|reason| SettingsError::Invalid {
                key: "MODE",
                value: v.clone(),
                reason,
            })?,
        };

        let symbols: Vec<String> = src
            .raw("SYMBOLS")
            .unwrap_or_else(|| "BTCUSDT".into())
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if symbols.is_empty() {
            return Err(SettingsError::Invalid {
                key: "SYMBOLS",
                value: String::new(),
                reason: "at least one symbol required".into(),
            });
        }

        let risk_percent: f64 = src.parsed("RISK_PERCENT", 1.0)?;
        if !(risk_percent > 0.0 && risk_percent <= 100.0) {
            return Err(SettingsError::Invalid {
                key: "RISK_PERCENT",
                value: risk_percent.to_string(),
                reason: "must be in (0, 100]".into(),
            });
        }

        let default_leverage: u32 = src.parsed("DEFAULT_LEVERAGE", 10)?;
        if default_leverage == 0 {
            return Err(SettingsError::Invalid {
                key: "DEFAULT_LEVERAGE",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        let check_secs: u64 = src.parsed("CHECK_INTERVAL_SECS", 15)?;
        if check_secs == 0 {
            return Err(SettingsError::Invalid {
                key: "CHECK_INTERVAL_SECS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        let indicators = IndicatorConfig {
            fast: src.parsed("EMA_FAST", 18)?,
            slow: src.parsed("EMA_SLOW", 50)?,
            oscillator: src.parsed("RSI_PERIOD", 14)?,
            volatility: src.parsed("ATR_PERIOD", 14)?,
        };
        for (key, period) in [
            ("EMA_FAST", indicators.fast),
            ("EMA_SLOW", indicators.slow),
            ("RSI_PERIOD", indicators.oscillator),
            ("ATR_PERIOD", indicators.volatility),
        ] {
            ensure(key, period, period >= 1, "must be at least 1")?;
        }
        ensure(
            "EMA_FAST",
            indicators.fast,
            indicators.fast < indicators.slow,
            "must be below EMA_SLOW",
        )?;

        let kline_limit: usize = src.parsed("KLINE_LIMIT", 200)?;
        ensure(
            "KLINE_LIMIT",
            kline_limit,
            kline_limit >= indicators.min_len(),
            &format!("indicator lookbacks need at least {}", indicators.min_len()),
        )?;

        let qty_decimals: u32 = src.parsed("QTY_DECIMALS", 3)?;
        ensure(
            "QTY_DECIMALS",
            qty_decimals,
            qty_decimals <= MAX_DECIMALS,
            "must be at most 18",
        )?;

        let signal = SignalConfig {
            oscillator_max: src.parsed("RSI_MAX", 55.0)?,
        };
        ensure(
            "RSI_MAX",
            signal.oscillator_max,
            signal.oscillator_max > 0.0 && signal.oscillator_max <= 100.0,
            "must be in (0, 100]",
        )?;

        let risk = RiskConfig {
            atr_mult: src.parsed("ATR_MULT", 1.2)?,
            reward_multiple: src.parsed("REWARD_MULTIPLE", 3.0)?,
            price_decimals: src.parsed("PRICE_DECIMALS", 2)?,
        };
        ensure(
            "ATR_MULT",
            risk.atr_mult,
            risk.atr_mult > 0.0 && risk.atr_mult.is_finite(),
            "must be positive",
        )?;
        ensure(
            "REWARD_MULTIPLE",
            risk.reward_multiple,
            risk.reward_multiple > 0.0 && risk.reward_multiple.is_finite(),
            "must be positive",
        )?;
        ensure(
            "PRICE_DECIMALS",
            risk.price_decimals,
            risk.price_decimals <= MAX_DECIMALS,
            "must be at most 18",
        )?;

        Ok(Self {
            server_port: src.parsed("SERVER_PORT", 8080)?,
            binance_api_key: src.required("BINANCE_API_KEY")?,
            binance_api_secret: src.required("BINANCE_API_SECRET")?,
            binance_testnet: src.flag("BINANCE_TESTNET", mode == Mode::Paper)?,
            operator_id: src
                .required("OPERATOR_ID")?
                .trim()
                .parse()
                .map_err(|e: std::num::ParseIntError| SettingsError::Invalid {
                    key: "OPERATOR_ID",
                    value: src.raw("OPERATOR_ID").unwrap_or_default(),
                    reason: e.to_string(),
                })?,
            command_hmac_secret: src.raw("COMMAND_HMAC_SECRET"),
            symbols,
            default_leverage,
            risk_percent,
            signal_interval: src.raw("SIGNAL_INTERVAL").unwrap_or_else(|| "15m".into()),
            kline_limit,
            check_interval: Duration::from_secs(check_secs),
            automation_on_start: src.flag("AUTOMATION_ON_START", true)?,
            qty_decimals,
            indicators,
            signal,
            risk,
            mode,
        })
    }

    pub fn strategy(&self) -> StrategyConfig {
        StrategyConfig {
            interval: self.signal_interval.clone(),
            limit: self.kline_limit,
            indicators: self.indicators,
            signal: self.signal,
        }
    }
}
