// src/utils/errors.rs

use thiserror::Error;

/// Errors coming from external collaborator calls (exchange REST, JSON decoding).
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// The exchange answered but rejected the request.
    #[error("exchange rejected request ({code}): {msg}")]
    Exchange { code: i64, msg: String },
    #[error("{0}")]
    Other(String),
}

/// Errors at the trading-engine level: wraps ApiError plus validation issues.
#[derive(Debug, Error)]
pub enum TradeError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    /// Price history too short (or empty) for the configured lookbacks.
    #[error("insufficient data for {symbol}: have {have} candles, need {need}")]
    InsufficientData {
        symbol: String,
        have: usize,
        need: usize,
    },
    #[error("{0}")]
    Other(String),
}

/// Errors returned to the operator by the control surface.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("Not authorized.")]
    Unauthorized,
    #[error("bad command: {0}")]
    BadCommand(String),
    #[error(transparent)]
    Trade(#[from] TradeError),
}
