pub mod config;
pub mod middleware;
pub mod routes {
    pub mod commands;
    pub mod health;
}
pub mod services {
    pub mod bot_state;
    pub mod control;
    pub mod exchange;
    pub mod executor;
    pub mod indicators;
    pub mod risk;
    pub mod scheduler;
    pub mod trading_engine;

    pub mod binance;
    pub mod strategies {
        pub mod common;
        pub use common::{Candle, PriceSeries};
        pub mod ema_cross;
    }
}

pub mod utils;
