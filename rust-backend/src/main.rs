use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use futures_signal_bot::{
    config::settings::Settings,
    middleware::{metrics::Metrics, path_logger::PathLogger},
    routes::{commands::command_scope, commands::CommandAuth, health::health_scope},
    services::{
        binance::BinanceClient,
        bot_state::BotState,
        control::ControlSurface,
        exchange::{ExchangeApi, MarketData},
        executor::build_executor,
        risk::{floor_to_decimals, RiskSizer},
        scheduler::Scheduler,
        trading_engine::TradeEngine,
    },
};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let settings = Settings::new().context("failed to load settings")?;
    log::info!(
        "Starting futures-signal-bot: mode={} symbols={} leverage={}x",
        settings.mode,
        settings.symbols.join(","),
        settings.default_leverage
    );

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;

    // --- exchange: must be reachable before anything trades -------------
    let client = Arc::new(BinanceClient::new(&settings).context("failed to build Binance client")?);
    let equity = client
        .equity()
        .await
        .context("exchange unreachable at startup")?;
    log::info!("USDT balance: {equity:.2}");

    for symbol in &settings.symbols {
        if let Err(e) = client.set_leverage(symbol, settings.default_leverage).await {
            log::warn!("set_leverage {symbol} failed: {e}");
        }
    }

    let exchange: Arc<dyn ExchangeApi> = client.clone();
    let market: Arc<dyn MarketData> = client;

    // --- engine + shared state ------------------------------------------
    let engine = Arc::new(TradeEngine::new(
        market,
        RiskSizer::new(
            exchange.clone(),
            floor_to_decimals(settings.qty_decimals),
            settings.risk,
        ),
        build_executor(settings.mode, exchange.clone()),
        settings.strategy(),
    ));
    let state = Arc::new(BotState::new(
        settings.mode,
        settings.automation_on_start,
        settings.symbols.clone(),
        settings.default_leverage,
        settings.risk_percent,
    ));

    // --- scheduler ------------------------------------------------------
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = Scheduler::new(state.clone(), engine.clone(), settings.check_interval)
        .spawn(shutdown_rx);

    // --- command channel ------------------------------------------------
    if settings.command_hmac_secret.is_none() {
        log::warn!("COMMAND_HMAC_SECRET not set; command signatures are not checked");
    }
    let control = web::Data::new(ControlSurface::new(
        settings.operator_id,
        state,
        engine,
        exchange,
    ));
    let auth = web::Data::new(CommandAuth {
        hmac_secret: settings.command_hmac_secret.clone(),
    });
    let prometheus = web::Data::new(prometheus);

    let port = settings.server_port;
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(PathLogger)
            .wrap(Metrics)
            .app_data(control.clone())
            .app_data(auth.clone())
            .app_data(prometheus.clone())
            // "/api" before the catch-all "" scope
            .service(command_scope())
            .service(health_scope())
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await?;

    // --- shutdown: let an in-flight cycle finish its submissions --------
    log::info!("HTTP server stopped; waiting for scheduler");
    let _ = shutdown_tx.send(true);
    scheduler.await.context("scheduler task failed")?;
    log::info!("bye");
    Ok(())
}
