mod args;

use std::{process::ExitCode, time::Duration};

use anyhow::{Context as _, Result};
use args::Args;
use clap::Parser as _;
use env_logger::Env;
use hue_sensor_stats::{
    app_config::Config,
    hue::{BridgeClient, SensorSelector, new_http_client},
    poll::{Iterations, PollLoop},
    store::{PersistenceWriter, Store},
};
use log::{debug, error, info};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().filter_or("LOGLEVEL", "info")).init();

    if let Err(e) = run().await {
        error!("{e:#}");
        return ExitCode::from(1);
    }

    ExitCode::from(0)
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load configuration: {:?}", args.config))?;
    debug!("Configuration: {config:#?}");

    let sleep = config
        .sleep_interval(u64::try_from(args.sleep).ok())
        .context("failed to determine sleep interval")?;

    let http = new_http_client(Duration::from_secs(config.hue_bridge.timeout_secs))
        .context("failed to build HTTP client")?;

    let bridge = BridgeClient::new(
        config.hue_bridge.url.as_str(),
        config.hue_bridge.user_key.as_str(),
        config.retry.fetch_policy(),
        http.clone(),
    );

    let store = Store::from_config(config.store_backend, &config.influx_db, http);
    let writer = PersistenceWriter::new(store, config.retry.store_policy());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    // Querying all sensors; per-sensor endpoints are available via SensorSelector::Id
    let mut poll = PollLoop::new(
        bridge,
        writer,
        SensorSelector::All,
        Iterations::from_count(args.iterations),
        sleep,
    );

    let summary = poll
        .run(shutdown_rx)
        .await
        .context("main processing loop failed")?;

    info!(
        "Stopped after {} iterations, {} values persisted",
        summary.cycles, summary.persisted
    );

    Ok(())
}
