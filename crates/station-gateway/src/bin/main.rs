//! Base station diagnostic core gateway binary: accepts device TCP
//! connections, speaks the §4.1 frame protocol, and drives `StationCore`'s
//! healing tick loop.

use clap::{Arg, ArgAction, Command};
use station_common::Config;
use station_gateway::{run_session, DeviceFrameHandler, StationCore};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = Command::new("station-gateway")
        .version(env!("CARGO_PKG_VERSION"))
        .about("AI-assisted diagnostic and self-healing core for a cellular base station fleet")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .required(false),
        )
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDRESS")
                .help("Bind address (overrides config)")
                .required(false),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable debug logging regardless of config")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let mut config = load_config(matches.get_one::<String>("config"))?;
    if let Some(bind) = matches.get_one::<String>("bind") {
        config.gateway.bind_addr = bind.clone();
    }
    if matches.get_flag("verbose") {
        config.telemetry.log_level = "debug".to_string();
    }

    station_telemetry::init_tracing(&config)?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting station-gateway");
    info!(bind_addr = %config.gateway.bind_addr, "binding device listener");

    let core = Arc::new(StationCore::new(&config));
    let handler = Arc::new(DeviceFrameHandler::new(core.clone()));
    let (event_tx, _) = broadcast::channel::<station_gateway::Frame>(256);

    let tick_interval = Duration::from_millis(config.healing.tick_interval_ms);
    let tick_core = core.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(tick_interval);
        loop {
            ticker.tick().await;
            let completed = tick_core.tick(chrono::Utc::now()).await;
            if !completed.is_empty() {
                info!(count = completed.len(), "healing actions completed this tick");
            }
        }
    });

    let listener = TcpListener::bind(&config.gateway.bind_addr).await?;
    let read_timeout = Duration::from_secs(config.gateway.read_timeout_seconds);

    let mut shutdown = std::pin::pin!(tokio::signal::ctrl_c());
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, remote) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(%e, "accept failed");
                        continue;
                    }
                };
                info!(%remote, "device connected");
                let handler = handler.clone();
                let events = event_tx.subscribe();
                tokio::spawn(async move {
                    if let Err(e) = run_session(stream, handler, events, read_timeout).await {
                        error!(%remote, %e, "session ended with error");
                    } else {
                        info!(%remote, "session closed");
                    }
                });
            }
            _ = &mut shutdown => {
                info!("received shutdown signal, stopping listener");
                break;
            }
        }
    }

    Ok(())
}

fn load_config(config_path: Option<&String>) -> Result<Config, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => Ok(Config::from_file(path)?),
        None => Config::from_env().map_err(Into::into),
    }
}
