//! airBuddy daemon
//!
//! Takes air-quality readings on a button press and on a background
//! schedule, logs them, and shows them on a small OLED panel.

mod config;
mod display;
mod engine;
mod input;
mod orchestrator;
mod reading;
mod records;
mod rendering;
mod scheduler;
mod state;
mod web;

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use display::Screen;
use state::AppState;

/// Button actions buffered while the controller is busy.
const ACTION_QUEUE: usize = 4;

#[derive(Parser, Debug)]
#[command(name = "airbuddyd", version, about = "airBuddy air-quality daemon")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    config: PathBuf,

    /// Use the simulated sensor instead of hardware
    #[arg(long)]
    simulate: bool,

    /// Disable background logging
    #[arg(long)]
    no_scheduler: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let args = Args::parse();

    // Load configuration
    let mut config = if args.config.exists() {
        let config = Config::load(&args.config).context("Failed to load configuration")?;
        info!("Loaded configuration from: {}", args.config.display());
        config
    } else {
        warn!(
            "Configuration {} not found, using defaults",
            args.config.display()
        );
        Config::default()
    };
    if args.simulate {
        config.sensor.simulate = true;
    }
    if args.no_scheduler {
        config.scheduler.enable = false;
    }

    // Initialize application state
    let (action_tx, action_rx) = mpsc::channel(ACTION_QUEUE);
    let state = Arc::new(AppState::new(&config, action_tx.clone())?);
    display::booter::run(
        state.presenter().as_ref(),
        config.display.boot_duration(),
        config.display.boot_frame(),
    )
    .await;

    if config.scheduler.enable {
        state.scheduler().start(config.scheduler.timing());
    } else {
        info!("Background logging disabled");
    }

    let cancel = CancellationToken::new();

    // Start foreground controller
    let orchestrator = state.orchestrator().clone();
    let controller = {
        let cancel = cancel.clone();
        tokio::spawn(async move { orchestrator.run(action_rx, cancel).await })
    };

    // Start button input
    input::spawn(&config.button, action_tx, cancel.clone())?;

    // Setup Unix signal handlers
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;

    // Optionally start web server
    if config.web.enable {
        let app = web::create_router(state.clone());
        let addr: SocketAddr = config
            .web
            .listen
            .parse()
            .context("Invalid listen address")?;
        let listener = TcpListener::bind(addr).await?;
        info!("Web server listening on http://{}", addr);

        tokio::select! {
            result = axum::serve(listener, app) => {
                result?;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down");
            }
        }
    } else {
        info!("Web server disabled");
        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down");
            }
        }
    }

    // Shutdown: controller first so it cannot re-pause the scheduler
    cancel.cancel();
    if let Err(e) = controller.await {
        warn!("Foreground controller ended abnormally: {}", e);
    }
    state.scheduler().stop().await;
    state.presenter().show(&Screen::Blank);

    Ok(())
}
