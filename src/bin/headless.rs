//! webviz-headless binary
//!
//! Connects to a running ARGoS webviz server, drives the sync core against
//! an in-memory scene and logs what it sees. Useful for checking a server
//! without a browser.
//!
//! ## Configuration (env / TOML via `config` crate)
//!
//! | Key                            | Default     | Description                  |
//! |--------------------------------|-------------|------------------------------|
//! | `WEBVIZ_HOST`                  | `localhost` | Simulator host               |
//! | `WEBVIZ_PORT`                  | `3000`      | Simulator port               |
//! | `WEBVIZ_SECURE`                | `false`     | Use `wss://`                 |
//! | `WEBVIZ_FRAME_RATE_HZ`         | `30`        | Reconciliation frame rate    |
//! | `WEBVIZ_STATUS_INTERVAL_SECS`  | `5`         | Status line period           |
//! | `WEBVIZ_LOG_CAPACITY`          | `500`       | Lines kept per log pane      |
//!
//! CLI flags override both.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use argos_webviz::{
    protocol::Command,
    session::SnapshotArrival,
    transport, AssetOutcome, KindRegistry, ReconnectPolicy, SceneRecorder, SceneSession,
    SessionNotice, ViewerConfig,
};
use clap::Parser;
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "webviz-headless", about = "Headless ARGoS webviz viewer", version)]
struct Args {
    /// Optional TOML configuration file
    #[arg(long, env = "WEBVIZ_CONFIG")]
    config: Option<PathBuf>,

    /// Simulator host
    #[arg(long)]
    host: Option<String>,

    /// Simulator port
    #[arg(long)]
    port: Option<u16>,

    /// Connect with wss://
    #[arg(long)]
    secure: bool,

    /// Frame rate (Hz)
    #[arg(long)]
    frame_rate_hz: Option<f32>,

    /// Command to send once connected, e.g. `play` or `fastforward:50`
    /// (repeatable)
    #[arg(long = "command", short = 'c')]
    commands: Vec<String>,
}

impl Args {
    fn into_config(self) -> Result<(ViewerConfig, Vec<Command>)> {
        let mut cfg = ViewerConfig::load(self.config.as_deref()).context("loading configuration")?;
        if let Some(host) = self.host {
            cfg.host = host;
        }
        if let Some(port) = self.port {
            cfg.port = port;
        }
        if self.secure {
            cfg.secure = true;
        }
        if let Some(rate) = self.frame_rate_hz {
            cfg.frame_rate_hz = rate;
        }
        cfg.validate().context("validating configuration")?;

        let commands = self
            .commands
            .iter()
            .map(|c| c.parse::<Command>())
            .collect::<Result<Vec<_>, _>>()
            .context("parsing --command")?;
        Ok((cfg, commands))
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialise logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("argos_webviz=debug".parse()?),
        )
        .init();

    let (cfg, mut startup_commands) = Args::parse().into_config()?;
    let endpoint = cfg.endpoint();
    info!("Starting webviz-headless ({endpoint}, {} Hz)", cfg.frame_rate_hz);

    let mut session =
        SceneSession::with_parts(SceneRecorder::new(), KindRegistry::standard(), cfg.log_capacity);
    let mut link = transport::spawn(endpoint, ReconnectPolicy::default());

    let mut frames = tokio::time::interval(cfg.frame_interval());
    let mut status = tokio::time::interval(Duration::from_secs(cfg.status_interval_secs.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted, shutting down");
                break;
            }

            _ = frames.tick() => {
                for event in link.poll() {
                    if session.handle_transport(event) == Some(SnapshotArrival::First) {
                        info!("First broadcast received, building scene");
                    }
                }

                for notice in session.drain_notices() {
                    info!("{notice}");
                    if notice == SessionNotice::Connected {
                        for command in startup_commands.drain(..) {
                            if let Err(e) = session.send(command) {
                                warn!("Startup command refused: {e}");
                            }
                        }
                    }
                }

                session.frame();

                // No renderer: every asset "loads" as soon as it is requested.
                for (ticket, url) in session.backend_mut().take_asset_requests() {
                    debug!("Asset {url} ready");
                    session.asset_loaded(ticket, AssetOutcome::Loaded);
                }

                for command in session.drain_outbox() {
                    link.send(command);
                }

                if link.is_finished() {
                    for event in link.poll() {
                        session.handle_transport(event);
                    }
                    warn!("Transport gave up, exiting");
                    break;
                }
            }

            _ = status.tick() => {
                info!("{}", session.stats());
            }
        }
    }

    link.shutdown().await;
    session.teardown();
    info!("Final state: {}", session.stats());
    Ok(())
}
