//! # hubbub
//!
//! Relay server binary: loads settings, picks the scaling backends, wires the
//! demo lobby engine into a hub and serves WebSockets until Ctrl-C.

#![deny(unsafe_code)]

mod lobby;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hubbub_core::ConnectionId;
use hubbub_scaling::BucketStatus;
use hubbub_server::{codec, ConnectRequest, Hub, HubConfig, ServerConfig};
use hubbub_settings::{HubbubSettings, ScalingMode};
use hubbub_telemetry::{init_telemetry, TelemetryConfig};

use crate::lobby::LobbyEngine;

/// WebSocket event relay.
#[derive(Parser, Debug)]
#[command(name = "hubbub", about = "WebSocket event relay server")]
struct Cli {
    /// Settings file (defaults to `~/.hubbub/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Port to bind (0 for auto-assign). Overrides settings.
    #[arg(long)]
    port: Option<u16>,

    /// Scaling mode: SINGLETON, COLOCATED or DISTRIBUTED. Overrides settings.
    #[arg(long)]
    scale: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Run the relay server (default).
    Serve,
    /// Create the JetStream group bucket if it does not exist.
    InitBucket,
}

impl Cli {
    fn load_settings(&self) -> Result<HubbubSettings> {
        let mut settings = match &self.config {
            Some(path) => hubbub_settings::load_settings_from_path(path)
                .with_context(|| format!("Failed to load settings from {}", path.display()))?,
            None => hubbub_settings::load_settings().context("Failed to load settings")?,
        };
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(scale) = &self.scale {
            settings.scaling.mode = scale
                .parse::<ScalingMode>()
                .with_context(|| format!("Invalid --scale value: {scale}"))?;
        }
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;

    let telemetry = init_telemetry(TelemetryConfig::from_level_str(
        &settings.logging.level,
        settings.logging.json,
    ));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(settings, telemetry.metrics()).await,
        Command::InitBucket => init_bucket(&settings).await,
    }
}

async fn serve(
    settings: HubbubSettings,
    metrics: Arc<hubbub_telemetry::MetricsRecorder>,
) -> Result<()> {
    tracing::info!(mode = %settings.scaling.mode, "Starting hubbub");

    let backends = hubbub_scaling::select_backends(&settings.scaling, Arc::clone(&metrics))
        .await
        .context("Failed to initialize scaling backends")?;

    let engine = Arc::new(LobbyEngine::new());
    let (serializer, deserializer) = codec::json_shell();
    let lobbies = Arc::clone(&engine);
    let cleanup = backends.clone();
    let config = HubConfig {
        serializer,
        deserializer,
        disconnect_hook: Arc::new(move |id: &ConnectionId, _request: &ConnectRequest| {
            let lobbies = Arc::clone(&lobbies);
            let backends = cleanup.clone();
            let id = id.clone();
            tokio::spawn(async move { lobbies.release(&backends, id.as_str()).await });
        }),
        ..HubConfig::from_settings(&settings.server)
    };

    let hub = Hub::builder(engine)
        .config(config)
        .backends(backends)
        .metrics(metrics)
        .build();

    let server_config = ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
        mode: settings.scaling.mode.to_string(),
    };
    let handle = hubbub_server::start(server_config, hub)
        .await
        .context("Failed to start server")?;

    tracing::info!(port = handle.port, "hubbub ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!("Shutting down");
    handle.shutdown().await;
    Ok(())
}

async fn init_bucket(settings: &HubbubSettings) -> Result<()> {
    let nats = &settings.scaling.nats;
    let client = hubbub_scaling::connect(&nats.address)
        .await
        .context("Failed to connect to NATS")?;
    match hubbub_scaling::provision_bucket(client, nats)
        .await
        .context("Failed to provision group bucket")?
    {
        BucketStatus::Existing => println!("bucket {} already exists", nats.group_bucket),
        BucketStatus::Created => println!("created bucket {}", nats.group_bucket),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_serve() {
        let cli = Cli::try_parse_from(["hubbub"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.port.is_none());
    }

    #[test]
    fn parses_overrides_and_subcommand() {
        let cli = Cli::try_parse_from([
            "hubbub",
            "--port",
            "9000",
            "--scale",
            "colocated",
            "init-bucket",
        ])
        .unwrap();
        assert_eq!(cli.port, Some(9000));
        assert_eq!(cli.scale.as_deref(), Some("colocated"));
        assert_eq!(cli.command, Some(Command::InitBucket));
    }

    #[test]
    fn cli_overrides_win_over_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"server": {"port": 7000}, "scaling": {"mode": "SINGLETON"}}"#)
            .unwrap();

        let cli = Cli::try_parse_from([
            "hubbub",
            "--config",
            path.to_str().unwrap(),
            "--port",
            "9000",
            "--scale",
            "COLOCATED",
        ])
        .unwrap();
        let settings = cli.load_settings().unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.scaling.mode, ScalingMode::Colocated);
    }

    #[test]
    fn bad_scale_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{}").unwrap();
        let cli = Cli::try_parse_from([
            "hubbub",
            "--config",
            path.to_str().unwrap(),
            "--scale",
            "HUGE",
        ])
        .unwrap();
        assert!(cli.load_settings().is_err());
    }
}
