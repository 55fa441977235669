use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use beacon_relay::bus::StdioBus;
use beacon_relay::bus::stdio::read_inbound;
use beacon_relay::{BeaconRelay, BluestRadio, RelayConfig, logging};
use clap::Parser;
use log::{LevelFilter, info};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Relays BLE beacon advertisements to subscribed apps over a JSON-lines bus on stdin/stdout.
#[derive(Parser, Debug)]
#[command(name = "beacon-relay", version, about)]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, env = "BEACON_RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Adaptor id assigned by the host (overrides the config file)
    #[arg(long)]
    id: Option<String>,

    /// Adaptor name assigned by the host (overrides the config file)
    #[arg(long)]
    name: Option<String>,

    /// Write the effective config (file values plus overrides) to --config and exit
    #[arg(long, requires = "config")]
    write_config: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cli_level = logging::verbosity_level(cli.verbose);
    logging::init(cli_level.unwrap_or(LevelFilter::Info))?;

    let rt = tokio::runtime::Runtime::new()?;
    let result = rt.block_on(run(cli, cli_level));
    // The stdin reader may still be parked in a blocking read
    rt.shutdown_timeout(Duration::from_millis(500));
    result
}

async fn run(cli: Cli, cli_level: Option<LevelFilter>) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => RelayConfig::load_config(path).await?,
        None => RelayConfig::default(),
    };
    if let Some(id) = cli.id {
        config.adaptor.id = id;
    }
    if let Some(name) = cli.name {
        config.adaptor.name = name;
    }
    config.validate()?;
    if cli.write_config {
        if let Some(path) = &cli.config {
            config.save_config(path).await?;
        }
        return Ok(());
    }
    if cli_level.is_none() {
        logging::set_level(config.log_level_filter()?);
    }

    let (bus, writer) = StdioBus::spawn();
    let bus = Arc::new(bus);
    let radio = BluestRadio::new(config.scan.min_rssi);
    let relay = BeaconRelay::new(&config, bus.clone(), radio);

    let shutdown = CancellationToken::new();
    let (inbound_tx, inbound_rx) = mpsc::channel(64);
    let reader = tokio::spawn(read_inbound(inbound_tx, shutdown.clone()));

    let ctrl_c_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, shutting down");
            ctrl_c_token.cancel();
        }
    });

    info!("Starting beacon relay {} ({})", config.adaptor.id, config.adaptor.name);
    relay.run(inbound_rx, shutdown.clone()).await;

    shutdown.cancel();
    reader.abort();
    drop(bus);
    let _ = writer.await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_config_needs_a_path() {
        assert!(Cli::try_parse_from(["beacon-relay", "--write-config"]).is_err());

        let cli =
            Cli::try_parse_from(["beacon-relay", "--write-config", "-c", "relay.json", "-vv"])
                .unwrap();
        assert!(cli.write_config);
        assert_eq!(cli.config, Some(PathBuf::from("relay.json")));
        assert_eq!(cli.verbose, 2);
    }

    #[tokio::test]
    async fn write_config_saves_overrides_and_exits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("relay.json");
        let cli = Cli::try_parse_from([
            "beacon-relay",
            "--write-config",
            "--config",
            path.to_str().unwrap(),
            "--id",
            "relay_7",
        ])
        .unwrap();

        run(cli, None).await.unwrap();

        let saved = RelayConfig::load_config(&path).await.unwrap();
        assert_eq!(saved.adaptor.id, "relay_7");
        assert_eq!(saved.scan, RelayConfig::default().scan);
    }
}
