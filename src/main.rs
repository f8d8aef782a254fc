//! Domoticz sensor node - main entry point
//!
//! `run` (the default) provisions the node and reports samples until
//! interrupted. `discover` resolves the server location once and prints it.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use domoticz_sensor_node::{
    discovery::DiscoveryTransport,
    logging::{init_logging, LogConfig},
    network,
    sensor::IioSensor,
    DomoticzClient, Node, NodeConfig,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn, Level};
use url::Url;

/// Domoticz sensor node configuration
#[derive(Parser, Debug)]
#[command(name = "domoticz-sensor-node")]
#[command(about = "Temperature/humidity node that registers itself with Domoticz")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Discovery service name (overrides DOMOTICZ_SERVICE_NAME)
    #[arg(long, global = true)]
    service_name: Option<String>,

    /// Fixed server URL, skipping discovery (overrides DOMOTICZ_URL)
    #[arg(long, global = true)]
    url: Option<Url>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Provision and report until interrupted
    Run,
    /// Resolve the server location once and print it
    Discover {
        /// Give up after this many seconds
        #[arg(long, default_value = "10")]
        timeout: u64,
    },
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<NodeConfig> {
        let mut config = NodeConfig::from_env().context("Loading configuration")?;
        if let Some(service_name) = &self.service_name {
            config.service_name = service_name.clone();
        }
        if let Some(url) = &self.url {
            config.static_url = Some(url.clone());
        }
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env();
    if cli.debug {
        log_config.level = Level::DEBUG;
    }
    init_logging(log_config)?;

    let config = cli.load_config()?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Discover { timeout } => discover(&config, Duration::from_secs(timeout)).await,
    }
}

async fn run(config: NodeConfig) -> anyhow::Result<()> {
    info!(
        "Starting node {} (hardware {}) v{}",
        config.node_id,
        config.hardware_name(),
        env!("CARGO_PKG_VERSION")
    );

    if !network::ensure_connected(&config.ap_name()) {
        bail!("Network join failed for {}", config.ap_name());
    }

    let api = Arc::new(DomoticzClient::new(config.http_timeout, &config.api_endpoint)?);
    let transport = discovery_transport(&config)?;
    let sensor = Box::new(IioSensor::from_config(&config.sensor));
    info!("Reading sensor at {}", sensor.device().display());

    let mut node = Node::from_config(&config, api, transport, sensor)?;
    node.run_until(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    })
    .await;

    info!("Node stopped in state {}", node.state());
    Ok(())
}

#[cfg(feature = "discovery")]
fn discovery_transport(_config: &NodeConfig) -> anyhow::Result<Box<dyn DiscoveryTransport>> {
    Ok(Box::new(domoticz_sensor_node::discovery::MdnsTransport::new()?))
}

#[cfg(not(feature = "discovery"))]
fn discovery_transport(config: &NodeConfig) -> anyhow::Result<Box<dyn DiscoveryTransport>> {
    use domoticz_sensor_node::discovery::DiscoveryAnswer;
    use domoticz_sensor_node::NodeError;

    /// Stand-in when built without mDNS; only valid with a static URL
    struct NoDiscovery;

    impl DiscoveryTransport for NoDiscovery {
        fn send(&mut self, _query_name: &str) -> domoticz_sensor_node::Result<()> {
            Err(NodeError::discovery("built without the discovery feature"))
        }

        fn poll_answers(&mut self) -> Vec<DiscoveryAnswer> {
            Vec::new()
        }
    }

    if config.static_url.is_none() {
        bail!("Built without mDNS discovery; set DOMOTICZ_URL or --url");
    }
    Ok(Box::new(NoDiscovery))
}

async fn discover(config: &NodeConfig, timeout: Duration) -> anyhow::Result<()> {
    use domoticz_sensor_node::ServiceLocation;

    let mut transport = discovery_transport(config)?;
    let mut locator = config.locator()?;
    let mut location = match config.static_location()? {
        Some(location) => location,
        None => ServiceLocation::default(),
    };

    let deadline = tokio::time::Instant::now() + timeout;
    while !location.is_complete() {
        if tokio::time::Instant::now() >= deadline {
            bail!(
                "No complete answer for {} within {timeout:?}, missing {}",
                locator.service_name(),
                location.missing_fields().join(", ")
            );
        }
        if locator.query_due() {
            locator.begin_query(transport.as_mut())?;
        }
        locator.process_pending(transport.as_mut(), &mut location);
        tokio::time::sleep(Duration::from_millis(250)).await;
    }

    println!("{}", serde_json::to_string_pretty(&location)?);
    println!("{}", location.base_url()?);
    Ok(())
}
