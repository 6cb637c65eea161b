//! NatLink - reverse tunnel client CLI
//!
//! This binary runs the NatLink tunnel client, which registers with a public
//! relay server and exposes a locally reachable TCP service to the outside
//! world without inbound port-forwarding.

use anyhow::{Context, Result};
use clap::Parser;
use natlink_client::{ClientConfig, NatClient};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// NatLink reverse tunnel client - exposes a local TCP service through a public relay
#[derive(Parser, Debug)]
#[command(name = "natlink")]
#[command(about = "NatLink reverse tunnel client - exposes a local TCP service through a public relay")]
#[command(version)]
#[command(long_about = r#"
NatLink connects out to a public relay server and keeps a pool of tunnel
connections ready. The relay pushes the tunnel configuration (which domain to
serve and where the local service lives) over the control channel; incoming
requests are piped into the local service without any inbound
port-forwarding.

EXAMPLES:
  # Start the client against a relay
  natlink --server relay.example.com:8080 --token $TOKEN

  # Start the client using a config file
  natlink --config natlink.yaml

  # Raise log verbosity
  natlink --config natlink.yaml --log-level debug

ENVIRONMENT VARIABLES:
  NATLINK_SERVER   Relay server address (host:port)
  NATLINK_TOKEN    Client token
"#)]
struct Args {
    /// Relay server address (e.g., relay.example.com:8080)
    #[arg(long, env = "NATLINK_SERVER")]
    server: Option<String>,

    /// Client token, forwarded verbatim to the relay
    #[arg(long, env = "NATLINK_TOKEN")]
    token: Option<String>,

    /// Configuration file (YAML)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Configuration file format
#[derive(Debug, Default, Serialize, Deserialize)]
struct ConfigFile {
    /// Relay server configuration
    #[serde(default)]
    server: ServerSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ServerSection {
    /// Relay server address
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<String>,

    /// Environment variable name holding the token
    #[serde(skip_serializing_if = "Option::is_none")]
    token_env: Option<String>,

    /// Direct token (prefer using token_env)
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

/// Setup logging with the specified log level
fn setup_logging(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(log_level)
        .with_context(|| format!("Invalid log level: {}", log_level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(false))
        .with(filter)
        .init();

    Ok(())
}

/// Load configuration from YAML file
fn load_config_file(path: &PathBuf) -> Result<ConfigFile> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: ConfigFile = serde_yaml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    Ok(config)
}

/// Merge CLI args with the config file, giving precedence to CLI args.
///
/// A missing server address or token is not an error here: the core logs the
/// operator-facing message and stays inert, matching a deployment where the
/// relay details arrive later.
fn build_client_config(args: &Args) -> Result<ClientConfig> {
    let mut server = String::new();
    let mut token = String::new();

    if let Some(path) = &args.config {
        info!("Loading configuration from: {}", path.display());
        let file = load_config_file(path)?;

        if let Some(address) = file.server.address {
            server = address;
        }
        if let Some(env_var) = &file.server.token_env {
            token = std::env::var(env_var)
                .with_context(|| format!("Environment variable {} not set", env_var))?;
        } else if let Some(direct) = file.server.token {
            token = direct;
        }
    }

    // CLI args override the config file
    if let Some(s) = &args.server {
        server = s.clone();
    }
    if let Some(t) = &args.token {
        token = t.clone();
    }

    if !server.is_empty() {
        validate_address(&server)?;
    }
    if server.is_empty() || token.is_empty() {
        warn!("Relay server address or token missing; the client will stay inactive until configured");
    }

    Ok(ClientConfig::new(server, token))
}

/// Validate address format (should be host:port)
fn validate_address(addr: &str) -> Result<()> {
    let parts: Vec<&str> = addr.rsplitn(2, ':').collect();
    if parts.len() != 2 {
        anyhow::bail!("Invalid relay address format: '{}' (expected format: host:port)", addr);
    }

    // parts are reversed: parts[1] is the host, parts[0] the port
    if parts[1].is_empty() {
        anyhow::bail!("Invalid relay address format: '{}' (host cannot be empty)", addr);
    }

    parts[0]
        .parse::<u16>()
        .with_context(|| format!("Invalid port in relay address: {}", addr))?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args.log_level)?;

    info!("NatLink client starting...");

    let config = build_client_config(&args).context("Failed to build client configuration")?;
    if config.is_complete() {
        info!("Relay: {}", config.server_addr);
    }

    let client = NatClient::new(config);

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = client.run() => {}
    }

    info!("Client stopped");
    Ok(())
}
