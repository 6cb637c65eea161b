//! Client controller
//!
//! Wires the control channel to the tunnel pool and owns the configuration
//! both were started with.

use tracing::{error, info};

use crate::config::ClientConfig;
use crate::control::ControlChannel;
use crate::pool::TunnelPool;

/// The reverse-tunnel client.
pub struct NatClient {
    config: ClientConfig,
}

impl NatClient {
    pub fn new(config: ClientConfig) -> Self {
        Self { config }
    }

    /// Run the client until the surrounding task is cancelled.
    ///
    /// Without a server address and token there is nothing to connect to:
    /// one operator-facing error is logged and the client stays inert
    /// without failing the process.
    pub async fn run(self) {
        if !self.config.is_complete() {
            error!("relay server address or token not configured; tunnel client is inactive");
            return std::future::pending().await;
        }

        info!(server = %self.config.server_addr, "starting tunnel client");
        let pool = TunnelPool::spawn(self.config.clone());
        ControlChannel::new(self.config, pool).run().await;
    }
}
