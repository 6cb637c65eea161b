//! Control channel
//!
//! The single long-lived connection to the relay. The server pushes tunnel
//! configuration and liveness pings over it; the client answers with its own
//! heartbeat so intermediaries never see the connection as idle. Losing the
//! control channel costs the client its configuration feed, so it redials
//! for as long as the process lives, on a fixed pause and without backoff.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use natlink_proto::{handshake, ControlMessage, FrameCodec, FrameError};

use crate::config::ClientConfig;
use crate::pool::PoolHandle;

/// Control channel errors
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("failed to encode heartbeat: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The connection carrying configuration pushes and heartbeats.
pub struct ControlChannel {
    config: ClientConfig,
    pool: PoolHandle,
}

impl ControlChannel {
    pub fn new(config: ClientConfig, pool: PoolHandle) -> Self {
        Self { config, pool }
    }

    /// Run forever: dial, handshake, serve; redial after any disconnect.
    pub async fn run(self) {
        loop {
            match self.connect_and_serve().await {
                Ok(()) => info!("control channel closed by server"),
                Err(e) => warn!(error = %e, "control channel failed"),
            }
            time::sleep(self.config.control_reconnect_delay).await;
        }
    }

    async fn connect_and_serve(&self) -> Result<(), ControlError> {
        let mut stream = TcpStream::connect(&self.config.server_addr).await?;
        let header = handshake::control_handshake(&self.config.server_addr, &self.config.token);
        stream.write_all(header.as_bytes()).await?;
        info!(server = %self.config.server_addr, "control channel established");

        let mut framed = Framed::new(stream, FrameCodec);
        let mut heartbeat = time::interval(self.config.heartbeat_interval);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the heartbeat cadence starts
        // one interval from now.
        heartbeat.tick().await;

        loop {
            tokio::select! {
                frame = framed.next() => match frame {
                    Some(Ok(payload)) => self.dispatch(&payload).await,
                    Some(Err(e)) => return Err(e.into()),
                    None => return Ok(()),
                },
                _ = heartbeat.tick() => {
                    let ping = serde_json::to_vec(&ControlMessage::Ping)?;
                    framed.send(Bytes::from(ping)).await?;
                    debug!("heartbeat sent");
                }
            }
        }
    }

    async fn dispatch(&self, payload: &[u8]) {
        match serde_json::from_slice::<ControlMessage>(payload) {
            Ok(ControlMessage::Ping) => {
                // Server liveness probe; nothing to do.
            }
            Ok(ControlMessage::Setting { setting }) => {
                info!(
                    domain = %setting.domain,
                    target = %setting.local_addr(),
                    "received tunnel configuration"
                );
                self.pool.reconfigure(setting).await;
            }
            Ok(ControlMessage::Unknown) => {
                warn!(
                    payload = %String::from_utf8_lossy(payload),
                    "unknown control message type"
                );
            }
            Err(e) => {
                error!(
                    payload = %String::from_utf8_lossy(payload),
                    error = %e,
                    "unparseable control message"
                );
            }
        }
    }
}
