//! Control channel message types

use serde::{Deserialize, Serialize};

/// Messages exchanged on the control channel, one JSON document per frame.
///
/// The server keys every message on a `type` field. Types this client does
/// not understand decode to [`ControlMessage::Unknown`] so the channel can
/// log and drop them instead of treating them as protocol errors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Liveness probe, in either direction. Carries no payload.
    Ping,
    /// Configuration push from the server.
    Setting { setting: TunnelSettings },
    /// A `type` value this client does not recognize.
    #[serde(other)]
    Unknown,
}

/// Tunnel configuration delivered over the control channel.
///
/// `domain` identifies the exposed service on the relay; `local_ip` and
/// `local_port` name the service reachable from this client's network.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TunnelSettings {
    pub domain: String,
    pub local_ip: String,
    pub local_port: u16,
}

impl TunnelSettings {
    /// Dial string for the local service.
    pub fn local_addr(&self) -> String {
        format!("{}:{}", self.local_ip, self.local_port)
    }
}
