//! Reverse tunnel client library
//!
//! Connects out to a public relay, keeps a pool of pre-established tunnel
//! connections ready, and pipes relayed requests into a locally reachable
//! TCP service — no inbound port-forwarding required. The relay address and
//! token come from the operator; which domain to serve and where the local
//! service lives are pushed by the server over the control channel.

pub mod backoff;
pub mod client;
pub mod config;
pub mod control;
pub mod metrics;
mod pipe;
pub mod pool;
mod tunnel;

pub use backoff::FailureCounter;
pub use client::NatClient;
pub use config::ClientConfig;
pub use control::{ControlChannel, ControlError};
pub use metrics::PoolMetrics;
pub use pool::{PoolHandle, TunnelPool};

pub use natlink_proto::{ControlMessage, TunnelSettings};
