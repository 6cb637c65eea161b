//! Per-socket tunnel connection state machine
//!
//! Each tunnel connection runs as one task covering its whole lifecycle:
//! dial the relay, send the tunnel handshake, sit idle until the relay routes
//! a request through the socket, then pipe bytes to the local service until
//! either side closes. A byte-count watchdog recycles connections that see a
//! full idle window with no transfer in either direction.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use natlink_proto::{handshake, TunnelSettings};

use crate::config::ClientConfig;
use crate::pipe::{self, PipeOutcome};
use crate::pool::PoolMsg;

/// Lifecycle states of a tunnel connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TunnelState {
    Connecting,
    Idle,
    Active,
    Closed,
}

/// Byte-count watchdog for a tunnel connection.
///
/// Ticks once per window and compares the transfer count against the count
/// observed at the previous tick; a tick with no change means the socket sat
/// a full window without traffic. Any recorded transfer therefore defers the
/// next firing by at least one window.
pub(crate) struct IdleWatchdog {
    timer: Interval,
    seen_at_tick: u64,
    total: u64,
}

impl IdleWatchdog {
    pub(crate) fn new(window: Duration) -> Self {
        let mut timer = time::interval_at(Instant::now() + window, window);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            timer,
            seen_at_tick: 0,
            total: 0,
        }
    }

    /// Account for `n` transferred bytes.
    pub(crate) fn record(&mut self, n: usize) {
        self.total += n as u64;
    }

    /// Wait for the next tick; resolves `true` when the window passed with
    /// no bytes recorded. Cancel-safe, so it can sit in a `select!` arm.
    pub(crate) async fn expired(&mut self) -> bool {
        self.timer.tick().await;
        let expired = self.total == self.seen_at_tick;
        self.seen_at_tick = self.total;
        expired
    }
}

/// One connection to the relay, from dial to close.
///
/// The settings captured at creation pin the connection to the domain it was
/// opened for; the pool re-checks that domain against the active
/// configuration when the terminal event arrives.
pub(crate) struct TunnelConnection {
    id: u64,
    config: ClientConfig,
    settings: TunnelSettings,
    pool: mpsc::Sender<PoolMsg>,
    state: TunnelState,
}

impl TunnelConnection {
    pub(crate) fn new(
        id: u64,
        config: ClientConfig,
        settings: TunnelSettings,
        pool: mpsc::Sender<PoolMsg>,
    ) -> Self {
        Self {
            id,
            config,
            settings,
            pool,
            state: TunnelState::Connecting,
        }
    }

    fn set_state(&mut self, next: TunnelState) {
        debug!(id = self.id, from = ?self.state, to = ?next, "tunnel connection state");
        self.state = next;
    }

    pub(crate) async fn run(mut self) {
        let domain = self.settings.domain.clone();

        let mut stream = match TcpStream::connect(&self.config.server_addr).await {
            Ok(stream) => stream,
            Err(e) => {
                self.set_state(TunnelState::Closed);
                if is_dial_failure(&e) {
                    warn!(id = self.id, %domain, error = %e, "relay dial failed");
                    let _ = self.pool.send(PoolMsg::DialFailed { domain }).await;
                } else {
                    warn!(id = self.id, %domain, error = %e, "relay dial error");
                    let _ = self.pool.send(PoolMsg::Closed { domain }).await;
                }
                return;
            }
        };

        // The dial succeeded; the pool's failure counter starts over even if
        // the handshake below fails.
        let _ = self
            .pool
            .send(PoolMsg::Established {
                domain: domain.clone(),
            })
            .await;

        let header =
            handshake::tunnel_handshake(&self.config.server_addr, &domain, &self.config.token);
        if let Err(e) = stream.write_all(header.as_bytes()).await {
            warn!(id = self.id, %domain, error = %e, "failed to send tunnel handshake");
            self.set_state(TunnelState::Closed);
            let _ = self.pool.send(PoolMsg::Closed { domain }).await;
            return;
        }

        self.set_state(TunnelState::Idle);

        let mut watchdog = IdleWatchdog::new(self.config.idle_timeout);
        let mut buf = vec![0u8; 8192];

        // Idle: wait for the relay to route a request through this socket.
        let first = loop {
            tokio::select! {
                res = stream.read(&mut buf) => match res {
                    Ok(0) => {
                        debug!(id = self.id, %domain, "relay closed idle tunnel connection");
                        break None;
                    }
                    Ok(n) => {
                        watchdog.record(n);
                        break Some(n);
                    }
                    Err(e) => {
                        debug!(id = self.id, %domain, error = %e, "read error on idle tunnel connection");
                        break None;
                    }
                },
                expired = watchdog.expired() => if expired {
                    debug!(
                        id = self.id,
                        %domain,
                        window = ?self.config.idle_timeout,
                        "recycling tunnel connection after idle window"
                    );
                    break None;
                },
            }
        };

        let Some(first_len) = first else {
            self.set_state(TunnelState::Closed);
            let _ = self.pool.send(PoolMsg::Closed { domain }).await;
            return;
        };

        // Active: a relayed request arrived. Ask for a replacement so the
        // pool keeps its target of idle connections, then couple this socket
        // to the local service.
        self.set_state(TunnelState::Active);
        debug!(id = self.id, %domain, bytes = first_len, "relayed request arrived");
        let _ = self
            .pool
            .send(PoolMsg::Activated {
                domain: domain.clone(),
            })
            .await;

        let local_addr = self.settings.local_addr();
        match pipe::run(&mut stream, &local_addr, &buf[..first_len], &mut watchdog).await {
            PipeOutcome::LocalUnreachable(e) => {
                warn!(
                    id = self.id,
                    %domain,
                    %local_addr,
                    error = %e,
                    "local service unreachable, dropping tunnel connection"
                );
            }
            PipeOutcome::IdleTimeout => {
                debug!(id = self.id, %domain, "recycling active tunnel connection after idle window");
            }
            PipeOutcome::TunnelClosed => {
                debug!(id = self.id, %domain, "relay side closed");
            }
            PipeOutcome::LocalClosed => {
                debug!(id = self.id, %domain, "local side closed");
            }
            PipeOutcome::TunnelError(e) => {
                warn!(id = self.id, %domain, error = %e, "tunnel socket error");
            }
            PipeOutcome::LocalError(e) => {
                warn!(id = self.id, %domain, error = %e, "local socket error");
            }
        }

        self.set_state(TunnelState::Closed);
        let _ = self.pool.send(PoolMsg::Closed { domain }).await;
    }
}

/// Whether a dial error counts as a connect failure for backoff purposes.
fn is_dial_failure(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::TimedOut
    )
}
