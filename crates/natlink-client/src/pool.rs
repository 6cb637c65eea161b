//! Tunnel connection pool
//!
//! The pool keeps a target number of idle tunnel connections pre-established
//! against the relay so an incoming request never waits on a dial. All pool
//! state — the active settings, the failure counter, the timers scheduled
//! under the current configuration — is owned by one task fed by a message
//! channel; tunnel connections report their lifecycle events back over the
//! same channel.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time;
use tracing::{debug, info};

use natlink_proto::TunnelSettings;

use crate::backoff::FailureCounter;
use crate::config::ClientConfig;
use crate::metrics::PoolMetrics;
use crate::tunnel::TunnelConnection;

/// Spacing between the staggered dials of a freshly configured pool, so the
/// whole pool does not race the relay at once.
const SPAWN_STAGGER: Duration = Duration::from_millis(1);

/// Messages handled by the pool task.
#[derive(Debug)]
pub(crate) enum PoolMsg {
    /// Adopt a configuration pushed over the control channel.
    Reconfigure(TunnelSettings),
    /// Open one tunnel connection for `domain` if it is still active.
    SpawnOne { domain: String },
    /// A tunnel dial succeeded.
    Established { domain: String },
    /// A tunnel dial failed with a refused/unreachable class error.
    DialFailed { domain: String },
    /// A tunnel connection's socket closed.
    Closed { domain: String },
    /// An idle tunnel connection received relayed traffic.
    Activated { domain: String },
}

/// Cloneable handle to the pool task.
#[derive(Clone)]
pub struct PoolHandle {
    tx: mpsc::Sender<PoolMsg>,
    metrics: Arc<PoolMetrics>,
}

impl PoolHandle {
    /// Hand a configuration push to the pool. A push carrying the currently
    /// active domain is a no-op.
    pub async fn reconfigure(&self, settings: TunnelSettings) {
        let _ = self.tx.send(PoolMsg::Reconfigure(settings)).await;
    }

    /// Pool activity counters.
    pub fn metrics(&self) -> Arc<PoolMetrics> {
        Arc::clone(&self.metrics)
    }
}

/// Maintains the target number of pre-established tunnel connections.
pub struct TunnelPool {
    config: ClientConfig,
    active: Option<TunnelSettings>,
    failures: FailureCounter,
    /// Sleepers for staggered spawns and delayed reconnects. Aborted
    /// wholesale when a new configuration supersedes the one they were
    /// scheduled under; `spawn_one` re-validates the domain as well.
    timers: JoinSet<()>,
    next_id: u64,
    tx: mpsc::Sender<PoolMsg>,
    metrics: Arc<PoolMetrics>,
}

impl TunnelPool {
    /// Spawn the pool task and return its handle.
    pub fn spawn(config: ClientConfig) -> PoolHandle {
        let (tx, rx) = mpsc::channel(64);
        let metrics = Arc::new(PoolMetrics::default());
        let pool = Self {
            config,
            active: None,
            failures: FailureCounter::new(),
            timers: JoinSet::new(),
            next_id: 0,
            tx: tx.clone(),
            metrics: Arc::clone(&metrics),
        };
        tokio::spawn(pool.run(rx));
        PoolHandle { tx, metrics }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<PoolMsg>) {
        while let Some(msg) = rx.recv().await {
            self.handle(msg);
        }
    }

    fn handle(&mut self, msg: PoolMsg) {
        self.reap_timers();
        match msg {
            PoolMsg::Reconfigure(settings) => self.reconfigure(settings),
            PoolMsg::SpawnOne { domain } => self.spawn_one(&domain),
            PoolMsg::Established { domain } => {
                debug!(%domain, "tunnel connection established");
                self.failures.reset();
                self.metrics.record_established();
            }
            PoolMsg::DialFailed { domain } => {
                let count = self.failures.record_failure();
                self.metrics.record_dial_failure(count);
                if self.is_active(&domain) {
                    self.schedule_respawn(domain);
                } else {
                    debug!(%domain, "discarding failed tunnel for superseded domain");
                }
            }
            PoolMsg::Closed { domain } => {
                if self.is_active(&domain) {
                    self.schedule_respawn(domain);
                } else {
                    debug!(%domain, "discarding closed tunnel for superseded domain");
                }
            }
            PoolMsg::Activated { domain } => {
                self.metrics.record_activation();
                self.spawn_one(&domain);
            }
        }
    }

    fn is_active(&self, domain: &str) -> bool {
        self.active.as_ref().is_some_and(|s| s.domain == domain)
    }

    /// Drop handles of timers that have already fired.
    fn reap_timers(&mut self) {
        while self.timers.try_join_next().is_some() {}
    }

    fn reconfigure(&mut self, settings: TunnelSettings) {
        if self.is_active(&settings.domain) {
            debug!(domain = %settings.domain, "configuration unchanged, keeping current pool");
            return;
        }

        info!(
            domain = %settings.domain,
            target = %settings.local_addr(),
            "adopting tunnel configuration"
        );

        // Timers scheduled under the previous configuration must not fire.
        self.timers.abort_all();

        let domain = settings.domain.clone();
        self.active = Some(settings);

        for i in 0..self.config.pool_size {
            let tx = self.tx.clone();
            let domain = domain.clone();
            let delay = SPAWN_STAGGER * (i as u32 + 1);
            self.timers.spawn(async move {
                time::sleep(delay).await;
                let _ = tx.send(PoolMsg::SpawnOne { domain }).await;
            });
        }
    }

    /// Open one connection for `domain`, unless the configuration has moved
    /// on since this call was scheduled.
    fn spawn_one(&mut self, domain: &str) {
        let Some(settings) = self.active.clone().filter(|s| s.domain == domain) else {
            debug!(%domain, "skipping tunnel connect for superseded domain");
            return;
        };

        self.next_id += 1;
        self.metrics.record_attempt();
        let conn =
            TunnelConnection::new(self.next_id, self.config.clone(), settings, self.tx.clone());
        tokio::spawn(conn.run());
    }

    /// Decide when the connection for `domain` is dialed again: immediately
    /// while no failures are on record, otherwise after the backoff delay.
    fn schedule_respawn(&mut self, domain: String) {
        let delay = self.failures.delay();
        if delay.is_zero() {
            self.spawn_one(&domain);
            return;
        }

        debug!(%domain, ?delay, "scheduling tunnel reconnect");
        let tx = self.tx.clone();
        self.timers.spawn(async move {
            time::sleep(delay).await;
            let _ = tx.send(PoolMsg::SpawnOne { domain }).await;
        });
    }
}
