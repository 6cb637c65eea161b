//! Bidirectional relay between an active tunnel connection and the local
//! service
//!
//! Once a relayed request arrives on a tunnel connection, the pipe opens a
//! fresh connection to the local service and forwards bytes both ways,
//! untouched, until either side closes or the connection's watchdog expires.

use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::tunnel::IdleWatchdog;

/// How an active pipe ended.
#[derive(Debug)]
pub(crate) enum PipeOutcome {
    /// The local service could not be dialed; the request cannot be served.
    LocalUnreachable(io::Error),
    /// The relay side closed.
    TunnelClosed,
    /// The local service closed.
    LocalClosed,
    /// A full idle window passed with no bytes in either direction.
    IdleTimeout,
    /// Read or write error on the tunnel socket.
    TunnelError(io::Error),
    /// Read or write error on the local socket.
    LocalError(io::Error),
}

/// Open the local service and relay bytes both ways.
///
/// `initial` carries the bytes that arrived while the tunnel connection was
/// idle; they are forwarded before the two sockets are coupled. Every
/// transferred chunk feeds the caller's watchdog.
pub(crate) async fn run(
    tunnel: &mut TcpStream,
    local_addr: &str,
    initial: &[u8],
    watchdog: &mut IdleWatchdog,
) -> PipeOutcome {
    let mut local = match TcpStream::connect(local_addr).await {
        Ok(stream) => stream,
        Err(e) => return PipeOutcome::LocalUnreachable(e),
    };
    debug!(%local_addr, "local connection opened");

    if let Err(e) = local.write_all(initial).await {
        return PipeOutcome::LocalError(e);
    }

    let mut tunnel_buf = vec![0u8; 8192];
    let mut local_buf = vec![0u8; 8192];

    loop {
        tokio::select! {
            res = tunnel.read(&mut tunnel_buf) => match res {
                Ok(0) => return PipeOutcome::TunnelClosed,
                Ok(n) => {
                    watchdog.record(n);
                    if let Err(e) = local.write_all(&tunnel_buf[..n]).await {
                        return PipeOutcome::LocalError(e);
                    }
                }
                Err(e) => return PipeOutcome::TunnelError(e),
            },
            res = local.read(&mut local_buf) => match res {
                Ok(0) => return PipeOutcome::LocalClosed,
                Ok(n) => {
                    watchdog.record(n);
                    if let Err(e) = tunnel.write_all(&local_buf[..n]).await {
                        return PipeOutcome::TunnelError(e);
                    }
                }
                Err(e) => return PipeOutcome::LocalError(e),
            },
            expired = watchdog.expired() => if expired {
                return PipeOutcome::IdleTimeout;
            },
        }
    }
}
