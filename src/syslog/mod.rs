//! Syslog collector (spec §6): a UDP/514 receiver that forwards client log
//! lines into this service's own structured logging. Contents are opaque
//! to the rest of the service — RFC 3164/5424 structured parsing is out of
//! scope; this exists so provisioning logs surface next to the
//! orchestrator's own `tracing` output, nothing more.

use std::net::SocketAddr;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::AppError;

const MAX_DATAGRAM: usize = 2048;

pub struct SyslogServer {
    socket: UdpSocket,
}

impl SyslogServer {
    pub async fn bind(bind_addr: SocketAddr) -> Result<Self, AppError> {
        let socket = UdpSocket::bind(bind_addr).await?;
        info!("syslog collector listening on {bind_addr}");
        Ok(Self { socket })
    }

    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), AppError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            let (len, peer) = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("syslog collector shutting down");
                    return Ok(());
                }
                result = self.socket.recv_from(&mut buf) => result?,
            };

            match std::str::from_utf8(&buf[..len]) {
                Ok(line) => info!(peer = %peer, "{}", line.trim_end()),
                Err(_) => warn!("syslog: dropped non-UTF-8 datagram from {peer}"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UdpSocket as ClientSocket;

    #[tokio::test]
    async fn forwards_received_datagrams_without_parsing() {
        let server = SyslogServer::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let server_addr = server.socket.local_addr().unwrap();

        let shutdown = CancellationToken::new();
        let run_shutdown = shutdown.clone();
        let handle = tokio::spawn(async move { server.run(run_shutdown).await });

        let client = ClientSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"<34>Oct 11 22:14:15 host app: message body", server_addr).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        shutdown.cancel();
        handle.await.unwrap().unwrap();
    }
}
