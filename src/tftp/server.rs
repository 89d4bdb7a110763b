//! Single-port TFTP server (spec §4.B, §6, §9 "TFTP single-port").
//!
//! RFC 1350 normally hands each read request off to a fresh ephemeral
//! port; that breaks through NAT devices that only punch a hole for the
//! port the client first sent to. This server keeps every session — RRQ
//! and all subsequent DATA/ACK traffic — on the one bound socket,
//! demultiplexing by source address. Generalized from this codebase's
//! two-port `TftpServer` (RFC 2347/2348 option parsing, retry/backoff
//! shape), moved onto `tokio` and rehomed onto the in-memory
//! [`crate::ipxe::IpxeImageSet`] rather than a filesystem root.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::TftpError;
use crate::ipxe::IpxeImageSet;

const OPCODE_RRQ: u16 = 1;
const OPCODE_WRQ: u16 = 2;
const OPCODE_DATA: u16 = 3;
const OPCODE_ACK: u16 = 4;
const OPCODE_ERROR: u16 = 5;
const OPCODE_OACK: u16 = 6;

const _ERROR_NOT_DEFINED: u16 = 0;
const ERROR_FILE_NOT_FOUND: u16 = 1;
const ERROR_ACCESS_VIOLATION: u16 = 2;

pub const DEFAULT_BLOCK_SIZE: usize = 512;
pub const MAX_BLOCK_SIZE: usize = 65456;
/// RFC 2348 lets a server impose any floor; this one holds the line at
/// the RFC 1350 default rather than letting a negotiated `blksize` shrink
/// below it (spec §4.B "512..65456; default 512").
const MIN_BLOCK_SIZE: usize = 512;
const MAX_RETRIES: u32 = 5;
const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_secs(5);

type SessionMap = Arc<Mutex<HashMap<SocketAddr, mpsc::Sender<Vec<u8>>>>>;

pub struct TftpServer {
    socket: Arc<UdpSocket>,
    images: Arc<IpxeImageSet>,
    block_timeout: Duration,
    sessions: SessionMap,
}

impl TftpServer {
    pub async fn bind(bind_addr: SocketAddr, images: Arc<IpxeImageSet>) -> Result<Self, TftpError> {
        let socket = UdpSocket::bind(bind_addr).await?;
        info!("tftp server listening on {bind_addr} (single-port mode)");

        Ok(Self {
            socket: Arc::new(socket),
            images,
            block_timeout: DEFAULT_BLOCK_TIMEOUT,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), TftpError> {
        let mut buf = vec![0u8; MAX_BLOCK_SIZE + 4];

        loop {
            let (len, peer) = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("tftp server shutting down");
                    return Ok(());
                }
                result = self.socket.recv_from(&mut buf) => result?,
            };

            if len < 4 {
                continue;
            }

            let opcode = u16::from_be_bytes([buf[0], buf[1]]);
            let body = buf[2..len].to_vec();

            let mut sessions = self.sessions.lock().await;
            if let Some(sender) = sessions.get(&peer) {
                if sender.try_send(body).is_err() {
                    sessions.remove(&peer);
                }
                continue;
            }

            match opcode {
                OPCODE_RRQ => {
                    let (tx, rx) = mpsc::channel(4);
                    sessions.insert(peer, tx);
                    drop(sessions);
                    self.spawn_session(peer, body, rx);
                }
                OPCODE_WRQ => {
                    warn!("tftp write request from {peer} denied (read-only server)");
                    send_error(&self.socket, peer, ERROR_ACCESS_VIOLATION, "write not supported").await;
                }
                _ => debug!("tftp: ignoring opcode {opcode} from {peer} with no active session"),
            }
        }
    }

    fn spawn_session(&self, peer: SocketAddr, request: Vec<u8>, mut inbox: mpsc::Receiver<Vec<u8>>) {
        let socket = self.socket.clone();
        let images = self.images.clone();
        let block_timeout = self.block_timeout;
        let sessions = self.sessions.clone();

        tokio::spawn(async move {
            if let Err(err) = run_session(&socket, peer, &request, &images, block_timeout, &mut inbox).await {
                warn!("tftp session with {peer} ended: {err}");
            }
            sessions.lock().await.remove(&peer);
        });
    }
}

struct ReadRequest {
    filename: String,
    options: HashMap<String, String>,
}

fn parse_read_request(body: &[u8]) -> Result<ReadRequest, TftpError> {
    let parts: Vec<&[u8]> = body.split(|&b| b == 0).collect();
    let filename = parts
        .first()
        .and_then(|p| std::str::from_utf8(p).ok())
        .ok_or_else(|| TftpError::Malformed("missing filename".to_string()))?
        .to_string();

    let mut options = HashMap::new();
    let mut i = 2; // skip filename and mode
    while i + 1 < parts.len() {
        if let (Ok(name), Ok(value)) = (std::str::from_utf8(parts[i]), std::str::from_utf8(parts[i + 1])) {
            if !name.is_empty() && !value.is_empty() {
                options.insert(name.to_lowercase(), value.to_string());
            }
        }
        i += 2;
    }

    Ok(ReadRequest { filename, options })
}

async fn run_session(
    socket: &UdpSocket,
    peer: SocketAddr,
    request: &[u8],
    images: &IpxeImageSet,
    block_timeout: Duration,
    inbox: &mut mpsc::Receiver<Vec<u8>>,
) -> Result<(), TftpError> {
    let request = parse_read_request(request)?;

    let data = match images.serve(&request.filename, &[]) {
        Ok(bytes) => bytes,
        Err(_) => {
            send_error(socket, peer, ERROR_FILE_NOT_FOUND, "file not found").await;
            return Err(TftpError::FileNotFound(request.filename));
        }
    };

    let mut block_size = DEFAULT_BLOCK_SIZE;
    if let Some(requested) = request.options.get("blksize").and_then(|v| v.parse::<usize>().ok()) {
        block_size = requested.clamp(MIN_BLOCK_SIZE, MAX_BLOCK_SIZE);
    }
    let tsize_requested = request.options.contains_key("tsize");

    if !request.options.is_empty() {
        let mut oack = vec![0u8, OPCODE_OACK as u8];
        if block_size != DEFAULT_BLOCK_SIZE || request.options.contains_key("blksize") {
            oack.extend_from_slice(b"blksize\0");
            oack.extend_from_slice(block_size.to_string().as_bytes());
            oack.push(0);
        }
        if tsize_requested {
            oack.extend_from_slice(b"tsize\0");
            oack.extend_from_slice(data.len().to_string().as_bytes());
            oack.push(0);
        }
        send_with_retry(socket, peer, &oack, 0, block_timeout, inbox).await?;
    }

    let mut offset = 0;
    let mut block_num: u16 = 1;
    loop {
        let end = (offset + block_size).min(data.len());
        let chunk = &data[offset..end];

        let mut packet = Vec::with_capacity(4 + chunk.len());
        packet.extend_from_slice(&OPCODE_DATA.to_be_bytes());
        packet.extend_from_slice(&block_num.to_be_bytes());
        packet.extend_from_slice(chunk);

        send_with_retry(socket, peer, &packet, block_num, block_timeout, inbox).await?;

        offset = end;
        // a chunk shorter than block_size — including length zero — ends the transfer (RFC 1350 §6)
        if chunk.len() < block_size {
            break;
        }
        block_num = block_num.wrapping_add(1);
    }

    debug!("tftp: transfer of {} to {peer} complete ({} bytes)", request.filename, data.len());
    Ok(())
}

/// Send one packet, waiting for the matching ACK with exponential backoff
/// up to [`MAX_RETRIES`] (spec §4.B "Per-block retransmission with
/// exponential backoff up to a configurable timeout").
async fn send_with_retry(
    socket: &UdpSocket,
    peer: SocketAddr,
    packet: &[u8],
    expected_block: u16,
    base_timeout: Duration,
    inbox: &mut mpsc::Receiver<Vec<u8>>,
) -> Result<(), TftpError> {
    for attempt in 0..=MAX_RETRIES {
        socket.send_to(packet, peer).await?;
        let timeout = base_timeout * 2u32.saturating_pow(attempt.min(4));

        match tokio::time::timeout(timeout, inbox.recv()).await {
            Ok(Some(body)) if body.len() >= 2 => {
                let opcode = u16::from_be_bytes([body[0], body[1]]);
                if opcode == OPCODE_ACK && body.len() >= 4 {
                    let acked = u16::from_be_bytes([body[2], body[3]]);
                    if acked == expected_block {
                        return Ok(());
                    }
                    // stale/duplicate ack, keep waiting on the next retry
                } else if opcode == OPCODE_ERROR {
                    return Err(TftpError::Malformed("client sent error".to_string()));
                }
            }
            Ok(Some(_)) => {}
            Ok(None) => return Err(TftpError::Timeout(expected_block)),
            Err(_elapsed) => continue,
        }
    }

    Err(TftpError::Timeout(expected_block))
}

async fn send_error(socket: &UdpSocket, peer: SocketAddr, code: u16, message: &str) {
    let mut packet = Vec::with_capacity(5 + message.len());
    packet.extend_from_slice(&OPCODE_ERROR.to_be_bytes());
    packet.extend_from_slice(&code.to_be_bytes());
    packet.extend_from_slice(message.as_bytes());
    packet.push(0);
    let _ = socket.send_to(&packet, peer).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_filename_and_blksize_option() {
        let body = b"undionly.kpxe\0octet\0blksize\01468\0".to_vec();
        let req = parse_read_request(&body).unwrap();
        assert_eq!(req.filename, "undionly.kpxe");
        assert_eq!(req.options.get("blksize"), Some(&"1468".to_string()));
    }

    #[test]
    fn parses_filename_with_no_options() {
        let body = b"undionly.kpxe\0octet\0".to_vec();
        let req = parse_read_request(&body).unwrap();
        assert_eq!(req.filename, "undionly.kpxe");
        assert!(req.options.is_empty());
    }

    #[tokio::test]
    async fn s6_blksize_negotiation_end_to_end() {
        let images = Arc::new(crate::ipxe::IpxeImageSet::new().with_image("undionly.kpxe", vec![0xABu8; 9000]));
        let server = TftpServer::bind("127.0.0.1:0".parse().unwrap(), images).await.unwrap();
        let server_addr = server.socket.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();
        let handle = tokio::spawn(async move { server.run(shutdown_clone).await });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let rrq = b"undionly.kpxe\0octet\0blksize\04096\0".to_vec();
        client.send_to(&rrq, server_addr).await.unwrap();

        let mut buf = [0u8; 4200];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(u16::from_be_bytes([buf[0], buf[1]]), OPCODE_OACK);
        assert!(buf[2..len].windows(7).any(|w| w == b"blksize"));

        let ack0 = [0u8, OPCODE_ACK as u8, 0, 0];
        client.send_to(&ack0, server_addr).await.unwrap();

        let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(u16::from_be_bytes([buf[0], buf[1]]), OPCODE_DATA);
        assert_eq!(len - 4, 4096);

        shutdown.cancel();
        let _ = handle.await;
    }
}
