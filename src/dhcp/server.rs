//! The async DHCP/proxyDHCP server loop (spec §4.E): owns the socket,
//! decodes inbound datagrams, hands them to the pure decision engine, and
//! emits the reply with an explicit source IP.
//!
//! Generalized from this codebase's `proxydhcp::server::ProxyDhcpServer`
//! (bind/broadcast socket options, single-goroutine-per-packet dispatch),
//! moved onto `tokio` and widened to cover full lease replies rather than
//! just the proxyDHCP subset.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{with_deadline, BackendReader};
use crate::dhcp::decide::{decide, DecisionConfig, Disposition, ReplyPlan};
use crate::dhcp::transport;
use crate::dhcp::wire::{self, option_codes, DhcpMessageType, DhcpOption};
use crate::domain::{DhcpTransaction, PxeVendorOpts};
use crate::error::{AppError, ConfigError};

const DHCP_SERVER_PORT: u16 = 67;
const MAX_DATAGRAM: usize = 1500;
/// Upper bound on concurrently in-flight transactions (spec §5: "bounded
/// by an implicit concurrency limit of inbound socket read rate").
const MAX_INFLIGHT: usize = 256;
/// Per-`BackendReader`-call timeout for the DHCP path (spec §4.A, §5).
const BACKEND_DEADLINE: Duration = Duration::from_secs(2);

/// Counters exposed for `/healthcheck`/`/metrics` (spec §4.F, §6).
#[derive(Default)]
pub struct DhcpStats {
    pub received: AtomicU64,
    pub malformed: AtomicU64,
    pub dropped: AtomicU64,
    pub replied: AtomicU64,
}

pub struct DhcpServer {
    socket: Arc<UdpSocket>,
    backend: Arc<dyn BackendReader>,
    config: DecisionConfig,
    stats: Arc<DhcpStats>,
}

impl DhcpServer {
    /// Bind a UDP socket on `bind_iface` (e.g. `"eth0"`, Linux-only via
    /// `SO_BINDTODEVICE`) listening on port 67, with broadcast enabled so
    /// replies to clients without an assigned IP can be sent (spec §9
    /// "Raw UDP + source-IP control").
    pub fn bind(bind_iface: Option<&str>, config: DecisionConfig, backend: Arc<dyn BackendReader>) -> Result<Self, AppError> {
        if config.server_ip != Ipv4Addr::UNSPECIFIED {
            verify_source_ip_assigned(config.server_ip)?;
        }

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        transport::enable_pktinfo(&socket)?;

        #[cfg(target_os = "linux")]
        if let Some(iface) = bind_iface {
            bind_to_device(&socket, iface)?;
        }
        #[cfg(not(target_os = "linux"))]
        let _ = bind_iface;

        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, DHCP_SERVER_PORT);
        socket.bind(&addr.into())?;

        let socket = UdpSocket::from_std(socket.into())?;

        Ok(Self {
            socket: Arc::new(socket),
            backend,
            config,
            stats: Arc::new(DhcpStats::default()),
        })
    }

    pub fn stats(&self) -> Arc<DhcpStats> {
        self.stats.clone()
    }

    /// Receive loop. Runs until `shutdown` is cancelled; in-flight handlers
    /// are not awaited beyond that point (spec §5 grace window is enforced
    /// by the caller wrapping this future in a timeout).
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), AppError> {
        info!("dhcp server listening on 0.0.0.0:{}", DHCP_SERVER_PORT);
        let permits = Arc::new(Semaphore::new(MAX_INFLIGHT));
        let mut buf = [0u8; MAX_DATAGRAM];

        loop {
            let (len, peer) = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("dhcp server shutting down");
                    return Ok(());
                }
                result = self.socket.recv_from(&mut buf) => result?,
            };

            self.stats.received.fetch_add(1, Ordering::Relaxed);
            let data = buf[..len].to_vec();
            let socket = self.socket.clone();
            let backend = self.backend.clone();
            let config = self.config.clone();
            let stats = self.stats.clone();

            let Ok(permit) = permits.clone().try_acquire_owned() else {
                warn!("dhcp handler concurrency limit reached, dropping packet from {peer}");
                stats.dropped.fetch_add(1, Ordering::Relaxed);
                continue;
            };

            tokio::spawn(async move {
                let _permit = permit;
                if let Err(err) = handle_packet(&socket, &data, peer, &backend, &config, &stats).await {
                    debug!("dhcp packet from {peer} not handled: {err}");
                }
            });
        }
    }
}

/// Confirm `server_ip` is actually assigned to a local interface before
/// committing to it as the explicit source address for every reply (spec
/// §9): a plain ephemeral bind to it fails fast if it isn't, rather than
/// silently handing the kernel an address it can't source from.
fn verify_source_ip_assigned(server_ip: Ipv4Addr) -> Result<(), AppError> {
    std::net::UdpSocket::bind((server_ip, 0))
        .map(|_| ())
        .map_err(|_| AppError::Config(ConfigError::SourceIpUnavailable(std::net::IpAddr::V4(server_ip))))
}

#[cfg(target_os = "linux")]
fn bind_to_device(socket: &Socket, iface: &str) -> Result<(), AppError> {
    use std::ffi::CString;
    use std::os::unix::io::AsRawFd;

    let cstr = CString::new(iface).map_err(|_| AppError::Listener(format!("invalid interface name: {iface}")))?;

    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_BINDTODEVICE,
            cstr.as_ptr() as *const libc::c_void,
            cstr.as_bytes_with_nul().len() as libc::socklen_t,
        )
    };

    if ret != 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    Ok(())
}

async fn handle_packet(
    socket: &UdpSocket,
    data: &[u8],
    peer: SocketAddr,
    backend: &Arc<dyn BackendReader>,
    config: &DecisionConfig,
    stats: &DhcpStats,
) -> Result<(), AppError> {
    let msg = match wire::decode(data) {
        Ok(msg) => msg,
        Err(err) => {
            stats.malformed.fetch_add(1, Ordering::Relaxed);
            return Err(err.into());
        }
    };

    if !msg.is_request() {
        return Ok(());
    }

    let txn = DhcpTransaction::from_message(&msg);
    let record = with_deadline(BACKEND_DEADLINE, backend.get_by_mac(txn.client_mac)).await?;

    let disposition = decide(&txn, record.as_ref(), config);

    let reply = match disposition {
        Disposition::Drop => {
            stats.dropped.fetch_add(1, Ordering::Relaxed);
            return Ok(());
        }
        Disposition::Nak => wire::encode_reply(
            &msg,
            DhcpMessageType::Nak,
            Ipv4Addr::UNSPECIFIED,
            Ipv4Addr::UNSPECIFIED,
            &config.server_ip.to_string(),
            "",
            &[DhcpOption::ServerIdentifier(config.server_ip)],
        ),
        Disposition::Reply(plan) => build_reply(&msg, &plan, config),
    };

    let _ = peer;
    let dest = outer_framing(&msg, config);
    transport::send_from(socket, &reply, dest, config.server_ip).await?;
    stats.replied.fetch_add(1, Ordering::Relaxed);

    Ok(())
}

/// Assemble the full reply option list from a [`ReplyPlan`] (spec §4.D.3,
/// §4.D.5, §6 "Required options emitted").
fn build_reply(request: &wire::DhcpMessage, plan: &ReplyPlan, config: &DecisionConfig) -> Vec<u8> {
    let mut options = vec![DhcpOption::ServerIdentifier(config.server_ip)];

    if let Some(lease) = &plan.lease {
        options.push(DhcpOption::SubnetMask(lease.subnet_mask));
        options.push(DhcpOption::Router(lease.router));
        if !lease.nameservers.is_empty() {
            options.push(DhcpOption::DomainNameServers(lease.nameservers.clone()));
        }
        if let Some(domain) = &lease.domain {
            if !domain.is_empty() {
                options.push(DhcpOption::DomainName(domain.clone()));
            }
        }
        if let Some(hostname) = &lease.hostname {
            if !hostname.is_empty() {
                options.push(DhcpOption::Hostname(hostname.clone()));
            }
        }
        options.push(DhcpOption::BroadcastAddr(lease.broadcast));
        options.push(DhcpOption::LeaseTime(lease.lease_time));
        options.push(DhcpOption::RenewalTime(lease.renewal_time));
        options.push(DhcpOption::RebindingTime(lease.rebinding_time));
        if let Some(log_server) = lease.log_server {
            options.push(DhcpOption::LogServer(log_server));
        }
    }

    if !plan.decision.server_name.is_empty() {
        options.push(DhcpOption::TftpServerName(plan.decision.server_name.clone()));
    }

    if let Some(vendor_class) = &plan.decision.vendor_class_id_override {
        options.push(DhcpOption::VendorClassId((*vendor_class).to_string()));
    }

    options.push(DhcpOption::BootfileName(plan.decision.boot_file_name.clone()));

    if let Some(pxe_opts) = &plan.decision.pxe_vendor_opts {
        options.push(DhcpOption::PxeVendorSpecific(encode_pxe_vendor_opts(pxe_opts)));
    }

    if let Some(uuid) = &plan.client_uuid {
        options.push(DhcpOption::ClientUuid(uuid.clone()));
    }

    wire::encode_reply(
        request,
        plan.msg_type,
        plan.yiaddr,
        plan.decision.next_server,
        &plan.decision.server_name,
        &plan.decision.boot_file_name,
        &options,
    )
}

/// Sub-opt 6 (PXE_DISCOVERY_CONTROL), sub-opt 9 (boot menu entry), and
/// sub-opt 10 (menu prompt), TLV encoded within option 43 (spec §4.D.5).
fn encode_pxe_vendor_opts(opts: &PxeVendorOpts) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.push(6);
    buf.push(1);
    buf.push(opts.discovery_control);

    let description = b"netboot";
    let mut menu_entry = Vec::with_capacity(3 + description.len());
    menu_entry.extend_from_slice(&opts.boot_menu_item_type.to_be_bytes());
    menu_entry.push(description.len() as u8);
    menu_entry.extend_from_slice(description);
    buf.push(9);
    buf.push(menu_entry.len() as u8);
    buf.extend_from_slice(&menu_entry);

    if opts.has_menu_prompt {
        let prompt = b"";
        buf.push(10);
        buf.push(1 + prompt.len() as u8);
        buf.push(0); // prompt timeout: immediate
        buf.extend_from_slice(prompt);
    }

    buf.push(option_codes::END);
    buf
}

/// Pick the destination for the reply datagram (spec §4.D.6).
fn outer_framing(request: &wire::DhcpMessage, config: &DecisionConfig) -> SocketAddr {
    let _ = config;

    if request.giaddr != Ipv4Addr::UNSPECIFIED {
        return SocketAddr::V4(SocketAddrV4::new(request.giaddr, DHCP_SERVER_PORT));
    }

    let broadcast_flag = request.flags & 0x8000 != 0;
    if broadcast_flag || request.ciaddr == Ipv4Addr::UNSPECIFIED {
        return SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, 68));
    }

    SocketAddr::V4(SocketAddrV4::new(request.ciaddr, 68))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dhcp::decide::LeaseOptions;
    use crate::domain::{BootDecision, BootStage};

    fn request() -> wire::DhcpMessage {
        wire::decode(&{
            let mut packet = vec![0u8; 244];
            packet[0] = 1;
            packet[236..240].copy_from_slice(&[0x63, 0x82, 0x53, 0x63]);
            packet[240] = option_codes::END;
            packet
        })
        .unwrap()
    }

    #[test]
    fn giaddr_routes_reply_to_relay() {
        let mut req = request();
        req.giaddr = Ipv4Addr::new(10, 0, 0, 254);
        let dest = outer_framing(&req, &DecisionConfig::default());
        assert_eq!(dest, SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 254), 67)));
    }

    #[test]
    fn no_giaddr_and_no_ciaddr_broadcasts() {
        let req = request();
        let dest = outer_framing(&req, &DecisionConfig::default());
        assert_eq!(dest, SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::BROADCAST, 68)));
    }

    #[test]
    fn unicasts_to_ciaddr_when_present_and_not_broadcast() {
        let mut req = request();
        req.ciaddr = Ipv4Addr::new(10, 0, 0, 10);
        let dest = outer_framing(&req, &DecisionConfig::default());
        assert_eq!(dest, SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 10), 68)));
    }

    #[test]
    fn build_reply_includes_bootfile_and_vendor_opts() {
        let req = request();
        let plan = ReplyPlan {
            msg_type: DhcpMessageType::Offer,
            yiaddr: Ipv4Addr::new(10, 0, 0, 10),
            lease: Some(LeaseOptions {
                subnet_mask: Ipv4Addr::new(255, 255, 255, 0),
                router: Ipv4Addr::new(10, 0, 0, 1),
                nameservers: vec![Ipv4Addr::new(8, 8, 8, 8)],
                domain: Some("lab.example".to_string()),
                hostname: Some("node1".to_string()),
                broadcast: Ipv4Addr::new(10, 0, 0, 255),
                lease_time: 3600,
                renewal_time: 1800,
                rebinding_time: 3150,
                log_server: Some(Ipv4Addr::new(10, 0, 0, 9)),
            }),
            decision: BootDecision {
                stage: BootStage::TftpBin,
                next_server: Ipv4Addr::new(10, 0, 0, 1),
                boot_file_name: "undionly.kpxe".to_string(),
                server_name: "10.0.0.1".to_string(),
                vendor_class_id_override: None,
                pxe_vendor_opts: Some(PxeVendorOpts::default()),
            },
            client_uuid: None,
        };

        let reply = build_reply(&req, &plan, &DecisionConfig::default());
        let decoded = wire::decode(&reply).unwrap();
        assert!(decoded
            .options
            .iter()
            .any(|o| matches!(o, DhcpOption::BootfileName(f) if f == "undionly.kpxe")));
        assert!(decoded.options.iter().any(|o| matches!(o, DhcpOption::PxeVendorSpecific(_))));
        assert!(decoded.options.iter().any(|o| matches!(o, DhcpOption::RenewalTime(1800))));
        assert!(decoded.options.iter().any(|o| matches!(o, DhcpOption::RebindingTime(3150))));
        assert!(decoded
            .options
            .iter()
            .any(|o| matches!(o, DhcpOption::LogServer(ip) if *ip == Ipv4Addr::new(10, 0, 0, 9))));
        assert!(decoded
            .options
            .iter()
            .any(|o| matches!(o, DhcpOption::TftpServerName(s) if s == "10.0.0.1")));
    }

    #[test]
    fn pxe_vendor_opts_include_boot_menu_sub_option_9() {
        let opts = PxeVendorOpts::default();
        let encoded = encode_pxe_vendor_opts(&opts);
        assert!(encoded.windows(2).any(|w| w == [9, 10]));
    }
}
