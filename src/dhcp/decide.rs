//! The pure decision engine (spec §4.D): transaction × hardware record →
//! reply plan, with no I/O of its own. Everything here is a plain function
//! over values so it is fully unit-testable without a socket or a backend.

use std::net::Ipv4Addr;

use crate::dhcp::wire::DhcpMessageType;
use crate::domain::{BootDecision, BootStage, DhcpTransaction, HardwareRecord, PxeClientArch, PxeVendorOpts};

/// Static, per-deployment knobs the decision engine needs but does not own
/// (spec §6 "configuration surface").
#[derive(Debug, Clone)]
pub struct DecisionConfig {
    /// Source IP this host emits in option 54 / uses as `nextServer` for
    /// the TFTP leg (spec §4.D.6, §9 "Raw UDP + source-IP control").
    pub server_ip: Ipv4Addr,
    /// Base URL (e.g. `http://10.0.0.1:8080`) the HTTP iPXE binary/script
    /// server is reachable on.
    pub http_base_url: String,
    /// Splice the client MAC into the script path (`/{mac}/auto.ipxe`)
    /// rather than relying on source-IP lookup (spec §4.C).
    pub mac_injection: bool,
    /// UEFI HTTP Boot artifact filename served under `/ipxe/{file}`.
    pub uefi_artifact: String,
    /// Option 7 log server, set on every lease reply when configured
    /// (spec §3, §6 "Standard options to set").
    pub syslog_ip: Option<Ipv4Addr>,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            server_ip: Ipv4Addr::UNSPECIFIED,
            http_base_url: String::new(),
            mac_injection: true,
            uefi_artifact: "ipxe.efi".to_string(),
            syslog_ip: None,
        }
    }
}

/// Standard DHCP lease options (subnet/router/dns/domain/hostname/
/// broadcast/lease-time), omitted entirely for an INFORM reply (spec §9
/// open question: INFORM gets only option 54 and the netboot subset).
#[derive(Debug, Clone)]
pub struct LeaseOptions {
    pub subnet_mask: Ipv4Addr,
    pub router: Ipv4Addr,
    pub nameservers: Vec<Ipv4Addr>,
    pub domain: Option<String>,
    pub hostname: Option<String>,
    pub broadcast: Ipv4Addr,
    pub lease_time: u32,
    /// T1, when the client should start renewing (RFC 2131 §4.4.5: 50% of
    /// `lease_time`, option 58).
    pub renewal_time: u32,
    /// T2, when the client should start rebinding (87.5% of `lease_time`,
    /// option 59).
    pub rebinding_time: u32,
    pub log_server: Option<Ipv4Addr>,
}

/// What the server loop (spec §4.E) should do with an inbound transaction.
#[derive(Debug, Clone)]
pub enum Disposition {
    /// Unknown MAC, or a known MAC with `allowPXE=false` — never NAK, per
    /// the error-handling taxonomy (spec §7): other DHCP servers may share
    /// this LAN and a stray NAK from us would break their clients.
    Drop,
    /// A REQUEST asking for an IP that doesn't match the reservation.
    Nak,
    Reply(ReplyPlan),
}

/// Everything the wire-encoding layer needs to build a reply datagram.
#[derive(Debug, Clone)]
pub struct ReplyPlan {
    pub msg_type: DhcpMessageType,
    pub yiaddr: Ipv4Addr,
    pub lease: Option<LeaseOptions>,
    pub decision: BootDecision,
    pub client_uuid: Option<Vec<u8>>,
}

/// Classify one transaction against the matching hardware record.
///
/// `record` is `None` for an unknown MAC; callers look it up via
/// [`crate::backend::BackendReader::get_by_mac`] before calling this.
pub fn decide(txn: &DhcpTransaction, record: Option<&HardwareRecord>, config: &DecisionConfig) -> Disposition {
    let Some(msg_type) = txn.msg_type else {
        return Disposition::Drop;
    };

    if !matches!(
        msg_type,
        DhcpMessageType::Discover | DhcpMessageType::Request | DhcpMessageType::Inform
    ) {
        return Disposition::Drop;
    }

    let Some(record) = record else {
        return Disposition::Drop;
    };

    if !record.netboot.allow_pxe {
        return Disposition::Drop;
    }

    if msg_type == DhcpMessageType::Request {
        if let Some(requested) = txn.requested_ip {
            if requested != record.ip {
                return Disposition::Nak;
            }
        }
    }

    let is_inform = msg_type == DhcpMessageType::Inform;
    let reply_msg_type = if is_inform { DhcpMessageType::Ack } else { msg_type_to_reply(msg_type) };

    let decision = select_boot_stage(txn, record, config);

    let lease = if is_inform {
        None
    } else {
        let lease_time = record.lease_time.as_secs() as u32;
        Some(LeaseOptions {
            subnet_mask: record.netmask,
            router: record.gateway,
            nameservers: record.nameservers.clone(),
            domain: Some(record.domain.clone()),
            hostname: Some(record.hostname.clone()),
            broadcast: broadcast_addr(record.ip, record.netmask),
            lease_time,
            renewal_time: lease_time / 2,
            rebinding_time: lease_time * 7 / 8,
            log_server: config.syslog_ip,
        })
    };

    let yiaddr = if is_inform { Ipv4Addr::UNSPECIFIED } else { record.ip };

    Disposition::Reply(ReplyPlan {
        msg_type: reply_msg_type,
        yiaddr,
        lease,
        decision,
        client_uuid: txn.client_uuid.clone(),
    })
}

fn msg_type_to_reply(msg_type: DhcpMessageType) -> DhcpMessageType {
    match msg_type {
        DhcpMessageType::Discover => DhcpMessageType::Offer,
        DhcpMessageType::Request => DhcpMessageType::Ack,
        other => other,
    }
}

/// Boot-chain stage selection (spec §4.D.4), the crux of the decision
/// engine. The user-class flip after iPXE loads is the only progress
/// signal this handler ever looks at — see [`DhcpTransaction::is_ipxe_user_class`].
fn select_boot_stage(txn: &DhcpTransaction, record: &HardwareRecord, config: &DecisionConfig) -> BootDecision {
    let pxe_vendor_opts = if txn.is_pxe_client() {
        Some(PxeVendorOpts::default())
    } else {
        None
    };

    if txn.is_ipxe_user_class() {
        let script_url = record
            .netboot
            .ipxe_script_url
            .clone()
            .unwrap_or_else(|| default_script_url(config, &record.mac_string()));

        return BootDecision {
            stage: BootStage::HttpScript,
            next_server: Ipv4Addr::UNSPECIFIED,
            boot_file_name: script_url,
            server_name: String::new(),
            vendor_class_id_override: None,
            pxe_vendor_opts,
        };
    }

    let is_uefi = txn
        .client_arch
        .map(PxeClientArch::is_uefi_http_boot)
        .unwrap_or(false);

    if is_uefi {
        return BootDecision {
            stage: BootStage::HttpBin,
            next_server: Ipv4Addr::UNSPECIFIED,
            boot_file_name: format!("{}/ipxe/{}", config.http_base_url, config.uefi_artifact),
            server_name: String::new(),
            vendor_class_id_override: Some("HTTPClient"),
            pxe_vendor_opts,
        };
    }

    BootDecision {
        stage: BootStage::TftpBin,
        next_server: config.server_ip,
        boot_file_name: "undionly.kpxe".to_string(),
        server_name: config.server_ip.to_string(),
        vendor_class_id_override: None,
        pxe_vendor_opts,
    }
}

fn default_script_url(config: &DecisionConfig, mac: &str) -> String {
    if config.mac_injection {
        format!("{}/{}/auto.ipxe", config.http_base_url, mac)
    } else {
        format!("{}/auto.ipxe", config.http_base_url)
    }
}

fn broadcast_addr(ip: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    let ip_bits = u32::from(ip);
    let mask_bits = u32::from(netmask);
    Ipv4Addr::from(ip_bits | !mask_bits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use macaddr::MacAddr6;

    fn mac(last: u8) -> MacAddr6 {
        MacAddr6::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, last)
    }

    fn txn(msg_type: DhcpMessageType) -> DhcpTransaction {
        DhcpTransaction {
            xid: 1,
            client_mac: mac(0x01),
            giaddr: Ipv4Addr::UNSPECIFIED,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            broadcast: false,
            client_arch: None,
            user_class: None,
            vendor_class_id: None,
            requested_ip: None,
            client_uuid: None,
            msg_type: Some(msg_type),
        }
    }

    fn record() -> HardwareRecord {
        HardwareRecord::new(mac(0x01), Ipv4Addr::new(10, 0, 0, 10))
    }

    fn config() -> DecisionConfig {
        DecisionConfig {
            server_ip: Ipv4Addr::new(10, 0, 0, 1),
            http_base_url: "http://10.0.0.1".to_string(),
            mac_injection: true,
            uefi_artifact: "ipxe.efi".to_string(),
            syslog_ip: None,
        }
    }

    #[test]
    fn unknown_mac_drops_silently() {
        let disposition = decide(&txn(DhcpMessageType::Discover), None, &config());
        assert!(matches!(disposition, Disposition::Drop));
    }

    #[test]
    fn allow_pxe_false_drops_silently() {
        let mut rec = record();
        rec.netboot.allow_pxe = false;
        let disposition = decide(&txn(DhcpMessageType::Discover), Some(&rec), &config());
        assert!(matches!(disposition, Disposition::Drop));
    }

    #[test]
    fn request_for_wrong_ip_is_nak() {
        let mut t = txn(DhcpMessageType::Request);
        t.requested_ip = Some(Ipv4Addr::new(10, 0, 0, 99));
        let disposition = decide(&t, Some(&record()), &config());
        assert!(matches!(disposition, Disposition::Nak));
    }

    #[test]
    fn s1_bios_pxe_discover() {
        let mut t = txn(DhcpMessageType::Discover);
        t.client_arch = Some(PxeClientArch::from_u16(0x0000));
        t.vendor_class_id = Some("PXEClient:Arch:00000:UNDI:003016".to_string());

        let disposition = decide(&t, Some(&record()), &config());
        let Disposition::Reply(plan) = disposition else {
            panic!("expected reply");
        };

        assert_eq!(plan.yiaddr, Ipv4Addr::new(10, 0, 0, 10));
        assert_eq!(plan.decision.stage, BootStage::TftpBin);
        assert_eq!(plan.decision.next_server, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(plan.decision.boot_file_name, "undionly.kpxe");
        assert_eq!(plan.decision.pxe_vendor_opts.unwrap().discovery_control, 0x08);
    }

    #[test]
    fn s2_ipxe_http_script() {
        let mut t = txn(DhcpMessageType::Discover);
        t.user_class = Some("iPXE".to_string());

        let disposition = decide(&t, Some(&record()), &config());
        let Disposition::Reply(plan) = disposition else {
            panic!("expected reply");
        };

        assert_eq!(plan.decision.stage, BootStage::HttpScript);
        assert_eq!(plan.decision.next_server, Ipv4Addr::UNSPECIFIED);
        assert_eq!(plan.decision.boot_file_name, "http://10.0.0.1/aa:bb:cc:dd:ee:01/auto.ipxe");
    }

    #[test]
    fn s2_without_mac_injection_omits_mac() {
        let mut t = txn(DhcpMessageType::Discover);
        t.user_class = Some("iPXE".to_string());
        let mut cfg = config();
        cfg.mac_injection = false;

        let disposition = decide(&t, Some(&record()), &cfg);
        let Disposition::Reply(plan) = disposition else {
            panic!("expected reply");
        };
        assert_eq!(plan.decision.boot_file_name, "http://10.0.0.1/auto.ipxe");
    }

    #[test]
    fn s3_uefi_http_boot() {
        let mut t = txn(DhcpMessageType::Discover);
        t.client_arch = Some(PxeClientArch::from_u16(0x0007));
        t.vendor_class_id = Some("HTTPClient:Arch:00007".to_string());

        let disposition = decide(&t, Some(&record()), &config());
        let Disposition::Reply(plan) = disposition else {
            panic!("expected reply");
        };

        assert_eq!(plan.decision.stage, BootStage::HttpBin);
        assert_eq!(plan.decision.vendor_class_id_override, Some("HTTPClient"));
        assert_eq!(plan.decision.boot_file_name, "http://10.0.0.1/ipxe/ipxe.efi");
    }

    #[test]
    fn per_record_script_override_wins() {
        let mut rec = record();
        rec.netboot.ipxe_script_url = Some("http://override.example/custom.ipxe".to_string());
        let mut t = txn(DhcpMessageType::Discover);
        t.user_class = Some("Tinkerbell".to_string());

        let disposition = decide(&t, Some(&rec), &config());
        let Disposition::Reply(plan) = disposition else {
            panic!("expected reply");
        };
        assert_eq!(plan.decision.boot_file_name, "http://override.example/custom.ipxe");
    }

    #[test]
    fn lease_carries_renewal_rebinding_and_log_server() {
        let mut cfg = config();
        cfg.syslog_ip = Some(Ipv4Addr::new(10, 0, 0, 9));

        let disposition = decide(&txn(DhcpMessageType::Discover), Some(&record()), &cfg);
        let Disposition::Reply(plan) = disposition else {
            panic!("expected reply");
        };
        let lease = plan.lease.expect("discover carries a lease");
        assert_eq!(lease.lease_time, 3600);
        assert_eq!(lease.renewal_time, 1800);
        assert_eq!(lease.rebinding_time, 3150);
        assert_eq!(lease.log_server, Some(Ipv4Addr::new(10, 0, 0, 9)));
    }

    #[test]
    fn inform_omits_lease_fields() {
        let disposition = decide(&txn(DhcpMessageType::Inform), Some(&record()), &config());
        let Disposition::Reply(plan) = disposition else {
            panic!("expected reply");
        };
        assert_eq!(plan.msg_type, DhcpMessageType::Ack);
        assert_eq!(plan.yiaddr, Ipv4Addr::UNSPECIFIED);
        assert!(plan.lease.is_none());
    }

    #[test]
    fn client_uuid_is_echoed() {
        let mut t = txn(DhcpMessageType::Discover);
        t.client_uuid = Some(vec![1, 2, 3, 4]);
        let disposition = decide(&t, Some(&record()), &config());
        let Disposition::Reply(plan) = disposition else {
            panic!("expected reply");
        };
        assert_eq!(plan.client_uuid, Some(vec![1, 2, 3, 4]));
    }

    #[test]
    fn drops_unhandled_message_types() {
        let disposition = decide(&txn(DhcpMessageType::Release), Some(&record()), &config());
        assert!(matches!(disposition, Disposition::Drop));
    }
}
