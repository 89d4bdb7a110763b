//! [`DhcpTransaction`]: the ephemeral, per-packet view the decision engine
//! classifies (spec §3). Built once from a decoded wire message
//! ([`crate::dhcp::wire::DhcpMessage`]) and discarded after the reply is
//! emitted — the handler keeps no memory across packets (spec §4.D "State").

use std::net::Ipv4Addr;

use macaddr::MacAddr6;

use crate::dhcp::wire::{DhcpMessage, DhcpMessageType, DhcpOption};
use crate::domain::pxe::PxeClientArch;

/// One inbound DHCPv4 packet, reduced to the fields the decision engine
/// and the reply encoder need.
#[derive(Debug, Clone)]
pub struct DhcpTransaction {
    pub xid: u32,
    pub client_mac: MacAddr6,
    pub giaddr: Ipv4Addr,
    pub ciaddr: Ipv4Addr,
    pub broadcast: bool,
    pub client_arch: Option<PxeClientArch>,
    pub user_class: Option<String>,
    pub vendor_class_id: Option<String>,
    pub requested_ip: Option<Ipv4Addr>,
    pub client_uuid: Option<Vec<u8>>,
    pub msg_type: Option<DhcpMessageType>,
}

impl DhcpTransaction {
    /// Build a transaction view from a decoded message.
    pub fn from_message(msg: &DhcpMessage) -> Self {
        let mut client_arch = None;
        let mut user_class = None;
        let mut vendor_class_id = None;
        let mut requested_ip = None;
        let mut client_uuid = None;
        let mut msg_type = None;

        for opt in &msg.options {
            match opt {
                DhcpOption::MessageType(t) => msg_type = Some(*t),
                DhcpOption::ClientArch(arch) => client_arch = Some(PxeClientArch::from_u16(*arch)),
                DhcpOption::UserClass(bytes) => {
                    user_class = Some(String::from_utf8_lossy(bytes).into_owned())
                }
                DhcpOption::VendorClassId(s) => vendor_class_id = Some(s.clone()),
                DhcpOption::RequestedIp(ip) => requested_ip = Some(*ip),
                DhcpOption::ClientUuid(bytes) => client_uuid = Some(bytes.clone()),
                _ => {}
            }
        }

        Self {
            xid: msg.xid,
            client_mac: msg.chaddr,
            giaddr: msg.giaddr,
            ciaddr: msg.ciaddr,
            broadcast: msg.flags & 0x8000 != 0,
            client_arch,
            user_class,
            vendor_class_id,
            requested_ip,
            client_uuid,
            msg_type,
        }
    }

    /// True when option 77 (user-class) is `"iPXE"` or `"Tinkerbell"` —
    /// the sole reliable chain-progress signal (spec §4.D.4, §9).
    pub fn is_ipxe_user_class(&self) -> bool {
        matches!(self.user_class.as_deref(), Some("iPXE") | Some("Tinkerbell"))
    }

    /// True when option 60 (vendor class id) begins with `"PXEClient"`
    /// (spec §4.D.5).
    pub fn is_pxe_client(&self) -> bool {
        self.vendor_class_id
            .as_deref()
            .is_some_and(|v| v.starts_with("PXEClient"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dhcp::wire::DhcpMessage;

    fn base_message(mac: [u8; 6]) -> DhcpMessage {
        DhcpMessage {
            op: 1,
            htype: 1,
            hlen: 6,
            xid: 0x1234,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: MacAddr6::new(mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]),
            options: Vec::new(),
        }
    }

    #[test]
    fn extracts_mac_from_chaddr() {
        let msg = base_message([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01]);
        let txn = DhcpTransaction::from_message(&msg);
        assert_eq!(txn.client_mac, MacAddr6::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0x01));
    }

    #[test]
    fn detects_ipxe_user_class() {
        let mut msg = base_message([0; 6]);
        msg.options.push(DhcpOption::UserClass(b"iPXE".to_vec()));
        let txn = DhcpTransaction::from_message(&msg);
        assert!(txn.is_ipxe_user_class());
    }

    #[test]
    fn detects_tinkerbell_user_class() {
        let mut msg = base_message([0; 6]);
        msg.options.push(DhcpOption::UserClass(b"Tinkerbell".to_vec()));
        let txn = DhcpTransaction::from_message(&msg);
        assert!(txn.is_ipxe_user_class());
    }

    #[test]
    fn non_ipxe_user_class_is_false() {
        let mut msg = base_message([0; 6]);
        msg.options.push(DhcpOption::UserClass(b"MSFT 5.0".to_vec()));
        let txn = DhcpTransaction::from_message(&msg);
        assert!(!txn.is_ipxe_user_class());
    }

    #[test]
    fn detects_pxe_client_vendor_class() {
        let mut msg = base_message([0; 6]);
        msg.options
            .push(DhcpOption::VendorClassId("PXEClient:Arch:00007:UNDI:003016".to_string()));
        let txn = DhcpTransaction::from_message(&msg);
        assert!(txn.is_pxe_client());
    }
}
