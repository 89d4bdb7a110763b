//! DHCPv4 wire format (RFC 2131/2132): decode requests, encode replies.
//!
//! Generalized from this codebase's pre-existing hand-rolled parser
//! (`parser/dhcp_parser.rs`) and reply encoder (`proxydhcp/server.rs`),
//! extended to the full option set the netboot decision engine needs:
//! user-class (77), client arch (93), client UUID (97), and the
//! vendor-encapsulated PXE sub-options (43).

use std::net::Ipv4Addr;

use macaddr::MacAddr6;

use crate::error::ParseError;

/// DHCP magic cookie: 0x63825363.
const DHCP_MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

/// Minimum DHCP packet size up to (not including) the magic cookie.
const MIN_DHCP_SIZE: usize = 236;

pub mod option_codes {
    pub const PAD: u8 = 0;
    pub const SUBNET_MASK: u8 = 1;
    pub const ROUTER: u8 = 3;
    pub const DOMAIN_NAME_SERVER: u8 = 6;
    pub const LOG_SERVER: u8 = 7;
    pub const HOSTNAME: u8 = 12;
    pub const DOMAIN_NAME: u8 = 15;
    pub const BROADCAST_ADDR: u8 = 28;
    pub const REQUESTED_IP: u8 = 50;
    pub const LEASE_TIME: u8 = 51;
    pub const MESSAGE_TYPE: u8 = 53;
    pub const SERVER_ID: u8 = 54;
    pub const PARAMETER_LIST: u8 = 55;
    pub const RENEWAL_TIME: u8 = 58;
    pub const REBINDING_TIME: u8 = 59;
    pub const VENDOR_CLASS_ID: u8 = 60;
    pub const CLIENT_ID: u8 = 61;
    pub const TFTP_SERVER_NAME: u8 = 66;
    pub const BOOTFILE_NAME: u8 = 67;
    pub const USER_CLASS: u8 = 77;
    pub const CLIENT_ARCH: u8 = 93;
    pub const CLIENT_NDI: u8 = 94;
    pub const CLIENT_UUID: u8 = 97;
    pub const PXE_VENDOR_SPECIFIC: u8 = 43;
    pub const END: u8 = 255;
}

/// DHCP message types as defined in RFC 2131.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpMessageType {
    Discover,
    Offer,
    Request,
    Decline,
    Ack,
    Nak,
    Release,
    Inform,
}

impl DhcpMessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Discover),
            2 => Some(Self::Offer),
            3 => Some(Self::Request),
            4 => Some(Self::Decline),
            5 => Some(Self::Ack),
            6 => Some(Self::Nak),
            7 => Some(Self::Release),
            8 => Some(Self::Inform),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Discover => 1,
            Self::Offer => 2,
            Self::Request => 3,
            Self::Decline => 4,
            Self::Ack => 5,
            Self::Nak => 6,
            Self::Release => 7,
            Self::Inform => 8,
        }
    }
}

/// Relevant DHCP options, both for packets we decode and packets we build.
#[derive(Debug, Clone, PartialEq)]
pub enum DhcpOption {
    MessageType(DhcpMessageType),
    RequestedIp(Ipv4Addr),
    ServerIdentifier(Ipv4Addr),
    VendorClassId(String),
    ClientId(Vec<u8>),
    UserClass(Vec<u8>),
    ClientArch(u16),
    ClientNdi(Vec<u8>),
    ClientUuid(Vec<u8>),
    SubnetMask(Ipv4Addr),
    Router(Ipv4Addr),
    DomainNameServers(Vec<Ipv4Addr>),
    LogServer(Ipv4Addr),
    Hostname(String),
    DomainName(String),
    BroadcastAddr(Ipv4Addr),
    LeaseTime(u32),
    RenewalTime(u32),
    RebindingTime(u32),
    TftpServerName(String),
    BootfileName(String),
    PxeVendorSpecific(Vec<u8>),
    Unknown(u8, Vec<u8>),
}

/// A parsed DHCP packet's relevant fields.
#[derive(Debug, Clone)]
pub struct DhcpMessage {
    pub op: u8,
    pub htype: u8,
    pub hlen: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: MacAddr6,
    pub options: Vec<DhcpOption>,
}

impl DhcpMessage {
    pub fn is_request(&self) -> bool {
        self.op == 1
    }
}

/// Decode a DHCPv4 packet from a raw UDP payload.
pub fn decode(data: &[u8]) -> Result<DhcpMessage, ParseError> {
    if data.len() < MIN_DHCP_SIZE {
        return Err(ParseError::PacketTooShort {
            expected: MIN_DHCP_SIZE,
            actual: data.len(),
        });
    }

    let op = data[0];
    let htype = data[1];
    let hlen = data[2];
    let xid = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    let secs = u16::from_be_bytes([data[8], data[9]]);
    let flags = u16::from_be_bytes([data[10], data[11]]);

    let ciaddr = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
    let yiaddr = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
    let siaddr = Ipv4Addr::new(data[20], data[21], data[22], data[23]);
    let giaddr = Ipv4Addr::new(data[24], data[25], data[26], data[27]);

    let chaddr = MacAddr6::new(data[28], data[29], data[30], data[31], data[32], data[33]);

    if data.len() < 240 {
        return Err(ParseError::PacketTooShort {
            expected: 240,
            actual: data.len(),
        });
    }

    if data[236..240] != DHCP_MAGIC_COOKIE {
        return Err(ParseError::InvalidMagicCookie);
    }

    let options = decode_options(&data[240..])?;

    Ok(DhcpMessage {
        op,
        htype,
        hlen,
        xid,
        secs,
        flags,
        ciaddr,
        yiaddr,
        siaddr,
        giaddr,
        chaddr,
        options,
    })
}

fn decode_options(data: &[u8]) -> Result<Vec<DhcpOption>, ParseError> {
    let mut options = Vec::new();
    let mut offset = 0;

    while offset < data.len() {
        let code = data[offset];

        if code == option_codes::PAD {
            offset += 1;
            continue;
        }

        if code == option_codes::END {
            break;
        }

        if offset + 1 >= data.len() {
            return Err(ParseError::InvalidOption {
                offset,
                message: "option length missing".to_string(),
            });
        }

        let len = data[offset + 1] as usize;

        if offset + 2 + len > data.len() {
            return Err(ParseError::InvalidOption {
                offset,
                message: format!(
                    "option data truncated: expected {} bytes, have {}",
                    len,
                    data.len() - offset - 2
                ),
            });
        }

        let opt_data = &data[offset + 2..offset + 2 + len];

        if let Some(option) = decode_option(code, opt_data) {
            options.push(option);
        }

        offset += 2 + len;
    }

    Ok(options)
}

fn decode_option(code: u8, data: &[u8]) -> Option<DhcpOption> {
    use option_codes::*;

    match code {
        MESSAGE_TYPE => {
            let t = *data.first()?;
            DhcpMessageType::from_u8(t).map(DhcpOption::MessageType)
        }
        REQUESTED_IP if data.len() >= 4 => {
            Some(DhcpOption::RequestedIp(Ipv4Addr::new(data[0], data[1], data[2], data[3])))
        }
        SERVER_ID if data.len() >= 4 => Some(DhcpOption::ServerIdentifier(Ipv4Addr::new(
            data[0], data[1], data[2], data[3],
        ))),
        VENDOR_CLASS_ID => String::from_utf8(data.to_vec()).ok().map(DhcpOption::VendorClassId),
        CLIENT_ID => Some(DhcpOption::ClientId(data.to_vec())),
        USER_CLASS if !data.is_empty() => Some(DhcpOption::UserClass(data.to_vec())),
        CLIENT_ARCH if data.len() >= 2 => Some(DhcpOption::ClientArch(u16::from_be_bytes([data[0], data[1]]))),
        CLIENT_NDI => Some(DhcpOption::ClientNdi(data.to_vec())),
        CLIENT_UUID => Some(DhcpOption::ClientUuid(data.to_vec())),
        PXE_VENDOR_SPECIFIC => Some(DhcpOption::PxeVendorSpecific(data.to_vec())),
        LOG_SERVER if data.len() >= 4 => Some(DhcpOption::LogServer(Ipv4Addr::new(data[0], data[1], data[2], data[3]))),
        RENEWAL_TIME if data.len() >= 4 => {
            Some(DhcpOption::RenewalTime(u32::from_be_bytes([data[0], data[1], data[2], data[3]])))
        }
        REBINDING_TIME if data.len() >= 4 => {
            Some(DhcpOption::RebindingTime(u32::from_be_bytes([data[0], data[1], data[2], data[3]])))
        }
        TFTP_SERVER_NAME => String::from_utf8(data.to_vec()).ok().map(DhcpOption::TftpServerName),
        _ => Some(DhcpOption::Unknown(code, data.to_vec())),
    }
}

/// Append an option's code/len/data (or, for `Unknown`, its raw form) to
/// `buf`. Multi-byte string/list options are written verbatim.
fn encode_option(buf: &mut Vec<u8>, option: &DhcpOption) {
    use option_codes::*;

    match option {
        DhcpOption::MessageType(t) => push_tlv(buf, MESSAGE_TYPE, &[t.as_u8()]),
        DhcpOption::RequestedIp(ip) => push_tlv(buf, REQUESTED_IP, &ip.octets()),
        DhcpOption::ServerIdentifier(ip) => push_tlv(buf, SERVER_ID, &ip.octets()),
        DhcpOption::VendorClassId(s) => push_tlv(buf, VENDOR_CLASS_ID, s.as_bytes()),
        DhcpOption::ClientId(bytes) => push_tlv(buf, CLIENT_ID, bytes),
        DhcpOption::UserClass(bytes) => push_tlv(buf, USER_CLASS, bytes),
        DhcpOption::ClientArch(arch) => push_tlv(buf, CLIENT_ARCH, &arch.to_be_bytes()),
        DhcpOption::ClientNdi(bytes) => push_tlv(buf, CLIENT_NDI, bytes),
        DhcpOption::ClientUuid(bytes) => push_tlv(buf, CLIENT_UUID, bytes),
        DhcpOption::SubnetMask(ip) => push_tlv(buf, SUBNET_MASK, &ip.octets()),
        DhcpOption::Router(ip) => push_tlv(buf, ROUTER, &ip.octets()),
        DhcpOption::DomainNameServers(ips) => {
            let bytes: Vec<u8> = ips.iter().flat_map(|ip| ip.octets()).collect();
            push_tlv(buf, DOMAIN_NAME_SERVER, &bytes);
        }
        DhcpOption::LogServer(ip) => push_tlv(buf, LOG_SERVER, &ip.octets()),
        DhcpOption::Hostname(s) => push_tlv(buf, HOSTNAME, s.as_bytes()),
        DhcpOption::DomainName(s) => push_tlv(buf, DOMAIN_NAME, s.as_bytes()),
        DhcpOption::BroadcastAddr(ip) => push_tlv(buf, BROADCAST_ADDR, &ip.octets()),
        DhcpOption::LeaseTime(secs) => push_tlv(buf, LEASE_TIME, &secs.to_be_bytes()),
        DhcpOption::RenewalTime(secs) => push_tlv(buf, RENEWAL_TIME, &secs.to_be_bytes()),
        DhcpOption::RebindingTime(secs) => push_tlv(buf, REBINDING_TIME, &secs.to_be_bytes()),
        DhcpOption::TftpServerName(s) => push_tlv(buf, TFTP_SERVER_NAME, s.as_bytes()),
        DhcpOption::BootfileName(s) => push_tlv(buf, BOOTFILE_NAME, s.as_bytes()),
        DhcpOption::PxeVendorSpecific(bytes) => push_tlv(buf, PXE_VENDOR_SPECIFIC, bytes),
        DhcpOption::Unknown(code, bytes) => push_tlv(buf, *code, bytes),
    }
}

fn push_tlv(buf: &mut Vec<u8>, code: u8, data: &[u8]) {
    buf.push(code);
    buf.push(data.len().min(255) as u8);
    buf.extend_from_slice(&data[..data.len().min(255)]);
}

/// Encode a reply (OFFER/ACK/NAK/INFORM-reply) built from a request's
/// header fields and a list of options the caller has already decided on.
///
/// `yiaddr`/`siaddr` are left at `0.0.0.0` when not applicable (e.g. NAK).
#[allow(clippy::too_many_arguments)]
pub fn encode_reply(
    request: &DhcpMessage,
    msg_type: DhcpMessageType,
    yiaddr: Ipv4Addr,
    siaddr: Ipv4Addr,
    server_name: &str,
    boot_file: &str,
    options: &[DhcpOption],
) -> Vec<u8> {
    let mut reply = vec![0u8; 236];

    reply[0] = 2; // BOOTREPLY
    reply[1] = request.htype;
    reply[2] = request.hlen;
    reply[4..8].copy_from_slice(&request.xid.to_be_bytes());
    reply[8..10].copy_from_slice(&request.secs.to_be_bytes());
    reply[10..12].copy_from_slice(&request.flags.to_be_bytes());
    reply[12..16].copy_from_slice(&request.ciaddr.octets());
    reply[16..20].copy_from_slice(&yiaddr.octets());
    reply[20..24].copy_from_slice(&siaddr.octets());
    reply[24..28].copy_from_slice(&request.giaddr.octets());

    let mac = request.chaddr.as_bytes();
    reply[28..34].copy_from_slice(mac);

    let sname_bytes = server_name.as_bytes();
    let sname_len = sname_bytes.len().min(63);
    reply[44..44 + sname_len].copy_from_slice(&sname_bytes[..sname_len]);

    let file_bytes = boot_file.as_bytes();
    let file_len = file_bytes.len().min(127);
    reply[108..108 + file_len].copy_from_slice(&file_bytes[..file_len]);

    reply.extend_from_slice(&DHCP_MAGIC_COOKIE);

    reply.push(option_codes::MESSAGE_TYPE);
    reply.push(1);
    reply.push(msg_type.as_u8());

    for opt in options {
        encode_option(&mut reply, opt);
    }

    reply.push(option_codes::END);

    reply
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_discover() -> Vec<u8> {
        let mut packet = vec![0u8; 300];
        packet[0] = 1;
        packet[1] = 1;
        packet[2] = 6;
        packet[4..8].copy_from_slice(&0x1234_5678u32.to_be_bytes());
        packet[28..34].copy_from_slice(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        packet[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);
        packet[240] = option_codes::MESSAGE_TYPE;
        packet[241] = 1;
        packet[242] = 1;
        packet[243] = option_codes::END;
        packet
    }

    #[test]
    fn decodes_minimal_discover() {
        let msg = decode(&minimal_discover()).unwrap();
        assert_eq!(msg.xid, 0x1234_5678);
        assert_eq!(msg.chaddr, MacAddr6::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff));
        assert!(matches!(
            msg.options.first(),
            Some(DhcpOption::MessageType(DhcpMessageType::Discover))
        ));
    }

    #[test]
    fn rejects_short_packet() {
        let packet = vec![0u8; 100];
        assert!(matches!(decode(&packet), Err(ParseError::PacketTooShort { .. })));
    }

    #[test]
    fn rejects_bad_magic_cookie() {
        let mut packet = minimal_discover();
        packet[236] = 0;
        assert!(matches!(decode(&packet), Err(ParseError::InvalidMagicCookie)));
    }

    #[test]
    fn decodes_pxe_options() {
        let mut packet = vec![0u8; 260];
        packet[0] = 1;
        packet[236..240].copy_from_slice(&DHCP_MAGIC_COOKIE);
        let mut offset = 240;
        packet[offset] = option_codes::USER_CLASS;
        packet[offset + 1] = 4;
        packet[offset + 2..offset + 6].copy_from_slice(b"iPXE");
        offset += 6;
        packet[offset] = option_codes::CLIENT_ARCH;
        packet[offset + 1] = 2;
        packet[offset + 2..offset + 4].copy_from_slice(&7u16.to_be_bytes());
        offset += 4;
        packet[offset] = option_codes::END;

        let msg = decode(&packet[..offset + 1]).unwrap();
        assert!(msg
            .options
            .iter()
            .any(|o| matches!(o, DhcpOption::UserClass(b) if b == b"iPXE")));
        assert!(msg.options.iter().any(|o| matches!(o, DhcpOption::ClientArch(7))));
    }

    #[test]
    fn encode_reply_roundtrips_fixed_fields() {
        let request = decode(&minimal_discover()).unwrap();
        let reply = encode_reply(
            &request,
            DhcpMessageType::Offer,
            Ipv4Addr::new(10, 0, 0, 10),
            Ipv4Addr::new(10, 0, 0, 1),
            "10.0.0.1",
            "undionly.kpxe",
            &[DhcpOption::ServerIdentifier(Ipv4Addr::new(10, 0, 0, 1))],
        );

        assert_eq!(reply[0], 2);
        assert_eq!(&reply[4..8], &0x1234_5678u32.to_be_bytes());
        assert_eq!(&reply[16..20], &[10, 0, 0, 10]);
        assert_eq!(&reply[28..34], &[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);
        assert_eq!(&reply[108..108 + 13], b"undionly.kpxe");

        let decoded = decode(&reply).unwrap();
        assert!(matches!(
            decoded.options.first(),
            Some(DhcpOption::MessageType(DhcpMessageType::Offer))
        ));
    }

    #[test]
    fn encodes_log_server_renewal_rebinding_and_tftp_server_name() {
        let request = decode(&minimal_discover()).unwrap();
        let reply = encode_reply(
            &request,
            DhcpMessageType::Offer,
            Ipv4Addr::new(10, 0, 0, 10),
            Ipv4Addr::new(10, 0, 0, 1),
            "10.0.0.1",
            "undionly.kpxe",
            &[
                DhcpOption::LogServer(Ipv4Addr::new(10, 0, 0, 9)),
                DhcpOption::RenewalTime(1800),
                DhcpOption::RebindingTime(3150),
                DhcpOption::TftpServerName("10.0.0.1".to_string()),
            ],
        );

        let decoded = decode(&reply).unwrap();
        assert!(decoded
            .options
            .iter()
            .any(|o| matches!(o, DhcpOption::LogServer(ip) if *ip == Ipv4Addr::new(10, 0, 0, 9))));
        assert!(decoded.options.iter().any(|o| matches!(o, DhcpOption::RenewalTime(1800))));
        assert!(decoded.options.iter().any(|o| matches!(o, DhcpOption::RebindingTime(3150))));
        assert!(decoded
            .options
            .iter()
            .any(|o| matches!(o, DhcpOption::TftpServerName(s) if s == "10.0.0.1")));
    }
}
