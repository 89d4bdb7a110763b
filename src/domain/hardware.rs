//! Hardware inventory domain models.
//!
//! A [`HardwareRecord`] is the unit the whole decision engine revolves
//! around: one per known machine, keyed by MAC, owned by whatever backend
//! implements [`crate::backend::BackendReader`]. The core only ever reads
//! these — it never mutates or persists them (see spec §3 lifecycles).

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use macaddr::MacAddr6;

/// A kernel/initrd image location, either the globally configured OSIE or
/// a per-machine override (spec §3, `osie`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Osie {
    /// Root URL images are served from, e.g. `http://osie.example/images`.
    pub base_url: String,
    /// Kernel filename relative to `base_url`.
    pub kernel: String,
    /// Initrd filename relative to `base_url`.
    pub initrd: String,
}

impl Osie {
    pub fn new(base_url: impl Into<String>, kernel: impl Into<String>, initrd: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            kernel: kernel.into(),
            initrd: initrd.into(),
        }
    }

    pub fn kernel_url(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), self.kernel)
    }

    pub fn initrd_url(&self) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), self.initrd)
    }
}

/// Netboot policy carried on a [`HardwareRecord`] (spec §3, `netboot.*`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NetbootPolicy {
    /// Gate: if false, the DHCP handler never replies to this client, even
    /// though it's a known MAC.
    pub allow_pxe: bool,
    /// Verbatim override for the iPXE script URL, used instead of the
    /// globally configured one.
    pub ipxe_script_url: Option<String>,
}

/// One known machine, keyed by MAC address.
#[derive(Debug, Clone, PartialEq)]
pub struct HardwareRecord {
    pub mac: MacAddr6,
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub nameservers: Vec<Ipv4Addr>,
    pub hostname: String,
    pub domain: String,
    pub lease_time: Duration,
    pub vlan_id: Option<u16>,
    pub netboot: NetbootPolicy,
    pub osie: Option<Osie>,
    pub facility: String,
    pub metadata: HashMap<String, String>,
}

impl HardwareRecord {
    /// Create a minimal record with sensible defaults for the non-essential
    /// fields; callers add detail with the `with_*` builders.
    pub fn new(mac: MacAddr6, ip: Ipv4Addr) -> Self {
        Self {
            mac,
            ip,
            netmask: Ipv4Addr::new(255, 255, 255, 0),
            gateway: Ipv4Addr::UNSPECIFIED,
            nameservers: Vec::new(),
            hostname: String::new(),
            domain: String::new(),
            lease_time: Duration::from_secs(3600),
            vlan_id: None,
            netboot: NetbootPolicy {
                allow_pxe: true,
                ipxe_script_url: None,
            },
            osie: None,
            facility: String::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_netmask(mut self, netmask: Ipv4Addr) -> Self {
        self.netmask = netmask;
        self
    }

    pub fn with_gateway(mut self, gateway: Ipv4Addr) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn with_nameservers(mut self, nameservers: Vec<Ipv4Addr>) -> Self {
        self.nameservers = nameservers;
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = domain.into();
        self
    }

    pub fn with_lease_time(mut self, lease_time: Duration) -> Self {
        self.lease_time = lease_time;
        self
    }

    pub fn with_vlan_id(mut self, vlan_id: u16) -> Self {
        self.vlan_id = Some(vlan_id);
        self
    }

    pub fn with_allow_pxe(mut self, allow_pxe: bool) -> Self {
        self.netboot.allow_pxe = allow_pxe;
        self
    }

    pub fn with_ipxe_script_url(mut self, url: impl Into<String>) -> Self {
        self.netboot.ipxe_script_url = Some(url.into());
        self
    }

    pub fn with_osie(mut self, osie: Osie) -> Self {
        self.osie = Some(osie);
        self
    }

    pub fn with_facility(mut self, facility: impl Into<String>) -> Self {
        self.facility = facility.into();
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Canonical lowercase colon-separated MAC, e.g. `aa:bb:cc:dd:ee:ff`.
    pub fn mac_string(&self) -> String {
        format!("{}", self.mac).to_lowercase()
    }
}

impl fmt::Display for HardwareRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.mac_string(), self.ip)
    }
}
