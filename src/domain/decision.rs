//! [`BootDecision`]: what the DHCP netboot handler derived from a
//! transaction × hardware record (spec §3, §4.D).

use std::net::Ipv4Addr;

/// Which leg of the chain-load sequence a reply steers the client toward
/// (spec §4.D.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootStage {
    /// Legacy BIOS: serve `undionly.kpxe` over TFTP.
    TftpBin,
    /// UEFI HTTP Boot: serve an iPXE/SNP EFI binary over HTTP.
    HttpBin,
    /// iPXE has loaded and re-DHCP'd: hand it the operator script URL.
    HttpScript,
}

/// Derived reply shape for one DHCP transaction (spec §3).
#[derive(Debug, Clone)]
pub struct BootDecision {
    pub stage: BootStage,
    pub next_server: Ipv4Addr,
    pub boot_file_name: String,
    pub server_name: String,
    /// Set option 60 to `HTTPClient` in the reply (UEFI HTTP Boot clients
    /// must see this to accept an HTTP URL in option 67).
    pub vendor_class_id_override: Option<&'static str>,
    /// PXE vendor-encapsulated sub-options (opt 43), populated only for
    /// `PXEClient` vendor class ids (spec §4.D.5).
    pub pxe_vendor_opts: Option<PxeVendorOpts>,
}

/// Sub-options of DHCP option 43 for PXE clients (spec §4.D.5).
#[derive(Debug, Clone, Copy)]
pub struct PxeVendorOpts {
    /// Sub-opt 6: PXE_DISCOVERY_CONTROL. `0x08` skips the boot prompt.
    pub discovery_control: u8,
    /// Sub-opt 9: PXE_BOOT_MENU type tag for the single boot-menu entry
    /// this server offers (PXE clients expect at least one entry even
    /// when discovery control skips the interactive prompt).
    pub boot_menu_item_type: u16,
    /// Sub-opt 10: boot menu prompt text is supplied by the caller; this
    /// flag only records that one should be emitted.
    pub has_menu_prompt: bool,
}

impl Default for PxeVendorOpts {
    fn default() -> Self {
        Self {
            discovery_control: 0x08,
            boot_menu_item_type: 0,
            has_menu_prompt: true,
        }
    }
}
