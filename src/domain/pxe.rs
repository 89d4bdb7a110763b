//! PXE client architecture (DHCP option 93, RFC 4578).

use std::fmt;

/// PXE client system architecture types as defined in RFC 4578.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PxeClientArch {
    IntelX86Bios,
    NecPc98,
    Efi386,
    EfiBC,
    EfiX64,
    EfiArm32,
    EfiArm64,
    Unknown(u16),
}

impl PxeClientArch {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::IntelX86Bios,
            1 => Self::NecPc98,
            2 => Self::Efi386,
            6 => Self::EfiBC,
            7 => Self::EfiX64,
            9 => Self::EfiArm32,
            11 => Self::EfiArm64,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            Self::IntelX86Bios => 0,
            Self::NecPc98 => 1,
            Self::Efi386 => 2,
            Self::EfiBC => 6,
            Self::EfiX64 => 7,
            Self::EfiArm32 => 9,
            Self::EfiArm64 => 11,
            Self::Unknown(v) => *v,
        }
    }

    /// True for the legacy-BIOS arches the decision engine routes to the
    /// `tftp-bin` stage (spec §4.D.4, testable property 4: arch ∈ {0, 6}).
    pub fn is_legacy_bios(&self) -> bool {
        matches!(self.as_u16(), 0 | 6)
    }

    /// True for the UEFI HTTP Boot capable arches the decision engine
    /// routes to the `http-bin` stage (spec §4.D.4, testable property 5:
    /// arch ∈ {7, 9, 11}).
    pub fn is_uefi_http_boot(&self) -> bool {
        matches!(self.as_u16(), 7 | 9 | 11)
    }
}

impl fmt::Display for PxeClientArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntelX86Bios => write!(f, "x86 BIOS"),
            Self::NecPc98 => write!(f, "NEC/PC98"),
            Self::Efi386 => write!(f, "EFI x86"),
            Self::EfiBC => write!(f, "EFI BC"),
            Self::EfiX64 => write!(f, "EFI x64"),
            Self::EfiArm32 => write!(f, "EFI ARM32"),
            Self::EfiArm64 => write!(f, "EFI ARM64"),
            Self::Unknown(code) => write!(f, "Unknown({code})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_bios_arches() {
        assert!(PxeClientArch::from_u16(0).is_legacy_bios());
        assert!(PxeClientArch::from_u16(6).is_legacy_bios());
        assert!(!PxeClientArch::from_u16(7).is_legacy_bios());
    }

    #[test]
    fn uefi_http_boot_arches() {
        assert!(PxeClientArch::from_u16(7).is_uefi_http_boot());
        assert!(PxeClientArch::from_u16(9).is_uefi_http_boot());
        assert!(PxeClientArch::from_u16(11).is_uefi_http_boot());
        assert!(!PxeClientArch::from_u16(0).is_uefi_http_boot());
    }

    #[test]
    fn roundtrips_through_u16() {
        for v in [0u16, 1, 2, 6, 7, 9, 11, 42] {
            assert_eq!(PxeClientArch::from_u16(v).as_u16(), v);
        }
    }
}
