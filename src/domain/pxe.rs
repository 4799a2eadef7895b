//! PXE-specific domain models.

use std::fmt;

/// Client system architecture types as defined in RFC 4578 (option 93).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientArch {
    IntelX86Bios,
    NecPc98,
    EfiItanium,
    DecAlpha,
    ArcX86,
    IntelLeanClient,
    EfiIa32,
    EfiBc,
    EfiXscale,
    EfiX86_64,
    EfiArm32,
    EfiArm64,
    Unknown(u16),
}

impl ClientArch {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => Self::IntelX86Bios,
            1 => Self::NecPc98,
            2 => Self::EfiItanium,
            3 => Self::DecAlpha,
            4 => Self::ArcX86,
            5 => Self::IntelLeanClient,
            6 => Self::EfiIa32,
            7 => Self::EfiBc,
            8 => Self::EfiXscale,
            9 => Self::EfiX86_64,
            10 => Self::EfiArm32,
            11 => Self::EfiArm64,
            other => Self::Unknown(other),
        }
    }

    pub fn value(self) -> u16 {
        match self {
            Self::IntelX86Bios => 0,
            Self::NecPc98 => 1,
            Self::EfiItanium => 2,
            Self::DecAlpha => 3,
            Self::ArcX86 => 4,
            Self::IntelLeanClient => 5,
            Self::EfiIa32 => 6,
            Self::EfiBc => 7,
            Self::EfiXscale => 8,
            Self::EfiX86_64 => 9,
            Self::EfiArm32 => 10,
            Self::EfiArm64 => 11,
            Self::Unknown(code) => code,
        }
    }

    pub fn is_efi(self) -> bool {
        matches!(
            self,
            Self::EfiItanium
                | Self::EfiIa32
                | Self::EfiBc
                | Self::EfiXscale
                | Self::EfiX86_64
                | Self::EfiArm32
                | Self::EfiArm64
        )
    }

    /// x86 EFI firmware (codes 6, 7 and 9). These clients get the SNP-only
    /// iPXE loaders and are answered on the EFI reply port.
    pub fn is_x86_efi(self) -> bool {
        matches!(self, Self::EfiIa32 | Self::EfiBc | Self::EfiX86_64)
    }

    pub fn is_bios(self) -> bool {
        matches!(self, Self::IntelX86Bios)
    }

    /// Architecture embedded in a PXE vendor class
    /// (`PXEClient:Arch:XXXXX:UNDI:YYYYYY`).
    pub fn from_vendor_class(vendor_class: &str) -> Option<Self> {
        if !vendor_class.starts_with("PXEClient") {
            return None;
        }

        let arch_prefix = "Arch:";
        let arch_start = vendor_class.find(arch_prefix)? + arch_prefix.len();
        let remaining = &vendor_class[arch_start..];
        let arch_end = remaining
            .find(|c: char| c == ':' || c == ' ')
            .unwrap_or(remaining.len());

        remaining[..arch_end].parse().ok().map(Self::from_u16)
    }
}

impl fmt::Display for ClientArch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IntelX86Bios => write!(f, "x86 BIOS"),
            Self::NecPc98 => write!(f, "NEC/PC98"),
            Self::EfiItanium => write!(f, "EFI Itanium"),
            Self::DecAlpha => write!(f, "DEC Alpha"),
            Self::ArcX86 => write!(f, "Arc x86"),
            Self::IntelLeanClient => write!(f, "Intel Lean Client"),
            Self::EfiIa32 => write!(f, "EFI IA32"),
            Self::EfiBc => write!(f, "EFI BC"),
            Self::EfiXscale => write!(f, "EFI Xscale"),
            Self::EfiX86_64 => write!(f, "EFI x86-64"),
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
    fn test_from_u16_roundtrip() {
        for code in 0..=12u16 {
            assert_eq!(ClientArch::from_u16(code).value(), code);
        }
        assert_eq!(ClientArch::from_u16(12), ClientArch::Unknown(12));
    }

    #[test]
    fn test_is_efi() {
        assert!(ClientArch::EfiBc.is_efi());
        assert!(ClientArch::EfiArm64.is_efi());
        assert!(!ClientArch::IntelX86Bios.is_efi());
        assert!(!ClientArch::Unknown(42).is_efi());
    }

    #[test]
    fn test_is_x86_efi() {
        let x86: Vec<u16> = (0..=11)
            .filter(|code| ClientArch::from_u16(*code).is_x86_efi())
            .collect();
        assert_eq!(x86, vec![6, 7, 9]);
    }

    #[test]
    fn test_display() {
        assert_eq!(ClientArch::IntelX86Bios.to_string(), "x86 BIOS");
        assert_eq!(ClientArch::EfiX86_64.to_string(), "EFI x86-64");
        assert_eq!(ClientArch::Unknown(99).to_string(), "Unknown(99)");
    }

    mod vendor_class_tests {
        use super::*;

        #[test]
        fn test_bios_vendor_class() {
            assert_eq!(
                ClientArch::from_vendor_class("PXEClient:Arch:00000:UNDI:002001"),
                Some(ClientArch::IntelX86Bios)
            );
        }

        #[test]
        fn test_efi_vendor_class() {
            assert_eq!(
                ClientArch::from_vendor_class("PXEClient:Arch:00007:UNDI:003016"),
                Some(ClientArch::EfiBc)
            );
        }

        #[test]
        fn test_arch_at_end() {
            assert_eq!(
                ClientArch::from_vendor_class("PXEClient:Arch:00009"),
                Some(ClientArch::EfiX86_64)
            );
        }

        #[test]
        fn test_not_pxe() {
            assert_eq!(ClientArch::from_vendor_class("Arista;DCS-7050"), None);
            assert_eq!(ClientArch::from_vendor_class("PXEClient"), None);
            assert_eq!(ClientArch::from_vendor_class("PXEClient:Arch:xx"), None);
        }
    }
}
