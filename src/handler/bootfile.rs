//! Default boot file selection.
//!
//! A pure, ordered rule table over the client's vendor class, user class,
//! MAC prefix and architecture. The first matching rule wins.

use tracing::{debug, info};

use crate::config::Config;
use crate::domain::{ClientArch, Message};

/// Mellanox NICs ship FlexBoot and go straight to the profiles API.
const MELLANOX_OUI: &str = "00:02:c9";

/// Intel NUCs need their own iPXE build.
const INTEL_NUC_OUI: &str = "ec:a8:6b";

const PROFILES_PATH: &str = "/api/current/profiles";

pub const INTEL_NUC_BOOTFILE: &str = "monorail.intel.ipxe";
pub const EFI64_BOOTFILE: &str = "monorail-efi64-snponly.efi";
pub const EFI32_BOOTFILE: &str = "monorail-efi32-snponly.efi";
pub const UNDI_BOOTFILE: &str = "monorail-undionly.kpxe";
pub const IPXE_BOOTFILE: &str = "monorail.ipxe";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootfileRules {
    /// User class of our own iPXE build
    user_class: String,
    api_server_address: String,
    api_server_port: u16,
}

impl BootfileRules {
    pub fn new(
        user_class: impl Into<String>,
        api_server_address: impl Into<String>,
        api_server_port: u16,
    ) -> Self {
        Self {
            user_class: user_class.into(),
            api_server_address: api_server_address.into(),
            api_server_port,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.user_class.clone(),
            config.api_server_address.clone(),
            config.api_server_port,
        )
    }

    fn profiles_url(&self) -> String {
        format!(
            "http://{}:{}{}",
            self.api_server_address, self.api_server_port, PROFILES_PATH
        )
    }

    /// Pick the boot file for `message`, or `None` if it gets nothing.
    pub fn default_bootfile(&self, message: &Message) -> Option<String> {
        let mac = message.mac_address().to_lowercase();
        let vendor_class = message.vendor_class_id();
        let arch = message.arch_type();

        debug!(
            user_class = ?message.user_class(),
            vendor_class = ?vendor_class,
            arch = ?arch.map(ClientArch::from_u16),
            "Selecting default bootfile"
        );

        if message.user_class() == Some(self.user_class.as_str()) {
            return Some(self.profiles_url());
        }

        // Arista skips the TFTP step and asks the API directly.
        if vendor_class.is_some_and(|vc| vc.starts_with("Arista")) {
            return Some(format!("{}?macs={}", self.profiles_url(), mac));
        }

        if mac.starts_with(MELLANOX_OUI) {
            return Some(self.profiles_url());
        }

        if mac.starts_with(INTEL_NUC_OUI) {
            info!(mac = %mac, "Sending {} for a NUC MAC address", INTEL_NUC_BOOTFILE);
            return Some(INTEL_NUC_BOOTFILE.to_string());
        }

        let vendor_class = vendor_class?;
        let bootfile = match arch.map(ClientArch::from_u16) {
            Some(ClientArch::EfiBc | ClientArch::EfiX86_64) => EFI64_BOOTFILE,
            Some(ClientArch::EfiIa32) => EFI32_BOOTFILE,
            Some(ClientArch::IntelX86Bios) if vendor_class.contains("UNDI") => UNDI_BOOTFILE,
            _ => IPXE_BOOTFILE,
        };
        Some(bootfile.to_string())
    }
}
