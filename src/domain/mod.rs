//! Domain models for the proxyDHCP responder.
//!
//! This module contains the core domain types that are independent
//! of any infrastructure concerns.

mod boot;
mod dhcp;
mod protocol;
mod pxe;

pub use boot::{BootAction, NodeId};
pub use dhcp::{
    format_hex_address, option_codes, DhcpOptions, Fqdn, HardwareAddress, Message, UnhandledOption,
    DHCP_MAGIC_COOKIE,
};
pub use protocol::{ArpHardwareType, BootpMessageType, DhcpMessageType};
pub use pxe::ClientArch;
