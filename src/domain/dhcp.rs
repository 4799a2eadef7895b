//! DHCP packet domain models.
//!
//! These types represent the logical structure of a BOOTP/DHCP packet,
//! independent of wire format parsing.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use macaddr::MacAddr6;

use super::protocol::{ArpHardwareType, BootpMessageType, DhcpMessageType};

/// DHCP magic cookie: 0x63825363
pub const DHCP_MAGIC_COOKIE: u32 = 0x6382_5363;

/// DHCP option codes
pub mod option_codes {
    pub const PAD: u8 = 0;
    pub const SUBNET_MASK: u8 = 1;
    pub const TIME_OFFSET: u8 = 2;
    pub const ROUTER: u8 = 3;
    pub const TIME_SERVER: u8 = 4;
    pub const DOMAIN_NAME_SERVER: u8 = 6;
    pub const HOST_NAME: u8 = 12;
    pub const DOMAIN_NAME: u8 = 15;
    pub const BROADCAST_ADDRESS: u8 = 28;
    pub const VENDOR_OPTIONS: u8 = 43;
    pub const REQUESTED_IP: u8 = 50;
    pub const LEASE_TIME: u8 = 51;
    pub const OPTION_OVERLOAD: u8 = 52;
    pub const MESSAGE_TYPE: u8 = 53;
    pub const SERVER_ID: u8 = 54;
    pub const PARAMETER_REQUEST_LIST: u8 = 55;
    pub const MAX_MESSAGE_SIZE: u8 = 57;
    pub const RENEWAL_TIME: u8 = 58;
    pub const REBINDING_TIME: u8 = 59;
    pub const VENDOR_CLASS_ID: u8 = 60;
    pub const CLIENT_ID: u8 = 61;
    pub const BOOTFILE_NAME: u8 = 67;
    pub const USER_CLASS: u8 = 77;
    pub const CLIENT_FQDN: u8 = 81;
    pub const CLIENT_ARCH: u8 = 93;
    pub const SUBNET_SELECTION: u8 = 118;
    pub const END: u8 = 255;
}

/// A hardware address as carried in `chaddr` or option 61.
///
/// `address` is lower-case colon-separated hex. `hw_type` is `None` when the
/// wire value is outside the RFC 1700 table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HardwareAddress {
    pub hw_type: Option<ArpHardwareType>,
    pub address: String,
}

impl HardwareAddress {
    pub fn new(hw_type: Option<ArpHardwareType>, address: impl Into<String>) -> Self {
        Self {
            hw_type,
            address: address.into().to_lowercase(),
        }
    }

    /// An Ethernet address.
    pub fn ethernet(mac: MacAddr6) -> Self {
        Self::from_bytes(Some(ArpHardwareType::Ethernet), mac.as_bytes())
    }

    pub fn from_bytes(hw_type: Option<ArpHardwareType>, bytes: &[u8]) -> Self {
        Self {
            hw_type,
            address: format_hex_address(bytes),
        }
    }

    /// Decode the colon-hex string back into raw octets.
    pub fn to_bytes(&self) -> Option<Vec<u8>> {
        if self.address.is_empty() {
            return Some(Vec::new());
        }
        self.address
            .split(':')
            .map(|part| {
                if part.is_empty() || part.len() > 2 {
                    return None;
                }
                u8::from_str_radix(part, 16).ok()
            })
            .collect()
    }
}

/// Format bytes as lower-case colon-separated hex (`08:00:27:9b:d9:be`).
pub fn format_hex_address(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Option 81: Client FQDN (RFC 4702).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fqdn {
    pub flags: u8,
    pub name: String,
}

/// An option code we do not decode, kept for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnhandledOption {
    pub code: u8,
    pub len: u8,
}

/// The decoded option table of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DhcpOptions {
    /// Option 1
    pub subnet_mask: Option<Ipv4Addr>,
    /// Option 2
    pub time_offset: Option<u32>,
    /// Option 3
    pub router_options: Option<Vec<Ipv4Addr>>,
    /// Option 4
    pub time_server_option: Option<Vec<Ipv4Addr>>,
    /// Option 6
    pub domain_name_server_option: Option<Vec<Ipv4Addr>>,
    /// Option 12
    pub host_name: Option<String>,
    /// Option 15
    pub domain_name: Option<String>,
    /// Option 28
    pub broadcast_address: Option<Ipv4Addr>,
    /// Option 43: vendor sub-options keyed by sub-option code
    pub vendor_options: Option<BTreeMap<u8, Vec<u8>>>,
    /// Option 50
    pub requested_ip_address: Option<Ipv4Addr>,
    /// Option 51
    pub ip_address_lease_time: Option<u32>,
    /// Option 52
    pub option_overload: Option<u8>,
    /// Option 53
    pub dhcp_message_type: Option<DhcpMessageType>,
    /// Option 54
    pub server_identifier: Option<Ipv4Addr>,
    /// Option 55
    pub parameter_request_list: Option<Vec<u8>>,
    /// Option 57
    pub maximum_message_size: Option<u16>,
    /// Option 58
    pub renewal_time_value: Option<u32>,
    /// Option 59
    pub rebinding_time_value: Option<u32>,
    /// Option 60 (e.g., "PXEClient:Arch:00000:UNDI:002001")
    pub vendor_class_identifier: Option<String>,
    /// Option 61
    pub client_identifier: Option<HardwareAddress>,
    /// Option 67
    pub boot_file_name: Option<String>,
    /// Option 77 (e.g., "iPXE" or "MonoRail")
    pub user_class: Option<String>,
    /// Option 81
    pub fully_qualified_domain_name: Option<Fqdn>,
    /// Option 93: client system architecture (RFC 4578)
    pub arch_type: Option<u16>,
    /// Option 118
    pub subnet_address: Option<Ipv4Addr>,
}

/// A parsed, or to-be-built, BOOTP/DHCP message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// `None` if the wire value was neither BOOTREQUEST nor BOOTREPLY
    pub op: Option<BootpMessageType>,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Option<Ipv4Addr>,
    pub yiaddr: Option<Ipv4Addr>,
    pub siaddr: Option<Ipv4Addr>,
    pub giaddr: Option<Ipv4Addr>,
    /// Client hardware address; its type is the packet's `htype`
    pub chaddr: HardwareAddress,
    pub sname: String,
    pub fname: String,
    pub magic: u32,
    pub options: DhcpOptions,
    /// Options skipped while parsing
    pub unhandled_options: Vec<UnhandledOption>,
}

impl Message {
    /// A BOOTREQUEST skeleton for an Ethernet client.
    pub fn new(xid: u32, mac: MacAddr6) -> Self {
        Self {
            op: Some(BootpMessageType::Request),
            hlen: 6,
            xid,
            chaddr: HardwareAddress::ethernet(mac),
            magic: DHCP_MAGIC_COOKIE,
            ..Default::default()
        }
    }

    /// Returns true if this is a client request (BOOTREQUEST).
    pub fn is_request(&self) -> bool {
        self.op == Some(BootpMessageType::Request)
    }

    /// The client MAC in canonical lower-case form.
    pub fn mac_address(&self) -> &str {
        &self.chaddr.address
    }

    pub fn message_type(&self) -> Option<DhcpMessageType> {
        self.options.dhcp_message_type
    }

    pub fn vendor_class_id(&self) -> Option<&str> {
        self.options.vendor_class_identifier.as_deref()
    }

    pub fn user_class(&self) -> Option<&str> {
        self.options.user_class.as_deref()
    }

    pub fn arch_type(&self) -> Option<u16> {
        self.options.arch_type
    }
}
