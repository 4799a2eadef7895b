//! Closed BOOTP/DHCP value sets.
//!
//! Every enumeration is built from its wire value with `from_value`, which
//! returns `None` for codes outside the set. Callers compare typed variants,
//! never raw numbers.

use std::fmt;

/// BOOTP `op` field (RFC 951).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootpMessageType {
    Request,
    Reply,
}

impl BootpMessageType {
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Request),
            2 => Some(Self::Reply),
            _ => None,
        }
    }

    pub fn value(self) -> u8 {
        match self {
            Self::Request => 1,
            Self::Reply => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Request => "BOOTPREQUEST",
            Self::Reply => "BOOTPREPLY",
        }
    }
}

impl fmt::Display for BootpMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// ARP hardware types from RFC 1700, as carried in `htype`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArpHardwareType {
    Ethernet,
    ExperimentalEthernet,
    AmateurRadioAx25,
    ProteonTokenRing,
    Chaos,
    Ieee802Networks,
    Arcnet,
    Hyperchannel,
    Lanstar,
}

impl ArpHardwareType {
    pub fn from_value(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Ethernet),
            2 => Some(Self::ExperimentalEthernet),
            3 => Some(Self::AmateurRadioAx25),
            4 => Some(Self::ProteonTokenRing),
            5 => Some(Self::Chaos),
            6 => Some(Self::Ieee802Networks),
            7 => Some(Self::Arcnet),
            8 => Some(Self::Hyperchannel),
            9 => Some(Self::Lanstar),
            _ => None,
        }
    }

    pub fn value(self) -> u8 {
        match self {
            Self::Ethernet => 1,
            Self::ExperimentalEthernet => 2,
            Self::AmateurRadioAx25 => 3,
            Self::ProteonTokenRing => 4,
            Self::Chaos => 5,
            Self::Ieee802Networks => 6,
            Self::Arcnet => 7,
            Self::Hyperchannel => 8,
            Self::Lanstar => 9,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Ethernet => "HW_ETHERNET",
            Self::ExperimentalEthernet => "HW_EXPERIMENTAL_ETHERNET",
            Self::AmateurRadioAx25 => "HW_AMATEUR_RADIO_AX_25",
            Self::ProteonTokenRing => "HW_PROTEON_TOKEN_RING",
            Self::Chaos => "HW_CHAOS",
            Self::Ieee802Networks => "HW_IEEE_802_NETWORKS",
            Self::Arcnet => "HW_ARCNET",
            Self::Hyperchannel => "HW_HYPERCHANNEL",
            Self::Lanstar => "HW_LANSTAR",
        }
    }
}

impl fmt::Display for ArpHardwareType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// DHCP message types as defined in RFC 2131 (option 53).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
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
    pub fn from_value(value: u8) -> Option<Self> {
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

    pub fn value(self) -> u8 {
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

    pub fn name(self) -> &'static str {
        match self {
            Self::Discover => "DHCPDISCOVER",
            Self::Offer => "DHCPOFFER",
            Self::Request => "DHCPREQUEST",
            Self::Decline => "DHCPDECLINE",
            Self::Ack => "DHCPACK",
            Self::Nak => "DHCPNAK",
            Self::Release => "DHCPRELEASE",
            Self::Inform => "DHCPINFORM",
        }
    }
}

impl fmt::Display for DhcpMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod bootp_message_type_tests {
        use super::*;

        #[test]
        fn test_from_value() {
            assert_eq!(BootpMessageType::from_value(1), Some(BootpMessageType::Request));
            assert_eq!(BootpMessageType::from_value(2), Some(BootpMessageType::Reply));
            assert_eq!(BootpMessageType::from_value(0), None);
            assert_eq!(BootpMessageType::from_value(3), None);
        }

        #[test]
        fn test_display() {
            assert_eq!(BootpMessageType::Request.to_string(), "BOOTPREQUEST");
            assert_eq!(BootpMessageType::Reply.to_string(), "BOOTPREPLY");
        }
    }

    mod arp_hardware_type_tests {
        use super::*;

        #[test]
        fn test_value_roundtrip() {
            for value in 1..=9u8 {
                let hw = ArpHardwareType::from_value(value).unwrap();
                assert_eq!(hw.value(), value);
            }
        }

        #[test]
        fn test_unknown_values() {
            assert_eq!(ArpHardwareType::from_value(0), None);
            assert_eq!(ArpHardwareType::from_value(10), None);
            assert_eq!(ArpHardwareType::from_value(255), None);
        }

        #[test]
        fn test_names() {
            assert_eq!(ArpHardwareType::Ethernet.name(), "HW_ETHERNET");
            assert_eq!(ArpHardwareType::Lanstar.to_string(), "HW_LANSTAR");
        }
    }

    mod dhcp_message_type_tests {
        use super::*;

        #[test]
        fn test_from_value_valid_values() {
            assert_eq!(DhcpMessageType::from_value(1), Some(DhcpMessageType::Discover));
            assert_eq!(DhcpMessageType::from_value(3), Some(DhcpMessageType::Request));
            assert_eq!(DhcpMessageType::from_value(5), Some(DhcpMessageType::Ack));
            assert_eq!(DhcpMessageType::from_value(7), Some(DhcpMessageType::Release));
            assert_eq!(DhcpMessageType::from_value(8), Some(DhcpMessageType::Inform));
        }

        #[test]
        fn test_from_value_invalid_values() {
            assert_eq!(DhcpMessageType::from_value(0), None);
            assert_eq!(DhcpMessageType::from_value(9), None);
            assert_eq!(DhcpMessageType::from_value(255), None);
        }

        #[test]
        fn test_value_matches_wire_code() {
            for value in 1..=8u8 {
                assert_eq!(DhcpMessageType::from_value(value).unwrap().value(), value);
            }
        }

        #[test]
        fn test_display() {
            assert_eq!(DhcpMessageType::Discover.to_string(), "DHCPDISCOVER");
            assert_eq!(DhcpMessageType::Ack.to_string(), "DHCPACK");
        }
    }
}
