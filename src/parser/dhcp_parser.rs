//! DHCP packet parser implementation.
//!
//! Parses raw BOOTP/DHCP packets according to RFC 2131 and RFC 1533.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use tracing::debug;

use crate::domain::{
    option_codes, ArpHardwareType, BootpMessageType, DhcpMessageType, DhcpOptions, Fqdn,
    HardwareAddress, Message, UnhandledOption,
};
use crate::error::ParseError;

/// Fixed header plus magic cookie
const MIN_DHCP_SIZE: usize = 240;

/// Offset of the options section
const OPTIONS_OFFSET: usize = 240;

/// Size of the chaddr field
const CHADDR_LEN: usize = 16;

/// Parser for DHCP packets.
///
/// Focuses solely on turning the wire format into a [`Message`]. It holds no
/// state, so one instance can be shared by every in-flight packet.
pub struct DhcpParser;

impl DhcpParser {
    /// Create a new DHCP parser.
    pub fn new() -> Self {
        Self
    }

    /// Parse a DHCP packet from raw bytes.
    ///
    /// The input should be the UDP payload (not including IP/UDP headers).
    /// Unknown options are skipped and listed in `unhandled_options`.
    pub fn parse(&self, data: &[u8]) -> Result<Message, ParseError> {
        if data.len() < MIN_DHCP_SIZE {
            return Err(ParseError::PacketTooShort {
                expected: MIN_DHCP_SIZE,
                actual: data.len(),
            });
        }

        let htype = data[1];
        let hlen = data[2];
        if hlen as usize > CHADDR_LEN {
            return Err(ParseError::InvalidField {
                field: "hlen",
                message: format!("{} exceeds the {} byte chaddr field", hlen, CHADDR_LEN),
            });
        }

        let chaddr = HardwareAddress::from_bytes(
            ArpHardwareType::from_value(htype),
            &data[28..28 + hlen as usize],
        );

        let mut message = Message {
            op: BootpMessageType::from_value(data[0]),
            hlen,
            hops: data[3],
            xid: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            secs: u16::from_be_bytes([data[8], data[9]]),
            flags: u16::from_be_bytes([data[10], data[11]]),
            ciaddr: optional_ipv4(&data[12..16]),
            yiaddr: optional_ipv4(&data[16..20]),
            siaddr: optional_ipv4(&data[20..24]),
            giaddr: optional_ipv4(&data[24..28]),
            chaddr,
            sname: Self::parse_null_terminated_string(&data[44..108]),
            fname: Self::parse_null_terminated_string(&data[108..236]),
            magic: u32::from_be_bytes([data[236], data[237], data[238], data[239]]),
            ..Default::default()
        };

        self.parse_options(&data[OPTIONS_OFFSET..], &mut message)?;

        if !message.unhandled_options.is_empty() {
            let skipped = message
                .unhandled_options
                .iter()
                .map(|o| format!("{}:{}", o.code, o.len))
                .collect::<Vec<_>>()
                .join(",");
            debug!(mac = %message.chaddr.address, options = %skipped, "Unhandled DHCP options");
        }

        Ok(message)
    }

    /// Decode a fixed-size string field, stopping at the first NUL.
    fn parse_null_terminated_string(data: &[u8]) -> String {
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        String::from_utf8_lossy(&data[..end]).into_owned()
    }

    /// Parse DHCP options from the options section into `message`.
    fn parse_options(&self, data: &[u8], message: &mut Message) -> Result<(), ParseError> {
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

            // Regular option: code + length + data
            if offset + 1 >= data.len() {
                return Err(ParseError::InvalidOption {
                    offset: OPTIONS_OFFSET + offset,
                    code,
                    message: "option length missing".to_string(),
                });
            }

            let len = data[offset + 1] as usize;

            if offset + 2 + len > data.len() {
                return Err(ParseError::InvalidOption {
                    offset: OPTIONS_OFFSET + offset,
                    code,
                    message: format!(
                        "option data truncated: expected {} bytes, have {}",
                        len,
                        data.len() - offset - 2
                    ),
                });
            }

            let value = &data[offset + 2..offset + 2 + len];
            let field = OptionField {
                offset: OPTIONS_OFFSET + offset,
                code,
                data: value,
            };

            if !Self::parse_option(&field, &mut message.options)? {
                message.unhandled_options.push(UnhandledOption {
                    code,
                    len: len as u8,
                });
            }

            offset += 2 + len;
        }

        Ok(())
    }

    /// Decode one recognized option into `options`.
    ///
    /// Returns `Ok(false)` when the code is not one we decode.
    fn parse_option(field: &OptionField<'_>, options: &mut DhcpOptions) -> Result<bool, ParseError> {
        match field.code {
            option_codes::SUBNET_MASK => options.subnet_mask = Some(field.ipv4()?),
            option_codes::TIME_OFFSET => options.time_offset = Some(field.u32()?),
            option_codes::ROUTER => options.router_options = Some(field.ipv4_list()?),
            option_codes::TIME_SERVER => options.time_server_option = Some(field.ipv4_list()?),
            option_codes::DOMAIN_NAME_SERVER => {
                options.domain_name_server_option = Some(field.ipv4_list()?)
            }
            option_codes::HOST_NAME => options.host_name = Some(field.string()),
            option_codes::DOMAIN_NAME => options.domain_name = Some(field.string()),
            option_codes::BROADCAST_ADDRESS => options.broadcast_address = Some(field.ipv4()?),
            option_codes::VENDOR_OPTIONS => options.vendor_options = Some(field.sub_options()?),
            option_codes::REQUESTED_IP => options.requested_ip_address = Some(field.ipv4()?),
            option_codes::LEASE_TIME => options.ip_address_lease_time = Some(field.u32()?),
            option_codes::OPTION_OVERLOAD => options.option_overload = Some(field.u8()?),
            option_codes::MESSAGE_TYPE => {
                let value = field.u8()?;
                let message_type = DhcpMessageType::from_value(value)
                    .ok_or_else(|| field.invalid(format!("unknown DHCP message type {}", value)))?;
                options.dhcp_message_type = Some(message_type);
            }
            option_codes::SERVER_ID => options.server_identifier = Some(field.ipv4()?),
            option_codes::PARAMETER_REQUEST_LIST => {
                options.parameter_request_list = Some(field.data.to_vec())
            }
            option_codes::MAX_MESSAGE_SIZE => options.maximum_message_size = Some(field.u16()?),
            option_codes::RENEWAL_TIME => options.renewal_time_value = Some(field.u32()?),
            option_codes::REBINDING_TIME => options.rebinding_time_value = Some(field.u32()?),
            option_codes::VENDOR_CLASS_ID => options.vendor_class_identifier = Some(field.string()),
            option_codes::CLIENT_ID => {
                let (hw_type, address) = field
                    .data
                    .split_first()
                    .ok_or_else(|| field.invalid("client identifier is empty".to_string()))?;
                options.client_identifier = Some(HardwareAddress::from_bytes(
                    ArpHardwareType::from_value(*hw_type),
                    address,
                ));
            }
            option_codes::BOOTFILE_NAME => options.boot_file_name = Some(field.string()),
            option_codes::USER_CLASS => options.user_class = Some(field.string()),
            option_codes::CLIENT_FQDN => {
                if field.data.len() < 3 {
                    return Err(field.invalid(format!(
                        "client FQDN needs at least 3 bytes, got {}",
                        field.data.len()
                    )));
                }
                options.fully_qualified_domain_name = Some(Fqdn {
                    flags: field.data[0],
                    name: String::from_utf8_lossy(&field.data[3..]).into_owned(),
                });
            }
            option_codes::CLIENT_ARCH => options.arch_type = Some(field.u16()?),
            option_codes::SUBNET_SELECTION => options.subnet_address = Some(field.ipv4()?),
            _ => return Ok(false),
        }

        Ok(true)
    }
}

impl Default for DhcpParser {
    fn default() -> Self {
        Self::new()
    }
}

/// `None` for 0.0.0.0, which is how BOOTP says "not set".
fn optional_ipv4(bytes: &[u8]) -> Option<Ipv4Addr> {
    let addr = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
    if addr.is_unspecified() {
        None
    } else {
        Some(addr)
    }
}

/// One option's payload together with its position, for error reporting.
struct OptionField<'a> {
    offset: usize,
    code: u8,
    data: &'a [u8],
}

impl OptionField<'_> {
    fn invalid(&self, message: String) -> ParseError {
        ParseError::InvalidOption {
            offset: self.offset,
            code: self.code,
            message,
        }
    }

    fn fixed<const N: usize>(&self) -> Result<[u8; N], ParseError> {
        self.data.try_into().map_err(|_| {
            self.invalid(format!(
                "expected length {}, got {}",
                N,
                self.data.len()
            ))
        })
    }

    fn u8(&self) -> Result<u8, ParseError> {
        let [value] = self.fixed::<1>()?;
        Ok(value)
    }

    fn u16(&self) -> Result<u16, ParseError> {
        self.fixed::<2>().map(u16::from_be_bytes)
    }

    fn u32(&self) -> Result<u32, ParseError> {
        self.fixed::<4>().map(u32::from_be_bytes)
    }

    fn ipv4(&self) -> Result<Ipv4Addr, ParseError> {
        self.fixed::<4>().map(Ipv4Addr::from)
    }

    fn ipv4_list(&self) -> Result<Vec<Ipv4Addr>, ParseError> {
        if self.data.is_empty() || self.data.len() % 4 != 0 {
            return Err(self.invalid(format!(
                "address list length {} is not a multiple of 4",
                self.data.len()
            )));
        }
        Ok(self
            .data
            .chunks_exact(4)
            .map(|c| Ipv4Addr::new(c[0], c[1], c[2], c[3]))
            .collect())
    }

    fn string(&self) -> String {
        String::from_utf8_lossy(self.data).into_owned()
    }

    /// Option 43 sub-options, bounded by the outer option length.
    fn sub_options(&self) -> Result<BTreeMap<u8, Vec<u8>>, ParseError> {
        let mut table = BTreeMap::new();
        let mut offset = 0;

        while offset < self.data.len() {
            let sub_code = self.data[offset];

            if sub_code == option_codes::PAD {
                offset += 1;
                continue;
            }

            if sub_code == option_codes::END {
                break;
            }

            if offset + 1 >= self.data.len() {
                return Err(self.invalid(format!(
                    "vendor sub-option {} length missing",
                    sub_code
                )));
            }

            let len = self.data[offset + 1] as usize;
            if offset + 2 + len > self.data.len() {
                return Err(self.invalid(format!(
                    "vendor sub-option {} overruns option: expected {} bytes, have {}",
                    sub_code,
                    len,
                    self.data.len() - offset - 2
                )));
            }

            table.insert(sub_code, self.data[offset + 2..offset + 2 + len].to_vec());
            offset += 2 + len;
        }

        Ok(table)
    }
}
