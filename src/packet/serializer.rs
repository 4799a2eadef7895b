//! DHCP packet serializer.
//!
//! Writes a [`Message`] back to the RFC 2131 wire layout read by
//! [`DhcpParser`](crate::parser::DhcpParser).

use std::net::Ipv4Addr;

use crate::domain::{option_codes, HardwareAddress, Message, DHCP_MAGIC_COOKIE};
use crate::error::EncodeError;

/// Smallest packet BOOTP relays and old clients accept
const MIN_PACKET_SIZE: usize = 300;

/// Largest packet we put on an Ethernet link
const MAX_PACKET_SIZE: usize = 1500;

const SNAME_LEN: usize = 64;
const FNAME_LEN: usize = 128;
const CHADDR_LEN: usize = 16;
const ETHERNET_ADDR_LEN: usize = 6;

/// Serialize a message into a padded wire packet.
///
/// Only the options present on the message are written, in ascending code
/// order, followed by the end marker. Fails without producing bytes when a
/// field does not fit its wire slot.
pub fn serialize(message: &Message) -> Result<Vec<u8>, EncodeError> {
    let hw = ethernet_bytes(&message.chaddr)?;
    let sname = bounded("sname", &message.sname, SNAME_LEN)?;
    let fname = bounded("fname", &message.fname, FNAME_LEN)?;

    let mut packet = Vec::with_capacity(MAX_PACKET_SIZE);

    packet.push(message.op.map(|op| op.value()).unwrap_or(0));
    packet.push(message.chaddr.hw_type.map(|t| t.value()).unwrap_or(0));
    packet.push(message.hlen);
    packet.push(message.hops);
    packet.extend_from_slice(&message.xid.to_be_bytes());
    packet.extend_from_slice(&message.secs.to_be_bytes());
    packet.extend_from_slice(&message.flags.to_be_bytes());

    for addr in [message.ciaddr, message.yiaddr, message.siaddr, message.giaddr] {
        packet.extend_from_slice(&addr.unwrap_or(Ipv4Addr::UNSPECIFIED).octets());
    }

    put_padded(&mut packet, &hw, CHADDR_LEN);
    put_padded(&mut packet, sname, SNAME_LEN);
    put_padded(&mut packet, fname, FNAME_LEN);
    packet.extend_from_slice(&DHCP_MAGIC_COOKIE.to_be_bytes());

    write_options(&mut packet, message)?;
    packet.push(option_codes::END);

    if packet.len() % 2 != 0 {
        packet.push(0);
    }
    if packet.len() < MIN_PACKET_SIZE {
        packet.resize(MIN_PACKET_SIZE, 0);
    }

    if packet.len() > MAX_PACKET_SIZE {
        return Err(EncodeError::FieldTooLong {
            field: "packet",
            max: MAX_PACKET_SIZE,
            actual: packet.len(),
        });
    }

    Ok(packet)
}

/// The chaddr as exactly six octets.
fn ethernet_bytes(chaddr: &HardwareAddress) -> Result<Vec<u8>, EncodeError> {
    match chaddr.to_bytes() {
        Some(bytes) if bytes.len() == ETHERNET_ADDR_LEN => Ok(bytes),
        _ => Err(EncodeError::InvalidHardwareAddress(chaddr.address.clone())),
    }
}

fn bounded<'a>(field: &'static str, value: &'a str, max: usize) -> Result<&'a [u8], EncodeError> {
    let bytes = value.as_bytes();
    if bytes.len() > max {
        return Err(EncodeError::FieldTooLong {
            field,
            max,
            actual: bytes.len(),
        });
    }
    Ok(bytes)
}

/// Copy `bytes` and zero-fill up to `width`.
fn put_padded(packet: &mut Vec<u8>, bytes: &[u8], width: usize) {
    packet.extend_from_slice(bytes);
    packet.resize(packet.len() + (width - bytes.len()), 0);
}

fn write_options(packet: &mut Vec<u8>, message: &Message) -> Result<(), EncodeError> {
    let opts = &message.options;
    let mut w = OptionWriter { packet };

    if let Some(mask) = opts.subnet_mask {
        w.put(option_codes::SUBNET_MASK, &mask.octets())?;
    }
    if let Some(offset) = opts.time_offset {
        w.put(option_codes::TIME_OFFSET, &offset.to_be_bytes())?;
    }
    if let Some(routers) = &opts.router_options {
        w.put_ipv4_list(option_codes::ROUTER, routers)?;
    }
    if let Some(servers) = &opts.time_server_option {
        w.put_ipv4_list(option_codes::TIME_SERVER, servers)?;
    }
    if let Some(servers) = &opts.domain_name_server_option {
        w.put_ipv4_list(option_codes::DOMAIN_NAME_SERVER, servers)?;
    }
    if let Some(name) = &opts.host_name {
        w.put(option_codes::HOST_NAME, name.as_bytes())?;
    }
    if let Some(name) = &opts.domain_name {
        w.put(option_codes::DOMAIN_NAME, name.as_bytes())?;
    }
    if let Some(addr) = opts.broadcast_address {
        w.put(option_codes::BROADCAST_ADDRESS, &addr.octets())?;
    }
    if let Some(table) = &opts.vendor_options {
        let mut value = Vec::new();
        for (sub_code, data) in table {
            if matches!(*sub_code, option_codes::PAD | option_codes::END) {
                return Err(EncodeError::ReservedSubOption {
                    code: option_codes::VENDOR_OPTIONS,
                    sub_code: *sub_code,
                });
            }
            let len = u8::try_from(data.len()).map_err(|_| EncodeError::OptionTooLong {
                code: option_codes::VENDOR_OPTIONS,
                len: data.len(),
            })?;
            value.push(*sub_code);
            value.push(len);
            value.extend_from_slice(data);
        }
        w.put(option_codes::VENDOR_OPTIONS, &value)?;
    }
    if let Some(addr) = opts.requested_ip_address {
        w.put(option_codes::REQUESTED_IP, &addr.octets())?;
    }
    if let Some(secs) = opts.ip_address_lease_time {
        w.put(option_codes::LEASE_TIME, &secs.to_be_bytes())?;
    }
    if let Some(overload) = opts.option_overload {
        w.put(option_codes::OPTION_OVERLOAD, &[overload])?;
    }
    if let Some(message_type) = opts.dhcp_message_type {
        w.put(option_codes::MESSAGE_TYPE, &[message_type.value()])?;
    }
    if let Some(addr) = opts.server_identifier {
        w.put(option_codes::SERVER_ID, &addr.octets())?;
    }
    if let Some(list) = &opts.parameter_request_list {
        w.put(option_codes::PARAMETER_REQUEST_LIST, list)?;
    }
    if let Some(size) = opts.maximum_message_size {
        w.put(option_codes::MAX_MESSAGE_SIZE, &size.to_be_bytes())?;
    }
    if let Some(secs) = opts.renewal_time_value {
        w.put(option_codes::RENEWAL_TIME, &secs.to_be_bytes())?;
    }
    if let Some(secs) = opts.rebinding_time_value {
        w.put(option_codes::REBINDING_TIME, &secs.to_be_bytes())?;
    }
    if let Some(vendor_class) = &opts.vendor_class_identifier {
        w.put(option_codes::VENDOR_CLASS_ID, vendor_class.as_bytes())?;
    }
    if let Some(id) = &opts.client_identifier {
        let address = id
            .to_bytes()
            .ok_or_else(|| EncodeError::InvalidHardwareAddress(id.address.clone()))?;
        let mut value = Vec::with_capacity(1 + address.len());
        value.push(id.hw_type.map(|t| t.value()).unwrap_or(0));
        value.extend_from_slice(&address);
        w.put(option_codes::CLIENT_ID, &value)?;
    }
    if let Some(name) = &opts.boot_file_name {
        w.put(option_codes::BOOTFILE_NAME, name.as_bytes())?;
    }
    if let Some(user_class) = &opts.user_class {
        w.put(option_codes::USER_CLASS, user_class.as_bytes())?;
    }
    if let Some(fqdn) = &opts.fully_qualified_domain_name {
        // flags, rcode1, rcode2, name
        let mut value = vec![fqdn.flags, 0, 0];
        value.extend_from_slice(fqdn.name.as_bytes());
        w.put(option_codes::CLIENT_FQDN, &value)?;
    }
    if let Some(arch) = opts.arch_type {
        w.put(option_codes::CLIENT_ARCH, &arch.to_be_bytes())?;
    }
    if let Some(addr) = opts.subnet_address {
        w.put(option_codes::SUBNET_SELECTION, &addr.octets())?;
    }

    Ok(())
}

struct OptionWriter<'a> {
    packet: &'a mut Vec<u8>,
}

impl OptionWriter<'_> {
    fn put(&mut self, code: u8, value: &[u8]) -> Result<(), EncodeError> {
        let len = u8::try_from(value.len()).map_err(|_| EncodeError::OptionTooLong {
            code,
            len: value.len(),
        })?;
        self.packet.push(code);
        self.packet.push(len);
        self.packet.extend_from_slice(value);
        Ok(())
    }

    /// Empty lists are rejected; the option carries at least one address.
    fn put_ipv4_list(&mut self, code: u8, addrs: &[Ipv4Addr]) -> Result<(), EncodeError> {
        if addrs.is_empty() {
            return Err(EncodeError::EmptyAddressList(code));
        }
        let value: Vec<u8> = addrs.iter().flat_map(|a| a.octets()).collect();
        self.put(code, &value)
    }
}
