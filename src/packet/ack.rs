//! ProxyDHCP acknowledgment construction.

use std::net::Ipv4Addr;

use crate::domain::{
    ArpHardwareType, BootpMessageType, ClientArch, DhcpMessageType, DhcpOptions, Message,
};
use crate::error::EncodeError;

use super::serialize;

/// A serialized ACK and where to send it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyAck {
    pub packet: Vec<u8>,
    /// The client's `ciaddr`
    pub destination: Ipv4Addr,
    /// EFI firmware listens on a different port than legacy PXE ROMs
    pub is_efi: bool,
}

/// True for x86 EFI firmware talking to us directly.
///
/// iPXE sets a user class, so once it has been chain-loaded the client is
/// answered like a legacy one again.
pub fn is_efi_client(message: &Message) -> bool {
    message.user_class().is_none()
        && message
            .arch_type()
            .map(|arch| ClientArch::from_u16(arch).is_x86_efi())
            .unwrap_or(false)
}

/// Build a DHCPACK telling `client` to boot `bootfile`.
///
/// Header fields are copied from the client message; every option except
/// the message type and boot file name is dropped. `gateway` goes into
/// `siaddr` and `sname`.
pub fn build_ack(client: &Message, bootfile: &str, gateway: Ipv4Addr) -> Result<ProxyAck, EncodeError> {
    let destination = client.ciaddr.ok_or(EncodeError::MissingField("ciaddr"))?;
    let is_efi = is_efi_client(client);

    // EFI firmware reads option 67 as a C string.
    let option_bootfile = if is_efi {
        format!("{}\0", bootfile)
    } else {
        bootfile.to_string()
    };

    let mut reply = client.clone();
    reply.op = Some(BootpMessageType::Reply);
    reply.chaddr.hw_type = Some(ArpHardwareType::Ethernet);
    reply.fname = bootfile.to_string();
    reply.siaddr = Some(gateway);
    reply.sname = gateway.to_string();
    reply.unhandled_options.clear();
    reply.options = DhcpOptions {
        dhcp_message_type: Some(DhcpMessageType::Ack),
        boot_file_name: Some(option_bootfile),
        ..Default::default()
    };

    Ok(ProxyAck {
        packet: serialize(&reply)?,
        destination,
        is_efi,
    })
}

#[cfg(test)]
mod tests {
    use macaddr::MacAddr6;

    use super::*;
    use crate::parser::DhcpParser;

    const GATEWAY: Ipv4Addr = Ipv4Addr::new(10, 1, 1, 1);

    fn client_message() -> Message {
        let mut msg = Message::new(0x1234, MacAddr6::new(0x08, 0x00, 0x27, 0x9b, 0xd9, 0xbe));
        msg.ciaddr = Some(Ipv4Addr::new(10, 1, 1, 50));
        msg.options.dhcp_message_type = Some(DhcpMessageType::Request);
        msg.options.vendor_class_identifier = Some("PXEClient:Arch:00000:UNDI:002001".to_string());
        msg.options.arch_type = Some(0);
        msg.options.parameter_request_list = Some(vec![1, 3, 67]);
        msg
    }

    mod efi_detection_tests {
        use super::*;

        #[test]
        fn test_efi_arch_without_user_class() {
            for arch in [6, 7, 9] {
                let mut msg = client_message();
                msg.options.arch_type = Some(arch);
                assert!(is_efi_client(&msg), "arch {arch}");
            }
        }

        #[test]
        fn test_user_class_means_not_efi() {
            let mut msg = client_message();
            msg.options.arch_type = Some(7);
            msg.options.user_class = Some("iPXE".to_string());
            assert!(!is_efi_client(&msg));
        }

        #[test]
        fn test_other_arches_are_legacy() {
            for arch in [0, 2, 10, 11] {
                let mut msg = client_message();
                msg.options.arch_type = Some(arch);
                assert!(!is_efi_client(&msg), "arch {arch}");
            }

            let mut msg = client_message();
            msg.options.arch_type = None;
            assert!(!is_efi_client(&msg));
        }
    }

    mod build_ack_tests {
        use super::*;

        #[test]
        fn test_legacy_ack() {
            let ack = build_ack(&client_message(), "monorail.ipxe", GATEWAY).unwrap();
            assert_eq!(ack.destination, Ipv4Addr::new(10, 1, 1, 50));
            assert!(!ack.is_efi);

            let reply = DhcpParser::new().parse(&ack.packet).unwrap();
            assert_eq!(reply.op, Some(BootpMessageType::Reply));
            assert_eq!(reply.chaddr.hw_type, Some(ArpHardwareType::Ethernet));
            assert_eq!(reply.xid, 0x1234);
            assert_eq!(reply.ciaddr, Some(Ipv4Addr::new(10, 1, 1, 50)));
            assert_eq!(reply.siaddr, Some(GATEWAY));
            assert_eq!(reply.sname, "10.1.1.1");
            assert_eq!(reply.fname, "monorail.ipxe");
            assert_eq!(reply.message_type(), Some(DhcpMessageType::Ack));
            assert_eq!(reply.options.boot_file_name.as_deref(), Some("monorail.ipxe"));
        }

        #[test]
        fn test_other_options_are_cleared() {
            let ack = build_ack(&client_message(), "monorail.ipxe", GATEWAY).unwrap();
            let reply = DhcpParser::new().parse(&ack.packet).unwrap();

            assert_eq!(
                reply.options,
                DhcpOptions {
                    dhcp_message_type: Some(DhcpMessageType::Ack),
                    boot_file_name: Some("monorail.ipxe".to_string()),
                    ..Default::default()
                }
            );
        }

        #[test]
        fn test_efi_ack_terminates_option_67() {
            let mut msg = client_message();
            msg.options.arch_type = Some(9);

            let ack = build_ack(&msg, "monorail-efi64-snponly.efi", GATEWAY).unwrap();
            assert!(ack.is_efi);

            let reply = DhcpParser::new().parse(&ack.packet).unwrap();
            assert_eq!(reply.fname, "monorail-efi64-snponly.efi");
            assert_eq!(
                reply.options.boot_file_name.as_deref(),
                Some("monorail-efi64-snponly.efi\0")
            );
        }

        #[test]
        fn test_missing_ciaddr() {
            let mut msg = client_message();
            msg.ciaddr = None;
            assert_eq!(
                build_ack(&msg, "monorail.ipxe", GATEWAY),
                Err(EncodeError::MissingField("ciaddr"))
            );
        }

        #[test]
        fn test_bootfile_too_long() {
            let url = format!("http://10.1.1.1/{}", "x".repeat(120));
            assert!(matches!(
                build_ack(&client_message(), &url, GATEWAY),
                Err(EncodeError::FieldTooLong { field: "fname", .. })
            ));
        }
    }
}
