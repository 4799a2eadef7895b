//! ProxyDHCP UDP server.
//!
//! Receives BOOTP/DHCP requests on the configured port, hands each one to
//! the [`MessageHandler`] on its own task and unicasts any ACK back to the
//! client's `ciaddr`.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::handler::MessageHandler;
use crate::packet::ProxyAck;

/// Largest datagram we accept.
const MAX_PACKET_SIZE: usize = 1500;

/// Destination ports for replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyPorts {
    /// Legacy (BIOS) PXE clients
    pub out_port: u16,
    /// x86 EFI clients
    pub efi_out_port: u16,
}

impl ReplyPorts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            out_port: config.out_port,
            efi_out_port: config.efi_out_port,
        }
    }

    pub fn destination(&self, ack: &ProxyAck) -> SocketAddrV4 {
        let port = if ack.is_efi {
            self.efi_out_port
        } else {
            self.out_port
        };
        SocketAddrV4::new(ack.destination, port)
    }
}

pub struct ProxyDhcpServer {
    socket: Arc<UdpSocket>,
    handler: Arc<MessageHandler>,
    ports: ReplyPorts,
}

impl ProxyDhcpServer {
    /// Bind the listening socket. Must be called inside a tokio runtime.
    pub fn bind(config: &Config, handler: Arc<MessageHandler>) -> Result<Self> {
        let socket = create_socket(
            config.bind_address,
            config.bind_port,
            config.interface.as_deref(),
        )?;

        Ok(Self {
            socket: Arc::new(socket),
            handler,
            ports: ReplyPorts::from_config(config),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .context("Failed to read proxyDHCP socket address")
    }

    /// Serve until `shutdown` flips.
    ///
    /// A receive failure is fatal and returned; send failures are only
    /// logged.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        info!(
            addr = %self.local_addr()?,
            out_port = self.ports.out_port,
            efi_out_port = self.ports.efi_out_port,
            "ProxyDHCP server listening"
        );

        let mut buf = vec![0u8; MAX_PACKET_SIZE];

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    let (len, from) = received.context("ProxyDHCP socket receive failed")?;
                    debug!(%from, len, "Received datagram");
                    self.dispatch(buf[..len].to_vec());
                }
                _ = shutdown.changed() => {
                    info!("ProxyDHCP server stopped");
                    return Ok(());
                }
            }
        }
    }

    fn dispatch(&self, data: Vec<u8>) {
        let socket = self.socket.clone();
        let handler = self.handler.clone();
        let ports = self.ports;

        tokio::spawn(async move {
            let Some(ack) = handler.handle_packet(&data).await else {
                return;
            };

            let dest = ports.destination(&ack);
            match socket.send_to(&ack.packet, dest).await {
                Ok(_) => debug!(%dest, efi = ack.is_efi, "Sent DHCP ACK"),
                Err(e) => error!(%dest, error = %e, "Failed to send DHCP ACK"),
            }
        });
    }
}

/// Create the listening UDP socket with broadcast enabled.
fn create_socket(address: Ipv4Addr, port: u16, interface: Option<&str>) -> Result<UdpSocket> {
    use socket2::{Domain, Protocol, Socket, Type};

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .context("Failed to create socket")?;

    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;

    if let Some(name) = interface {
        bind_to_interface(&socket, name)?;
    }

    socket.set_nonblocking(true)?;

    let addr = SocketAddrV4::new(address, port);
    socket
        .bind(&addr.into())
        .with_context(|| format!("Failed to bind to {}", addr))?;

    UdpSocket::from_std(socket.into()).context("Failed to register socket with tokio")
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn bind_to_interface(socket: &socket2::Socket, name: &str) -> Result<()> {
    socket
        .bind_device(Some(name.as_bytes()))
        .with_context(|| format!("Failed to bind to interface {}", name))
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn bind_to_interface(_socket: &socket2::Socket, name: &str) -> Result<()> {
    tracing::warn!(interface = name, "Binding to an interface is not supported here, ignoring");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use macaddr::MacAddr6;

    use super::*;
    use crate::domain::{DhcpMessageType, Message};
    use crate::packet::serialize;
    use crate::parser::DhcpParser;
    use crate::services::FileRegistry;

    fn ack(is_efi: bool) -> ProxyAck {
        ProxyAck {
            packet: Vec::new(),
            destination: Ipv4Addr::new(10, 1, 1, 50),
            is_efi,
        }
    }

    #[test]
    fn legacy_reply_port() {
        let ports = ReplyPorts::from_config(&Config::default());
        assert_eq!(
            ports.destination(&ack(false)),
            SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 50), 68)
        );
    }

    #[test]
    fn efi_reply_port() {
        let ports = ReplyPorts {
            out_port: 68,
            efi_out_port: 4011,
        };
        assert_eq!(
            ports.destination(&ack(true)),
            SocketAddrV4::new(Ipv4Addr::new(10, 1, 1, 50), 4011)
        );
    }

    #[tokio::test]
    async fn create_socket_on_ephemeral_port() {
        let socket = create_socket(Ipv4Addr::LOCALHOST, 0, None).unwrap();
        let addr = socket.local_addr().unwrap();
        assert_eq!(addr.ip(), Ipv4Addr::LOCALHOST);
        assert_ne!(addr.port(), 0);
    }

    #[tokio::test]
    async fn answers_request_on_loopback() {
        let dir = tempfile::TempDir::new().unwrap();
        let client = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let client_port = client.local_addr().unwrap().port();

        let mut config = Config::default();
        config.bind_address = Ipv4Addr::LOCALHOST;
        config.bind_port = 0;
        config.out_port = client_port;
        config.data_dir = dir.path().to_path_buf();

        let registry = Arc::new(FileRegistry::new(config.data_dir.clone()));
        let handler = Arc::new(MessageHandler::new(
            &config,
            registry.clone(),
            registry.clone(),
            registry,
        ));
        let server = ProxyDhcpServer::bind(&config, handler).unwrap();
        let server_addr = server.local_addr().unwrap();

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(server.run(rx));

        let mut request = Message::new(0x1234, MacAddr6::new(0x08, 0x00, 0x27, 0x9b, 0xd9, 0xbe));
        request.ciaddr = Some(Ipv4Addr::LOCALHOST);
        request.options.dhcp_message_type = Some(DhcpMessageType::Request);
        request.options.vendor_class_identifier =
            Some("PXEClient:Arch:00000:UNDI:002001".to_string());
        request.options.arch_type = Some(0);
        client
            .send_to(&serialize(&request).unwrap(), server_addr)
            .await
            .unwrap();

        let mut buf = [0u8; MAX_PACKET_SIZE];
        let (len, _) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let reply = DhcpParser::new().parse(&buf[..len]).unwrap();
        assert_eq!(reply.xid, 0x1234);
        assert_eq!(reply.fname, "monorail-undionly.kpxe");
        assert_eq!(reply.message_type(), Some(DhcpMessageType::Ack));

        tx.send(true).unwrap();
        task.await.unwrap().unwrap();
    }
}
