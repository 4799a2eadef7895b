//! ProxyDHCP transport.
//!
//! Answers PXE clients with a boot file name while the site's real DHCP
//! server keeps handing out the addresses.

mod server;

pub use server::{ProxyDhcpServer, ReplyPorts};
