//! pxe-proxy - a proxyDHCP responder for PXE/EFI network boot.
//!
//! Listens for BOOTP/DHCP requests, never leases addresses itself, and
//! answers clients that should network boot with a unicast DHCP ACK naming
//! the boot file. The decision consults a node registry and its active
//! tasks; see [`handler::MessageHandler`].

pub mod config;
pub mod domain;
pub mod error;
pub mod handler;
pub mod leases;
pub mod packet;
pub mod parser;
pub mod proxydhcp;
pub mod services;
