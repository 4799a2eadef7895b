//! DHCP packet encoding.
//!
//! The counterpart of [`crate::parser`]: turns domain messages back into
//! bytes and builds the proxyDHCP acknowledgment.

mod ack;
mod serializer;

pub use ack::{build_ack, is_efi_client, ProxyAck};
pub use serializer::serialize;
