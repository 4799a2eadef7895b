//! Per-packet request handling.
//!
//! Parses a datagram, decides what boot file (if any) the client gets, and
//! builds the ACK. The IP registration runs alongside the decision.

mod bootfile;
mod pipeline;

use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::domain::{BootAction, ClientArch, Message};
use crate::error::{HandlerError, ParseError, ServiceError};
use crate::packet::{build_ack, ProxyAck};
use crate::parser::DhcpParser;
use crate::services::{IpRegistration, NodeLookup, NodeStore, TaskProtocol};

pub use bootfile::BootfileRules;
pub use pipeline::{Pipeline, PipelineContext, Resolution, Stage, StageOutcome};

pub struct MessageHandler {
    parser: DhcpParser,
    pipeline: Pipeline,
    lookup: Arc<dyn NodeLookup>,
    rules: BootfileRules,
    gateway: Ipv4Addr,
    send_boot_file_name_check: bool,
}

impl MessageHandler {
    pub fn new(
        config: &Config,
        lookup: Arc<dyn NodeLookup>,
        tasks: Arc<dyn TaskProtocol>,
        store: Arc<dyn NodeStore>,
    ) -> Self {
        Self {
            parser: DhcpParser::new(),
            pipeline: Pipeline::new(lookup.clone(), tasks, store),
            lookup,
            rules: BootfileRules::from_config(config),
            gateway: config.gateway,
            send_boot_file_name_check: config.send_boot_file_name_check,
        }
    }

    /// Handle one datagram; `None` means stay silent.
    ///
    /// Failures are logged here and never reach the transport.
    pub async fn handle_packet(&self, data: &[u8]) -> Option<ProxyAck> {
        match self.respond(data).await {
            Ok(ack) => ack,
            Err(HandlerError::Parse(e)) => {
                error!(error = %e, "Error parsing DHCP packet");
                None
            }
            Err(HandlerError::Encode(e)) => {
                error!(error = %e, "Failed to build DHCP ACK");
                None
            }
            Err(HandlerError::Service(e)) => {
                warn!(error = %e, "Failed to get bootfile information");
                None
            }
        }
    }

    /// Parse, decide and build the reply.
    pub async fn respond(&self, data: &[u8]) -> Result<Option<ProxyAck>, HandlerError> {
        let message = self.parser.parse(data)?;

        if !message.is_request() {
            debug!(op = ?message.op, "Ignoring packet that is not a BOOTREQUEST");
            return Ok(None);
        }

        if message.chaddr.address.is_empty() {
            return Err(missing_field("chaddr").into());
        }
        let ciaddr = message.ciaddr.ok_or_else(|| missing_field("ciaddr"))?;
        let mac = message.mac_address();

        info!(
            mac = %mac,
            xid = format_args!("0x{:08x}", message.xid),
            message_type = ?message.message_type(),
            arch = ?message.arch_type().map(ClientArch::from_u16),
            "DHCP request"
        );

        let (action, registration) = tokio::join!(
            self.decide(&message),
            self.lookup.register_ip(ciaddr, mac)
        );
        let action = action?;

        if registration? == IpRegistration::Suppressed {
            info!(mac = %mac, "Registry asked not to answer this node");
            return Ok(None);
        }

        let Some(bootfile) = action.bootfile() else {
            info!(mac = %mac, "No bootfile name is sent to node");
            return Ok(None);
        };

        let ack = build_ack(&message, bootfile, self.gateway)?;
        info!(mac = %mac, bootfile = %bootfile, efi = ack.is_efi, "Sending bootfile name to node");
        Ok(Some(ack))
    }

    /// Decide what to boot.
    ///
    /// With the pre-check enabled, a warranted client gets the default boot
    /// file directly; otherwise the full stage pipeline runs.
    pub async fn decide(&self, message: &Message) -> Result<BootAction, ServiceError> {
        if self.send_boot_file_name_check {
            if !self.pipeline.boot_file_warranted(message).await {
                return Ok(BootAction::Ignore);
            }
            return Ok(self.rules.default_bootfile(message).into());
        }

        let mut ctx = PipelineContext::new(message);
        let resolution = self.pipeline.run(&mut ctx).await?;
        Ok(resolution.into_action(&self.rules, message))
    }
}

fn missing_field(field: &'static str) -> ParseError {
    ParseError::InvalidField {
        field,
        message: "missing".to_string(),
    }
}
