//! ISC dhcpd lease file support.
//!
//! The DHCP server that actually hands out addresses writes every lease to
//! `dhcpd.leases`. Feeding those leases into the registry lets nodes be
//! matched to their IP before they ever PXE boot.

mod poller;

use std::net::Ipv4Addr;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use tracing::debug;

pub use poller::LeasePoller;

const LEASE_PATTERN: &str = r"^lease\s+(\S+)\s*\{";
const ENDS_PATTERN: &str = r"^ends\s+(?:never|\d+\s+(\d{4}/\d{1,2}/\d{1,2}\s+\d{1,2}:\d{2}:\d{2}))\s*;";
const HARDWARE_PATTERN: &str = r"^hardware\s+ethernet\s+([0-9A-Fa-f:]+)\s*;";

const ENDS_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// An unexpired lease from the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub ip: Ipv4Addr,
    /// Lowercase, colon separated
    pub mac: String,
}

/// Line-oriented parser for `dhcpd.leases` blocks.
#[derive(Debug, Clone)]
pub struct LeaseParser {
    lease: Regex,
    ends: Regex,
    hardware: Regex,
}

struct Block {
    ip: Option<Ipv4Addr>,
    /// Stays set until an `ends` line in the future (or `never`) is seen
    expired: bool,
    mac: Option<String>,
}

impl LeaseParser {
    pub fn new() -> Result<Self> {
        Ok(Self {
            lease: Regex::new(LEASE_PATTERN).context("Failed to compile lease regex")?,
            ends: Regex::new(ENDS_PATTERN).context("Failed to compile ends regex")?,
            hardware: Regex::new(HARDWARE_PATTERN).context("Failed to compile hardware regex")?,
        })
    }

    /// Parse every complete block in `text`, keeping leases that have not
    /// ended by `now`. Lease times in the file are UTC.
    pub fn parse(&self, text: &str, now: DateTime<Utc>) -> Vec<Lease> {
        let mut leases = Vec::new();
        let mut block: Option<Block> = None;

        for line in text.lines().map(str::trim) {
            if let Some(caps) = self.lease.captures(line) {
                let ip = caps[1].parse().ok();
                if ip.is_none() {
                    debug!(value = &caps[1], "Skipping lease with invalid IP address");
                }
                block = Some(Block {
                    ip,
                    expired: true,
                    mac: None,
                });
                continue;
            }

            let Some(current) = block.as_mut() else {
                continue;
            };

            if let Some(caps) = self.ends.captures(line) {
                current.expired = match caps.get(1) {
                    Some(when) => ends_before(when.as_str(), now),
                    None => false,
                };
            } else if let Some(caps) = self.hardware.captures(line) {
                current.mac = normalize_mac(&caps[1]);
                if current.mac.is_none() {
                    debug!(value = &caps[1], "Skipping lease with invalid MAC address");
                }
            } else if line.starts_with('}') {
                if let Some(lease) = block.take().and_then(Block::into_lease) {
                    leases.push(lease);
                }
            }
        }

        leases
    }
}

impl Block {
    fn into_lease(self) -> Option<Lease> {
        if self.expired {
            return None;
        }
        Some(Lease {
            ip: self.ip?,
            mac: self.mac?,
        })
    }
}

/// Convenience wrapper over a freshly built [`LeaseParser`].
pub fn parse_leases(text: &str, now: DateTime<Utc>) -> Result<Vec<Lease>> {
    Ok(LeaseParser::new()?.parse(text, now))
}

/// An unparseable end time counts as expired.
fn ends_before(value: &str, now: DateTime<Utc>) -> bool {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    match NaiveDateTime::parse_from_str(&normalized, ENDS_FORMAT) {
        Ok(ends) => ends.and_utc() <= now,
        Err(e) => {
            debug!(value, error = %e, "Unparseable lease end time");
            true
        }
    }
}

fn normalize_mac(value: &str) -> Option<String> {
    let octets: Vec<&str> = value.split(':').collect();
    let valid = octets.len() == 6
        && octets
            .iter()
            .all(|o| (1..=2).contains(&o.len()) && o.chars().all(|c| c.is_ascii_hexdigit()));
    if !valid {
        return None;
    }
    Some(
        octets
            .iter()
            .map(|o| format!("{:0>2}", o.to_lowercase()))
            .collect::<Vec<_>>()
            .join(":"),
    )
}
