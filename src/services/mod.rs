//! Collaborators consulted by the boot decision.
//!
//! The handler only sees these traits. [`FileRegistry`] implements all of
//! them over a data directory; tests supply in-memory mocks.

mod file_registry;

use std::net::Ipv4Addr;

use async_trait::async_trait;

use crate::domain::NodeId;
use crate::error::ServiceError;

pub use file_registry::FileRegistry;

/// Persisted boot configuration of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootSettings {
    pub profile: String,
}

/// A node as the registry knows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    /// Whether discovery (hardware catalog) has completed for this node
    pub discovered: bool,
    pub boot_settings: Option<BootSettings>,
}

/// Answer to an IP registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpRegistration {
    Recorded,
    /// The registry asks us not to answer this client.
    Suppressed,
}

/// Node lookup by hardware address, and IP bookkeeping.
#[async_trait]
pub trait NodeLookup: Send + Sync {
    /// Fails with [`ServiceError::NotFound`] for unknown MACs.
    async fn node_by_mac(&self, mac: &str) -> Result<Node, ServiceError>;

    async fn register_ip(&self, ip: Ipv4Addr, mac: &str) -> Result<IpRegistration, ServiceError>;
}

/// Task orchestration.
#[async_trait]
pub trait TaskProtocol: Send + Sync {
    /// `Ok` when the node has an active task, [`ServiceError::NotFound`] otherwise.
    async fn active_task_exists(&self, node_id: &NodeId) -> Result<(), ServiceError>;

    /// The boot file the node's active task wants served.
    async fn request_boot_profile(&self, node_id: &NodeId) -> Result<String, ServiceError>;
}

/// Node records by identifier.
#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn find_by_identifier(&self, node_id: &NodeId) -> Result<Node, ServiceError>;
}
