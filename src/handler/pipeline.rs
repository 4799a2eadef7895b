//! Boot decision pipeline.
//!
//! Stages run in order and each consults one collaborator. A stage either
//! hands the node id on to the next stage or resolves the whole decision;
//! later stages are never started once one resolves.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::domain::{BootAction, Message, NodeId};
use crate::error::ServiceError;
use crate::services::{NodeLookup, NodeStore, TaskProtocol};

use super::bootfile::BootfileRules;

/// Per-message state carried through the stages.
#[derive(Debug)]
pub struct PipelineContext<'a> {
    pub message: &'a Message,
    pub node_id: Option<NodeId>,
    /// Set once the lookup finds the node with a completed discovery
    pub discovered: bool,
}

impl<'a> PipelineContext<'a> {
    pub fn new(message: &'a Message) -> Self {
        Self {
            message,
            node_id: None,
            discovered: false,
        }
    }

    fn mac(&self) -> &'a str {
        self.message.mac_address()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ResolveNode,
    KnownNode,
    TaskBootfile,
}

impl Stage {
    pub const ORDER: [Stage; 3] = [Stage::ResolveNode, Stage::KnownNode, Stage::TaskBootfile];
}

/// Terminal outcome of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Unknown or undiscovered node: boot it into discovery.
    Discover,
    SendDefaultBootfile,
    SendCustomBootfile(String),
    Ignore,
}

impl Resolution {
    pub fn into_action(self, rules: &BootfileRules, message: &Message) -> BootAction {
        match self {
            Resolution::Discover | Resolution::SendDefaultBootfile => {
                rules.default_bootfile(message).into()
            }
            Resolution::SendCustomBootfile(name) => BootAction::SendBootfile(name),
            Resolution::Ignore => BootAction::Ignore,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Continue(NodeId),
    Resolved(Resolution),
}

/// The collaborators the stages consult.
#[derive(Clone)]
pub struct Pipeline {
    lookup: Arc<dyn NodeLookup>,
    tasks: Arc<dyn TaskProtocol>,
    store: Arc<dyn NodeStore>,
}

impl Pipeline {
    pub fn new(
        lookup: Arc<dyn NodeLookup>,
        tasks: Arc<dyn TaskProtocol>,
        store: Arc<dyn NodeStore>,
    ) -> Self {
        Self {
            lookup,
            tasks,
            store,
        }
    }

    /// Run the stages in order until one resolves.
    ///
    /// Errors a stage does not classify abort the whole decision.
    pub async fn run(&self, ctx: &mut PipelineContext<'_>) -> Result<Resolution, ServiceError> {
        for stage in Stage::ORDER {
            match self.run_stage(stage, ctx).await? {
                StageOutcome::Continue(node_id) => ctx.node_id = Some(node_id),
                StageOutcome::Resolved(resolution) => return Ok(resolution),
            }
        }
        // The last stage always resolves.
        Ok(Resolution::Ignore)
    }

    pub async fn run_stage(
        &self,
        stage: Stage,
        ctx: &mut PipelineContext<'_>,
    ) -> Result<StageOutcome, ServiceError> {
        match stage {
            Stage::ResolveNode => Ok(self.resolve_node(ctx).await),
            Stage::KnownNode => Ok(self.known_node(ctx).await),
            Stage::TaskBootfile => Ok(self.task_bootfile(ctx).await),
        }
    }

    async fn resolve_node(&self, ctx: &mut PipelineContext<'_>) -> StageOutcome {
        let mac = ctx.mac();

        match self.lookup.node_by_mac(mac).await {
            Ok(node) if node.discovered => {
                ctx.discovered = true;
                StageOutcome::Continue(node.id)
            }
            Ok(_) => {
                info!(mac = %mac, "Node is not discovered");
                StageOutcome::Resolved(Resolution::Discover)
            }
            Err(e) if e.is_not_found() => {
                info!(mac = %mac, "There is no lookup record for this node");
                StageOutcome::Resolved(Resolution::Discover)
            }
            Err(e) => {
                error!(mac = %mac, error = %e, "A lookup failure occurred");
                StageOutcome::Resolved(Resolution::Ignore)
            }
        }
    }

    /// A failing task service counts as "no active task".
    async fn known_node(&self, ctx: &PipelineContext<'_>) -> StageOutcome {
        let Some(node_id) = ctx.node_id.clone() else {
            return StageOutcome::Resolved(Resolution::Ignore);
        };
        if !ctx.discovered {
            return StageOutcome::Resolved(Resolution::Discover);
        }

        match self.tasks.active_task_exists(&node_id).await {
            Ok(()) => return StageOutcome::Continue(node_id),
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                warn!(mac = %ctx.mac(), node = %node_id, error = %e, "Active task query failed");
            }
        }

        match self.store.find_by_identifier(&node_id).await {
            Ok(node) if node.boot_settings.is_some() => {
                info!(mac = %ctx.mac(), node = %node_id, "There are boot settings");
                StageOutcome::Continue(node_id)
            }
            Ok(_) => {
                info!(
                    mac = %ctx.mac(),
                    node = %node_id,
                    "Node is discovered, but has no active task and no boot settings"
                );
                StageOutcome::Resolved(Resolution::Ignore)
            }
            Err(e) => {
                info!(mac = %ctx.mac(), node = %node_id, error = %e, "Node record unavailable");
                StageOutcome::Resolved(Resolution::Ignore)
            }
        }
    }

    async fn task_bootfile(&self, ctx: &PipelineContext<'_>) -> StageOutcome {
        let Some(node_id) = ctx.node_id.as_ref() else {
            return StageOutcome::Resolved(Resolution::SendDefaultBootfile);
        };

        match self.tasks.request_boot_profile(node_id).await {
            Ok(name) => StageOutcome::Resolved(Resolution::SendCustomBootfile(name)),
            Err(e) => {
                info!(mac = %ctx.mac(), node = %node_id, error = %e, "No task boot profile");
                StageOutcome::Resolved(Resolution::SendDefaultBootfile)
            }
        }
    }

    /// Whether the client should be sent a boot file at all.
    ///
    /// Discovered nodes that have neither an active task with a boot
    /// profile nor persisted boot settings are left alone, so their NIC ROM
    /// does not download iPXE again on every PXE attempt.
    pub async fn boot_file_warranted(&self, message: &Message) -> bool {
        let mac = message.mac_address();

        let node = match self.lookup.node_by_mac(mac).await {
            Ok(node) => node,
            Err(e) if e.is_not_found() => {
                info!(mac = %mac, "There is no lookup record for this node");
                return true;
            }
            Err(e) => {
                error!(mac = %mac, error = %e, "A lookup failure occurred");
                return false;
            }
        };

        if !node.discovered {
            info!(mac = %mac, "Node is not discovered");
            return true;
        }

        if self.tasks.active_task_exists(&node.id).await.is_ok() {
            return match self.tasks.request_boot_profile(&node.id).await {
                Ok(_) => {
                    info!(mac = %mac, "Active task exists, and profile exists");
                    true
                }
                Err(_) => {
                    info!(mac = %mac, "Active task exists, but no profile exists");
                    false
                }
            };
        }

        if node.boot_settings.is_some() {
            info!(mac = %mac, "There are boot settings");
            true
        } else {
            info!(mac = %mac, "Node is discovered, but has no active task and no boot settings");
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod mocks {
    //! In-memory collaborators that count their calls.

    use std::collections::{HashMap, HashSet};
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::RwLock;

    use async_trait::async_trait;

    use crate::domain::NodeId;
    use crate::error::ServiceError;
    use crate::services::{
        BootSettings, IpRegistration, Node, NodeLookup, NodeStore, TaskProtocol,
    };

    #[derive(Default)]
    pub struct MockRegistry {
        /// Nodes by MAC
        pub nodes: RwLock<HashMap<String, Node>>,
        /// Active tasks: node id -> profile (None = task without profile)
        pub tasks: RwLock<HashMap<NodeId, Option<String>>>,
        /// MACs whose lookup fails with something other than NotFound
        pub broken_macs: RwLock<HashSet<String>>,
        /// Make every task call fail as unavailable
        pub tasks_unavailable: RwLock<bool>,
        pub registration: RwLock<Option<IpRegistration>>,
        pub registrations: RwLock<Vec<(Ipv4Addr, String)>>,

        pub lookup_calls: AtomicUsize,
        pub task_calls: AtomicUsize,
        pub profile_calls: AtomicUsize,
        pub store_calls: AtomicUsize,
    }

    impl MockRegistry {
        pub fn add_node(&self, mac: &str, id: &str, discovered: bool, profile: Option<&str>) {
            self.nodes.write().unwrap().insert(
                mac.to_string(),
                Node {
                    id: NodeId::from(id),
                    discovered,
                    boot_settings: profile.map(|p| BootSettings {
                        profile: p.to_string(),
                    }),
                },
            );
        }

        pub fn add_task(&self, id: &str, profile: Option<&str>) {
            self.tasks
                .write()
                .unwrap()
                .insert(NodeId::from(id), profile.map(str::to_string));
        }

        pub fn calls(counter: &AtomicUsize) -> usize {
            counter.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl NodeLookup for MockRegistry {
        async fn node_by_mac(&self, mac: &str) -> Result<Node, ServiceError> {
            self.lookup_calls.fetch_add(1, Ordering::SeqCst);
            if self.broken_macs.read().unwrap().contains(mac) {
                return Err(ServiceError::Unavailable("lookup down".to_string()));
            }
            self.nodes
                .read()
                .unwrap()
                .get(mac)
                .cloned()
                .ok_or_else(|| ServiceError::NotFound(mac.to_string()))
        }

        async fn register_ip(
            &self,
            ip: Ipv4Addr,
            mac: &str,
        ) -> Result<IpRegistration, ServiceError> {
            self.registrations.write().unwrap().push((ip, mac.to_string()));
            Ok(self
                .registration
                .read()
                .unwrap()
                .unwrap_or(IpRegistration::Recorded))
        }
    }

    #[async_trait]
    impl TaskProtocol for MockRegistry {
        async fn active_task_exists(&self, node_id: &NodeId) -> Result<(), ServiceError> {
            self.task_calls.fetch_add(1, Ordering::SeqCst);
            if *self.tasks_unavailable.read().unwrap() {
                return Err(ServiceError::Unavailable("task service down".to_string()));
            }
            if self.tasks.read().unwrap().contains_key(node_id) {
                Ok(())
            } else {
                Err(ServiceError::NotFound(node_id.to_string()))
            }
        }

        async fn request_boot_profile(&self, node_id: &NodeId) -> Result<String, ServiceError> {
            self.profile_calls.fetch_add(1, Ordering::SeqCst);
            self.tasks
                .read()
                .unwrap()
                .get(node_id)
                .cloned()
                .flatten()
                .ok_or_else(|| ServiceError::NotFound(node_id.to_string()))
        }
    }

    #[async_trait]
    impl NodeStore for MockRegistry {
        async fn find_by_identifier(&self, node_id: &NodeId) -> Result<Node, ServiceError> {
            self.store_calls.fetch_add(1, Ordering::SeqCst);
            self.nodes
                .read()
                .unwrap()
                .values()
                .find(|n| &n.id == node_id)
                .cloned()
                .ok_or_else(|| ServiceError::NotFound(node_id.to_string()))
        }
    }
}
