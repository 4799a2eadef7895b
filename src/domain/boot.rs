//! Boot decision results.

use std::fmt;

/// Identifier of a node known to the lookup service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// What to do with one client message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootAction {
    /// Stay silent.
    Ignore,
    /// Answer with this boot file name or URL.
    SendBootfile(String),
}

impl BootAction {
    pub fn bootfile(&self) -> Option<&str> {
        match self {
            Self::Ignore => None,
            Self::SendBootfile(name) => Some(name),
        }
    }
}

impl From<Option<String>> for BootAction {
    fn from(bootfile: Option<String>) -> Self {
        match bootfile {
            Some(name) => Self::SendBootfile(name),
            None => Self::Ignore,
        }
    }
}
