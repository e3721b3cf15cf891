//! Node attributes and topology snapshots

use serde::Serialize;

/// Where a node sits in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// Fan-in sentinel, always first
    Head,
    /// Regular chain link
    Processor,
    /// Fan-out sentinel, always last
    Tail,
}

/// Mutable attributes shared by every node
#[derive(Debug, Clone)]
pub(crate) struct NodeState {
    pub name: String,
    pub priority: i64,
    pub enabled: bool,
    pub bypassed: bool,
    /// Insertion sequence, breaks priority ties
    pub seq: u64,
    /// Distinguishes reuse of the same arena slot
    pub generation: u64,
}

impl NodeState {
    pub fn sort_key(&self) -> (i64, u64) {
        (self.priority, self.seq)
    }
}

/// Point-in-time view of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub name: String,
    pub role: NodeRole,
    pub priority: i64,
    pub enabled: bool,
    pub bypassed: bool,
    /// Ids of local output taps
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub taps: Vec<String>,
}

/// Point-in-time view of an input or output and its points
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PointGroupInfo {
    pub name: String,
    pub enabled: bool,
    /// `(id, enabled)` per entry/end point, in registration order
    pub points: Vec<(String, bool)>,
}

/// Consistent view of a pipeline's topology, taken under the read lock
#[derive(Debug, Clone, Serialize)]
pub struct ChainSnapshot {
    pub pipeline: String,
    /// Active chain in dispatch order, sentinels included
    pub active: Vec<NodeInfo>,
    /// Every registered processor in insertion order, sentinels excluded
    pub registered: Vec<NodeInfo>,
    pub inputs: Vec<PointGroupInfo>,
    pub outputs: Vec<PointGroupInfo>,
}

impl ChainSnapshot {
    /// Names of active processors in dispatch order
    pub fn active_names(&self) -> Vec<&str> {
        self.active
            .iter()
            .filter(|n| n.role == NodeRole::Processor)
            .map(|n| n.name.as_str())
            .collect()
    }

    pub fn processor(&self, name: &str) -> Option<&NodeInfo> {
        self.registered.iter().find(|n| n.name == name)
    }
}
