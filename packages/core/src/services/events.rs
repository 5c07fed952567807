//! Domain Events for HierarchyService
//!
//! Emitted on a tokio broadcast channel after a mutation committed, so a
//! subscriber never hears about a change that was rolled back.
//!
//! # Event Flow
//!
//! 1. HierarchyService validates and hands the mutation to its engine
//! 2. The engine commits its store transaction
//! 3. The service emits the matching event
//! 4. Every subscriber receives it asynchronously (lagging ones may miss events)

use crate::models::{Node, NodeId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HierarchyEvent {
    /// A node was created
    #[serde(rename = "node:created")]
    NodeCreated { node: Node },

    /// A subtree was relocated
    #[serde(rename = "node:moved", rename_all = "camelCase")]
    NodeMoved {
        id: NodeId,
        old_parent_id: Option<NodeId>,
        new_parent_id: Option<NodeId>,
    },

    /// A node's name changed
    #[serde(rename = "node:renamed")]
    NodeRenamed { node: Node },

    /// A node and its whole subtree were removed
    #[serde(rename = "subtree:deleted", rename_all = "camelCase")]
    SubtreeDeleted { root_id: NodeId, ids: Vec<NodeId> },
}

impl HierarchyEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            HierarchyEvent::NodeCreated { .. } => "node:created",
            HierarchyEvent::NodeMoved { .. } => "node:moved",
            HierarchyEvent::NodeRenamed { .. } => "node:renamed",
            HierarchyEvent::SubtreeDeleted { .. } => "subtree:deleted",
        }
    }

    /// Id of the node the event is about
    pub fn node_id(&self) -> NodeId {
        match self {
            HierarchyEvent::NodeCreated { node } | HierarchyEvent::NodeRenamed { node } => node.id,
            HierarchyEvent::NodeMoved { id, .. } => *id,
            HierarchyEvent::SubtreeDeleted { root_id, .. } => *root_id,
        }
    }
}
