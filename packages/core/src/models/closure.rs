//! Closure relation rows
//!
//! One row per (ancestor, descendant) pair, including the self pair at level 0.

use super::NodeId;
use serde::{Deserialize, Serialize};

/// A single (ancestor, descendant, level) tuple of the closure relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClosureRow {
    pub ancestor_id: NodeId,
    pub descendant_id: NodeId,
    pub level: i64,
}

impl ClosureRow {
    pub fn new(ancestor_id: NodeId, descendant_id: NodeId, level: i64) -> Self {
        Self {
            ancestor_id,
            descendant_id,
            level,
        }
    }

    /// The level-0 row every node owns
    pub fn self_row(id: NodeId) -> Self {
        Self::new(id, id, 0)
    }

    pub fn is_self(&self) -> bool {
        self.ancestor_id == self.descendant_id
    }
}
