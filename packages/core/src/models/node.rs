//! Node Data Structures
//!
//! This module defines the core `Node` struct shared by every hierarchy
//! strategy, plus the per-strategy derived state it may carry.
//!
//! # Architecture
//!
//! - **Single parent edge**: `parent_id` is the primary structure; everything
//!   else is a redundant encoding of the same forest
//! - **Materialized path**: `path` is only populated by the path engine
//! - **Nested set**: `interval` is only populated by the interval engine
//! - **Closure rows**: live in their own relation (see [`ClosureRow`](super::ClosureRow))
//!
//! # Examples
//!
//! ```rust
//! use hierarchy_core::models::{NewNode, NodeId};
//!
//! let root = NewNode::new("Engineering", None);
//! let child = NewNode::new("Platform", Some(NodeId(1)));
//! assert!(root.parent_id.is_none());
//! assert_eq!(child.parent_id, Some(NodeId(1)));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Validation errors for node attributes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Name must not be empty")]
    Empty,

    #[error("Name is too long: {actual} characters (maximum {max})")]
    TooLong { max: usize, actual: usize },
}

/// Store-assigned node identifier
///
/// Renders as the bare integer so it can be embedded in a materialized path.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NodeId(pub i64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for NodeId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromStr for NodeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(NodeId)
    }
}

/// Nested-set bounds of a node
///
/// `right - left` is always odd, and equals `2 * |descendants| + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interval {
    pub left: i64,
    pub right: i64,
    pub depth: i64,
    pub root_id: NodeId,
}

impl Interval {
    /// Bounds for a brand new root
    pub fn root(root_id: NodeId) -> Self {
        Self {
            left: 1,
            right: 2,
            depth: 0,
            root_id,
        }
    }

    /// Number of bound positions the subtree occupies (`right - left + 1`)
    pub fn width(&self) -> i64 {
        self.right - self.left + 1
    }

    /// Number of descendants encoded by the interval
    pub fn descendant_count(&self) -> i64 {
        (self.right - self.left - 1) / 2
    }

    /// Strict containment within the same tree
    pub fn contains(&self, other: &Interval) -> bool {
        self.root_id == other.root_id && self.left < other.left && other.right < self.right
    }
}

/// A node of the hierarchy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier, assigned by the store on first save
    pub id: NodeId,

    /// Display name (validated before it ever reaches an engine)
    pub name: String,

    /// Parent reference, `None` for roots
    pub parent_id: Option<NodeId>,

    /// Materialized path `/id1/.../idK/` (path engine only)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub path: Option<String>,

    /// Nested-set bounds (interval engine only)
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub interval: Option<Interval>,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// A node that has not been saved yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNode {
    pub name: String,
    pub parent_id: Option<NodeId>,
    pub path: Option<String>,
    pub interval: Option<Interval>,
}

impl NewNode {
    pub fn new(name: impl Into<String>, parent_id: Option<NodeId>) -> Self {
        Self {
            name: name.into(),
            parent_id,
            path: None,
            interval: None,
        }
    }

    pub fn with_interval(mut self, interval: Interval) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Materialize the node with the id the store assigned
    pub fn into_node(self, id: NodeId) -> Node {
        Node {
            id,
            name: self.name,
            parent_id: self.parent_id,
            path: self.path,
            interval: self.interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_display_and_parse() {
        assert_eq!(NodeId(42).to_string(), "42");
        assert_eq!("17".parse::<NodeId>().unwrap(), NodeId(17));
        assert!("x1".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_interval_root_and_width() {
        let interval = Interval::root(NodeId(3));
        assert_eq!(interval.left, 1);
        assert_eq!(interval.right, 2);
        assert_eq!(interval.width(), 2);
        assert_eq!(interval.descendant_count(), 0);
    }

    #[test]
    fn test_interval_contains_requires_same_tree() {
        let outer = Interval {
            left: 1,
            right: 6,
            depth: 0,
            root_id: NodeId(1),
        };
        let inner = Interval {
            left: 2,
            right: 3,
            depth: 1,
            root_id: NodeId(1),
        };
        let foreign = Interval {
            root_id: NodeId(9),
            ..inner
        };

        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(!outer.contains(&foreign));
        assert_eq!(outer.descendant_count(), 2);
    }

    #[test]
    fn test_new_node_into_node() {
        let node = NewNode::new("Finance", Some(NodeId(1))).into_node(NodeId(5));
        assert_eq!(node.id, NodeId(5));
        assert_eq!(node.parent_id, Some(NodeId(1)));
        assert!(!node.is_root());
        assert!(node.path.is_none());
    }

    #[test]
    fn test_node_serialization_skips_absent_encodings() {
        let node = NewNode::new("Sales", None).into_node(NodeId(1));
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["parentId"], serde_json::Value::Null);
        assert!(json.get("path").is_none());
        assert!(json.get("interval").is_none());
    }
}
