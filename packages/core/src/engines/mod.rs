//! Hierarchy Engines
//!
//! Four interchangeable encodings of the same forest, each behind the
//! [`HierarchyEngine`] contract:
//!
//! - [`AdjacencyEngine`] - parent reference only, ancestry by repeated lookups
//! - [`ClosureEngine`] - explicit (ancestor, descendant, level) relation
//! - [`PathEngine`] - materialized `/id1/.../idK/` path per node
//! - [`IntervalEngine`] - nested-set bounds per node
//!
//! The set of encodings is closed, so [`Engine`] is a tagged enum rather than
//! a trait object.
//!
//! # Transactions
//!
//! Every operation runs inside one store transaction. Mutations read what
//! they need, compute the full delta, write it, and commit; on error the
//! transaction is rolled back so no partial derived state survives.

mod adjacency;
mod closure;
pub mod cycle_guard;
mod error;
mod interval;
mod path;

pub use adjacency::AdjacencyEngine;
pub use closure::ClosureEngine;
pub use error::{HierarchyError, HierarchyResult};
pub use interval::IntervalEngine;
pub use path::PathEngine;

use crate::db::{NodeFilter, NodeStore, StoreTransaction};
use crate::models::{Node, NodeId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// The physical encoding an engine uses for ancestry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    #[default]
    Adjacency,
    Closure,
    Path,
    Interval,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Adjacency,
        Strategy::Closure,
        Strategy::Path,
        Strategy::Interval,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Adjacency => "adjacency",
            Strategy::Closure => "closure",
            Strategy::Path => "path",
            Strategy::Interval => "interval",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown hierarchy strategy '{0}' (expected adjacency, closure, path or interval)")]
pub struct UnknownStrategy(pub String);

impl FromStr for Strategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adjacency" | "adjacency_list" => Ok(Strategy::Adjacency),
            "closure" | "closure_table" => Ok(Strategy::Closure),
            "path" | "materialized_path" => Ok(Strategy::Path),
            "interval" | "nested_set" => Ok(Strategy::Interval),
            other => Err(UnknownStrategy(other.to_string())),
        }
    }
}

/// Ids removed by a delete, the target first
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub deleted: Vec<NodeId>,
}

impl DeleteOutcome {
    pub fn count(&self) -> usize {
        self.deleted.len()
    }
}

/// A moved node and the parent it had when the move transaction read it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub node: Node,
    pub old_parent_id: Option<NodeId>,
}

/// Operation contract shared by the four encodings
#[async_trait]
pub trait HierarchyEngine: Send + Sync {
    fn strategy(&self) -> Strategy;

    /// Create a node, as a root when `parent_id` is `None`
    ///
    /// # Errors
    ///
    /// - `ParentNotFound` if `parent_id` does not resolve
    async fn create(&self, name: &str, parent_id: Option<NodeId>) -> HierarchyResult<Node>;

    /// Relocate a node (and its whole subtree) under a new parent, or to the root level
    ///
    /// # Errors
    ///
    /// - `EntityNotFound` if `node_id` does not resolve
    /// - `ParentNotFound` if `new_parent_id` does not resolve
    /// - `DataIntegrity` if the move would create a cycle
    async fn move_subtree(
        &self,
        node_id: NodeId,
        new_parent_id: Option<NodeId>,
    ) -> HierarchyResult<MoveOutcome>;

    /// [`move_subtree`](Self::move_subtree) without the previous parent
    async fn move_node(
        &self,
        node_id: NodeId,
        new_parent_id: Option<NodeId>,
    ) -> HierarchyResult<Node> {
        Ok(self.move_subtree(node_id, new_parent_id).await?.node)
    }

    /// Delete a node together with its entire subtree
    async fn delete(&self, node_id: NodeId) -> HierarchyResult<DeleteOutcome>;

    async fn get(&self, node_id: NodeId) -> HierarchyResult<Node>;

    /// Change the name only; structure is untouched
    async fn rename(&self, node_id: NodeId, name: &str) -> HierarchyResult<Node>;

    /// Every node without a parent, ordered by id
    async fn roots(&self) -> HierarchyResult<Vec<Node>>;

    /// Direct children, in sibling order
    async fn children(&self, node_id: NodeId) -> HierarchyResult<Vec<Node>>;

    /// Ancestors, nearest first
    async fn ancestors(&self, node_id: NodeId) -> HierarchyResult<Vec<Node>>;

    /// Ancestors, root first
    async fn lineage(&self, node_id: NodeId) -> HierarchyResult<Vec<Node>> {
        let mut ancestors = self.ancestors(node_id).await?;
        ancestors.reverse();
        Ok(ancestors)
    }

    /// Every node below `node_id` (the node itself excluded)
    async fn descendants(&self, node_id: NodeId) -> HierarchyResult<Vec<Node>>;

    /// Number of ancestors (roots have depth 0)
    async fn depth(&self, node_id: NodeId) -> HierarchyResult<usize> {
        Ok(self.ancestors(node_id).await?.len())
    }

    /// Check every structural invariant of the encoding against the stored data
    async fn verify_integrity(&self) -> HierarchyResult<()>;
}

/// Closed set of engines, dispatched by `match`
pub enum Engine {
    Adjacency(AdjacencyEngine),
    Closure(ClosureEngine),
    Path(PathEngine),
    Interval(IntervalEngine),
}

impl Engine {
    pub fn new(strategy: Strategy, store: Arc<dyn NodeStore>) -> Self {
        match strategy {
            Strategy::Adjacency => Engine::Adjacency(AdjacencyEngine::new(store)),
            Strategy::Closure => Engine::Closure(ClosureEngine::new(store)),
            Strategy::Path => Engine::Path(PathEngine::new(store)),
            Strategy::Interval => Engine::Interval(IntervalEngine::new(store)),
        }
    }
}

macro_rules! dispatch {
    ($engine:expr, $inner:ident => $call:expr) => {
        match $engine {
            Engine::Adjacency($inner) => $call,
            Engine::Closure($inner) => $call,
            Engine::Path($inner) => $call,
            Engine::Interval($inner) => $call,
        }
    };
}

#[async_trait]
impl HierarchyEngine for Engine {
    fn strategy(&self) -> Strategy {
        dispatch!(self, engine => engine.strategy())
    }

    async fn create(&self, name: &str, parent_id: Option<NodeId>) -> HierarchyResult<Node> {
        dispatch!(self, engine => engine.create(name, parent_id).await)
    }

    async fn move_subtree(
        &self,
        node_id: NodeId,
        new_parent_id: Option<NodeId>,
    ) -> HierarchyResult<MoveOutcome> {
        dispatch!(self, engine => engine.move_subtree(node_id, new_parent_id).await)
    }

    async fn delete(&self, node_id: NodeId) -> HierarchyResult<DeleteOutcome> {
        dispatch!(self, engine => engine.delete(node_id).await)
    }

    async fn get(&self, node_id: NodeId) -> HierarchyResult<Node> {
        dispatch!(self, engine => engine.get(node_id).await)
    }

    async fn rename(&self, node_id: NodeId, name: &str) -> HierarchyResult<Node> {
        dispatch!(self, engine => engine.rename(node_id, name).await)
    }

    async fn roots(&self) -> HierarchyResult<Vec<Node>> {
        dispatch!(self, engine => engine.roots().await)
    }

    async fn children(&self, node_id: NodeId) -> HierarchyResult<Vec<Node>> {
        dispatch!(self, engine => engine.children(node_id).await)
    }

    async fn ancestors(&self, node_id: NodeId) -> HierarchyResult<Vec<Node>> {
        dispatch!(self, engine => engine.ancestors(node_id).await)
    }

    async fn descendants(&self, node_id: NodeId) -> HierarchyResult<Vec<Node>> {
        dispatch!(self, engine => engine.descendants(node_id).await)
    }

    async fn verify_integrity(&self) -> HierarchyResult<()> {
        dispatch!(self, engine => engine.verify_integrity().await)
    }
}

//
// SHARED TRANSACTION HELPERS
//

/// Commit on success, roll back on failure
pub(crate) async fn finish<T>(
    mut tx: Box<dyn StoreTransaction>,
    result: HierarchyResult<T>,
) -> HierarchyResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!("Rollback after '{}' failed: {}", err, rollback_err);
            }
            Err(err)
        }
    }
}

/// End a read-only transaction
pub(crate) async fn release<T>(
    mut tx: Box<dyn StoreTransaction>,
    result: HierarchyResult<T>,
) -> HierarchyResult<T> {
    if let Err(rollback_err) = tx.rollback().await {
        tracing::warn!("Releasing read transaction failed: {}", rollback_err);
    }
    result
}

pub(crate) async fn require_node(
    tx: &mut dyn StoreTransaction,
    node_id: NodeId,
) -> HierarchyResult<Node> {
    tx.get(node_id)
        .await?
        .ok_or_else(|| HierarchyError::entity_not_found(node_id))
}

pub(crate) async fn require_parent(
    tx: &mut dyn StoreTransaction,
    parent_id: NodeId,
) -> HierarchyResult<Node> {
    tx.get(parent_id)
        .await?
        .ok_or_else(|| HierarchyError::parent_not_found(parent_id))
}

/// Fetch nodes by id, returned in the order of `ids`
pub(crate) async fn fetch_in_order(
    tx: &mut dyn StoreTransaction,
    ids: &[NodeId],
) -> HierarchyResult<Vec<Node>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut by_id: HashMap<NodeId, Node> = tx
        .query(NodeFilter::Ids(ids.to_vec()))
        .await?
        .into_iter()
        .map(|node| (node.id, node))
        .collect();

    ids.iter()
        .map(|id| {
            by_id.remove(id).ok_or_else(|| {
                HierarchyError::data_integrity(format!(
                    "derived structure references missing entity {}",
                    id
                ))
            })
        })
        .collect()
}

/// Ancestor ids of every node (nearest first), derived from parent edges only
///
/// This is the reference ancestry each encoding is verified against.
pub(crate) fn forest_ancestry(nodes: &[Node]) -> HierarchyResult<HashMap<NodeId, Vec<NodeId>>> {
    let parents: HashMap<NodeId, Option<NodeId>> =
        nodes.iter().map(|node| (node.id, node.parent_id)).collect();

    let mut ancestry = HashMap::with_capacity(nodes.len());
    for node in nodes {
        let mut chain = Vec::new();
        let mut next = node.parent_id;
        while let Some(parent_id) = next {
            if parent_id == node.id || chain.contains(&parent_id) {
                return Err(HierarchyError::data_integrity(format!(
                    "parent chain of entity {} is circular",
                    node.id
                )));
            }
            next = *parents.get(&parent_id).ok_or_else(|| {
                HierarchyError::data_integrity(format!(
                    "entity {} references missing parent {}",
                    node.id, parent_id
                ))
            })?;
            chain.push(parent_id);
        }
        ancestry.insert(node.id, chain);
    }
    Ok(ancestry)
}

/// Operations that read or write the plain node attributes the same way in every encoding
pub(crate) mod common {
    use super::*;

    pub async fn get(store: &dyn NodeStore, node_id: NodeId) -> HierarchyResult<Node> {
        let mut tx = store.begin().await?;
        let result = require_node(tx.as_mut(), node_id).await;
        release(tx, result).await
    }

    pub async fn rename(
        store: &dyn NodeStore,
        node_id: NodeId,
        name: &str,
    ) -> HierarchyResult<Node> {
        let mut tx = store.begin().await?;
        let result: HierarchyResult<Node> = async {
            let mut node = require_node(tx.as_mut(), node_id).await?;
            node.name = name.to_string();
            tx.update(&node).await?;
            Ok(node)
        }
        .await;
        finish(tx, result).await
    }

    pub async fn roots(store: &dyn NodeStore) -> HierarchyResult<Vec<Node>> {
        let mut tx = store.begin().await?;
        let result = tx
            .query(NodeFilter::ChildrenOf(None))
            .await
            .map_err(HierarchyError::from);
        release(tx, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    #[test]
    fn test_strategy_parse_and_display() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.to_string().parse::<Strategy>().unwrap(), strategy);
        }
        assert_eq!("nested_set".parse::<Strategy>().unwrap(), Strategy::Interval);
        assert_eq!(" Closure ".parse::<Strategy>().unwrap(), Strategy::Closure);
        assert!("graph".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_strategy_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&Strategy::Interval).unwrap(),
            "\"interval\""
        );
        let parsed: Strategy = serde_json::from_str("\"path\"").unwrap();
        assert_eq!(parsed, Strategy::Path);
    }

    #[tokio::test]
    async fn test_engine_reports_its_strategy() {
        for strategy in Strategy::ALL {
            let engine = Engine::new(strategy, Arc::new(MemoryStore::new()));
            assert_eq!(engine.strategy(), strategy);
        }
    }

    #[tokio::test]
    async fn test_rename_and_roots_through_enum() {
        for strategy in Strategy::ALL {
            let engine = Engine::new(strategy, Arc::new(MemoryStore::new()));
            let root = engine.create("Ops", None).await.unwrap();
            engine.create("Support", Some(root.id)).await.unwrap();

            let renamed = engine.rename(root.id, "Operations").await.unwrap();
            assert_eq!(renamed.name, "Operations");
            assert_eq!(engine.get(root.id).await.unwrap().name, "Operations");

            let roots = engine.roots().await.unwrap();
            assert_eq!(roots.len(), 1, "{strategy}");
            assert_eq!(roots[0].id, root.id);

            assert!(matches!(
                engine.rename(NodeId(404), "x").await,
                Err(HierarchyError::EntityNotFound { .. })
            ));
        }
    }
}
