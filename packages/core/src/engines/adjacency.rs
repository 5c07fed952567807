//! Adjacency list engine
//!
//! Only the parent reference is stored. Ancestry costs one point lookup per
//! level and descendants one children query per visited node, which is fine
//! for shallow trees and the baseline every other engine is checked against.

use super::{
    common, cycle_guard, finish, forest_ancestry, release, require_node, require_parent,
    DeleteOutcome, HierarchyEngine, HierarchyError, HierarchyResult, MoveOutcome,
    Strategy,
};
use crate::db::{NodeFilter, NodeStore, StoreTransaction};
use crate::models::{NewNode, Node, NodeId};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

pub struct AdjacencyEngine {
    store: Arc<dyn NodeStore>,
}

impl AdjacencyEngine {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self { store }
    }
}

/// Walk the parent references from `node` up to its root (nearest first)
///
/// A chain that returns to `node` trips the cycle guard; a chain that loops
/// elsewhere is reported as corrupted.
async fn parent_chain(tx: &mut dyn StoreTransaction, node: &Node) -> HierarchyResult<Vec<Node>> {
    let mut chain: Vec<Node> = Vec::new();
    let mut seen = HashSet::from([node.id]);
    let mut next = node.parent_id;

    while let Some(parent_id) = next {
        if !seen.insert(parent_id) {
            if parent_id == node.id {
                chain.push(node.clone());
                break;
            }
            return Err(HierarchyError::data_integrity(format!(
                "circular parent chain through entity {}",
                parent_id
            )));
        }

        let parent = tx.get(parent_id).await?.ok_or_else(|| {
            HierarchyError::data_integrity(format!(
                "entity {} references missing parent {}",
                chain.last().map_or(node.id, |n| n.id),
                parent_id
            ))
        })?;
        next = parent.parent_id;
        chain.push(parent);
    }

    let lineage: Vec<NodeId> = chain.iter().map(|n| n.id).collect();
    cycle_guard::guard_existing(node.id, &lineage)?;
    Ok(chain)
}

/// Breadth-first expansion over parent references
async fn subtree(tx: &mut dyn StoreTransaction, root: NodeId) -> HierarchyResult<Vec<Node>> {
    let mut found = Vec::new();
    let mut seen = HashSet::from([root]);
    let mut queue = VecDeque::from([root]);

    while let Some(current) = queue.pop_front() {
        for child in tx.query(NodeFilter::ChildrenOf(Some(current))).await? {
            if !seen.insert(child.id) {
                return Err(HierarchyError::data_integrity(format!(
                    "entity {} reached twice while expanding the subtree of {}",
                    child.id, root
                )));
            }
            queue.push_back(child.id);
            found.push(child);
        }
    }
    Ok(found)
}

#[async_trait]
impl HierarchyEngine for AdjacencyEngine {
    fn strategy(&self) -> Strategy {
        Strategy::Adjacency
    }

    async fn create(&self, name: &str, parent_id: Option<NodeId>) -> HierarchyResult<Node> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<Node> = async {
            if let Some(parent_id) = parent_id {
                require_parent(tx.as_mut(), parent_id).await?;
            }
            Ok(tx.insert(NewNode::new(name, parent_id)).await?)
        }
        .await;
        finish(tx, result).await
    }

    async fn move_subtree(
        &self,
        node_id: NodeId,
        new_parent_id: Option<NodeId>,
    ) -> HierarchyResult<MoveOutcome> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<MoveOutcome> = async {
            let mut node = require_node(tx.as_mut(), node_id).await?;
            let old_parent_id = node.parent_id;

            if let Some(parent_id) = new_parent_id {
                let parent = require_parent(tx.as_mut(), parent_id).await?;
                let lineage: Vec<NodeId> = if parent.id == node.id {
                    Vec::new()
                } else {
                    parent_chain(tx.as_mut(), &parent)
                        .await?
                        .iter()
                        .map(|n| n.id)
                        .collect()
                };
                cycle_guard::guard_move(node.id, Some(parent.id), &lineage)?;
            }

            node.parent_id = new_parent_id;
            tx.update(&node).await?;
            Ok(MoveOutcome {
                node,
                old_parent_id,
            })
        }
        .await;
        finish(tx, result).await
    }

    async fn delete(&self, node_id: NodeId) -> HierarchyResult<DeleteOutcome> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<DeleteOutcome> = async {
            let node = require_node(tx.as_mut(), node_id).await?;
            parent_chain(tx.as_mut(), &node).await?;

            let mut deleted = vec![node.id];
            deleted.extend(subtree(tx.as_mut(), node.id).await?.iter().map(|n| n.id));
            tx.delete_all(&deleted).await?;
            Ok(DeleteOutcome { deleted })
        }
        .await;
        finish(tx, result).await
    }

    async fn get(&self, node_id: NodeId) -> HierarchyResult<Node> {
        common::get(self.store.as_ref(), node_id).await
    }

    async fn rename(&self, node_id: NodeId, name: &str) -> HierarchyResult<Node> {
        common::rename(self.store.as_ref(), node_id, name).await
    }

    async fn roots(&self) -> HierarchyResult<Vec<Node>> {
        common::roots(self.store.as_ref()).await
    }

    async fn children(&self, node_id: NodeId) -> HierarchyResult<Vec<Node>> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<Vec<Node>> = async {
            require_node(tx.as_mut(), node_id).await?;
            Ok(tx.query(NodeFilter::ChildrenOf(Some(node_id))).await?)
        }
        .await;
        release(tx, result).await
    }

    async fn ancestors(&self, node_id: NodeId) -> HierarchyResult<Vec<Node>> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<Vec<Node>> = async {
            let node = require_node(tx.as_mut(), node_id).await?;
            parent_chain(tx.as_mut(), &node).await
        }
        .await;
        release(tx, result).await
    }

    async fn descendants(&self, node_id: NodeId) -> HierarchyResult<Vec<Node>> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<Vec<Node>> = async {
            require_node(tx.as_mut(), node_id).await?;
            subtree(tx.as_mut(), node_id).await
        }
        .await;
        release(tx, result).await
    }

    async fn verify_integrity(&self) -> HierarchyResult<()> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<()> = async {
            let nodes = tx.query(NodeFilter::All).await?;
            forest_ancestry(&nodes)?;
            Ok(())
        }
        .await;
        release(tx, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn ids(nodes: &[Node]) -> Vec<NodeId> {
        nodes.iter().map(|n| n.id).collect()
    }

    #[tokio::test]
    async fn test_create_requires_existing_parent() {
        let engine = AdjacencyEngine::new(Arc::new(MemoryStore::new()));
        let err = engine.create("Orphan", Some(NodeId(7))).await.unwrap_err();
        assert!(matches!(
            err,
            HierarchyError::ParentNotFound { parent_id } if parent_id == NodeId(7)
        ));
        assert!(engine.roots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ancestors_and_descendants() {
        let engine = AdjacencyEngine::new(Arc::new(MemoryStore::new()));
        let root = engine.create("Root", None).await.unwrap();
        let child = engine.create("Child", Some(root.id)).await.unwrap();
        let grandchild = engine.create("Grandchild", Some(child.id)).await.unwrap();
        let sibling = engine.create("Sibling", Some(root.id)).await.unwrap();

        assert_eq!(
            ids(&engine.ancestors(grandchild.id).await.unwrap()),
            vec![child.id, root.id]
        );
        assert_eq!(
            ids(&engine.lineage(grandchild.id).await.unwrap()),
            vec![root.id, child.id]
        );
        // breadth first
        assert_eq!(
            ids(&engine.descendants(root.id).await.unwrap()),
            vec![child.id, sibling.id, grandchild.id]
        );
        assert_eq!(engine.depth(grandchild.id).await.unwrap(), 2);
        engine.verify_integrity().await.unwrap();
    }

    #[tokio::test]
    async fn test_move_under_descendant_is_rejected() {
        let engine = AdjacencyEngine::new(Arc::new(MemoryStore::new()));
        let root = engine.create("Root", None).await.unwrap();
        let child = engine.create("Child", Some(root.id)).await.unwrap();

        let err = engine.move_node(root.id, Some(child.id)).await.unwrap_err();
        assert!(err.is_data_integrity());
        let err = engine.move_node(root.id, Some(root.id)).await.unwrap_err();
        assert!(err.is_data_integrity());

        assert!(engine.get(root.id).await.unwrap().is_root());
    }

    #[tokio::test]
    async fn test_delete_removes_subtree() {
        let engine = AdjacencyEngine::new(Arc::new(MemoryStore::new()));
        let root = engine.create("Root", None).await.unwrap();
        let child = engine.create("Child", Some(root.id)).await.unwrap();
        let grandchild = engine.create("Grandchild", Some(child.id)).await.unwrap();

        let outcome = engine.delete(child.id).await.unwrap();
        assert_eq!(outcome.deleted, vec![child.id, grandchild.id]);
        assert!(engine.descendants(root.id).await.unwrap().is_empty());
        assert!(matches!(
            engine.get(grandchild.id).await,
            Err(HierarchyError::EntityNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_corrupted_parent_loop_is_reported() {
        let store = MemoryStore::new();
        let engine = AdjacencyEngine::new(Arc::new(store.clone()));
        let a = engine.create("A", None).await.unwrap();
        let b = engine.create("B", Some(a.id)).await.unwrap();

        // close the loop behind the engine's back
        let mut tx = store.begin().await.unwrap();
        let mut looped = a.clone();
        looped.parent_id = Some(b.id);
        tx.update(&looped).await.unwrap();
        tx.commit().await.unwrap();

        assert!(engine.ancestors(a.id).await.unwrap_err().is_data_integrity());
        assert!(engine.delete(a.id).await.unwrap_err().is_data_integrity());
        assert!(engine.verify_integrity().await.unwrap_err().is_data_integrity());
        // the refused delete left both rows in place
        assert!(engine.get(b.id).await.is_ok());
    }
}
