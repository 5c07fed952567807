//! Materialized path engine
//!
//! Every node carries `/id1/.../idK/`, its root-to-self id chain. Subtrees are
//! prefix scans and ancestors are parsed straight out of the path. The parent
//! reference is kept so direct children do not need a prefix scan.

use super::{
    common, cycle_guard, fetch_in_order, finish, forest_ancestry, release, require_node,
    require_parent, DeleteOutcome, HierarchyEngine, HierarchyError, HierarchyResult, MoveOutcome,
    Strategy,
};
use crate::db::{NodeFilter, NodeStore, StoreTransaction};
use crate::models::path::{child_path, has_repeated_segment, parse_path, root_path};
use crate::models::{NewNode, Node, NodeId};
use async_trait::async_trait;
use std::sync::Arc;

pub struct PathEngine {
    store: Arc<dyn NodeStore>,
}

impl PathEngine {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self { store }
    }
}

fn circular_path(path: &str) -> HierarchyError {
    HierarchyError::data_integrity(format!(
        "Circular reference detected in entity path: {}",
        path
    ))
}

fn stored_path(node: &Node) -> HierarchyResult<&str> {
    node.path.as_deref().ok_or_else(|| {
        HierarchyError::data_integrity(format!("entity {} has no materialized path", node.id))
    })
}

/// Parse and sanity check the path of `node`, returning its segments root first
///
/// The last segment must be the node itself and no id may repeat.
fn checked_segments(node: &Node) -> HierarchyResult<Vec<NodeId>> {
    let path = stored_path(node)?;
    let segments = parse_path(path).map_err(|_| circular_path(path))?;
    if has_repeated_segment(&segments) || segments.last() != Some(&node.id) {
        tracing::warn!("Entity {} carries inconsistent path {}", node.id, path);
        return Err(circular_path(path));
    }
    Ok(segments)
}

/// The subtree of `node` (inclusive), each member checked against the prefix
async fn checked_subtree(
    tx: &mut dyn StoreTransaction,
    node: &Node,
) -> HierarchyResult<Vec<Node>> {
    let prefix = stored_path(node)?.to_string();
    let members = tx.query(NodeFilter::PathPrefix(prefix.clone())).await?;

    for member in &members {
        checked_segments(member)?;
        if !stored_path(member)?.starts_with(&prefix) {
            return Err(circular_path(stored_path(member)?));
        }
    }
    Ok(members)
}

#[async_trait]
impl HierarchyEngine for PathEngine {
    fn strategy(&self) -> Strategy {
        Strategy::Path
    }

    async fn create(&self, name: &str, parent_id: Option<NodeId>) -> HierarchyResult<Node> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<Node> = async {
            let parent_path = match parent_id {
                Some(parent_id) => {
                    let parent = require_parent(tx.as_mut(), parent_id).await?;
                    Some(stored_path(&parent)?.to_string())
                }
                None => None,
            };

            // the id is only known once the row exists
            let mut node = tx.insert(NewNode::new(name, parent_id)).await?;
            node.path = Some(match parent_path {
                Some(parent_path) => child_path(&parent_path, node.id),
                None => root_path(node.id),
            });
            tx.update(&node).await?;
            Ok(node)
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
            let node = require_node(tx.as_mut(), node_id).await?;
            let old_parent_id = node.parent_id;
            let old_prefix = stored_path(&node)?.to_string();

            let new_prefix = match new_parent_id {
                Some(parent_id) => {
                    let parent = require_parent(tx.as_mut(), parent_id).await?;
                    let lineage = if parent.id == node.id {
                        Vec::new()
                    } else {
                        checked_segments(&parent)?
                    };
                    cycle_guard::guard_move(node.id, Some(parent.id), &lineage)?;
                    child_path(stored_path(&parent)?, node.id)
                }
                None => root_path(node.id),
            };

            let subtree = checked_subtree(tx.as_mut(), &node).await?;
            let mut moved = node.clone();
            for mut member in subtree {
                let rewritten = match member.path.as_deref() {
                    Some(path) => format!("{}{}", new_prefix, &path[old_prefix.len()..]),
                    None => return Err(circular_path("")),
                };
                member.path = Some(rewritten);
                if member.id == node.id {
                    member.parent_id = new_parent_id;
                    moved = member.clone();
                }
                tx.update(&member).await?;
            }

            tracing::debug!("Rewrote path prefix {} -> {}", old_prefix, new_prefix);
            Ok(MoveOutcome {
                node: moved,
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
            checked_segments(&node)?;

            let mut deleted = vec![node.id];
            deleted.extend(
                checked_subtree(tx.as_mut(), &node)
                    .await?
                    .iter()
                    .map(|n| n.id)
                    .filter(|id| *id != node.id),
            );
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
            let mut segments = checked_segments(&node)?;
            segments.pop();
            segments.reverse();
            fetch_in_order(tx.as_mut(), &segments).await
        }
        .await;
        release(tx, result).await
    }

    async fn descendants(&self, node_id: NodeId) -> HierarchyResult<Vec<Node>> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<Vec<Node>> = async {
            let node = require_node(tx.as_mut(), node_id).await?;
            let prefix = stored_path(&node)?.to_string();
            Ok(tx
                .query(NodeFilter::PathPrefix(prefix))
                .await?
                .into_iter()
                .filter(|n| n.id != node_id)
                .collect())
        }
        .await;
        release(tx, result).await
    }

    async fn verify_integrity(&self) -> HierarchyResult<()> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<()> = async {
            let nodes = tx.query(NodeFilter::All).await?;
            let ancestry = forest_ancestry(&nodes)?;

            for node in &nodes {
                let mut chain = ancestry.get(&node.id).cloned().unwrap_or_default();
                chain.reverse();
                let expected = chain
                    .iter()
                    .fold(String::from("/"), |path, id| format!("{path}{id}/"));
                let expected = format!("{expected}{}/", node.id);

                if node.path.as_deref() != Some(expected.as_str()) {
                    return Err(HierarchyError::data_integrity(format!(
                        "entity {} has path {:?}, expected {}",
                        node.id, node.path, expected
                    )));
                }
            }
            Ok(())
        }
        .await;
        release(tx, result).await
    }
}
