//! Closure table engine
//!
//! Keeps one `(ancestor, descendant, level)` row for every ancestor pair,
//! self pairs included. Reads are a single indexed lookup; structural writes
//! pay for it with `O(ancestors x subtree)` row churn on every move.

use super::{
    common, cycle_guard, fetch_in_order, finish, forest_ancestry, release, require_node,
    require_parent, DeleteOutcome, HierarchyEngine, HierarchyError, HierarchyResult, MoveOutcome,
    Strategy,
};
use crate::db::{ClosureFilter, NodeFilter, NodeStore, StoreTransaction};
use crate::models::{ClosureRow, NewNode, Node, NodeId};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

pub struct ClosureEngine {
    store: Arc<dyn NodeStore>,
}

impl ClosureEngine {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self { store }
    }
}

/// Full ancestry of `parent_id`, self row included
///
/// A parent without its self row is treated as missing even if the node row exists.
async fn parent_ancestry(
    tx: &mut dyn StoreTransaction,
    parent_id: NodeId,
) -> HierarchyResult<Vec<ClosureRow>> {
    require_parent(tx, parent_id).await?;
    let rows = tx.closure_rows(ClosureFilter::AncestorsOf(parent_id)).await?;
    if !rows.iter().any(|row| row.is_self()) {
        tracing::warn!("Parent {} has no self closure row", parent_id);
        return Err(HierarchyError::parent_not_found(parent_id));
    }
    Ok(rows)
}

/// Rows whose ancestor is `node_id`, self row first
async fn subtree_rows(
    tx: &mut dyn StoreTransaction,
    node_id: NodeId,
) -> HierarchyResult<Vec<ClosureRow>> {
    let rows = tx.closure_rows(ClosureFilter::DescendantsOf(node_id)).await?;
    match rows.first() {
        Some(row) if row.is_self() => Ok(rows),
        _ => Err(HierarchyError::data_integrity(format!(
            "entity {} has no self closure row",
            node_id
        ))),
    }
}

/// Rows linking every ancestor of the new parent (and the parent itself) to every subtree member
fn rows_under_parent(parent_ancestry: &[ClosureRow], subtree: &[ClosureRow]) -> Vec<ClosureRow> {
    parent_ancestry
        .iter()
        .flat_map(|ancestor| {
            subtree.iter().map(move |member| {
                ClosureRow::new(
                    ancestor.ancestor_id,
                    member.descendant_id,
                    ancestor.level + 1 + member.level,
                )
            })
        })
        .collect()
}

#[async_trait]
impl HierarchyEngine for ClosureEngine {
    fn strategy(&self) -> Strategy {
        Strategy::Closure
    }

    async fn create(&self, name: &str, parent_id: Option<NodeId>) -> HierarchyResult<Node> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<Node> = async {
            let ancestry = match parent_id {
                Some(parent_id) => parent_ancestry(tx.as_mut(), parent_id).await?,
                None => Vec::new(),
            };

            let node = tx.insert(NewNode::new(name, parent_id)).await?;

            let mut rows = vec![ClosureRow::self_row(node.id)];
            rows.extend(
                ancestry
                    .iter()
                    .map(|row| ClosureRow::new(row.ancestor_id, node.id, row.level + 1)),
            );
            tx.insert_closure_rows(&rows).await?;
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
            let mut node = require_node(tx.as_mut(), node_id).await?;
            let old_parent_id = node.parent_id;

            let ancestry = match new_parent_id {
                Some(parent_id) => {
                    let ancestry = parent_ancestry(tx.as_mut(), parent_id).await?;
                    let lineage: Vec<NodeId> = ancestry.iter().map(|r| r.ancestor_id).collect();
                    cycle_guard::guard_move(node.id, Some(parent_id), &lineage)?;
                    ancestry
                }
                None => Vec::new(),
            };

            let subtree = subtree_rows(tx.as_mut(), node.id).await?;
            let members: Vec<NodeId> = subtree.iter().map(|r| r.descendant_id).collect();
            let member_set: HashSet<NodeId> = members.iter().copied().collect();

            // rows internal to the subtree survive the strip
            let internal: Vec<ClosureRow> = tx
                .closure_rows(ClosureFilter::NonSelfDescendantIn(members.clone()))
                .await?
                .into_iter()
                .filter(|row| member_set.contains(&row.ancestor_id))
                .collect();

            let mut rebuilt = internal;
            rebuilt.extend(rows_under_parent(&ancestry, &subtree));

            let stripped = tx
                .delete_closure_rows(ClosureFilter::NonSelfDescendantIn(members))
                .await?;
            tx.insert_closure_rows(&rebuilt).await?;
            tracing::debug!(
                "Rebuilt closure of subtree {}: {} rows stripped, {} inserted",
                node.id,
                stripped,
                rebuilt.len()
            );

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

            let deleted: Vec<NodeId> = subtree_rows(tx.as_mut(), node.id)
                .await?
                .iter()
                .map(|r| r.descendant_id)
                .collect();

            let lineage: Vec<NodeId> = tx
                .closure_rows(ClosureFilter::AncestorsOf(node.id))
                .await?
                .iter()
                .filter(|row| !row.is_self())
                .map(|row| row.ancestor_id)
                .collect();
            if let Some(looped) = lineage.iter().find(|id| deleted.contains(id)) {
                cycle_guard::guard_existing(*looped, &deleted)?;
            }

            tx.delete_closure_rows(ClosureFilter::DescendantIn(deleted.clone()))
                .await?;
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
            let ids: Vec<NodeId> = tx
                .closure_rows(ClosureFilter::DescendantsAtLevel(node_id, 1))
                .await?
                .iter()
                .map(|r| r.descendant_id)
                .collect();
            fetch_in_order(tx.as_mut(), &ids).await
        }
        .await;
        release(tx, result).await
    }

    async fn ancestors(&self, node_id: NodeId) -> HierarchyResult<Vec<Node>> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<Vec<Node>> = async {
            require_node(tx.as_mut(), node_id).await?;
            let ids: Vec<NodeId> = tx
                .closure_rows(ClosureFilter::AncestorsOf(node_id))
                .await?
                .iter()
                .filter(|row| !row.is_self())
                .map(|row| row.ancestor_id)
                .collect();
            fetch_in_order(tx.as_mut(), &ids).await
        }
        .await;
        release(tx, result).await
    }

    async fn descendants(&self, node_id: NodeId) -> HierarchyResult<Vec<Node>> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<Vec<Node>> = async {
            require_node(tx.as_mut(), node_id).await?;
            let ids: Vec<NodeId> = tx
                .closure_rows(ClosureFilter::DescendantsOf(node_id))
                .await?
                .iter()
                .filter(|row| !row.is_self())
                .map(|row| row.descendant_id)
                .collect();
            fetch_in_order(tx.as_mut(), &ids).await
        }
        .await;
        release(tx, result).await
    }

    async fn verify_integrity(&self) -> HierarchyResult<()> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<()> = async {
            let nodes = tx.query(NodeFilter::All).await?;
            let expected = forest_ancestry(&nodes)?;

            let mut stored: HashMap<NodeId, BTreeSet<(NodeId, i64)>> = HashMap::new();
            for row in tx.closure_rows(ClosureFilter::All).await? {
                if !expected.contains_key(&row.descendant_id)
                    || !expected.contains_key(&row.ancestor_id)
                {
                    return Err(HierarchyError::data_integrity(format!(
                        "closure row ({}, {}) references a missing entity",
                        row.ancestor_id, row.descendant_id
                    )));
                }
                stored
                    .entry(row.descendant_id)
                    .or_default()
                    .insert((row.ancestor_id, row.level));
            }

            for node in &nodes {
                let mut want: BTreeSet<(NodeId, i64)> = BTreeSet::from([(node.id, 0)]);
                if let Some(chain) = expected.get(&node.id) {
                    want.extend(chain.iter().enumerate().map(|(i, id)| (*id, i as i64 + 1)));
                }
                let have = stored.remove(&node.id).unwrap_or_default();
                if have != want {
                    return Err(HierarchyError::data_integrity(format!(
                        "closure rows of entity {} do not match its parent chain",
                        node.id
                    )));
                }
            }
            Ok(())
        }
        .await;
        release(tx, result).await
    }
}
