//! Nested set engine
//!
//! Each node stores `(left, right, depth, root_id)`. Subtree containment is
//! interval nesting inside one tree, so ancestors and descendants are single
//! range predicates. The price is paid on writes: inserts, moves and deletes
//! shift bounds across the whole tree (both trees for a cross-root move).
//!
//! All bound arithmetic lives in [`arithmetic`] and runs on a snapshot read at
//! the start of the transaction.

pub mod arithmetic;

use self::arithmetic::{
    check_surroundings, interval_of, plan_delete, plan_insert, relocate_subtree,
};
use super::{
    common, cycle_guard, finish, release, require_node, require_parent, DeleteOutcome,
    HierarchyEngine, HierarchyError, HierarchyResult, MoveOutcome, Strategy,
};
use crate::db::{NodeFilter, NodeStore, StoreTransaction};
use crate::models::{Interval, NewNode, Node, NodeId};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

pub struct IntervalEngine {
    store: Arc<dyn NodeStore>,
}

impl IntervalEngine {
    pub fn new(store: Arc<dyn NodeStore>) -> Self {
        Self { store }
    }
}

/// Nodes strictly enclosing `node` in its tree, root first
async fn enclosing(tx: &mut dyn StoreTransaction, node: &Node) -> HierarchyResult<Vec<Node>> {
    let interval = interval_of(node)?;
    Ok(tx
        .query(NodeFilter::Enclosing {
            root_id: interval.root_id,
            left: interval.left,
            right: interval.right,
        })
        .await?)
}

/// Nodes strictly inside `node` in its tree, in left-bound (pre-order) order
async fn enclosed(tx: &mut dyn StoreTransaction, node: &Node) -> HierarchyResult<Vec<Node>> {
    let interval = interval_of(node)?;
    Ok(tx
        .query(NodeFilter::Enclosed {
            root_id: interval.root_id,
            left: interval.left,
            right: interval.right,
        })
        .await?)
}

async fn write_all(tx: &mut dyn StoreTransaction, nodes: &[Node]) -> HierarchyResult<()> {
    for node in nodes {
        tx.update(node).await?;
    }
    Ok(())
}

/// Check one tree: bounds form `1..=2n`, nesting mirrors parent edges, depth follows nesting
fn verify_tree(root_id: NodeId, mut nodes: Vec<(Node, Interval)>) -> HierarchyResult<()> {
    let fail = |msg: String| Err(HierarchyError::data_integrity(msg));
    nodes.sort_by_key(|(_, iv)| iv.left);

    let expected_max = 2 * nodes.len() as i64;
    let mut bounds: Vec<i64> = nodes.iter().flat_map(|(_, iv)| [iv.left, iv.right]).collect();
    bounds.sort_unstable();
    if bounds.iter().copied().ne(1..=expected_max) {
        return fail(format!(
            "bounds of tree {} are not a permutation of 1..={}",
            root_id, expected_max
        ));
    }

    let lefts: Vec<i64> = nodes.iter().map(|(_, iv)| iv.left).collect();
    let mut open: Vec<(NodeId, Interval)> = Vec::new();

    for (node, iv) in &nodes {
        let width = iv.right - iv.left;
        if width <= 0 || width % 2 == 0 {
            return fail(format!(
                "entity {} has invalid bounds [{}, {}]",
                node.id, iv.left, iv.right
            ));
        }

        let inside =
            lefts.partition_point(|l| *l < iv.right) - lefts.partition_point(|l| *l <= iv.left);
        if width != 2 * inside as i64 + 1 {
            return fail(format!(
                "entity {} spans {} but encloses {} entities",
                node.id, width, inside
            ));
        }

        while open.last().is_some_and(|(_, top)| top.right < iv.left) {
            open.pop();
        }

        match open.last() {
            Some((parent_id, parent)) => {
                if node.parent_id != Some(*parent_id) || iv.right > parent.right {
                    return fail(format!(
                        "entity {} is not nested inside its parent",
                        node.id
                    ));
                }
                if iv.depth != parent.depth + 1 {
                    return fail(format!("entity {} has depth {}", node.id, iv.depth));
                }
            }
            None => {
                if node.id != root_id || node.parent_id.is_some() || iv.left != 1 || iv.depth != 0
                {
                    return fail(format!("tree {} does not start at its root", root_id));
                }
            }
        }
        open.push((node.id, *iv));
    }
    Ok(())
}

#[async_trait]
impl HierarchyEngine for IntervalEngine {
    fn strategy(&self) -> Strategy {
        Strategy::Interval
    }

    async fn create(&self, name: &str, parent_id: Option<NodeId>) -> HierarchyResult<Node> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<Node> = async {
            let Some(parent_id) = parent_id else {
                // a root's interval references its own id
                let mut node = tx.insert(NewNode::new(name, None)).await?;
                node.interval = Some(Interval::root(node.id));
                tx.update(&node).await?;
                return Ok(node);
            };

            let parent = require_parent(tx.as_mut(), parent_id).await?;
            let root_id = interval_of(&parent)?.root_id;
            let tree = tx.query(NodeFilter::Tree { root_id }).await?;

            let (interval, shifted) = plan_insert(&parent, &tree)?;
            write_all(tx.as_mut(), &shifted).await?;
            Ok(tx
                .insert(NewNode::new(name, Some(parent_id)).with_interval(interval))
                .await?)
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
            let old = interval_of(&node)?;

            let mut snapshot = tx
                .query(NodeFilter::Tree {
                    root_id: old.root_id,
                })
                .await?;
            check_surroundings(&node, &snapshot)?;

            match new_parent_id {
                Some(parent_id) => {
                    let parent = require_parent(tx.as_mut(), parent_id).await?;
                    let lineage: Vec<NodeId> = if parent.id == node.id {
                        Vec::new()
                    } else {
                        let mut lineage: Vec<NodeId> = enclosing(tx.as_mut(), &parent)
                            .await?
                            .iter()
                            .map(|n| n.id)
                            .collect();
                        lineage.push(parent.id);
                        lineage
                    };
                    cycle_guard::guard_move(node.id, Some(parent.id), &lineage)?;

                    let target_root = interval_of(&parent)?.root_id;
                    if target_root != old.root_id {
                        snapshot.extend(
                            tx.query(NodeFilter::Tree {
                                root_id: target_root,
                            })
                            .await?,
                        );
                    }
                    check_surroundings(&parent, &snapshot)?;
                }
                None if node.is_root() => {
                    return Ok(MoveOutcome {
                        node,
                        old_parent_id,
                    });
                }
                None => {}
            }

            let changed = relocate_subtree(node.id, new_parent_id, &snapshot)?;
            let mut moved = changed
                .iter()
                .find(|n| n.id == node.id)
                .cloned()
                .unwrap_or_else(|| node.clone());
            moved.parent_id = new_parent_id;

            let others: Vec<Node> = changed.into_iter().filter(|n| n.id != node.id).collect();
            write_all(tx.as_mut(), &others).await?;
            tx.update(&moved).await?;

            tracing::debug!(
                "Relocated subtree {} ({} bounds rewritten)",
                node.id,
                others.len() + 1
            );
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
            let interval = interval_of(&node)?;

            let tree = tx
                .query(NodeFilter::Tree {
                    root_id: interval.root_id,
                })
                .await?;
            check_surroundings(&node, &tree)?;
            let (deleted, shifted) = plan_delete(&node, &tree)?;

            tx.delete_all(&deleted).await?;
            write_all(tx.as_mut(), &shifted).await?;
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
            let node = require_node(tx.as_mut(), node_id).await?;
            let depth = interval_of(&node)?.depth;
            Ok(enclosed(tx.as_mut(), &node)
                .await?
                .into_iter()
                .filter(|n| n.interval.is_some_and(|iv| iv.depth == depth + 1))
                .collect())
        }
        .await;
        release(tx, result).await
    }

    async fn ancestors(&self, node_id: NodeId) -> HierarchyResult<Vec<Node>> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<Vec<Node>> = async {
            let node = require_node(tx.as_mut(), node_id).await?;
            let mut ancestors = enclosing(tx.as_mut(), &node).await?;
            ancestors.reverse();
            Ok(ancestors)
        }
        .await;
        release(tx, result).await
    }

    async fn descendants(&self, node_id: NodeId) -> HierarchyResult<Vec<Node>> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<Vec<Node>> = async {
            let node = require_node(tx.as_mut(), node_id).await?;
            enclosed(tx.as_mut(), &node).await
        }
        .await;
        release(tx, result).await
    }

    async fn verify_integrity(&self) -> HierarchyResult<()> {
        let mut tx = self.store.begin().await?;
        let result: HierarchyResult<()> = async {
            let mut trees: BTreeMap<NodeId, Vec<(Node, Interval)>> = BTreeMap::new();
            for node in tx.query(NodeFilter::All).await? {
                let interval = interval_of(&node)?;
                trees.entry(interval.root_id).or_default().push((node, interval));
            }

            let mut seen_roots = HashSet::new();
            for (root_id, nodes) in trees {
                seen_roots.insert(root_id);
                verify_tree(root_id, nodes)?;
            }

            for root in tx.query(NodeFilter::ChildrenOf(None)).await? {
                if !seen_roots.contains(&root.id) {
                    return Err(HierarchyError::data_integrity(format!(
                        "root {} owns no tree",
                        root.id
                    )));
                }
            }
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

    async fn bounds(engine: &IntervalEngine, id: NodeId) -> (i64, i64, i64) {
        let iv = engine.get(id).await.unwrap().interval.unwrap();
        (iv.left, iv.right, iv.depth)
    }

    #[tokio::test]
    async fn test_create_appends_rightmost_child() {
        let engine = IntervalEngine::new(Arc::new(MemoryStore::new()));
        let root = engine.create("Root", None).await.unwrap();
        assert_eq!(root.interval, Some(Interval::root(root.id)));

        let first = engine.create("First", Some(root.id)).await.unwrap();
        let second = engine.create("Second", Some(root.id)).await.unwrap();
        let nested = engine.create("Nested", Some(first.id)).await.unwrap();

        assert_eq!(bounds(&engine, root.id).await, (1, 8, 0));
        assert_eq!(bounds(&engine, first.id).await, (2, 5, 1));
        assert_eq!(bounds(&engine, nested.id).await, (3, 4, 2));
        assert_eq!(bounds(&engine, second.id).await, (6, 7, 1));

        assert_eq!(
            ids(&engine.children(root.id).await.unwrap()),
            vec![first.id, second.id]
        );
        assert_eq!(
            ids(&engine.ancestors(nested.id).await.unwrap()),
            vec![first.id, root.id]
        );
        engine.verify_integrity().await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_middle_sibling_keeps_bounds_contiguous() {
        let engine = IntervalEngine::new(Arc::new(MemoryStore::new()));
        let root = engine.create("Root", None).await.unwrap();
        let a = engine.create("A", Some(root.id)).await.unwrap();
        let b = engine.create("B", Some(root.id)).await.unwrap();
        let c = engine.create("C", Some(root.id)).await.unwrap();

        engine.delete(b.id).await.unwrap();

        assert_eq!(bounds(&engine, root.id).await, (1, 6, 0));
        assert_eq!(bounds(&engine, a.id).await, (2, 3, 1));
        assert_eq!(bounds(&engine, c.id).await, (4, 5, 1));
        engine.verify_integrity().await.unwrap();
    }

    #[tokio::test]
    async fn test_move_across_trees_and_back() {
        let engine = IntervalEngine::new(Arc::new(MemoryStore::new()));
        let r1 = engine.create("R1", None).await.unwrap();
        let r2 = engine.create("R2", None).await.unwrap();
        let c = engine.create("C", Some(r1.id)).await.unwrap();
        let g = engine.create("G", Some(c.id)).await.unwrap();

        let moved = engine.move_node(c.id, Some(r2.id)).await.unwrap();
        assert_eq!(moved.parent_id, Some(r2.id));
        assert_eq!(moved.interval.unwrap().root_id, r2.id);
        assert_eq!(bounds(&engine, r1.id).await, (1, 2, 0));
        assert_eq!(bounds(&engine, r2.id).await, (1, 6, 0));
        assert_eq!(bounds(&engine, g.id).await, (3, 4, 2));
        engine.verify_integrity().await.unwrap();

        engine.move_node(c.id, Some(r1.id)).await.unwrap();
        assert_eq!(bounds(&engine, r1.id).await, (1, 6, 0));
        assert_eq!(bounds(&engine, r2.id).await, (1, 2, 0));
        engine.verify_integrity().await.unwrap();
    }

    #[tokio::test]
    async fn test_move_to_root_starts_a_tree() {
        let engine = IntervalEngine::new(Arc::new(MemoryStore::new()));
        let root = engine.create("Root", None).await.unwrap();
        let child = engine.create("Child", Some(root.id)).await.unwrap();
        let leaf = engine.create("Leaf", Some(child.id)).await.unwrap();

        let moved = engine.move_node(child.id, None).await.unwrap();
        assert!(moved.is_root());
        assert_eq!(
            moved.interval,
            Some(Interval {
                left: 1,
                right: 4,
                depth: 0,
                root_id: child.id
            })
        );
        assert_eq!(bounds(&engine, leaf.id).await, (2, 3, 1));
        assert_eq!(bounds(&engine, root.id).await, (1, 2, 0));
        engine.verify_integrity().await.unwrap();

        // already a root: nothing to do
        let unchanged = engine.move_node(root.id, None).await.unwrap();
        assert_eq!(unchanged.interval, Some(Interval::root(root.id)));
    }

    #[tokio::test]
    async fn test_move_under_own_descendant_is_rejected() {
        let engine = IntervalEngine::new(Arc::new(MemoryStore::new()));
        let root = engine.create("Root", None).await.unwrap();
        let child = engine.create("Child", Some(root.id)).await.unwrap();
        let leaf = engine.create("Leaf", Some(child.id)).await.unwrap();

        let err = engine.move_node(child.id, Some(leaf.id)).await.unwrap_err();
        assert!(err.to_string().contains(cycle_guard::DESCENDANT_AS_PARENT));
        assert_eq!(bounds(&engine, child.id).await, (2, 5, 1));
        engine.verify_integrity().await.unwrap();
    }

    #[tokio::test]
    async fn test_move_reports_previous_parent() {
        let engine = IntervalEngine::new(Arc::new(MemoryStore::new()));
        let r1 = engine.create("R1", None).await.unwrap();
        let r2 = engine.create("R2", None).await.unwrap();
        let c = engine.create("C", Some(r1.id)).await.unwrap();

        let outcome = engine.move_subtree(c.id, Some(r2.id)).await.unwrap();
        assert_eq!(outcome.old_parent_id, Some(r1.id));
        assert_eq!(outcome.node.parent_id, Some(r2.id));

        let outcome = engine.move_subtree(r1.id, None).await.unwrap();
        assert_eq!(outcome.old_parent_id, None);
        assert!(outcome.node.is_root());
    }

    #[tokio::test]
    async fn test_writes_refused_when_sibling_bounds_overlap() {
        let store = MemoryStore::new();
        let engine = IntervalEngine::new(Arc::new(store.clone()));
        let root = engine.create("Root", None).await.unwrap();
        let a = engine.create("A", Some(root.id)).await.unwrap();
        let b = engine.create("B", Some(root.id)).await.unwrap();

        // A [2,3] widened onto B's left bound
        let mut broken = engine.get(a.id).await.unwrap();
        if let Some(iv) = broken.interval.as_mut() {
            iv.right = 4;
        }
        let mut tx = store.begin().await.unwrap();
        tx.update(&broken).await.unwrap();
        tx.commit().await.unwrap();

        assert!(engine.delete(a.id).await.unwrap_err().is_data_integrity());
        assert!(engine.delete(b.id).await.unwrap_err().is_data_integrity());
        assert!(engine
            .move_node(a.id, Some(b.id))
            .await
            .unwrap_err()
            .is_data_integrity());
        assert!(engine.move_node(b.id, None).await.unwrap_err().is_data_integrity());

        // nothing was written
        assert_eq!(bounds(&engine, root.id).await, (1, 6, 0));
        assert_eq!(bounds(&engine, a.id).await, (2, 4, 1));
        assert_eq!(bounds(&engine, b.id).await, (4, 5, 1));
        assert!(engine.get(a.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_delete_refused_when_node_sits_outside_its_parent() {
        let store = MemoryStore::new();
        let engine = IntervalEngine::new(Arc::new(store.clone()));
        let root = engine.create("Root", None).await.unwrap();
        let a = engine.create("A", Some(root.id)).await.unwrap();
        let b = engine.create("B", Some(root.id)).await.unwrap();

        // B claims A as parent while its bounds still sit beside A
        let mut broken = engine.get(b.id).await.unwrap();
        broken.parent_id = Some(a.id);
        let mut tx = store.begin().await.unwrap();
        tx.update(&broken).await.unwrap();
        tx.commit().await.unwrap();

        assert!(engine.delete(b.id).await.unwrap_err().is_data_integrity());
        assert_eq!(bounds(&engine, root.id).await, (1, 6, 0));
    }

    #[tokio::test]
    async fn test_verify_detects_overlapping_bounds() {
        let store = MemoryStore::new();
        let engine = IntervalEngine::new(Arc::new(store.clone()));
        let root = engine.create("Root", None).await.unwrap();
        let child = engine.create("Child", Some(root.id)).await.unwrap();

        let mut broken = engine.get(child.id).await.unwrap();
        if let Some(iv) = broken.interval.as_mut() {
            iv.right = 5;
        }
        let mut tx = store.begin().await.unwrap();
        tx.update(&broken).await.unwrap();
        tx.commit().await.unwrap();

        assert!(engine.verify_integrity().await.unwrap_err().is_data_integrity());
    }
}
