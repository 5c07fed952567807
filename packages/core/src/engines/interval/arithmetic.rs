//! Nested-set bound arithmetic
//!
//! Pure functions over a snapshot of the affected tree(s). Each plan maps
//! every old bound to its final bound before anything is written, so a node
//! that qualifies for more than one shift is still adjusted exactly once per
//! step and the steps cannot interfere.

use crate::engines::{HierarchyError, HierarchyResult};
use crate::models::{Interval, Node, NodeId};
use std::collections::{BTreeMap, HashSet};

/// Shift every bound at or after `at` right by `width`
pub fn open_gap(interval: &mut Interval, at: i64, width: i64) {
    if interval.left >= at {
        interval.left += width;
    }
    if interval.right >= at {
        interval.right += width;
    }
}

/// Shift every bound strictly after `after` left by `width`
pub fn close_gap(interval: &mut Interval, after: i64, width: i64) {
    if interval.left > after {
        interval.left -= width;
    }
    if interval.right > after {
        interval.right -= width;
    }
}

pub(super) fn interval_of(node: &Node) -> HierarchyResult<Interval> {
    node.interval.ok_or_else(|| {
        HierarchyError::data_integrity(format!("entity {} has no interval", node.id))
    })
}

/// Refuse to plan around `target` when its tree's bounds are already broken
///
/// Nodes of other trees in `tree` are ignored. Within `target`'s tree every
/// interval must have positive width, no node may have exactly one bound
/// inside `target`'s range, and the nearest enclosing node must be the
/// stored parent.
pub fn check_surroundings(target: &Node, tree: &[Node]) -> HierarchyResult<()> {
    let bounds = interval_of(target)?;
    let fail = |msg: String| {
        tracing::warn!("Refusing to rewrite bounds around entity {}: {}", target.id, msg);
        Err(HierarchyError::data_integrity(msg))
    };

    let mut nearest: Option<(NodeId, i64)> = None;
    for node in tree {
        let iv = interval_of(node)?;
        if iv.root_id != bounds.root_id {
            continue;
        }
        if iv.right <= iv.left {
            return fail(format!(
                "entity {} has invalid bounds [{}, {}]",
                node.id, iv.left, iv.right
            ));
        }
        if node.id == target.id {
            continue;
        }

        let left_inside = bounds.left <= iv.left && iv.left <= bounds.right;
        let right_inside = bounds.left <= iv.right && iv.right <= bounds.right;
        if left_inside != right_inside {
            return fail(format!(
                "entity {} [{}, {}] straddles [{}, {}]",
                node.id, iv.left, iv.right, bounds.left, bounds.right
            ));
        }
        if iv.left < bounds.left
            && iv.right > bounds.right
            && nearest.map_or(true, |(_, left)| iv.left > left)
        {
            nearest = Some((node.id, iv.left));
        }
    }

    let enclosing_parent = nearest.map(|(id, _)| id);
    if enclosing_parent != target.parent_id {
        return fail(format!(
            "nearest enclosing entity is {:?} but the parent is {:?}",
            enclosing_parent, target.parent_id
        ));
    }
    Ok(())
}

/// Bounds for a new rightmost child of `parent`, plus the tree nodes the gap shifts
pub fn plan_insert(parent: &Node, tree: &[Node]) -> HierarchyResult<(Interval, Vec<Node>)> {
    let parent_interval = interval_of(parent)?;
    let at = parent_interval.right;

    let mut shifted = Vec::new();
    for node in tree {
        let before = interval_of(node)?;
        let mut after = before;
        open_gap(&mut after, at, 2);
        if after != before {
            let mut node = node.clone();
            node.interval = Some(after);
            shifted.push(node);
        }
    }

    let interval = Interval {
        left: at,
        right: at + 1,
        depth: parent_interval.depth + 1,
        root_id: parent_interval.root_id,
    };
    Ok((interval, shifted))
}

/// Ids removed with `target` (its own first) and the remaining tree nodes the closed gap shifts
pub fn plan_delete(target: &Node, tree: &[Node]) -> HierarchyResult<(Vec<NodeId>, Vec<Node>)> {
    let bounds = interval_of(target)?;
    let width = bounds.width();

    let mut removed = vec![target.id];
    let mut shifted = Vec::new();
    for node in tree {
        if node.id == target.id {
            continue;
        }
        let before = interval_of(node)?;
        if bounds.left <= before.left && before.right <= bounds.right {
            removed.push(node.id);
            continue;
        }
        let mut after = before;
        close_gap(&mut after, bounds.right, width);
        if after != before {
            let mut node = node.clone();
            node.interval = Some(after);
            shifted.push(node);
        }
    }
    Ok((removed, shifted))
}

/// Every node whose bounds change when `moving` is relocated under `new_parent_id`
///
/// `snapshot` holds the tree of `moving` and, for a cross-tree move, the tree
/// of the new parent. The steps run in order on one working copy:
///
/// 1. close the gap the subtree leaves in its old tree
/// 2. open a gap at the new parent's right bound (read after step 1)
/// 3. translate the subtree, adjusting depth and root
///
/// Only nodes outside the subtree take part in steps 1 and 2.
pub fn relocate_subtree(
    moving: NodeId,
    new_parent_id: Option<NodeId>,
    snapshot: &[Node],
) -> HierarchyResult<Vec<Node>> {
    let mut working: BTreeMap<NodeId, Interval> = BTreeMap::new();
    for node in snapshot {
        working.insert(node.id, interval_of(node)?);
    }

    let old = *working
        .get(&moving)
        .ok_or_else(|| HierarchyError::entity_not_found(moving))?;
    let width = old.width();

    let subtree: HashSet<NodeId> = working
        .iter()
        .filter(|(_, iv)| iv.root_id == old.root_id && old.left <= iv.left && iv.right <= old.right)
        .map(|(id, _)| *id)
        .collect();

    // 1. close
    for (id, iv) in working.iter_mut() {
        if iv.root_id == old.root_id && !subtree.contains(id) {
            close_gap(iv, old.right, width);
        }
    }

    // 2. open
    let (new_left, new_depth, new_root) = match new_parent_id {
        Some(parent_id) => {
            if subtree.contains(&parent_id) {
                return Err(HierarchyError::data_integrity(format!(
                    "entity {} lies inside the subtree of {}",
                    parent_id, moving
                )));
            }
            let parent = *working
                .get(&parent_id)
                .ok_or_else(|| HierarchyError::parent_not_found(parent_id))?;
            let at = parent.right;
            for (id, iv) in working.iter_mut() {
                if iv.root_id == parent.root_id && !subtree.contains(id) {
                    open_gap(iv, at, width);
                }
            }
            (at, parent.depth + 1, parent.root_id)
        }
        None => (1, 0, moving),
    };

    // 3. relocate
    let offset = new_left - old.left;
    let depth_delta = new_depth - old.depth;
    for id in &subtree {
        if let Some(iv) = working.get_mut(id) {
            iv.left += offset;
            iv.right += offset;
            iv.depth += depth_delta;
            iv.root_id = new_root;
        }
    }

    Ok(snapshot
        .iter()
        .filter_map(|node| {
            let after = working.get(&node.id).copied();
            (after != node.interval).then(|| {
                let mut node = node.clone();
                node.interval = after;
                node
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: i64, parent: Option<i64>, left: i64, right: i64, depth: i64, root: i64) -> Node {
        Node {
            id: NodeId(id),
            name: format!("n{id}"),
            parent_id: parent.map(NodeId),
            path: None,
            interval: Some(Interval {
                left,
                right,
                depth,
                root_id: NodeId(root),
            }),
        }
    }

    fn bounds(nodes: &[Node], id: i64) -> (i64, i64, i64, NodeId) {
        let iv = nodes
            .iter()
            .find(|n| n.id == NodeId(id))
            .and_then(|n| n.interval)
            .unwrap();
        (iv.left, iv.right, iv.depth, iv.root_id)
    }

    #[test]
    fn test_gap_helpers() {
        let mut iv = Interval {
            left: 2,
            right: 5,
            depth: 1,
            root_id: NodeId(1),
        };
        open_gap(&mut iv, 5, 2);
        assert_eq!((iv.left, iv.right), (2, 7));
        close_gap(&mut iv, 1, 2);
        assert_eq!((iv.left, iv.right), (0, 5));
    }

    #[test]
    fn test_plan_insert_opens_gap_at_parent_right() {
        // 1[1,4] > 2[2,3]
        let tree = vec![node(1, None, 1, 4, 0, 1), node(2, Some(1), 2, 3, 1, 1)];
        let (interval, shifted) = plan_insert(&tree[0], &tree).unwrap();
        assert_eq!((interval.left, interval.right, interval.depth), (4, 5, 1));
        assert_eq!(shifted.len(), 1);
        assert_eq!(bounds(&shifted, 1), (1, 6, 0, NodeId(1)));
    }

    #[test]
    fn test_plan_delete_middle_sibling() {
        // 1[1,8] > 2[2,3], 3[4,5], 4[6,7]
        let tree = vec![
            node(1, None, 1, 8, 0, 1),
            node(2, Some(1), 2, 3, 1, 1),
            node(3, Some(1), 4, 5, 1, 1),
            node(4, Some(1), 6, 7, 1, 1),
        ];
        let (removed, shifted) = plan_delete(&tree[2], &tree).unwrap();
        assert_eq!(removed, vec![NodeId(3)]);
        assert_eq!(bounds(&shifted, 1), (1, 6, 0, NodeId(1)));
        assert_eq!(bounds(&shifted, 4), (4, 5, 1, NodeId(1)));
        assert!(shifted.iter().all(|n| n.id != NodeId(2)));
    }

    #[test]
    fn test_check_surroundings_accepts_consistent_tree() {
        // 1[1,6] > 2[2,3], 3[4,5]; 9[1,2] is another tree
        let tree = vec![
            node(1, None, 1, 6, 0, 1),
            node(2, Some(1), 2, 3, 1, 1),
            node(3, Some(1), 4, 5, 1, 1),
            node(9, None, 1, 2, 0, 9),
        ];
        for target in &tree {
            check_surroundings(target, &tree).unwrap();
        }
    }

    #[test]
    fn test_check_surroundings_refuses_broken_bounds() {
        // sibling overlap: 2's right bound pushed onto 3's left
        let overlapping = vec![
            node(1, None, 1, 6, 0, 1),
            node(2, Some(1), 2, 4, 1, 1),
            node(3, Some(1), 4, 5, 1, 1),
        ];
        let err = check_surroundings(&overlapping[1], &overlapping).unwrap_err();
        assert!(err.is_data_integrity());
        assert!(err.to_string().contains("straddles"));

        // inverted interval elsewhere in the tree
        let inverted = vec![
            node(1, None, 1, 6, 0, 1),
            node(2, Some(1), 2, 3, 1, 1),
            node(3, Some(1), 5, 4, 1, 1),
        ];
        assert!(check_surroundings(&inverted[1], &inverted)
            .unwrap_err()
            .is_data_integrity());

        // nested inside a sibling rather than the stored parent
        let misplaced = vec![
            node(1, None, 1, 6, 0, 1),
            node(2, Some(1), 2, 5, 1, 1),
            node(3, Some(1), 3, 4, 2, 1),
        ];
        assert!(check_surroundings(&misplaced[2], &misplaced)
            .unwrap_err()
            .is_data_integrity());
    }

    #[test]
    fn test_relocate_within_tree() {
        // 1[1,8] > 2[2,5] > 3[3,4]; 1 > 4[6,7]. Move 2 under 4.
        let tree = vec![
            node(1, None, 1, 8, 0, 1),
            node(2, Some(1), 2, 5, 1, 1),
            node(3, Some(2), 3, 4, 2, 1),
            node(4, Some(1), 6, 7, 1, 1),
        ];
        let changed = relocate_subtree(NodeId(2), Some(NodeId(4)), &tree).unwrap();
        assert_eq!(bounds(&changed, 4), (2, 7, 1, NodeId(1)));
        assert_eq!(bounds(&changed, 2), (3, 6, 2, NodeId(1)));
        assert_eq!(bounds(&changed, 3), (4, 5, 3, NodeId(1)));
        // the root keeps [1,8]
        assert!(changed.iter().all(|n| n.id != NodeId(1)));
    }

    #[test]
    fn test_relocate_across_trees_and_to_root() {
        // 1[1,4] > 3[2,3]; 2[1,2]
        let forest = vec![
            node(1, None, 1, 4, 0, 1),
            node(2, None, 1, 2, 0, 2),
            node(3, Some(1), 2, 3, 1, 1),
        ];
        let changed = relocate_subtree(NodeId(3), Some(NodeId(2)), &forest).unwrap();
        assert_eq!(bounds(&changed, 1), (1, 2, 0, NodeId(1)));
        assert_eq!(bounds(&changed, 2), (1, 4, 0, NodeId(2)));
        assert_eq!(bounds(&changed, 3), (2, 3, 1, NodeId(2)));

        let changed = relocate_subtree(NodeId(3), None, &forest).unwrap();
        assert_eq!(bounds(&changed, 1), (1, 2, 0, NodeId(1)));
        assert_eq!(bounds(&changed, 3), (1, 2, 0, NodeId(3)));
    }

    #[test]
    fn test_relocate_into_own_subtree_is_refused() {
        let tree = vec![node(1, None, 1, 4, 0, 1), node(2, Some(1), 2, 3, 1, 1)];
        assert!(relocate_subtree(NodeId(1), Some(NodeId(2)), &tree)
            .unwrap_err()
            .is_data_integrity());
    }
}
