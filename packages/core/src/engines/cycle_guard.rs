//! Cycle Guard
//!
//! Pure checks shared by every engine. Callers read the relevant lineage from
//! the transaction snapshot taken at the start of the operation and hand it
//! over as plain ids, so the guard never sees torn mid-mutation state.

use super::{HierarchyError, HierarchyResult};
use crate::models::NodeId;

pub const SELF_ANCESTOR: &str = "entity cannot be its own ancestor";
pub const DESCENDANT_AS_PARENT: &str = "cannot set an entity as its own descendant's parent";

/// True if placing `node_id` under `proposed_parent_id` would close a loop
///
/// `parent_lineage` holds the current ancestors of the proposed parent, in
/// any order, with or without the parent itself.
pub fn would_create_cycle(
    node_id: NodeId,
    proposed_parent_id: NodeId,
    parent_lineage: &[NodeId],
) -> bool {
    proposed_parent_id == node_id || parent_lineage.contains(&node_id)
}

/// Refuse a move that would make `node_id` its own ancestor
///
/// Moving to the root level (`None`) can never create a cycle.
pub fn guard_move(
    node_id: NodeId,
    proposed_parent_id: Option<NodeId>,
    parent_lineage: &[NodeId],
) -> HierarchyResult<()> {
    let Some(parent_id) = proposed_parent_id else {
        return Ok(());
    };

    if parent_id == node_id {
        tracing::warn!("Refusing to move entity {} under itself", node_id);
        return Err(HierarchyError::data_integrity(SELF_ANCESTOR));
    }

    if would_create_cycle(node_id, parent_id, parent_lineage) {
        tracing::warn!(
            "Refusing to move entity {} under its descendant {}",
            node_id,
            parent_id
        );
        return Err(HierarchyError::data_integrity(DESCENDANT_AS_PARENT));
    }

    Ok(())
}

/// Refuse to operate on a node whose stored lineage already loops through itself
pub fn guard_existing(node_id: NodeId, lineage: &[NodeId]) -> HierarchyResult<()> {
    if lineage.contains(&node_id) {
        tracing::warn!("Stored lineage of entity {} contains the entity itself", node_id);
        return Err(HierarchyError::data_integrity(SELF_ANCESTOR));
    }
    Ok(())
}
