//! Materialized path encoding
//!
//! A path lists the root-to-node id chain, inclusive of the node itself:
//! `/1/4/9/`. The trailing delimiter keeps prefix queries exact, so the
//! subtree of `/1/` never matches `/12/`.

use super::NodeId;
use thiserror::Error;

pub const PATH_DELIMITER: char = '/';

/// Path text that does not follow the `/id1/.../idK/` shape
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed entity path: {0}")]
pub struct MalformedPath(pub String);

/// Path of a root node
pub fn root_path(id: NodeId) -> String {
    format!("{PATH_DELIMITER}{id}{PATH_DELIMITER}")
}

/// Path of a node placed directly under `parent_path`
pub fn child_path(parent_path: &str, id: NodeId) -> String {
    format!("{parent_path}{id}{PATH_DELIMITER}")
}

/// Split a path into its ordered id segments (root first, node last)
pub fn parse_path(path: &str) -> Result<Vec<NodeId>, MalformedPath> {
    let inner = path
        .strip_prefix(PATH_DELIMITER)
        .and_then(|rest| rest.strip_suffix(PATH_DELIMITER))
        .ok_or_else(|| MalformedPath(path.to_string()))?;

    if inner.is_empty() {
        return Err(MalformedPath(path.to_string()));
    }

    inner
        .split(PATH_DELIMITER)
        .map(|segment| {
            segment
                .parse::<NodeId>()
                .map_err(|_| MalformedPath(path.to_string()))
        })
        .collect()
}

/// Whether any id appears twice in the chain
pub fn has_repeated_segment(segments: &[NodeId]) -> bool {
    let mut seen = std::collections::HashSet::with_capacity(segments.len());
    segments.iter().any(|id| !seen.insert(*id))
}
