//! NodeStore Trait - Database Abstraction Layer
//!
//! This module defines the `NodeStore` trait that abstracts persistence for
//! every hierarchy engine. The engines hold no state of their own: the store
//! is the single source of truth, and each engine derives its auxiliary
//! structure inside one store transaction.
//!
//! # Architecture
//!
//! - **Abstraction Point**: Between the engines (hierarchy rules) and the backend
//! - **Multiple Backends**: [`MemoryStore`](super::MemoryStore) and, with the
//!   `turso` feature, [`TursoStore`](super::TursoStore)
//! - **Transactions Only**: All reads and writes go through a [`StoreTransaction`]
//!
//! # Design Decisions
//!
//! 1. **Async-First**: All methods are async so embedded and networked
//!    backends share one contract
//! 2. **Snapshot Reads**: A transaction sees its own writes and nothing
//!    committed after it began
//! 3. **All-or-Nothing**: Writes become visible on `commit`; `rollback` or
//!    dropping the transaction discards them
//! 4. **Fixed Predicates**: Queries use the closed [`NodeFilter`] and
//!    [`ClosureFilter`] languages so every backend can index them
//!
//! # Examples
//!
//! ```rust
//! use hierarchy_core::db::{MemoryStore, NodeFilter, NodeStore};
//! use hierarchy_core::models::NewNode;
//!
//! # tokio_test::block_on(async {
//! let store = MemoryStore::new();
//! let mut tx = store.begin().await?;
//! let node = tx.insert(NewNode::new("Engineering", None)).await?;
//! tx.commit().await?;
//!
//! let mut tx = store.begin().await?;
//! let roots = tx.query(NodeFilter::ChildrenOf(None)).await?;
//! assert_eq!(roots, vec![node]);
//! tx.rollback().await?;
//! # Ok::<(), hierarchy_core::db::StoreError>(())
//! # }).unwrap();
//! ```

use crate::db::StoreError;
use crate::models::{ClosureRow, NewNode, Node, NodeId};
use async_trait::async_trait;

pub type StoreResult<T> = Result<T, StoreError>;

/// Predicates over the node relation
///
/// Results are ordered by id, except the interval predicates which are
/// ordered by left bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeFilter {
    /// Every node
    All,

    /// Nodes whose id is in the list
    Ids(Vec<NodeId>),

    /// Nodes whose `parent_id` equals the value (`None` selects roots)
    ChildrenOf(Option<NodeId>),

    /// Nodes whose path starts with the prefix (inclusive of the prefix owner)
    PathPrefix(String),

    /// Every node of one nested-set tree
    Tree { root_id: NodeId },

    /// Nodes of the tree whose interval strictly encloses `[left, right]`
    Enclosing {
        root_id: NodeId,
        left: i64,
        right: i64,
    },

    /// Nodes of the tree whose interval lies strictly inside `[left, right]`
    Enclosed {
        root_id: NodeId,
        left: i64,
        right: i64,
    },
}

impl NodeFilter {
    /// In-process evaluation of the predicate
    pub fn matches(&self, node: &Node) -> bool {
        match self {
            NodeFilter::All => true,
            NodeFilter::Ids(ids) => ids.contains(&node.id),
            NodeFilter::ChildrenOf(parent_id) => node.parent_id == *parent_id,
            NodeFilter::PathPrefix(prefix) => node
                .path
                .as_deref()
                .is_some_and(|path| path.starts_with(prefix.as_str())),
            NodeFilter::Tree { root_id } => node
                .interval
                .is_some_and(|interval| interval.root_id == *root_id),
            NodeFilter::Enclosing {
                root_id,
                left,
                right,
            } => node.interval.is_some_and(|interval| {
                interval.root_id == *root_id && interval.left < *left && interval.right > *right
            }),
            NodeFilter::Enclosed {
                root_id,
                left,
                right,
            } => node.interval.is_some_and(|interval| {
                interval.root_id == *root_id && interval.left > *left && interval.right < *right
            }),
        }
    }

    /// Whether results are ordered by left bound rather than id
    pub fn orders_by_left_bound(&self) -> bool {
        matches!(
            self,
            NodeFilter::Tree { .. } | NodeFilter::Enclosing { .. } | NodeFilter::Enclosed { .. }
        )
    }
}

/// Predicates over the closure relation
///
/// Results are ordered by level, then by descendant id, then by ancestor id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClosureFilter {
    /// Every row
    All,

    /// Rows where `descendant_id` equals the node (its ancestry, self row included)
    AncestorsOf(NodeId),

    /// Rows where `ancestor_id` equals the node (its subtree, self row included)
    DescendantsOf(NodeId),

    /// Rows where `ancestor_id` equals the node and `level` equals the value
    DescendantsAtLevel(NodeId, i64),

    /// Rows whose descendant is in the set
    DescendantIn(Vec<NodeId>),

    /// Rows whose descendant is in the set, self rows excluded
    NonSelfDescendantIn(Vec<NodeId>),
}

impl ClosureFilter {
    /// In-process evaluation of the predicate
    pub fn matches(&self, row: &ClosureRow) -> bool {
        match self {
            ClosureFilter::All => true,
            ClosureFilter::AncestorsOf(id) => row.descendant_id == *id,
            ClosureFilter::DescendantsOf(id) => row.ancestor_id == *id,
            ClosureFilter::DescendantsAtLevel(id, level) => {
                row.ancestor_id == *id && row.level == *level
            }
            ClosureFilter::DescendantIn(ids) => ids.contains(&row.descendant_id),
            ClosureFilter::NonSelfDescendantIn(ids) => {
                !row.is_self() && ids.contains(&row.descendant_id)
            }
        }
    }
}

/// Abstraction layer for node persistence
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; engines share a store through
/// `Arc<dyn NodeStore>`.
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Short backend name for log context
    fn name(&self) -> &'static str;

    /// Open a transaction
    ///
    /// Backends serialize writers; a transaction waits until the previous one
    /// finished.
    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;
}

/// One atomic unit of work against a [`NodeStore`]
///
/// Every method after `commit` or `rollback` fails with
/// [`StoreError::TransactionClosed`].
#[async_trait]
pub trait StoreTransaction: Send {
    //
    // NODE RELATION
    //

    /// Point lookup, `Ok(None)` when the id does not resolve
    async fn get(&mut self, id: NodeId) -> StoreResult<Option<Node>>;

    /// Save a new node, assigning its id
    async fn insert(&mut self, node: NewNode) -> StoreResult<Node>;

    /// Overwrite an existing node (matched by id)
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Constraint`] if no node has that id.
    async fn update(&mut self, node: &Node) -> StoreResult<()>;

    /// Bulk delete, returning how many nodes were removed
    ///
    /// Unknown ids are ignored. Closure rows are not touched.
    async fn delete_all(&mut self, ids: &[NodeId]) -> StoreResult<u64>;

    /// Predicate query
    async fn query(&mut self, filter: NodeFilter) -> StoreResult<Vec<Node>>;

    //
    // CLOSURE RELATION
    //

    /// Predicate query over closure rows
    async fn closure_rows(&mut self, filter: ClosureFilter) -> StoreResult<Vec<ClosureRow>>;

    /// Insert closure rows
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Constraint`] if an (ancestor, descendant) pair
    /// already exists.
    async fn insert_closure_rows(&mut self, rows: &[ClosureRow]) -> StoreResult<()>;

    /// Delete closure rows matching the predicate, returning how many went away
    async fn delete_closure_rows(&mut self, filter: ClosureFilter) -> StoreResult<u64>;

    //
    // LIFECYCLE
    //

    /// Publish every write made through this transaction
    async fn commit(&mut self) -> StoreResult<()>;

    /// Discard every write made through this transaction
    async fn rollback(&mut self) -> StoreResult<()>;
}
