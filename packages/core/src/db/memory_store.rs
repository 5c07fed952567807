//! MemoryStore - In-Process NodeStore Implementation
//!
//! Keeps both relations in ordered maps behind a tokio `RwLock`. A
//! transaction holds the write guard for its whole lifetime and mutates a
//! private copy of the tables; `commit` swaps the copy in. Readers on other
//! transactions therefore never observe a half-applied change.

use crate::db::node_store::{ClosureFilter, NodeFilter, NodeStore, StoreResult, StoreTransaction};
use crate::db::StoreError;
use crate::models::{ClosureRow, NewNode, Node, NodeId};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

#[derive(Debug, Clone, Default)]
struct Tables {
    nodes: BTreeMap<NodeId, Node>,
    /// (ancestor, descendant) → level
    closure: BTreeMap<(NodeId, NodeId), i64>,
    last_id: i64,
}

/// In-memory node store
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let guard = self.tables.clone().write_owned().await;
        let working = (*guard).clone();
        Ok(Box::new(MemoryTransaction {
            guard: Some(guard),
            working,
        }))
    }
}

struct MemoryTransaction {
    guard: Option<OwnedRwLockWriteGuard<Tables>>,
    working: Tables,
}

impl MemoryTransaction {
    fn ensure_open(&self) -> StoreResult<()> {
        if self.guard.is_some() {
            Ok(())
        } else {
            Err(StoreError::TransactionClosed)
        }
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn get(&mut self, id: NodeId) -> StoreResult<Option<Node>> {
        self.ensure_open()?;
        Ok(self.working.nodes.get(&id).cloned())
    }

    async fn insert(&mut self, node: NewNode) -> StoreResult<Node> {
        self.ensure_open()?;
        self.working.last_id += 1;
        let node = node.into_node(NodeId(self.working.last_id));
        self.working.nodes.insert(node.id, node.clone());
        Ok(node)
    }

    async fn update(&mut self, node: &Node) -> StoreResult<()> {
        self.ensure_open()?;
        match self.working.nodes.get_mut(&node.id) {
            Some(stored) => {
                *stored = node.clone();
                Ok(())
            }
            None => Err(StoreError::constraint(format!(
                "cannot update missing node {}",
                node.id
            ))),
        }
    }

    async fn delete_all(&mut self, ids: &[NodeId]) -> StoreResult<u64> {
        self.ensure_open()?;
        let removed = ids
            .iter()
            .filter(|id| self.working.nodes.remove(*id).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn query(&mut self, filter: NodeFilter) -> StoreResult<Vec<Node>> {
        self.ensure_open()?;
        let mut nodes: Vec<Node> = self
            .working
            .nodes
            .values()
            .filter(|node| filter.matches(node))
            .cloned()
            .collect();

        if filter.orders_by_left_bound() {
            nodes.sort_by_key(|node| (node.interval.map(|i| i.left), node.id));
        }
        Ok(nodes)
    }

    async fn closure_rows(&mut self, filter: ClosureFilter) -> StoreResult<Vec<ClosureRow>> {
        self.ensure_open()?;
        let mut rows: Vec<ClosureRow> = self
            .working
            .closure
            .iter()
            .map(|(&(ancestor_id, descendant_id), &level)| {
                ClosureRow::new(ancestor_id, descendant_id, level)
            })
            .filter(|row| filter.matches(row))
            .collect();
        rows.sort_by_key(|row| (row.level, row.descendant_id, row.ancestor_id));
        Ok(rows)
    }

    async fn insert_closure_rows(&mut self, rows: &[ClosureRow]) -> StoreResult<()> {
        self.ensure_open()?;
        for row in rows {
            let key = (row.ancestor_id, row.descendant_id);
            if self.working.closure.contains_key(&key) {
                return Err(StoreError::constraint(format!(
                    "duplicate closure row ({}, {})",
                    row.ancestor_id, row.descendant_id
                )));
            }
            self.working.closure.insert(key, row.level);
        }
        Ok(())
    }

    async fn delete_closure_rows(&mut self, filter: ClosureFilter) -> StoreResult<u64> {
        self.ensure_open()?;
        let before = self.working.closure.len();
        self.working
            .closure
            .retain(|&(ancestor_id, descendant_id), level| {
                !filter.matches(&ClosureRow::new(ancestor_id, descendant_id, *level))
            });
        Ok((before - self.working.closure.len()) as u64)
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let mut guard = self.guard.take().ok_or(StoreError::TransactionClosed)?;
        *guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.guard.take().ok_or(StoreError::TransactionClosed)?;
        self.working = Tables::default();
        Ok(())
    }
}
