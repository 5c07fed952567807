//! TursoStore - NodeStore Implementation for Turso/libsql Backend
//!
//! Persists the node relation and the closure relation in an embedded
//! libsql (SQLite-compatible) database.
//!
//! # Schema
//!
//! - `nodes`: one row per node; `path` and the four nested-set columns are
//!   NULL unless the owning engine populates them
//! - `node_closure`: (ancestor_id, descendant_id) primary key plus `level`
//! - Indexes on every column the engines query by
//!
//! # Transactions
//!
//! The store keeps a single connection behind a tokio `Mutex`. A transaction
//! holds the lock from `BEGIN IMMEDIATE` until `COMMIT`/`ROLLBACK`, so there
//! is exactly one writer at a time. A transaction dropped without finishing
//! is rolled back by the next `begin`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use hierarchy_core::db::{NodeStore, TursoStore};
//! use std::path::PathBuf;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store: Arc<dyn NodeStore> =
//!         Arc::new(TursoStore::new(PathBuf::from("./data/hierarchy.db")).await?);
//!     let mut tx = store.begin().await?;
//!     tx.rollback().await?;
//!     Ok(())
//! }
//! ```

use crate::db::node_store::{ClosureFilter, NodeFilter, NodeStore, StoreResult, StoreTransaction};
use crate::db::StoreError;
use crate::models::{ClosureRow, Interval, NewNode, Node, NodeId};
use async_trait::async_trait;
use libsql::params::Params;
use libsql::{Builder, Connection, Database, Row, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

const NODE_COLUMNS: &str =
    "id, name, parent_id, path, left_bound, right_bound, depth, root_id";

struct ConnectionState {
    conn: Connection,
    /// A transaction was opened and never finished
    in_transaction: bool,
}

/// libsql-backed node store
pub struct TursoStore {
    /// Kept alive for as long as the connection is in use
    _db: Arc<Database>,
    state: Arc<Mutex<ConnectionState>>,
    db_path: PathBuf,
}

impl TursoStore {
    /// Open (or create) a database file and initialize the schema
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the parent directory cannot be created, the
    /// database cannot be opened, or schema initialization fails.
    pub async fn new(db_path: PathBuf) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::connection_failed(db_path.clone(), e.to_string())
                })?;
            }
        }

        let db = Builder::new_local(&db_path)
            .build()
            .await
            .map_err(|e| StoreError::connection_failed(db_path.clone(), e.to_string()))?;

        Self::open(db, db_path, true).await
    }

    /// Private in-memory database (lives as long as the store)
    pub async fn new_in_memory() -> Result<Self, StoreError> {
        let db_path = PathBuf::from(":memory:");
        let db = Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::connection_failed(db_path.clone(), e.to_string()))?;

        Self::open(db, db_path, false).await
    }

    async fn open(db: Database, db_path: PathBuf, use_wal: bool) -> Result<Self, StoreError> {
        let conn = db
            .connect()
            .map_err(|e| StoreError::connection_failed(db_path.clone(), e.to_string()))?;

        if use_wal {
            execute_pragma(&conn, "PRAGMA journal_mode = WAL").await?;
        }
        execute_pragma(&conn, "PRAGMA busy_timeout = 5000").await?;
        initialize_schema(&conn).await?;

        tracing::debug!("Opened libsql node store at {}", db_path.display());

        Ok(Self {
            _db: Arc::new(db),
            state: Arc::new(Mutex::new(ConnectionState {
                conn,
                in_transaction: false,
            })),
            db_path,
        })
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }
}

/// PRAGMA statements return rows, so they go through `query()` rather than `execute()`
async fn execute_pragma(conn: &Connection, pragma: &str) -> Result<(), StoreError> {
    let mut stmt = conn.prepare(pragma).await.map_err(|e| {
        StoreError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
    })?;
    let _ = stmt.query(()).await.map_err(|e| {
        StoreError::sql_execution(format!("Failed to execute '{}': {}", pragma, e))
    })?;
    Ok(())
}

async fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS nodes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            parent_id INTEGER,
            path TEXT,
            left_bound INTEGER,
            right_bound INTEGER,
            depth INTEGER,
            root_id INTEGER
        )",
        "CREATE TABLE IF NOT EXISTS node_closure (
            ancestor_id INTEGER NOT NULL,
            descendant_id INTEGER NOT NULL,
            level INTEGER NOT NULL,
            PRIMARY KEY (ancestor_id, descendant_id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id)",
        "CREATE INDEX IF NOT EXISTS idx_nodes_path ON nodes(path)",
        "CREATE INDEX IF NOT EXISTS idx_nodes_interval ON nodes(root_id, left_bound)",
        "CREATE INDEX IF NOT EXISTS idx_closure_descendant ON node_closure(descendant_id, level)",
    ];

    for sql in statements {
        conn.execute(sql, ()).await.map_err(|e| {
            StoreError::initialization_failed(format!("{}: {}", sql.lines().next().unwrap_or(sql), e))
        })?;
    }
    Ok(())
}

#[async_trait]
impl NodeStore for TursoStore {
    fn name(&self) -> &'static str {
        "turso"
    }

    async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
        let mut guard = self.state.clone().lock_owned().await;

        if guard.in_transaction {
            tracing::warn!("Rolling back abandoned transaction on {}", self.db_path.display());
            guard.conn.execute("ROLLBACK", ()).await.map_err(|e| {
                StoreError::sql_execution(format!("Failed to roll back abandoned transaction: {}", e))
            })?;
            guard.in_transaction = false;
        }

        guard.conn.execute("BEGIN IMMEDIATE", ()).await.map_err(|e| {
            StoreError::sql_execution(format!("Failed to begin transaction: {}", e))
        })?;
        guard.in_transaction = true;

        Ok(Box::new(TursoTransaction { guard: Some(guard) }))
    }
}

struct TursoTransaction {
    guard: Option<OwnedMutexGuard<ConnectionState>>,
}

impl TursoTransaction {
    fn conn(&self) -> StoreResult<&Connection> {
        self.guard
            .as_ref()
            .map(|state| &state.conn)
            .ok_or(StoreError::TransactionClosed)
    }

    async fn fetch_nodes(&self, sql: &str, params: Vec<Value>) -> StoreResult<Vec<Node>> {
        let conn = self.conn()?;
        let mut rows = conn
            .query(sql, Params::Positional(params))
            .await
            .map_err(|e| StoreError::sql_execution(format!("Node query failed: {}", e)))?;

        let mut nodes = Vec::new();
        while let Some(row) = rows.next().await? {
            nodes.push(row_to_node(&row)?);
        }
        Ok(nodes)
    }

    async fn finish(&mut self, statement: &str) -> StoreResult<()> {
        let mut guard = self.guard.take().ok_or(StoreError::TransactionClosed)?;
        guard.conn.execute(statement, ()).await.map_err(|e| {
            StoreError::sql_execution(format!("Failed to {}: {}", statement.to_lowercase(), e))
        })?;
        guard.in_transaction = false;
        Ok(())
    }
}

#[async_trait]
impl StoreTransaction for TursoTransaction {
    async fn get(&mut self, id: NodeId) -> StoreResult<Option<Node>> {
        let sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?");
        let mut nodes = self.fetch_nodes(&sql, vec![Value::Integer(id.0)]).await?;
        Ok(nodes.pop())
    }

    async fn insert(&mut self, node: NewNode) -> StoreResult<Node> {
        let conn = self.conn()?;
        let (left, right, depth, root_id) = interval_values(node.interval.as_ref());
        let mut rows = conn
            .query(
                "INSERT INTO nodes (name, parent_id, path, left_bound, right_bound, depth, root_id)
                 VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
                Params::Positional(vec![
                    Value::Text(node.name.clone()),
                    optional_id(node.parent_id),
                    optional_text(node.path.clone()),
                    left,
                    right,
                    depth,
                    root_id,
                ]),
            )
            .await
            .map_err(|e| StoreError::sql_execution(format!("Failed to insert node: {}", e)))?;

        let row = rows
            .next()
            .await?
            .ok_or_else(|| StoreError::sql_execution("Insert returned no id"))?;
        let id: i64 = row
            .get(0)
            .map_err(|e| StoreError::decode(format!("inserted id: {}", e)))?;

        Ok(node.into_node(NodeId(id)))
    }

    async fn update(&mut self, node: &Node) -> StoreResult<()> {
        let conn = self.conn()?;
        let (left, right, depth, root_id) = interval_values(node.interval.as_ref());
        let affected = conn
            .execute(
                "UPDATE nodes SET name = ?, parent_id = ?, path = ?, left_bound = ?,
                        right_bound = ?, depth = ?, root_id = ?
                 WHERE id = ?",
                Params::Positional(vec![
                    Value::Text(node.name.clone()),
                    optional_id(node.parent_id),
                    optional_text(node.path.clone()),
                    left,
                    right,
                    depth,
                    root_id,
                    Value::Integer(node.id.0),
                ]),
            )
            .await
            .map_err(|e| StoreError::sql_execution(format!("Failed to update node {}: {}", node.id, e)))?;

        if affected == 0 {
            return Err(StoreError::constraint(format!(
                "cannot update missing node {}",
                node.id
            )));
        }
        Ok(())
    }

    async fn delete_all(&mut self, ids: &[NodeId]) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.conn()?;
        let sql = format!("DELETE FROM nodes WHERE id IN ({})", placeholders(ids.len()));
        let deleted = conn
            .execute(&sql, Params::Positional(id_values(ids)))
            .await
            .map_err(|e| StoreError::sql_execution(format!("Failed to delete nodes: {}", e)))?;
        Ok(deleted)
    }

    async fn query(&mut self, filter: NodeFilter) -> StoreResult<Vec<Node>> {
        let (clause, params) = match filter {
            NodeFilter::All => ("1 = 1 ORDER BY id".to_string(), Vec::new()),
            NodeFilter::Ids(ids) => {
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                (
                    format!("id IN ({}) ORDER BY id", placeholders(ids.len())),
                    id_values(&ids),
                )
            }
            NodeFilter::ChildrenOf(None) => {
                ("parent_id IS NULL ORDER BY id".to_string(), Vec::new())
            }
            NodeFilter::ChildrenOf(Some(parent_id)) => (
                "parent_id = ? ORDER BY id".to_string(),
                vec![Value::Integer(parent_id.0)],
            ),
            NodeFilter::PathPrefix(prefix) => (
                "substr(path, 1, ?) = ? ORDER BY id".to_string(),
                vec![Value::Integer(prefix.len() as i64), Value::Text(prefix)],
            ),
            NodeFilter::Tree { root_id } => (
                "root_id = ? ORDER BY left_bound, id".to_string(),
                vec![Value::Integer(root_id.0)],
            ),
            NodeFilter::Enclosing {
                root_id,
                left,
                right,
            } => (
                "root_id = ? AND left_bound < ? AND right_bound > ? ORDER BY left_bound, id"
                    .to_string(),
                vec![
                    Value::Integer(root_id.0),
                    Value::Integer(left),
                    Value::Integer(right),
                ],
            ),
            NodeFilter::Enclosed {
                root_id,
                left,
                right,
            } => (
                "root_id = ? AND left_bound > ? AND right_bound < ? ORDER BY left_bound, id"
                    .to_string(),
                vec![
                    Value::Integer(root_id.0),
                    Value::Integer(left),
                    Value::Integer(right),
                ],
            ),
        };

        let sql = format!("SELECT {NODE_COLUMNS} FROM nodes WHERE {clause}");
        self.fetch_nodes(&sql, params).await
    }

    async fn closure_rows(&mut self, filter: ClosureFilter) -> StoreResult<Vec<ClosureRow>> {
        let Some((clause, params)) = closure_clause(filter) else {
            return Ok(Vec::new());
        };
        let conn = self.conn()?;
        let sql = format!(
            "SELECT ancestor_id, descendant_id, level FROM node_closure WHERE {clause}
             ORDER BY level, descendant_id, ancestor_id"
        );
        let mut rows = conn
            .query(&sql, Params::Positional(params))
            .await
            .map_err(|e| StoreError::sql_execution(format!("Closure query failed: {}", e)))?;

        let mut result = Vec::new();
        while let Some(row) = rows.next().await? {
            result.push(row_to_closure(&row)?);
        }
        Ok(result)
    }

    async fn insert_closure_rows(&mut self, rows: &[ClosureRow]) -> StoreResult<()> {
        let conn = self.conn()?;
        for row in rows {
            conn.execute(
                "INSERT INTO node_closure (ancestor_id, descendant_id, level) VALUES (?, ?, ?)",
                (row.ancestor_id.0, row.descendant_id.0, row.level),
            )
            .await
            .map_err(|e| {
                let context = format!(
                    "closure row ({}, {}): {}",
                    row.ancestor_id, row.descendant_id, e
                );
                if e.to_string().contains("UNIQUE") {
                    StoreError::constraint(context)
                } else {
                    StoreError::sql_execution(context)
                }
            })?;
        }
        Ok(())
    }

    async fn delete_closure_rows(&mut self, filter: ClosureFilter) -> StoreResult<u64> {
        let Some((clause, params)) = closure_clause(filter) else {
            return Ok(0);
        };
        let conn = self.conn()?;
        let sql = format!("DELETE FROM node_closure WHERE {clause}");
        let deleted = conn
            .execute(&sql, Params::Positional(params))
            .await
            .map_err(|e| StoreError::sql_execution(format!("Failed to delete closure rows: {}", e)))?;
        Ok(deleted)
    }

    async fn commit(&mut self) -> StoreResult<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        self.finish("ROLLBACK").await
    }
}

/// WHERE clause for a closure predicate, `None` when it can match nothing
fn closure_clause(filter: ClosureFilter) -> Option<(String, Vec<Value>)> {
    let clause = match filter {
        ClosureFilter::All => ("1 = 1".to_string(), Vec::new()),
        ClosureFilter::AncestorsOf(id) => {
            ("descendant_id = ?".to_string(), vec![Value::Integer(id.0)])
        }
        ClosureFilter::DescendantsOf(id) => {
            ("ancestor_id = ?".to_string(), vec![Value::Integer(id.0)])
        }
        ClosureFilter::DescendantsAtLevel(id, level) => (
            "ancestor_id = ? AND level = ?".to_string(),
            vec![Value::Integer(id.0), Value::Integer(level)],
        ),
        ClosureFilter::DescendantIn(ids) => {
            if ids.is_empty() {
                return None;
            }
            (
                format!("descendant_id IN ({})", placeholders(ids.len())),
                id_values(&ids),
            )
        }
        ClosureFilter::NonSelfDescendantIn(ids) => {
            if ids.is_empty() {
                return None;
            }
            (
                format!(
                    "descendant_id IN ({}) AND ancestor_id <> descendant_id",
                    placeholders(ids.len())
                ),
                id_values(&ids),
            )
        }
    };
    Some(clause)
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn id_values(ids: &[NodeId]) -> Vec<Value> {
    ids.iter().map(|id| Value::Integer(id.0)).collect()
}

fn optional_id(id: Option<NodeId>) -> Value {
    id.map_or(Value::Null, |id| Value::Integer(id.0))
}

fn optional_text(text: Option<String>) -> Value {
    text.map_or(Value::Null, Value::Text)
}

fn interval_values(interval: Option<&Interval>) -> (Value, Value, Value, Value) {
    match interval {
        Some(interval) => (
            Value::Integer(interval.left),
            Value::Integer(interval.right),
            Value::Integer(interval.depth),
            Value::Integer(interval.root_id.0),
        ),
        None => (Value::Null, Value::Null, Value::Null, Value::Null),
    }
}

fn row_to_node(row: &Row) -> StoreResult<Node> {
    let decode = |column: &str, e: libsql::Error| StoreError::decode(format!("{}: {}", column, e));

    let id: i64 = row.get(0).map_err(|e| decode("id", e))?;
    let name: String = row.get(1).map_err(|e| decode("name", e))?;
    let parent_id: Option<i64> = row.get(2).map_err(|e| decode("parent_id", e))?;
    let path: Option<String> = row.get(3).map_err(|e| decode("path", e))?;
    let left: Option<i64> = row.get(4).map_err(|e| decode("left_bound", e))?;
    let right: Option<i64> = row.get(5).map_err(|e| decode("right_bound", e))?;
    let depth: Option<i64> = row.get(6).map_err(|e| decode("depth", e))?;
    let root_id: Option<i64> = row.get(7).map_err(|e| decode("root_id", e))?;

    let interval = match (left, right, depth, root_id) {
        (Some(left), Some(right), Some(depth), Some(root_id)) => Some(Interval {
            left,
            right,
            depth,
            root_id: NodeId(root_id),
        }),
        (None, None, None, None) => None,
        _ => {
            return Err(StoreError::decode(format!(
                "node {} has a partially populated interval",
                id
            )))
        }
    };

    Ok(Node {
        id: NodeId(id),
        name,
        parent_id: parent_id.map(NodeId),
        path,
        interval,
    })
}

fn row_to_closure(row: &Row) -> StoreResult<ClosureRow> {
    let decode = |e: libsql::Error| StoreError::decode(format!("closure row: {}", e));
    let ancestor_id: i64 = row.get(0).map_err(decode)?;
    let descendant_id: i64 = row.get(1).map_err(decode)?;
    let level: i64 = row.get(2).map_err(decode)?;
    Ok(ClosureRow::new(
        NodeId(ancestor_id),
        NodeId(descendant_id),
        level,
    ))
}
