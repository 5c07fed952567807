//! HierarchyService - Validation, Engine Dispatch and Events
//!
//! The service is what callers hold. It validates simple attributes with the
//! [`NameValidator`] before the engine opens a transaction, forwards the
//! operation to the configured [`Engine`], logs committed mutations, and
//! broadcasts a [`HierarchyEvent`] for each of them.

use crate::config::{HierarchyConfig, StoreConfig, DEFAULT_EVENT_CHANNEL_CAPACITY};
use crate::db::{MemoryStore, NodeStore};
use crate::engines::{
    DeleteOutcome, Engine, HierarchyEngine, HierarchyResult, MoveOutcome, Strategy,
};
use crate::models::{NameValidator, Node, NodeId};
use crate::services::{HierarchyEvent, ServiceInitError};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Hierarchy operations over one engine and one store
///
/// Cloning is cheap; clones share the engine and the event channel.
///
/// # Examples
///
/// ```rust
/// use hierarchy_core::engines::Strategy;
/// use hierarchy_core::services::HierarchyService;
///
/// # tokio_test::block_on(async {
/// let service = HierarchyService::in_memory(Strategy::Closure);
/// let ops = service.create("Operations", None).await?;
/// let support = service.create("Support", Some(ops.id)).await?;
///
/// let ancestors = service.ancestors(support.id).await?;
/// assert_eq!(ancestors[0].id, ops.id);
/// # Ok::<(), hierarchy_core::engines::HierarchyError>(())
/// # }).unwrap();
/// ```
#[derive(Clone)]
pub struct HierarchyService {
    engine: Arc<Engine>,
    validator: NameValidator,

    /// Broadcast channel for domain events
    event_tx: broadcast::Sender<HierarchyEvent>,
}

impl HierarchyService {
    pub fn new(engine: Engine, validator: NameValidator, event_channel_capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(event_channel_capacity);
        Self {
            engine: Arc::new(engine),
            validator,
            event_tx,
        }
    }

    /// Service over a given store with default validation and channel capacity
    pub fn with_store(strategy: Strategy, store: Arc<dyn NodeStore>) -> Self {
        Self::new(
            Engine::new(strategy, store),
            NameValidator::default(),
            DEFAULT_EVENT_CHANNEL_CAPACITY,
        )
    }

    /// Service over a fresh [`MemoryStore`]
    pub fn in_memory(strategy: Strategy) -> Self {
        Self::with_store(strategy, Arc::new(MemoryStore::new()))
    }

    /// Build the store, engine and validator described by `config`
    pub async fn from_config(config: &HierarchyConfig) -> Result<Self, ServiceInitError> {
        config.validate()?;

        let store: Arc<dyn NodeStore> = match &config.store {
            StoreConfig::Memory => Arc::new(MemoryStore::new()),
            #[cfg(feature = "turso")]
            StoreConfig::Turso { path } => {
                Arc::new(crate::db::TursoStore::new(path.clone()).await?)
            }
            #[cfg(not(feature = "turso"))]
            StoreConfig::Turso { .. } => {
                return Err(ServiceInitError::BackendUnavailable("turso"));
            }
        };

        tracing::info!(
            "Hierarchy service ready: strategy={}, store={}",
            config.strategy,
            store.name()
        );

        Ok(Self::new(
            Engine::new(config.strategy, store),
            NameValidator::new(config.max_name_length),
            config.event_channel_capacity,
        ))
    }

    pub fn strategy(&self) -> Strategy {
        self.engine.strategy()
    }

    /// Direct engine access, bypassing validation and events
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Subscribe to domain events
    ///
    /// Only events emitted after the call are received.
    pub fn subscribe_to_events(&self) -> broadcast::Receiver<HierarchyEvent> {
        self.event_tx.subscribe()
    }

    /// Ignores the error returned when nobody is subscribed
    fn emit_event(&self, event: HierarchyEvent) {
        let _ = self.event_tx.send(event);
    }

    //
    // MUTATIONS
    //

    pub async fn create(&self, name: &str, parent_id: Option<NodeId>) -> HierarchyResult<Node> {
        self.validator.validate_name(name)?;

        let node = self.engine.create(name, parent_id).await?;
        tracing::info!(
            "Created entity {} '{}' under {:?} ({})",
            node.id,
            node.name,
            node.parent_id,
            self.strategy()
        );
        self.emit_event(HierarchyEvent::NodeCreated { node: node.clone() });
        Ok(node)
    }

    /// Move `node_id` and its subtree under `new_parent_id` (`None` makes it a root)
    pub async fn move_node(
        &self,
        node_id: NodeId,
        new_parent_id: Option<NodeId>,
    ) -> HierarchyResult<Node> {
        let MoveOutcome {
            node,
            old_parent_id,
        } = self.engine.move_subtree(node_id, new_parent_id).await?;
        tracing::info!(
            "Moved entity {} from {:?} to {:?}",
            node.id,
            old_parent_id,
            new_parent_id
        );
        self.emit_event(HierarchyEvent::NodeMoved {
            id: node.id,
            old_parent_id,
            new_parent_id,
        });
        Ok(node)
    }

    pub async fn rename(&self, node_id: NodeId, name: &str) -> HierarchyResult<Node> {
        self.validator.validate_name(name)?;

        let node = self.engine.rename(node_id, name).await?;
        tracing::info!("Renamed entity {} to '{}'", node.id, node.name);
        self.emit_event(HierarchyEvent::NodeRenamed { node: node.clone() });
        Ok(node)
    }

    /// Delete `node_id` and its whole subtree
    pub async fn delete(&self, node_id: NodeId) -> HierarchyResult<DeleteOutcome> {
        let outcome = self.engine.delete(node_id).await?;
        tracing::info!(
            "Deleted entity {} with {} descendants",
            node_id,
            outcome.count().saturating_sub(1)
        );
        self.emit_event(HierarchyEvent::SubtreeDeleted {
            root_id: node_id,
            ids: outcome.deleted.clone(),
        });
        Ok(outcome)
    }

    //
    // QUERIES
    //

    pub async fn get(&self, node_id: NodeId) -> HierarchyResult<Node> {
        self.engine.get(node_id).await
    }

    pub async fn roots(&self) -> HierarchyResult<Vec<Node>> {
        self.engine.roots().await
    }

    pub async fn children(&self, node_id: NodeId) -> HierarchyResult<Vec<Node>> {
        self.engine.children(node_id).await
    }

    /// Ancestors, nearest first
    pub async fn ancestors(&self, node_id: NodeId) -> HierarchyResult<Vec<Node>> {
        self.engine.ancestors(node_id).await
    }

    /// Ancestors, root first
    pub async fn lineage(&self, node_id: NodeId) -> HierarchyResult<Vec<Node>> {
        self.engine.lineage(node_id).await
    }

    pub async fn descendants(&self, node_id: NodeId) -> HierarchyResult<Vec<Node>> {
        self.engine.descendants(node_id).await
    }

    pub async fn depth(&self, node_id: NodeId) -> HierarchyResult<usize> {
        self.engine.depth(node_id).await
    }

    pub async fn verify_integrity(&self) -> HierarchyResult<()> {
        self.engine.verify_integrity().await
    }
}
