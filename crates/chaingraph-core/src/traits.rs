use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::entity::{Entity, EntityRef};
use crate::status::StatusMessage;
use crate::types::{
    Anchor, Direction, EdgeStats, EntityKey, EntityType, KeyspaceStats, NeighborSearchResult,
    NeighborsPage, SearchCriterion, Tag,
};
use crate::Result;

/// A failed remote call, echoing what was asked for.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{request} failed: {message}")]
pub struct FetchError {
    #[serde(default)]
    pub keyspace: Option<String>,
    pub request: String,
    pub message: String,
}

impl FetchError {
    pub fn new(keyspace: Option<&str>, request: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.map(str::to_string),
            request: request.into(),
            message: message.into(),
        }
    }
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Remote graph backend. Implementations own the transport.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Entity details; tags come back normalized to `{currency, keyspace, ...}`.
    async fn fetch_entity(&self, keyspace: &str, entity_type: EntityType, id: &str) -> FetchResult<Value>;
    async fn fetch_cluster_for_address(&self, keyspace: &str, address: &str) -> FetchResult<Option<Value>>;
    async fn fetch_neighbors(
        &self,
        keyspace: &str,
        id: &str,
        entity_type: EntityType,
        direction: Direction,
        page_size: usize,
        page: Option<String>,
    ) -> FetchResult<NeighborsPage>;
    async fn fetch_tags(&self, keyspace: &str, id: &str, entity_type: EntityType) -> FetchResult<Vec<Tag>>;
    async fn fetch_stats(&self) -> FetchResult<KeyspaceStats>;
    async fn fetch_cluster_addresses(&self, keyspace: &str, cluster: &str, limit: usize) -> FetchResult<Vec<Value>>;
    async fn search(&self, keyspace: &str, term: &str, limit: usize) -> FetchResult<Value>;
    /// Paths of at most `depth` hops, `breadth` neighbors wide, from `key` to
    /// whatever matches `criterion`.
    async fn search_neighbors(
        &self,
        key: &EntityKey,
        direction: Direction,
        criterion: &SearchCriterion,
        depth: usize,
        breadth: usize,
    ) -> FetchResult<NeighborSearchResult>;
}

/// Read-only access to stored entities and edges.
pub trait EntityLookup {
    fn entity(&self, key: &EntityKey) -> Option<EntityRef<'_>>;
    fn outgoing_edges(&self, keyspace: &str, id: &str) -> Vec<(String, Option<EdgeStats>)>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoState {
    pub can_undo: bool,
    pub can_redo: bool,
}

/// The rendered graph. Every hook has a no-op default so headless sessions can
/// implement only what they observe.
pub trait GraphView: Send {
    /// A load completed; `anchor` is absent for top-level loads.
    fn on_entity_resolved(&mut self, entity: &Entity, anchor: Option<&Anchor>);

    fn on_entity_removed(&mut self, _key: &EntityKey) {}

    fn on_entity_updated(&mut self, _key: &EntityKey) {}

    fn on_cluster_addresses(&mut self, _cluster: &EntityKey, _addresses: &[EntityKey]) {}

    fn on_search_result(&mut self, _keyspace: &str, _term: &str, _result: &Value) {}

    fn on_stats(&mut self, _stats: &KeyspaceStats) {}

    fn select(&mut self, _key: &EntityKey) {}

    /// Entities or edges changed outside a load; re-layout.
    fn redraw(&mut self) {}

    fn create_snapshot(&mut self) -> UndoState {
        UndoState::default()
    }

    fn undo(&mut self, _store: &dyn EntityLookup) -> UndoState {
        UndoState::default()
    }

    fn redo(&mut self, _store: &dyn EntityLookup) -> UndoState {
        UndoState::default()
    }

    fn set_undo_redo(&mut self, _state: UndoState) {}

    fn serialize(&self) -> Value {
        Value::Null
    }

    fn serialize_layout(&self) -> Value {
        Value::Null
    }

    fn restore(&mut self, _version: &str, _graph: &Value, _layout: &Value, _store: &dyn EntityLookup) -> Result<()> {
        Ok(())
    }

    fn reset(&mut self) {}
}

/// Spinner and status-bar output.
pub trait StatusSink: Send {
    fn on_loading_state_changed(&mut self, id: &str, is_loading: bool);
    fn on_status(&mut self, message: &StatusMessage);
}

/// Status sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn on_loading_state_changed(&mut self, id: &str, is_loading: bool) {
        debug!(id, is_loading, "loading state changed");
    }

    fn on_status(&mut self, message: &StatusMessage) {
        if message.is_error() {
            error!("{}", message);
        } else {
            info!("{}", message);
        }
    }
}
