use chaingraph_core::{
    DataSource, EntityKey, ExplorerConfig, GraphView, StatusMessage, StatusSink,
};
use chaingraph_graph::GraphStore;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Everything a graph session mutates. Handlers get `&mut Session` one at a time, so
/// the store and the loading set need no locking.
pub struct Session {
    pub(crate) store: GraphStore,
    /// Entities whose load is in progress; removing one cancels the rest of its
    /// chain. Keyed by the full key so equal ids in other keyspaces or of the other
    /// type never interfere.
    pub(crate) loading: BTreeSet<EntityKey>,
    pub(crate) source: Arc<dyn DataSource>,
    pub(crate) view: Box<dyn GraphView>,
    pub(crate) status: Box<dyn StatusSink>,
    pub(crate) config: ExplorerConfig,
    pub(crate) keyspaces: Vec<String>,
}

impl Session {
    pub fn new(
        config: ExplorerConfig,
        source: Arc<dyn DataSource>,
        view: Box<dyn GraphView>,
        status: Box<dyn StatusSink>,
    ) -> Self {
        let keyspaces = config.supported_keyspaces.clone();
        Self {
            store: GraphStore::new(),
            loading: BTreeSet::new(),
            source,
            view,
            status,
            config,
            keyspaces,
        }
    }

    /// Starts over with an empty graph. Collaborators and known keyspaces survive.
    pub fn reset(&mut self) {
        debug!(entities = self.store.len(), "resetting session");
        self.store.clear();
        for key in std::mem::take(&mut self.loading) {
            self.status.on_loading_state_changed(&key.id, false);
        }
        self.view.reset();
    }

    pub fn store(&self) -> &GraphStore {
        &self.store
    }

    pub fn keyspaces(&self) -> &[String] {
        &self.keyspaces
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    pub fn is_loading(&self, key: &EntityKey) -> bool {
        self.loading.contains(key)
    }

    pub fn loading(&self) -> impl Iterator<Item = &EntityKey> {
        self.loading.iter()
    }

    pub(crate) fn start_loading(&mut self, key: &EntityKey) {
        self.loading.insert(key.clone());
        self.status.on_loading_state_changed(&key.id, true);
    }

    pub(crate) fn stop_loading(&mut self, key: &EntityKey) {
        self.loading.remove(key);
        self.status.on_loading_state_changed(&key.id, false);
    }

    pub(crate) fn notify(&mut self, message: StatusMessage) {
        self.status.on_status(&message);
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("entities", &self.store.len())
            .field("loading", &self.loading)
            .field("keyspaces", &self.keyspaces)
            .finish()
    }
}
