use chaingraph_bus::{BusStats, MessageBus};
use chaingraph_core::{ChainGraphConfig, DataSource, GraphView, StatusSink};
use chaingraph_graph::GraphStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{ExplorerError, Result};
use crate::handlers::handle;
use crate::message::{message_names, vocabulary, Message};
use crate::persist::SessionBlob;
use crate::session::Session;

/// One graph session driven by its message bus.
///
/// UI intents go in through [`Explorer::publish`]; [`Explorer::run_until_idle`]
/// then drives queued messages and fetch results until the session settles.
pub struct Explorer {
    bus: MessageBus<Session, Message>,
    session: Session,
    config: ChainGraphConfig,
}

impl Explorer {
    pub fn new(
        config: ChainGraphConfig,
        source: Arc<dyn DataSource>,
        view: Box<dyn GraphView>,
        status: Box<dyn StatusSink>,
    ) -> Result<Self> {
        let mut bus = MessageBus::new(vocabulary(), &config.bus)
            .with_snapshot_message(Message::CreateSnapshot)?
            .with_undo_redo_message(Message::DisableUndoRedo)?;
        for name in message_names() {
            bus.subscribe(name, handle)?;
        }
        let session = Session::new(config.explorer.clone(), source, view, status);
        info!(
            degree_threshold = config.explorer.degree_threshold,
            keyspaces = ?session.keyspaces(),
            "explorer ready"
        );
        Ok(Self {
            bus,
            session,
            config,
        })
    }

    pub fn publish(&mut self, message: Message) -> Result<()> {
        self.bus
            .publish(&mut self.session, message)
            .map_err(ExplorerError::lift)
    }

    pub async fn run_until_idle(&mut self) -> Result<()> {
        self.bus
            .run_until_idle(&mut self.session)
            .await
            .map_err(ExplorerError::lift)
    }

    pub async fn run_for(&mut self, window: Duration) -> Result<()> {
        self.bus
            .run_for(&mut self.session, window)
            .await
            .map_err(ExplorerError::lift)
    }

    /// Rebuilds the graph from the recorded history without any remote call.
    pub fn replay(&mut self) -> Result<()> {
        self.session.reset();
        self.bus
            .replay(&mut self.session)
            .map_err(ExplorerError::lift)
    }

    pub fn history_json(&self) -> Result<String> {
        Ok(self.bus.history_json()?)
    }

    /// Restores a session from a history written by [`Explorer::history_json`].
    pub fn recover(&mut self, history_json: &str) -> Result<()> {
        self.bus.load_history_json(history_json)?;
        self.replay()
    }

    /// Empty graph, empty history.
    pub fn new_graph(&mut self) {
        self.session.reset();
        self.bus.clear_history();
        self.bus.mark_clean();
    }

    pub fn save(&mut self) -> Result<String> {
        let view = &self.session.view;
        let blob = SessionBlob::new(
            self.session.store.serialize(),
            view.serialize(),
            self.config.view.clone(),
            view.serialize_layout(),
        );
        let encoded = blob.encode()?;
        self.bus.mark_clean();
        info!(entities = self.session.store.len(), "session saved");
        Ok(encoded)
    }

    /// Replaces the current graph with a saved one.
    pub fn load(&mut self, blob: &str) -> Result<()> {
        let SessionBlob(version, snapshot, graph, view_config, layout) = SessionBlob::decode(blob)?;
        self.new_graph();
        self.session.store.deserialize(&version, snapshot);
        if let Err(e) = self.session.store.check_membership() {
            warn!("loaded graph is inconsistent: {}", e);
        }
        let session = &mut self.session;
        session
            .view
            .restore(&version, &graph, &layout, &session.store)?;
        self.config.view = view_config;
        info!(version = %version, entities = self.session.store.len(), "session loaded");
        Ok(())
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn store(&self) -> &GraphStore {
        &self.session.store
    }

    pub fn config(&self) -> &ChainGraphConfig {
        &self.config
    }

    /// True once the graph changed since it was created, loaded or saved.
    pub fn is_dirty(&self) -> bool {
        self.bus.is_dirty()
    }

    pub fn history_len(&self) -> usize {
        self.bus.history().len()
    }

    pub fn stats(&self) -> BusStats {
        self.bus.stats()
    }
}
