use std::sync::Arc;

use crate::cache::{ButtonGrid, ButtonState, GridTopology};
use crate::config::Config;
use crate::protocol::Command;
use crate::session::{ConnectionManager, ConnectionState, SendError};
use crate::sync::SyncCoordinator;

/// Wires the connection manager, grid store and sync coordinator together
/// and exposes the narrow surface presentation consumes: connection state,
/// per-coordinate button state and the push entry point.
pub struct GridApp {
    endpoint: String,
    manager: Arc<ConnectionManager>,
    store: Arc<ButtonGrid>,
    sync: Arc<SyncCoordinator>,
}

impl GridApp {
    pub fn new(config: &Config) -> Self {
        let manager = Arc::new(ConnectionManager::with_reconnect_delay(
            config.reconnect_delay,
        ));

        let store = Arc::new(match config.grid {
            Some((rows, cols)) => ButtonGrid::with_topology(rows, cols),
            None => ButtonGrid::new(),
        });

        let mut sync = SyncCoordinator::new(manager.clone());
        if let Some((rows, cols)) = config.grid {
            sync = sync.with_configured_topology(rows, cols);
        }
        let sync = Arc::new(sync);

        // Registration order matters: the store must see each event before
        // the coordinator reacts to it, so resync decisions always read
        // already-applied state.
        let store_events = store.clone();
        manager.subscribe_events(move |event| store_events.apply(event));
        let sync_events = sync.clone();
        manager.subscribe_events(move |event| sync_events.handle_event(event));
        let sync_state = sync.clone();
        manager.subscribe_state(move |state| sync_state.handle_state(*state));

        Self {
            endpoint: config.server_url.clone(),
            manager,
            store,
            sync,
        }
    }

    pub fn connect(&self) {
        self.manager.connect(&self.endpoint);
    }

    pub fn close(&self) {
        self.manager.close();
    }

    pub fn state(&self) -> ConnectionState {
        self.manager.state()
    }

    pub fn get(&self, x: u16, y: u16) -> ButtonState {
        self.store.get(x, y)
    }

    pub fn topology(&self) -> Option<GridTopology> {
        self.store.topology()
    }

    /// Send a push for the button at (x, y). Fails immediately when the
    /// connection is not open so the UI can surface it; nothing is queued.
    pub fn push(&self, x: u16, y: u16) -> Result<(), SendError> {
        self.manager.send_command(&Command::Push { x, y })
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn store(&self) -> &Arc<ButtonGrid> {
        &self.store
    }

    pub fn sync(&self) -> &Arc<SyncCoordinator> {
        &self.sync
    }
}
