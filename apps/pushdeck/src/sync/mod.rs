use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::protocol::{Command, ServerEvent};
use crate::session::{ConnectionManager, ConnectionState};

/// Idempotent resync request kinds with at most one in flight each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    AllButtons,
    Size,
}

/// In-flight request bookkeeping. Entries are added on send and removed on
/// a matching response or on connection loss (disconnection is treated as
/// request failure, so the request retries after reconnect).
#[derive(Debug, Default)]
pub struct PendingRequestSet {
    inner: Mutex<HashSet<RequestKind>>,
}

impl PendingRequestSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `kind`; returns false if a request of that kind is already
    /// outstanding, in which case the caller must not send.
    pub fn try_begin(&self, kind: RequestKind) -> bool {
        self.inner.lock().insert(kind)
    }

    /// Mark `kind` resolved; returns true if it was outstanding.
    pub fn resolve(&self, kind: RequestKind) -> bool {
        self.inner.lock().remove(&kind)
    }

    pub fn is_pending(&self, kind: RequestKind) -> bool {
        self.inner.lock().contains(&kind)
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }
}

/// Reacts to "connection became usable" and "topology changed" by issuing
/// idempotent resync requests, de-duplicated through [`PendingRequestSet`]
/// so a single logical trigger never produces redundant wire sends.
pub struct SyncCoordinator {
    manager: Arc<ConnectionManager>,
    pending: PendingRequestSet,
    /// Last known topology, either configuration-supplied or learned from a
    /// `size` event. `None` means server-authoritative and not yet learned.
    topology: Mutex<Option<(u16, u16)>>,
}

impl SyncCoordinator {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self {
            manager,
            pending: PendingRequestSet::new(),
            topology: Mutex::new(None),
        }
    }

    /// Seed a fixed topology from configuration; the size query is skipped
    /// entirely in this mode.
    pub fn with_configured_topology(self, rows: u16, cols: u16) -> Self {
        *self.topology.lock() = Some((rows, cols));
        self
    }

    pub fn handle_state(&self, state: ConnectionState) {
        match state {
            ConnectionState::Open => {
                if self.topology.lock().is_some() {
                    self.request(RequestKind::AllButtons, Command::AllButtons {});
                } else {
                    self.request(RequestKind::Size, Command::Size {});
                }
            }
            ConnectionState::Closed => {
                // Conservative: anything in flight died with the connection.
                self.pending.clear();
            }
            ConnectionState::Connecting | ConnectionState::Closing => {}
        }
    }

    pub fn handle_event(&self, event: &ServerEvent) {
        match event {
            ServerEvent::Size { rows, cols } => {
                self.pending.resolve(RequestKind::Size);
                let changed = {
                    let mut topology = self.topology.lock();
                    let changed = *topology != Some((*rows, *cols));
                    *topology = Some((*rows, *cols));
                    changed
                };
                // A different grid shape means the server may answer the
                // bulk query with different data; make no attempt to guess,
                // refetch. Never re-issue the size query from here.
                if changed && self.manager.state() == ConnectionState::Open {
                    self.request(RequestKind::AllButtons, Command::AllButtons {});
                }
            }
            ServerEvent::SetText { .. } => {
                // The server answers a bulk request with a stream of
                // set_text events, so the first one resolves it.
                self.pending.resolve(RequestKind::AllButtons);
            }
            ServerEvent::PushOk { .. } | ServerEvent::PushError { .. } => {}
        }
    }

    pub fn pending(&self) -> &PendingRequestSet {
        &self.pending
    }

    fn request(&self, kind: RequestKind, command: Command) {
        if !self.pending.try_begin(kind) {
            debug!(target = "sync::request", kind = ?kind, "already pending, suppressing");
            return;
        }
        debug!(target = "sync::request", kind = ?kind, "issuing resync request");
        if let Err(err) = self.manager.send_command(&command) {
            warn!(target = "sync::request", kind = ?kind, %err, "resync request failed");
            self.pending.resolve(kind);
        }
    }
}
