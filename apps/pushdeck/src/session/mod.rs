use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::protocol::{self, Command, ServerEvent, WireError};
use crate::transport::WebSocketTransport;

pub mod subscribers;

pub use subscribers::{SubscriberList, SubscriptionId};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("connection is not open")]
    NotConnected,
    #[error(transparent)]
    Encode(#[from] WireError),
}

struct ManagerInner {
    state: Mutex<ConnectionState>,
    endpoint: Mutex<Option<String>>,
    /// Bumped whenever the active transport is superseded; every transport
    /// task carries the generation it was spawned with and bails out the
    /// moment it is no longer current, so a late event from a dead transport
    /// can never mutate current state.
    generation: AtomicU64,
    outgoing: Mutex<Option<mpsc::UnboundedSender<String>>>,
    run_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
    reconnect_delay: Duration,
    state_subs: SubscriberList<ConnectionState>,
    event_subs: SubscriberList<ServerEvent>,
}

impl ManagerInner {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Record a transition and notify subscribers, unless the calling
    /// transport task has been superseded. The state lock is released before
    /// dispatch so callbacks may read the state back.
    fn set_state(&self, generation: u64, new_state: ConnectionState) -> bool {
        {
            let mut state = self.state.lock();
            if !self.is_current(generation) {
                return false;
            }
            if *state == new_state {
                return true;
            }
            *state = new_state;
        }
        debug!(target = "session::state", state = ?new_state, "connection state changed");
        self.state_subs.dispatch(&new_state);
        true
    }

    fn dispatch_frame(&self, raw: &str) {
        match protocol::decode_event(raw) {
            Ok(event) => self.event_subs.dispatch(&event),
            Err(WireError::Malformed { raw }) => {
                debug!(target = "session::frame", frame = %raw, "dropping malformed frame");
            }
            Err(err) => {
                debug!(target = "session::frame", %err, "dropping undecodable frame");
            }
        }
    }
}

/// Owns the transport lifecycle across reconnect attempts.
///
/// The manager is the only component that creates or destroys transports.
/// It publishes state transitions and codec-validated server events to any
/// number of subscribers, and reconnects automatically with a fixed delay
/// whenever the connection drops without an explicit `close`.
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::with_reconnect_delay(DEFAULT_RECONNECT_DELAY)
    }

    pub fn with_reconnect_delay(reconnect_delay: Duration) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                state: Mutex::new(ConnectionState::Closed),
                endpoint: Mutex::new(None),
                generation: AtomicU64::new(0),
                outgoing: Mutex::new(None),
                run_task: Mutex::new(None),
                reconnect_delay,
                state_subs: SubscriberList::new(),
                event_subs: SubscriberList::new(),
            }),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Start (or restart) the connection loop for `endpoint`.
    ///
    /// Idempotent: connecting to the endpoint we are already connecting or
    /// connected to is a no-op. Anything else supersedes the current
    /// transport, surfacing the disconnect transitions before the new
    /// attempt starts; there is at most one live transport at a time.
    pub fn connect(&self, endpoint: &str) {
        {
            let current = self.state();
            let same_endpoint = self
                .inner
                .endpoint
                .lock()
                .as_deref()
                .is_some_and(|active| active == endpoint);
            if same_endpoint
                && matches!(current, ConnectionState::Connecting | ConnectionState::Open)
            {
                debug!(target = "session::connect", endpoint, "already active, ignoring");
                return;
            }
        }

        self.disconnect_current();
        *self.inner.endpoint.lock() = Some(endpoint.to_string());

        let generation = self.inner.generation.load(Ordering::SeqCst);
        let inner = self.inner.clone();
        let endpoint = endpoint.to_string();
        let task = tokio::spawn(async move {
            run_connection(inner, endpoint, generation).await;
        });
        *self.inner.run_task.lock() = Some(task);
    }

    /// Encode and send a command. Fails with `NotConnected` unless the
    /// connection is Open; frames are dropped, never queued.
    pub fn send_command(&self, command: &Command) -> Result<(), SendError> {
        let frame = protocol::encode_command(command)?;
        self.send(frame)
    }

    pub fn send(&self, frame: String) -> Result<(), SendError> {
        if self.state() != ConnectionState::Open {
            return Err(SendError::NotConnected);
        }
        let outgoing = self.inner.outgoing.lock();
        match outgoing.as_ref() {
            Some(sender) => sender.send(frame).map_err(|_| SendError::NotConnected),
            None => Err(SendError::NotConnected),
        }
    }

    pub fn subscribe_state(
        &self,
        callback: impl Fn(&ConnectionState) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.state_subs.subscribe(callback)
    }

    pub fn unsubscribe_state(&self, id: SubscriptionId) {
        self.inner.state_subs.unsubscribe(id);
    }

    pub fn subscribe_events(
        &self,
        callback: impl Fn(&ServerEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.inner.event_subs.subscribe(callback)
    }

    pub fn unsubscribe_events(&self, id: SubscriptionId) {
        self.inner.event_subs.unsubscribe(id);
    }

    /// Scoped teardown: stops the reconnect loop, releases the transport and
    /// drives the state to Closed. Safe to call on all exit paths.
    pub fn close(&self) {
        self.disconnect_current();
    }

    /// Tear the active transport down and drive the state to Closed,
    /// notifying the disconnect transitions. Subscribers treat the Closed
    /// notification as authoritative connection loss, so every path that
    /// invalidates a transport must come through here.
    fn disconnect_current(&self) {
        let was = self.teardown();
        let generation = self.inner.generation.load(Ordering::SeqCst);
        match was {
            ConnectionState::Open => {
                self.inner.set_state(generation, ConnectionState::Closing);
                self.inner.set_state(generation, ConnectionState::Closed);
            }
            ConnectionState::Connecting | ConnectionState::Closing => {
                self.inner.set_state(generation, ConnectionState::Closed);
            }
            ConnectionState::Closed => {}
        }
    }

    /// Invalidate and stop the active transport task, if any. Returns the
    /// state observed before teardown; does not notify.
    fn teardown(&self) -> ConnectionState {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.inner.run_task.lock().take() {
            task.abort();
        }
        *self.inner.outgoing.lock() = None;
        *self.inner.state.lock()
    }
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(task) = self.inner.run_task.lock().take() {
            task.abort();
        }
    }
}

/// The connection loop: one iteration per physical transport attempt, with a
/// fixed delay between attempts. Exits only when superseded (new `connect`
/// or `close` bumped the generation and aborted us).
async fn run_connection(inner: Arc<ManagerInner>, endpoint: String, generation: u64) {
    loop {
        if !inner.set_state(generation, ConnectionState::Connecting) {
            return;
        }

        match WebSocketTransport::connect(&endpoint).await {
            Ok(mut transport) => {
                if !inner.is_current(generation) {
                    return;
                }
                *inner.outgoing.lock() = Some(transport.sender());
                if !inner.set_state(generation, ConnectionState::Open) {
                    return;
                }

                while let Some(raw) = transport.recv().await {
                    if !inner.is_current(generation) {
                        return;
                    }
                    inner.dispatch_frame(&raw);
                }

                if !inner.is_current(generation) {
                    return;
                }
                *inner.outgoing.lock() = None;
                warn!(target = "session::connect", endpoint = %endpoint, "connection lost");
                inner.set_state(generation, ConnectionState::Closing);
                if !inner.set_state(generation, ConnectionState::Closed) {
                    return;
                }
            }
            Err(err) => {
                if !inner.is_current(generation) {
                    return;
                }
                warn!(target = "session::connect", endpoint = %endpoint, %err, "connect failed");
                if !inner.set_state(generation, ConnectionState::Closed) {
                    return;
                }
            }
        }

        tokio::time::sleep(inner.reconnect_delay).await;
        if !inner.is_current(generation) {
            return;
        }
    }
}
