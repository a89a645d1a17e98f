//! Banter chat server.
//!
//! # Architecture
//!
//! This crate pairs a pure, action-based [`ServerDriver`] (the session
//! registry, handshake gates, and dispatch logic - no I/O) with a tokio
//! runtime that executes its actions over TCP. The driver sits behind a
//! single async mutex: every registry mutation is a short in-memory
//! critical section, and the lock is never held across socket I/O -
//! sends happen after the lock is released, and a password round-trip
//! spans two separate events.
//!
//! Removal is deferred inside the driver (doomed sessions drain to
//! `Close` actions after dispatch), so no scan ever observes an entry
//! disappearing under it.
//!
//! # Components
//!
//! - [`ServerDriver`]: event→actions orchestrator (pure logic)
//! - [`Server`]: accept loop + event dispatch over TCP
//! - [`ServerHandle`]: the operator API (kick, promote, block, ...)
//! - [`ServerObserver`]: event sink implemented by the front-end

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod driver;
mod error;
mod observer;
mod registry;
mod transport;

use std::{collections::HashMap, net::SocketAddr, sync::Arc};

use bytes::Bytes;
pub use driver::{DriverConfig, LogLevel, ServerAction, ServerDriver, ServerEvent};
pub use error::ServerError;
pub use observer::{ServerNotification, ServerObserver};
pub use registry::{Session, SessionRegistry, SessionState, SessionSummary};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{Mutex, RwLock, mpsc, watch},
};

/// Per-connection runtime handles.
///
/// The outbound sender feeds the session's writer task; dropping it (on
/// removal) lets the writer flush queued frames and close the socket.
struct ConnectionHandle {
    /// Queue of encoded frames for the writer task.
    outbound: mpsc::Sender<Bytes>,
    /// Abort handle for the reader task.
    reader: tokio::task::AbortHandle,
}

/// Shared state for all connections.
struct SharedState {
    /// Session id → connection handles.
    connections: RwLock<HashMap<u64, ConnectionHandle>>,
}

/// Server configuration for the runtime.
#[derive(Debug, Clone)]
pub struct ServerRuntimeConfig {
    /// Address to bind to (e.g. "0.0.0.0:7667").
    pub bind_address: String,
    /// Driver configuration (password, session limit).
    pub driver: DriverConfig,
}

impl Default for ServerRuntimeConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0:7667".to_string(), driver: DriverConfig::default() }
    }
}

/// Production banter server.
///
/// Wraps [`ServerDriver`] with a TCP accept loop and per-connection
/// reader/writer tasks.
pub struct Server {
    /// Listening socket.
    listener: TcpListener,
    /// The action-based driver, shared with operator handles.
    driver: Arc<Mutex<ServerDriver>>,
    /// Connection handles.
    shared: Arc<SharedState>,
    /// Front-end event sink.
    observer: Arc<dyn ServerObserver>,
    /// Event queue fed by connection tasks.
    events_tx: mpsc::Sender<ServerEvent>,
    /// Event queue drained by [`Server::run`].
    events_rx: mpsc::Receiver<ServerEvent>,
    /// Cooperative stop signal.
    shutdown_tx: watch::Sender<bool>,
    /// Stop signal observed by the run loop.
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    /// Create and bind a new server.
    ///
    /// # Errors
    ///
    /// - `ServerError::Bind` if the listen address cannot be bound
    pub async fn bind(
        config: ServerRuntimeConfig,
        observer: Arc<dyn ServerObserver>,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(&config.bind_address).await.map_err(|source| {
            ServerError::Bind { addr: config.bind_address.clone(), source }
        })?;

        let (events_tx, events_rx) = mpsc::channel(256);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            listener,
            driver: Arc::new(Mutex::new(ServerDriver::new(config.driver))),
            shared: Arc::new(SharedState { connections: RwLock::new(HashMap::new()) }),
            observer,
            events_tx,
            events_rx,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Operator handle for this server. May be cloned freely and used
    /// from any task.
    #[must_use]
    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            driver: Arc::clone(&self.driver),
            shared: Arc::clone(&self.shared),
            observer: Arc::clone(&self.observer),
            events: self.events_tx.clone(),
            shutdown: self.shutdown_tx.clone(),
        }
    }

    /// Run the server until [`ServerHandle::shutdown`] is called.
    ///
    /// Each loop iteration either accepts one connection or dispatches
    /// one event through the driver; per-connection I/O lives in its own
    /// tasks, so a slow handshake never stalls this loop.
    pub async fn run(mut self) -> Result<(), ServerError> {
        tracing::info!("server listening on {}", self.local_addr()?);

        let mut next_session_id: u64 = 1;

        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                },
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let session_id = next_session_id;
                        next_session_id += 1;
                        self.register_connection(stream, peer, session_id).await;
                    },
                    Err(e) => tracing::error!("accept error: {e}"),
                },
                Some(event) = self.events_rx.recv() => {
                    let actions = self.driver.lock().await.process_event(event);
                    execute_actions(actions, &self.shared, self.observer.as_ref(), &self.events_tx)
                        .await;
                },
            }
        }

        // Drop every connection handle: writers flush their queues
        // (including the shutdown farewell) and close the sockets.
        self.shared.connections.write().await.clear();
        tracing::info!("server stopped");

        Ok(())
    }

    /// Wire up reader/writer tasks for a fresh connection and admit it.
    async fn register_connection(&self, stream: TcpStream, peer: SocketAddr, session_id: u64) {
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();

        let (outbound_tx, outbound_rx) = mpsc::channel::<Bytes>(64);
        tokio::spawn(transport::write_loop(
            write_half,
            session_id,
            outbound_rx,
            self.events_tx.clone(),
        ));
        let reader =
            tokio::spawn(transport::read_loop(read_half, session_id, self.events_tx.clone()));

        self.shared.connections.write().await.insert(session_id, ConnectionHandle {
            outbound: outbound_tx,
            reader: reader.abort_handle(),
        });

        let actions = self.driver.lock().await.process_event(ServerEvent::ConnectionAccepted {
            session_id,
            addr: peer.ip().to_string(),
        });
        execute_actions(actions, &self.shared, self.observer.as_ref(), &self.events_tx).await;
    }
}

/// Operator API: a cloneable handle onto a running server.
///
/// The console layer is purely a caller of these operations; each locks
/// the driver for its in-memory critical section and executes the
/// resulting actions with the lock released.
#[derive(Clone)]
pub struct ServerHandle {
    /// Shared driver.
    driver: Arc<Mutex<ServerDriver>>,
    /// Connection handles.
    shared: Arc<SharedState>,
    /// Front-end event sink.
    observer: Arc<dyn ServerObserver>,
    /// Event queue (for send-failure feedback).
    events: mpsc::Sender<ServerEvent>,
    /// Stop signal.
    shutdown: watch::Sender<bool>,
}

impl ServerHandle {
    async fn execute(&self, actions: Vec<ServerAction>) {
        execute_actions(actions, &self.shared, self.observer.as_ref(), &self.events).await;
    }

    /// Kick an active session by address or name; optionally block the
    /// address. Returns whether a session matched.
    pub async fn kick(&self, identifier: &str, also_block: bool) -> bool {
        let (found, actions) = self.driver.lock().await.kick(identifier, also_block);
        self.execute(actions).await;
        found
    }

    /// Change an active session's role. Returns whether a session
    /// matched.
    pub async fn promote(&self, identifier: &str, role: banter_proto::Role) -> bool {
        let (found, actions) = self.driver.lock().await.promote(identifier, role);
        self.execute(actions).await;
        found
    }

    /// Send operator text to every active session.
    pub async fn broadcast_text(&self, body: &str) {
        let actions = self.driver.lock().await.broadcast_text(body);
        self.execute(actions).await;
    }

    /// Change the admission password (empty or `None` disables it).
    pub async fn set_password(&self, password: Option<String>) {
        let actions = self.driver.lock().await.set_password(password);
        self.execute(actions).await;
    }

    /// Change the active-session limit (`None` means unbounded).
    pub async fn set_max_clients(&self, max_clients: Option<u32>) {
        let actions = self.driver.lock().await.set_max_clients(max_clients);
        self.execute(actions).await;
    }

    /// Block an address. Returns `false` if it was already blocked.
    pub async fn block(&self, addr: &str) -> bool {
        self.driver.lock().await.block(addr)
    }

    /// Unblock an address. Returns `false` if it was not blocked.
    pub async fn unblock(&self, addr: &str) -> bool {
        self.driver.lock().await.unblock(addr)
    }

    /// Summary rows for all live sessions, join order.
    pub async fn list_sessions(&self) -> Vec<SessionSummary> {
        self.driver.lock().await.list_sessions()
    }

    /// Number of active sessions.
    pub async fn active_count(&self) -> usize {
        self.driver.lock().await.active_count()
    }

    /// Current driver configuration.
    pub async fn config(&self) -> DriverConfig {
        self.driver.lock().await.config().clone()
    }

    /// Announce shutdown to every active session and stop the server.
    pub async fn shutdown(&self) {
        let actions = self.driver.lock().await.shutdown();
        self.execute(actions).await;
        let _ = self.shutdown.send(true);
    }
}

/// Execute driver actions.
///
/// Sends go through per-session bounded queues with `try_send`: a slow
/// consumer's full queue counts as a send failure for that session alone
/// and never stalls delivery to the remaining sessions.
async fn execute_actions(
    actions: Vec<ServerAction>,
    shared: &SharedState,
    observer: &dyn ServerObserver,
    events: &mpsc::Sender<ServerEvent>,
) {
    for action in actions {
        match action {
            ServerAction::Send { session_id, message } => match message.to_bytes() {
                Ok(bytes) => {
                    let connections = shared.connections.read().await;
                    match connections.get(&session_id) {
                        Some(handle) => {
                            if handle.outbound.try_send(bytes).is_err() {
                                tracing::warn!(
                                    "outbound queue unavailable for session {session_id}"
                                );
                                let _ = events.try_send(ServerEvent::SendFailed { session_id });
                            }
                        },
                        None => tracing::debug!("send to unknown session {session_id}"),
                    }
                },
                Err(e) => tracing::error!("failed to encode outbound message: {e}"),
            },

            ServerAction::Close { session_id } => {
                let mut connections = shared.connections.write().await;
                if let Some(handle) = connections.remove(&session_id) {
                    handle.reader.abort();
                    // Dropping the outbound sender lets the writer task
                    // flush queued frames before closing the socket.
                }
            },

            ServerAction::Notify(notification) => observer.handle(notification),

            ServerAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{message}"),
                LogLevel::Info => tracing::info!("{message}"),
                LogLevel::Warn => tracing::warn!("{message}"),
                LogLevel::Error => tracing::error!("{message}"),
            },
        }
    }
}
