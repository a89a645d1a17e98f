//! Server driver.
//!
//! Ties together the session registry, the password/capacity handshake
//! gates, and frame dispatch. Pure logic in the action pattern: the
//! runtime feeds [`ServerEvent`]s in and executes the returned
//! [`ServerAction`]s, so every admission, kick, and broadcast path is
//! testable without a socket.
//!
//! # Handshake
//!
//! ```text
//!          admit                      password ok            identity
//! accept ────────> AwaitingPassword ─────────────> Awaiting ─────────> Active
//!   │    (password     │    ↑ mismatch: re-prompt  Identity              │
//!   │     configured)  │    └──────────┘              │                  │
//!   │                  │                              │ over capacity    │ kick /
//!   │ blocked address  │ protocol violation           ↓                  ↓ disconnect
//!   └───> Kicked+close └────────────────────────>  Doomed ──drain──> removed
//! ```
//!
//! Removal is deferred: paths that end a session only mark it doomed,
//! and `drain_removals` turns the marks into `Close` actions after the
//! dispatch that caused them has finished iterating.

use banter_proto::{Identity, Message, PresenceReason, Role};
use bytes::Bytes;

use crate::{
    observer::ServerNotification,
    registry::{SessionRegistry, SessionState, SessionSummary},
};

/// Server configuration, readable and mutable through the driver.
#[derive(Debug, Clone, Default)]
pub struct DriverConfig {
    /// Password required for admission. `None` disables the gate.
    pub password: Option<String>,
    /// Maximum concurrent *active* sessions. `None` means unbounded;
    /// sessions mid-handshake never count.
    pub max_clients: Option<u32>,
}

/// Events that the server driver processes.
///
/// These are produced by the runtime (accept loop, per-connection reader
/// and writer tasks).
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new connection was accepted.
    ConnectionAccepted {
        /// Runtime-assigned connection id.
        session_id: u64,
        /// Remote address.
        addr: String,
    },

    /// A frame body was received from a connection.
    FrameReceived {
        /// Connection that sent the frame.
        session_id: u64,
        /// The raw frame body; the driver decodes it according to the
        /// session's handshake state.
        bytes: Bytes,
    },

    /// A connection was closed by the peer.
    ConnectionClosed {
        /// Connection that closed.
        session_id: u64,
    },

    /// A send to a connection failed; the session must be removed
    /// without aborting delivery to anyone else.
    SendFailed {
        /// Connection whose send failed.
        session_id: u64,
    },
}

/// Actions that the server driver produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAction {
    /// Send a message to one session.
    Send {
        /// Target session.
        session_id: u64,
        /// Message to send.
        message: Message,
    },

    /// Tear down a session's transport. Emitted only by the removal
    /// drain, after any farewell frames were queued.
    Close {
        /// Session to close.
        session_id: u64,
    },

    /// Report an event to the observer.
    Notify(ServerNotification),

    /// Log a message.
    Log {
        /// Severity.
        level: LogLevel,
        /// Message text.
        message: String,
    },
}

/// Log levels for driver actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Diagnostic detail.
    Debug,
    /// Normal operation.
    Info,
    /// Something suspicious but survivable.
    Warn,
    /// A failure worth operator attention.
    Error,
}

/// Action-based server driver.
///
/// All registry mutations happen inside `process_event` and the operator
/// methods; the runtime serializes calls behind one lock and never holds
/// that lock across socket I/O.
#[derive(Debug, Default)]
pub struct ServerDriver {
    /// Live sessions + blocked addresses.
    registry: SessionRegistry,
    /// Current configuration.
    config: DriverConfig,
}

impl ServerDriver {
    /// Create a driver with the given configuration.
    #[must_use]
    pub fn new(config: DriverConfig) -> Self {
        Self { registry: SessionRegistry::new(), config }
    }

    /// Current configuration.
    #[must_use]
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Number of active sessions.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.registry.active_count()
    }

    /// Total number of live sessions, handshaking included.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.registry.session_count()
    }

    /// Process a runtime event and return the actions to execute.
    pub fn process_event(&mut self, event: ServerEvent) -> Vec<ServerAction> {
        let mut actions = match event {
            ServerEvent::ConnectionAccepted { session_id, addr } => {
                self.handle_connection_accepted(session_id, addr)
            },
            ServerEvent::FrameReceived { session_id, bytes } => {
                self.handle_frame_received(session_id, &bytes)
            },
            ServerEvent::ConnectionClosed { session_id } => {
                self.handle_connection_closed(session_id)
            },
            ServerEvent::SendFailed { session_id } => self.handle_send_failed(session_id),
        };

        self.drain_removals(&mut actions);
        actions
    }

    fn handle_connection_accepted(&mut self, session_id: u64, addr: String) -> Vec<ServerAction> {
        if self.registry.is_blocked(&addr) {
            // No session is created for a blocked address: tell the peer
            // and close without registering.
            return vec![
                ServerAction::Notify(ServerNotification::ConnectionBlocked { addr: addr.clone() }),
                ServerAction::Send { session_id, message: Message::Kicked },
                ServerAction::Log {
                    level: LogLevel::Debug,
                    message: format!("turned away blocked address {addr}"),
                },
                ServerAction::Close { session_id },
            ];
        }

        let mut actions = vec![
            ServerAction::Notify(ServerNotification::ConnectionAccepted { addr: addr.clone() }),
            ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("connection {session_id} accepted from {addr}"),
            },
        ];

        if self.config.password.is_some() {
            self.registry.insert(session_id, addr, SessionState::AwaitingPassword);
            actions.push(ServerAction::Send { session_id, message: Message::PasswordRequired });
        } else {
            self.registry.insert(session_id, addr, SessionState::AwaitingIdentity);
            actions.extend(self.admission_gate(session_id));
        }

        actions
    }

    /// The capacity gate, run once the password gate (if any) passed.
    ///
    /// Below the limit the session may proceed to the identity exchange;
    /// at the limit it is told `ServerFull` and doomed without ever
    /// becoming active, so the active count can never exceed the
    /// configured maximum.
    fn admission_gate(&mut self, session_id: u64) -> Vec<ServerAction> {
        let below_limit =
            self.config.max_clients.is_none_or(|max| self.registry.active_count() < max as usize);

        let Some(session) = self.registry.get_mut(session_id) else {
            return vec![ServerAction::Log {
                level: LogLevel::Warn,
                message: format!("admission gate for unknown session {session_id}"),
            }];
        };

        if below_limit {
            session.state = SessionState::AwaitingIdentity;
            return vec![ServerAction::Send { session_id, message: Message::Connected }];
        }

        let addr = session.addr.clone();
        self.registry.doom(session_id);

        vec![
            ServerAction::Notify(ServerNotification::ConnectionRejected { addr: addr.clone() }),
            ServerAction::Send { session_id, message: Message::ServerFull },
            ServerAction::Log {
                level: LogLevel::Info,
                message: format!("rejected {addr}: server is full"),
            },
        ]
    }

    fn handle_frame_received(&mut self, session_id: u64, bytes: &Bytes) -> Vec<ServerAction> {
        let Some(session) = self.registry.get(session_id) else {
            // Races with removal: a frame read before the reader task was
            // torn down. Nothing to do.
            return vec![ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("frame from unknown session {session_id}"),
            }];
        };
        let state = session.state;

        match state {
            SessionState::Doomed => vec![ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("frame from doomed session {session_id} ignored"),
            }],
            SessionState::AwaitingPassword => match Message::decode(bytes) {
                Ok(Message::PasswordAttempt { password }) => {
                    self.password_check(session_id, &password)
                },
                Ok(message) => self.protocol_violation(
                    session_id,
                    &format!("expected PasswordAttempt, got {:?}", message.kind()),
                ),
                Err(err) => {
                    self.protocol_violation(session_id, &format!("undecodable frame: {err}"))
                },
            },
            SessionState::AwaitingIdentity => match Identity::decode(bytes) {
                Ok(identity) => self.complete_handshake(session_id, identity),
                Err(err) => {
                    self.protocol_violation(session_id, &format!("undecodable identity: {err}"))
                },
            },
            SessionState::Active => match Message::decode(bytes) {
                Ok(Message::Text { body, .. }) => self.relay_text(session_id, body),
                // A late attempt after the initial resolution (e.g. a
                // race with a config change) re-runs the password check.
                Ok(Message::PasswordAttempt { password }) => {
                    self.password_check(session_id, &password)
                },
                Ok(message) => self.protocol_violation(
                    session_id,
                    &format!("client may not send {:?}", message.kind()),
                ),
                Err(err) => {
                    self.protocol_violation(session_id, &format!("undecodable frame: {err}"))
                },
            },
        }
    }

    /// Check a password attempt against the configured gate.
    ///
    /// Mismatches re-prompt with no attempt limit - the peer's retry
    /// budget is its own business. A match moves a pending session on to
    /// the capacity gate; an already-active session's stray attempt is
    /// ignored.
    fn password_check(&mut self, session_id: u64, attempt: &str) -> Vec<ServerAction> {
        let accepted = match &self.config.password {
            Some(password) => attempt == password,
            None => true,
        };

        if !accepted {
            return vec![
                ServerAction::Send { session_id, message: Message::PasswordRequired },
                ServerAction::Log {
                    level: LogLevel::Debug,
                    message: format!("wrong password from session {session_id}, re-prompting"),
                },
            ];
        }

        match self.registry.get(session_id) {
            Some(session) if session.is_active() => vec![ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("late password attempt from active session {session_id}"),
            }],
            _ => self.admission_gate(session_id),
        }
    }

    /// Identity received: the session becomes active and joins the
    /// broadcast set.
    fn complete_handshake(&mut self, session_id: u64, identity: Identity) -> Vec<ServerAction> {
        let mut actions = Vec::new();

        let Some(session) = self.registry.get_mut(session_id) else {
            return actions;
        };

        // The declared role is advisory only; privilege comes solely
        // from the promote operation.
        if identity.role != Role::Member {
            actions.push(ServerAction::Log {
                level: LogLevel::Debug,
                message: format!(
                    "session {session_id} declared role {:?}, ignored",
                    identity.role
                ),
            });
        }

        session.name = identity.name;
        session.state = SessionState::Active;

        let name = session.name.clone();
        let addr = session.addr.clone();

        actions.push(ServerAction::Notify(ServerNotification::SessionActive {
            name: name.clone(),
            addr: addr.clone(),
        }));
        actions.push(ServerAction::Log {
            level: LogLevel::Info,
            message: format!("{name} ({addr}) is now active"),
        });
        actions.extend(self.broadcast(
            &Message::PeerJoined { name, reason: PresenceReason::Joined },
            Some(session_id),
        ));

        actions
    }

    /// Relay chat text to everyone else.
    ///
    /// The broadcast is rebuilt from the registry's stored role and name:
    /// whatever the client put in its own `Text` header is not trusted.
    fn relay_text(&mut self, session_id: u64, body: String) -> Vec<ServerAction> {
        let Some(session) = self.registry.get(session_id) else {
            return Vec::new();
        };

        let role = session.role;
        let name = session.name.clone();

        let mut actions = vec![ServerAction::Notify(ServerNotification::TextReceived {
            role,
            name: name.clone(),
            body: body.clone(),
        })];
        actions.extend(self.broadcast(&Message::Text { role, name, body }, Some(session_id)));

        actions
    }

    fn handle_connection_closed(&mut self, session_id: u64) -> Vec<ServerAction> {
        let Some(session) = self.registry.get(session_id) else {
            return Vec::new();
        };

        let was_active = session.is_active();
        let name = session.display_name().to_string();
        let addr = session.addr.clone();

        self.registry.doom(session_id);

        if !was_active {
            return vec![ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("{addr} disconnected during handshake"),
            }];
        }

        let mut actions = vec![
            ServerAction::Notify(ServerNotification::SessionInactive {
                name: name.clone(),
                addr,
            }),
            ServerAction::Log { level: LogLevel::Info, message: format!("{name} disconnected") },
        ];
        actions.extend(self.broadcast(
            &Message::PeerLeft { name, reason: PresenceReason::Disconnected },
            Some(session_id),
        ));

        actions
    }

    /// A send failure removes that one session; delivery to the rest is
    /// unaffected.
    fn handle_send_failed(&mut self, session_id: u64) -> Vec<ServerAction> {
        let Some(session) = self.registry.get(session_id) else {
            return Vec::new();
        };

        let was_active = session.is_active();
        let name = session.display_name().to_string();
        let addr = session.addr.clone();

        self.registry.doom(session_id);

        let mut actions = vec![
            ServerAction::Notify(ServerNotification::TransportError {
                addr,
                context: "send failed".to_string(),
            }),
            ServerAction::Log {
                level: LogLevel::Warn,
                message: format!("send to {name} failed, removing session"),
            },
        ];

        if was_active {
            actions.extend(self.broadcast(
                &Message::PeerLeft { name, reason: PresenceReason::Disconnected },
                Some(session_id),
            ));
        }

        actions
    }

    /// A malformed or out-of-place frame is fatal to the one session.
    fn protocol_violation(&mut self, session_id: u64, reason: &str) -> Vec<ServerAction> {
        let Some(session) = self.registry.get(session_id) else {
            return Vec::new();
        };

        let was_active = session.is_active();
        let name = session.display_name().to_string();

        self.registry.doom(session_id);

        let mut actions = vec![ServerAction::Log {
            level: LogLevel::Warn,
            message: format!("protocol violation from {name}: {reason}"),
        }];

        if was_active {
            actions.extend(self.broadcast(
                &Message::PeerLeft { name, reason: PresenceReason::Disconnected },
                Some(session_id),
            ));
        }

        actions
    }

    /// Expand a broadcast into per-recipient sends, join order, active
    /// sessions only, optionally excluding one session by identity.
    fn broadcast(&self, message: &Message, exclude: Option<u64>) -> Vec<ServerAction> {
        self.registry
            .active_ids_except(exclude)
            .into_iter()
            .map(|session_id| ServerAction::Send { session_id, message: message.clone() })
            .collect()
    }

    /// Turn removal marks into `Close` actions once dispatch is done
    /// iterating.
    fn drain_removals(&mut self, actions: &mut Vec<ServerAction>) {
        for session in self.registry.drain_doomed() {
            actions.push(ServerAction::Log {
                level: LogLevel::Debug,
                message: format!("session {} ({}) removed", session.id, session.addr),
            });
            actions.push(ServerAction::Close { session_id: session.id });
        }
    }

    // Operator API. The console layer is purely a caller of these.

    /// Kick an active session by address or display name, optionally
    /// blocking the address. Returns whether a session matched.
    pub fn kick(&mut self, identifier: &str, also_block: bool) -> (bool, Vec<ServerAction>) {
        let Some(session_id) = self.registry.find_active(identifier) else {
            return (false, Vec::new());
        };

        let Some(session) = self.registry.get(session_id) else {
            return (false, Vec::new());
        };
        let name = session.display_name().to_string();
        let addr = session.addr.clone();

        if also_block {
            self.registry.block(&addr);
        }

        let mut actions = vec![
            ServerAction::Send { session_id, message: Message::Kicked },
            ServerAction::Notify(ServerNotification::SessionKicked {
                name: name.clone(),
                addr: addr.clone(),
            }),
            ServerAction::Log {
                level: LogLevel::Info,
                message: if also_block {
                    format!("kicked and blocked {name} ({addr})")
                } else {
                    format!("kicked {name} ({addr})")
                },
            },
        ];
        actions.extend(self.broadcast(
            &Message::PeerLeft { name, reason: PresenceReason::Kicked },
            Some(session_id),
        ));

        self.registry.doom(session_id);
        self.drain_removals(&mut actions);

        (true, actions)
    }

    /// Change an active session's role. Promotion vs demotion is decided
    /// by the role order; re-granting the current role reports
    /// `promoted = false`. Returns whether a session matched.
    pub fn promote(&mut self, identifier: &str, new_role: Role) -> (bool, Vec<ServerAction>) {
        let Some(session_id) = self.registry.find_active(identifier) else {
            return (false, Vec::new());
        };

        let Some(session) = self.registry.get_mut(session_id) else {
            return (false, Vec::new());
        };

        let promoted = session.role < new_role;
        session.role = new_role;
        let name = session.name.clone();

        let mut actions = vec![
            ServerAction::Send { session_id, message: Message::Promoted { role: new_role } },
            ServerAction::Notify(ServerNotification::SessionPromoted {
                name: name.clone(),
                role: new_role,
                promoted,
            }),
            ServerAction::Log {
                level: LogLevel::Info,
                message: format!(
                    "{name} {} to {new_role}",
                    if promoted { "promoted" } else { "demoted" }
                ),
            },
        ];
        actions.extend(self.broadcast(
            &Message::PeerPromotionChanged { role: new_role, name, promoted },
            Some(session_id),
        ));

        (true, actions)
    }

    /// Send operator text to every active session.
    pub fn broadcast_text(&mut self, body: &str) -> Vec<ServerAction> {
        self.broadcast(&Message::ServerNotice { body: body.to_string() }, None)
    }

    /// Change the admission password. An empty string disables the gate,
    /// same as `None`.
    pub fn set_password(&mut self, password: Option<String>) -> Vec<ServerAction> {
        self.config.password = password.filter(|p| !p.is_empty());

        vec![ServerAction::Log {
            level: LogLevel::Info,
            message: if self.config.password.is_some() {
                "password changed".to_string()
            } else {
                "password removed".to_string()
            },
        }]
    }

    /// Change the active-session limit. `None` means unbounded. Existing
    /// sessions are never evicted by a lower limit; it applies to future
    /// admissions.
    pub fn set_max_clients(&mut self, max_clients: Option<u32>) -> Vec<ServerAction> {
        self.config.max_clients = max_clients;

        vec![ServerAction::Log {
            level: LogLevel::Info,
            message: match max_clients {
                Some(max) => format!("max clients set to {max}"),
                None => "max clients set to unbounded".to_string(),
            },
        }]
    }

    /// Block an address. Returns `false` if it was already blocked.
    pub fn block(&mut self, addr: &str) -> bool {
        self.registry.block(addr)
    }

    /// Unblock an address. Returns `false` if it was not blocked.
    pub fn unblock(&mut self, addr: &str) -> bool {
        self.registry.unblock(addr)
    }

    /// Summary rows for the operator listing, join order.
    #[must_use]
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        self.registry.summaries()
    }

    /// Announce shutdown to every active session.
    ///
    /// The runtime stops its accept loop after executing these actions;
    /// this method only produces the farewell broadcast.
    pub fn shutdown(&mut self) -> Vec<ServerAction> {
        let mut actions = vec![
            ServerAction::Notify(ServerNotification::ShuttingDown),
            ServerAction::Log { level: LogLevel::Info, message: "shutting down".to_string() },
        ];
        actions.extend(self.broadcast(&Message::ServerShutdown, None));
        actions
    }
}
