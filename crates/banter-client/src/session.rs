//! Client session state machine.
//!
//! Uses the action pattern: methods take events and return actions for
//! the driver to execute. This keeps the state machine pure (no I/O) and
//! makes testing straightforward.
//!
//! # State Machine
//!
//! ```text
//! ┌──────────────┐ connect ┌─────────────┐  Connected   ┌────────┐
//! │ Disconnected │────────>│ Handshaking │─────────────>│ Active │
//! └──────────────┘         └─────────────┘              └────────┘
//!                              │      │ PasswordRequired    │
//!                              │      ↓                     │
//!                              │  ┌───────────────────┐     │
//!                              │  │ PasswordChallenge │─────┤ Connected
//!                              │  └───────────────────┘     │
//!                              │      │ abort               │ Kicked / Shutdown /
//!                              ↓      ↓                     ↓ disconnect / quit
//!                          ┌────────────────────────────────────┐
//!                          │               Closed               │
//!                          └────────────────────────────────────┘
//! ```
//!
//! `ServerFull`, a `Kicked` during the handshake (blocked address), and
//! any protocol violation also land in `Closed`, each with a distinct
//! [`SessionFailure`].

use banter_proto::{Identity, Message, Role};
use bytes::Bytes;

use crate::{
    error::ClientError,
    event::{ClientAction, ClientEvent, ClientNotice, SessionFailure},
};

/// Client session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport yet.
    Disconnected,
    /// Transport up, waiting for the server's first message.
    Handshaking,
    /// The server demanded a password; retries are unbounded and only the
    /// caller's abort sentinel ends them.
    PasswordChallenge,
    /// Handshake complete; participating in broadcasts.
    Active,
    /// Terminal. No further sends are attempted.
    Closed,
}

/// Client session state machine.
///
/// Pure logic: feed [`ClientEvent`]s through [`ClientSession::handle`]
/// and execute the returned [`ClientAction`]s. Protocol violations by
/// the server are absorbed into terminal actions, not returned as
/// errors; `Err` means the *caller* used the machine wrong.
#[derive(Debug, Clone)]
pub struct ClientSession {
    /// Current state.
    state: SessionState,
    /// Display name sent in the identity payload.
    name: String,
    /// Current role; starts as `Member`, updated by `Promoted`.
    role: Role,
}

impl ClientSession {
    /// Create a new session in [`SessionState::Disconnected`].
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { state: SessionState::Disconnected, name: name.into(), role: Role::Member }
    }

    /// Current session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Display name for this session.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current role as granted by the server.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// - `ClientError::InvalidState` if the event is not meaningful in
    ///   the current state (e.g. `SubmitText` before `Active`)
    pub fn handle(&mut self, event: ClientEvent) -> Result<Vec<ClientAction>, ClientError> {
        match event {
            ClientEvent::TransportConnected => self.handle_transport_connected(),
            ClientEvent::FrameReceived(bytes) => Ok(self.handle_frame(&bytes)),
            ClientEvent::SubmitText(body) => self.handle_submit_text(body),
            ClientEvent::SubmitPassword(password) => self.handle_submit_password(password),
            ClientEvent::TransportClosed => Ok(self.handle_transport_closed()),
            ClientEvent::Quit => Ok(self.handle_quit()),
        }
    }

    fn handle_transport_connected(&mut self) -> Result<Vec<ClientAction>, ClientError> {
        if self.state != SessionState::Disconnected {
            return Err(ClientError::InvalidState {
                state: self.state,
                operation: "begin handshake",
            });
        }

        // The server speaks first; nothing to send yet.
        self.state = SessionState::Handshaking;
        Ok(vec![])
    }

    fn handle_submit_text(&mut self, body: String) -> Result<Vec<ClientAction>, ClientError> {
        if self.state != SessionState::Active {
            return Err(ClientError::InvalidState { state: self.state, operation: "send text" });
        }

        Ok(vec![ClientAction::Send(Message::Text {
            role: self.role,
            name: self.name.clone(),
            body,
        })])
    }

    fn handle_submit_password(
        &mut self,
        password: Option<String>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        if self.state != SessionState::PasswordChallenge {
            return Err(ClientError::InvalidState {
                state: self.state,
                operation: "answer password challenge",
            });
        }

        match password {
            Some(password) => Ok(vec![ClientAction::Send(Message::PasswordAttempt { password })]),
            None => {
                self.state = SessionState::Closed;
                Ok(vec![ClientAction::Close {
                    reason: "password challenge aborted".to_string(),
                }])
            },
        }
    }

    fn handle_transport_closed(&mut self) -> Vec<ClientAction> {
        match self.state {
            SessionState::Active => {
                self.state = SessionState::Closed;
                vec![ClientAction::Notify(ClientNotice::Disconnected), ClientAction::Close {
                    reason: "server closed connection".to_string(),
                }]
            },
            SessionState::Handshaking | SessionState::PasswordChallenge => {
                // Lost before ever becoming active: indistinguishable from
                // never having reached the server.
                self.state = SessionState::Closed;
                vec![
                    ClientAction::Notify(ClientNotice::SessionFailed {
                        failure: SessionFailure::UnableToConnect,
                    }),
                    ClientAction::Close { reason: "connection lost during handshake".to_string() },
                ]
            },
            SessionState::Disconnected | SessionState::Closed => vec![],
        }
    }

    fn handle_quit(&mut self) -> Vec<ClientAction> {
        if self.state == SessionState::Closed {
            return vec![];
        }

        self.state = SessionState::Closed;
        vec![ClientAction::Close { reason: "quit".to_string() }]
    }

    fn handle_frame(&mut self, bytes: &Bytes) -> Vec<ClientAction> {
        // Frames racing the close are dropped without inspection
        if matches!(self.state, SessionState::Disconnected | SessionState::Closed) {
            return vec![];
        }

        let message = match Message::decode(bytes) {
            Ok(message) => message,
            Err(err) => {
                return self.protocol_violation(format!("undecodable frame: {err}"));
            },
        };

        match self.state {
            SessionState::Handshaking => self.handle_handshake_reply(message),
            SessionState::PasswordChallenge => self.handle_challenge_reply(message),
            SessionState::Active => self.handle_active_message(message),
            SessionState::Disconnected | SessionState::Closed => vec![],
        }
    }

    /// The single message the server sends to resolve a fresh connection.
    fn handle_handshake_reply(&mut self, message: Message) -> Vec<ClientAction> {
        match message {
            Message::Connected => self.activate(),
            Message::ServerFull => self.fail(SessionFailure::ServerIsFull, "server is full"),
            Message::PasswordRequired => {
                self.state = SessionState::PasswordChallenge;
                vec![ClientAction::Notify(ClientNotice::PasswordRequired { retry: false })]
            },
            Message::Kicked => self.fail(SessionFailure::Blocked, "address is blocked"),
            other => {
                self.protocol_violation(format!("unexpected {:?} during handshake", other.kind()))
            },
        }
    }

    /// A reply while the password challenge is open. Anything that is not
    /// an admission or a rejection counts as a mismatch: the caller may
    /// retry indefinitely.
    fn handle_challenge_reply(&mut self, message: Message) -> Vec<ClientAction> {
        match message {
            Message::Connected => self.activate(),
            Message::ServerFull => self.fail(SessionFailure::ServerIsFull, "server is full"),
            _ => vec![ClientAction::Notify(ClientNotice::PasswordRequired { retry: true })],
        }
    }

    fn handle_active_message(&mut self, message: Message) -> Vec<ClientAction> {
        match message {
            Message::Text { role, name, body } => {
                vec![ClientAction::Notify(ClientNotice::Text { role, name, body })]
            },
            Message::ServerNotice { body } => {
                vec![ClientAction::Notify(ClientNotice::ServerNotice { body })]
            },
            Message::Kicked => {
                self.state = SessionState::Closed;
                vec![ClientAction::Notify(ClientNotice::Kicked), ClientAction::Close {
                    reason: "kicked by server".to_string(),
                }]
            },
            Message::PeerJoined { name, .. } => {
                vec![ClientAction::Notify(ClientNotice::PeerJoined { name })]
            },
            Message::PeerLeft { name, reason } => {
                vec![ClientAction::Notify(ClientNotice::PeerLeft { name, reason })]
            },
            Message::Promoted { role } => {
                // Strictly greater is a promotion; everything else
                // (including re-granting the current role) is reported as
                // a demotion, matching the server's own comparison.
                let promoted = self.role < role;
                self.role = role;
                vec![ClientAction::Notify(ClientNotice::Promoted { role, promoted })]
            },
            Message::PeerPromotionChanged { role, name, promoted } => {
                vec![ClientAction::Notify(ClientNotice::PeerPromotionChanged {
                    role,
                    name,
                    promoted,
                })]
            },
            Message::ServerShutdown => {
                self.state = SessionState::Closed;
                vec![ClientAction::Notify(ClientNotice::ServerShutdown), ClientAction::Close {
                    reason: "server shutdown".to_string(),
                }]
            },
            other @ (Message::Connected
            | Message::ServerFull
            | Message::PasswordRequired
            | Message::PasswordAttempt { .. }) => {
                self.protocol_violation(format!("unexpected {:?} while active", other.kind()))
            },
        }
    }

    /// Admission granted: send identity, enter `Active`.
    fn activate(&mut self) -> Vec<ClientAction> {
        self.state = SessionState::Active;

        vec![
            ClientAction::SendIdentity(Identity { name: self.name.clone(), role: self.role }),
            ClientAction::Notify(ClientNotice::Connected),
        ]
    }

    /// Terminal rejection before the session became active.
    fn fail(&mut self, failure: SessionFailure, reason: &str) -> Vec<ClientAction> {
        self.state = SessionState::Closed;

        vec![ClientAction::Notify(ClientNotice::SessionFailed { failure }), ClientAction::Close {
            reason: reason.to_string(),
        }]
    }

    /// A malformed or out-of-place frame is always fatal to the session.
    fn protocol_violation(&mut self, reason: String) -> Vec<ClientAction> {
        self.state = SessionState::Closed;

        vec![
            ClientAction::Notify(ClientNotice::SessionFailed {
                failure: SessionFailure::ProtocolViolation,
            }),
            ClientAction::Close { reason },
        ]
    }
}

#[cfg(test)]
mod tests {
    use banter_proto::PresenceReason;

    use super::*;

    fn frame(message: &Message) -> ClientEvent {
        ClientEvent::FrameReceived(message.to_bytes().unwrap())
    }

    fn handshaking(name: &str) -> ClientSession {
        let mut session = ClientSession::new(name);
        session.handle(ClientEvent::TransportConnected).unwrap();
        assert_eq!(session.state(), SessionState::Handshaking);
        session
    }

    fn active(name: &str) -> ClientSession {
        let mut session = handshaking(name);
        session.handle(frame(&Message::Connected)).unwrap();
        assert_eq!(session.state(), SessionState::Active);
        session
    }

    #[test]
    fn plain_handshake_sends_identity_and_activates() {
        let mut session = handshaking("alice");

        let actions = session.handle(frame(&Message::Connected)).unwrap();

        assert_eq!(actions, vec![
            ClientAction::SendIdentity(Identity { name: "alice".to_string(), role: Role::Member }),
            ClientAction::Notify(ClientNotice::Connected),
        ]);
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn server_full_is_terminal() {
        let mut session = handshaking("alice");

        let actions = session.handle(frame(&Message::ServerFull)).unwrap();

        assert!(actions.contains(&ClientAction::Notify(ClientNotice::SessionFailed {
            failure: SessionFailure::ServerIsFull,
        })));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn kicked_during_handshake_means_blocked() {
        let mut session = handshaking("alice");

        let actions = session.handle(frame(&Message::Kicked)).unwrap();

        assert!(actions.contains(&ClientAction::Notify(ClientNotice::SessionFailed {
            failure: SessionFailure::Blocked,
        })));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn unexpected_handshake_reply_is_a_protocol_violation() {
        let mut session = handshaking("alice");

        let actions = session
            .handle(frame(&Message::ServerNotice { body: "hi".to_string() }))
            .unwrap();

        assert!(actions.contains(&ClientAction::Notify(ClientNotice::SessionFailed {
            failure: SessionFailure::ProtocolViolation,
        })));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn undecodable_frame_is_a_protocol_violation() {
        let mut session = handshaking("alice");

        let actions = session
            .handle(ClientEvent::FrameReceived(Bytes::from_static(&[0xFF, 0xFF])))
            .unwrap();

        assert!(actions.contains(&ClientAction::Notify(ClientNotice::SessionFailed {
            failure: SessionFailure::ProtocolViolation,
        })));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn password_challenge_retry_loop() {
        let mut session = handshaking("alice");

        // Server demands a password
        let actions = session.handle(frame(&Message::PasswordRequired)).unwrap();
        assert_eq!(
            actions,
            vec![ClientAction::Notify(ClientNotice::PasswordRequired { retry: false })]
        );
        assert_eq!(session.state(), SessionState::PasswordChallenge);

        // Wrong guess goes out as a PasswordAttempt
        let actions =
            session.handle(ClientEvent::SubmitPassword(Some("nope".to_string()))).unwrap();
        assert_eq!(actions, vec![ClientAction::Send(Message::PasswordAttempt {
            password: "nope".to_string(),
        })]);

        // Server re-prompts; still in the challenge, caller may retry
        let actions = session.handle(frame(&Message::PasswordRequired)).unwrap();
        assert_eq!(
            actions,
            vec![ClientAction::Notify(ClientNotice::PasswordRequired { retry: true })]
        );
        assert_eq!(session.state(), SessionState::PasswordChallenge);

        // Correct guess is admitted
        session.handle(ClientEvent::SubmitPassword(Some("pw".to_string()))).unwrap();
        let actions = session.handle(frame(&Message::Connected)).unwrap();
        assert!(actions.contains(&ClientAction::Notify(ClientNotice::Connected)));
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn password_challenge_abort_closes() {
        let mut session = handshaking("alice");
        session.handle(frame(&Message::PasswordRequired)).unwrap();

        let actions = session.handle(ClientEvent::SubmitPassword(None)).unwrap();

        assert!(matches!(actions.as_slice(), [ClientAction::Close { .. }]));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn server_full_during_challenge_is_terminal() {
        let mut session = handshaking("alice");
        session.handle(frame(&Message::PasswordRequired)).unwrap();

        let actions = session.handle(frame(&Message::ServerFull)).unwrap();

        assert!(actions.contains(&ClientAction::Notify(ClientNotice::SessionFailed {
            failure: SessionFailure::ServerIsFull,
        })));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn submit_text_while_active_sends_own_identity() {
        let mut session = active("alice");

        let actions = session.handle(ClientEvent::SubmitText("hi all".to_string())).unwrap();

        assert_eq!(actions, vec![ClientAction::Send(Message::Text {
            role: Role::Member,
            name: "alice".to_string(),
            body: "hi all".to_string(),
        })]);
    }

    #[test]
    fn submit_text_before_active_is_invalid() {
        let mut session = handshaking("alice");

        let result = session.handle(ClientEvent::SubmitText("too early".to_string()));

        assert!(matches!(result, Err(ClientError::InvalidState { .. })));
    }

    #[test]
    fn inbound_text_is_dispatched() {
        let mut session = active("bob");

        let actions = session
            .handle(frame(&Message::Text {
                role: Role::Member,
                name: "alice".to_string(),
                body: "hi".to_string(),
            }))
            .unwrap();

        assert_eq!(actions, vec![ClientAction::Notify(ClientNotice::Text {
            role: Role::Member,
            name: "alice".to_string(),
            body: "hi".to_string(),
        })]);
    }

    #[test]
    fn promotion_compares_roles_and_updates() {
        let mut session = active("alice");
        assert_eq!(session.role(), Role::Member);

        // Member -> Administrator is a promotion
        let actions =
            session.handle(frame(&Message::Promoted { role: Role::Administrator })).unwrap();
        assert_eq!(actions, vec![ClientAction::Notify(ClientNotice::Promoted {
            role: Role::Administrator,
            promoted: true,
        })]);
        assert_eq!(session.role(), Role::Administrator);

        // Administrator -> Member is a demotion
        let actions = session.handle(frame(&Message::Promoted { role: Role::Member })).unwrap();
        assert_eq!(actions, vec![ClientAction::Notify(ClientNotice::Promoted {
            role: Role::Member,
            promoted: false,
        })]);
        assert_eq!(session.role(), Role::Member);

        // Re-granting the current role is not a promotion
        let actions = session.handle(frame(&Message::Promoted { role: Role::Member })).unwrap();
        assert_eq!(actions, vec![ClientAction::Notify(ClientNotice::Promoted {
            role: Role::Member,
            promoted: false,
        })]);
    }

    #[test]
    fn text_after_promotion_carries_new_role() {
        let mut session = active("alice");
        session.handle(frame(&Message::Promoted { role: Role::Administrator })).unwrap();

        let actions = session.handle(ClientEvent::SubmitText("now admin".to_string())).unwrap();

        assert_eq!(actions, vec![ClientAction::Send(Message::Text {
            role: Role::Administrator,
            name: "alice".to_string(),
            body: "now admin".to_string(),
        })]);
    }

    #[test]
    fn kicked_while_active_closes_with_kick_notice() {
        let mut session = active("alice");

        let actions = session.handle(frame(&Message::Kicked)).unwrap();

        assert_eq!(actions[0], ClientAction::Notify(ClientNotice::Kicked));
        assert!(matches!(actions[1], ClientAction::Close { .. }));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn disconnect_while_active_is_distinct_from_kick() {
        let mut session = active("alice");

        let actions = session.handle(ClientEvent::TransportClosed).unwrap();

        assert_eq!(actions[0], ClientAction::Notify(ClientNotice::Disconnected));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn server_shutdown_closes() {
        let mut session = active("alice");

        let actions = session.handle(frame(&Message::ServerShutdown)).unwrap();

        assert_eq!(actions[0], ClientAction::Notify(ClientNotice::ServerShutdown));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn peer_presence_notices_are_dispatched() {
        let mut session = active("alice");

        let actions = session
            .handle(frame(&Message::PeerJoined {
                name: "bob".to_string(),
                reason: PresenceReason::Joined,
            }))
            .unwrap();
        assert_eq!(
            actions,
            vec![ClientAction::Notify(ClientNotice::PeerJoined { name: "bob".to_string() })]
        );

        let actions = session
            .handle(frame(&Message::PeerLeft {
                name: "bob".to_string(),
                reason: PresenceReason::Kicked,
            }))
            .unwrap();
        assert_eq!(actions, vec![ClientAction::Notify(ClientNotice::PeerLeft {
            name: "bob".to_string(),
            reason: PresenceReason::Kicked,
        })]);
    }

    #[test]
    fn handshake_reply_while_active_is_a_violation() {
        let mut session = active("alice");

        let actions = session.handle(frame(&Message::Connected)).unwrap();

        assert!(actions.contains(&ClientAction::Notify(ClientNotice::SessionFailed {
            failure: SessionFailure::ProtocolViolation,
        })));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn frames_after_close_are_ignored() {
        let mut session = active("alice");
        session.handle(frame(&Message::Kicked)).unwrap();

        let actions = session
            .handle(frame(&Message::ServerNotice { body: "late".to_string() }))
            .unwrap();

        assert!(actions.is_empty());
    }

    #[test]
    fn quit_closes_once() {
        let mut session = active("alice");

        let actions = session.handle(ClientEvent::Quit).unwrap();
        assert!(matches!(actions.as_slice(), [ClientAction::Close { .. }]));

        let actions = session.handle(ClientEvent::Quit).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn transport_loss_mid_handshake_reports_unable_to_connect() {
        let mut session = handshaking("alice");

        let actions = session.handle(ClientEvent::TransportClosed).unwrap();

        assert!(actions.contains(&ClientAction::Notify(ClientNotice::SessionFailed {
            failure: SessionFailure::UnableToConnect,
        })));
        assert_eq!(session.state(), SessionState::Closed);
    }
}
