//! Session registry: live sessions, blocked addresses, deferred removal.
//!
//! The registry is a pure collection - no sockets, no locks. Sessions
//! are kept in join order (insertion order), which is also the order
//! broadcasts iterate and listings print. Removal is deferred: an entry
//! is first marked [`SessionState::Doomed`] (leaving it invisible to
//! every active-session path) and physically erased only by an explicit
//! [`SessionRegistry::drain_doomed`] once no dispatch is mid-iteration.

use std::collections::HashSet;

use banter_proto::Role;

/// Lifecycle state of a server-side session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// The password gate was sent; a `PasswordAttempt` is expected.
    AwaitingPassword,
    /// `Connected` was sent; the identity payload is expected.
    AwaitingIdentity,
    /// Handshake complete; the session participates in broadcasts.
    Active,
    /// Marked for removal; invisible to broadcasts and lookups, erased
    /// on the next drain.
    Doomed,
}

/// Server-side record of one connection.
///
/// Owned exclusively by the registry for its lifetime: created on
/// admission, erased only after deferred removal completes.
#[derive(Debug, Clone)]
pub struct Session {
    /// Runtime-assigned connection identifier.
    pub id: u64,
    /// Remote address (IP, as the block list keys it).
    pub addr: String,
    /// Display name; empty until the identity payload arrives.
    pub name: String,
    /// Current role. Starts as `Member`; only the promote operation
    /// changes it.
    pub role: Role,
    /// Lifecycle state.
    pub state: SessionState,
}

impl Session {
    fn new(id: u64, addr: String, state: SessionState) -> Self {
        Self { id, addr, name: String::new(), role: Role::Member, state }
    }

    /// Whether this session participates in broadcasts.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Name for human-facing output; falls back to the address while the
    /// handshake has not yet produced a name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.addr } else { &self.name }
    }
}

/// Summary row for operator listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Remote address.
    pub addr: String,
    /// Display name (may be empty mid-handshake).
    pub name: String,
    /// Current role.
    pub role: Role,
    /// Whether the session completed its handshake.
    pub active: bool,
}

/// Registry of live sessions and blocked addresses.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    /// Live sessions in join order. Doomed entries stay here until
    /// drained.
    sessions: Vec<Session>,
    /// Blocked remote addresses (set membership only).
    blocked: HashSet<String>,
}

impl SessionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new session. Returns `false` if the id is already taken.
    pub fn insert(&mut self, id: u64, addr: String, state: SessionState) -> bool {
        if self.sessions.iter().any(|s| s.id == id) {
            return false;
        }

        self.sessions.push(Session::new(id, addr, state));
        true
    }

    /// Session by id, doomed entries included. `None` if unknown.
    #[must_use]
    pub fn get(&self, id: u64) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// Mutable session by id, doomed entries included.
    pub fn get_mut(&mut self, id: u64) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    /// Number of active sessions (the capacity gate's count).
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_active()).count()
    }

    /// Total number of live entries, handshaking and doomed included.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Ids of active sessions in join order, minus an optional exclusion.
    ///
    /// This is the broadcast set: a sender is excluded by identity, never
    /// by timing, and a doomed session is never part of it.
    #[must_use]
    pub fn active_ids_except(&self, exclude: Option<u64>) -> Vec<u64> {
        self.sessions
            .iter()
            .filter(|s| s.is_active() && Some(s.id) != exclude)
            .map(|s| s.id)
            .collect()
    }

    /// Find an active session by identifier: remote address first, then
    /// display name. Only active sessions match.
    #[must_use]
    pub fn find_active(&self, identifier: &str) -> Option<u64> {
        self.sessions
            .iter()
            .find(|s| s.is_active() && s.addr == identifier)
            .or_else(|| self.sessions.iter().find(|s| s.is_active() && s.name == identifier))
            .map(|s| s.id)
    }

    /// Mark a session for removal. Returns `false` if unknown.
    ///
    /// The entry stays in the collection (so in-flight iteration stays
    /// valid) but stops matching every active-session path.
    pub fn doom(&mut self, id: u64) -> bool {
        match self.get_mut(id) {
            Some(session) => {
                session.state = SessionState::Doomed;
                true
            },
            None => false,
        }
    }

    /// Erase and return all doomed sessions.
    pub fn drain_doomed(&mut self) -> Vec<Session> {
        let mut removed = Vec::new();
        self.sessions.retain(|s| {
            if s.state == SessionState::Doomed {
                removed.push(s.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Whether an address is blocked.
    #[must_use]
    pub fn is_blocked(&self, addr: &str) -> bool {
        self.blocked.contains(addr)
    }

    /// Block an address. Returns `false` if it was already blocked.
    pub fn block(&mut self, addr: &str) -> bool {
        self.blocked.insert(addr.to_string())
    }

    /// Unblock an address. Returns `false` if it was not blocked.
    pub fn unblock(&mut self, addr: &str) -> bool {
        self.blocked.remove(addr)
    }

    /// Summary rows for all live sessions, join order.
    #[must_use]
    pub fn summaries(&self) -> Vec<SessionSummary> {
        self.sessions
            .iter()
            .filter(|s| s.state != SessionState::Doomed)
            .map(|s| SessionSummary {
                addr: s.addr.clone(),
                name: s.name.clone(),
                role: s.role,
                active: s.is_active(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let mut registry = SessionRegistry::new();

        assert!(registry.insert(1, "10.0.0.1".to_string(), SessionState::AwaitingIdentity));
        assert!(registry.get(1).is_some());
        assert!(registry.get(2).is_none());
        assert_eq!(registry.active_count(), 0);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let mut registry = SessionRegistry::new();

        assert!(registry.insert(1, "10.0.0.1".to_string(), SessionState::AwaitingIdentity));
        assert!(!registry.insert(1, "10.0.0.2".to_string(), SessionState::AwaitingIdentity));
    }

    #[test]
    fn broadcast_set_is_join_ordered_and_excludes() {
        let mut registry = SessionRegistry::new();

        for id in [3, 1, 2] {
            registry.insert(id, format!("10.0.0.{id}"), SessionState::Active);
        }

        assert_eq!(registry.active_ids_except(None), vec![3, 1, 2]);
        assert_eq!(registry.active_ids_except(Some(1)), vec![3, 2]);
    }

    #[test]
    fn doomed_sessions_leave_every_active_path() {
        let mut registry = SessionRegistry::new();

        registry.insert(1, "10.0.0.1".to_string(), SessionState::Active);
        registry.get_mut(1).unwrap().name = "alice".to_string();
        registry.insert(2, "10.0.0.2".to_string(), SessionState::Active);

        assert!(registry.doom(1));

        assert_eq!(registry.active_count(), 1);
        assert_eq!(registry.active_ids_except(None), vec![2]);
        assert_eq!(registry.find_active("alice"), None);
        assert_eq!(registry.find_active("10.0.0.1"), None);

        // Still present until drained
        assert_eq!(registry.session_count(), 2);

        let removed = registry.drain_doomed();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, 1);
        assert_eq!(registry.session_count(), 1);
    }

    #[test]
    fn doom_unknown_session_is_false() {
        let mut registry = SessionRegistry::new();
        assert!(!registry.doom(42));
    }

    #[test]
    fn identifier_matches_address_before_name() {
        let mut registry = SessionRegistry::new();

        registry.insert(1, "10.0.0.1".to_string(), SessionState::Active);
        registry.get_mut(1).unwrap().name = "10.0.0.2".to_string();
        registry.insert(2, "10.0.0.2".to_string(), SessionState::Active);

        // "10.0.0.2" is session 1's *name* but session 2's *address*;
        // the address pass wins
        assert_eq!(registry.find_active("10.0.0.2"), Some(2));
    }

    #[test]
    fn identifier_ignores_handshaking_sessions() {
        let mut registry = SessionRegistry::new();

        registry.insert(1, "10.0.0.1".to_string(), SessionState::AwaitingIdentity);

        assert_eq!(registry.find_active("10.0.0.1"), None);
    }

    #[test]
    fn block_list_round_trip() {
        let mut registry = SessionRegistry::new();

        assert!(!registry.is_blocked("10.0.0.9"));
        assert!(registry.block("10.0.0.9"));
        assert!(!registry.block("10.0.0.9"));
        assert!(registry.is_blocked("10.0.0.9"));
        assert!(registry.unblock("10.0.0.9"));
        assert!(!registry.unblock("10.0.0.9"));
        assert!(!registry.is_blocked("10.0.0.9"));
    }

    #[test]
    fn summaries_hide_doomed_entries() {
        let mut registry = SessionRegistry::new();

        registry.insert(1, "10.0.0.1".to_string(), SessionState::Active);
        registry.insert(2, "10.0.0.2".to_string(), SessionState::AwaitingPassword);
        registry.insert(3, "10.0.0.3".to_string(), SessionState::Active);
        registry.doom(3);

        let rows = registry.summaries();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].active);
        assert!(!rows[1].active);
    }

    #[test]
    fn display_name_falls_back_to_address() {
        let mut registry = SessionRegistry::new();
        registry.insert(1, "10.0.0.1".to_string(), SessionState::AwaitingIdentity);

        assert_eq!(registry.get(1).unwrap().display_name(), "10.0.0.1");

        registry.get_mut(1).unwrap().name = "alice".to_string();
        assert_eq!(registry.get(1).unwrap().display_name(), "alice");
    }
}
