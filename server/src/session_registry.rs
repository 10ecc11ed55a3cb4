//! Live session table for the relay server
//!
//! This module owns every connected player's record, including:
//! - Session lifecycle (join, replace, disconnect, staleness eviction)
//! - Public projection of sessions for `init` snapshots
//! - Outbound queue handles used by the fanout router
//!
//! The registry itself is a plain data structure. The server wraps it in an
//! `Arc<RwLock<SessionRegistry>>` so that all mutations are serialized and
//! readers always see a complete map.

use shared::{PlayerDelta, PlayerState, PlayerView};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// Identifier the server assigns to each accepted connection
pub type ConnectionId = u64;

/// Outbound queue feeding one connection's writer task
pub type OutboundSender = mpsc::Sender<Message>;

/// Server-side record of one joined player
///
/// Each session keeps:
/// - Identity supplied at join (ID and display name)
/// - The latest reported state (position, orientation, vitals)
/// - Bookkeeping that is never shared with peers (owner connection,
///   last activity, outbound queue)
#[derive(Debug)]
pub struct Session {
    /// Client-chosen identifier, unique among live sessions
    pub id: String,
    /// Display name, fixed at join
    pub name: String,
    /// Latest position, orientation and vitals
    pub state: PlayerState,
    /// Connection that joined with this ID
    pub conn_id: ConnectionId,
    /// Last time a join or update was received for this session
    pub last_activity: Instant,
    /// Exclusive handle to this session's outbound queue
    pub sender: OutboundSender,
}

impl Session {
    /// Creates a session marked as active right now
    pub fn new(
        id: String,
        name: String,
        state: PlayerState,
        conn_id: ConnectionId,
        sender: OutboundSender,
    ) -> Self {
        Self {
            id,
            name,
            state,
            conn_id,
            last_activity: Instant::now(),
            sender,
        }
    }

    /// Replaces the mutable state and refreshes the activity timestamp
    pub fn apply_update(&mut self, state: PlayerState) {
        self.state = state;
        self.last_activity = Instant::now();
    }

    /// Checks whether the session has been silent for longer than `threshold`
    ///
    /// A `now` earlier than the last activity counts as fresh.
    pub fn is_stale(&self, now: Instant, threshold: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) > threshold
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id.clone(),
            name: self.name.clone(),
            state: self.state.clone(),
        }
    }

    pub fn delta(&self) -> PlayerDelta {
        PlayerDelta {
            id: self.id.clone(),
            state: self.state.clone(),
        }
    }
}

/// A session removed by the liveness sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictedSession {
    pub id: String,
    pub name: String,
}

/// Table of live sessions indexed by player ID
pub struct SessionRegistry {
    sessions: HashMap<String, Session>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    /// Inserts a session, replacing any live session with the same ID
    ///
    /// Returns the superseded record so the caller can close its channel.
    pub fn put(&mut self, session: Session) -> Option<Session> {
        self.sessions.insert(session.id.clone(), session)
    }

    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Removes a session by ID. Absent IDs are a no-op.
    pub fn remove(&mut self, id: &str) -> Option<Session> {
        self.sessions.remove(id)
    }

    /// Removes a session only if `conn_id` still owns it
    ///
    /// A connection whose ID was taken over by a later join must not be
    /// able to remove its successor when it finally closes.
    pub fn remove_owned(&mut self, id: &str, conn_id: ConnectionId) -> Option<Session> {
        match self.sessions.get(id) {
            Some(session) if session.conn_id == conn_id => self.sessions.remove(id),
            _ => None,
        }
    }

    /// Applies an update from `conn_id` to the session it owns
    ///
    /// Returns the updated session, or None when the ID is unknown or owned
    /// by another connection.
    pub fn apply_update(
        &mut self,
        id: &str,
        conn_id: ConnectionId,
        state: PlayerState,
    ) -> Option<&Session> {
        let session = self.sessions.get_mut(id)?;
        if session.conn_id != conn_id {
            return None;
        }
        session.apply_update(state);
        Some(&*session)
    }

    /// Public views of every session except `id`, in no particular order
    pub fn snapshot_all_except(&self, id: &str) -> Vec<PlayerView> {
        self.sessions
            .values()
            .filter(|session| session.id != id)
            .map(Session::view)
            .collect()
    }

    /// Removes every session silent for longer than `threshold`
    ///
    /// The scan and the removals happen under the same `&mut self` borrow,
    /// so a session updated before the sweep starts is never evicted and no
    /// session is evicted twice.
    pub fn evict_stale(&mut self, now: Instant, threshold: Duration) -> Vec<EvictedSession> {
        let stale: Vec<String> = self
            .sessions
            .values()
            .filter(|session| session.is_stale(now, threshold))
            .map(|session| session.id.clone())
            .collect();

        stale
            .iter()
            .filter_map(|id| self.sessions.remove(id))
            .map(|session| EvictedSession {
                id: session.id,
                name: session.name,
            })
            .collect()
    }

    /// Outbound queues of every session except `exclude`
    pub fn senders_except<'a>(
        &'a self,
        exclude: Option<&'a str>,
    ) -> impl Iterator<Item = (&'a str, &'a OutboundSender)> + 'a {
        self.sessions
            .values()
            .filter(move |session| Some(session.id.as_str()) != exclude)
            .map(|session| (session.id.as_str(), &session.sender))
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::WeaponId;

    fn test_session(
        id: &str,
        name: &str,
        conn_id: ConnectionId,
    ) -> (Session, mpsc::Receiver<Message>) {
        let (sender, receiver) = mpsc::channel(8);
        let session = Session::new(
            id.to_string(),
            name.to_string(),
            PlayerState::default(),
            conn_id,
            sender,
        );
        (session, receiver)
    }

    fn moved_state() -> PlayerState {
        PlayerState {
            x: 5.0,
            y: 1.7,
            z: 2.0,
            yaw: 1.0,
            pitch: 0.0,
            hp: 80.0,
            score: 10.0,
            weapon: WeaponId::slot(1),
        }
    }

    #[test]
    fn test_session_creation() {
        let (session, _rx) = test_session("p1", "Alice", 1);

        assert_eq!(session.id, "p1");
        assert_eq!(session.name, "Alice");
        assert_eq!(session.conn_id, 1);
        assert_eq!(session.state, PlayerState::default());
        assert!(!session.is_stale(Instant::now(), Duration::from_secs(1)));
    }

    #[test]
    fn test_session_staleness() {
        let (mut session, _rx) = test_session("p1", "Alice", 1);

        session.last_activity = Instant::now() - Duration::from_secs(2);
        assert!(session.is_stale(Instant::now(), Duration::from_secs(1)));

        session.apply_update(moved_state());
        assert!(!session.is_stale(Instant::now(), Duration::from_secs(1)));
        assert_eq!(session.state, moved_state());
    }

    #[test]
    fn test_staleness_boundary_is_exclusive() {
        let (session, _rx) = test_session("p1", "Alice", 1);
        let threshold = Duration::from_secs(10);

        assert!(!session.is_stale(session.last_activity + threshold, threshold));
        assert!(session.is_stale(
            session.last_activity + threshold + Duration::from_millis(1),
            threshold
        ));
    }

    #[test]
    fn test_registry_creation() {
        let registry = SessionRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_put_and_get() {
        let mut registry = SessionRegistry::new();
        let (session, _rx) = test_session("p1", "Alice", 1);

        assert!(registry.put(session).is_none());
        assert_eq!(registry.len(), 1);

        let stored = registry.get("p1").unwrap();
        assert_eq!(stored.name, "Alice");
        assert!(registry.get("p2").is_none());
    }

    #[test]
    fn test_put_distinct_ids() {
        let mut registry = SessionRegistry::new();
        let mut receivers = Vec::new();

        for i in 0..5 {
            let (session, rx) = test_session(&format!("p{}", i), "Player", i);
            registry.put(session);
            receivers.push(rx);
        }

        assert_eq!(registry.len(), 5);
        for i in 0..5 {
            assert_eq!(registry.get(&format!("p{}", i)).unwrap().conn_id, i);
        }
    }

    #[test]
    fn test_put_replaces_same_id() {
        let mut registry = SessionRegistry::new();
        let (first, _rx1) = test_session("p1", "Alice", 1);
        let (second, _rx2) = test_session("p1", "Alice Again", 2);

        registry.put(first);
        let replaced = registry.put(second).unwrap();

        assert_eq!(replaced.conn_id, 1);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("p1").unwrap().conn_id, 2);
        assert_eq!(registry.get("p1").unwrap().name, "Alice Again");
    }

    #[test]
    fn test_remove() {
        let mut registry = SessionRegistry::new();
        let (session, _rx) = test_session("p1", "Alice", 1);
        registry.put(session);

        assert!(registry.remove("p1").is_some());
        assert!(registry.is_empty());
        assert!(registry.remove("p1").is_none());
    }

    #[test]
    fn test_remove_owned_ignores_other_connection() {
        let mut registry = SessionRegistry::new();
        let (session, _rx) = test_session("p1", "Alice", 2);
        registry.put(session);

        assert!(registry.remove_owned("p1", 1).is_none());
        assert_eq!(registry.len(), 1);

        assert!(registry.remove_owned("p1", 2).is_some());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_apply_update() {
        let mut registry = SessionRegistry::new();
        let (session, _rx) = test_session("p1", "Alice", 1);
        registry.put(session);

        let updated = registry.apply_update("p1", 1, moved_state()).unwrap();
        assert_eq!(updated.state, moved_state());
        assert_eq!(updated.name, "Alice");
    }

    #[test]
    fn test_apply_update_rejected() {
        let mut registry = SessionRegistry::new();
        let (session, _rx) = test_session("p1", "Alice", 1);
        registry.put(session);

        assert!(registry.apply_update("missing", 1, moved_state()).is_none());
        assert!(registry.apply_update("p1", 7, moved_state()).is_none());
        assert_eq!(registry.get("p1").unwrap().state, PlayerState::default());
    }

    #[test]
    fn test_snapshot_excludes_requester() {
        let mut registry = SessionRegistry::new();
        let (alice, _rx1) = test_session("p1", "Alice", 1);
        let (bob, _rx2) = test_session("p2", "Bob", 2);
        let (carol, _rx3) = test_session("p3", "Carol", 3);
        registry.put(alice);
        registry.put(bob);
        registry.put(carol);

        let mut snapshot = registry.snapshot_all_except("p2");
        snapshot.sort_by(|a, b| a.id.cmp(&b.id));

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].id, "p1");
        assert_eq!(snapshot[0].name, "Alice");
        assert_eq!(snapshot[1].id, "p3");
        assert!(snapshot.iter().all(|view| view.id != "p2"));
    }

    #[test]
    fn test_evict_stale() {
        let mut registry = SessionRegistry::new();
        let (mut idle, _rx1) = test_session("idle", "Idle", 1);
        let (active, _rx2) = test_session("active", "Active", 2);
        idle.last_activity = Instant::now() - Duration::from_secs(30);
        registry.put(idle);
        registry.put(active);

        let evicted = registry.evict_stale(Instant::now(), Duration::from_secs(10));

        assert_eq!(
            evicted,
            vec![EvictedSession {
                id: "idle".to_string(),
                name: "Idle".to_string()
            }]
        );
        assert_eq!(registry.len(), 1);
        assert!(registry.get("active").is_some());

        // A second sweep finds nothing left to evict
        assert!(registry
            .evict_stale(Instant::now(), Duration::from_secs(10))
            .is_empty());
    }

    #[test]
    fn test_evict_stale_spares_recent_activity() {
        let mut registry = SessionRegistry::new();
        let (mut session, _rx) = test_session("p1", "Alice", 1);
        session.last_activity = Instant::now() - Duration::from_secs(30);
        registry.put(session);

        registry.apply_update("p1", 1, moved_state());

        assert!(registry
            .evict_stale(Instant::now(), Duration::from_secs(10))
            .is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_senders_except() {
        let mut registry = SessionRegistry::new();
        let (alice, _rx1) = test_session("p1", "Alice", 1);
        let (bob, _rx2) = test_session("p2", "Bob", 2);
        registry.put(alice);
        registry.put(bob);

        let ids: Vec<&str> = registry.senders_except(Some("p1")).map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["p2"]);
        assert_eq!(registry.senders_except(None).count(), 2);
    }
}
