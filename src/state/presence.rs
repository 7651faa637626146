use std::collections::HashSet;

use dashmap::DashMap;
use uuid::Uuid;

use crate::dao::models::{RoomCode, name_key};

/// Identifier handed to every accepted WebSocket.
pub type ConnectionId = Uuid;

/// Room and player a live connection joined as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceBinding {
    pub room: RoomCode,
    pub name: String,
}

/// In-memory map from live connection to the room/player it represents.
///
/// Nothing is cached per room: every query walks the current bindings so a
/// missed update can never leave a stale counter behind.
#[derive(Default)]
pub struct PresenceTracker {
    bindings: DashMap<ConnectionId, PresenceBinding>,
}

impl PresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a connection, returning the binding it replaced if any.
    pub fn bind(
        &self,
        connection: ConnectionId,
        room: RoomCode,
        name: &str,
    ) -> Option<PresenceBinding> {
        self.bindings.insert(
            connection,
            PresenceBinding {
                room,
                name: name.trim().to_string(),
            },
        )
    }

    /// Forget a connection, returning what it was bound to.
    pub fn unbind(&self, connection: ConnectionId) -> Option<PresenceBinding> {
        self.bindings
            .remove(&connection)
            .map(|(_, binding)| binding)
    }

    pub fn binding(&self, connection: ConnectionId) -> Option<PresenceBinding> {
        self.bindings
            .get(&connection)
            .map(|binding| binding.value().clone())
    }

    /// Lowercase keys of every name with at least one live connection in `room`.
    pub fn active_names(&self, room: &RoomCode) -> HashSet<String> {
        self.bindings
            .iter()
            .filter(|entry| entry.room == *room)
            .map(|entry| name_key(&entry.name))
            .collect()
    }

    /// Connections currently subscribed to `room`.
    pub fn connections(&self, room: &RoomCode) -> Vec<ConnectionId> {
        self.bindings
            .iter()
            .filter(|entry| entry.room == *room)
            .map(|entry| *entry.key())
            .collect()
    }

    /// Whether at least one connection is bound to `room`.
    pub fn is_room_live(&self, room: &RoomCode) -> bool {
        self.bindings.iter().any(|entry| entry.room == *room)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;

    #[test]
    fn tabs_sharing_a_name_count_once() {
        let tracker = PresenceTracker::new();
        let room = RoomCode::new("ABCD");
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        tracker.bind(first, room.clone(), "Alice");
        tracker.bind(second, room.clone(), "alice");
        assert_eq!(tracker.active_names(&room), HashSet::from(["alice".to_string()]));
        assert_eq!(tracker.connections(&room).len(), 2);

        tracker.unbind(first);
        assert_eq!(tracker.active_names(&room).len(), 1);
        tracker.unbind(second);
        assert!(tracker.active_names(&room).is_empty());
        assert!(!tracker.is_room_live(&room));
    }

    #[test]
    fn rebinding_moves_the_connection() {
        let tracker = PresenceTracker::new();
        let connection = Uuid::new_v4();
        tracker.bind(connection, RoomCode::new("AAAA"), "Bob");

        let previous = tracker
            .bind(connection, RoomCode::new("BBBB"), "Bob")
            .unwrap();
        assert_eq!(previous.room, RoomCode::new("AAAA"));
        assert!(!tracker.is_room_live(&RoomCode::new("AAAA")));
        assert!(tracker.is_room_live(&RoomCode::new("BBBB")));
    }

    #[test]
    fn active_flag_matches_live_connections_for_random_sequences() {
        let mut rng = StdRng::seed_from_u64(7);
        let tracker = PresenceTracker::new();
        let rooms = [RoomCode::new("AAAA"), RoomCode::new("BBBB")];
        let names = ["Alice", "ALICE", "bob", "Carol"];
        let pool: Vec<ConnectionId> = (0..6).map(|_| Uuid::new_v4()).collect();
        let mut model: HashMap<ConnectionId, (RoomCode, String)> = HashMap::new();

        for _ in 0..500 {
            let connection = pool[rng.random_range(0..pool.len())];
            if rng.random_bool(0.6) {
                let room = rooms[rng.random_range(0..rooms.len())].clone();
                let name = names[rng.random_range(0..names.len())];
                tracker.bind(connection, room.clone(), name);
                model.insert(connection, (room, name.to_lowercase()));
            } else {
                tracker.unbind(connection);
                model.remove(&connection);
            }

            for room in &rooms {
                let expected: HashSet<String> = model
                    .values()
                    .filter(|(bound_room, _)| bound_room == room)
                    .map(|(_, key)| key.clone())
                    .collect();
                assert_eq!(tracker.active_names(room), expected);
            }
        }
    }
}
