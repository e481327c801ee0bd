use shared::models::ConnectionId;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("room name is required")]
    InvalidRoomName,
}

#[derive(Debug, Default)]
struct ConnectionRecord {
    room: Option<String>,
}

/// A connection leaving a room, by disconnect or by switching rooms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub room: String,
    pub remaining: Vec<ConnectionId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined {
    pub room: String,
    pub members: usize,
    pub previous: Option<Departure>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub connections: usize,
    pub rooms: usize,
}

#[derive(Debug, Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, ConnectionRecord>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
}

impl RegistryState {
    // Caller must clear the record's `room` afterwards.
    fn leave_room(&mut self, connection_id: &ConnectionId, room: String) -> Departure {
        let remaining = match self.rooms.get_mut(&room) {
            Some(members) => {
                members.remove(connection_id);
                members.iter().copied().collect::<Vec<_>>()
            }
            None => Vec::new(),
        };
        if remaining.is_empty() && self.rooms.remove(&room).is_some() {
            debug!(%room, "dropped empty room");
        }
        Departure { room, remaining }
    }
}

/// Who is connected and which room each connection is in.
///
/// Both directions of the mapping live behind one lock so they are always
/// updated together: a connection maps to room `r` exactly when it is in
/// `r`'s member set.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, connection_id: ConnectionId) {
        self.state
            .write()
            .await
            .connections
            .entry(connection_id)
            .or_default();
    }

    /// Removes the connection and takes it out of its room. Unknown ids are ignored.
    pub async fn unregister(&self, connection_id: &ConnectionId) -> Option<Departure> {
        let mut state = self.state.write().await;
        let record = state.connections.remove(connection_id)?;
        record
            .room
            .map(|room| state.leave_room(connection_id, room))
    }

    /// Puts the connection into `room`, leaving any other room first.
    pub async fn join(
        &self,
        connection_id: ConnectionId,
        room: &str,
    ) -> Result<Joined, RegistryError> {
        if room.is_empty() {
            return Err(RegistryError::InvalidRoomName);
        }

        let mut state = self.state.write().await;
        let current = state
            .connections
            .entry(connection_id)
            .or_default()
            .room
            .take();

        let previous = match current {
            // already a member, nothing to leave
            Some(current) if current == room => None,
            Some(current) => Some(state.leave_room(&connection_id, current)),
            None => None,
        };

        let members = state.rooms.entry(room.to_string()).or_default();
        members.insert(connection_id);
        let members = members.len();

        if let Some(record) = state.connections.get_mut(&connection_id) {
            record.room = Some(room.to_string());
        }

        Ok(Joined {
            room: room.to_string(),
            members,
            previous,
        })
    }

    pub async fn room_of(&self, connection_id: &ConnectionId) -> Option<String> {
        self.state
            .read()
            .await
            .connections
            .get(connection_id)
            .and_then(|record| record.room.clone())
    }

    /// Every member of `room`, including whoever is asking.
    pub async fn members_of(&self, room: &str) -> Vec<ConnectionId> {
        self.state
            .read()
            .await
            .rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub async fn stats(&self) -> RegistryStats {
        let state = self.state.read().await;
        RegistryStats {
            connections: state.connections.len(),
            rooms: state.rooms.len(),
        }
    }

    #[cfg(test)]
    async fn assert_consistent(&self) {
        let state = self.state.read().await;
        for (id, record) in &state.connections {
            if let Some(room) = &record.room {
                assert!(
                    state.rooms.get(room).is_some_and(|m| m.contains(id)),
                    "{id} maps to {room} but is not a member"
                );
            }
        }
        for (room, members) in &state.rooms {
            assert!(!members.is_empty(), "empty room {room} kept");
            for id in members {
                assert_eq!(
                    state.connections.get(id).and_then(|r| r.room.as_deref()),
                    Some(room.as_str()),
                    "{id} is a member of {room} but maps elsewhere"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_join_records_room() {
        let registry = ConnectionRegistry::new();
        let a = Uuid::new_v4();
        registry.register(a).await;

        let joined = registry.join(a, "lobby").await.expect("join should succeed");
        assert_eq!(joined.room, "lobby");
        assert_eq!(joined.members, 1);
        assert_eq!(joined.previous, None);
        assert_eq!(registry.room_of(&a).await.as_deref(), Some("lobby"));
        assert_eq!(registry.members_of("lobby").await, vec![a]);
        registry.assert_consistent().await;
    }

    #[tokio::test]
    async fn test_join_rejects_empty_name() {
        let registry = ConnectionRegistry::new();
        let a = Uuid::new_v4();
        registry.register(a).await;

        assert_eq!(registry.join(a, "").await, Err(RegistryError::InvalidRoomName));
        assert_eq!(registry.room_of(&a).await, None);
        assert_eq!(registry.stats().await.rooms, 0);
    }

    #[tokio::test]
    async fn test_whitespace_name_is_a_room() {
        let registry = ConnectionRegistry::new();
        let a = Uuid::new_v4();

        let joined = registry.join(a, "   ").await.expect("join should succeed");
        assert_eq!(joined.room, "   ");
        assert_eq!(joined.members, 1);
        assert_eq!(registry.room_of(&a).await.as_deref(), Some("   "));
        registry.assert_consistent().await;
    }

    #[tokio::test]
    async fn test_invalid_join_keeps_current_room() {
        let registry = ConnectionRegistry::new();
        let a = Uuid::new_v4();
        registry.join(a, "lobby").await.unwrap();

        assert!(registry.join(a, "").await.is_err());
        assert_eq!(registry.room_of(&a).await.as_deref(), Some("lobby"));
        registry.assert_consistent().await;
    }

    #[tokio::test]
    async fn test_member_count_grows() {
        let registry = ConnectionRegistry::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        assert_eq!(registry.join(a, "lobby").await.unwrap().members, 1);
        assert_eq!(registry.join(b, "lobby").await.unwrap().members, 2);
        assert_eq!(registry.join(c, "other").await.unwrap().members, 1);

        let mut members = registry.members_of("lobby").await;
        members.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(members, expected);
        registry.assert_consistent().await;
    }

    #[tokio::test]
    async fn test_switching_rooms_leaves_old_room() {
        let registry = ConnectionRegistry::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        registry.join(a, "one").await.unwrap();
        registry.join(b, "one").await.unwrap();

        let joined = registry.join(a, "two").await.unwrap();
        assert_eq!(joined.members, 1);
        assert_eq!(
            joined.previous,
            Some(Departure {
                room: "one".to_string(),
                remaining: vec![b],
            })
        );
        assert_eq!(registry.room_of(&a).await.as_deref(), Some("two"));
        assert_eq!(registry.members_of("one").await, vec![b]);
        registry.assert_consistent().await;
    }

    #[tokio::test]
    async fn test_rejoining_same_room_is_noop() {
        let registry = ConnectionRegistry::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        registry.join(a, "lobby").await.unwrap();
        registry.join(b, "lobby").await.unwrap();

        let joined = registry.join(a, "lobby").await.unwrap();
        assert_eq!(joined.members, 2);
        assert_eq!(joined.previous, None);
        registry.assert_consistent().await;
    }

    #[tokio::test]
    async fn test_unregister_cleans_up() {
        let registry = ConnectionRegistry::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        registry.register(a).await;
        registry.register(b).await;
        registry.join(a, "lobby").await.unwrap();
        registry.join(b, "lobby").await.unwrap();

        let departure = registry.unregister(&a).await;
        assert_eq!(
            departure,
            Some(Departure {
                room: "lobby".to_string(),
                remaining: vec![b],
            })
        );
        assert_eq!(registry.room_of(&a).await, None);
        assert_eq!(registry.members_of("lobby").await, vec![b]);

        // a newcomer sees the real count, not the ghost
        let c = Uuid::new_v4();
        assert_eq!(registry.join(c, "lobby").await.unwrap().members, 2);
        registry.assert_consistent().await;
    }

    #[tokio::test]
    async fn test_empty_rooms_are_dropped() {
        let registry = ConnectionRegistry::new();
        let a = Uuid::new_v4();
        registry.join(a, "one").await.unwrap();
        registry.join(a, "two").await.unwrap();
        assert_eq!(registry.stats().await, RegistryStats { connections: 1, rooms: 1 });

        registry.unregister(&a).await;
        assert_eq!(registry.stats().await, RegistryStats::default());
        assert!(registry.members_of("two").await.is_empty());
    }

    #[tokio::test]
    async fn test_unregister_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        registry.join(b, "other").await.unwrap();

        assert_eq!(registry.unregister(&a).await, None);
        registry.register(a).await;
        assert_eq!(registry.unregister(&a).await, None);
        assert_eq!(registry.unregister(&a).await, None);

        assert_eq!(registry.members_of("other").await, vec![b]);
        assert_eq!(registry.stats().await, RegistryStats { connections: 1, rooms: 1 });
        registry.assert_consistent().await;
    }
}
