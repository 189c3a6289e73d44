use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Identifier of one live transport session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The room code of a room path: its last `/` segment, or the whole path.
pub fn room_code(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Codes of exactly this many characters are linked to durable records.
pub const LINKABLE_CODE_LEN: usize = 5;

pub fn is_linkable(code: &str) -> bool {
    code.chars().count() == LINKABLE_CODE_LEN
}

/// Result of removing a connection from its room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub room: String,
    pub remaining: Vec<ConnectionId>,
}

impl Departure {
    /// The last member left; the room no longer exists.
    pub fn room_closed(&self) -> bool {
        self.remaining.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined {
    pub members: Vec<ConnectionId>,
    /// Set when the connection was moved out of a different room.
    pub moved_from: Option<Departure>,
    /// The connection was already a member of this room.
    pub rejoined: bool,
}

/// Which connections are in which room, in join order.
///
/// A room exists exactly as long as it has members. A connection is in at
/// most one room; joining another room moves it.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Vec<ConnectionId>>,
    joined_at: HashMap<ConnectionId, OffsetDateTime>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&mut self, room: &str, id: &ConnectionId) -> Joined {
        let current = self.room_of(id).map(str::to_owned);
        let rejoined = current.as_deref() == Some(room);
        let moved_from = match current {
            Some(current) if current != room => self.remove_member(id),
            _ => None,
        };

        let members = self.rooms.entry(room.to_owned()).or_default();
        if !members.contains(id) {
            members.push(id.clone());
        }
        let members = members.clone();

        if moved_from.is_some() {
            self.joined_at.insert(id.clone(), OffsetDateTime::now_utc());
        } else {
            self.joined_at
                .entry(id.clone())
                .or_insert_with(OffsetDateTime::now_utc);
        }

        Joined {
            members,
            moved_from,
            rejoined,
        }
    }

    pub fn leave(&mut self, id: &ConnectionId) -> Option<Departure> {
        let departure = self.remove_member(id);
        self.joined_at.remove(id);
        departure
    }

    pub fn members_of(&self, room: &str) -> Vec<ConnectionId> {
        self.rooms.get(room).cloned().unwrap_or_default()
    }

    pub fn room_of(&self, id: &ConnectionId) -> Option<&str> {
        self.rooms
            .iter()
            .find(|(_, members)| members.contains(id))
            .map(|(room, _)| room.as_str())
    }

    pub fn joined_at(&self, id: &ConnectionId) -> Option<OffsetDateTime> {
        self.joined_at.get(id).copied()
    }

    /// Every room with its members, in no particular order.
    pub fn rooms(&self) -> impl Iterator<Item = (&str, &[ConnectionId])> {
        self.rooms
            .iter()
            .map(|(room, members)| (room.as_str(), members.as_slice()))
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.rooms.values().map(Vec::len).sum()
    }

    fn remove_member(&mut self, id: &ConnectionId) -> Option<Departure> {
        let room = self.room_of(id)?.to_owned();
        let members = self.rooms.get_mut(&room)?;
        members.retain(|member| member != id);
        let remaining = members.clone();
        if remaining.is_empty() {
            self.rooms.remove(&room);
        }
        Some(Departure { room, remaining })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<ConnectionId> {
        names.iter().map(|n| ConnectionId::from(*n)).collect()
    }

    #[test]
    fn room_code_is_last_segment() {
        assert_eq!(room_code("/call/AAAAA"), "AAAAA");
        assert_eq!(room_code("https://host/room/x1"), "x1");
        assert_eq!(room_code("BBBBB"), "BBBBB");
        assert_eq!(room_code("/trailing/"), "");
    }

    #[test]
    fn linkable_codes_are_five_characters() {
        assert!(is_linkable("AAAAA"));
        assert!(is_linkable("çaçaç"));
        assert!(!is_linkable("AAAA"));
        assert!(!is_linkable("AAAAAA"));
    }

    #[test]
    fn join_appends_in_order() {
        let mut registry = RoomRegistry::new();
        registry.join("/r/AAAAA", &"a".into());
        let joined = registry.join("/r/AAAAA", &"b".into());

        assert_eq!(joined.members, ids(&["a", "b"]));
        assert_eq!(joined.moved_from, None);
        assert_eq!(registry.room_count(), 1);
    }

    #[test]
    fn join_is_idempotent() {
        let mut registry = RoomRegistry::new();
        let first = registry.join("/r/AAAAA", &"a".into());
        let at = registry.joined_at(&"a".into());
        let second = registry.join("/r/AAAAA", &"a".into());

        assert_eq!(first.members, second.members);
        assert!(!first.rejoined);
        assert!(second.rejoined);
        assert_eq!(registry.joined_at(&"a".into()), at);
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn joining_another_room_moves_the_connection() {
        let mut registry = RoomRegistry::new();
        registry.join("/r/one", &"a".into());
        registry.join("/r/one", &"b".into());
        let joined = registry.join("/r/two", &"a".into());

        assert_eq!(joined.members, ids(&["a"]));
        assert_eq!(
            joined.moved_from,
            Some(Departure {
                room: "/r/one".to_owned(),
                remaining: ids(&["b"]),
            })
        );
        assert_eq!(registry.room_of(&"a".into()), Some("/r/two"));
        assert_eq!(registry.members_of("/r/one"), ids(&["b"]));
    }

    #[test]
    fn leave_removes_from_its_room_only() {
        let mut registry = RoomRegistry::new();
        registry.join("/r/one", &"a".into());
        registry.join("/r/one", &"b".into());
        registry.join("/r/two", &"c".into());

        let departure = registry.leave(&"a".into()).unwrap();
        assert_eq!(departure.room, "/r/one");
        assert_eq!(departure.remaining, ids(&["b"]));
        assert!(!departure.room_closed());
        assert_eq!(registry.members_of("/r/two"), ids(&["c"]));
        assert_eq!(registry.joined_at(&"a".into()), None);
    }

    #[test]
    fn last_leave_deletes_room() {
        let mut registry = RoomRegistry::new();
        registry.join("/r/one", &"a".into());

        let departure = registry.leave(&"a".into()).unwrap();
        assert!(departure.room_closed());
        assert_eq!(registry.room_count(), 0);
        assert!(registry.members_of("/r/one").is_empty());
    }

    #[test]
    fn leave_without_room_is_none() {
        let mut registry = RoomRegistry::new();
        assert_eq!(registry.leave(&"ghost".into()), None);
    }

    #[test]
    fn connection_never_in_two_rooms() {
        let mut registry = RoomRegistry::new();
        let steps = [
            ("/r/one", "a"),
            ("/r/two", "a"),
            ("/r/one", "b"),
            ("/r/one", "a"),
            ("/r/two", "b"),
        ];
        for (room, id) in steps {
            registry.join(room, &id.into());
            for id in ["a", "b"] {
                let id = ConnectionId::from(id);
                let rooms_with_id = ["/r/one", "/r/two"]
                    .iter()
                    .filter(|room| registry.members_of(room).contains(&id))
                    .count();
                assert!(rooms_with_id <= 1);
            }
        }
    }
}
