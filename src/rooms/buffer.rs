use std::collections::{HashMap, VecDeque};

use serde::Serialize;

use super::registry::ConnectionId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatEntry {
    pub content: String,
    pub sender: String,
    pub origin: ConnectionId,
}

/// Recent chat per room, replayed to late joiners.
///
/// Each room keeps at most `capacity` entries; the oldest are evicted first.
#[derive(Debug)]
pub struct MessageBuffer {
    capacity: usize,
    rooms: HashMap<String, VecDeque<ChatEntry>>,
}

impl MessageBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            rooms: HashMap::new(),
        }
    }

    pub fn append(&mut self, room: &str, entry: ChatEntry) {
        let history = self.rooms.entry(room.to_owned()).or_default();
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(entry);
    }

    pub fn history_of(&self, room: &str) -> Vec<ChatEntry> {
        self.rooms
            .get(room)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&mut self, room: &str) {
        self.rooms.remove(room);
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
