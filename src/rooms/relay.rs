//! The signaling relay: presence, signal forwarding and room chat.
//!
//! Every event runs in two phases. The in-memory part (registry, history,
//! fan-out to outbound queues) happens under one lock and never waits on
//! I/O. Durable side effects are then spawned as their own task, each
//! attempt bounded by a timeout; their failures are logged and otherwise
//! ignored, and they never hold up the connection's next event.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::sanitize::sanitize;
use crate::store::{SharedStore, Store, StoreError};

use super::buffer::{ChatEntry, MessageBuffer};
use super::msg::{ClientEvent, JoinCall, ServerEvent};
use super::registry::{ConnectionId, Departure, RoomRegistry, is_linkable, room_code};

pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub history_limit: usize,
    pub store_timeout: Duration,
    pub store_attempts: u32,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            history_limit: 200,
            store_timeout: Duration::from_secs(5),
            store_attempts: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Presence {
    pub rooms: usize,
    pub connections: usize,
    /// Rooms currently holding chat history.
    pub buffered_rooms: usize,
    pub members: Vec<MemberPresence>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberPresence {
    pub connection_id: ConnectionId,
    pub room: String,
    #[serde(with = "time::serde::rfc3339::option")]
    pub joined_at: Option<OffsetDateTime>,
}

struct RelayState {
    registry: RoomRegistry,
    history: MessageBuffer,
    outboxes: HashMap<ConnectionId, Outbox>,
}

impl RelayState {
    fn send(&self, to: &ConnectionId, event: ServerEvent) {
        if let Some(outbox) = self.outboxes.get(to) {
            // a closed queue means the socket is already going away
            let _ = outbox.send(event);
        }
    }

    fn broadcast(&self, members: &[ConnectionId], event: &ServerEvent) {
        for member in members {
            self.send(member, event.clone());
        }
    }

    /// Tell the room a member is gone and drop its history if it emptied.
    fn announce_departure(&mut self, id: &ConnectionId, departure: &Departure) {
        self.broadcast(&departure.remaining, &ServerEvent::UserLeft(id.clone()));
        if departure.room_closed() {
            self.history.clear(&departure.room);
            tracing::debug!(room = %departure.room, "room closed");
        }
    }
}

pub struct SignalingRelay {
    state: Mutex<RelayState>,
    store: SharedStore,
    config: RelayConfig,
}

impl SignalingRelay {
    pub fn new(store: SharedStore, config: RelayConfig) -> Self {
        Self {
            state: Mutex::new(RelayState {
                registry: RoomRegistry::new(),
                history: MessageBuffer::new(config.history_limit),
                outboxes: HashMap::new(),
            }),
            store,
            config,
        }
    }

    /// Register a new connection. Events for it arrive on the returned queue.
    pub async fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.state.lock().await.outboxes.insert(id.clone(), tx);
        tracing::info!(connection_id = %id, "connected");
        (id, rx)
    }

    /// Apply one client event. Durable writes it causes continue in the
    /// background.
    pub async fn handle(&self, id: &ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::JoinCall(JoinCall { path, user_id }) => {
                self.join(id, &path, &user_id).await;
            }
            ClientEvent::Signal(to, payload) => self.signal(id, &to, payload).await,
            ClientEvent::ChatMessage(content, sender) => {
                self.chat(id, &content, &sender).await;
            }
        }
    }

    /// Returns the durable linking task, if one was started.
    pub async fn join(
        &self,
        id: &ConnectionId,
        path: &str,
        user_id: &str,
    ) -> Option<JoinHandle<()>> {
        {
            let mut state = self.state.lock().await;
            if !state.outboxes.contains_key(id) {
                tracing::debug!(connection_id = %id, "join from disconnected connection dropped");
                return None;
            }

            let joined = state.registry.join(path, id);
            if let Some(departure) = &joined.moved_from {
                state.announce_departure(id, departure);
            }

            state.broadcast(
                &joined.members,
                &ServerEvent::UserJoined(id.clone(), joined.members.clone()),
            );
            // a member already has everything the history holds
            if !joined.rejoined {
                for entry in state.history.history_of(path) {
                    let replay = ServerEvent::ChatMessage(entry.content, entry.sender, entry.origin);
                    state.send(id, replay);
                }
            }

            tracing::info!(
                connection_id = %id,
                room = %path,
                members = joined.members.len(),
                "joined room"
            );
        }

        let code = room_code(path);
        if !is_linkable(code) || user_id.is_empty() {
            return None;
        }
        let (code, user_id) = (code.to_owned(), user_id.to_owned());
        Some(self.persist("link membership", move |store| {
            let (code, user_id) = (code.clone(), user_id.clone());
            async move { link_membership(&*store, &code, &user_id).await }
        }))
    }

    pub async fn signal(&self, from: &ConnectionId, to: &ConnectionId, payload: Value) {
        let state = self.state.lock().await;
        if !state.outboxes.contains_key(to) {
            tracing::debug!(connection_id = %from, target = %to, "signal target not connected");
            return;
        }
        state.send(to, ServerEvent::Signal(from.clone(), payload));
    }

    /// Returns the archiving task, or `None` when the chat was dropped.
    pub async fn chat(
        &self,
        id: &ConnectionId,
        content: &str,
        sender: &str,
    ) -> Option<JoinHandle<()>> {
        let entry = ChatEntry {
            content: sanitize(content),
            sender: sanitize(sender),
            origin: id.clone(),
        };

        let room = {
            let mut state = self.state.lock().await;
            let Some(room) = state.registry.room_of(id).map(str::to_owned) else {
                tracing::debug!(connection_id = %id, "chat outside a room dropped");
                return None;
            };

            state.history.append(&room, entry.clone());
            let members = state.registry.members_of(&room);
            state.broadcast(
                &members,
                &ServerEvent::ChatMessage(
                    entry.content.clone(),
                    entry.sender.clone(),
                    entry.origin.clone(),
                ),
            );
            room
        };

        let code = room_code(&room).to_owned();
        Some(self.persist("archive chat", move |store| {
            let (code, entry) = (code.clone(), entry.clone());
            async move { archive_chat(&*store, &code, &entry).await }
        }))
    }

    /// Terminal: the connection is forgotten and later events for it ignored.
    pub async fn disconnect(&self, id: &ConnectionId) {
        let mut state = self.state.lock().await;
        state.outboxes.remove(id);
        if let Some(departure) = state.registry.leave(id) {
            state.announce_departure(id, &departure);
        }
        tracing::info!(connection_id = %id, "disconnected");
    }

    pub async fn members_of(&self, path: &str) -> Vec<ConnectionId> {
        self.state.lock().await.registry.members_of(path)
    }

    pub async fn history_of(&self, path: &str) -> Vec<ChatEntry> {
        self.state.lock().await.history.history_of(path)
    }

    pub async fn presence(&self) -> Presence {
        let state = self.state.lock().await;
        let mut members: Vec<_> = state
            .registry
            .rooms()
            .flat_map(|(room, ids)| ids.iter().map(move |id| (room, id)))
            .map(|(room, id)| MemberPresence {
                connection_id: id.clone(),
                room: room.to_owned(),
                joined_at: state.registry.joined_at(id),
            })
            .collect();
        members.sort_by(|a, b| {
            (&a.room, a.connection_id.as_str()).cmp(&(&b.room, b.connection_id.as_str()))
        });

        Presence {
            rooms: state.registry.room_count(),
            connections: state.registry.connection_count(),
            buffered_rooms: state.history.room_count(),
            members,
        }
    }

    /// Run `op` on its own task, retrying failures up to the configured
    /// number of attempts.
    fn persist<F, Fut>(&self, what: &'static str, op: F) -> JoinHandle<()>
    where
        F: Fn(SharedStore) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        let store = self.store.clone();
        let timeout = self.config.store_timeout;
        let attempts = self.config.store_attempts.max(1);

        tokio::spawn(async move {
            for attempt in 1..=attempts {
                let error = match tokio::time::timeout(timeout, op(store.clone())).await {
                    Ok(Ok(())) => return,
                    Ok(Err(error)) => error,
                    Err(_) => StoreError::Timeout(timeout),
                };
                tracing::warn!(what, attempt, %error, "store call failed");
            }
        })
    }
}

/// Record that `user_id` belongs to group `code` on both sides. Every write
/// is a single-row update, so concurrent joins never drop each other.
async fn link_membership(store: &dyn Store, code: &str, user_id: &str) -> Result<(), StoreError> {
    match store.create_group(code, Some(user_id)).await {
        Ok(_) => {}
        Err(StoreError::Conflict(_)) => {
            store.add_group_member(code, user_id).await?;
        }
        Err(error) => return Err(error),
    }

    match store.create_user(user_id).await {
        Ok(_) | Err(StoreError::Conflict(_)) => {}
        Err(error) => return Err(error),
    }
    store.add_user_group(user_id, code).await?;
    Ok(())
}

/// Store the entry, and file it under group `code` when that group exists.
async fn archive_chat(store: &dyn Store, code: &str, entry: &ChatEntry) -> Result<(), StoreError> {
    let record = store.create_chat_record(&entry.content, &entry.sender).await?;
    if is_linkable(code) {
        store.append_group_message(code, &record).await?;
    }
    Ok(())
}
