//! Durable user/group/chat records.
//!
//! The relay only ever calls into this best-effort; the HTTP API uses it
//! directly for CRUD.

mod memory;
mod sqlite;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

pub type SharedStore = Arc<dyn Store>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("timestamp error: {0}")]
    Timestamp(#[from] time::error::Format),

    #[error("{0} already exists")]
    Conflict(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store unavailable")]
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    pub groups: Vec<String>,
    pub created_at: String,
}

impl User {
    /// Returns false when the user already had the group.
    pub fn add_group(&mut self, group_id: &str) -> bool {
        if self.groups.iter().any(|g| g == group_id) {
            return false;
        }
        self.groups.push(group_id.to_owned());
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatRecordRef(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub group_id: String,
    pub members: Vec<String>,
    pub messages: Vec<ChatRecordRef>,
    pub created_at: String,
}

impl Group {
    /// Returns false when the user was already a member.
    pub fn add_member(&mut self, user_id: &str) -> bool {
        if self.members.iter().any(|m| m == user_id) {
            return false;
        }
        self.members.push(user_id.to_owned());
        true
    }

    pub fn append_message(&mut self, record: ChatRecordRef) {
        self.messages.push(record);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRecord {
    pub id: ChatRecordRef,
    pub content: String,
    pub author: String,
    pub created_at: String,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError>;
    async fn create_user(&self, username: &str) -> Result<User, StoreError>;
    async fn save_user(&self, user: &User) -> Result<(), StoreError>;
    /// Adds `group_id` to the user's groups in one write. False when the
    /// user is unknown or already had the group.
    async fn add_user_group(&self, username: &str, group_id: &str) -> Result<bool, StoreError>;
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;
    async fn delete_user(&self, username: &str) -> Result<bool, StoreError>;

    async fn find_group(&self, group_id: &str) -> Result<Option<Group>, StoreError>;
    async fn create_group(
        &self,
        group_id: &str,
        initial_member: Option<&str>,
    ) -> Result<Group, StoreError>;
    async fn save_group(&self, group: &Group) -> Result<(), StoreError>;
    /// Adds `user_id` to the members in one write. False when the group is
    /// unknown or the user was already a member.
    async fn add_group_member(&self, group_id: &str, user_id: &str) -> Result<bool, StoreError>;
    /// Appends to the group's messages in one write. False when the group
    /// is unknown.
    async fn append_group_message(
        &self,
        group_id: &str,
        record: &ChatRecordRef,
    ) -> Result<bool, StoreError>;
    async fn list_groups(&self) -> Result<Vec<Group>, StoreError>;
    async fn delete_group(&self, group_id: &str) -> Result<bool, StoreError>;

    async fn create_chat_record(
        &self,
        content: &str,
        author: &str,
    ) -> Result<ChatRecordRef, StoreError>;
    /// Records in the order of `refs`; unknown refs are skipped.
    async fn chat_records(&self, refs: &[ChatRecordRef]) -> Result<Vec<ChatRecord>, StoreError>;
}

pub(crate) fn timestamp() -> Result<String, StoreError> {
    Ok(OffsetDateTime::now_utc().format(&Rfc3339)?)
}
