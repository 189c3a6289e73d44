use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use super::{ChatRecord, ChatRecordRef, Group, Store, StoreError, User, timestamp};

#[derive(Default)]
struct Records {
    users: Vec<User>,
    groups: Vec<Group>,
    chats: HashMap<ChatRecordRef, ChatRecord>,
}

/// Process-local store. Can be told to fail every call, which is how
/// best-effort persistence is exercised.
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<Records>,
    failing: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn records(&self) -> Result<std::sync::MutexGuard<'_, Records>, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        self.records.lock().map_err(|_| StoreError::Unavailable)
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let records = self.records()?;
        Ok(records.users.iter().find(|u| u.username == username).cloned())
    }

    async fn create_user(&self, username: &str) -> Result<User, StoreError> {
        let mut records = self.records()?;
        if records.users.iter().any(|u| u.username == username) {
            return Err(StoreError::Conflict(format!("user {username}")));
        }
        let user = User {
            username: username.to_owned(),
            groups: Vec::new(),
            created_at: timestamp()?,
        };
        records.users.push(user.clone());
        Ok(user)
    }

    async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        let mut records = self.records()?;
        match records.users.iter_mut().find(|u| u.username == user.username) {
            Some(existing) => *existing = user.clone(),
            None => records.users.push(user.clone()),
        }
        Ok(())
    }

    async fn add_user_group(&self, username: &str, group_id: &str) -> Result<bool, StoreError> {
        let mut records = self.records()?;
        Ok(records
            .users
            .iter_mut()
            .find(|u| u.username == username)
            .is_some_and(|user| user.add_group(group_id)))
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.records()?.users.clone())
    }

    async fn delete_user(&self, username: &str) -> Result<bool, StoreError> {
        let mut records = self.records()?;
        let before = records.users.len();
        records.users.retain(|u| u.username != username);
        Ok(records.users.len() != before)
    }

    async fn find_group(&self, group_id: &str) -> Result<Option<Group>, StoreError> {
        let records = self.records()?;
        Ok(records.groups.iter().find(|g| g.group_id == group_id).cloned())
    }

    async fn create_group(
        &self,
        group_id: &str,
        initial_member: Option<&str>,
    ) -> Result<Group, StoreError> {
        let mut records = self.records()?;
        if records.groups.iter().any(|g| g.group_id == group_id) {
            return Err(StoreError::Conflict(format!("group {group_id}")));
        }
        let group = Group {
            group_id: group_id.to_owned(),
            members: initial_member.map(str::to_owned).into_iter().collect(),
            messages: Vec::new(),
            created_at: timestamp()?,
        };
        records.groups.push(group.clone());
        Ok(group)
    }

    async fn save_group(&self, group: &Group) -> Result<(), StoreError> {
        let mut records = self.records()?;
        match records.groups.iter_mut().find(|g| g.group_id == group.group_id) {
            Some(existing) => *existing = group.clone(),
            None => records.groups.push(group.clone()),
        }
        Ok(())
    }

    async fn add_group_member(&self, group_id: &str, user_id: &str) -> Result<bool, StoreError> {
        let mut records = self.records()?;
        Ok(records
            .groups
            .iter_mut()
            .find(|g| g.group_id == group_id)
            .is_some_and(|group| group.add_member(user_id)))
    }

    async fn append_group_message(
        &self,
        group_id: &str,
        record: &ChatRecordRef,
    ) -> Result<bool, StoreError> {
        let mut records = self.records()?;
        let Some(group) = records.groups.iter_mut().find(|g| g.group_id == group_id) else {
            return Ok(false);
        };
        group.append_message(record.clone());
        Ok(true)
    }

    async fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        Ok(self.records()?.groups.clone())
    }

    async fn delete_group(&self, group_id: &str) -> Result<bool, StoreError> {
        let mut records = self.records()?;
        let before = records.groups.len();
        records.groups.retain(|g| g.group_id != group_id);
        Ok(records.groups.len() != before)
    }

    async fn create_chat_record(
        &self,
        content: &str,
        author: &str,
    ) -> Result<ChatRecordRef, StoreError> {
        let mut records = self.records()?;
        let id = ChatRecordRef(Uuid::now_v7().to_string());
        records.chats.insert(
            id.clone(),
            ChatRecord {
                id: id.clone(),
                content: content.to_owned(),
                author: author.to_owned(),
                created_at: timestamp()?,
            },
        );
        Ok(id)
    }

    async fn chat_records(&self, refs: &[ChatRecordRef]) -> Result<Vec<ChatRecord>, StoreError> {
        let records = self.records()?;
        Ok(refs
            .iter()
            .filter_map(|r| records.chats.get(r).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn failing_store_errors_every_call() {
        let store = InMemoryStore::new();
        store.create_user("u1").await.unwrap();

        store.set_failing(true);
        assert!(matches!(
            store.find_user("u1").await,
            Err(StoreError::Unavailable)
        ));

        store.set_failing(false);
        assert!(store.find_user("u1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn appends_need_an_existing_group() {
        let store = InMemoryStore::new();
        let record = store.create_chat_record("hi", "u1").await.unwrap();
        assert!(!store.append_group_message("AAAAA", &record).await.unwrap());

        store.create_group("AAAAA", None).await.unwrap();
        assert!(store.append_group_message("AAAAA", &record).await.unwrap());
        assert!(store.add_group_member("AAAAA", "u1").await.unwrap());
        assert!(!store.add_group_member("AAAAA", "u1").await.unwrap());

        let group = store.find_group("AAAAA").await.unwrap().unwrap();
        assert_eq!(group.messages, vec![record]);
    }

    #[tokio::test]
    async fn duplicate_group_conflicts() {
        let store = InMemoryStore::new();
        store.create_group("AAAAA", Some("u1")).await.unwrap();
        assert!(matches!(
            store.create_group("AAAAA", None).await,
            Err(StoreError::Conflict(_))
        ));
    }
}
