use std::str::FromStr;

use async_trait::async_trait;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use uuid::Uuid;

use crate::include_res;

use super::{ChatRecord, ChatRecordRef, Group, Store, StoreError, User, timestamp};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `url` and apply the schema.
    ///
    /// `sqlite::memory:` databases are per connection, so use a single
    /// connection for those.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(include_res!(str, "/schema.sql"))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn conflict_or(err: sqlx::Error, what: String) -> StoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Conflict(what),
        _ => err.into(),
    }
}

fn user_from_row((username, group_ids, created_at): (String, String, String)) -> Result<User, StoreError> {
    Ok(User {
        username,
        groups: serde_json::from_str(&group_ids)?,
        created_at,
    })
}

fn group_from_row(
    (group_id, members, messages, created_at): (String, String, String, String),
) -> Result<Group, StoreError> {
    Ok(Group {
        group_id,
        members: serde_json::from_str(&members)?,
        messages: serde_json::from_str(&messages)?,
        created_at,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        sqlx::query_as::<_, (String, String, String)>(
            "SELECT username,group_ids,created_at FROM users WHERE username=?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .map(user_from_row)
        .transpose()
    }

    async fn create_user(&self, username: &str) -> Result<User, StoreError> {
        let user = User {
            username: username.to_owned(),
            groups: Vec::new(),
            created_at: timestamp()?,
        };
        sqlx::query("INSERT INTO users (username,group_ids,created_at) VALUES (?,?,?)")
            .bind(&user.username)
            .bind(serde_json::to_string(&user.groups)?)
            .bind(&user.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| conflict_or(e, format!("user {username}")))?;
        Ok(user)
    }

    async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (username,group_ids,created_at) VALUES (?,?,?) \
             ON CONFLICT(username) DO UPDATE SET group_ids=excluded.group_ids",
        )
        .bind(&user.username)
        .bind(serde_json::to_string(&user.groups)?)
        .bind(&user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_user_group(&self, username: &str, group_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE users SET group_ids=json_insert(group_ids,'$[#]',?) WHERE username=? \
             AND NOT EXISTS (SELECT 1 FROM json_each(users.group_ids) WHERE json_each.value=?)",
        )
        .bind(group_id)
        .bind(username)
        .bind(group_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        sqlx::query_as::<_, (String, String, String)>(
            "SELECT username,group_ids,created_at FROM users ORDER BY created_at,username",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(user_from_row)
        .collect()
    }

    async fn delete_user(&self, username: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE username=?")
            .bind(username)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_group(&self, group_id: &str) -> Result<Option<Group>, StoreError> {
        sqlx::query_as::<_, (String, String, String, String)>(
            "SELECT group_id,members,messages,created_at FROM chat_groups WHERE group_id=?",
        )
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?
        .map(group_from_row)
        .transpose()
    }

    async fn create_group(
        &self,
        group_id: &str,
        initial_member: Option<&str>,
    ) -> Result<Group, StoreError> {
        let group = Group {
            group_id: group_id.to_owned(),
            members: initial_member.map(str::to_owned).into_iter().collect(),
            messages: Vec::new(),
            created_at: timestamp()?,
        };
        sqlx::query(
            "INSERT INTO chat_groups (group_id,members,messages,created_at) VALUES (?,?,?,?)",
        )
        .bind(&group.group_id)
        .bind(serde_json::to_string(&group.members)?)
        .bind(serde_json::to_string(&group.messages)?)
        .bind(&group.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_or(e, format!("group {group_id}")))?;
        Ok(group)
    }

    async fn save_group(&self, group: &Group) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO chat_groups (group_id,members,messages,created_at) VALUES (?,?,?,?) \
             ON CONFLICT(group_id) DO UPDATE SET members=excluded.members, messages=excluded.messages",
        )
        .bind(&group.group_id)
        .bind(serde_json::to_string(&group.members)?)
        .bind(serde_json::to_string(&group.messages)?)
        .bind(&group.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_group_member(&self, group_id: &str, user_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE chat_groups SET members=json_insert(members,'$[#]',?) WHERE group_id=? \
             AND NOT EXISTS (SELECT 1 FROM json_each(chat_groups.members) WHERE json_each.value=?)",
        )
        .bind(user_id)
        .bind(group_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_group_message(
        &self,
        group_id: &str,
        record: &ChatRecordRef,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE chat_groups SET messages=json_insert(messages,'$[#]',?) WHERE group_id=?",
        )
        .bind(&record.0)
        .bind(group_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        sqlx::query_as::<_, (String, String, String, String)>(
            "SELECT group_id,members,messages,created_at FROM chat_groups ORDER BY created_at,group_id",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(group_from_row)
        .collect()
    }

    async fn delete_group(&self, group_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM chat_groups WHERE group_id=?")
            .bind(group_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_chat_record(
        &self,
        content: &str,
        author: &str,
    ) -> Result<ChatRecordRef, StoreError> {
        let id = Uuid::now_v7().to_string();
        sqlx::query("INSERT INTO chats (id,content,author,created_at) VALUES (?,?,?,?)")
            .bind(&id)
            .bind(content)
            .bind(author)
            .bind(timestamp()?)
            .execute(&self.pool)
            .await?;
        Ok(ChatRecordRef(id))
    }

    async fn chat_records(&self, refs: &[ChatRecordRef]) -> Result<Vec<ChatRecord>, StoreError> {
        let mut records = Vec::with_capacity(refs.len());
        for id in refs {
            let row: Option<(String, String, String, String)> =
                sqlx::query_as("SELECT id,content,author,created_at FROM chats WHERE id=?")
                    .bind(&id.0)
                    .fetch_optional(&self.pool)
                    .await?;
            if let Some((id, content, author, created_at)) = row {
                records.push(ChatRecord {
                    id: ChatRecordRef(id),
                    content,
                    author,
                    created_at,
                });
            }
        }
        Ok(records)
    }
}
