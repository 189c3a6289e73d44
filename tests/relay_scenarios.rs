//! End-to-end relay behaviour through the public API, one socket per
//! `connect()` with its outbound queue standing in for the transport.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use huddle::rooms::{ClientEvent, JoinCall, RelayConfig, ServerEvent, SignalingRelay};
use huddle::store::{
    ChatRecord, ChatRecordRef, Group, InMemoryStore, SqliteStore, Store, StoreError, User,
};

fn drain(inbox: &mut UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = inbox.try_recv() {
        events.push(event);
    }
    events
}

async fn settle(task: Option<JoinHandle<()>>) {
    if let Some(task) = task {
        task.await.unwrap();
    }
}

fn join(path: &str, user_id: &str) -> ClientEvent {
    ClientEvent::JoinCall(JoinCall {
        path: path.to_owned(),
        user_id: user_id.to_owned(),
    })
}

#[tokio::test]
async fn two_peers_join_chat_and_one_leaves() {
    let store = Arc::new(InMemoryStore::new());
    let relay = SignalingRelay::new(store.clone(), RelayConfig::default());

    let (a, mut a_inbox) = relay.connect().await;
    settle(relay.join(&a, "/meet/AAAAA", "u1").await).await;
    assert_eq!(
        drain(&mut a_inbox),
        vec![ServerEvent::UserJoined(a.clone(), vec![a.clone()])]
    );
    let group = store.find_group("AAAAA").await.unwrap().unwrap();
    assert_eq!(group.members, vec!["u1".to_owned()]);

    let (b, mut b_inbox) = relay.connect().await;
    settle(relay.join(&b, "/meet/AAAAA", "u2").await).await;
    let joined = ServerEvent::UserJoined(b.clone(), vec![a.clone(), b.clone()]);
    assert_eq!(drain(&mut a_inbox), vec![joined.clone()]);
    assert_eq!(drain(&mut b_inbox), vec![joined]);

    settle(relay.chat(&a, "hello", "u1").await).await;
    let chat = ServerEvent::ChatMessage("hello".to_owned(), "u1".to_owned(), a.clone());
    assert_eq!(drain(&mut a_inbox), vec![chat.clone()]);
    assert_eq!(drain(&mut b_inbox), vec![chat]);

    relay.disconnect(&b).await;
    assert_eq!(drain(&mut a_inbox), vec![ServerEvent::UserLeft(b.clone())]);
    assert_eq!(relay.members_of("/meet/AAAAA").await, vec![a.clone()]);

    let group = store.find_group("AAAAA").await.unwrap().unwrap();
    assert_eq!(group.members, vec!["u1".to_owned(), "u2".to_owned()]);
    assert_eq!(group.messages.len(), 1);
}

#[tokio::test]
async fn peers_exchange_offer_and_answer() {
    let relay = SignalingRelay::new(Arc::new(InMemoryStore::new()), RelayConfig::default());
    let (a, mut a_inbox) = relay.connect().await;
    let (b, mut b_inbox) = relay.connect().await;

    let offer = json!({"type": "offer", "sdp": "v=0 a"});
    let answer = json!({"type": "answer", "sdp": "v=0 b"});
    relay
        .handle(&a, ClientEvent::Signal(b.clone(), offer.clone()))
        .await;
    relay
        .handle(&b, ClientEvent::Signal(a.clone(), answer.clone()))
        .await;

    assert_eq!(drain(&mut b_inbox), vec![ServerEvent::Signal(a.clone(), offer)]);
    assert_eq!(drain(&mut a_inbox), vec![ServerEvent::Signal(b, answer)]);
}

#[tokio::test]
async fn concurrent_joins_keep_every_member_once() {
    let relay = Arc::new(SignalingRelay::new(
        Arc::new(InMemoryStore::new()),
        RelayConfig::default(),
    ));

    let mut ids = Vec::new();
    let mut inboxes = Vec::new();
    for _ in 0..16 {
        let (id, inbox) = relay.connect().await;
        ids.push(id);
        inboxes.push(inbox);
    }

    let tasks: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let relay = relay.clone();
            tokio::spawn(async move { relay.join(&id, "/meet/party", "").await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    let mut members = relay.members_of("/meet/party").await;
    assert_eq!(members.len(), ids.len());
    members.sort_by(|x, y| x.as_str().cmp(y.as_str()));
    members.dedup();
    assert_eq!(members.len(), ids.len());
}

/// Never answers; every call outlives the relay's timeout.
struct StalledStore;

#[async_trait]
impl Store for StalledStore {
    async fn find_user(&self, _: &str) -> Result<Option<User>, StoreError> {
        std::future::pending().await
    }
    async fn create_user(&self, _: &str) -> Result<User, StoreError> {
        std::future::pending().await
    }
    async fn save_user(&self, _: &User) -> Result<(), StoreError> {
        std::future::pending().await
    }
    async fn add_user_group(&self, _: &str, _: &str) -> Result<bool, StoreError> {
        std::future::pending().await
    }
    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        std::future::pending().await
    }
    async fn delete_user(&self, _: &str) -> Result<bool, StoreError> {
        std::future::pending().await
    }
    async fn find_group(&self, _: &str) -> Result<Option<Group>, StoreError> {
        std::future::pending().await
    }
    async fn create_group(&self, _: &str, _: Option<&str>) -> Result<Group, StoreError> {
        std::future::pending().await
    }
    async fn save_group(&self, _: &Group) -> Result<(), StoreError> {
        std::future::pending().await
    }
    async fn add_group_member(&self, _: &str, _: &str) -> Result<bool, StoreError> {
        std::future::pending().await
    }
    async fn append_group_message(&self, _: &str, _: &ChatRecordRef) -> Result<bool, StoreError> {
        std::future::pending().await
    }
    async fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        std::future::pending().await
    }
    async fn delete_group(&self, _: &str) -> Result<bool, StoreError> {
        std::future::pending().await
    }
    async fn create_chat_record(&self, _: &str, _: &str) -> Result<ChatRecordRef, StoreError> {
        std::future::pending().await
    }
    async fn chat_records(&self, _: &[ChatRecordRef]) -> Result<Vec<ChatRecord>, StoreError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn stalled_store_is_bounded_by_timeout() {
    let relay = SignalingRelay::new(
        Arc::new(StalledStore),
        RelayConfig {
            store_timeout: Duration::from_millis(20),
            store_attempts: 2,
            ..RelayConfig::default()
        },
    );
    let (a, mut a_inbox) = relay.connect().await;

    let linking = relay.join(&a, "/meet/AAAAA", "u1").await;
    assert_eq!(
        drain(&mut a_inbox),
        vec![ServerEvent::UserJoined(a.clone(), vec![a])]
    );

    tokio::time::timeout(Duration::from_secs(2), settle(linking))
        .await
        .expect("durable linking gave up after its attempts");
}

#[tokio::test]
async fn slow_store_does_not_hold_back_signaling() {
    let relay = SignalingRelay::new(
        Arc::new(StalledStore),
        RelayConfig {
            store_timeout: Duration::from_millis(400),
            store_attempts: 2,
            ..RelayConfig::default()
        },
    );
    let (a, _a_inbox) = relay.connect().await;
    let (b, mut b_inbox) = relay.connect().await;
    relay.handle(&a, join("/meet/AAAAA", "u1")).await;
    relay.handle(&b, join("/meet/AAAAA", "u2")).await;
    drain(&mut b_inbox);

    let started = Instant::now();
    relay
        .handle(&a, ClientEvent::ChatMessage("hi".to_owned(), "u1".to_owned()))
        .await;
    let candidate = json!({"candidate": "a=1"});
    relay
        .handle(&a, ClientEvent::Signal(b.clone(), candidate.clone()))
        .await;

    assert!(started.elapsed() < Duration::from_millis(200));
    assert_eq!(
        drain(&mut b_inbox),
        vec![
            ServerEvent::ChatMessage("hi".to_owned(), "u1".to_owned(), a.clone()),
            ServerEvent::Signal(a, candidate),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_chats_are_all_archived() {
    let store = Arc::new(SqliteStore::connect("sqlite::memory:", 1).await.unwrap());
    let relay = Arc::new(SignalingRelay::new(store.clone(), RelayConfig::default()));

    let mut peers = Vec::new();
    for i in 0..8 {
        let (id, inbox) = relay.connect().await;
        settle(relay.join(&id, "/m/AAAAA", &format!("u{i}")).await).await;
        peers.push((id, inbox));
    }

    let chats: Vec<_> = peers
        .iter()
        .enumerate()
        .map(|(i, (id, _))| {
            let relay = relay.clone();
            let id = id.clone();
            tokio::spawn(async move { relay.chat(&id, &format!("m{i}"), &format!("u{i}")).await })
        })
        .collect();
    for chat in chats {
        settle(chat.await.unwrap()).await;
    }

    let group = store.find_group("AAAAA").await.unwrap().unwrap();
    assert_eq!(group.members.len(), 8);
    assert_eq!(group.messages.len(), 8);
    let mut contents: Vec<_> = store
        .chat_records(&group.messages)
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.content)
        .collect();
    contents.sort();
    assert_eq!(contents, (0..8).map(|i| format!("m{i}")).collect::<Vec<_>>());
}
