// Common test utilities for integration tests
// A scripted in-memory transport that records every call it receives.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::LevelFilter;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, Once};
use tokio::sync::Semaphore;

use deskline::messaging::ChatError;
use deskline::models::{
    Actor, AttachmentMeta, ConversationPage, LifecycleState, Message, MessageKind, Pagination, UserRecord,
};
use deskline::transport::{ConversationSummary, OutgoingMessage, Transport};

static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

pub const STUDENT_ID: &str = "student-1";
pub const ADMIN_ID: &str = "admin-1";

pub fn student() -> Actor {
    Actor {
        id: STUDENT_ID.to_string(),
        display_name: "Sam Student".to_string(),
        email: "sam@example.org".to_string(),
        is_privileged: false,
        avatar_ref: None,
    }
}

pub fn admin() -> Actor {
    Actor {
        id: ADMIN_ID.to_string(),
        display_name: "Ada Admin".to_string(),
        email: "ada@example.org".to_string(),
        is_privileged: true,
        avatar_ref: None,
    }
}

pub fn user(id: &str, name: &str) -> Actor {
    Actor {
        id: id.to_string(),
        display_name: name.to_string(),
        email: format!("{}@example.org", id),
        is_privileged: false,
        avatar_ref: None,
    }
}

/// A server-side message created `minutes_ago`
pub fn message(id: &str, from: &str, to: &str, body: &str, minutes_ago: i64) -> Message {
    Message {
        id: id.to_string(),
        sender_id: from.to_string(),
        receiver_id: to.to_string(),
        body: Some(body.to_string()),
        kind: MessageKind::Text,
        attachment: None,
        reply_to_id: None,
        created_at: Utc::now() - Duration::minutes(minutes_ago),
        read_at: None,
        lifecycle_state: LifecycleState::Delivered,
    }
}

pub fn summary(counterpart: Actor, body: &str, minutes_ago: i64, unread: u32) -> ConversationSummary {
    let last = message(
        &format!("last-{}", counterpart.id),
        &counterpart.id,
        ADMIN_ID,
        body,
        minutes_ago,
    );
    ConversationSummary {
        counterpart,
        last_message: last,
        unread_count: unread,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Network,
    Auth,
}

impl Failure {
    fn error(self) -> ChatError {
        match self {
            Failure::Network => ChatError::Network("scripted network failure".to_string()),
            Failure::Auth => ChatError::Auth("token expired".to_string()),
        }
    }
}

pub struct FakeTransport {
    calls: Mutex<Vec<String>>,
    pages: Mutex<HashMap<(String, u32), ConversationPage>>,
    conversations: Mutex<Vec<ConversationSummary>>,
    users: Mutex<Vec<UserRecord>>,
    sent: Mutex<Vec<OutgoingMessage>>,
    sender_id: Mutex<String>,
    next_id: AtomicU64,
    pub fail_load: Mutex<Option<Failure>>,
    pub fail_send: AtomicBool,
    pub fail_delete: AtomicBool,
    pub fail_mark_read: AtomicBool,
    pub fail_conversations: AtomicBool,
    /// When set, each send waits for a permit before answering
    pub gate_sends: AtomicBool,
    send_gate: Semaphore,
    /// Same for deletes
    pub gate_deletes: AtomicBool,
    delete_gate: Semaphore,
}

impl FakeTransport {
    pub fn new() -> Self {
        FakeTransport {
            calls: Mutex::new(Vec::new()),
            pages: Mutex::new(HashMap::new()),
            conversations: Mutex::new(Vec::new()),
            users: Mutex::new(Vec::new()),
            sent: Mutex::new(Vec::new()),
            sender_id: Mutex::new(STUDENT_ID.to_string()),
            next_id: AtomicU64::new(1),
            fail_load: Mutex::new(None),
            fail_send: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            fail_mark_read: AtomicBool::new(false),
            fail_conversations: AtomicBool::new(false),
            gate_sends: AtomicBool::new(false),
            send_gate: Semaphore::new(0),
            gate_deletes: AtomicBool::new(false),
            delete_gate: Semaphore::new(0),
        }
    }

    /// Serve `messages` as page `page` of the conversation with `counterpart`
    pub fn set_page(&self, counterpart: Actor, page: u32, messages: Vec<Message>, has_more: bool) {
        let key = (counterpart.id.clone(), page);
        self.pages.lock().unwrap().insert(
            key,
            ConversationPage {
                messages,
                counterpart,
                pagination: Pagination { page, limit: 50, has_more },
            },
        );
    }

    /// Author stamped on confirmed sends
    pub fn set_sender(&self, actor_id: &str) {
        *self.sender_id.lock().unwrap() = actor_id.to_string();
    }

    pub fn set_conversations(&self, conversations: Vec<ConversationSummary>) {
        *self.conversations.lock().unwrap() = conversations;
    }

    pub fn set_users(&self, users: Vec<UserRecord>) {
        *self.users.lock().unwrap() = users;
    }

    pub fn release_sends(&self, count: usize) {
        self.send_gate.add_permits(count);
    }

    pub fn release_deletes(&self, count: usize) {
        self.delete_gate.add_permits(count);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ChatError> {
        self.record("list_conversations".to_string());
        if self.fail_conversations.load(Ordering::SeqCst) {
            return Err(Failure::Network.error());
        }
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn get_conversation(
        &self,
        counterpart_id: &str,
        page: u32,
        _limit: u32,
    ) -> Result<ConversationPage, ChatError> {
        self.record(format!("get_conversation:{}:{}", counterpart_id, page));
        if let Some(failure) = *self.fail_load.lock().unwrap() {
            return Err(failure.error());
        }
        self.pages
            .lock()
            .unwrap()
            .get(&(counterpart_id.to_string(), page))
            .cloned()
            .ok_or_else(|| ChatError::NotFound(format!("No conversation with {}", counterpart_id)))
    }

    async fn send_message(&self, outgoing: OutgoingMessage) -> Result<Message, ChatError> {
        self.record("send_message".to_string());
        if self.gate_sends.load(Ordering::SeqCst) {
            if let Ok(permit) = self.send_gate.acquire().await {
                permit.forget();
            }
        }
        if self.fail_send.load(Ordering::SeqCst) {
            return Err(Failure::Network.error());
        }

        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        let attachment = outgoing.file.as_ref().map(|f| AttachmentMeta {
            url: format!("/uploads/{}", f.file_name),
            file_name: f.file_name.clone(),
            size_bytes: f.size_bytes(),
            mime_type: f.mime_type.to_string(),
        });
        let kind = match &outgoing.file {
            Some(f) if f.is_image() => MessageKind::Image,
            Some(_) => MessageKind::File,
            None => MessageKind::Text,
        };
        let confirmed = Message {
            id: format!("srv-{}", n),
            sender_id: self.sender_id.lock().unwrap().clone(),
            receiver_id: outgoing.receiver_id.clone(),
            body: outgoing.body.clone(),
            kind,
            attachment,
            reply_to_id: outgoing.reply_to.clone(),
            created_at: Utc::now(),
            read_at: None,
            lifecycle_state: LifecycleState::Delivered,
        };
        self.sent.lock().unwrap().push(outgoing);
        Ok(confirmed)
    }

    async fn delete_message(&self, id: &str) -> Result<(), ChatError> {
        self.record(format!("delete_message:{}", id));
        if self.gate_deletes.load(Ordering::SeqCst) {
            if let Ok(permit) = self.delete_gate.acquire().await {
                permit.forget();
            }
        }
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Failure::Network.error());
        }
        Ok(())
    }

    async fn mark_read(&self, id: &str) -> Result<(), ChatError> {
        self.record(format!("mark_read:{}", id));
        if self.fail_mark_read.load(Ordering::SeqCst) {
            return Err(Failure::Network.error());
        }
        Ok(())
    }

    async fn list_all_users(&self) -> Result<Vec<UserRecord>, ChatError> {
        self.record("list_all_users".to_string());
        Ok(self.users.lock().unwrap().clone())
    }
}
