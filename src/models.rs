use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An authenticated participant. Privileged actors are the administrators
/// every ordinary actor can reach.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub id: String,
    pub display_name: String,
    pub email: String,
    #[serde(default)]
    pub is_privileged: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentMeta {
    pub url: String,
    pub file_name: String,
    pub size_bytes: u64,
    pub mime_type: String,
}

/// Delivery/deletion status of a message.
///
/// Moves forward only: `Sent -> [Delivered] -> Read`, or
/// `Sent -> Deleting -> Deleted`. `Deleted` is terminal.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Sent = 0,      // Accepted locally or by the server
    Delivered = 1, // Confirmed by the server
    Read = 2,      // Read by the receiver
    Deleting = 3,  // Delete request in flight
    Deleted = 4,   // Tombstone
}

impl LifecycleState {
    pub fn can_advance_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        match (self, next) {
            (Sent, Delivered) | (Sent, Read) | (Delivered, Read) => true,
            (Sent, Deleting) | (Delivered, Deleting) | (Read, Deleting) => true,
            (Deleting, Deleted) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == LifecycleState::Deleted
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub body: Option<String>,
    pub kind: MessageKind,
    pub attachment: Option<AttachmentMeta>,
    pub reply_to_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
    pub lifecycle_state: LifecycleState,
}

impl Message {
    /// Id of the other side of the conversation, seen from `actor_id`.
    /// `None` if the actor is not a party to this message.
    pub fn counterpart_of(&self, actor_id: &str) -> Option<&str> {
        if self.sender_id == actor_id {
            Some(&self.receiver_id)
        } else if self.receiver_id == actor_id {
            Some(&self.sender_id)
        } else {
            None
        }
    }

    /// True if the message belongs to the pairwise conversation between
    /// `actor_id` and `counterpart_id`, in either direction.
    pub fn belongs_to(&self, actor_id: &str, counterpart_id: &str) -> bool {
        self.counterpart_of(actor_id) == Some(counterpart_id)
    }

    pub fn is_unread_for(&self, actor_id: &str) -> bool {
        self.receiver_id == actor_id && self.read_at.is_none()
    }

    pub fn is_tombstone(&self) -> bool {
        self.lifecycle_state == LifecycleState::Deleted
    }

    /// Advance the lifecycle, refusing backwards moves.
    pub fn advance(&mut self, next: LifecycleState) -> bool {
        if self.lifecycle_state.can_advance_to(next) {
            self.lifecycle_state = next;
            if next == LifecycleState::Deleted {
                self.body = None;
                self.attachment = None;
            }
            true
        } else {
            false
        }
    }

    /// Text shown in previews and the CLI.
    pub fn preview_text(&self) -> String {
        if self.is_tombstone() {
            return "This message was deleted".to_string();
        }
        match (&self.body, &self.attachment) {
            (Some(body), _) if !body.is_empty() => body.clone(),
            (_, Some(att)) => match self.kind {
                MessageKind::Image => format!("[image] {}", att.file_name),
                _ => format!("[file] {}", att.file_name),
            },
            _ => String::new(),
        }
    }
}

/// Derived per-counterpart view, recomputed on every directory refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub counterpart: Actor,
    pub last_message: Message,
    pub unread_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
}

#[derive(Debug, Clone)]
pub struct ConversationPage {
    pub messages: Vec<Message>,
    pub counterpart: Actor,
    pub pagination: Pagination,
}

/// Account record returned by the privileged user listing.
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn into_actor(self) -> Actor {
        let display_name = match self.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => self.email.clone(),
        };
        Actor {
            id: self.id,
            display_name,
            email: self.email,
            is_privileged: self.is_admin,
            avatar_ref: None,
        }
    }
}
