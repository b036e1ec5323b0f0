// JSON shapes exchanged with the backend, and their conversion into models

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::models::{
    Actor, AttachmentMeta, ConversationPage, LifecycleState, Message, MessageKind, Pagination, UserRecord,
};
use super::ConversationSummary;

/// Every response body is wrapped in this envelope
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default = "default_success")]
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

fn default_success() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireAttachment {
    pub url: String,
    pub file_name: String,
    #[serde(default)]
    pub file_size: u64,
    #[serde(default)]
    pub mime_type: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub attachment: Option<WireAttachment>,
    #[serde(default)]
    pub reply_to: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_deleted: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireUser {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireConversation {
    pub user: WireUser,
    pub last_message: WireMessage,
    #[serde(default)]
    pub unread_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WirePagination {
    pub page: u32,
    pub limit: u32,
    #[serde(default)]
    pub has_more: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireConversationPage {
    pub messages: Vec<WireMessage>,
    pub user: WireUser,
    pub pagination: WirePagination,
}

impl WireMessage {
    pub fn into_message(self) -> Message {
        let attachment = self.attachment.map(|a| AttachmentMeta {
            url: a.url,
            file_name: a.file_name,
            size_bytes: a.file_size,
            mime_type: a.mime_type.unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string()),
        });

        let kind = match self.message_type.as_deref() {
            Some("image") => MessageKind::Image,
            Some("file") => MessageKind::File,
            Some("text") => MessageKind::Text,
            _ => match &attachment {
                Some(a) if a.mime_type.starts_with("image/") => MessageKind::Image,
                Some(_) => MessageKind::File,
                None => MessageKind::Text,
            },
        };

        let lifecycle_state = if self.is_deleted {
            LifecycleState::Deleted
        } else if self.read_at.is_some() {
            LifecycleState::Read
        } else {
            LifecycleState::Delivered
        };

        let (body, attachment) = if self.is_deleted {
            (None, None)
        } else {
            (self.message.filter(|m| !m.is_empty()), attachment)
        };

        Message {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            body,
            kind,
            attachment,
            reply_to_id: self.reply_to,
            created_at: self.created_at,
            read_at: self.read_at,
            lifecycle_state,
        }
    }
}

impl WireUser {
    pub fn into_actor(self) -> Actor {
        let avatar_ref = self.avatar.clone();
        let mut actor = self.into_record().into_actor();
        actor.avatar_ref = avatar_ref;
        actor
    }

    pub fn into_record(self) -> UserRecord {
        UserRecord {
            id: self.id,
            name: self.name,
            email: self.email,
            is_admin: self.is_admin,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }
}

impl WireConversation {
    pub fn into_summary(self) -> ConversationSummary {
        ConversationSummary {
            counterpart: self.user.into_actor(),
            last_message: self.last_message.into_message(),
            unread_count: self.unread_count,
        }
    }
}

impl WireConversationPage {
    pub fn into_page(self) -> ConversationPage {
        ConversationPage {
            messages: self.messages.into_iter().map(WireMessage::into_message).collect(),
            counterpart: self.user.into_actor(),
            pagination: Pagination {
                page: self.pagination.page,
                limit: self.pagination.limit,
                has_more: self.pagination.has_more,
            },
        }
    }
}
