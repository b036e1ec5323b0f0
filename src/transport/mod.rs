// Backend seam for the messaging core
// The server is the durable source of truth; everything here is request/response.

use async_trait::async_trait;

use crate::messaging::ChatError;
use crate::messaging::attachments::AttachmentFile;
use crate::models::{Actor, ConversationPage, Message, UserRecord};

pub mod http;
pub mod wire;

pub use http::HttpTransport;

/// One row of the conversation listing as the backend reports it
#[derive(Debug, Clone)]
pub struct ConversationSummary {
    pub counterpart: Actor,
    pub last_message: Message,
    pub unread_count: u32,
}

/// Payload for `send_message`
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub receiver_id: String,
    pub body: Option<String>,
    pub file: Option<AttachmentFile>,
    pub reply_to: Option<String>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ChatError>;

    async fn get_conversation(
        &self,
        counterpart_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<ConversationPage, ChatError>;

    /// The server assigns the id and timestamps
    async fn send_message(&self, message: OutgoingMessage) -> Result<Message, ChatError>;

    async fn delete_message(&self, id: &str) -> Result<(), ChatError>;

    async fn mark_read(&self, id: &str) -> Result<(), ChatError>;

    /// Privileged accounts only
    async fn list_all_users(&self) -> Result<Vec<UserRecord>, ChatError>;
}
