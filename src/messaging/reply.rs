// Compose-time reply target
// At most one target; a new selection replaces the old one.

use log::{debug, info};

use crate::models::Message;
use super::pending::is_local_id;
use super::{ChatError, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    pub message_id: String,
    pub counterpart_id: String,
    pub preview: String,
}

#[derive(Debug, Default)]
pub struct ReplyCoordinator {
    target: Option<ReplyTarget>,
}

impl ReplyCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `message` the reply target for `actor_id`'s next send
    pub fn select(&mut self, message: &Message, actor_id: &str) -> Result<&ReplyTarget, ChatError> {
        let counterpart_id = message
            .counterpart_of(actor_id)
            .ok_or_else(|| ValidationError::InvalidReplyTarget(message.id.clone()))?
            .to_string();

        if message.is_tombstone() {
            return Err(ChatError::NotFound(format!("Message {} was deleted", message.id)));
        }
        if is_local_id(&message.id) {
            return Err(ChatError::NotFound(format!("Message {} is not confirmed yet", message.id)));
        }

        info!("Replying to message {}", message.id);
        Ok(self.target.insert(ReplyTarget {
            message_id: message.id.clone(),
            counterpart_id,
            preview: message.preview_text(),
        }))
    }

    pub fn target(&self) -> Option<&ReplyTarget> {
        self.target.as_ref()
    }

    pub fn target_id(&self) -> Option<&str> {
        self.target.as_ref().map(|t| t.message_id.as_str())
    }

    pub fn clear(&mut self) {
        if self.target.take().is_some() {
            debug!("Reply target cleared");
        }
    }

    /// A successful send consumes the target
    pub fn on_send_succeeded(&mut self) {
        self.clear();
    }

    /// A failed send keeps the target so retry needs no reselection
    pub fn on_send_failed(&mut self) {
        if let Some(target) = &self.target {
            debug!("Keeping reply target {} after failed send", target.message_id);
        }
    }

    /// The target must be a message of the conversation being sent to
    pub fn validate_against(&self, counterpart_id: &str, messages: &[Message]) -> Result<(), ChatError> {
        let Some(target) = &self.target else {
            return Ok(());
        };
        let present = messages.iter().any(|m| m.id == target.message_id);
        if target.counterpart_id != counterpart_id || !present {
            return Err(ValidationError::InvalidReplyTarget(target.message_id.clone()).into());
        }
        Ok(())
    }

    /// Editing is part of the interface, but the backend has no edit operation
    pub fn edit(&self, message_id: &str, _body: &str) -> Result<(), ChatError> {
        debug!("Edit requested for {}", message_id);
        Err(ChatError::NotAvailable("Editing messages is not available".to_string()))
    }
}
