// src/messaging/mod.rs
//! Client-resident messaging core
//!
//! Holds the open conversation, the conversation directory, compose-time
//! state (attachment draft, reply target) and the background unread poller.
//! Everything talks to the backend through [`crate::transport::Transport`].

use log::debug;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod attachments;
pub mod directory;
pub mod pending;
pub mod reply;
pub mod thread;
pub mod timeline;
pub mod unread;

pub use attachments::{AttachmentDraft, AttachmentFile, AttachmentPipeline, AttachmentPreviews, RenderState};
pub use directory::{Category, ConversationDirectory};
pub use pending::{Intent, OperationStatus, PendingOperation, PendingOperations};
pub use reply::ReplyCoordinator;
pub use thread::ThreadStore;
pub use timeline::{date_separators, TimelineEntry};
pub use unread::UnreadTracker;

/// Largest attachment accepted for upload (10 MiB)
pub const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

/// Errors surfaced by the messaging core
#[derive(Debug, Error)]
pub enum ChatError {
    /// Connectivity failure, timeout, 5xx or an undecodable response
    #[error("Network error: {0}")]
    Network(String),

    /// Rejected locally before any network call, or by server-side validation
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Missing or expired credential
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Unknown message or one that cannot be operated on
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not available: {0}")]
    NotAvailable(String),
}

impl ChatError {
    pub fn is_auth(&self) -> bool {
        matches!(self, ChatError::Auth(_))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Attachment is {size} bytes, limit is {limit} bytes")]
    AttachmentTooLarge { size: u64, limit: u64 },

    #[error("Message has neither text nor attachment")]
    EmptyMessage,

    #[error("Reply target {0} is not part of this conversation")]
    InvalidReplyTarget(String),

    #[error("Attachment rejected: {0}")]
    InvalidAttachment(String),
}

/// Observable events for the hosting application
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    UnreadCountChanged(u32),
    ConversationSelected(String),
    MutationFailed { operation: String, message: String },
}

/// Sending half of the host signal channel. A disconnected or absent
/// receiver is fine; signals are dropped with a debug log.
#[derive(Debug, Clone, Default)]
pub struct Signals {
    tx: Option<mpsc::Sender<Signal>>,
}

impl Signals {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Signal>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    /// Signals that go nowhere
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, signal: Signal) {
        if let Some(tx) = &self.tx {
            // Never block a mutation on a slow host
            if let Err(e) = tx.try_send(signal) {
                debug!("Dropped host signal: {}", e);
            }
        }
    }

    pub fn mutation_failed(&self, operation: &str, error: &ChatError) {
        self.emit(Signal::MutationFailed {
            operation: operation.to_string(),
            message: error.to_string(),
        });
    }
}
