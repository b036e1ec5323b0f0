//! Message thread store
//!
//! Authoritative in-memory view of the one open conversation. Sends and
//! deletes are applied optimistically, tracked in [`PendingOperations`] by
//! local id and reconciled against the server response by that key. The
//! store lock is never held across a network call.

use chrono::Utc;
use futures::future::join_all;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;

use crate::models::{Actor, AttachmentMeta, LifecycleState, Message, MessageKind, Pagination};
use crate::transport::{OutgoingMessage, Transport};
use super::attachments::{AttachmentDraft, AttachmentPipeline};
use super::pending::{is_local_id, OperationStatus, PendingOperation, PendingOperations};
use super::reply::ReplyCoordinator;
use super::{ChatError, Signals, ValidationError, MAX_ATTACHMENT_BYTES};

#[derive(Debug, Default)]
struct ThreadState {
    counterpart_id: Option<String>,
    counterpart: Option<Actor>,
    messages: Vec<Message>,
    pending: PendingOperations,
    pagination: Option<Pagination>,
}

impl ThreadState {
    fn position(&self, message_id: &str) -> Option<usize> {
        self.messages.iter().position(|m| m.id == message_id)
    }

    /// Clear the thread. Reopening the same conversation keeps sends that
    /// are still in flight so their confirmations have somewhere to land.
    fn reset(&mut self, counterpart_id: Option<String>) {
        let reopening = counterpart_id.is_some() && counterpart_id == self.counterpart_id;
        if reopening {
            self.messages.retain(|m| is_local_id(&m.id));
            let kept: Vec<String> = self.messages.iter().map(|m| m.id.clone()).collect();
            self.pending.retain_sends(&kept);
        } else {
            self.messages.clear();
            self.pending.clear();
        }
        self.counterpart_id = counterpart_id;
        self.counterpart = None;
        self.pagination = None;
    }

    fn open_counterpart(&self) -> Result<String, ChatError> {
        self.counterpart_id
            .clone()
            .ok_or_else(|| ChatError::NotFound("No conversation is open".to_string()))
    }
}

pub struct ThreadStore<T: Transport> {
    transport: Arc<T>,
    actor: Actor,
    page_size: u32,
    signals: Signals,
    state: Arc<TokioMutex<ThreadState>>,
}

impl<T: Transport> Clone for ThreadStore<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            actor: self.actor.clone(),
            page_size: self.page_size,
            signals: self.signals.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T: Transport + 'static> ThreadStore<T> {
    pub fn new(transport: Arc<T>, actor: Actor, page_size: u32, signals: Signals) -> Self {
        Self {
            transport,
            actor,
            page_size: page_size.max(1),
            signals,
            state: Arc::new(TokioMutex::new(ThreadState::default())),
        }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    /// Open the conversation with `counterpart_id`, replacing whatever was
    /// shown. On failure the thread stays empty apart from sends still in flight.
    pub async fn load(&self, counterpart_id: &str) -> Result<(), ChatError> {
        info!("Loading conversation with {}", counterpart_id);
        self.state.lock().await.reset(Some(counterpart_id.to_string()));

        let page = self
            .transport
            .get_conversation(counterpart_id, 1, self.page_size)
            .await;

        let page = match page {
            Ok(page) => page,
            Err(e) => {
                warn!("Failed to load conversation with {}: {}", counterpart_id, e);
                return Err(e);
            }
        };

        let mut state = self.state.lock().await;
        if state.counterpart_id.as_deref() != Some(counterpart_id) {
            debug!("Discarding history for {}, another conversation was opened", counterpart_id);
            return Ok(());
        }

        let mut messages = self.own_messages(page.messages, counterpart_id);
        messages.sort_by_key(|m| m.created_at);
        debug!("Loaded {} messages with {}", messages.len(), counterpart_id);

        // Entries added since the reset (in-flight or just confirmed sends) go after history
        let carried: Vec<Message> = std::mem::take(&mut state.messages)
            .into_iter()
            .filter(|m| !messages.iter().any(|loaded| loaded.id == m.id))
            .collect();
        messages.extend(carried);

        state.messages = messages;
        state.counterpart = Some(page.counterpart);
        state.pagination = Some(page.pagination);
        Ok(())
    }

    /// Prepend the next page of older history. Returns how many messages were added.
    pub async fn load_older(&self) -> Result<usize, ChatError> {
        let (counterpart_id, next_page) = {
            let state = self.state.lock().await;
            let counterpart_id = state.open_counterpart()?;
            match state.pagination {
                Some(p) if p.has_more => (counterpart_id, p.page + 1),
                _ => return Ok(0),
            }
        };

        let page = self
            .transport
            .get_conversation(&counterpart_id, next_page, self.page_size)
            .await?;

        let mut state = self.state.lock().await;
        if state.counterpart_id.as_deref() != Some(counterpart_id.as_str()) {
            return Ok(0);
        }

        let mut older: Vec<Message> = self
            .own_messages(page.messages, &counterpart_id)
            .into_iter()
            .filter(|m| state.position(&m.id).is_none())
            .collect();
        older.sort_by_key(|m| m.created_at);
        let added = older.len();

        older.append(&mut state.messages);
        state.messages = older;
        state.pagination = Some(page.pagination);
        debug!("Prepended {} older messages (page {})", added, next_page);
        Ok(added)
    }

    fn own_messages(&self, messages: Vec<Message>, counterpart_id: &str) -> Vec<Message> {
        messages
            .into_iter()
            .filter(|m| {
                let ours = m.belongs_to(&self.actor.id, counterpart_id);
                if !ours {
                    warn!("Dropping message {} that is not part of this conversation", m.id);
                }
                ours
            })
            .collect()
    }

    /// Optimistically append a message and send it.
    ///
    /// The temporary entry is replaced in place by the server's copy on
    /// success and removed entirely on failure.
    pub async fn send(
        &self,
        body: Option<String>,
        draft: Option<&AttachmentDraft>,
        reply_to_id: Option<String>,
    ) -> Result<Message, ChatError> {
        let body = body.filter(|b| !b.trim().is_empty());
        if body.is_none() && draft.is_none() {
            return Err(ValidationError::EmptyMessage.into());
        }
        if let Some(draft) = draft {
            let size = draft.file.size_bytes();
            if size > MAX_ATTACHMENT_BYTES {
                return Err(ValidationError::AttachmentTooLarge { size, limit: MAX_ATTACHMENT_BYTES }.into());
            }
        }

        let (receiver_id, local_id) = {
            let mut state = self.state.lock().await;
            let receiver_id = state.open_counterpart()?;

            if let Some(reply_id) = &reply_to_id {
                let valid = state
                    .messages
                    .iter()
                    .any(|m| &m.id == reply_id && !m.is_tombstone() && !is_local_id(&m.id));
                if !valid {
                    return Err(ValidationError::InvalidReplyTarget(reply_id.clone()).into());
                }
            }

            let local_id = state.pending.begin_send();
            let temporary = self.temporary_message(&local_id, &receiver_id, &body, draft, &reply_to_id);
            state.messages.push(temporary);
            (receiver_id, local_id)
        };

        debug!("Sending {} to {}", local_id, receiver_id);
        let result = self
            .transport
            .send_message(OutgoingMessage {
                receiver_id: receiver_id.clone(),
                body,
                file: draft.map(|d| d.file.clone()),
                reply_to: reply_to_id,
            })
            .await;

        let mut state = self.state.lock().await;
        match result {
            Ok(confirmed) => {
                state.pending.settle(&local_id, OperationStatus::Succeeded);
                let already_present = state.position(&confirmed.id).is_some();
                match state.position(&local_id) {
                    Some(idx) if already_present => {
                        state.messages.remove(idx);
                    }
                    Some(idx) => state.messages[idx] = confirmed.clone(),
                    _ if already_present => {}
                    _ if state.counterpart_id.as_deref() == Some(receiver_id.as_str()) => {
                        // The thread was reset while the send was in flight
                        debug!("Appending {} confirmed after a reload", confirmed.id);
                        state.messages.push(confirmed.clone());
                    }
                    _ => debug!("Conversation with {} closed, not showing {}", receiver_id, confirmed.id),
                }
                info!("Message {} confirmed as {}", local_id, confirmed.id);
                Ok(confirmed)
            }
            Err(e) => {
                if state.pending.settle(&local_id, OperationStatus::Failed).is_some() {
                    if let Some(idx) = state.position(&local_id) {
                        state.messages.remove(idx);
                    }
                }
                drop(state);
                warn!("Send {} failed: {}", local_id, e);
                self.signals.mutation_failed("send", &e);
                Err(e)
            }
        }
    }

    /// Send using the compose-time state. The draft and reply target are
    /// consumed on success and kept on failure.
    pub async fn send_composed(
        &self,
        body: Option<String>,
        attachments: &mut AttachmentPipeline,
        reply: &mut ReplyCoordinator,
    ) -> Result<Message, ChatError> {
        let reply_to_id = reply.target_id().map(str::to_string);
        let result = self.send(body, attachments.draft(), reply_to_id).await;
        match &result {
            Ok(_) => {
                attachments.clear_draft();
                reply.on_send_succeeded();
            }
            Err(_) => reply.on_send_failed(),
        }
        result
    }

    fn temporary_message(
        &self,
        local_id: &str,
        receiver_id: &str,
        body: &Option<String>,
        draft: Option<&AttachmentDraft>,
        reply_to_id: &Option<String>,
    ) -> Message {
        let (kind, attachment) = match draft {
            Some(d) => (
                if d.file.is_image() { MessageKind::Image } else { MessageKind::File },
                Some(AttachmentMeta {
                    url: d.preview_url.clone().unwrap_or_default(),
                    file_name: d.file.file_name.clone(),
                    size_bytes: d.file.size_bytes(),
                    mime_type: d.file.mime_type.to_string(),
                }),
            ),
            None => (MessageKind::Text, None),
        };

        Message {
            id: local_id.to_string(),
            sender_id: self.actor.id.clone(),
            receiver_id: receiver_id.to_string(),
            body: body.clone(),
            kind,
            attachment,
            reply_to_id: reply_to_id.clone(),
            // Display only; ordering is by append position
            created_at: Utc::now(),
            read_at: None,
            lifecycle_state: LifecycleState::Sent,
        }
    }

    /// Delete a message, showing it as `Deleting` until the server answers.
    /// Deleting a tombstone, or a message already being deleted, does nothing.
    pub async fn delete(&self, message_id: &str) -> Result<(), ChatError> {
        let local_id = {
            let mut state = self.state.lock().await;
            let idx = state
                .position(message_id)
                .ok_or_else(|| ChatError::NotFound(format!("Message {} is not in this conversation", message_id)))?;

            let current = state.messages[idx].lifecycle_state;
            if current == LifecycleState::Deleted || current == LifecycleState::Deleting {
                debug!("Delete of {} ignored, already {:?}", message_id, current);
                return Ok(());
            }
            if is_local_id(message_id) {
                return Err(ChatError::NotFound(format!("Message {} is not confirmed yet", message_id)));
            }

            let snapshot = state.messages[idx].clone();
            let local_id = state.pending.begin_delete(snapshot);
            state.messages[idx].advance(LifecycleState::Deleting);
            local_id
        };

        let result = self.transport.delete_message(message_id).await;

        let mut state = self.state.lock().await;
        match result {
            Ok(()) => {
                state.pending.settle(&local_id, OperationStatus::Succeeded);
                // A reload may have brought the entry back in its pre-delete state
                if let Some(idx) = state.position(message_id) {
                    let message = &mut state.messages[idx];
                    message.advance(LifecycleState::Deleting);
                    message.advance(LifecycleState::Deleted);
                }
                info!("Message {} deleted", message_id);
                Ok(())
            }
            Err(e) => {
                if let Some(op) = state.pending.settle(&local_id, OperationStatus::Failed) {
                    if let (Some(idx), Some(snapshot)) = (state.position(message_id), op.snapshot) {
                        state.messages[idx] = snapshot;
                    }
                }
                drop(state);
                warn!("Delete of {} failed: {}", message_id, e);
                self.signals.mutation_failed("delete", &e);
                Err(e)
            }
        }
    }

    /// Set `read_at` locally and tell the server in the background. Server
    /// failures are logged and never rolled back. Returns the background task
    /// when something was marked.
    pub async fn mark_read(&self, message_id: &str) -> Option<JoinHandle<()>> {
        {
            let mut state = self.state.lock().await;
            let idx = state.position(message_id)?;
            let message = &mut state.messages[idx];
            if !message.is_unread_for(&self.actor.id) || message.is_tombstone() || is_local_id(message_id) {
                return None;
            }
            message.read_at = Some(Utc::now());
            message.advance(LifecycleState::Read);
        }

        let transport = self.transport.clone();
        let id = message_id.to_string();
        Some(tokio::spawn(async move {
            match transport.mark_read(&id).await {
                Ok(()) => debug!("Marked {} read", id),
                Err(e) => warn!("Failed to mark {} read: {}", id, e),
            }
        }))
    }

    /// Mark every unread incoming message of the open thread and wait for
    /// the background calls to finish. Returns how many were marked.
    pub async fn mark_conversation_read(&self) -> usize {
        let unread: Vec<String> = {
            let state = self.state.lock().await;
            state
                .messages
                .iter()
                .filter(|m| m.is_unread_for(&self.actor.id) && !m.is_tombstone())
                .map(|m| m.id.clone())
                .collect()
        };

        let mut handles = Vec::with_capacity(unread.len());
        for id in &unread {
            if let Some(handle) = self.mark_read(id).await {
                handles.push(handle);
            }
        }
        let marked = handles.len();
        for joined in join_all(handles).await {
            if let Err(e) = joined {
                warn!("Mark-read task did not complete: {}", e);
            }
        }
        marked
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.state.lock().await.messages.clone()
    }

    pub async fn message(&self, message_id: &str) -> Option<Message> {
        let state = self.state.lock().await;
        state.position(message_id).map(|idx| state.messages[idx].clone())
    }

    pub async fn counterpart_id(&self) -> Option<String> {
        self.state.lock().await.counterpart_id.clone()
    }

    pub async fn counterpart(&self) -> Option<Actor> {
        self.state.lock().await.counterpart.clone()
    }

    pub async fn pagination(&self) -> Option<Pagination> {
        self.state.lock().await.pagination
    }

    pub async fn unread_count(&self) -> u32 {
        let state = self.state.lock().await;
        state
            .messages
            .iter()
            .filter(|m| m.is_unread_for(&self.actor.id))
            .count() as u32
    }

    pub async fn pending_operations(&self) -> Vec<PendingOperation> {
        self.state.lock().await.pending.all()
    }

    pub async fn in_flight_count(&self) -> usize {
        self.state.lock().await.pending.in_flight_count()
    }

    /// Close the conversation
    pub async fn close(&self) {
        self.state.lock().await.reset(None);
    }
}
