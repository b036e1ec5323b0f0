// Pending-operation queue for optimistic mutations
// Every optimistic send/delete gets a record keyed by a local id; reconciliation
// looks the record up by that key, never by position or content. Only
// in-flight records are held; settling removes the record.

use log::debug;
use std::collections::HashMap;
use uuid::Uuid;

use crate::models::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Send,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStatus {
    InFlight,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
pub struct PendingOperation {
    pub local_id: String,
    pub intent: Intent,
    pub status: OperationStatus,
    /// Id of the message entry in the thread. For a send this is the temporary id.
    pub message_id: String,
    /// Entry as it was before a delete, for rollback
    pub snapshot: Option<Message>,
}

#[derive(Debug, Default)]
pub struct PendingOperations {
    ops: HashMap<String, PendingOperation>,
}

/// Temporary ids are UUIDs, so concurrent sends can never collide
pub fn new_local_id() -> String {
    format!("local-{}", Uuid::new_v4())
}

pub fn is_local_id(id: &str) -> bool {
    id.starts_with("local-")
}

impl PendingOperations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an optimistic send. The local id doubles as the temporary message id.
    pub fn begin_send(&mut self) -> String {
        let local_id = new_local_id();
        self.ops.insert(
            local_id.clone(),
            PendingOperation {
                local_id: local_id.clone(),
                intent: Intent::Send,
                status: OperationStatus::InFlight,
                message_id: local_id.clone(),
                snapshot: None,
            },
        );
        debug!("Pending send {}", local_id);
        local_id
    }

    pub fn begin_delete(&mut self, snapshot: Message) -> String {
        let local_id = new_local_id();
        debug!("Pending delete {} for message {}", local_id, snapshot.id);
        self.ops.insert(
            local_id.clone(),
            PendingOperation {
                local_id: local_id.clone(),
                intent: Intent::Delete,
                status: OperationStatus::InFlight,
                message_id: snapshot.id.clone(),
                snapshot: Some(snapshot),
            },
        );
        local_id
    }

    pub fn get(&self, local_id: &str) -> Option<&PendingOperation> {
        self.ops.get(local_id)
    }

    /// Settle and remove the record, returning it with its final status.
    /// `None` if the key is unknown or was already settled.
    pub fn settle(&mut self, local_id: &str, status: OperationStatus) -> Option<PendingOperation> {
        let mut op = self.ops.remove(local_id)?;
        op.status = status;
        debug!("Settled {} as {:?}", local_id, status);
        Some(op)
    }

    pub fn in_flight_count(&self) -> usize {
        self.ops.len()
    }

    pub fn all(&self) -> Vec<PendingOperation> {
        self.ops.values().cloned().collect()
    }

    /// Keep only the sends whose temporary entry is in `message_ids`
    pub fn retain_sends(&mut self, message_ids: &[String]) {
        self.ops
            .retain(|_, op| op.intent == Intent::Send && message_ids.contains(&op.message_id));
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }
}
