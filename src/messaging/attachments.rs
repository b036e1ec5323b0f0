//! Attachment staging and per-attachment preview state
//!
//! A draft is validated and held until the next send. Preview rendering of
//! attachments already in the thread is tracked separately per message and
//! never looks at the message's delivery state.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use log::{debug, info, warn};
use mime::Mime;
use std::collections::HashMap;
use std::path::Path;

use crate::models::Message;
use super::{ChatError, ValidationError, MAX_ATTACHMENT_BYTES};

/// Raw file picked by the user
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentFile {
    pub file_name: String,
    pub mime_type: Mime,
    pub data: Vec<u8>,
}

impl AttachmentFile {
    pub fn new(file_name: &str, mime_type: Mime, data: Vec<u8>) -> Self {
        AttachmentFile {
            file_name: file_name.to_string(),
            mime_type,
            data,
        }
    }

    /// Read a file from disk, guessing its type from the extension
    pub async fn from_path(path: &Path) -> Result<Self, ChatError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ValidationError::InvalidAttachment(format!("No file name in {}", path.display())))?
            .to_string();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| ValidationError::InvalidAttachment(format!("{}: {}", path.display(), e)))?;
        // Refuse before reading a huge file into memory
        check_size(metadata.len())?;

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| ValidationError::InvalidAttachment(format!("{}: {}", path.display(), e)))?;

        Ok(AttachmentFile {
            mime_type: mime_from_file_name(&file_name),
            file_name,
            data,
        })
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.type_() == mime::IMAGE
    }
}

pub fn mime_from_file_name(file_name: &str) -> Mime {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => mime::IMAGE_PNG,
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "gif" => mime::IMAGE_GIF,
        "bmp" => mime::IMAGE_BMP,
        "svg" => mime::IMAGE_SVG,
        "webp" => "image/webp".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        "pdf" => mime::APPLICATION_PDF,
        "txt" => mime::TEXT_PLAIN,
        "csv" => mime::TEXT_CSV,
        "json" => mime::APPLICATION_JSON,
        "doc" => "application/msword".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            .parse()
            .unwrap_or(mime::APPLICATION_OCTET_STREAM),
        "zip" => "application/zip".parse().unwrap_or(mime::APPLICATION_OCTET_STREAM),
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}

fn check_size(size: u64) -> Result<(), ValidationError> {
    if size > MAX_ATTACHMENT_BYTES {
        return Err(ValidationError::AttachmentTooLarge {
            size,
            limit: MAX_ATTACHMENT_BYTES,
        });
    }
    Ok(())
}

/// Staged attachment, local only
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentDraft {
    pub file: AttachmentFile,
    /// `data:` URL for image drafts
    pub preview_url: Option<String>,
}

impl AttachmentDraft {
    fn stage(file: AttachmentFile) -> Self {
        let preview_url = if file.is_image() {
            Some(format!("data:{};base64,{}", file.mime_type, BASE64.encode(&file.data)))
        } else {
            None
        };
        AttachmentDraft { file, preview_url }
    }
}

/// Holds at most one draft at a time
#[derive(Debug, Default)]
pub struct AttachmentPipeline {
    draft: Option<AttachmentDraft>,
}

impl AttachmentPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and stage `file`, replacing any earlier draft. An oversized
    /// file leaves the current draft untouched.
    pub fn select_file(&mut self, file: AttachmentFile) -> Result<&AttachmentDraft, ChatError> {
        if let Err(e) = check_size(file.size_bytes()) {
            warn!("Rejected attachment {}: {}", file.file_name, e);
            return Err(e.into());
        }
        info!("Staged attachment {} ({} bytes, {})", file.file_name, file.size_bytes(), file.mime_type);
        Ok(self.draft.insert(AttachmentDraft::stage(file)))
    }

    pub fn clear_draft(&mut self) {
        if self.draft.take().is_some() {
            debug!("Attachment draft cleared");
        }
    }

    pub fn draft(&self) -> Option<&AttachmentDraft> {
        self.draft.as_ref()
    }
}

/// Preview render state of one displayed attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderState {
    Loading,
    Loaded,
    Error(String),
}

/// Render states keyed by message id
#[derive(Debug, Default)]
pub struct AttachmentPreviews {
    states: HashMap<String, RenderState>,
}

impl AttachmentPreviews {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking every attachment in `messages` and drop entries whose
    /// message is gone or tombstoned.
    pub fn sync_with(&mut self, messages: &[Message]) {
        self.states.retain(|id, _| {
            messages
                .iter()
                .any(|m| &m.id == id && m.attachment.is_some() && !m.is_tombstone())
        });
        for message in messages {
            self.track(message);
        }
    }

    /// Returns true if the message was newly registered as `Loading`
    pub fn track(&mut self, message: &Message) -> bool {
        if message.attachment.is_none() || message.is_tombstone() || self.states.contains_key(&message.id) {
            return false;
        }
        self.states.insert(message.id.clone(), RenderState::Loading);
        true
    }

    pub fn state(&self, message_id: &str) -> Option<&RenderState> {
        self.states.get(message_id)
    }

    pub fn mark_loaded(&mut self, message_id: &str) -> bool {
        self.transition(message_id, |state| match state {
            RenderState::Loading => Some(RenderState::Loaded),
            _ => None,
        })
    }

    pub fn mark_failed(&mut self, message_id: &str, reason: &str) -> bool {
        self.transition(message_id, |state| match state {
            RenderState::Loading => Some(RenderState::Error(reason.to_string())),
            _ => None,
        })
    }

    /// Manual retry, only from `Error`
    pub fn retry(&mut self, message_id: &str) -> bool {
        self.transition(message_id, |state| match state {
            RenderState::Error(_) => Some(RenderState::Loading),
            _ => None,
        })
    }

    fn transition<F>(&mut self, message_id: &str, next: F) -> bool
    where
        F: FnOnce(&RenderState) -> Option<RenderState>,
    {
        let Some(state) = self.states.get_mut(message_id) else {
            debug!("No preview tracked for message {}", message_id);
            return false;
        };
        match next(state) {
            Some(new_state) => {
                debug!("Preview {} {:?} -> {:?}", message_id, state, new_state);
                *state = new_state;
                true
            }
            None => {
                debug!("Ignored preview transition for {} in {:?}", message_id, state);
                false
            }
        }
    }
}
