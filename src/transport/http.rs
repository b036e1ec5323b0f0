// HTTPS/JSON binding of the Transport trait

use async_trait::async_trait;
use log::{debug, error, warn};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::messaging::{ChatError, ValidationError};
use crate::models::{ConversationPage, Message, UserRecord};
use super::wire::{Envelope, WireConversation, WireConversationPage, WireMessage, WireUser};
use super::{ConversationSummary, OutgoingMessage, Transport};

pub struct HttpTransport {
    client: Client,
    base_url: Url,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, ChatError> {
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ChatError::Network(format!("Invalid base URL {}: {}", config.base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ChatError::Network(format!("Base URL {} cannot hold paths", config.base_url)));
        }

        let token = config
            .get_token()
            .ok_or_else(|| ChatError::Auth("No access token configured".to_string()))?;

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| ChatError::Auth(format!("Access token is not a valid header value: {}", e)))?;
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ChatError::Network(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    /// Base URL extended with `segments`, each percent-encoded as a single path segment
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send a request and unwrap the `{ success, data, message }` envelope.
    /// `Ok(None)` means a successful response without data.
    async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        with_file: bool,
    ) -> Result<Option<T>, ChatError> {
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(map_transport_error)?;

        if !status.is_success() {
            let message = serde_json::from_str::<Envelope<serde_json::Value>>(&text)
                .ok()
                .and_then(|env| env.message)
                .unwrap_or_else(|| status.to_string());
            return Err(map_status(status, message, with_file));
        }

        if text.trim().is_empty() {
            return Ok(None);
        }

        let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|e| {
            error!("Undecodable response body: {}", e);
            ChatError::Network(format!("Malformed response: {}", e))
        })?;

        if !envelope.success {
            let message = envelope.message.unwrap_or_else(|| "Request failed".to_string());
            return Err(ChatError::Network(message));
        }
        Ok(envelope.data)
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ChatError> {
        self.execute(request, false)
            .await?
            .ok_or_else(|| ChatError::Network("Response carried no data".to_string()))
    }
}

fn map_transport_error(e: reqwest::Error) -> ChatError {
    if e.is_timeout() {
        warn!("Request timed out: {}", e);
    }
    ChatError::Network(e.to_string())
}

pub(crate) fn map_status(status: StatusCode, message: String, with_file: bool) -> ChatError {
    match status {
        StatusCode::UNAUTHORIZED => ChatError::Auth(message),
        StatusCode::FORBIDDEN => ChatError::Forbidden(message),
        StatusCode::NOT_FOUND => ChatError::NotFound(message),
        StatusCode::BAD_REQUEST | StatusCode::PAYLOAD_TOO_LARGE | StatusCode::UNPROCESSABLE_ENTITY if with_file => {
            ChatError::Validation(ValidationError::InvalidAttachment(message))
        }
        _ => ChatError::Network(format!("{}: {}", status, message)),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn list_conversations(&self) -> Result<Vec<ConversationSummary>, ChatError> {
        let rows: Vec<WireConversation> = self
            .fetch(self.client.get(self.url(&["messages", "conversations"])))
            .await?;
        debug!("Fetched {} conversations", rows.len());
        Ok(rows.into_iter().map(WireConversation::into_summary).collect())
    }

    async fn get_conversation(
        &self,
        counterpart_id: &str,
        page: u32,
        limit: u32,
    ) -> Result<ConversationPage, ChatError> {
        let request = self
            .client
            .get(self.url(&["messages", "conversation", counterpart_id]))
            .query(&[("page", page), ("limit", limit)]);
        let page: WireConversationPage = self.fetch(request).await?;
        Ok(page.into_page())
    }

    async fn send_message(&self, message: OutgoingMessage) -> Result<Message, ChatError> {
        let with_file = message.file.is_some();
        let mut form = Form::new().text("receiverId", message.receiver_id);

        if let Some(body) = message.body {
            form = form.text("message", body);
        }
        if let Some(file) = message.file {
            let part = Part::bytes(file.data)
                .file_name(file.file_name)
                .mime_str(file.mime_type.as_ref())
                .map_err(|e| ChatError::Validation(ValidationError::InvalidAttachment(e.to_string())))?;
            form = form.part("file", part);
        }
        if let Some(reply_to) = message.reply_to {
            form = form.text("replyTo", reply_to);
        }

        let request = self.client.post(self.url(&["messages", "send"])).multipart(form);
        let sent: WireMessage = self
            .execute(request, with_file)
            .await?
            .ok_or_else(|| ChatError::Network("Send response carried no message".to_string()))?;
        Ok(sent.into_message())
    }

    async fn delete_message(&self, id: &str) -> Result<(), ChatError> {
        let request = self.client.delete(self.url(&["messages", id]));
        self.execute::<serde_json::Value>(request, false).await?;
        Ok(())
    }

    async fn mark_read(&self, id: &str) -> Result<(), ChatError> {
        let request = self.client.put(self.url(&["messages", id, "read"]));
        self.execute::<serde_json::Value>(request, false).await?;
        Ok(())
    }

    async fn list_all_users(&self) -> Result<Vec<UserRecord>, ChatError> {
        let users: Vec<WireUser> = self.fetch(self.client.get(self.url(&["users"]))).await?;
        Ok(users.into_iter().map(WireUser::into_record).collect())
    }
}
