//! Conversation directory
//!
//! The list of conversations for the current actor, rebuilt from scratch on
//! every refresh. A failed refresh keeps the last good list.

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;

use crate::models::{Actor, Conversation};
use crate::transport::{ConversationSummary, Transport};
use super::{ChatError, Signal, Signals};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    All,
    Unread,
    /// Last message within the past 24 hours
    Recent,
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(Category::All),
            "unread" => Ok(Category::Unread),
            "recent" | "recent-24h" => Ok(Category::Recent),
            other => Err(format!("Unknown category '{}' (expected all, unread or recent)", other)),
        }
    }
}

#[derive(Debug, Default)]
struct DirectoryState {
    conversations: Vec<Conversation>,
    last_refreshed: Option<DateTime<Utc>>,
}

pub struct ConversationDirectory<T: Transport> {
    transport: Arc<T>,
    actor: Actor,
    signals: Signals,
    state: Arc<TokioMutex<DirectoryState>>,
}

impl<T: Transport> Clone for ConversationDirectory<T> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            actor: self.actor.clone(),
            signals: self.signals.clone(),
            state: self.state.clone(),
        }
    }
}

impl<T: Transport> ConversationDirectory<T> {
    pub fn new(transport: Arc<T>, actor: Actor, signals: Signals) -> Self {
        Self {
            transport,
            actor,
            signals,
            state: Arc::new(TokioMutex::new(DirectoryState::default())),
        }
    }

    /// Replace the whole list from the backend. Returns the number of conversations.
    pub async fn refresh(&self) -> Result<usize, ChatError> {
        let summaries = match self.transport.list_conversations().await {
            Ok(summaries) => summaries,
            Err(e) => {
                warn!("Conversation refresh failed, keeping previous list: {}", e);
                return Err(e);
            }
        };

        let conversations = build_conversations(&self.actor.id, summaries);
        let count = conversations.len();

        let mut state = self.state.lock().await;
        state.conversations = conversations;
        state.last_refreshed = Some(Utc::now());
        debug!("Directory refreshed with {} conversations", count);
        Ok(count)
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.state.lock().await.conversations.clone()
    }

    pub async fn last_refreshed(&self) -> Option<DateTime<Utc>> {
        self.state.lock().await.last_refreshed
    }

    /// Derived view over the current list; never touches the network
    pub async fn filter(&self, search: &str, category: Category) -> Vec<Conversation> {
        self.filter_at(search, category, Utc::now()).await
    }

    pub async fn filter_at(&self, search: &str, category: Category, now: DateTime<Utc>) -> Vec<Conversation> {
        let state = self.state.lock().await;
        filter_conversations(&state.conversations, search, category, now)
    }

    /// Announce that the host opened the conversation with `counterpart_id`
    pub async fn select(&self, counterpart_id: &str) -> Option<Conversation> {
        info!("Conversation with {} selected", counterpart_id);
        self.signals.emit(Signal::ConversationSelected(counterpart_id.to_string()));
        let state = self.state.lock().await;
        state
            .conversations
            .iter()
            .find(|c| c.counterpart.id == counterpart_id)
            .cloned()
    }

    /// Every account a privileged actor can start a conversation with,
    /// including accounts that have never messaged
    pub async fn list_all_counterparts(&self) -> Result<Vec<Actor>, ChatError> {
        if !self.actor.is_privileged {
            return Err(ChatError::Forbidden(
                "Only administrators can list all users".to_string(),
            ));
        }

        let users = self.transport.list_all_users().await?;
        let mut counterparts: Vec<Actor> = users
            .into_iter()
            .filter(|u| u.id != self.actor.id && !u.is_admin)
            .map(|u| u.into_actor())
            .collect();
        counterparts.sort_by_key(|a| a.display_name.to_lowercase());
        debug!("{} potential counterparts", counterparts.len());
        Ok(counterparts)
    }

    pub async fn aggregate_unread(&self) -> u32 {
        let state = self.state.lock().await;
        aggregate_unread(&state.conversations)
    }
}

/// One entry per counterpart, newest activity first. When the backend
/// reports a counterpart twice, the entry with the latest message wins.
pub fn build_conversations(actor_id: &str, summaries: Vec<ConversationSummary>) -> Vec<Conversation> {
    let mut by_counterpart: HashMap<String, Conversation> = HashMap::new();

    for summary in summaries {
        if summary.counterpart.id == actor_id {
            warn!("Ignoring conversation with self");
            continue;
        }
        let candidate = Conversation {
            counterpart: summary.counterpart,
            last_message: summary.last_message,
            unread_count: summary.unread_count,
        };
        match by_counterpart.get(&candidate.counterpart.id) {
            Some(existing) if existing.last_message.created_at >= candidate.last_message.created_at => {
                debug!("Duplicate conversation for {} ignored", candidate.counterpart.id);
            }
            _ => {
                by_counterpart.insert(candidate.counterpart.id.clone(), candidate);
            }
        }
    }

    let mut conversations: Vec<Conversation> = by_counterpart.into_values().collect();
    conversations.sort_by(|a, b| b.last_message.created_at.cmp(&a.last_message.created_at));
    conversations
}

pub fn filter_conversations(
    conversations: &[Conversation],
    search: &str,
    category: Category,
    now: DateTime<Utc>,
) -> Vec<Conversation> {
    let needle = search.trim().to_lowercase();
    let cutoff = now - Duration::hours(24);

    conversations
        .iter()
        .filter(|c| match category {
            Category::All => true,
            Category::Unread => c.unread_count > 0,
            Category::Recent => c.last_message.created_at >= cutoff,
        })
        .filter(|c| {
            needle.is_empty()
                || c.counterpart.display_name.to_lowercase().contains(&needle)
                || c.counterpart.email.to_lowercase().contains(&needle)
                || c.last_message
                    .body
                    .as_deref()
                    .map(|b| b.to_lowercase().contains(&needle))
                    .unwrap_or(false)
        })
        .cloned()
        .collect()
}

/// Sum of unread counts, counting each counterpart once
pub fn aggregate_unread(conversations: &[Conversation]) -> u32 {
    let mut per_counterpart: HashMap<&str, u32> = HashMap::new();
    for c in conversations {
        per_counterpart.entry(c.counterpart.id.as_str()).or_insert(c.unread_count);
    }
    per_counterpart.values().sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LifecycleState, Message, MessageKind};

    fn actor(id: &str, name: &str) -> Actor {
        Actor {
            id: id.into(),
            display_name: name.into(),
            email: format!("{}@example.org", id),
            is_privileged: false,
            avatar_ref: None,
        }
    }

    fn summary(counterpart: &str, name: &str, body: &str, created_at: DateTime<Utc>, unread: u32) -> ConversationSummary {
        ConversationSummary {
            counterpart: actor(counterpart, name),
            last_message: Message {
                id: format!("last-{}-{}", counterpart, created_at.timestamp()),
                sender_id: counterpart.into(),
                receiver_id: "admin".into(),
                body: Some(body.into()),
                kind: MessageKind::Text,
                attachment: None,
                reply_to_id: None,
                created_at,
                read_at: None,
                lifecycle_state: LifecycleState::Delivered,
            },
            unread_count: unread,
        }
    }

    #[test]
    fn test_build_dedupes_and_sorts() {
        let now = Utc::now();
        let conversations = build_conversations(
            "admin",
            vec![
                summary("u1", "Ada", "old", now - Duration::hours(5), 2),
                summary("u2", "Ben", "hello", now - Duration::hours(1), 1),
                summary("u1", "Ada", "newer", now - Duration::minutes(10), 3),
                summary("admin", "Me", "self", now, 9),
            ],
        );
        assert_eq!(conversations.len(), 2);
        assert_eq!(conversations[0].counterpart.id, "u1");
        assert_eq!(conversations[0].last_message.body.as_deref(), Some("newer"));
        assert_eq!(conversations[0].unread_count, 3);
        assert_eq!(aggregate_unread(&conversations), 4);
    }

    #[test]
    fn test_aggregate_counts_counterpart_once() {
        let now = Utc::now();
        let raw: Vec<Conversation> = vec![summary("u1", "Ada", "a", now, 2), summary("u1", "Ada", "b", now, 2), summary("u2", "Ben", "c", now, 5)]
            .into_iter()
            .map(|s| Conversation {
                counterpart: s.counterpart,
                last_message: s.last_message,
                unread_count: s.unread_count,
            })
            .collect();
        assert_eq!(aggregate_unread(&raw), 7);
        assert_eq!(aggregate_unread(&[]), 0);
    }

    #[test]
    fn test_filter_categories_and_search() {
        let now = Utc::now();
        let conversations = build_conversations(
            "admin",
            vec![
                summary("u1", "Ada Lovelace", "about the exam", now - Duration::hours(2), 0),
                summary("u2", "Ben Hur", "chariots", now - Duration::hours(30), 4),
                summary("u3", "Cleo", "hi", now - Duration::hours(23), 1),
            ],
        );

        let all = filter_conversations(&conversations, "", Category::All, now);
        assert_eq!(all.len(), 3);

        let unread: Vec<_> = filter_conversations(&conversations, "", Category::Unread, now)
            .into_iter()
            .map(|c| c.counterpart.id)
            .collect();
        assert_eq!(unread, vec!["u3", "u2"]);

        let recent: Vec<_> = filter_conversations(&conversations, "", Category::Recent, now)
            .into_iter()
            .map(|c| c.counterpart.id)
            .collect();
        assert_eq!(recent, vec!["u1", "u3"]);

        let by_name = filter_conversations(&conversations, "  ada ", Category::All, now);
        assert_eq!(by_name.len(), 1);
        let by_body = filter_conversations(&conversations, "EXAM", Category::All, now);
        assert_eq!(by_body[0].counterpart.id, "u1");
        let by_email = filter_conversations(&conversations, "u2@", Category::Unread, now);
        assert_eq!(by_email[0].counterpart.id, "u2");
        assert!(filter_conversations(&conversations, "nobody", Category::All, now).is_empty());
    }

    #[test]
    fn test_category_parsing() {
        assert_eq!("all".parse::<Category>(), Ok(Category::All));
        assert_eq!("Unread".parse::<Category>(), Ok(Category::Unread));
        assert_eq!("recent-24h".parse::<Category>(), Ok(Category::Recent));
        assert!("starred".parse::<Category>().is_err());
    }
}
