use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::{MessageState, MessageStore, Order, SearchQuery, StoreError, StoredMessage};
use crate::message::Message;

/// Keeps every message in memory, keyed by the message uuid.
#[derive(Debug, Default)]
pub struct MemoryMessageStore {
    messages: DashMap<String, StoredMessage>,
    writes: Mutex<()>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_id(id: &str) -> Result<(), StoreError> {
    if id.trim().is_empty() {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(())
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn store(&self, msg: &Message) -> Result<String, StoreError> {
        let _write = self.writes.lock().await;
        let id = msg.uuid().to_string();
        self.messages.insert(
            id.clone(),
            StoredMessage { id: id.clone(), state: MessageState::Pending, message: msg.clone() },
        );
        Ok(id)
    }

    async fn change_message_state(&self, id: &str, state: MessageState) -> Result<(), StoreError> {
        check_id(id)?;
        let _write = self.writes.lock().await;
        let mut entry = self
            .messages
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        entry.state = state;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<StoredMessage, StoreError> {
        check_id(id)?;
        self.messages
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<StoredMessage>, StoreError> {
        let mut found: Vec<StoredMessage> = self
            .messages
            .iter()
            .filter(|entry| query.matches(&entry.message))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by(|a, b| {
            let by_time = a.message.timestamp().cmp(&b.message.timestamp()).then_with(|| a.id.cmp(&b.id));
            match query.order {
                Order::Ascending => by_time,
                Order::Descending => by_time.reverse(),
            }
        });
        Ok(found.into_iter().skip(query.start).take(query.count).collect())
    }

    async fn total(&self) -> Result<usize, StoreError> {
        Ok(self.messages.len())
    }
}
