use async_trait::async_trait;

use super::{MessageState, MessageStore, SearchQuery, StoreError, StoredMessage};
use crate::message::Message;

/// Accepts everything and keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMessageStore;

impl NullMessageStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageStore for NullMessageStore {
    fn name(&self) -> &'static str {
        "null"
    }

    fn persists(&self) -> bool {
        false
    }

    async fn store(&self, msg: &Message) -> Result<String, StoreError> {
        Ok(msg.uuid().to_string())
    }

    async fn change_message_state(&self, _id: &str, _state: MessageState) -> Result<(), StoreError> {
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<StoredMessage, StoreError> {
        Err(StoreError::NotFound(id.to_string()))
    }

    async fn search(&self, _query: &SearchQuery) -> Result<Vec<StoredMessage>, StoreError> {
        Ok(Vec::new())
    }

    async fn total(&self) -> Result<usize, StoreError> {
        Ok(0)
    }
}
