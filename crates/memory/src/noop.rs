//! No-op memory — disables conversation memory entirely.

use async_trait::async_trait;
use wela_core::error::MemoryError;
use wela_core::memory::Memory;
use wela_core::message::Message;

/// A memory that stores nothing and recalls nothing.
pub struct NoopMemory;

#[async_trait]
impl Memory for NoopMemory {
    fn memory_key(&self) -> &str { "none" }

    async fn add_message(&self, _message: &Message) -> Result<(), MemoryError> {
        Ok(())
    }

    async fn get_messages(&self, _incoming: &[Message]) -> Result<Vec<Message>, MemoryError> {
        Ok(Vec::new())
    }
}
