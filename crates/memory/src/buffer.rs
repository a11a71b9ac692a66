//! Plain in-process conversation buffers.

use async_trait::async_trait;
use std::collections::VecDeque;
use tokio::sync::RwLock;
use wela_core::error::MemoryError;
use wela_core::memory::Memory;
use wela_core::message::Message;

/// Remembers every message, forever. Recall ignores the incoming messages.
pub struct BufferMemory {
    memory_key: String,
    messages: RwLock<Vec<Message>>,
}

impl BufferMemory {
    pub fn new(memory_key: impl Into<String>) -> Self {
        Self {
            memory_key: memory_key.into(),
            messages: RwLock::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Memory for BufferMemory {
    fn memory_key(&self) -> &str {
        &self.memory_key
    }

    async fn add_message(&self, message: &Message) -> Result<(), MemoryError> {
        self.messages.write().await.push(message.clone());
        Ok(())
    }

    async fn get_messages(&self, _incoming: &[Message]) -> Result<Vec<Message>, MemoryError> {
        Ok(self.messages.read().await.clone())
    }
}

/// Remembers the last `window_size` messages.
pub struct WindowBufferMemory {
    memory_key: String,
    window_size: usize,
    messages: RwLock<VecDeque<Message>>,
}

impl WindowBufferMemory {
    pub fn new(memory_key: impl Into<String>, window_size: usize) -> Self {
        Self {
            memory_key: memory_key.into(),
            window_size,
            messages: RwLock::new(VecDeque::with_capacity(window_size + 1)),
        }
    }
}

#[async_trait]
impl Memory for WindowBufferMemory {
    fn memory_key(&self) -> &str {
        &self.memory_key
    }

    async fn add_message(&self, message: &Message) -> Result<(), MemoryError> {
        let mut messages = self.messages.write().await;
        messages.push_back(message.clone());
        while messages.len() > self.window_size {
            messages.pop_front();
        }
        Ok(())
    }

    async fn get_messages(&self, _incoming: &[Message]) -> Result<Vec<Message>, MemoryError> {
        Ok(self.messages.read().await.iter().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buffer_keeps_everything_in_order() {
        let mem = BufferMemory::new("chat");
        for i in 0..20 {
            mem.add_message(&Message::user(format!("m{i}"))).await.unwrap();
        }
        let all = mem.get_messages(&[]).await.unwrap();
        assert_eq!(all.len(), 20);
        assert_eq!(all[0].text(), "m0");
        assert_eq!(all[19].text(), "m19");
        assert_eq!(mem.memory_key(), "chat");
    }

    #[tokio::test]
    async fn window_drops_oldest() {
        let mem = WindowBufferMemory::new("chat", 3);
        for i in 1..=5 {
            mem.add_message(&Message::user(format!("m{i}"))).await.unwrap();
        }
        let texts: Vec<String> = mem
            .get_messages(&[Message::user("anything")])
            .await
            .unwrap()
            .iter()
            .map(|m| m.text())
            .collect();
        assert_eq!(texts, vec!["m3", "m4", "m5"]);
    }

    #[tokio::test]
    async fn zero_window_remembers_nothing() {
        let mem = WindowBufferMemory::new("chat", 0);
        mem.add_message(&Message::user("hello")).await.unwrap();
        assert!(mem.get_messages(&[]).await.unwrap().is_empty());
    }
}
