//! Shared test helpers for agent tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;
use wela_core::error::ProviderError;
use wela_core::message::{Message, ToolCall};
use wela_core::provider::{
    ChatModel, ChatRequest, ChatResponse, ChunkReceiver, Delta, Usage, deltas_from_message,
};

/// One scripted model answer.
pub enum Reply {
    Message(Message),
    Fail(ProviderError),
    /// Raw deltas, sent as-is by `stream` (no finish is added).
    Deltas(Vec<Delta>),
}

/// A model that returns a sequence of scripted replies.
///
/// Each call takes the next reply from the queue. Panics if more calls are
/// made than replies provided, unless a repeating reply is set.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<Reply>>,
    repeat: Option<Message>,
    requests: Mutex<Vec<ChatRequest>>,
    streaming: bool,
}

impl ScriptedModel {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
            streaming: false,
        }
    }

    /// Plain text answers, in order.
    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Reply::Message(Message::assistant(*t))).collect())
    }

    /// A model that answers every call with the same message.
    pub fn always(message: Message) -> Self {
        Self {
            repeat: Some(message),
            ..Self::new(Vec::new())
        }
    }

    #[allow(dead_code)]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: ChatRequest) -> Reply {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request);
        let call = requests.len();

        match self.replies.lock().unwrap().pop_front() {
            Some(reply) => reply,
            None => match &self.repeat {
                Some(message) => Reply::Message(message.clone()),
                None => panic!("ScriptedModel: no more replies (call #{call})"),
            },
        }
    }
}

fn usage() -> Usage {
    Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn streaming(&self) -> bool {
        self.streaming
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let model = request.model.clone();
        match self.next(request) {
            Reply::Message(message) => Ok(ChatResponse {
                message,
                usage: Some(usage()),
                model,
            }),
            Reply::Fail(e) => Err(e),
            Reply::Deltas(_) => panic!("ScriptedModel: raw deltas can only be streamed"),
        }
    }

    async fn stream(&self, request: ChatRequest) -> Result<ChunkReceiver, ProviderError> {
        let deltas = match self.next(request) {
            Reply::Message(message) => deltas_from_message(&message, 0),
            Reply::Deltas(deltas) => deltas,
            Reply::Fail(e) => return Err(e),
        };
        let (tx, rx) = mpsc::channel(deltas.len().max(1));
        for delta in deltas {
            let _ = tx.try_send(Ok(delta.into()));
        }
        Ok(rx)
    }
}

/// An assistant message that calls a single tool.
pub fn tool_call_message(id: &str, name: &str, arguments: &str) -> Message {
    Message::assistant_with_tool_calls("", vec![ToolCall::function(id, name, arguments)])
}
