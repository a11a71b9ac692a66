//! The agent reasoning loop implementation.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use wela_core::error::{Error, ProviderError, Result};
use wela_core::event::{DomainEvent, EventBus, ToolObserver};
use wela_core::memory::Memory;
use wela_core::message::{Content, Message};
use wela_core::provider::{ChatModel, ChatRequest};
use wela_core::tool::{QUIT_TOOL_NAME, ToolRegistry};

use crate::accumulator::StreamAccumulator;
use crate::invoker::ToolInvoker;
use crate::prompt::ChatTemplate;
use crate::stream_event::AgentStreamEvent;

/// Default cap on model round-trips per turn.
pub const DEFAULT_MAX_LOOP: usize = 5;

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The model answered.
    Reply(Message),

    /// The model called `quit`. The caller decides what quitting means.
    QuitRequested { message: Message, farewell: String },
}

impl TurnOutcome {
    pub fn message(&self) -> &Message {
        match self {
            Self::Reply(message) | Self::QuitRequested { message, .. } => message,
        }
    }

    pub fn into_message(self) -> Message {
        match self {
            Self::Reply(message) | Self::QuitRequested { message, .. } => message,
        }
    }

    pub fn is_quit(&self) -> bool {
        matches!(self, Self::QuitRequested { .. })
    }
}

/// The core agent loop that orchestrates model calls and tool execution.
#[derive(Clone)]
pub struct AgentLoop {
    /// The chat model to use
    model: Arc<dyn ChatModel>,

    /// Model identifier sent with every request
    model_name: String,

    /// Prompt layout around memory and input
    template: ChatTemplate,

    /// Tool dispatch; an empty registry means tools are never offered
    invoker: ToolInvoker,

    /// Optional memory for recall and write-back
    memory: Option<Arc<dyn Memory>>,

    /// Maximum model round-trips per turn
    max_loop: usize,

    max_tokens: Option<u32>,
    temperature: Option<f32>,
    stop: Vec<String>,

    /// Event bus for domain events
    event_bus: Option<Arc<EventBus>>,
}

impl AgentLoop {
    /// Create a new agent loop with no tools, no memory and the default
    /// round-trip cap.
    pub fn new(model: Arc<dyn ChatModel>, model_name: impl Into<String>) -> Self {
        Self {
            model,
            model_name: model_name.into(),
            template: ChatTemplate::new(""),
            invoker: ToolInvoker::new(Arc::new(ToolRegistry::new())),
            memory: None,
            max_loop: DEFAULT_MAX_LOOP,
            max_tokens: None,
            temperature: None,
            stop: Vec::new(),
            event_bus: None,
        }
    }

    /// Set the maximum number of model round-trips per turn.
    pub fn with_max_loop(mut self, max_loop: usize) -> Result<Self> {
        if max_loop == 0 {
            return Err(Error::Config {
                message: "max_loop must be at least 1".into(),
            });
        }
        self.max_loop = max_loop;
        Ok(self)
    }

    /// Attach the toolkit offered to the model.
    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.invoker = self.invoker.with_registry(tools);
        self
    }

    /// Bound every tool call.
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.invoker = self.invoker.with_timeout(timeout);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ToolObserver>) -> Self {
        self.invoker = self.invoker.with_observer(observer);
        self
    }

    /// Attach a memory for recall before, and write-back after, every turn.
    pub fn with_memory(mut self, memory: Arc<dyn Memory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.template = ChatTemplate::new(prompt);
        self
    }

    pub fn with_template(mut self, template: ChatTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    /// Publish domain events; the bus also observes every tool call.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.invoker = self.invoker.with_observer(bus.clone());
        self.event_bus = Some(bus);
        self
    }

    pub fn max_loop(&self) -> usize {
        self.max_loop
    }

    /// Whether the model prefers to answer incrementally.
    pub fn streaming(&self) -> bool {
        self.model.streaming()
    }

    /// Answer one user input.
    pub async fn predict(&self, input: impl Into<Content>) -> Result<TurnOutcome> {
        self.predict_messages(vec![Message::user(input)]).await
    }

    /// Answer a batch of incoming messages.
    ///
    /// Provider failures never surface here: they come back as an assistant
    /// message carrying the error text. Only contract violations are errors.
    pub async fn predict_messages(&self, input: Vec<Message>) -> Result<TurnOutcome> {
        ensure_input(&input)?;
        info!(model = %self.model_name, messages = input.len(), "Processing turn");

        let mut transcript = self.prepare(&input).await;
        let mut tool_calls_made = 0;
        let mut last = None;

        for iteration in 0..self.max_loop {
            let request = self.request(transcript.clone(), iteration, false);
            debug!(iteration, tools = request.tools.len(), "Agent loop iteration");

            let reply = match self.model.complete(request).await {
                Ok(response) => {
                    self.publish(DomainEvent::ResponseGenerated {
                        model: response.model,
                        iteration,
                        tokens_used: response.usage.map(|u| u.total_tokens),
                    });
                    response.message
                }
                Err(e) => provider_failure(e),
            };

            if !reply.has_tool_calls() {
                let outcome = TurnOutcome::Reply(reply);
                self.remember(&input, outcome.message()).await;
                info!(iterations = iteration + 1, tool_calls_made, "Turn complete");
                return Ok(outcome);
            }

            last = Some(reply.clone());
            let (made, farewell) = self.run_tool_calls(&mut transcript, reply, None).await?;
            tool_calls_made += made;

            if let Some(farewell) = farewell {
                let message = Message::assistant(farewell.as_str());
                self.remember(&input, &message).await;
                info!(iterations = iteration + 1, "Quit requested");
                return Ok(TurnOutcome::QuitRequested { message, farewell });
            }
        }

        // The final iteration offers no tools, so this is a model that
        // called tools anyway
        warn!(max_loop = self.max_loop, "Loop exhausted, returning last response");
        let message = last.unwrap_or_else(|| Message::assistant(""));
        self.remember(&input, &message).await;
        Ok(TurnOutcome::Reply(message))
    }

    /// Answer one user input, streaming events as they happen.
    ///
    /// The turn runs on a spawned task; dropping the receiver stops it at the
    /// next event.
    pub fn predict_stream(&self, input: impl Into<Content>) -> mpsc::Receiver<AgentStreamEvent> {
        self.predict_stream_messages(vec![Message::user(input)])
    }

    pub fn predict_stream_messages(&self, input: Vec<Message>) -> mpsc::Receiver<AgentStreamEvent> {
        let (tx, rx) = mpsc::channel(128);
        let agent = self.clone();

        tokio::spawn(async move {
            match agent.drive_stream(input, &tx).await {
                Ok(()) => {}
                Err(Error::Internal(reason)) => debug!(%reason, "Streaming turn abandoned"),
                Err(e) => {
                    warn!(error = %e, "Streaming turn failed");
                    let _ = tx
                        .send(AgentStreamEvent::Error {
                            message: e.to_string(),
                        })
                        .await;
                }
            }
        });

        rx
    }

    async fn drive_stream(&self, input: Vec<Message>, tx: &mpsc::Sender<AgentStreamEvent>) -> Result<()> {
        ensure_input(&input)?;
        info!(model = %self.model_name, messages = input.len(), "Processing streaming turn");

        let mut transcript = self.prepare(&input).await;
        let mut tool_calls_made = 0;
        let mut last = None;

        for iteration in 0..self.max_loop {
            let request = self.request(transcript.clone(), iteration, true);
            debug!(iteration, tools = request.tools.len(), "Agent stream iteration");

            let reply = self.stream_once(request, iteration, tx).await?;

            if !reply.has_tool_calls() {
                self.remember(&input, &reply).await;
                return emit(
                    tx,
                    AgentStreamEvent::Done {
                        message: reply,
                        iterations: iteration + 1,
                        tool_calls_made,
                    },
                )
                .await;
            }

            last = Some(reply.clone());
            let (made, farewell) = self.run_tool_calls(&mut transcript, reply, Some(tx)).await?;
            tool_calls_made += made;

            if let Some(farewell) = farewell {
                let message = Message::assistant(farewell.as_str());
                self.remember(&input, &message).await;
                return emit(tx, AgentStreamEvent::Quit { message, farewell }).await;
            }
        }

        warn!(max_loop = self.max_loop, "Loop exhausted, returning last response");
        let message = last.unwrap_or_else(|| Message::assistant(""));
        self.remember(&input, &message).await;
        emit(
            tx,
            AgentStreamEvent::Done {
                message,
                iterations: self.max_loop,
                tool_calls_made,
            },
        )
        .await
    }

    /// One streamed model round-trip. Content of the first choice is
    /// forwarded as it arrives; the finalized message is returned.
    async fn stream_once(
        &self,
        request: ChatRequest,
        iteration: usize,
        tx: &mpsc::Sender<AgentStreamEvent>,
    ) -> Result<Message> {
        let mut chunks = match self.model.stream(request).await {
            Ok(chunks) => chunks,
            Err(e) => return stream_failure(e, tx).await,
        };

        let mut accumulator = StreamAccumulator::new();
        let mut tokens_used = None;

        while let Some(item) = chunks.recv().await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(e) => return stream_failure(e, tx).await,
            };
            if let Some(usage) = chunk.usage {
                tokens_used = Some(usage.total_tokens);
            }
            for delta in chunk.choices {
                if let Some(shown) = accumulator.push(delta)
                    && shown.index == 0
                    && let Some(content) = shown.content
                {
                    emit(tx, AgentStreamEvent::Chunk { content }).await?;
                }
            }
        }

        let message = accumulator.into_message()?;
        self.publish(DomainEvent::ResponseGenerated {
            model: self.model_name.clone(),
            iteration,
            tokens_used,
        });
        Ok(message)
    }

    /// Append the assistant message and every tool result to the transcript.
    /// Returns how many calls ran and, if `quit` was among them, its result.
    async fn run_tool_calls(
        &self,
        transcript: &mut Vec<Message>,
        reply: Message,
        tx: Option<&mpsc::Sender<AgentStreamEvent>>,
    ) -> Result<(usize, Option<String>)> {
        debug!(tool_count = reply.tool_calls.len(), "Executing tool calls");
        let calls = reply.tool_calls.clone();
        transcript.push(reply);

        let mut farewell = None;
        for call in &calls {
            if let Some(tx) = tx {
                emit(
                    tx,
                    AgentStreamEvent::ToolCall {
                        id: call.id.clone(),
                        name: call.name().to_string(),
                        arguments: call.function.arguments.clone(),
                    },
                )
                .await?;
            }

            let result = self.invoker.invoke(call).await;
            let output = result.text();

            if let Some(tx) = tx {
                emit(
                    tx,
                    AgentStreamEvent::ToolResult {
                        id: call.id.clone(),
                        name: call.name().to_string(),
                        output: output.clone(),
                    },
                )
                .await?;
            }
            if call.name() == QUIT_TOOL_NAME && farewell.is_none() {
                farewell = Some(output);
            }
            transcript.push(result);
        }

        Ok((calls.len(), farewell))
    }

    fn request(&self, messages: Vec<Message>, iteration: usize, stream: bool) -> ChatRequest {
        let mut request = ChatRequest::new(&self.model_name, messages);
        // The last round-trip never offers tools, which bounds the loop
        if self.invoker.has_tools() && iteration + 1 < self.max_loop {
            request.tools = self.invoker.definitions();
        }
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        request.stop = self.stop.clone();
        request.stream = stream;
        request
    }

    /// Render the prompt with whatever memory recalls for this input.
    async fn prepare(&self, input: &[Message]) -> Vec<Message> {
        let recalled = match &self.memory {
            Some(memory) => match memory.get_messages(input).await {
                Ok(messages) => {
                    debug!(count = messages.len(), "Recalled memory for context");
                    self.publish(DomainEvent::MemoryAccessed {
                        operation: "get".into(),
                        count: messages.len(),
                    });
                    messages
                }
                Err(e) => {
                    warn!("Memory recall failed: {e}");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        self.template.render(recalled, input)
    }

    /// Store the turn's input and answer.
    async fn remember(&self, input: &[Message], answer: &Message) {
        let Some(memory) = &self.memory else {
            return;
        };

        // Tool calls without their results would not replay cleanly
        let answer = if answer.has_tool_calls() {
            Message::assistant(answer.content.clone())
        } else {
            answer.clone()
        };

        let mut stored = 0;
        for message in input.iter().chain(std::iter::once(&answer)) {
            match memory.add_message(message).await {
                Ok(()) => stored += 1,
                Err(e) => warn!("Failed to save message to memory: {e}"),
            }
        }
        self.publish(DomainEvent::MemoryAccessed {
            operation: "add".into(),
            count: stored,
        });
    }

    fn publish(&self, event: DomainEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }
}

fn ensure_input(input: &[Message]) -> Result<()> {
    if input.is_empty() {
        return Err(Error::Contract("predict called without input messages".into()));
    }
    Ok(())
}

fn provider_failure(e: ProviderError) -> Message {
    warn!(error = %e, "Model call failed");
    Message::assistant(e.to_string())
}

/// A failed streamed call shows its error text and becomes the reply.
async fn stream_failure(e: ProviderError, tx: &mpsc::Sender<AgentStreamEvent>) -> Result<Message> {
    let message = provider_failure(e);
    emit(
        tx,
        AgentStreamEvent::Chunk {
            content: message.text(),
        },
    )
    .await?;
    Ok(message)
}

async fn emit(tx: &mpsc::Sender<AgentStreamEvent>, event: AgentStreamEvent) -> Result<()> {
    tx.send(event)
        .await
        .map_err(|_| Error::Internal("stream receiver dropped".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{Reply, ScriptedModel, tool_call_message};
    use async_trait::async_trait;
    use wela_core::error::ToolError;
    use wela_core::message::{Role, ToolCall};
    use wela_core::provider::Delta;
    use wela_core::tool::Tool;
    use wela_memory::BufferMemory;
    use wela_tools::QuitTool;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object", "properties": {"x": {"type": "string"}}})
        }
        async fn execute(&self, arguments: serde_json::Value) -> std::result::Result<String, ToolError> {
            Ok(arguments["x"].as_str().unwrap_or_default().to_string())
        }
    }

    fn toolkit() -> Arc<ToolRegistry> {
        Arc::new(ToolRegistry::new().with(Box::new(EchoTool)).with(Box::new(QuitTool)))
    }

    fn agent(model: Arc<ScriptedModel>) -> AgentLoop {
        AgentLoop::new(model, "mock-model")
            .with_template(ChatTemplate::new("You are Wela.").with_time_hint(false))
    }

    async fn collect(mut rx: mpsc::Receiver<AgentStreamEvent>) -> Vec<AgentStreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    fn chunks(events: &[AgentStreamEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                AgentStreamEvent::Chunk { content } => Some(content.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn simple_text_response() {
        let model = Arc::new(ScriptedModel::texts(&["Hello! How can I help?"]));
        let outcome = agent(model.clone()).predict("Hello!").await.unwrap();

        assert_eq!(outcome, TurnOutcome::Reply(Message::assistant("Hello! How can I help?")));
        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        // System + User
        assert_eq!(requests[0].messages.len(), 2);
        assert!(requests[0].tools.is_empty());
    }

    #[tokio::test]
    async fn loop_is_bounded_for_a_model_that_always_calls_tools() {
        let model = Arc::new(ScriptedModel::always(tool_call_message("1", "echo", r#"{"x":"hi"}"#)));
        let outcome = agent(model.clone())
            .with_tools(toolkit())
            .with_max_loop(3)
            .unwrap()
            .predict("loop forever")
            .await
            .unwrap();

        assert_eq!(model.call_count(), 3);
        let requests = model.requests();
        assert!(!requests[0].tools.is_empty());
        assert!(!requests[1].tools.is_empty());
        assert!(requests[2].tools.is_empty());
        // The scripted model ignores the missing tools; the last reply comes back as-is
        assert!(!outcome.is_quit());
    }

    #[tokio::test]
    async fn tool_results_feed_the_next_call() {
        let model = Arc::new(ScriptedModel::new(vec![
            Reply::Message(tool_call_message("call_1", "echo", r#"{"x":"pong"}"#)),
            Reply::Message(Message::assistant("The tool said pong")),
        ]));
        let outcome = agent(model.clone())
            .with_tools(toolkit())
            .predict("ping")
            .await
            .unwrap();

        assert_eq!(outcome.message().text(), "The tool said pong");
        let second = &model.requests()[1].messages;
        let tail = &second[second.len() - 2..];
        assert_eq!(tail[0].tool_calls[0].id, "call_1");
        assert_eq!(tail[1].role, Role::Tool);
        assert_eq!(tail[1].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(tail[1].text(), "pong");
    }

    #[tokio::test]
    async fn single_iteration_offers_no_tools() {
        let model = Arc::new(ScriptedModel::texts(&["no tools here"]));
        agent(model.clone())
            .with_max_loop(1)
            .unwrap()
            .with_tools(toolkit())
            .predict("hi")
            .await
            .unwrap();
        // max_loop 1: the only call is also the last
        assert!(model.requests()[0].tools.is_empty());
    }

    #[tokio::test]
    async fn provider_error_becomes_assistant_text() {
        let model = Arc::new(ScriptedModel::new(vec![Reply::Fail(ProviderError::Network(
            "connection refused".into(),
        ))]));
        let outcome = agent(model).predict("hello?").await.unwrap();

        let message = outcome.message();
        assert_eq!(message.role, Role::Assistant);
        assert!(message.text().contains("connection refused"));
    }

    #[tokio::test]
    async fn malformed_arguments_are_fed_back() {
        let model = Arc::new(ScriptedModel::new(vec![
            Reply::Message(tool_call_message("call_1", "echo", r#"{"x": "#)),
            Reply::Message(Message::assistant("sorry, retrying later")),
        ]));
        let outcome = agent(model.clone())
            .with_tools(toolkit())
            .predict("echo something")
            .await
            .unwrap();

        assert_eq!(outcome.message().text(), "sorry, retrying later");
        let requests = model.requests();
        let (first, second) = (&requests[0].messages, &requests[1].messages);
        // The assistant call and exactly one tool message
        assert_eq!(second.len(), first.len() + 2);
        let tool_msg = second.last().unwrap();
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        assert!(tool_msg.text().starts_with("Error: invalid arguments for echo"));
    }

    #[tokio::test]
    async fn quit_tool_ends_the_turn() {
        let model = Arc::new(ScriptedModel::new(vec![Reply::Message(tool_call_message(
            "call_q",
            "quit",
            r#"{"farewell":"See you!"}"#,
        ))]));
        let outcome = agent(model.clone())
            .with_tools(toolkit())
            .predict("bye")
            .await
            .unwrap();

        assert!(outcome.is_quit());
        match outcome {
            TurnOutcome::QuitRequested { message, farewell } => {
                assert_eq!(farewell, "See you!");
                assert_eq!(message.text(), "See you!");
            }
            other => panic!("Expected quit, got {other:?}"),
        }
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn memory_is_recalled_and_written_back() {
        let memory = Arc::new(BufferMemory::new("test"));
        memory.add_message(&Message::user("My name is Ada")).await.unwrap();

        let model = Arc::new(ScriptedModel::texts(&["Hi Ada"]));
        agent(model.clone())
            .with_memory(memory.clone())
            .predict("What is my name?")
            .await
            .unwrap();

        let sent = &model.requests()[0].messages;
        assert_eq!(sent[0].role, Role::System);
        assert_eq!(sent[1].text(), "My name is Ada");
        assert_eq!(sent[2].text(), "What is my name?");

        let stored = memory.get_messages(&[]).await.unwrap();
        let texts: Vec<String> = stored.iter().map(Message::text).collect();
        assert_eq!(texts, vec!["My name is Ada", "What is my name?", "Hi Ada"]);
    }

    #[tokio::test]
    async fn events_are_published() {
        let bus = Arc::new(EventBus::new(32));
        let mut rx = bus.subscribe();
        let model = Arc::new(ScriptedModel::new(vec![
            Reply::Message(tool_call_message("call_1", "echo", r#"{"x":"a"}"#)),
            Reply::Message(Message::assistant("done")),
        ]));
        agent(model)
            .with_tools(toolkit())
            .with_event_bus(bus.clone())
            .predict("go")
            .await
            .unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event.as_ref() {
                DomainEvent::ToolCallStarted { .. } => "started",
                DomainEvent::ToolCallFinished { .. } => "finished",
                DomainEvent::ResponseGenerated { .. } => "response",
                DomainEvent::MemoryAccessed { .. } => "memory",
            });
        }
        assert_eq!(kinds, vec!["response", "started", "finished", "response"]);
    }

    #[test]
    fn zero_max_loop_is_rejected() {
        let model = Arc::new(ScriptedModel::texts(&[]));
        assert!(matches!(
            AgentLoop::new(model, "m").with_max_loop(0),
            Err(Error::Config { .. })
        ));
    }

    #[tokio::test]
    async fn empty_input_is_a_contract_violation() {
        let model = Arc::new(ScriptedModel::texts(&[]));
        let result = agent(model).predict_messages(Vec::new()).await;
        assert!(matches!(result, Err(Error::Contract(_))));
    }

    #[tokio::test]
    async fn stream_matches_blocking() {
        let script = || {
            vec![
                Reply::Message(Message::assistant_with_tool_calls(
                    "Checking. ",
                    vec![ToolCall::function("call_1", "echo", r#"{"x":"42"}"#)],
                )),
                Reply::Message(Message::assistant("The answer is 42")),
            ]
        };

        let blocking_model = Arc::new(ScriptedModel::new(script()));
        let blocking = agent(blocking_model.clone())
            .with_tools(toolkit())
            .predict("answer?")
            .await
            .unwrap();

        let streaming_model = Arc::new(ScriptedModel::new(script()));
        let events = collect(
            agent(streaming_model.clone())
                .with_tools(toolkit())
                .predict_stream("answer?"),
        )
        .await;

        match events.last().unwrap() {
            AgentStreamEvent::Done {
                message,
                iterations,
                tool_calls_made,
            } => {
                assert_eq!(message, blocking.message());
                assert_eq!(*iterations, 2);
                assert_eq!(*tool_calls_made, 1);
            }
            other => panic!("Expected done, got {other:?}"),
        }
        assert_eq!(chunks(&events), vec!["Checking. ", "The answer is 42"]);

        // Both modes sent the same transcripts
        let sent = |m: &ScriptedModel| -> Vec<Vec<Message>> {
            m.requests().into_iter().map(|r| r.messages).collect()
        };
        assert_eq!(sent(&blocking_model), sent(&streaming_model));
        assert!(streaming_model.requests().iter().all(|r| r.stream));
    }

    #[tokio::test]
    async fn stream_reports_tool_activity() {
        let model = Arc::new(ScriptedModel::new(vec![
            Reply::Message(tool_call_message("call_1", "echo", r#"{"x":"hi"}"#)),
            Reply::Message(Message::assistant("ok")),
        ]));
        let events = collect(agent(model).with_tools(toolkit()).predict_stream("go")).await;

        let kinds: Vec<&str> = events.iter().map(AgentStreamEvent::event_type).collect();
        assert_eq!(kinds, vec!["tool_call", "tool_result", "chunk", "done"]);
        match &events[1] {
            AgentStreamEvent::ToolResult { id, output, .. } => {
                assert_eq!(id, "call_1");
                assert_eq!(output, "hi");
            }
            other => panic!("Expected tool result, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stream_never_shows_tool_fragments() {
        let fragments = deltas_with_split_arguments();
        let model = Arc::new(ScriptedModel::new(vec![
            Reply::Deltas(fragments),
            Reply::Message(Message::assistant("fine")),
        ]));
        let events = collect(agent(model.clone()).with_tools(toolkit()).predict_stream("go")).await;

        assert_eq!(chunks(&events), vec!["Let me look", "fine"]);
        // The split arguments were reassembled before the call ran
        let second = &model.requests()[1].messages;
        assert_eq!(second.last().unwrap().text(), "abc");
    }

    fn deltas_with_split_arguments() -> Vec<Delta> {
        use wela_core::provider::{FunctionDelta, ToolCallDelta};
        let fragment = |id: Option<&str>, args: &str| Delta {
            tool_calls: Some(vec![ToolCallDelta {
                index: 0,
                id: id.map(String::from),
                r#type: id.map(|_| "function".to_string()),
                function: Some(FunctionDelta {
                    name: id.map(|_| "echo".to_string()),
                    arguments: Some(args.to_string()),
                }),
            }]),
            ..Default::default()
        };
        vec![
            Delta::text(0, "Let me look"),
            fragment(Some("call_1"), r#"{"x":"#),
            fragment(None, r#""abc"}"#),
            Delta::finish(0, "tool_calls"),
        ]
    }

    #[tokio::test]
    async fn unfinished_stream_ends_with_error_event() {
        let model = Arc::new(ScriptedModel::new(vec![Reply::Deltas(vec![Delta::text(0, "partial")])]));
        let memory = Arc::new(BufferMemory::new("test"));
        let events = collect(agent(model).with_memory(memory.clone()).predict_stream("go")).await;

        assert_eq!(chunks(&events), vec!["partial"]);
        assert!(matches!(events.last(), Some(AgentStreamEvent::Error { .. })));
        assert!(memory.get_messages(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stream_provider_error_is_shown_as_text() {
        let model = Arc::new(ScriptedModel::new(vec![Reply::Fail(ProviderError::Timeout(
            "30s".into(),
        ))]));
        let events = collect(agent(model).predict_stream("go")).await;

        let shown = chunks(&events);
        assert_eq!(shown.len(), 1);
        assert!(shown[0].contains("30s"));
        assert!(matches!(events.last(), Some(AgentStreamEvent::Done { .. })));
    }

    #[tokio::test]
    async fn stream_quit_and_write_back() {
        let memory = Arc::new(BufferMemory::new("test"));
        let model = Arc::new(ScriptedModel::new(vec![Reply::Message(tool_call_message(
            "call_q", "quit", "",
        ))]));
        let events = collect(
            agent(model)
                .with_tools(toolkit())
                .with_memory(memory.clone())
                .predict_stream("goodbye"),
        )
        .await;

        match events.last().unwrap() {
            AgentStreamEvent::Quit { farewell, .. } => assert_eq!(farewell, "Goodbye."),
            other => panic!("Expected quit, got {other:?}"),
        }
        let stored: Vec<String> = memory.get_messages(&[]).await.unwrap().iter().map(Message::text).collect();
        assert_eq!(stored, vec!["goodbye", "Goodbye."]);
    }
}
