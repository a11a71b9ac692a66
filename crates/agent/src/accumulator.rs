//! Merging streamed deltas into complete messages.
//!
//! A [`StreamAccumulator`] lives for one model round-trip. Every delta is
//! folded into the state of its choice; [`push`](StreamAccumulator::push)
//! tells the caller whether the delta may be shown downstream. Deltas that
//! carry tool-call fragments are held back: a half-received argument string
//! is not something a user should see.

use std::collections::BTreeMap;
use wela_core::error::Error;
use wela_core::message::{Message, Role, ToolCall};
use wela_core::provider::{Delta, ToolCallDelta};

/// Highest number of tool calls one message may carry. A fragment indexed
/// past it is refused instead of growing the slot array.
pub const MAX_TOOL_CALLS: usize = 128;

#[derive(Debug, Default)]
struct ChoiceState {
    role: Option<Role>,
    content: String,
    tool_calls: Option<Vec<ToolCall>>,
    finish_reason: Option<String>,
    /// First tool-call index that exceeded [`MAX_TOOL_CALLS`].
    overflow: Option<u32>,
}

impl ChoiceState {
    fn merge_tool_calls(&mut self, fragments: &[ToolCallDelta]) {
        let calls = self
            .tool_calls
            .get_or_insert_with(|| vec![ToolCall::default(); fragments.len().min(MAX_TOOL_CALLS)]);

        for fragment in fragments {
            let slot = fragment.index as usize;
            if slot >= MAX_TOOL_CALLS {
                self.overflow.get_or_insert(fragment.index);
                continue;
            }
            if slot >= calls.len() {
                calls.resize_with(slot + 1, ToolCall::default);
            }
            let call = &mut calls[slot];

            if call.id.is_empty()
                && let Some(id) = fragment.id.as_deref().filter(|s| !s.is_empty())
            {
                call.id = id.to_string();
            }
            if call.r#type.is_empty()
                && let Some(kind) = fragment.r#type.as_deref().filter(|s| !s.is_empty())
            {
                call.r#type = kind.to_string();
            }
            if let Some(function) = &fragment.function {
                if call.function.name.is_empty()
                    && let Some(name) = function.name.as_deref().filter(|s| !s.is_empty())
                {
                    call.function.name = name.to_string();
                }
                if let Some(arguments) = &function.arguments {
                    call.function.arguments.push_str(arguments);
                }
            }
        }
    }

    /// Slots no fragment ever identified are left out: without an id and a
    /// name there is nothing to invoke or answer.
    fn snapshot(&self) -> Message {
        let tool_calls = self
            .tool_calls
            .iter()
            .flatten()
            .filter(|call| !call.id.is_empty() && !call.function.name.is_empty())
            .cloned()
            .map(|mut call| {
                if call.r#type.is_empty() {
                    call.r#type = "function".into();
                }
                call
            })
            .collect();

        Message {
            role: self.role.unwrap_or(Role::Assistant),
            ..Message::assistant_with_tool_calls(self.content.clone(), tool_calls)
        }
    }
}

/// Folds delta streams into messages, one state per choice index.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    choices: BTreeMap<u32, ChoiceState>,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one delta. Returns the delta back when it should be yielded to
    /// the consumer: it carries content, no tool-call fragment, and its
    /// choice had not finished before it arrived.
    pub fn push(&mut self, delta: Delta) -> Option<Delta> {
        let state = self.choices.entry(delta.index).or_default();
        let already_finished = state.finish_reason.is_some();

        if state.role.is_none() {
            state.role = delta.role;
        }
        if let Some(content) = &delta.content {
            state.content.push_str(content);
        }
        let has_fragments = match &delta.tool_calls {
            Some(fragments) if !fragments.is_empty() => {
                state.merge_tool_calls(fragments);
                true
            }
            _ => false,
        };
        if let Some(reason) = &delta.finish_reason
            && state.finish_reason.is_none()
        {
            state.finish_reason = Some(reason.clone());
        }

        let has_content = delta.content.as_deref().is_some_and(|c| !c.is_empty());
        (has_content && !has_fragments && !already_finished).then_some(delta)
    }

    /// True once at least one choice is tracked and every tracked choice has
    /// received its finish signal.
    pub fn is_complete(&self) -> bool {
        !self.choices.is_empty() && self.choices.values().all(|c| c.finish_reason.is_some())
    }

    /// The message assembled so far for one choice.
    pub fn snapshot(&self, index: u32) -> Option<Message> {
        self.choices.get(&index).map(ChoiceState::snapshot)
    }

    /// The finish reason of one choice, once it has arrived.
    pub fn finish_reason(&self, index: u32) -> Option<&str> {
        self.choices.get(&index)?.finish_reason.as_deref()
    }

    /// Close the stream and return every choice's message, by index.
    ///
    /// A stream that ends with a choice still open (or with no delta at all)
    /// broke the provider contract, as does a tool-call index at or past
    /// [`MAX_TOOL_CALLS`].
    pub fn finish(self) -> Result<Vec<Message>, Error> {
        if self.choices.is_empty() {
            return Err(Error::Contract("delta stream closed without any delta".into()));
        }
        if let Some((index, _)) = self.choices.iter().find(|(_, c)| c.finish_reason.is_none()) {
            return Err(Error::Contract(format!(
                "delta stream closed before choice {index} finished"
            )));
        }
        if let Some((choice, index)) = self
            .choices
            .iter()
            .find_map(|(choice, c)| c.overflow.map(|index| (choice, index)))
        {
            return Err(Error::Contract(format!(
                "choice {choice} sent tool call index {index}, limit is {MAX_TOOL_CALLS}"
            )));
        }
        Ok(self.choices.values().map(ChoiceState::snapshot).collect())
    }

    /// Close the stream and return the first choice's message.
    pub fn into_message(self) -> Result<Message, Error> {
        self.finish()?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Contract("delta stream produced no choice".into()))
    }
}
