//! The core agent loop — the heart of Wela.
//!
//! One conversational turn follows a **Recall → Ask → Act** cycle:
//!
//! 1. **Recall** prior context from memory for the incoming messages
//! 2. **Ask** the model, offering tools on every round-trip but the last
//! 3. **Act**: run requested tools, append their results, loop back to step 2
//! 4. **Answer** when the model replies without tool calls, then write the
//!    turn back to memory
//!
//! The loop is bounded by `max_loop` model round-trips, in blocking and
//! streaming mode alike.

pub mod accumulator;
pub mod invoker;
pub mod loop_runner;
pub mod prompt;
pub mod sequential;
pub mod stream_event;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use accumulator::StreamAccumulator;
pub use invoker::ToolInvoker;
pub use loop_runner::{AgentLoop, DEFAULT_MAX_LOOP, TurnOutcome};
pub use prompt::ChatTemplate;
pub use sequential::{PipelineResult, SequentialAgent};
pub use stream_event::AgentStreamEvent;
