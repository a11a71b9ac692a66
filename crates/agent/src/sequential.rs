//! Sequential agent pipeline.
//!
//! Each stage is a full [`AgentLoop`] with its own prompt, tools and memory.
//! The text of one stage's answer becomes the next stage's user input.
//!
//! ```text
//! input ──▶ stage 1 ──▶ stage 2 ──▶ … ──▶ outcome
//! ```

use tracing::{debug, info};
use wela_core::error::{Error, Result};
use wela_core::message::{Content, Message};

use crate::loop_runner::{AgentLoop, TurnOutcome};

/// Runs agents in order, piping answers forward.
#[derive(Clone, Default)]
pub struct SequentialAgent {
    stages: Vec<AgentLoop>,
}

/// Result of a pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// The last stage's outcome, or the quitting stage's.
    pub outcome: TurnOutcome,
    /// Every stage's answer, in order.
    pub stage_messages: Vec<Message>,
}

impl SequentialAgent {
    pub fn new(stages: Vec<AgentLoop>) -> Self {
        Self { stages }
    }

    pub fn then(mut self, stage: AgentLoop) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage. A quit outcome stops the pipeline early.
    pub async fn predict(&self, input: impl Into<Content>) -> Result<PipelineResult> {
        if self.stages.is_empty() {
            return Err(Error::Config {
                message: "sequential agent has no stages".into(),
            });
        }

        let mut content: Content = input.into();
        let mut stage_messages = Vec::with_capacity(self.stages.len());
        let mut outcome = None;

        for (index, stage) in self.stages.iter().enumerate() {
            debug!(stage = index, "Running pipeline stage");
            let result = stage.predict(content).await?;
            stage_messages.push(result.message().clone());

            if result.is_quit() {
                info!(stage = index, "Pipeline stopped by quit");
                return Ok(PipelineResult {
                    outcome: result,
                    stage_messages,
                });
            }

            content = Content::from(result.message().text());
            outcome = Some(result);
        }

        let outcome = outcome.ok_or_else(|| Error::Internal("pipeline produced no outcome".into()))?;
        Ok(PipelineResult {
            outcome,
            stage_messages,
        })
    }
}
