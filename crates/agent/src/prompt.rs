//! The chat prompt layout.
//!
//! Slots, in order: the persona system prompt, recalled memory, a system
//! hint with the current time, and the new input.

use chrono::{Local, NaiveDateTime};
use wela_core::message::Message;

pub const TIME_HINT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Default)]
pub struct ChatTemplate {
    system_prompt: Option<String>,
    time_hint: bool,
}

impl ChatTemplate {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        let prompt = system_prompt.into();
        Self {
            system_prompt: (!prompt.is_empty()).then_some(prompt),
            time_hint: true,
        }
    }

    /// Include or drop the "Current time is" hint.
    pub fn with_time_hint(mut self, enabled: bool) -> Self {
        self.time_hint = enabled;
        self
    }

    pub fn render(&self, memory: Vec<Message>, input: &[Message]) -> Vec<Message> {
        self.render_at(memory, input, Local::now().naive_local())
    }

    pub fn render_at(&self, memory: Vec<Message>, input: &[Message], now: NaiveDateTime) -> Vec<Message> {
        let mut messages = Vec::with_capacity(memory.len() + input.len() + 2);
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt.as_str()));
        }
        messages.extend(memory);
        if self.time_hint {
            messages.push(Message::system(format!(
                "Current time is: {}",
                now.format(TIME_HINT_FORMAT)
            )));
        }
        messages.extend_from_slice(input);
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use wela_core::message::Role;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(12, 5, 7)
            .unwrap()
    }

    #[test]
    fn slots_are_ordered() {
        let template = ChatTemplate::new("You are Wela.");
        let rendered = template.render_at(
            vec![Message::user("earlier"), Message::assistant("reply")],
            &[Message::user("now")],
            noon(),
        );

        let roles: Vec<Role> = rendered.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::System, Role::User]
        );
        assert_eq!(rendered[0].text(), "You are Wela.");
        assert_eq!(rendered[3].text(), "Current time is: 2024-03-09 12:05:07");
        assert_eq!(rendered[4].text(), "now");
    }

    #[test]
    fn empty_prompt_and_no_hint() {
        let template = ChatTemplate::new("").with_time_hint(false);
        let rendered = template.render(Vec::new(), &[Message::user("hi")]);
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].role, Role::User);
    }
}
