//! Operator interaction port.
//!
//! The pipeline never reads the console itself. It asks through this trait,
//! so the same interpreter runs against a terminal, a script or nobody.

use std::collections::VecDeque;

use crate::draft::EventDraft;
use crate::error::{DraftError, DraftResult};

pub trait Interaction {
    /// Ask the operator to pick among `options`. The answer is returned as
    /// typed; interpreting it (and rejecting nonsense) is up to the caller.
    fn ask_choice(&mut self, prompt: &str, options: &[String]) -> DraftResult<String>;

    /// Ask for a free-text value.
    fn ask_text(&mut self, prompt: &str) -> DraftResult<String>;

    /// Pick one of `options` or none of them.
    ///
    /// By default the options are listed in the prompt and the operator types
    /// a number or a name; an empty answer or `none` declines.
    fn pick(&mut self, prompt: &str, options: &[String]) -> DraftResult<Option<String>> {
        let listed = format!(
            "{} ({}), or leave empty for none",
            prompt,
            options
                .iter()
                .enumerate()
                .map(|(i, name)| format!("{}: {}", i + 1, name))
                .collect::<Vec<_>>()
                .join(", ")
        );

        loop {
            let answer = self.ask_choice(&listed, options)?;
            let answer = answer.trim();
            if answer.is_empty() || answer.eq_ignore_ascii_case("none") {
                return Ok(None);
            }

            let by_number = answer
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| options.get(i));
            let by_name = || options.iter().find(|o| o.eq_ignore_ascii_case(answer));
            match by_number.or_else(by_name) {
                Some(name) => return Ok(Some(name.clone())),
                None => self.notify(&format!("'{}' is not one of the options", answer)),
            }
        }
    }

    /// Show the draft that is about to be confirmed.
    fn present(&mut self, _draft: &EventDraft) {}

    /// Tell the operator something went wrong without asking anything.
    fn notify(&mut self, _message: &str) {}
}

/// Used when nobody is at the keyboard. Any question is an error.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unattended;

impl Interaction for Unattended {
    fn ask_choice(&mut self, prompt: &str, _options: &[String]) -> DraftResult<String> {
        Err(DraftError::Interaction(format!(
            "Cannot ask '{}' in unattended mode",
            prompt
        )))
    }

    fn ask_text(&mut self, prompt: &str) -> DraftResult<String> {
        Err(DraftError::Interaction(format!(
            "Cannot ask '{}' in unattended mode",
            prompt
        )))
    }
}

/// Replays queued answers and records every prompt it was shown.
#[derive(Debug, Default, Clone)]
pub struct ScriptedInteraction {
    answers: VecDeque<String>,
    pub prompts: Vec<String>,
    pub presented: Vec<EventDraft>,
    pub notices: Vec<String>,
}

impl ScriptedInteraction {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedInteraction {
            answers: answers.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }

    fn next_answer(&mut self, prompt: &str) -> DraftResult<String> {
        self.prompts.push(prompt.to_string());
        self.answers
            .pop_front()
            .ok_or_else(|| DraftError::Interaction(format!("No scripted answer for '{}'", prompt)))
    }
}

impl Interaction for ScriptedInteraction {
    fn ask_choice(&mut self, prompt: &str, _options: &[String]) -> DraftResult<String> {
        self.next_answer(prompt)
    }

    fn ask_text(&mut self, prompt: &str) -> DraftResult<String> {
        self.next_answer(prompt)
    }

    fn present(&mut self, draft: &EventDraft) {
        self.presented.push(draft.clone());
    }

    fn notify(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }
}
