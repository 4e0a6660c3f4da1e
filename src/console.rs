//! Terminal implementation of the operator interaction port.

use caldraft_core::draft::EventDraft;
use caldraft_core::error::{DraftError, DraftResult};
use caldraft_core::interaction::Interaction;
use chrono_tz::Tz;
use dialoguer::{Input, Select};
use owo_colors::OwoColorize;

use crate::render::render_draft;

/// Entry appended to every pick list to decline.
const NONE_ITEM: &str = "(none)";

/// Asks on the terminal with dialoguer.
pub struct Console {
    zone: Tz,
}

impl Console {
    pub fn new(zone: Tz) -> Self {
        Console { zone }
    }

    fn ask(&self, prompt: &str) -> DraftResult<String> {
        Input::<String>::new()
            .with_prompt(format!("  {}", prompt))
            .allow_empty(true)
            .interact_text()
            .map_err(|e| DraftError::Interaction(e.to_string()))
    }
}

fn pick_items(options: &[String]) -> Vec<&str> {
    options
        .iter()
        .map(String::as_str)
        .chain(std::iter::once(NONE_ITEM))
        .collect()
}

impl Interaction for Console {
    fn ask_choice(&mut self, prompt: &str, _options: &[String]) -> DraftResult<String> {
        self.ask(prompt)
    }

    fn ask_text(&mut self, prompt: &str) -> DraftResult<String> {
        self.ask(prompt)
    }

    fn pick(&mut self, prompt: &str, options: &[String]) -> DraftResult<Option<String>> {
        let selection = Select::new()
            .with_prompt(format!("  {}", prompt))
            .items(&pick_items(options))
            .default(0)
            .interact()
            .map_err(|e| DraftError::Interaction(e.to_string()))?;
        Ok(options.get(selection).cloned())
    }

    fn present(&mut self, draft: &EventDraft) {
        println!();
        println!("{}", render_draft(draft, self.zone));
        println!();
    }

    fn notify(&mut self, message: &str) {
        eprintln!("  {}", message.red());
    }
}
