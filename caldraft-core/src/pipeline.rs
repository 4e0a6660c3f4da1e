//! Per-item interpreter around the validation state machine.
//!
//! Each state's side effect runs here (prompting the backend, asking the
//! operator, normalizing, publishing) and its result is fed back to
//! `Machine::step` as a signal until the item reaches a terminal state.

use chrono_tz::Tz;
use tracing::{info, warn};

use crate::artifacts::ArtifactSink;
use crate::calendar::{CalendarSink, select_destination};
use crate::config::CaldraftConfig;
use crate::confirm::{Confirmation, ask_datetime, confirm};
use crate::context::ExtractionContext;
use crate::draft::{EventDraft, TimePoint};
use crate::error::{DraftError, DraftResult};
use crate::extract::extract_draft;
use crate::interaction::Interaction;
use crate::model::{ExhaustionMarkers, ModelCatalog, ModelHandle, choose_replacement, invoke_with_substitution};
use crate::normalize::{instant_of, normalize, parse_typed_datetime};
use crate::prompt::{PromptTemplate, build_prompt};
use crate::validation::{
    Machine, Mode, OperatorChoice, RetryBudget, Signal, ValidationState, check_fields,
};

/// Everything the pipeline would otherwise read from globals.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub mode: Mode,
    pub retry_cap: u32,
    pub default_zone: Tz,
    pub confirm: bool,
    pub markers: ExhaustionMarkers,
    pub template: PromptTemplate,
}

impl PipelineSettings {
    pub fn from_config(config: &CaldraftConfig, mode: Mode) -> DraftResult<Self> {
        Ok(PipelineSettings {
            mode,
            retry_cap: config.retry_cap,
            default_zone: config.timezone()?,
            confirm: config.confirm,
            markers: ExhaustionMarkers::new(&config.exhaustion_markers),
            template: PromptTemplate::load(config.prompt_template_path().as_deref()),
        })
    }

    fn machine(&self) -> Machine {
        Machine::new(self.mode, self.retry_cap, self.confirm)
    }
}

/// What happened to one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Published { draft: EventDraft, receipt: String },
    Skipped { item_id: String, reason: String },
    Failed { item_id: String, reason: String },
}

/// Collaborators shared by every item of a run.
pub struct Pipeline<'a> {
    pub settings: &'a PipelineSettings,
    pub catalog: &'a dyn ModelCatalog,
    pub sink: &'a dyn CalendarSink,
    pub artifacts: &'a dyn ArtifactSink,
}

/// Mutable state of one item. Dropped when the item finishes.
struct ItemRun {
    state: ValidationState,
    budget: RetryBudget,
    backend: ModelHandle,
    draft: Option<EventDraft>,
    receipt: Option<String>,
    problem: Option<String>,
}

const MANUAL_FORMAT_HINT: &str = "YYYY-MM-DD HH:MM:SS";

impl Pipeline<'_> {
    /// Run one item to a terminal state. Never fails: every problem ends up
    /// as `Skipped` or `Failed`.
    pub async fn process(
        &self,
        ctx: ExtractionContext,
        backend: ModelHandle,
        interaction: &mut dyn Interaction,
    ) -> ItemOutcome {
        info!("Processing {} ({})", ctx.item_id, ctx.display_label);
        self.artifacts.source(&ctx.item_id, &ctx.content_text);

        match self.run(&ctx, backend, interaction).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("{} failed: {}", ctx.item_id, e);
                ItemOutcome::Failed {
                    item_id: ctx.item_id,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn run(
        &self,
        ctx: &ExtractionContext,
        backend: ModelHandle,
        interaction: &mut dyn Interaction,
    ) -> DraftResult<ItemOutcome> {
        let machine = self.settings.machine();
        let prompt = build_prompt(&self.settings.template, ctx, self.settings.default_zone.name());

        let mut item = ItemRun {
            state: ValidationState::Extracting,
            budget: RetryBudget::default(),
            backend,
            draft: None,
            receipt: None,
            problem: None,
        };

        while !item.state.is_terminal() {
            let signal = self.effect(&mut item, ctx, &prompt, interaction).await?;
            let (state, budget) = machine.step(item.state, &signal, item.budget);
            item.state = state;
            item.budget = budget;
        }

        Ok(self.outcome(item, ctx))
    }

    fn outcome(&self, item: ItemRun, ctx: &ExtractionContext) -> ItemOutcome {
        let with_problem = |base: String| match &item.problem {
            Some(problem) => format!("{}: {}", base, problem),
            None => base,
        };

        match (item.state, item.draft.clone(), item.receipt.clone()) {
            (ValidationState::Published, Some(draft), Some(receipt)) => {
                info!("{} published ({})", ctx.item_id, receipt);
                ItemOutcome::Published { draft, receipt }
            }
            (ValidationState::Skipped(reason), _, _) => {
                warn!("Skipping {}: {}", ctx.item_id, reason);
                ItemOutcome::Skipped {
                    item_id: ctx.item_id.clone(),
                    reason: reason.to_string(),
                }
            }
            (ValidationState::Failed(reason), _, _) => {
                warn!("{} failed: {}", ctx.item_id, reason);
                ItemOutcome::Failed {
                    item_id: ctx.item_id.clone(),
                    reason: with_problem(reason.to_string()),
                }
            }
            (state, _, _) => ItemOutcome::Failed {
                item_id: ctx.item_id.clone(),
                reason: format!("stopped in {:?}", state),
            },
        }
    }

    async fn effect(
        &self,
        item: &mut ItemRun,
        ctx: &ExtractionContext,
        prompt: &str,
        interaction: &mut dyn Interaction,
    ) -> DraftResult<Signal> {
        let zone = self.settings.default_zone;

        Ok(match item.state {
            ValidationState::Extracting => self.extract(item, ctx, prompt, interaction).await?,

            ValidationState::Parsed => {
                let Some(draft) = item.draft.as_mut() else {
                    return Ok(Signal::FieldsMissing);
                };
                match check_fields(draft, &ctx.display_label) {
                    Ok(()) => Signal::FieldsPresent,
                    Err(e) => {
                        info!("{}: {}", ctx.item_id, e);
                        Signal::FieldsMissing
                    }
                }
            }

            ValidationState::Incomplete => Signal::Proceed,

            ValidationState::AwaitingOperatorChoice => {
                let options = ["manual input", "another model", "skip"].map(String::from);
                let answer = interaction.ask_choice(OperatorChoice::PROMPT, &options)?;
                let choice = OperatorChoice::parse(&answer);

                match &choice {
                    OperatorChoice::AnotherModel if !item.budget.exhausted(self.settings.retry_cap) => {
                        self.switch_backend(item, interaction)?;
                    }
                    OperatorChoice::Invalid(text) => {
                        interaction.notify(&format!("'{}' is not one of the options", text));
                    }
                    _ => {}
                }
                Signal::Choice(choice)
            }

            ValidationState::ManualFill => {
                let draft = item.draft.take().unwrap_or_default();
                item.draft = Some(manual_fill(draft, &ctx.display_label, zone, interaction)?);
                Signal::ManualFilled
            }

            ValidationState::Complete => {
                if let Some(draft) = item.draft.as_mut() {
                    draft.attach_source(&ctx.content_text);
                }
                Signal::Proceed
            }

            ValidationState::Normalizing => {
                item.draft = item.draft.as_ref().map(|d| normalize(d, zone));
                Signal::Proceed
            }

            ValidationState::Confirming => {
                let draft = item
                    .draft
                    .take()
                    .ok_or(DraftError::MissingRequiredField("start"))?;
                match confirm(draft, zone, interaction)? {
                    Confirmation::Accepted(draft) => {
                        item.draft = Some(draft);
                        Signal::Accept
                    }
                    Confirmation::Restart => {
                        info!("Restarting {}", ctx.item_id);
                        Signal::Restart
                    }
                }
            }

            ValidationState::Restarting => {
                item.draft = None;
                Signal::Proceed
            }

            ValidationState::Publishing => self.publish(item, ctx, interaction).await?,

            ValidationState::Published | ValidationState::Skipped(_) | ValidationState::Failed(_) => {
                Signal::Proceed
            }
        })
    }

    async fn extract(
        &self,
        item: &mut ItemRun,
        ctx: &ExtractionContext,
        prompt: &str,
        interaction: &mut dyn Interaction,
    ) -> DraftResult<Signal> {
        let invocation = invoke_with_substitution(
            item.backend.clone(),
            prompt,
            &self.settings.markers,
            self.catalog,
            self.settings.mode,
            interaction,
        )
        .await;

        let reply = match invocation {
            Ok((used, reply)) => {
                item.backend = used;
                reply
            }
            Err(e @ DraftError::BackendResourceExhausted(_)) => {
                item.problem = Some(e.to_string());
                return Ok(Signal::InvocationFailed);
            }
            Err(e) => return Err(e),
        };

        let Some(reply) = reply else {
            info!("{}", DraftError::BackendNoResponse(item.backend.name().to_string()));
            return Ok(Signal::NoStructure);
        };
        self.artifacts.reply(&ctx.item_id, &reply);

        match extract_draft(&reply) {
            Some(draft) => {
                item.draft = Some(draft);
                Ok(Signal::StructureParsed)
            }
            None => {
                info!("No usable structure in reply from {}", item.backend.name());
                Ok(Signal::NoStructure)
            }
        }
    }

    fn switch_backend(&self, item: &mut ItemRun, interaction: &mut dyn Interaction) -> DraftResult<()> {
        let tried = [item.backend.name().to_string()];
        match choose_replacement(self.catalog, &tried, self.settings.mode, interaction)? {
            Some(name) => {
                info!("Switching to {}", name);
                item.backend = self.catalog.open(&name)?;
            }
            None => info!("Retrying with {}", item.backend.name()),
        }
        Ok(())
    }

    async fn publish(
        &self,
        item: &mut ItemRun,
        ctx: &ExtractionContext,
        interaction: &mut dyn Interaction,
    ) -> DraftResult<Signal> {
        let draft = item
            .draft
            .clone()
            .ok_or(DraftError::MissingRequiredField("start"))?;
        self.artifacts.draft(&ctx.item_id, &draft);

        let Some(destination) = select_destination(self.sink, self.settings.mode, interaction)? else {
            return Ok(Signal::NoDestination);
        };

        match self.sink.publish(&destination, &draft).await {
            Ok(receipt) => {
                item.receipt = Some(receipt);
                Ok(Signal::Published)
            }
            Err(e) => {
                item.problem = Some(e.to_string());
                let review = self.settings.mode == Mode::Interactive && {
                    interaction.notify(&e.to_string());
                    let answer = interaction.ask_choice(
                        "Publication failed: (r)eview the event or (g)ive up?",
                        &["review".to_string(), "give up".to_string()],
                    )?;
                    matches!(answer.trim().to_lowercase().as_str(), "r" | "review")
                };
                Ok(Signal::PublicationRejected { review })
            }
        }
    }
}

/// Ask the operator for whatever keeps the draft incomplete. A malformed
/// date/time is asked again; it does not count against the retry budget.
fn manual_fill(
    mut draft: EventDraft,
    display_label: &str,
    zone: Tz,
    interaction: &mut dyn Interaction,
) -> DraftResult<EventDraft> {
    if draft.summary.trim().is_empty() {
        draft.summary = display_label.trim().to_string();
    }
    while draft.summary.trim().is_empty() {
        draft.summary = interaction.ask_text("Summary")?.trim().to_string();
    }

    let start = ask_datetime(interaction, &format!("Start ({})", MANUAL_FORMAT_HINT))?;
    draft.start = TimePoint::new(start.format("%Y-%m-%dT%H:%M:%S").to_string(), Some(zone.name()));

    // An end the model already found is kept on an empty answer
    let current_end = instant_of(&draft.end, zone).map(|end| end.with_timezone(&zone));
    let end_prompt = match current_end {
        Some(end) => format!(
            "End ({}, empty to keep {})",
            MANUAL_FORMAT_HINT,
            end.format("%Y-%m-%d %H:%M:%S")
        ),
        None => format!("End ({}, empty for 30 minutes)", MANUAL_FORMAT_HINT),
    };
    let end = loop {
        let answer = interaction.ask_text(&end_prompt)?;
        if answer.trim().is_empty() {
            break None;
        }
        match parse_typed_datetime(&answer) {
            Ok(dt) => break Some(dt),
            Err(e) => interaction.notify(&e.to_string()),
        }
    };
    match end {
        Some(end) => {
            draft.end = TimePoint::new(end.format("%Y-%m-%dT%H:%M:%S").to_string(), Some(zone.name()));
        }
        None if current_end.is_none() => draft.end = TimePoint::default(),
        None => {}
    }

    Ok(draft)
}
