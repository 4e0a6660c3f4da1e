//! Validation and completion state machine.
//!
//! `Machine::step` is a pure transition function. All side effects (invoking
//! a backend, prompting the operator, publishing) live in the interpreter in
//! `pipeline.rs`, which feeds the outcome of each effect back in as a
//! `Signal`.

use std::fmt;

use crate::draft::EventDraft;
use crate::error::{DraftError, DraftResult};
use crate::normalize::parse_date_time;

/// Whether an operator is present to answer prompts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Interactive,
    Unattended,
}

/// Per-item recovery counters. Both count against the same cap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryBudget {
    pub alternate_backend_attempts: u32,
    pub invalid_choice_attempts: u32,
}

impl RetryBudget {
    pub fn used(&self) -> u32 {
        self.alternate_backend_attempts + self.invalid_choice_attempts
    }

    pub fn exhausted(&self, cap: u32) -> bool {
        self.used() >= cap
    }
}

/// What the operator typed when asked how to complete a draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorChoice {
    ManualInput,
    AnotherModel,
    Skip,
    Invalid(String),
}

impl OperatorChoice {
    pub const PROMPT: &'static str = "Incomplete event: (m)anual input, (a)nother model or (s)kip?";

    pub fn parse(input: &str) -> Self {
        match input.trim().to_lowercase().as_str() {
            "m" | "manual" | "manual input" => OperatorChoice::ManualInput,
            "a" | "another" | "another model" => OperatorChoice::AnotherModel,
            "s" | "skip" => OperatorChoice::Skip,
            _ => OperatorChoice::Invalid(input.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    IncompleteUnattended,
    OperatorSkipped,
    BudgetExhausted,
    NoDestination,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::IncompleteUnattended => write!(f, "incomplete event in unattended mode"),
            SkipReason::OperatorSkipped => write!(f, "skipped by operator"),
            SkipReason::BudgetExhausted => write!(f, "retry budget exhausted"),
            SkipReason::NoDestination => write!(f, "no calendar selected"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailReason {
    NoUsableBackend,
    PublicationRejected,
}

impl fmt::Display for FailReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailReason::NoUsableBackend => write!(f, "no backend could serve the request"),
            FailReason::PublicationRejected => write!(f, "publication rejected"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    Extracting,
    Parsed,
    Complete,
    Incomplete,
    AwaitingOperatorChoice,
    ManualFill,
    Normalizing,
    Confirming,
    Publishing,
    Restarting,
    Skipped(SkipReason),
    Published,
    Failed(FailReason),
}

impl ValidationState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ValidationState::Skipped(_) | ValidationState::Published | ValidationState::Failed(_)
        )
    }
}

/// Outcome of the effect performed in the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Extracting: the reply held a structure.
    StructureParsed,
    /// Extracting: no reply, or nothing parseable in it.
    NoStructure,
    /// Extracting: resource exhaustion with no replacement backend.
    InvocationFailed,
    FieldsPresent,
    FieldsMissing,
    Choice(OperatorChoice),
    ManualFilled,
    /// Leave a state that has no decision of its own.
    Proceed,
    Accept,
    Restart,
    Published,
    NoDestination,
    /// `review` asks to return to confirmation instead of failing.
    PublicationRejected { review: bool },
}

/// The transition function, configured once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Machine {
    pub mode: Mode,
    pub cap: u32,
    pub confirm: bool,
}

impl Machine {
    pub fn new(mode: Mode, cap: u32, confirm: bool) -> Self {
        Machine { mode, cap, confirm }
    }

    /// Apply one signal. A signal that does not apply to `state` leaves both
    /// state and budget unchanged.
    pub fn step(
        &self,
        state: ValidationState,
        signal: &Signal,
        budget: RetryBudget,
    ) -> (ValidationState, RetryBudget) {
        use ValidationState as S;

        let interactive = self.mode == Mode::Interactive;

        match (state, signal) {
            (S::Extracting, Signal::StructureParsed) => (S::Parsed, budget),
            (S::Extracting, Signal::NoStructure) => (S::Incomplete, budget),
            (S::Extracting, Signal::InvocationFailed) => (S::Failed(FailReason::NoUsableBackend), budget),

            (S::Parsed, Signal::FieldsPresent) => (S::Complete, budget),
            (S::Parsed, Signal::FieldsMissing) => (S::Incomplete, budget),

            (S::Incomplete, Signal::Proceed) => {
                if !interactive {
                    (S::Skipped(SkipReason::IncompleteUnattended), budget)
                } else if budget.exhausted(self.cap) {
                    (S::Skipped(SkipReason::BudgetExhausted), budget)
                } else {
                    (S::AwaitingOperatorChoice, budget)
                }
            }

            (S::AwaitingOperatorChoice, Signal::Choice(choice)) => self.choose(choice, budget),

            (S::ManualFill, Signal::ManualFilled) => (S::Complete, budget),

            (S::Complete, Signal::Proceed) => (S::Normalizing, budget),
            (S::Normalizing, Signal::Proceed) => {
                if interactive && self.confirm {
                    (S::Confirming, budget)
                } else {
                    (S::Publishing, budget)
                }
            }

            (S::Confirming, Signal::Accept) => (S::Publishing, budget),
            (S::Confirming, Signal::Restart) => (S::Restarting, budget),
            (S::Restarting, Signal::Proceed) => (S::Extracting, budget),

            (S::Publishing, Signal::Published) => (S::Published, budget),
            (S::Publishing, Signal::NoDestination) => (S::Skipped(SkipReason::NoDestination), budget),
            (S::Publishing, Signal::PublicationRejected { review }) => {
                if interactive && *review {
                    (S::Confirming, budget)
                } else {
                    (S::Failed(FailReason::PublicationRejected), budget)
                }
            }

            (state, _) => (state, budget),
        }
    }

    fn choose(&self, choice: &OperatorChoice, mut budget: RetryBudget) -> (ValidationState, RetryBudget) {
        use ValidationState as S;

        match choice {
            OperatorChoice::ManualInput => (S::ManualFill, budget),
            OperatorChoice::Skip => (S::Skipped(SkipReason::OperatorSkipped), budget),
            OperatorChoice::AnotherModel => {
                if budget.exhausted(self.cap) {
                    return (S::Skipped(SkipReason::BudgetExhausted), budget);
                }
                budget.alternate_backend_attempts += 1;
                (S::Extracting, budget)
            }
            OperatorChoice::Invalid(_) => {
                budget.invalid_choice_attempts += 1;
                if budget.exhausted(self.cap) {
                    (S::Skipped(SkipReason::BudgetExhausted), budget)
                } else {
                    (S::AwaitingOperatorChoice, budget)
                }
            }
        }
    }
}

/// Field check run on a parsed draft.
///
/// An empty summary is replaced by `display_label`. The start time is the
/// only field whose absence makes a draft incomplete; it must be a date-time
/// the normalizer can read.
pub fn check_fields(draft: &mut EventDraft, display_label: &str) -> DraftResult<()> {
    if draft.summary.trim().is_empty() {
        draft.summary = display_label.trim().to_string();
    }

    let start_ok = draft
        .start
        .date_time
        .as_deref()
        .is_some_and(|dt| parse_date_time(dt).is_some());
    if !start_ok {
        return Err(DraftError::MissingRequiredField("start"));
    }
    if draft.summary.is_empty() {
        return Err(DraftError::MissingRequiredField("summary"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::draft::TimePoint;
    use ValidationState as S;

    fn interactive() -> Machine {
        Machine::new(Mode::Interactive, 3, true)
    }

    fn run(machine: &Machine, signals: &[Signal]) -> (ValidationState, RetryBudget) {
        signals
            .iter()
            .fold((S::Extracting, RetryBudget::default()), |(state, budget), signal| {
                machine.step(state, signal, budget)
            })
    }

    #[test]
    fn happy_path_reaches_published() {
        let (state, budget) = run(
            &interactive(),
            &[
                Signal::StructureParsed,
                Signal::FieldsPresent,
                Signal::Proceed,
                Signal::Proceed,
                Signal::Accept,
                Signal::Published,
            ],
        );
        assert_eq!(state, S::Published);
        assert_eq!(budget, RetryBudget::default());
    }

    #[test]
    fn unattended_skips_confirmation_and_incomplete_items() {
        let machine = Machine::new(Mode::Unattended, 3, true);

        let (state, _) = run(
            &machine,
            &[Signal::StructureParsed, Signal::FieldsPresent, Signal::Proceed, Signal::Proceed],
        );
        assert_eq!(state, S::Publishing);

        let (state, _) = run(&machine, &[Signal::NoStructure, Signal::Proceed]);
        assert_eq!(state, S::Skipped(SkipReason::IncompleteUnattended));
    }

    #[test]
    fn three_failed_alternate_models_force_skip() {
        let machine = interactive();
        let mut state = S::Extracting;
        let mut budget = RetryBudget::default();
        let mut prompts = 0;

        while !state.is_terminal() {
            let signal = match state {
                S::Extracting => Signal::NoStructure,
                S::Incomplete => Signal::Proceed,
                S::AwaitingOperatorChoice => {
                    prompts += 1;
                    Signal::Choice(OperatorChoice::AnotherModel)
                }
                other => panic!("Unexpected state {:?}", other),
            };
            (state, budget) = machine.step(state, &signal, budget);
        }

        assert_eq!(state, S::Skipped(SkipReason::BudgetExhausted));
        assert_eq!(prompts, 3);
        assert_eq!(budget.alternate_backend_attempts, 3);
    }

    #[test]
    fn invalid_choices_share_the_budget() {
        let machine = interactive();
        let budget = RetryBudget {
            alternate_backend_attempts: 1,
            invalid_choice_attempts: 0,
        };

        let (state, budget) = machine.step(
            S::AwaitingOperatorChoice,
            &Signal::Choice(OperatorChoice::parse("maybe")),
            budget,
        );
        assert_eq!(state, S::AwaitingOperatorChoice);
        assert_eq!(budget.used(), 2);

        let (state, budget) = machine.step(state, &Signal::Choice(OperatorChoice::parse("?")), budget);
        assert_eq!(state, S::Skipped(SkipReason::BudgetExhausted));
        assert_eq!(budget.invalid_choice_attempts, 2);
    }

    #[test]
    fn manual_input_and_skip_do_not_consume_budget() {
        let machine = interactive();

        let (state, budget) = run(
            &machine,
            &[
                Signal::NoStructure,
                Signal::Proceed,
                Signal::Choice(OperatorChoice::ManualInput),
                Signal::ManualFilled,
            ],
        );
        assert_eq!(state, S::Complete);
        assert_eq!(budget.used(), 0);

        let (state, _) = run(
            &machine,
            &[Signal::NoStructure, Signal::Proceed, Signal::Choice(OperatorChoice::Skip)],
        );
        assert_eq!(state, S::Skipped(SkipReason::OperatorSkipped));
    }

    #[test]
    fn restart_reenters_extraction_keeping_budget() {
        let machine = interactive();
        let budget = RetryBudget {
            alternate_backend_attempts: 2,
            invalid_choice_attempts: 0,
        };

        let (state, budget) = machine.step(S::Confirming, &Signal::Restart, budget);
        assert_eq!(state, S::Restarting);
        let (state, budget) = machine.step(state, &Signal::Proceed, budget);
        assert_eq!(state, S::Extracting);
        assert_eq!(budget.alternate_backend_attempts, 2);
    }

    #[test]
    fn rejected_publication_routes_by_mode() {
        let rejected = Signal::PublicationRejected { review: true };

        let (state, _) = interactive().step(S::Publishing, &rejected, RetryBudget::default());
        assert_eq!(state, S::Confirming);

        let unattended = Machine::new(Mode::Unattended, 3, false);
        let (state, _) = unattended.step(S::Publishing, &rejected, RetryBudget::default());
        assert_eq!(state, S::Failed(FailReason::PublicationRejected));

        let (state, _) = interactive().step(
            S::Publishing,
            &Signal::PublicationRejected { review: false },
            RetryBudget::default(),
        );
        assert_eq!(state, S::Failed(FailReason::PublicationRejected));
    }

    #[test]
    fn exhausted_backend_fails_the_item() {
        let (state, _) = run(&interactive(), &[Signal::InvocationFailed]);
        assert_eq!(state, S::Failed(FailReason::NoUsableBackend));
    }

    #[test]
    fn unrelated_signal_is_ignored() {
        let before = (S::Parsed, RetryBudget::default());
        assert_eq!(interactive().step(before.0, &Signal::Accept, before.1), before);
    }

    #[test]
    fn parses_operator_choices() {
        assert_eq!(OperatorChoice::parse(" M "), OperatorChoice::ManualInput);
        assert_eq!(OperatorChoice::parse("another model"), OperatorChoice::AnotherModel);
        assert_eq!(OperatorChoice::parse("s"), OperatorChoice::Skip);
        assert_eq!(OperatorChoice::parse("x"), OperatorChoice::Invalid("x".into()));
    }

    #[test]
    fn empty_summary_takes_display_label() {
        let mut draft = EventDraft {
            start: TimePoint::new("2024-01-01T10:00:00", None),
            ..Default::default()
        };

        check_fields(&mut draft, "Quarterly review").unwrap();
        assert_eq!(draft.summary, "Quarterly review");
    }

    #[test]
    fn missing_or_unreadable_start_is_incomplete() {
        let mut draft = EventDraft {
            summary: "Lunch".into(),
            ..Default::default()
        };
        assert!(matches!(
            check_fields(&mut draft, "label"),
            Err(DraftError::MissingRequiredField("start"))
        ));

        draft.start = TimePoint::new("soon", None);
        assert!(check_fields(&mut draft, "label").is_err());
    }

    #[test]
    fn start_outside_calendar_years_is_incomplete() {
        for start in ["+262142-12-31T23:50:00Z", "0000-12-31T10:00:00", "10000-01-01"] {
            let mut draft = EventDraft {
                summary: "Lunch".into(),
                start: TimePoint::new(start, None),
                ..Default::default()
            };
            assert!(
                matches!(
                    check_fields(&mut draft, "label"),
                    Err(DraftError::MissingRequiredField("start"))
                ),
                "{} accepted",
                start
            );
        }

        let mut draft = EventDraft {
            summary: "Lunch".into(),
            start: TimePoint::new("9999-12-31T23:50:00Z", None),
            ..Default::default()
        };
        assert!(check_fields(&mut draft, "label").is_ok());
    }
}
