use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use caldraft_core::artifacts::{ArtifactSink, FsArtifacts, NoArtifacts};
use caldraft_core::calendar::Router;
use caldraft_core::config::{CaldraftConfig, UnattendedBackend};
use caldraft_core::context::ExtractionContext;
use caldraft_core::interaction::{Interaction, Unattended};
use caldraft_core::model::ModelCatalog;
use caldraft_core::pipeline::{ItemOutcome, Pipeline, PipelineSettings};
use caldraft_core::validation::Mode;
use chrono::{DateTime, FixedOffset, Local, TimeDelta, Utc};
use owo_colors::OwoColorize;
use tracing::{error, info};

use crate::backends::ConfiguredCatalog;
use crate::console::Console;
use crate::render::{Render, pluralize};

pub struct ProcessArgs {
    pub files: Vec<PathBuf>,
    pub subject: Option<String>,
    pub date: Option<String>,
    pub max_age: Option<String>,
    pub interactive: bool,
    pub backend: Option<String>,
    pub destination: Option<String>,
    pub no_confirm: bool,
}

pub async fn run(config: &CaldraftConfig, args: ProcessArgs) -> Result<()> {
    let mode = if args.interactive {
        Mode::Interactive
    } else {
        Mode::Unattended
    };

    let mut settings = PipelineSettings::from_config(config, mode).context("Invalid configuration")?;
    if args.no_confirm {
        settings.confirm = false;
    }
    let max_age = parse_max_age(args.max_age.as_deref(), config.max_age_days)?;
    let reference = args.date.as_deref().map(parse_reference).transpose()?;

    let catalog = ConfiguredCatalog::from_config(config)?;
    let backend = catalog.open(&backend_name(config, mode, args.backend.as_deref())?)?;

    let preferred = args.destination.or_else(|| config.default_destination.clone());
    let router = Router::from_config(&config.destinations, preferred)?;

    let artifacts: Box<dyn ArtifactSink> = match config.artifact_path() {
        Some(dir) => Box::new(FsArtifacts::new(dir)),
        None => Box::new(NoArtifacts),
    };

    let items = load_items(&args.files, args.subject.as_deref(), reference)?;

    let pipeline = Pipeline {
        settings: &settings,
        catalog: &catalog,
        sink: &router,
        artifacts: artifacts.as_ref(),
    };
    let mut interaction: Box<dyn Interaction> = match mode {
        Mode::Interactive => Box::new(Console::new(settings.default_zone)),
        Mode::Unattended => Box::new(Unattended),
    };

    info!(
        "Processing {} {} with {}",
        items.len(),
        pluralize("item", items.len()),
        backend.name()
    );

    let mut tally = Tally::default();
    for item in items {
        let outcome = match item {
            Err(unreadable) => unreadable,
            Ok(ctx) => match stale_by(ctx.reference_instant, Utc::now(), max_age) {
                Some(age) if !accept_stale(&ctx, age, mode, interaction.as_mut()) => ItemOutcome::Skipped {
                    reason: format!("older than {}", humantime::format_duration(round_to_days(max_age))),
                    item_id: ctx.item_id,
                },
                _ => pipeline.process(ctx, backend.clone(), interaction.as_mut()).await,
            },
        };

        println!("{}", outcome.render());
        tally.record(&outcome);
    }

    println!();
    println!("{}", tally.render());

    Ok(())
}

/// `--backend`, else `default_backend`. Unattended runs configured with
/// `unattended_backend = "fallback"` always use the fallback.
fn backend_name(config: &CaldraftConfig, mode: Mode, requested: Option<&str>) -> Result<String> {
    if mode == Mode::Unattended && config.unattended_backend == UnattendedBackend::Fallback {
        if let Some(name) = &config.fallback_backend {
            return Ok(name.clone());
        }
    }

    requested
        .map(str::to_string)
        .or_else(|| config.default_backend_name())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No backends configured.\n\n\
                Add one to your config file, for example:\n  \
                [backends.local]\n  \
                kind = \"ollama\"\n  \
                model = \"llama3.1\""
            )
        })
}

fn parse_reference(input: &str) -> Result<DateTime<FixedOffset>> {
    DateTime::parse_from_rfc3339(input.trim())
        .with_context(|| format!("Invalid --date '{}', expected RFC 3339 (2024-05-02T09:30:00+02:00)", input))
}

fn parse_max_age(input: Option<&str>, default_days: i64) -> Result<TimeDelta> {
    match input {
        Some(text) => {
            let duration = humantime::parse_duration(text)
                .with_context(|| format!("Invalid --max-age '{}'", text))?;
            TimeDelta::from_std(duration).with_context(|| format!("--max-age '{}' is too large", text))
        }
        None => Ok(TimeDelta::days(default_days)),
    }
}

fn round_to_days(delta: TimeDelta) -> std::time::Duration {
    let days = delta.num_days().max(0) as u64;
    if days > 0 {
        std::time::Duration::from_secs(days * 86_400)
    } else {
        std::time::Duration::from_secs(delta.num_seconds().max(0) as u64)
    }
}

/// How old an item is, if it is older than `max_age`.
fn stale_by(reference: DateTime<FixedOffset>, now: DateTime<Utc>, max_age: TimeDelta) -> Option<TimeDelta> {
    let age = now.signed_duration_since(reference);
    if age > max_age { Some(age) } else { None }
}

fn accept_stale(ctx: &ExtractionContext, age: TimeDelta, mode: Mode, interaction: &mut dyn Interaction) -> bool {
    if mode == Mode::Unattended {
        return false;
    }

    let prompt = format!(
        "'{}' is {} old. Process anyway? (y/N)",
        ctx.display_label,
        humantime::format_duration(round_to_days(age))
    );
    interaction
        .ask_choice(&prompt, &["yes".to_string(), "no".to_string()])
        .map(|answer| matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
        .unwrap_or(false)
}

/// Display label for an item: `--subject`, else the first non-empty line.
fn label_for(body: &str, subject: Option<&str>, fallback: &str) -> String {
    subject
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| {
            body.lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| fallback.to_string())
}

fn modified_at(path: &Path) -> Option<DateTime<FixedOffset>> {
    let modified: SystemTime = std::fs::metadata(path).ok()?.modified().ok()?;
    Some(DateTime::<Local>::from(modified).fixed_offset())
}

/// An item ready for the pipeline, or the failure of a file that could not
/// be read.
type LoadedItem = std::result::Result<ExtractionContext, ItemOutcome>;

/// One context per file, or a single one read from stdin. An unreadable file
/// fails on its own and the rest still run.
fn load_items(
    files: &[PathBuf],
    subject: Option<&str>,
    reference: Option<DateTime<FixedOffset>>,
) -> Result<Vec<LoadedItem>> {
    if files.is_empty() {
        let body = std::io::read_to_string(std::io::stdin()).context("Could not read stdin")?;
        let reference = reference.unwrap_or_else(|| Local::now().fixed_offset());
        let label = label_for(&body, subject, "stdin");
        return Ok(vec![Ok(ExtractionContext::from_parts(&label, body.trim(), reference, "stdin"))]);
    }

    Ok(files.iter().map(|path| load_file(path, subject, reference)).collect())
}

fn load_file(path: &Path, subject: Option<&str>, reference: Option<DateTime<FixedOffset>>) -> LoadedItem {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let body = std::fs::read_to_string(path).map_err(|e| {
        error!("Could not read {}: {}", path.display(), e);
        ItemOutcome::Failed {
            item_id: name.clone(),
            reason: format!("could not read {}: {}", path.display(), e),
        }
    })?;

    let reference = reference
        .or_else(|| modified_at(path))
        .unwrap_or_else(|| Local::now().fixed_offset());
    let label = label_for(&body, subject, &name);
    Ok(ExtractionContext::from_parts(&label, body.trim(), reference, name))
}

#[derive(Debug, Default)]
struct Tally {
    published: usize,
    skipped: usize,
    failed: usize,
}

impl Tally {
    fn record(&mut self, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Published { .. } => self.published += 1,
            ItemOutcome::Skipped { .. } => self.skipped += 1,
            ItemOutcome::Failed { .. } => self.failed += 1,
        }
    }

    fn render(&self) -> String {
        let total = self.published + self.skipped + self.failed;
        format!(
            "{} {}: {}, {}, {}",
            total,
            pluralize("item", total),
            format!("{} published", self.published).green(),
            format!("{} skipped", self.skipped).yellow(),
            format!("{} failed", self.failed).red()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use caldraft_core::interaction::ScriptedInteraction;

    fn config(toml: &str) -> CaldraftConfig {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, toml).unwrap();
        CaldraftConfig::load_from(&path).unwrap()
    }

    const BACKENDS: &str = r#"
default_backend = "big"
fallback_backend = "small"

[backends.big]
kind = "ollama"
model = "llama3.1:70b"

[backends.small]
kind = "ollama"
model = "qwen2.5:0.5b"
"#;

    #[test]
    fn backend_selection() {
        let selected = config(BACKENDS);
        assert_eq!(backend_name(&selected, Mode::Unattended, None).unwrap(), "big");
        assert_eq!(backend_name(&selected, Mode::Interactive, Some("small")).unwrap(), "small");

        let fallback = config(&format!("unattended_backend = \"fallback\"\n{}", BACKENDS));
        assert_eq!(backend_name(&fallback, Mode::Unattended, Some("big")).unwrap(), "small");
        assert_eq!(backend_name(&fallback, Mode::Interactive, None).unwrap(), "big");

        assert!(backend_name(&config(""), Mode::Unattended, None).is_err());
    }

    #[test]
    fn stale_items() {
        let now = DateTime::parse_from_rfc3339("2024-05-10T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let week = TimeDelta::days(7);

        let recent = DateTime::parse_from_rfc3339("2024-05-05T12:00:00+02:00").unwrap();
        assert_eq!(stale_by(recent, now, week), None);

        let old = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z").unwrap();
        assert_eq!(stale_by(old, now, week), Some(TimeDelta::days(9)));
    }

    #[test]
    fn stale_items_need_a_yes() {
        let reference = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z").unwrap();
        let ctx = ExtractionContext::from_parts("Old news", "body", reference, "old");

        assert!(!accept_stale(&ctx, TimeDelta::days(9), Mode::Unattended, &mut Unattended));

        let mut script = ScriptedInteraction::new(["y", "", "no"]);
        assert!(accept_stale(&ctx, TimeDelta::days(9), Mode::Interactive, &mut script));
        assert!(!accept_stale(&ctx, TimeDelta::days(9), Mode::Interactive, &mut script));
        assert!(!accept_stale(&ctx, TimeDelta::days(9), Mode::Interactive, &mut script));
        assert!(script.prompts[0].contains("9days"), "{}", script.prompts[0]);
    }

    #[test]
    fn max_age_accepts_humantime() {
        assert_eq!(parse_max_age(None, 7).unwrap(), TimeDelta::days(7));
        assert_eq!(parse_max_age(Some("36h"), 7).unwrap(), TimeDelta::hours(36));
        assert!(parse_max_age(Some("a while"), 7).is_err());
    }

    #[test]
    fn labels() {
        assert_eq!(label_for("\n  Concert tickets\nbody", None, "mail.eml"), "Concert tickets");
        assert_eq!(label_for("body", Some(" Dentist "), "mail.eml"), "Dentist");
        assert_eq!(label_for("   \n", None, "mail.eml"), "mail.eml");
    }

    #[test]
    fn files_become_contexts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invite.txt");
        std::fs::write(&path, "Board meeting\nThursday at 10 in room 4\n").unwrap();
        let reference = parse_reference("2024-05-02T09:30:00+02:00").unwrap();

        let items = load_items(&[path], None, Some(reference)).unwrap();

        assert_eq!(items.len(), 1);
        let Ok(item) = &items[0] else {
            panic!("Expected a context, got {:?}", items[0]);
        };
        assert_eq!(item.item_id, "invite.txt");
        assert_eq!(item.display_label, "Board meeting");
        assert_eq!(item.reference_instant, reference);
        assert!(item.content_text.contains("Date:2024-05-02 09:30:00 +02:00"));
        assert!(item.content_text.ends_with("room 4"));
    }

    #[test]
    fn unreadable_file_fails_alone() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("invite.txt");
        std::fs::write(&good, "Board meeting\nThursday at 10\n").unwrap();
        let missing = dir.path().join("nope.txt");

        let items = load_items(&[missing, good], None, None).unwrap();

        assert_eq!(items.len(), 2);
        match &items[0] {
            Err(ItemOutcome::Failed { item_id, reason }) => {
                assert_eq!(item_id, "nope.txt");
                assert!(reason.starts_with("could not read"), "{}", reason);
            }
            other => panic!("Expected a failure, got {:?}", other),
        }
        assert!(matches!(&items[1], Ok(ctx) if ctx.item_id == "invite.txt"));

        let mut tally = Tally::default();
        if let Err(failed) = &items[0] {
            tally.record(failed);
        }
        assert_eq!(tally.failed, 1);
    }
}
