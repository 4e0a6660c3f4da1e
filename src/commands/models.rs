use std::time::{Duration, Instant};

use anyhow::Result;
use caldraft_core::config::CaldraftConfig;
use caldraft_core::model::ModelCatalog;
use owo_colors::OwoColorize;

use crate::backends::ConfiguredCatalog;
use crate::utils::tui::create_spinner;

pub fn list(config: &CaldraftConfig) -> Result<()> {
    let catalog = ConfiguredCatalog::from_config(config)?;
    let names = catalog.names();

    if names.is_empty() {
        println!("No backends configured.");
        return Ok(());
    }

    let default = config.default_backend_name();
    for name in names {
        let Some(backend) = catalog.config(&name) else {
            continue;
        };

        let mut tags = Vec::new();
        if default.as_deref() == Some(name.as_str()) {
            tags.push("default");
        }
        if config.fallback_backend.as_deref() == Some(name.as_str()) {
            tags.push("fallback");
        }

        let kind = format!("{:?}", backend.kind).to_lowercase();
        println!(
            "{} {} {} {}",
            name.bold(),
            kind.dimmed(),
            backend.model,
            tags.join(", ").cyan()
        );
    }

    Ok(())
}

/// Send one prompt to every configured backend and report reply and time.
pub async fn evaluate(config: &CaldraftConfig, prompt: &str) -> Result<()> {
    let catalog = ConfiguredCatalog::from_config(config)?;

    for name in catalog.names() {
        let backend = match catalog.open(&name) {
            Ok(backend) => backend,
            Err(e) => {
                println!("{} {}", name.bold(), e.to_string().red());
                continue;
            }
        };

        let spinner = create_spinner(format!("{}", name.bold()));
        let started = Instant::now();
        let reply = backend.generate(prompt).await;
        let elapsed = Duration::from_millis(started.elapsed().as_millis() as u64);
        spinner.finish_and_clear();

        println!(
            "{} {}",
            name.bold(),
            humantime::format_duration(elapsed).to_string().dimmed()
        );
        match reply {
            Some(text) => println!("{}\n", text.trim()),
            None => println!("{}\n", "(no answer)".red()),
        }
    }

    Ok(())
}
