use anyhow::Result;
use caldraft_core::config::{CaldraftConfig, DestinationConfig};
use owo_colors::OwoColorize;

pub fn run(config: &CaldraftConfig) -> Result<()> {
    let config_path = CaldraftConfig::config_path()?;
    let unset = || "(unset)".to_string();

    println!("{}", "Paths".bold());
    println!("  Config:     {}", config_path.display());
    println!(
        "  Artifacts:  {}",
        config
            .artifact_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(unset)
    );
    println!(
        "  Log:        {}",
        config
            .log_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(unset)
    );
    println!(
        "  Prompt:     {}",
        config
            .prompt_template_path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(built-in)".to_string())
    );

    println!();
    println!("{}", "Pipeline".bold());
    match config.timezone() {
        Ok(zone) => println!("  Time zone:  {}", zone.name()),
        Err(e) => println!("  Time zone:  {}", e.to_string().red()),
    }
    if let Ok(system) = iana_time_zone::get_timezone() {
        println!("  System:     {}", system.dimmed());
    }
    println!("  Retry cap:  {}", config.retry_cap);
    println!("  Confirm:    {}", config.confirm);
    println!("  Max age:    {} days", config.max_age_days);
    println!(
        "  Backend:    {} (fallback: {}, unattended: {:?})",
        config.default_backend_name().unwrap_or_else(unset),
        config.fallback_backend.clone().unwrap_or_else(unset),
        config.unattended_backend
    );

    println!();
    println!("{}", "Destinations".bold());
    if config.destinations.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for (name, destination) in &config.destinations {
        let marker = if config.default_destination.as_deref() == Some(name.as_str()) {
            " (default)"
        } else {
            ""
        };
        let target = match destination {
            DestinationConfig::Local { path } => path.display().to_string(),
            DestinationConfig::Provider { provider, .. } => format!("caldir-provider-{}", provider),
        };
        println!("  {}{}  {}", name.bold(), marker, target.dimmed());
    }

    Ok(())
}
