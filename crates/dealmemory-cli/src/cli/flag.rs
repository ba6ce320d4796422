//! Red flag commands: list, remove, update.

use anyhow::{Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use dealmemory_types::memory::{MemoryUpdate, RedFlagPatch, Threshold};

use crate::cli::FlagCommand;
use crate::state::AppState;

/// Handle a flag subcommand.
pub async fn handle_flag_command(cmd: FlagCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        FlagCommand::List => list_flags(state, json).await,
        FlagCommand::Remove { id } => remove_flag(state, &id, json).await,
        FlagCommand::Update {
            id,
            description,
            threshold,
            confidence,
            explicit,
        } => {
            let patch = RedFlagPatch {
                threshold: threshold.as_deref().map(parse_threshold),
                description,
                learned_from: None,
                explicit,
                confidence,
            };
            update_flag(state, &id, patch, json).await
        }
    }
}

/// Numbers stay numeric so "18" and 18 render the same way.
pub fn parse_threshold(raw: &str) -> Threshold {
    match raw.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Threshold::Number(n),
        _ => Threshold::Text(raw.trim().to_string()),
    }
}

async fn list_flags(state: &AppState, json: bool) -> Result<()> {
    let memory = state.store.read().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&memory.red_flags)?);
        return Ok(());
    }

    println!();
    if memory.red_flags.is_empty() {
        println!(
            "  {} No red flags for '{}'. They are learned from conversations.",
            style("i").blue().bold(),
            style(&memory.user_id).cyan(),
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("ID").fg(Color::White),
        Cell::new("Pattern").fg(Color::White),
        Cell::new("Description").fg(Color::White),
        Cell::new("Threshold").fg(Color::White),
        Cell::new("Confidence").fg(Color::White),
        Cell::new("Seen").fg(Color::White),
    ]);

    for flag in &memory.red_flags {
        let confidence = if flag.explicit {
            Cell::new("explicit").fg(Color::Green)
        } else {
            Cell::new(format!("{:.0}%", flag.confidence * 100.0)).fg(Color::Yellow)
        };
        let threshold = flag
            .threshold
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(&flag.id).fg(Color::DarkGrey),
            Cell::new(&flag.pattern).fg(Color::Cyan),
            Cell::new(&flag.description).fg(Color::White),
            Cell::new(threshold),
            confidence,
            Cell::new(flag.times_applied),
        ]);
    }

    println!("{table}");
    println!();
    println!(
        "  {} red flag{}",
        style(memory.red_flags.len()).bold(),
        if memory.red_flags.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}

async fn remove_flag(state: &AppState, id: &str, json: bool) -> Result<()> {
    match state.store.remove_red_flag(id).await? {
        Some(update) => report(&update, json),
        None => bail!("No red flag with id '{id}'"),
    }
}

async fn update_flag(state: &AppState, id: &str, patch: RedFlagPatch, json: bool) -> Result<()> {
    if patch.is_empty() {
        bail!("Nothing to update; pass --description, --threshold, --confidence or --explicit");
    }
    if let Some(c) = patch.confidence {
        if !(0.0..=1.0).contains(&c) {
            bail!("Confidence must be between 0 and 1, got {c}");
        }
    }

    match state.store.update_red_flag(id, patch).await? {
        Some(update) => report(&update, json),
        None => bail!("No red flag with id '{id}'"),
    }
}

pub(crate) fn report(update: &MemoryUpdate, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(update)?);
    } else {
        println!();
        println!("  {} {}", style("✓").green().bold(), update.description);
        println!();
    }
    Ok(())
}
