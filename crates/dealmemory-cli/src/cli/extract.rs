//! Extraction commands: build a prompt, apply a response, quick scan.
//!
//! These let an operator drive the learning loop by hand: `prompt` prints
//! what would be sent to the model, `apply` stores what it answered.

use std::path::Path;

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use tokio::io::AsyncReadExt;

use dealmemory_core::memory::extractor::{
    EXTRACTION_SYSTEM_PROMPT, apply_extraction, build_extraction_prompt, quick_extract,
};
use dealmemory_types::llm::Message;
use dealmemory_types::memory::{MemoryUpdate, UpdateAction};

use crate::state::AppState;

/// Parse a saved conversation of `{role, content}` objects.
pub fn parse_transcript(raw: &str) -> Result<Vec<Message>> {
    let messages: Vec<Message> =
        serde_json::from_str(raw).context("Transcript must be a JSON array of {role, content}")?;
    Ok(messages)
}

/// Print the extraction prompt for the conversation in `transcript`.
pub async fn prompt(state: &AppState, transcript: &Path, json: bool) -> Result<()> {
    let raw = tokio::fs::read_to_string(transcript)
        .await
        .with_context(|| format!("Failed to read {}", transcript.display()))?;
    let messages = parse_transcript(&raw)?;
    let memory = state.store.read().await;
    let prompt = build_extraction_prompt(&messages, &memory);

    if json {
        let result = serde_json::json!({
            "system": EXTRACTION_SYSTEM_PROMPT,
            "prompt": prompt,
            "messageCount": messages.len(),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{prompt}");
    }

    Ok(())
}

/// Apply a model's extraction answer, read from a file or `-` for stdin.
pub async fn apply(state: &AppState, input: &str, json: bool) -> Result<()> {
    let raw = if input == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("Failed to read extraction from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("Failed to read {input}"))?
    };

    if raw.trim().is_empty() {
        bail!("Extraction input is empty");
    }

    let updates = apply_extraction(&state.store, &raw).await;
    print_updates(&updates, "Nothing new learned.", json)
}

/// Show the tentative signals in one exchange without storing them.
pub fn quick(user_text: &str, assistant_text: &str, json: bool) -> Result<()> {
    let signals = quick_extract(user_text, assistant_text);
    print_updates(&signals, "No signals detected.", json)
}

fn print_updates(updates: &[MemoryUpdate], empty_message: &str, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(updates)?);
        return Ok(());
    }

    println!();
    if updates.is_empty() {
        println!("  {} {empty_message}", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Type").fg(Color::White),
        Cell::new("Action").fg(Color::White),
        Cell::new("Description").fg(Color::White),
        Cell::new("Source").fg(Color::White),
    ]);

    for update in updates {
        let action = match update.action {
            UpdateAction::Add => Cell::new("add").fg(Color::Green),
            UpdateAction::Update => Cell::new("update").fg(Color::Yellow),
            UpdateAction::Remove => Cell::new("remove").fg(Color::Red),
        };
        let source = if update.explicit { "explicit" } else { "inferred" };
        table.add_row(vec![
            Cell::new(update.kind.to_string()).fg(Color::Cyan),
            action,
            Cell::new(&update.description).fg(Color::White),
            Cell::new(source).fg(Color::DarkGrey),
        ]);
    }

    println!("{table}");
    println!();
    println!(
        "  {} update{}",
        style(updates.len()).bold(),
        if updates.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}
