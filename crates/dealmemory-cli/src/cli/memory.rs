//! Whole-memory commands: show, inject, reset.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use dialoguer::Confirm;

use dealmemory_core::memory::injector::{build_system_prompt, render};
use dealmemory_types::memory::MemorySummary;

use crate::state::AppState;

/// Summarize the stored memory.
///
/// # Examples
///
/// ```bash
/// dealmem show
/// dealmem show --json
/// ```
pub async fn show(state: &AppState, json: bool) -> Result<()> {
    let memory = state.store.read().await;
    let summary = MemorySummary::from(&memory);
    let bytes = serde_json::to_string(&memory)?.len();

    if json {
        let result = serde_json::json!({
            "userId": memory.user_id,
            "dataDir": state.data_dir,
            "bytes": bytes,
            "maxBytes": state.config.max_storage_bytes,
            "updatedAt": memory.updated_at,
            "summary": summary,
            "memory": memory,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    println!(
        "  Memory for '{}' (updated {})",
        style(&memory.user_id).cyan().bold(),
        style(memory.updated_at.format("%Y-%m-%d %H:%M")).dim(),
    );
    println!();

    if memory.is_empty() {
        println!(
            "  {} Nothing learned yet. Apply an extraction or add context to get started.",
            style("i").blue().bold(),
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Section").fg(Color::White),
        Cell::new("Stored").fg(Color::White),
    ]);

    let thesis = match &memory.investment_thesis {
        Some(t) => {
            let parts: Vec<String> = [&t.stages, &t.sectors]
                .into_iter()
                .flatten()
                .filter(|items| !items.is_empty())
                .map(|items| items.join(", "))
                .collect();
            if parts.is_empty() {
                "set".to_string()
            } else {
                parts.join(" / ")
            }
        }
        None => "-".to_string(),
    };
    let prefs = match &memory.memo_preferences {
        Some(p) => format!("{} tone", p.tone),
        None => "-".to_string(),
    };

    table.add_row(vec![Cell::new("Investment thesis"), Cell::new(thesis).fg(Color::Cyan)]);
    table.add_row(vec![
        Cell::new("Red flags"),
        Cell::new(summary.red_flag_count).fg(Color::Yellow),
    ]);
    table.add_row(vec![Cell::new("Memo preferences"), Cell::new(prefs).fg(Color::Cyan)]);
    table.add_row(vec![
        Cell::new("Deal history"),
        Cell::new(summary.deal_history_count).fg(Color::Yellow),
    ]);
    table.add_row(vec![
        Cell::new("Context notes"),
        Cell::new(summary.context_items).fg(Color::Yellow),
    ]);

    println!("{table}");
    println!();
    println!(
        "  {} item{} total, session {}, {} of {} bytes used",
        style(summary.total_items).bold(),
        if summary.total_items == 1 { "" } else { "s" },
        style(state.store.session_count().await).bold(),
        bytes,
        state.config.max_storage_bytes,
    );
    println!();

    Ok(())
}

/// Print the rendered memory block, optionally wrapped into a system prompt.
pub async fn inject(
    state: &AppState,
    base: Option<&str>,
    deal_context: Option<&str>,
    json: bool,
) -> Result<()> {
    let memory = state.store.read().await;
    let context = render(&memory);
    let text = match base {
        Some(base) => build_system_prompt(base, &context, deal_context),
        None => build_system_prompt("", &context, deal_context)
            .trim_start()
            .to_string(),
    };

    if json {
        let result = serde_json::json!({ "userId": memory.user_id, "prompt": text });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if text.is_empty() {
        eprintln!("  {} Nothing to inject yet.", style("i").blue().bold());
    } else {
        println!("{text}");
    }

    Ok(())
}

/// Forget everything stored for the user.
///
/// Asks for confirmation unless `force` is set. `full` also resets the
/// session counter.
pub async fn reset(state: &AppState, force: bool, full: bool, json: bool) -> Result<()> {
    if !force {
        let confirmed = Confirm::new()
            .with_prompt(format!(
                "Permanently forget everything learned about '{}'?",
                style(state.store.user_id()).red().bold()
            ))
            .default(false)
            .interact()?;

        if !confirmed {
            println!("  Cancelled.");
            return Ok(());
        }
    }

    let fresh = if full {
        state.store.full_reset().await?
    } else {
        state.store.reset().await?
    };

    if json {
        let result = serde_json::json!({
            "reset": fresh.user_id,
            "full": full,
            "updatedAt": fresh.updated_at,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!();
        println!(
            "  {} Memory cleared for '{}'",
            style("✓").green().bold(),
            style(&fresh.user_id).cyan(),
        );
        println!();
    }

    Ok(())
}
