//! Manual entries: deal decisions and free-form context.

use anyhow::{Result, bail};
use chrono::Utc;
use console::style;

use dealmemory_types::memory::{DealOutcome, Outcome};

use crate::cli::flag::report;
use crate::state::AppState;

/// Record a decision on `company`, replacing any earlier one.
///
/// # Examples
///
/// ```bash
/// dealmem deal TechCo pass --reason "burn rate" --reason "runway"
/// ```
pub async fn record_deal(
    state: &AppState,
    company: &str,
    outcome: Outcome,
    reasons: Vec<String>,
    json: bool,
) -> Result<()> {
    let company = company.trim();
    if company.is_empty() {
        bail!("Company name cannot be empty");
    }

    let reasons: Vec<String> = reasons
        .into_iter()
        .map(|r| r.trim().to_string())
        .filter(|r| !r.is_empty())
        .collect();

    let deal = DealOutcome {
        company: company.to_string(),
        outcome,
        reasons: (!reasons.is_empty()).then_some(reasons),
        date: Utc::now().to_rfc3339(),
        key_metrics: None,
    };

    let update = state.store.add_deal_outcome(deal).await?;
    report(&update, json)
}

/// Remember a free-form fact.
pub async fn add_context(state: &AppState, text: &str, json: bool) -> Result<()> {
    match state.store.add_raw_context(text).await? {
        Some(update) => report(&update, json),
        None if json => {
            println!("null");
            Ok(())
        }
        None => {
            println!();
            println!(
                "  {} Already remembered, nothing changed.",
                style("i").blue().bold()
            );
            println!();
            Ok(())
        }
    }
}
