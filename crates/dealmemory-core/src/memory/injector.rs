//! Memory injection into the assistant's system prompt.
//!
//! `render` turns a `Memory` into an XML-delimited block with one section
//! per non-empty field, always in the same order: thesis, red flags, memo
//! preferences, deal history, context. An empty memory renders as an empty
//! string so callers can concatenate unconditionally.

use dealmemory_types::memory::{
    DealOutcome, InvestmentThesis, KeyMetrics, MemoPreferences, Memory, RedFlag, Tone,
};

use super::format::{format_currency, format_number, format_percent};

const NOT_SPECIFIED: &str = "Not specified";

const MEMORY_PREAMBLE: &str = "You have memory of this user from previous sessions. \
Use this context to personalize your responses and make relevant connections.";

const MEMORY_CLOSING: &str = "IMPORTANT: Apply this knowledge naturally. Don't say \
\"based on your memory\" or \"according to my records.\" Refer to past decisions and \
patterns the way a colleague who remembers them would.";

/// Render `memory` as prompt context. Pure: equal input gives equal output.
pub fn render(memory: &Memory) -> String {
    let mut sections = Vec::new();

    if let Some(thesis) = &memory.investment_thesis {
        sections.push(render_thesis(thesis));
    }
    if !memory.red_flags.is_empty() {
        sections.push(render_red_flags(&memory.red_flags));
    }
    if let Some(prefs) = &memory.memo_preferences {
        sections.push(render_memo_preferences(prefs));
    }
    if !memory.deal_history.is_empty() {
        sections.push(render_deal_history(&memory.deal_history));
    }
    if !memory.raw_context.is_empty() {
        sections.push(render_context(&memory.raw_context));
    }

    if sections.is_empty() {
        return String::new();
    }

    format!(
        "<memory_context>\n{MEMORY_PREAMBLE}\n\n{}\n\n{MEMORY_CLOSING}\n</memory_context>",
        sections.join("\n\n")
    )
}

/// Append the memory block and the current deal's context to a base prompt.
///
/// Empty `memory_context` and `None` deal context add nothing.
pub fn build_system_prompt(base: &str, memory_context: &str, deal_context: Option<&str>) -> String {
    let mut prompt = base.to_owned();

    if !memory_context.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(memory_context);
    }

    if let Some(deal) = deal_context.filter(|d| !d.trim().is_empty()) {
        prompt.push_str("\n\n<current_deal_context>\n");
        prompt.push_str(deal.trim());
        prompt.push_str("\n</current_deal_context>");
    }

    prompt
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

fn join_or_unspecified(items: Option<&Vec<String>>, separator: &str) -> String {
    match items {
        Some(items) if !items.is_empty() => items.join(separator),
        _ => NOT_SPECIFIED.to_string(),
    }
}

fn render_thesis(thesis: &InvestmentThesis) -> String {
    let check_sizes = match thesis.check_size {
        Some(range) => format!(
            "{} - {}",
            format_currency(range.min),
            format_currency(range.max)
        ),
        None => NOT_SPECIFIED.to_string(),
    };

    format!(
        "<user_investment_thesis>\n\
         The user focuses on:\n\
         - Stages: {}\n\
         - Sectors: {}\n\
         - Check sizes: {check_sizes}\n\
         - Geography: {}\n\
         - Key priorities: {}\n\
         </user_investment_thesis>",
        join_or_unspecified(thesis.stages.as_ref(), ", "),
        join_or_unspecified(thesis.sectors.as_ref(), ", "),
        join_or_unspecified(thesis.geography.as_ref(), ", "),
        join_or_unspecified(thesis.priorities.as_ref(), ", "),
    )
}

fn red_flag_line(flag: &RedFlag) -> String {
    if flag.explicit {
        format!("- {} (explicit rule)", flag.description)
    } else {
        format!(
            "- {} (inferred, {:.0}% confidence)",
            flag.description,
            flag.confidence * 100.0
        )
    }
}

fn render_red_flags(flags: &[RedFlag]) -> String {
    let lines: Vec<String> = flags.iter().map(red_flag_line).collect();
    format!(
        "<user_red_flags>\n\
         The user has established these investment red flags from past decisions:\n\
         {}\n\n\
         When analyzing deals, proactively check for these patterns and flag them.\n\
         </user_red_flags>",
        lines.join("\n")
    )
}

fn tone_instruction(tone: Tone) -> &'static str {
    match tone {
        Tone::Direct => {
            "Be direct and give clear recommendations without hedging phrases like \"potentially\" or \"could be interesting\""
        }
        Tone::Balanced => "Provide balanced analysis with clear pros and cons",
        Tone::Cautious => "Be thorough and highlight every potential concern",
    }
}

fn render_memo_preferences(prefs: &MemoPreferences) -> String {
    let pages = prefs.max_length_pages.filter(|p| *p > 0.0).unwrap_or(2.0);
    let hedging = if prefs.hedge_language {
        "Hedge language is acceptable"
    } else {
        "Avoid hedge language and be decisive"
    };
    let structure = match &prefs.structure {
        Some(sections) if !sections.is_empty() => sections.join(" → "),
        _ => "Flexible structure".to_string(),
    };

    format!(
        "<user_memo_preferences>\n\
         When writing investment memos or analysis:\n\
         - Structure: {structure}\n\
         - Tone: {}\n\
         - Length: Keep to {} page(s) or less\n\
         - {hedging}\n\
         </user_memo_preferences>",
        tone_instruction(prefs.tone),
        format_number(pages),
    )
}

fn metrics_text(metrics: &KeyMetrics) -> String {
    let mut parts = Vec::new();
    if let Some(arr) = metrics.arr {
        parts.push(format!("arr: {}", format_currency(arr)));
    }
    if let Some(burn) = metrics.burn {
        parts.push(format!("burn: {}", format_currency(burn)));
    }
    if let Some(runway) = metrics.runway {
        parts.push(format!("runway: {}", format_number(runway)));
    }
    if let Some(concentration) = metrics.concentration {
        parts.push(format!("concentration: {}", format_percent(concentration)));
    }
    parts.join(", ")
}

fn deal_line(deal: &DealOutcome) -> String {
    let reasons = join_or_unspecified(deal.reasons.as_ref(), ", ");
    let metrics = deal.key_metrics.as_ref().map(metrics_text).unwrap_or_default();

    let mut line = format!(
        "- {}: {} - reasons: {reasons}",
        deal.company,
        deal.outcome.to_string().to_uppercase()
    );
    if !metrics.is_empty() {
        line.push_str(&format!(" ({metrics})"));
    }
    line
}

fn render_deal_history(deals: &[DealOutcome]) -> String {
    let lines: Vec<String> = deals.iter().map(deal_line).collect();
    format!(
        "<user_deal_history>\n\
         Recent deal decisions by this user:\n\
         {}\n\n\
         Use this history to spot patterns and draw comparisons when analyzing new deals.\n\
         </user_deal_history>",
        lines.join("\n")
    )
}

fn render_context(context: &[String]) -> String {
    let lines: Vec<String> = context.iter().map(|c| format!("- {c}")).collect();
    format!(
        "<user_context>\n\
         Additional context about this user:\n\
         {}\n\
         </user_context>",
        lines.join("\n")
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
