//! In-place edits on a `Memory` value.
//!
//! Every field-level change the store or the extractor makes goes through
//! these functions, so both paths share one learning rule. None of them
//! persist anything: the caller decides when to write.

use chrono::Utc;
use uuid::Uuid;

use dealmemory_types::memory::{
    DealOutcome, InvestmentThesis, MemoPreferences, Memory, MemoryUpdate, RedFlag,
    RedFlagCandidate, RedFlagPatch, UpdateAction, UpdateKind,
};

/// Confidence gained each time an existing red-flag pattern is seen again.
pub const CONFIDENCE_INCREMENT: f64 = 0.1;

/// Upper bound for any confidence value.
pub const MAX_CONFIDENCE: f64 = 1.0;

/// Lower bound for any confidence value.
pub const MIN_CONFIDENCE: f64 = 0.0;

/// Characters of a context string kept in its update description.
pub const CONTEXT_DESCRIPTION_CHARS: usize = 50;

/// The reinforcement rule: raise `existing` by `increment`, never above `cap`.
///
/// Monotonic and non-decaying; see DESIGN.md for the open question on decay.
pub fn reinforce(existing: f64, increment: f64, cap: f64) -> f64 {
    (existing + increment).min(cap)
}

/// Clamp an externally supplied confidence into [0, 1]. NaN becomes 0.
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        return MIN_CONFIDENCE;
    }
    confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE)
}

/// Fresh opaque red-flag id.
pub fn new_red_flag_id() -> String {
    format!("rf_{}", Uuid::now_v7().simple())
}

fn to_data<T: serde::Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_default()
}

/// Add a red flag, or reinforce the existing flag with the same pattern.
pub fn add_red_flag(memory: &mut Memory, candidate: RedFlagCandidate) -> MemoryUpdate {
    if let Some(existing) = memory
        .red_flags
        .iter_mut()
        .find(|f| f.pattern == candidate.pattern)
    {
        existing.confidence = reinforce(existing.confidence, CONFIDENCE_INCREMENT, MAX_CONFIDENCE);
        existing.times_applied += 1;
        tracing::debug!(
            pattern = %existing.pattern,
            confidence = existing.confidence,
            times_applied = existing.times_applied,
            "Red flag reinforced"
        );
        return MemoryUpdate {
            kind: UpdateKind::RedFlag,
            action: UpdateAction::Update,
            description: format!("Reinforced: {}", candidate.description),
            explicit: candidate.explicit,
            data: to_data(existing),
        };
    }

    let flag = RedFlag {
        id: new_red_flag_id(),
        pattern: candidate.pattern,
        threshold: candidate.threshold,
        description: candidate.description,
        learned_from: candidate.learned_from,
        explicit: candidate.explicit,
        confidence: clamp_confidence(candidate.confidence),
        times_applied: 1,
    };
    let update = MemoryUpdate {
        kind: UpdateKind::RedFlag,
        action: UpdateAction::Add,
        description: format!("Learned: {}", flag.description),
        explicit: flag.explicit,
        data: to_data(&flag),
    };
    memory.red_flags.push(flag);
    update
}

/// Remove a red flag by id. `None` if no flag has that id.
pub fn remove_red_flag(memory: &mut Memory, id: &str) -> Option<MemoryUpdate> {
    let index = memory.red_flags.iter().position(|f| f.id == id)?;
    let removed = memory.red_flags.remove(index);
    Some(MemoryUpdate {
        kind: UpdateKind::RedFlag,
        action: UpdateAction::Remove,
        description: format!("Removed: {}", removed.description),
        explicit: true,
        data: to_data(&removed),
    })
}

/// Apply a manual edit to a red flag. `None` if no flag has that id.
pub fn update_red_flag(memory: &mut Memory, id: &str, patch: RedFlagPatch) -> Option<MemoryUpdate> {
    let flag = memory.red_flags.iter_mut().find(|f| f.id == id)?;

    if let Some(threshold) = patch.threshold {
        flag.threshold = Some(threshold);
    }
    if let Some(description) = patch.description {
        flag.description = description;
    }
    if let Some(learned_from) = patch.learned_from {
        flag.learned_from = Some(learned_from);
    }
    if let Some(explicit) = patch.explicit {
        flag.explicit = explicit;
    }
    if let Some(confidence) = patch.confidence {
        flag.confidence = clamp_confidence(confidence);
    }

    Some(MemoryUpdate {
        kind: UpdateKind::RedFlag,
        action: UpdateAction::Update,
        description: format!("Updated: {}", flag.description),
        explicit: true,
        data: to_data(flag),
    })
}

/// Insert a deal outcome, replacing any entry for the same company.
///
/// The entry always ends up last, so history order is decision order.
pub fn upsert_deal_outcome(memory: &mut Memory, mut outcome: DealOutcome) -> MemoryUpdate {
    if outcome.date.is_empty() {
        outcome.date = Utc::now().to_rfc3339();
    }

    let description = format!("{}: {}", outcome.company, outcome.outcome);
    let data = to_data(&outcome);
    // Newest decision last; trimming drops from the front.
    let action = match memory
        .deal_history
        .iter()
        .position(|d| d.company == outcome.company)
    {
        Some(index) => {
            memory.deal_history.remove(index);
            UpdateAction::Update
        }
        None => UpdateAction::Add,
    };
    memory.deal_history.push(outcome);

    MemoryUpdate {
        kind: UpdateKind::DealHistory,
        action,
        description,
        explicit: true,
        data,
    }
}

fn singleton_action<T>(previous: &Option<T>, next: &Option<T>) -> UpdateAction {
    match (previous, next) {
        (_, None) => UpdateAction::Remove,
        (Some(_), Some(_)) => UpdateAction::Update,
        (None, Some(_)) => UpdateAction::Add,
    }
}

/// Replace (or clear) the investment thesis.
pub fn set_investment_thesis(memory: &mut Memory, thesis: Option<InvestmentThesis>) -> MemoryUpdate {
    let action = singleton_action(&memory.investment_thesis, &thesis);
    let data = to_data(&thesis);
    memory.investment_thesis = thesis;
    MemoryUpdate {
        kind: UpdateKind::Thesis,
        action,
        description: "Investment thesis updated".to_string(),
        explicit: true,
        data,
    }
}

/// Replace (or clear) the memo preferences.
pub fn set_memo_preferences(memory: &mut Memory, prefs: Option<MemoPreferences>) -> MemoryUpdate {
    let action = singleton_action(&memory.memo_preferences, &prefs);
    let data = to_data(&prefs);
    memory.memo_preferences = prefs;
    MemoryUpdate {
        kind: UpdateKind::Preference,
        action,
        description: "Memo preferences updated".to_string(),
        explicit: true,
        data,
    }
}

/// Append a context string unless it is empty or already stored verbatim.
pub fn add_raw_context(memory: &mut Memory, context: &str) -> Option<MemoryUpdate> {
    if context.is_empty() || memory.raw_context.iter().any(|c| c == context) {
        return None;
    }
    memory.raw_context.push(context.to_string());
    Some(MemoryUpdate {
        kind: UpdateKind::Context,
        action: UpdateAction::Add,
        description: context.chars().take(CONTEXT_DESCRIPTION_CHARS).collect(),
        explicit: true,
        data: serde_json::Value::String(context.to_string()),
    })
}

/// Bring a decoded document back within its invariants.
///
/// Gives red flags without an id a fresh one, clamps confidences and drops
/// red flags without a pattern and deals without a company. Returns the
/// number of entries changed or dropped.
pub fn repair(memory: &mut Memory) -> usize {
    let before = memory.red_flags.len() + memory.deal_history.len();
    memory.red_flags.retain(|f| !f.pattern.trim().is_empty());
    memory.deal_history.retain(|d| !d.company.trim().is_empty());
    let mut repaired = before - memory.red_flags.len() - memory.deal_history.len();

    for flag in &mut memory.red_flags {
        if flag.id.is_empty() {
            flag.id = new_red_flag_id();
            repaired += 1;
        }
        let clamped = clamp_confidence(flag.confidence);
        if clamped != flag.confidence {
            flag.confidence = clamped;
            repaired += 1;
        }
    }
    repaired
}

#[cfg(test)]
mod tests {
    use super::*;
    use dealmemory_types::memory::{Outcome, Threshold};

    fn candidate(pattern: &str, confidence: f64) -> RedFlagCandidate {
        RedFlagCandidate {
            pattern: pattern.to_string(),
            threshold: Some(Threshold::Text("18mo".to_string())),
            description: format!("{pattern} concern"),
            learned_from: None,
            explicit: false,
            confidence,
        }
    }

    fn deal(company: &str, outcome: Outcome) -> DealOutcome {
        DealOutcome {
            company: company.to_string(),
            outcome,
            reasons: None,
            date: String::new(),
            key_metrics: None,
        }
    }

    #[test]
    fn test_reinforce_caps_at_max() {
        assert!((reinforce(0.7, 0.1, 1.0) - 0.8).abs() < 1e-9);
        assert_eq!(reinforce(0.95, 0.1, 1.0), 1.0);
        assert_eq!(reinforce(1.0, 0.1, 1.0), 1.0);
    }

    #[test]
    fn test_clamp_confidence() {
        assert_eq!(clamp_confidence(1.7), 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
        assert_eq!(clamp_confidence(0.4), 0.4);
    }

    #[test]
    fn test_add_red_flag_then_reinforce() {
        let mut memory = Memory::new("alice");

        let first = add_red_flag(&mut memory, candidate("runway", 0.7));
        assert_eq!(first.action, UpdateAction::Add);
        assert!(first.description.starts_with("Learned: "));
        let id = memory.red_flags[0].id.clone();

        let second = add_red_flag(&mut memory, candidate("runway", 0.2));
        assert_eq!(second.action, UpdateAction::Update);
        assert!(second.description.starts_with("Reinforced: "));

        assert_eq!(memory.red_flags.len(), 1);
        let flag = &memory.red_flags[0];
        assert_eq!(flag.id, id, "id is stable across reinforcement");
        assert_eq!(flag.times_applied, 2);
        assert!((flag.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_after_n_applications() {
        let mut memory = Memory::new("alice");
        let c0 = 0.6;
        for n in 1..=8u32 {
            add_red_flag(&mut memory, candidate("burn_rate", c0));
            let flag = &memory.red_flags[0];
            let expected = (c0 + 0.1 * f64::from(n - 1)).min(1.0);
            assert!((flag.confidence - expected).abs() < 1e-9, "n = {n}");
            assert_eq!(flag.times_applied, n);
            assert!(flag.confidence <= 1.0);
        }
    }

    #[test]
    fn test_distinct_patterns_are_separate_flags() {
        let mut memory = Memory::new("alice");
        add_red_flag(&mut memory, candidate("runway", 0.7));
        add_red_flag(&mut memory, candidate("burn_rate", 0.7));
        assert_eq!(memory.red_flags.len(), 2);
        assert_ne!(memory.red_flags[0].id, memory.red_flags[1].id);
    }

    #[test]
    fn test_remove_and_update_unknown_id() {
        let mut memory = Memory::new("alice");
        assert!(remove_red_flag(&mut memory, "rf_missing").is_none());
        assert!(update_red_flag(&mut memory, "rf_missing", RedFlagPatch::default()).is_none());
    }

    #[test]
    fn test_update_red_flag_is_explicit() {
        let mut memory = Memory::new("alice");
        add_red_flag(&mut memory, candidate("runway", 0.7));
        let id = memory.red_flags[0].id.clone();

        let patch = RedFlagPatch {
            description: Some("Runway under 12 months".to_string()),
            confidence: Some(1.4),
            ..Default::default()
        };
        let update = update_red_flag(&mut memory, &id, patch).unwrap();

        assert!(update.explicit);
        assert_eq!(update.description, "Updated: Runway under 12 months");
        assert_eq!(memory.red_flags[0].confidence, 1.0);
        assert_eq!(memory.red_flags[0].pattern, "runway");
    }

    #[test]
    fn test_remove_red_flag() {
        let mut memory = Memory::new("alice");
        add_red_flag(&mut memory, candidate("runway", 0.7));
        let id = memory.red_flags[0].id.clone();

        let update = remove_red_flag(&mut memory, &id).unwrap();
        assert_eq!(update.action, UpdateAction::Remove);
        assert!(update.explicit);
        assert!(memory.red_flags.is_empty());
    }

    #[test]
    fn test_upsert_deal_outcome_replaces_by_company() {
        let mut memory = Memory::new("alice");
        let first = upsert_deal_outcome(&mut memory, deal("LangChain", Outcome::Pass));
        assert_eq!(first.action, UpdateAction::Add);
        assert!(!memory.deal_history[0].date.is_empty());

        upsert_deal_outcome(&mut memory, deal("Acme", Outcome::Invest));
        let second = upsert_deal_outcome(&mut memory, deal("LangChain", Outcome::Watching));
        assert_eq!(second.action, UpdateAction::Update);
        assert_eq!(second.description, "LangChain: watching");

        let langchain: Vec<_> = memory
            .deal_history
            .iter()
            .filter(|d| d.company == "LangChain")
            .collect();
        assert_eq!(langchain.len(), 1);
        assert_eq!(langchain[0].outcome, Outcome::Watching);
        assert_eq!(memory.deal_history.len(), 2);
    }

    #[test]
    fn test_company_key_is_case_sensitive() {
        let mut memory = Memory::new("alice");
        upsert_deal_outcome(&mut memory, deal("Acme", Outcome::Pass));
        upsert_deal_outcome(&mut memory, deal("acme", Outcome::Pass));
        assert_eq!(memory.deal_history.len(), 2);
    }

    #[test]
    fn test_singleton_actions() {
        let mut memory = Memory::new("alice");
        let added = set_investment_thesis(&mut memory, Some(InvestmentThesis::default()));
        assert_eq!(added.action, UpdateAction::Add);
        let replaced = set_investment_thesis(&mut memory, Some(InvestmentThesis::default()));
        assert_eq!(replaced.action, UpdateAction::Update);
        let cleared = set_investment_thesis(&mut memory, None);
        assert_eq!(cleared.action, UpdateAction::Remove);
        assert!(memory.investment_thesis.is_none());

        let prefs = set_memo_preferences(&mut memory, Some(MemoPreferences::default()));
        assert_eq!(prefs.action, UpdateAction::Add);
        assert!(memory.memo_preferences.is_some());
    }

    #[test]
    fn test_add_raw_context_dedupes() {
        let mut memory = Memory::new("alice");
        assert!(add_raw_context(&mut memory, "Focus on vertical AI").is_some());
        assert!(add_raw_context(&mut memory, "Focus on vertical AI").is_none());
        assert!(add_raw_context(&mut memory, "").is_none());
        assert_eq!(memory.raw_context.len(), 1);
    }

    #[test]
    fn test_context_description_truncated() {
        let mut memory = Memory::new("alice");
        let long = "x".repeat(80);
        let update = add_raw_context(&mut memory, &long).unwrap();
        assert_eq!(update.description.chars().count(), CONTEXT_DESCRIPTION_CHARS);
        assert_eq!(memory.raw_context[0], long);
    }

    #[test]
    fn test_reevaluated_deal_moves_to_end() {
        let mut memory = Memory::new("alice");
        upsert_deal_outcome(&mut memory, deal("LangChain", Outcome::Pass));
        upsert_deal_outcome(&mut memory, deal("Acme", Outcome::Invest));
        upsert_deal_outcome(&mut memory, deal("LangChain", Outcome::Watching));

        let companies: Vec<&str> = memory.deal_history.iter().map(|d| d.company.as_str()).collect();
        assert_eq!(companies, vec!["Acme", "LangChain"]);
        assert_eq!(memory.deal_history[1].outcome, Outcome::Watching);
    }

    #[test]
    fn test_repair_fills_ids_and_drops_keyless_entries() {
        let mut memory = Memory::new("alice");
        add_red_flag(&mut memory, candidate("runway", 0.5));
        add_red_flag(&mut memory, candidate("burn_rate", 0.5));
        memory.red_flags[0].id.clear();
        memory.red_flags[1].confidence = f64::NAN;
        let blank = RedFlag {
            pattern: "  ".to_string(),
            ..memory.red_flags[1].clone()
        };
        memory.red_flags.push(blank);
        upsert_deal_outcome(&mut memory, deal("Acme", Outcome::Pass));
        upsert_deal_outcome(&mut memory, deal("", Outcome::Pass));

        assert_eq!(repair(&mut memory), 4);
        assert!(memory.red_flags[0].id.starts_with("rf_"));
        assert_eq!(memory.red_flags[1].confidence, 0.0);
        assert_eq!(memory.red_flags.len(), 2);
        assert_eq!(memory.deal_history.len(), 1);

        assert_eq!(repair(&mut memory), 0);
    }
}
