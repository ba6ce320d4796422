//! Memory types for dealmemory.
//!
//! These types model one user's learned investment profile: the stated
//! thesis, red-flag patterns with accumulated confidence, memo formatting
//! preferences, the history of deal decisions, and free-form context.
//!
//! The persisted document uses camelCase keys and tolerates missing or null
//! fields, which deserialize to their empty value.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use std::fmt;
use std::str::FromStr;

/// Schema version stamped into every persisted memory document.
pub const MEMORY_VERSION: &str = "1.0";

/// User id used when no explicit id is configured.
pub const DEFAULT_USER_ID: &str = "demo_user";

/// Decode a field, falling back to its empty value when the stored shape is wrong.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Decode a list element by element, dropping entries that do not fit `T`.
///
/// `null` and non-list values decode as an empty list.
fn lenient_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let Value::Array(items) = Value::deserialize(deserializer)? else {
        return Ok(Vec::new());
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

/// Timestamps that are missing or unparsable read as now.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_else(|_| Utc::now()))
}

fn default_times_applied() -> u32 {
    1
}

fn lenient_times_applied<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value::<u32>(value)
        .unwrap_or_default()
        .max(1))
}

// ---------------------------------------------------------------------------
// Root aggregate
// ---------------------------------------------------------------------------

/// The root aggregate: everything remembered about one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Memory {
    #[serde(deserialize_with = "lenient")]
    pub version: String,
    #[serde(deserialize_with = "lenient")]
    pub user_id: String,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "lenient_timestamp")]
    pub updated_at: DateTime<Utc>,

    /// Replaced wholesale on update, never merged.
    #[serde(deserialize_with = "lenient")]
    pub investment_thesis: Option<InvestmentThesis>,
    /// At most one entry per distinct `pattern`.
    #[serde(deserialize_with = "lenient_vec")]
    pub red_flags: Vec<RedFlag>,
    #[serde(deserialize_with = "lenient")]
    pub memo_preferences: Option<MemoPreferences>,
    /// Keyed by exact `company` name.
    #[serde(deserialize_with = "lenient_vec")]
    pub deal_history: Vec<DealOutcome>,
    /// Carried through round-trips; not produced by extraction.
    #[serde(deserialize_with = "lenient_vec")]
    pub approval_patterns: Vec<ApprovalPattern>,
    /// Append-only, deduplicated by exact string equality.
    #[serde(deserialize_with = "lenient_vec")]
    pub raw_context: Vec<String>,
}

impl Memory {
    /// Create an empty memory for `user_id` with fresh timestamps.
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            version: MEMORY_VERSION.to_string(),
            user_id: user_id.into(),
            created_at: now,
            updated_at: now,
            investment_thesis: None,
            red_flags: Vec::new(),
            memo_preferences: None,
            deal_history: Vec::new(),
            approval_patterns: Vec::new(),
            raw_context: Vec::new(),
        }
    }

    /// True when no learned field holds anything.
    pub fn is_empty(&self) -> bool {
        self.investment_thesis.is_none()
            && self.red_flags.is_empty()
            && self.memo_preferences.is_none()
            && self.deal_history.is_empty()
            && self.raw_context.is_empty()
    }

    /// Find a red flag by its dedup key.
    pub fn red_flag_by_pattern(&self, pattern: &str) -> Option<&RedFlag> {
        self.red_flags.iter().find(|f| f.pattern == pattern)
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new(DEFAULT_USER_ID)
    }
}

// ---------------------------------------------------------------------------
// Investment thesis
// ---------------------------------------------------------------------------

/// What the user invests in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestmentThesis {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stages: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sectors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check_size: Option<CheckSize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geography: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priorities: Option<Vec<String>>,
    #[serde(default)]
    pub explicit: bool,
    /// In [0, 1].
    #[serde(default)]
    pub confidence: f64,
}

/// Check-size range in currency units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckSize {
    #[serde(default)]
    pub min: f64,
    #[serde(default)]
    pub max: f64,
}

impl CheckSize {
    /// `0 <= min <= max`, both finite.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min >= 0.0 && self.min <= self.max
    }
}

// ---------------------------------------------------------------------------
// Red flags
// ---------------------------------------------------------------------------

/// Threshold attached to a red flag: either a number or free text ("18mo", "35%").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Threshold {
    Number(f64),
    Text(String),
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{n:.0}"),
            Threshold::Number(n) => write!(f, "{n}"),
            Threshold::Text(s) => write!(f, "{s}"),
        }
    }
}

/// A learned disqualifying pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedFlag {
    /// Opaque, assigned at creation and stable for the flag's lifetime.
    /// Empty only for stored flags that lost it; the store assigns a new one.
    #[serde(default, deserialize_with = "lenient")]
    pub id: String,
    /// Short machine-readable tag; the dedup key.
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub threshold: Option<Threshold>,
    #[serde(default, deserialize_with = "lenient")]
    pub description: String,
    /// Why the flag was inferred, when the extraction said so.
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub learned_from: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub explicit: bool,
    /// In [0, 1].
    #[serde(default, deserialize_with = "lenient")]
    pub confidence: f64,
    /// Reinforcement counter, at least 1.
    #[serde(default = "default_times_applied", deserialize_with = "lenient_times_applied")]
    pub times_applied: u32,
}

/// A red flag before it has been given an id and a reinforcement count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedFlagCandidate {
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<Threshold>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learned_from: Option<String>,
    #[serde(default)]
    pub explicit: bool,
    pub confidence: f64,
}

/// Manual edit of an existing red flag. `None` leaves a field unchanged.
///
/// The pattern is the flag's identity and cannot be edited; delete and
/// re-add to change it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedFlagPatch {
    #[serde(default)]
    pub threshold: Option<Threshold>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub learned_from: Option<String>,
    #[serde(default)]
    pub explicit: Option<bool>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

impl RedFlagPatch {
    pub fn is_empty(&self) -> bool {
        self.threshold.is_none()
            && self.description.is_none()
            && self.learned_from.is_none()
            && self.explicit.is_none()
            && self.confidence.is_none()
    }
}

// ---------------------------------------------------------------------------
// Memo preferences
// ---------------------------------------------------------------------------

/// How direct the user wants written analysis to be.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Direct,
    #[default]
    Balanced,
    Cautious,
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tone::Direct => write!(f, "direct"),
            Tone::Balanced => write!(f, "balanced"),
            Tone::Cautious => write!(f, "cautious"),
        }
    }
}

impl FromStr for Tone {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(Tone::Direct),
            "balanced" => Ok(Tone::Balanced),
            "cautious" => Ok(Tone::Cautious),
            other => Err(format!("invalid tone: '{other}'")),
        }
    }
}

/// How the user likes memos formatted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoPreferences {
    /// Ordered section names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<Vec<String>>,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub hedge_language: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length_pages: Option<f64>,
    #[serde(default)]
    pub confidence: f64,
}

// ---------------------------------------------------------------------------
// Deal history
// ---------------------------------------------------------------------------

/// Decision taken on a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Invest,
    Watching,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Pass => write!(f, "pass"),
            Outcome::Invest => write!(f, "invest"),
            Outcome::Watching => write!(f, "watching"),
        }
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pass" => Ok(Outcome::Pass),
            "invest" => Ok(Outcome::Invest),
            "watching" => Ok(Outcome::Watching),
            other => Err(format!("invalid deal outcome: '{other}'")),
        }
    }
}

/// Metrics that influenced a decision. All optional.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KeyMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arr: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub burn: Option<f64>,
    /// Months.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runway: Option<f64>,
    /// Fraction in [0, 1] of revenue from the largest customer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concentration: Option<f64>,
}

impl KeyMetrics {
    pub fn is_empty(&self) -> bool {
        self.arr.is_none()
            && self.burn.is_none()
            && self.runway.is_none()
            && self.concentration.is_none()
    }
}

/// One decision on one company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealOutcome {
    /// Case-sensitive key into the deal history.
    pub company: String,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub reasons: Option<Vec<String>>,
    /// ISO-8601 timestamp as written by the producer.
    #[serde(default, deserialize_with = "lenient")]
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub key_metrics: Option<KeyMetrics>,
}

// ---------------------------------------------------------------------------
// Approval patterns
// ---------------------------------------------------------------------------

/// Learned auto-approval behaviour for a recurring action.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApprovalPattern {
    pub action: String,
    pub auto_approve: bool,
    pub confidence: f64,
    pub approvals: u32,
    pub rejections: u32,
}

// ---------------------------------------------------------------------------
// Update reports
// ---------------------------------------------------------------------------

/// Which part of the memory a change touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UpdateKind {
    Thesis,
    RedFlag,
    Preference,
    DealHistory,
    Context,
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateKind::Thesis => write!(f, "thesis"),
            UpdateKind::RedFlag => write!(f, "redFlag"),
            UpdateKind::Preference => write!(f, "preference"),
            UpdateKind::DealHistory => write!(f, "dealHistory"),
            UpdateKind::Context => write!(f, "context"),
        }
    }
}

/// What kind of change was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateAction {
    Add,
    Update,
    Remove,
}

impl fmt::Display for UpdateAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateAction::Add => write!(f, "add"),
            UpdateAction::Update => write!(f, "update"),
            UpdateAction::Remove => write!(f, "remove"),
        }
    }
}

/// A single change reported back to the caller. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryUpdate {
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    pub action: UpdateAction,
    pub description: String,
    pub explicit: bool,
    /// The affected entity as JSON.
    pub data: serde_json::Value,
}

/// Counts of what a memory holds, for display surfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemorySummary {
    pub has_thesis: bool,
    pub red_flag_count: usize,
    pub has_memo_prefs: bool,
    pub deal_history_count: usize,
    pub context_items: usize,
    pub total_items: usize,
}

impl From<&Memory> for MemorySummary {
    fn from(memory: &Memory) -> Self {
        let has_thesis = memory.investment_thesis.is_some();
        let has_memo_prefs = memory.memo_preferences.is_some();
        Self {
            has_thesis,
            red_flag_count: memory.red_flags.len(),
            has_memo_prefs,
            deal_history_count: memory.deal_history.len(),
            context_items: memory.raw_context.len(),
            total_items: usize::from(has_thesis)
                + memory.red_flags.len()
                + usize::from(has_memo_prefs)
                + memory.deal_history.len()
                + memory.raw_context.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_memory_is_empty() {
        let memory = Memory::new("alice");
        assert!(memory.is_empty());
        assert_eq!(memory.user_id, "alice");
        assert_eq!(memory.version, MEMORY_VERSION);
        assert_eq!(memory.created_at, memory.updated_at);
    }

    #[test]
    fn test_memory_serializes_camel_case() {
        let memory = Memory::new("alice");
        let json = serde_json::to_string(&memory).unwrap();
        assert!(json.contains("\"userId\":\"alice\""));
        assert!(json.contains("\"redFlags\":[]"));
        assert!(json.contains("\"investmentThesis\":null"));
        assert!(json.contains("\"rawContext\":[]"));
    }

    #[test]
    fn test_memory_missing_and_null_fields_default_to_empty() {
        let json = r#"{
            "version": "1.0",
            "userId": "bob",
            "redFlags": null,
            "dealHistory": null,
            "someFutureField": {"x": 1}
        }"#;
        let memory: Memory = serde_json::from_str(json).unwrap();
        assert_eq!(memory.user_id, "bob");
        assert!(memory.red_flags.is_empty());
        assert!(memory.deal_history.is_empty());
        assert!(memory.raw_context.is_empty());
        assert!(memory.investment_thesis.is_none());
        assert!(memory.is_empty());
    }

    #[test]
    fn test_memory_drops_only_malformed_entries() {
        let json = r#"{
            "userId": "bob",
            "createdAt": 12,
            "updatedAt": "2026-03-01T00:00:00Z",
            "investmentThesis": "not an object",
            "redFlags": [
                {"pattern": "runway", "timesApplied": "often"},
                {"id": "rf_2"}
            ],
            "dealHistory": [
                {"company": "Acme", "outcome": "invest", "reasons": "too many"},
                {"company": "Globex", "outcome": "maybe"}
            ],
            "rawContext": "not a list"
        }"#;
        let memory: Memory = serde_json::from_str(json).unwrap();
        assert_eq!(memory.user_id, "bob");
        assert_eq!(memory.updated_at.to_rfc3339(), "2026-03-01T00:00:00+00:00");
        assert!(memory.investment_thesis.is_none());

        assert_eq!(memory.red_flags.len(), 1);
        assert_eq!(memory.red_flags[0].id, "");
        assert_eq!(memory.red_flags[0].times_applied, 1);

        assert_eq!(memory.deal_history.len(), 1);
        assert_eq!(memory.deal_history[0].company, "Acme");
        assert!(memory.deal_history[0].reasons.is_none());
        assert!(memory.raw_context.is_empty());
    }

    #[test]
    fn test_threshold_untagged() {
        let n: Threshold = serde_json::from_str("18").unwrap();
        assert_eq!(n, Threshold::Number(18.0));
        let s: Threshold = serde_json::from_str("\"35%\"").unwrap();
        assert_eq!(s, Threshold::Text("35%".to_string()));
        assert_eq!(Threshold::Number(18.0).to_string(), "18");
        assert_eq!(Threshold::Number(0.35).to_string(), "0.35");
        assert_eq!(Threshold::Text("18mo".into()).to_string(), "18mo");
    }

    #[test]
    fn test_red_flag_times_applied_defaults_to_one() {
        let json = r#"{"id": "rf_1", "pattern": "runway", "description": "Runway < 18 months"}"#;
        let flag: RedFlag = serde_json::from_str(json).unwrap();
        assert_eq!(flag.times_applied, 1);
        assert!(!flag.explicit);
        assert!(flag.threshold.is_none());
    }

    #[test]
    fn test_tone_roundtrip() {
        for tone in [Tone::Direct, Tone::Balanced, Tone::Cautious] {
            let parsed: Tone = tone.to_string().parse().unwrap();
            assert_eq!(tone, parsed);
        }
        assert!("loud".parse::<Tone>().is_err());
        assert_eq!(Tone::default(), Tone::Balanced);
    }

    #[test]
    fn test_outcome_serde() {
        let json = serde_json::to_string(&Outcome::Watching).unwrap();
        assert_eq!(json, "\"watching\"");
        let parsed: Outcome = serde_json::from_str("\"pass\"").unwrap();
        assert_eq!(parsed, Outcome::Pass);
        assert!(serde_json::from_str::<Outcome>("\"maybe\"").is_err());
    }

    #[test]
    fn test_update_kind_wire_names() {
        let update = MemoryUpdate {
            kind: UpdateKind::RedFlag,
            action: UpdateAction::Add,
            description: "Learned: Runway < 18 months".to_string(),
            explicit: true,
            data: serde_json::json!({"pattern": "runway"}),
        };
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains("\"type\":\"redFlag\""));
        assert!(json.contains("\"action\":\"add\""));
        assert_eq!(
            serde_json::to_string(&UpdateKind::DealHistory).unwrap(),
            "\"dealHistory\""
        );
    }

    #[test]
    fn test_check_size_validity() {
        assert!(CheckSize { min: 1.0, max: 5.0 }.is_valid());
        assert!(CheckSize { min: 5.0, max: 5.0 }.is_valid());
        assert!(!CheckSize { min: 6.0, max: 5.0 }.is_valid());
        assert!(!CheckSize { min: -1.0, max: 5.0 }.is_valid());
    }

    #[test]
    fn test_summary_counts() {
        let mut memory = Memory::new("alice");
        memory.investment_thesis = Some(InvestmentThesis::default());
        memory.raw_context.push("Prefers B2B".to_string());
        memory.deal_history.push(DealOutcome {
            company: "Acme".to_string(),
            outcome: Outcome::Pass,
            reasons: None,
            date: String::new(),
            key_metrics: None,
        });

        let summary = MemorySummary::from(&memory);
        assert!(summary.has_thesis);
        assert!(!summary.has_memo_prefs);
        assert_eq!(summary.deal_history_count, 1);
        assert_eq!(summary.context_items, 1);
        assert_eq!(summary.total_items, 3);
    }
}
