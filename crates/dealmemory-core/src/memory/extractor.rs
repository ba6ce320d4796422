//! Conversation-to-memory extraction.
//!
//! `build_extraction_prompt` asks the collaborator for a five-key JSON
//! object describing what a conversation taught us about the user.
//! `apply_extraction` decodes that object field by field and applies it to
//! the store with a single write. `quick_extract` is a cheap regex pass for
//! immediate, advisory feedback that never touches the store.
//!
//! Extraction failures never fail the conversation: a malformed response
//! logs a warning and yields no updates.

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use dealmemory_types::config::DealMemoryConfig;
use dealmemory_types::error::ExtractionError;
use dealmemory_types::llm::{CompletionRequest, LlmError, Message, MessageRole};
use dealmemory_types::memory::{
    DealOutcome, InvestmentThesis, KeyMetrics, MemoPreferences, Memory, MemoryUpdate, Outcome,
    RedFlagCandidate, Threshold, UpdateAction, UpdateKind,
};

use super::ops;
use super::store::MemoryStore;
use crate::llm::provider::LlmProvider;
use crate::storage::kv_store::KvStore;

/// Confidence given to an extracted red flag that does not state one.
pub const DEFAULT_RED_FLAG_CONFIDENCE: f64 = 0.7;

/// Confidence assigned to extracted memo preferences.
pub const PREFERENCE_CONFIDENCE: f64 = 0.9;

/// System instruction for the extraction call.
pub const EXTRACTION_SYSTEM_PROMPT: &str = "You are a precise data extraction assistant. \
Read the conversation and report only what it reveals about the investor's preferences, \
decisions and patterns. Respond with valid JSON only, with no prose before or after it.";

const PREVIEW_CHARS: usize = 200;

// ---------------------------------------------------------------------------
// Prompt construction
// ---------------------------------------------------------------------------

const EXTRACTION_INSTRUCTIONS: &str = r#"Extract ONLY what should be remembered for future sessions. Look for:

1. INVESTMENT THESIS: explicit statements about what they invest in
   - stages, sectors or verticals, check sizes, geography
   - key priorities (for example "I care about unit economics")

2. RED FLAGS: patterns they dislike, stated or implied by a rejection
   - Explicit: "I don't invest when one customer is more than half of revenue"
   - Implicit: passing on a deal because of a specific metric usually signals a red flag
   - Set "explicit" to true only when they said it directly

3. MEMO PREFERENCES: how they want analysis written
   - section structure, tone (direct, balanced or cautious), length

4. DEAL OUTCOME: a decision made in this conversation
   - company name, outcome (pass, invest or watching), reasons
   - the key metrics behind the decision

Respond with a single JSON object in exactly this shape. Use null, or an empty list, for anything with nothing new to learn:
{
  "thesis": {
    "stages": ["Series A", "Series B"],
    "sectors": ["AI", "Manufacturing tech"],
    "checkSize": { "min": 5000000, "max": 15000000 },
    "geography": ["US"],
    "priorities": ["unit economics", "founder-market fit"]
  },
  "redFlags": [
    {
      "pattern": "customer_concentration",
      "threshold": "35%",
      "description": "Customer concentration >35%",
      "explicit": false,
      "confidence": 0.7,
      "reasoning": "Called 34% borderline, which puts the threshold near 35%"
    }
  ],
  "memoPreferences": {
    "structure": ["Summary", "Thesis Fit", "Risks", "Recommendation"],
    "tone": "direct",
    "hedgeLanguage": false,
    "maxLengthPages": 2
  },
  "dealOutcome": {
    "company": "TechCo",
    "outcome": "pass",
    "reasons": ["burn rate", "customer concentration"],
    "keyMetrics": { "arr": 3200000, "burn": 480000, "concentration": 0.34 }
  },
  "rawContext": ["Any other context worth remembering"]
}

Be conservative. Extract only what you are confident about and never invent data."#;

fn role_label(role: MessageRole) -> &'static str {
    match role {
        MessageRole::User => "USER",
        MessageRole::Assistant => "ASSISTANT",
    }
}

/// Build the extraction request text for `messages` given what is already known.
///
/// Pure; the memory is only summarized, never modified.
pub fn build_extraction_prompt(messages: &[Message], memory: &Memory) -> String {
    let conversation = messages
        .iter()
        .map(|m| format!("{}: {}", role_label(m.role), m.content))
        .collect::<Vec<_>>()
        .join("\n\n");

    let thesis = match &memory.investment_thesis {
        Some(thesis) => format!(
            "User already has thesis: {}",
            serde_json::to_string(thesis).unwrap_or_default()
        ),
        None => "No existing thesis.".to_string(),
    };

    let flags = if memory.red_flags.is_empty() {
        "No existing red flags.".to_string()
    } else {
        let descriptions: Vec<&str> = memory
            .red_flags
            .iter()
            .map(|f| f.description.as_str())
            .collect();
        format!("Existing red flags: {}", descriptions.join(", "))
    };

    format!(
        "Analyze this conversation with a venture investor and extract any preferences or patterns worth learning.\n\n\
         <conversation>\n{conversation}\n</conversation>\n\n\
         <existing_memory>\n{thesis}\n{flags}\n</existing_memory>\n\n\
         {EXTRACTION_INSTRUCTIONS}"
    )
}

// ---------------------------------------------------------------------------
// Response decoding
// ---------------------------------------------------------------------------

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```(?:json)?\n?").expect("code fence regex is valid"));

/// Remove Markdown code-fence markers and surrounding whitespace.
pub fn strip_code_fences(text: &str) -> String {
    CODE_FENCE.replace_all(text, "").trim().to_string()
}

/// Decoded extraction. Every field is optional; wrong shapes decode as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionPayload {
    pub thesis: Option<InvestmentThesis>,
    pub red_flags: Vec<RedFlagCandidate>,
    pub memo_preferences: Option<MemoPreferences>,
    pub deal_outcome: Option<DealOutcome>,
    pub raw_context: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRedFlag {
    #[serde(default)]
    pattern: String,
    #[serde(default)]
    threshold: Option<Threshold>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    explicit: Option<bool>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDealOutcome {
    #[serde(default)]
    company: Option<String>,
    outcome: Outcome,
    #[serde(default)]
    reasons: Option<Vec<String>>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    key_metrics: Option<KeyMetrics>,
}

/// A present, non-null, non-empty field value.
fn field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    match object.get(key)? {
        Value::Null => None,
        Value::Object(map) if map.is_empty() => None,
        Value::Array(items) if items.is_empty() => None,
        value => Some(value),
    }
}

fn decode<T: DeserializeOwned>(key: &str, value: &Value) -> Option<T> {
    match T::deserialize(value) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            tracing::warn!(field = key, error = %e, "Ignoring malformed extraction field");
            None
        }
    }
}

impl ExtractionPayload {
    /// Decode a raw collaborator response.
    ///
    /// Fails only when the text is not a JSON object; individual fields with
    /// the wrong shape are dropped.
    pub fn parse(raw: &str) -> Result<Self, ExtractionError> {
        let cleaned = strip_code_fences(raw);
        let value: Value =
            serde_json::from_str(&cleaned).map_err(|e| ExtractionError::InvalidJson(e.to_string()))?;
        match value {
            Value::Object(object) => Ok(Self::from_object(&object)),
            _ => Err(ExtractionError::NotAnObject),
        }
    }

    fn from_object(object: &Map<String, Value>) -> Self {
        Self {
            thesis: field(object, "thesis").and_then(decode_thesis),
            red_flags: field(object, "redFlags")
                .map(decode_red_flags)
                .unwrap_or_default(),
            memo_preferences: field(object, "memoPreferences")
                .and_then(|v| decode::<MemoPreferences>("memoPreferences", v)),
            deal_outcome: field(object, "dealOutcome").and_then(decode_deal_outcome),
            raw_context: field(object, "rawContext")
                .map(decode_raw_context)
                .unwrap_or_default(),
        }
    }

    /// True when the extraction found nothing to learn.
    pub fn is_empty(&self) -> bool {
        self.thesis.is_none()
            && self.red_flags.is_empty()
            && self.memo_preferences.is_none()
            && self.deal_outcome.is_none()
            && self.raw_context.is_empty()
    }
}

fn decode_thesis(value: &Value) -> Option<InvestmentThesis> {
    let mut thesis: InvestmentThesis = decode("thesis", value)?;
    if let Some(range) = thesis.check_size.filter(|r| !r.is_valid()) {
        tracing::warn!(
            min = range.min,
            max = range.max,
            "Dropping invalid check size from extracted thesis"
        );
        thesis.check_size = None;
    }
    Some(thesis)
}

fn decode_red_flags(value: &Value) -> Vec<RedFlagCandidate> {
    let Some(items) = value.as_array() else {
        tracing::warn!("Ignoring extraction redFlags that is not a list");
        return Vec::new();
    };

    items
        .iter()
        .filter_map(|item| decode::<RawRedFlag>("redFlags", item))
        .filter_map(|raw| {
            let pattern = raw.pattern.trim().to_string();
            if pattern.is_empty() {
                tracing::warn!("Skipping extracted red flag without a pattern");
                return None;
            }
            let description = raw
                .description
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| pattern.clone());
            Some(RedFlagCandidate {
                pattern,
                threshold: raw.threshold,
                description,
                learned_from: raw.reasoning.filter(|r| !r.trim().is_empty()),
                explicit: raw.explicit.unwrap_or(false),
                confidence: raw
                    .confidence
                    .map(ops::clamp_confidence)
                    .unwrap_or(DEFAULT_RED_FLAG_CONFIDENCE),
            })
        })
        .collect()
}

fn decode_deal_outcome(value: &Value) -> Option<DealOutcome> {
    let raw: RawDealOutcome = decode("dealOutcome", value)?;
    let Some(company) = raw.company.filter(|c| !c.trim().is_empty()) else {
        tracing::warn!("Skipping extracted deal outcome without a company");
        return None;
    };
    Some(DealOutcome {
        company,
        outcome: raw.outcome,
        reasons: raw.reasons,
        date: raw
            .date
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| Utc::now().to_rfc3339()),
        key_metrics: raw.key_metrics.filter(|m| !m.is_empty()),
    })
}

fn decode_raw_context(value: &Value) -> Vec<String> {
    let Some(items) = value.as_array() else {
        tracing::warn!("Ignoring extraction rawContext that is not a list");
        return Vec::new();
    };
    items
        .iter()
        .filter_map(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Application
// ---------------------------------------------------------------------------

/// Apply a decoded extraction to `memory` and report each change.
///
/// Order: thesis, red flags, memo preferences, deal outcome, context.
pub fn apply_payload(memory: &mut Memory, payload: ExtractionPayload) -> Vec<MemoryUpdate> {
    let mut updates = Vec::new();

    if let Some(mut thesis) = payload.thesis {
        thesis.explicit = true;
        thesis.confidence = 1.0;
        updates.push(MemoryUpdate {
            kind: UpdateKind::Thesis,
            action: UpdateAction::Add,
            description: "Investment thesis captured".to_string(),
            explicit: true,
            data: serde_json::to_value(&thesis).unwrap_or_default(),
        });
        memory.investment_thesis = Some(thesis);
    }

    for candidate in payload.red_flags {
        updates.push(ops::add_red_flag(memory, candidate));
    }

    if let Some(mut prefs) = payload.memo_preferences {
        prefs.confidence = PREFERENCE_CONFIDENCE;
        updates.push(MemoryUpdate {
            kind: UpdateKind::Preference,
            action: UpdateAction::Add,
            description: "Memo preferences learned".to_string(),
            explicit: false,
            data: serde_json::to_value(&prefs).unwrap_or_default(),
        });
        memory.memo_preferences = Some(prefs);
    }

    if let Some(outcome) = payload.deal_outcome {
        updates.push(ops::upsert_deal_outcome(memory, outcome));
    }

    for context in &payload.raw_context {
        if let Some(update) = ops::add_raw_context(memory, context) {
            updates.push(update);
        }
    }

    updates
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

/// Decode `raw` and apply it to the store with one write.
///
/// Returns no updates when the response is malformed, carries nothing, or
/// the write fails; in every such case the stored memory is unchanged.
#[tracing::instrument(name = "apply_extraction", skip(store, raw), fields(user_id = %store.user_id(), bytes = raw.len()))]
pub async fn apply_extraction<K: KvStore>(store: &MemoryStore<K>, raw: &str) -> Vec<MemoryUpdate> {
    let payload = match ExtractionPayload::parse(raw) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(
                error = %e,
                content_preview = %preview(raw),
                "Failed to parse memory extraction; returning empty result"
            );
            return Vec::new();
        }
    };

    if payload.is_empty() {
        tracing::debug!("Extraction found nothing new");
        return Vec::new();
    }

    let mut memory = store.read().await;
    let updates = apply_payload(&mut memory, payload);
    if updates.is_empty() {
        return updates;
    }

    match store.write(&memory).await {
        Ok(report) => {
            if let Some(advisory) = &report.advisory {
                tracing::warn!(advisory = %advisory, "Memory written after trimming");
            }
            tracing::info!(updates = updates.len(), "Applied memory extraction");
            updates
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to persist extracted memory");
            Vec::new()
        }
    }
}

// ---------------------------------------------------------------------------
// Quick extraction
// ---------------------------------------------------------------------------

static PASS_PHRASES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)pass on this|i('m| am) passing|let's pass|not a fit|pass\. ")
        .expect("pass phrase regex is valid")
});

static CONCERN_TRIGGERS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (
            r"concentration concerns me|concentration is (too high|concerning)",
            "customer_concentration",
        ),
        (
            r"burn (rate )?(is )?(too high|concerns? me|worries? me)",
            "burn_rate",
        ),
        (r"runway (is )?(too (short|tight)|concerns? me)", "runway"),
        (r"team (concerns?|worries?|inexperienced)", "team_experience"),
    ]
    .into_iter()
    .map(|(pattern, flag)| {
        (
            Regex::new(&format!("(?i){pattern}")).expect("concern regex is valid"),
            flag,
        )
    })
    .collect()
});

/// Tentative signals from the latest exchange, for immediate feedback.
///
/// Advisory only: nothing here is written to the store, and every update is
/// marked inferred.
pub fn quick_extract(user_text: &str, assistant_text: &str) -> Vec<MemoryUpdate> {
    let combined = format!("{user_text} {assistant_text}");
    let mut updates = Vec::new();

    if PASS_PHRASES.is_match(&combined) {
        updates.push(MemoryUpdate {
            kind: UpdateKind::DealHistory,
            action: UpdateAction::Add,
            description: "Potential pass decision detected".to_string(),
            explicit: false,
            data: serde_json::json!({ "outcome": "pass" }),
        });
    }

    for (trigger, flag) in CONCERN_TRIGGERS.iter() {
        if trigger.is_match(&combined) {
            updates.push(MemoryUpdate {
                kind: UpdateKind::RedFlag,
                action: UpdateAction::Add,
                description: format!("Potential concern detected: {flag}"),
                explicit: false,
                data: serde_json::json!({ "pattern": flag }),
            });
        }
    }

    updates
}

// ---------------------------------------------------------------------------
// Collaborator-backed extraction
// ---------------------------------------------------------------------------

/// Runs the full extraction round trip against a language model.
pub struct SessionMemoryExtractor;

impl SessionMemoryExtractor {
    /// Ask `provider` what `messages` teach about the user and apply it.
    ///
    /// Conversations shorter than `config.min_messages_for_extraction` are
    /// skipped. Collaborator errors propagate and leave the store untouched.
    #[tracing::instrument(
        name = "extract_memory",
        skip(provider, store, messages, config),
        fields(
            provider = provider.name(),
            user_id = %store.user_id(),
            message_count = messages.len(),
        )
    )]
    pub async fn extract<P: LlmProvider, K: KvStore>(
        provider: &P,
        store: &MemoryStore<K>,
        messages: &[Message],
        config: &DealMemoryConfig,
    ) -> Result<Vec<MemoryUpdate>, LlmError> {
        if messages.len() < config.min_messages_for_extraction {
            tracing::debug!("Conversation too short for extraction");
            return Ok(Vec::new());
        }

        let memory = store.read().await;
        let request = CompletionRequest {
            model: config.extract_model.clone(),
            messages: vec![Message::user(build_extraction_prompt(messages, &memory))],
            system: Some(EXTRACTION_SYSTEM_PROMPT.to_string()),
            max_tokens: config.extract_max_tokens,
            temperature: Some(0.0),
        };

        let response = provider.complete(&request).await?;
        tracing::debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "Extraction response received"
        );

        Ok(apply_extraction(store, &response.content).await)
    }
}
