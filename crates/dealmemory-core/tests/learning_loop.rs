//! End-to-end behaviour of the memory subsystem over the in-memory backend.

use std::sync::atomic::{AtomicBool, Ordering};

use dealmemory_core::memory::extractor::apply_extraction;
use dealmemory_core::memory::injector::render;
use dealmemory_core::memory::store::{MEMORY_KEY, MemoryStore, StoreLimits, TRIM_ADVISORY};
use dealmemory_core::storage::in_memory::InMemoryKvStore;
use dealmemory_core::storage::kv_store::KvStore;
use dealmemory_types::error::{RepositoryError, StoreError};
use dealmemory_types::memory::{
    DealOutcome, Memory, Outcome, RedFlagCandidate, UpdateAction, UpdateKind,
};

fn store() -> MemoryStore<InMemoryKvStore> {
    MemoryStore::new(InMemoryKvStore::new(), "demo_user")
}

fn deal(company: &str) -> DealOutcome {
    DealOutcome {
        company: company.to_string(),
        outcome: Outcome::Pass,
        reasons: Some(vec!["x".repeat(200)]),
        date: "2026-03-01T00:00:00Z".to_string(),
        key_metrics: None,
    }
}

/// Passes through to an in-memory store, but once armed every write to the
/// memory key stores a truncated value and then reports a full disk.
struct FlakyKvStore {
    inner: InMemoryKvStore,
    fail_memory_writes: AtomicBool,
}

impl FlakyKvStore {
    fn new() -> Self {
        Self {
            inner: InMemoryKvStore::new(),
            fail_memory_writes: AtomicBool::new(false),
        }
    }

    fn arm(&self) {
        self.fail_memory_writes.store(true, Ordering::SeqCst);
    }

    fn disarm(&self) {
        self.fail_memory_writes.store(false, Ordering::SeqCst);
    }
}

impl KvStore for FlakyKvStore {
    async fn get(&self, user_id: &str, key: &str) -> Result<Option<String>, RepositoryError> {
        self.inner.get(user_id, key).await
    }

    async fn set(&self, user_id: &str, key: &str, value: &str) -> Result<(), RepositoryError> {
        if key == MEMORY_KEY && self.fail_memory_writes.swap(false, Ordering::SeqCst) {
            let half = &value[..value.len() / 2];
            self.inner.set(user_id, key, half).await?;
            return Err(RepositoryError::QuotaExceeded("disk full".to_string()));
        }
        self.inner.set(user_id, key, value).await
    }

    async fn delete(&self, user_id: &str, key: &str) -> Result<(), RepositoryError> {
        self.inner.delete(user_id, key).await
    }

    async fn list_keys(&self, user_id: &str) -> Result<Vec<String>, RepositoryError> {
        self.inner.list_keys(user_id).await
    }
}

#[tokio::test]
async fn deal_reevaluation_keeps_one_entry() {
    let store = store();

    let first = apply_extraction(
        &store,
        r#"{"dealOutcome": {"company": "LangChain", "outcome": "pass", "reasons": ["competition"]}}"#,
    )
    .await;
    assert_eq!(first[0].action, UpdateAction::Add);

    let second = apply_extraction(
        &store,
        r#"{"dealOutcome": {"company": "LangChain", "outcome": "watching"}}"#,
    )
    .await;
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].kind, UpdateKind::DealHistory);
    assert_eq!(second[0].action, UpdateAction::Update);

    let memory = store.read().await;
    let entries: Vec<_> = memory
        .deal_history
        .iter()
        .filter(|d| d.company == "LangChain")
        .collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].outcome, Outcome::Watching);
}

#[tokio::test]
async fn repeated_extractions_reinforce_one_flag() {
    let store = store();
    let payload = r#"{"redFlags": [{"pattern": "customer_concentration", "threshold": "35%", "description": "Customer concentration >35%", "confidence": 0.5}]}"#;

    for n in 1..=7u32 {
        let updates = apply_extraction(&store, payload).await;
        assert_eq!(updates.len(), 1);
        let expected_action = if n == 1 { UpdateAction::Add } else { UpdateAction::Update };
        assert_eq!(updates[0].action, expected_action);

        let memory = store.read().await;
        assert_eq!(memory.red_flags.len(), 1);
        let flag = &memory.red_flags[0];
        assert_eq!(flag.times_applied, n);
        let expected = (0.5 + 0.1 * f64::from(n - 1)).min(1.0);
        assert!((flag.confidence - expected).abs() < 1e-9);
    }
}

#[tokio::test]
async fn oversized_history_is_trimmed_to_most_recent() {
    let store = MemoryStore::with_limits(
        InMemoryKvStore::new(),
        "demo_user",
        StoreLimits {
            max_bytes: 4_000,
            history_keep: 10,
        },
    );

    let mut memory = store.read().await;
    for i in 0..15 {
        memory.deal_history.push(deal(&format!("Company{i:02}")));
    }

    let report = store.write(&memory).await.unwrap();
    assert_eq!(report.trimmed_deals, 5);
    assert_eq!(report.advisory.as_deref(), Some(TRIM_ADVISORY));
    assert!(report.bytes <= 4_000);

    let stored = store.read().await;
    let companies: Vec<&str> = stored.deal_history.iter().map(|d| d.company.as_str()).collect();
    let expected: Vec<String> = (5..15).map(|i| format!("Company{i:02}")).collect();
    assert_eq!(companies, expected);
}

#[tokio::test]
async fn write_of_read_changes_only_updated_at() {
    let store = store();
    store
        .add_red_flag(RedFlagCandidate {
            pattern: "runway".to_string(),
            threshold: None,
            description: "Runway < 18 months".to_string(),
            learned_from: Some("Said so directly".to_string()),
            explicit: true,
            confidence: 0.9,
        })
        .await
        .unwrap();
    store.add_deal_outcome(deal("Acme")).await.unwrap();
    store.add_raw_context("Prefers B2B").await.unwrap();

    let before = store.read().await;
    store.write(&before).await.unwrap();
    let after = store.read().await;

    assert_eq!(
        Memory {
            updated_at: before.updated_at,
            ..after
        },
        before
    );
}

#[tokio::test]
async fn failed_write_restores_previous_document() {
    let store = MemoryStore::new(FlakyKvStore::new(), "demo_user");
    store.add_raw_context("Prefers B2B").await.unwrap();
    let before = store.read().await;

    store.kv().arm();
    let err = store.add_raw_context("Avoids hardware").await.unwrap_err();
    assert!(matches!(err, StoreError::QuotaExceeded));
    store.kv().disarm();

    let after = store.read().await;
    assert_eq!(after, before);
    assert_eq!(after.raw_context, vec!["Prefers B2B".to_string()]);
}

#[tokio::test]
async fn failed_extraction_write_reports_nothing_learned() {
    let store = MemoryStore::new(FlakyKvStore::new(), "demo_user");
    store.add_raw_context("Prefers B2B").await.unwrap();

    store.kv().arm();
    let updates = apply_extraction(&store, r#"{"rawContext": ["Avoids hardware"]}"#).await;
    assert!(updates.is_empty());
    assert_eq!(store.read().await.raw_context.len(), 1);
}

#[tokio::test]
async fn injected_context_grows_with_knowledge() {
    let store = store();
    assert_eq!(render(&store.read().await), "");

    apply_extraction(
        &store,
        r#"{
            "thesis": {"stages": ["Series A"], "sectors": ["AI"]},
            "redFlags": [{"pattern": "runway", "description": "Runway < 18 months", "explicit": true}],
            "memoPreferences": {"tone": "direct", "hedgeLanguage": false, "maxLengthPages": 1},
            "dealOutcome": {"company": "TechCo", "outcome": "pass", "reasons": ["burn rate"], "keyMetrics": {"arr": 3200000, "burn": 480000, "concentration": 0.34}},
            "rawContext": ["Co-invests with Sequoia"]
        }"#,
    )
    .await;

    let memory = store.read().await;
    let text = render(&memory);
    assert_eq!(text, render(&memory));
    assert!(text.contains("- Stages: Series A"));
    assert!(text.contains("- Runway < 18 months (explicit rule)"));
    assert!(text.contains("Keep to 1 page(s) or less"));
    assert!(text.contains(
        "- TechCo: PASS - reasons: burn rate (arr: $3.2M, burn: $480K, concentration: 34%)"
    ));
    assert!(text.contains("- Co-invests with Sequoia"));
}
