//! In-memory pattern learning shared by the alarm correlator (§4.8 step 4)
//! and the RCA engine (§4.9 step 2, SPEC_FULL §15).
//!
//! Rebuilt from process start every time — the core persists no state (§6).
//! A successful resolution, fed back through the healing orchestrator's
//! completion channel, reinforces or inserts a learned pattern; callers here
//! only read and write the table directly.

use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct LearnedPattern {
    pub root_cause: String,
    pub confidence: f64,
    pub action: Option<String>,
    pub hits: u32,
}

/// Keyed by a caller-chosen signature: the sorted `|`-joined alarm-type set
/// for the correlator, or `"{cause}->{effect}"` for the RCA engine.
#[derive(Clone)]
pub struct PatternStore {
    patterns: Arc<DashMap<String, LearnedPattern>>,
}

impl PatternStore {
    pub fn new() -> Self {
        Self {
            patterns: Arc::new(DashMap::new()),
        }
    }

    pub fn lookup(&self, key: &str) -> Option<LearnedPattern> {
        self.patterns.get(key).map(|p| p.clone())
    }

    /// Insert a new pattern, or reinforce an existing one: confidence moves
    /// toward the reported value with each hit, weighted by recency.
    pub fn reinforce(&self, key: &str, root_cause: &str, confidence: f64, action: Option<String>) {
        self.patterns
            .entry(key.to_string())
            .and_modify(|p| {
                p.hits += 1;
                p.confidence = (p.confidence * 0.7 + confidence * 0.3).clamp(0.0, 0.99);
                if action.is_some() {
                    p.action = action.clone();
                }
            })
            .or_insert(LearnedPattern {
                root_cause: root_cause.to_string(),
                confidence,
                action,
                hits: 1,
            });
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reinforce_inserts_then_moves_confidence_toward_new_reports() {
        let store = PatternStore::new();
        store.reinforce("A|B", "A", 0.6, None);
        assert_eq!(store.lookup("A|B").unwrap().hits, 1);

        store.reinforce("A|B", "A", 0.9, Some("restart".to_string()));
        let learned = store.lookup("A|B").unwrap();
        assert_eq!(learned.hits, 2);
        assert!(learned.confidence > 0.6);
        assert_eq!(learned.action.as_deref(), Some("restart"));
    }

    #[test]
    fn unknown_key_misses() {
        let store = PatternStore::new();
        assert!(store.lookup("nope").is_none());
    }
}
