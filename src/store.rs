//! Rule and constraint persistence.
//!
//! The rule store is the engine's long-term memory: the authored seed base
//! plus every rule the learner has extracted, with usage counters. The
//! constraint sink receives accepted constraints in chunks at the end of a
//! successful run. Both are traits so tests and embedders can substitute
//! their own backends; the in-memory implementations here are the defaults.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::constraint::Constraint;
use crate::error::StoreError;
use crate::rule::{Rule, RuleDraft, RuleId, seed_rules};
use crate::task::TaskId;

/// Long-term rule storage.
pub trait RuleStore: Send + Sync {
    /// All active rules, sorted by descending priority then ascending id.
    /// The matcher evaluates this order with first-match-wins semantics.
    fn snapshot(&self) -> Vec<Rule>;

    /// Insert learned rules, assigning fresh ids. Returns the stored rules.
    fn append_learned(&self, drafts: Vec<RuleDraft>) -> Result<Vec<Rule>, StoreError>;

    /// Bump a rule's usage counter after it fires.
    fn record_usage(&self, id: RuleId) -> Result<(), StoreError>;

    /// Bump a rule's success counter after operator feedback.
    fn record_success(&self, id: RuleId) -> Result<(), StoreError>;
}

/// Concurrent in-memory rule store.
#[derive(Debug)]
pub struct MemoryRuleStore {
    rules: DashMap<RuleId, Rule>,
    next_id: AtomicU64,
}

impl MemoryRuleStore {
    /// An empty store.
    pub fn new() -> Self {
        Self {
            rules: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// A store preloaded with the authored seed rule base.
    pub fn with_seed_rules() -> Self {
        let store = Self::new();
        for rule in seed_rules() {
            store.insert(rule);
        }
        store
    }

    /// Insert a rule with a caller-chosen id, advancing the allocator past it.
    pub fn insert(&self, rule: Rule) {
        self.next_id.fetch_max(rule.id.0 + 1, Ordering::Relaxed);
        self.rules.insert(rule.id, rule);
    }

    pub fn get(&self, id: RuleId) -> Option<Rule> {
        self.rules.get(&id).map(|r| r.clone())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Default for MemoryRuleStore {
    fn default() -> Self {
        Self::with_seed_rules()
    }
}

impl RuleStore for MemoryRuleStore {
    fn snapshot(&self) -> Vec<Rule> {
        let mut rules: Vec<Rule> = self
            .rules
            .iter()
            .filter(|r| r.active)
            .map(|r| r.clone())
            .collect();
        rules.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)));
        rules
    }

    fn append_learned(&self, drafts: Vec<RuleDraft>) -> Result<Vec<Rule>, StoreError> {
        let mut stored = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let id = RuleId(self.next_id.fetch_add(1, Ordering::Relaxed));
            let rule = Rule {
                id,
                name: draft.name,
                priority: draft.priority,
                origin: draft.origin,
                condition: draft.condition,
                action: draft.action,
                usage_count: 0,
                success_count: 0,
                active: true,
            };
            self.rules.insert(id, rule.clone());
            stored.push(rule);
        }
        Ok(stored)
    }

    fn record_usage(&self, id: RuleId) -> Result<(), StoreError> {
        let mut rule = self
            .rules
            .get_mut(&id)
            .ok_or(StoreError::RuleNotFound { id: id.0 })?;
        rule.usage_count += 1;
        Ok(())
    }

    fn record_success(&self, id: RuleId) -> Result<(), StoreError> {
        let mut rule = self
            .rules
            .get_mut(&id)
            .ok_or(StoreError::RuleNotFound { id: id.0 })?;
        rule.success_count += 1;
        Ok(())
    }
}

/// Destination for accepted constraints, written in chunks.
pub trait ConstraintSink: Send + Sync {
    fn persist(&self, task: TaskId, chunk: &[Constraint]) -> Result<(), StoreError>;
}

/// In-memory sink collecting everything persisted, keyed by nothing:
/// tasks are appended in arrival order.
#[derive(Debug, Default)]
pub struct MemoryConstraintSink {
    persisted: Mutex<Vec<(TaskId, Vec<Constraint>)>>,
}

impl MemoryConstraintSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All constraints persisted for a task, across chunks.
    pub fn constraints_for(&self, task: TaskId) -> Vec<Constraint> {
        self.persisted
            .lock()
            .expect("sink lock")
            .iter()
            .filter(|(t, _)| *t == task)
            .flat_map(|(_, chunk)| chunk.iter().cloned())
            .collect()
    }

    /// Number of chunks written across all tasks.
    pub fn chunk_count(&self) -> usize {
        self.persisted.lock().expect("sink lock").len()
    }
}

impl ConstraintSink for MemoryConstraintSink {
    fn persist(&self, task: TaskId, chunk: &[Constraint]) -> Result<(), StoreError> {
        self.persisted
            .lock()
            .map_err(|_| StoreError::Persist {
                message: "sink lock poisoned".into(),
            })?
            .push((task, chunk.to_vec()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{ConstraintId, ConstraintOrigin, ConstraintType};
    use crate::part::PartId;
    use crate::rule::{ActionTemplate, ConditionSpec, RuleOrigin};
    use std::collections::BTreeMap;

    #[test]
    fn seeded_store_snapshot_is_priority_ordered() {
        let store = MemoryRuleStore::with_seed_rules();
        let rules = store.snapshot();
        assert_eq!(rules.len(), 5);
        for pair in rules.windows(2) {
            assert!(
                pair[0].priority > pair[1].priority
                    || (pair[0].priority == pair[1].priority && pair[0].id < pair[1].id)
            );
        }
        // Equal-priority ties break on id: the VCR rule precedes bolt/nut.
        assert_eq!(rules[0].id, RuleId(1));
        assert_eq!(rules[1].id, RuleId(2));
    }

    #[test]
    fn append_learned_assigns_fresh_ids() {
        let store = MemoryRuleStore::with_seed_rules();
        let draft = RuleDraft {
            name: "learned: SCREW on M8".into(),
            priority: 5,
            origin: RuleOrigin::Learned,
            condition: ConditionSpec::ThreadMatch {
                required: Some("M8".into()),
            },
            action: ActionTemplate::bare(ConstraintType::Screw),
        };
        let stored = store.append_learned(vec![draft]).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, RuleId(6));
        assert_eq!(store.len(), 6);
        assert!(store.get(RuleId(6)).is_some());
    }

    #[test]
    fn inactive_rules_excluded_from_snapshot() {
        let store = MemoryRuleStore::with_seed_rules();
        let mut rule = store.get(RuleId(1)).unwrap();
        rule.active = false;
        store.insert(rule);
        assert_eq!(store.snapshot().len(), 4);
    }

    #[test]
    fn usage_and_success_counters() {
        let store = MemoryRuleStore::with_seed_rules();
        store.record_usage(RuleId(2)).unwrap();
        store.record_usage(RuleId(2)).unwrap();
        store.record_success(RuleId(2)).unwrap();
        let rule = store.get(RuleId(2)).unwrap();
        assert_eq!(rule.usage_count, 2);
        assert_eq!(rule.success_count, 1);
    }

    #[test]
    fn counter_update_on_missing_rule_errors() {
        let store = MemoryRuleStore::new();
        assert!(matches!(
            store.record_usage(RuleId(99)),
            Err(StoreError::RuleNotFound { id: 99 })
        ));
    }

    #[test]
    fn sink_collects_chunks_per_task() {
        let sink = MemoryConstraintSink::new();
        let constraint = Constraint {
            id: ConstraintId(1),
            kind: ConstraintType::Concentric,
            part_a: PartId(0),
            part_b: PartId(1),
            parameters: BTreeMap::new(),
            confidence: 0.9,
            reasoning: "test".into(),
            source_rule: None,
            origin: ConstraintOrigin::Rule,
        };
        sink.persist(TaskId(1), &[constraint.clone()]).unwrap();
        sink.persist(TaskId(1), &[constraint.clone()]).unwrap();
        sink.persist(TaskId(2), &[constraint]).unwrap();
        assert_eq!(sink.chunk_count(), 3);
        assert_eq!(sink.constraints_for(TaskId(1)).len(), 2);
        assert_eq!(sink.constraints_for(TaskId(2)).len(), 1);
    }
}
