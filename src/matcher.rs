//! The rule matcher: derives constraints from part pairs.
//!
//! Every unordered pair is tested against the rule snapshot in priority
//! order with first-match-wins semantics. One pair yields at most one
//! rule-derived constraint.

use std::sync::Arc;

use crate::constraint::{Constraint, ConstraintIdGen, ConstraintOrigin};
use crate::part::Part;
use crate::rule::Rule;
use crate::store::RuleStore;

/// Confidence of a constraint derived by `rule` for the pair `(a, b)`.
///
/// Starts at a 0.6 base, rewarded for semantic knowledge and exact thread
/// agreement, penalized when either part was filled in by enrichment, and
/// nudged by the rule's priority. Clamped to [0, 1].
pub fn confidence(rule: &Rule, a: &Part, b: &Part) -> f64 {
    let mut score = 0.6;
    if a.semantic_type.is_some() || b.semantic_type.is_some() {
        score += 0.15;
    }
    let threads_agree = match (&a.thread, &b.thread) {
        (Some(ta), Some(tb)) => ta.compatible(tb),
        _ => false,
    };
    if threads_agree {
        score += 0.2;
    }
    if a.enriched || b.enriched {
        score -= 0.05;
    }
    score += rule.priority as f64 / 100.0;
    score.clamp(0.0, 1.0)
}

/// Match every unordered part pair against the rule list.
///
/// `rules` must already be sorted by descending priority (ties on id), as
/// produced by [`RuleStore::snapshot`]. Usage counters are bumped through
/// the store for every rule that fires; a counter failure is logged and
/// does not abort the run.
pub fn match_parts(
    parts: &[Part],
    rules: &[Rule],
    store: &Arc<dyn RuleStore>,
    ids: &ConstraintIdGen,
) -> Vec<Constraint> {
    let mut constraints = Vec::new();
    for i in 0..parts.len() {
        for j in (i + 1)..parts.len() {
            let (a, b) = (&parts[i], &parts[j]);
            let Some(rule) = rules.iter().find(|r| r.condition.matches(a, b)) else {
                continue;
            };

            if let Err(e) = store.record_usage(rule.id) {
                tracing::warn!(rule = %rule.id, error = %e, "usage counter update failed");
            }

            let constraint = Constraint {
                id: ids.next_id(),
                kind: rule.action.constraint_type,
                part_a: a.id,
                part_b: b.id,
                parameters: rule.action.instantiate(a, b),
                confidence: confidence(rule, a, b),
                reasoning: format!(
                    "{} + {} matched rule `{}`",
                    a.display_name, b.display_name, rule.name
                ),
                source_rule: Some(rule.id),
                origin: ConstraintOrigin::Rule,
            };
            tracing::debug!(
                constraint = %constraint.id,
                kind = %constraint.kind,
                rule = %rule.id,
                confidence = constraint.confidence,
                "pair matched"
            );
            constraints.push(constraint);
        }
    }
    constraints
}

/// Drop constraints below the acceptance threshold, preserving order.
pub fn filter_by_confidence(constraints: Vec<Constraint>, threshold: f64) -> Vec<Constraint> {
    constraints
        .into_iter()
        .filter(|c| c.confidence >= threshold)
        .collect()
}
