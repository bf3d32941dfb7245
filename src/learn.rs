//! Rule learning: extracts reusable rules from accepted constraints.
//!
//! After a successful run, accepted constraints are grouped by type and
//! mined for recurring part-name features (thread designations, hole
//! diameters, a closed keyword vocabulary). A feature seen often enough
//! becomes a learned rule, fed back into the store for future runs.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constraint::{Constraint, ConstraintType};
use crate::part::{Part, PartField, PartId};
use crate::rule::{ActionTemplate, ConditionSpec, MatchMode, RuleDraft, RuleOrigin};

/// Minimum occurrences of a feature before it yields a rule.
pub const MIN_SAMPLES: usize = 2;
/// Occurrences at which a learned rule gets high priority.
pub const HIGH_PRIORITY_SAMPLES: usize = 5;

// Bare major diameter only: all pitch variants of M8 pool into one
// "M8" feature. Pitch-aware parsing stays in normalization.
static RE_THREAD_FEATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"M\d+").expect("thread feature regex"));
static RE_HOLE_FEATURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[Φφ]\d+(?:\.\d+)?").expect("hole feature regex"));

/// Closed vocabulary of part-kind keywords mined from names.
const KEYWORDS: &[&str] = &[
    "螺栓", "螺母", "螺钉", "垫片", "法兰", "接头", "阀门",
    "bolt", "nut", "gasket", "flange", "fitting", "valve",
];

/// What kind of name feature a learned rule keys on.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum FeatureKind {
    Thread,
    Hole,
    Keyword,
}

/// A rule candidate mined from one run's accepted constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearnedRule {
    pub constraint_type: ConstraintType,
    pub feature: String,
    pub kind: FeatureKind,
    pub sample_count: usize,
    pub confidence: f64,
    /// Up to three example pair descriptions, for operator review.
    pub examples: Vec<String>,
}

impl LearnedRule {
    pub fn priority(&self) -> i32 {
        if self.sample_count >= HIGH_PRIORITY_SAMPLES { 9 } else { 5 }
    }

    /// Convert into a draft ready for the rule store.
    pub fn to_draft(&self) -> RuleDraft {
        let condition = match self.kind {
            FeatureKind::Thread => ConditionSpec::ThreadMatch {
                required: Some(self.feature.clone()),
            },
            FeatureKind::Hole | FeatureKind::Keyword => ConditionSpec::NameContains {
                field: PartField::Name,
                value: self.feature.clone(),
            },
        };
        RuleDraft {
            name: format!("learned: {} on {}", self.constraint_type, self.feature),
            priority: self.priority(),
            origin: RuleOrigin::Learned,
            condition,
            action: ActionTemplate::bare(self.constraint_type),
        }
    }
}

fn features_of(name: &str) -> Vec<(FeatureKind, String)> {
    let mut features = Vec::new();
    for m in RE_THREAD_FEATURE.find_iter(name) {
        features.push((FeatureKind::Thread, m.as_str().to_string()));
    }
    for m in RE_HOLE_FEATURE.find_iter(name) {
        features.push((FeatureKind::Hole, m.as_str().to_string()));
    }
    let lower = name.to_lowercase();
    for kw in KEYWORDS {
        if lower.contains(kw) {
            features.push((FeatureKind::Keyword, (*kw).to_string()));
        }
    }
    features
}

fn part_name(parts: &[Part], id: PartId) -> &str {
    parts
        .iter()
        .find(|p| p.id == id)
        .map(|p| p.display_name.as_str())
        .unwrap_or("")
}

/// Mine learned rules from one run's accepted constraints.
///
/// Constraints are grouped by type; groups smaller than [`MIN_SAMPLES`]
/// are skipped. Within a group, each feature found in either of a
/// constraint's two part names counts one sample, so asymmetric mates
/// (gasket against flange, bolt against bracket) contribute to the same
/// pattern pool as symmetric ones. Deterministic: groups and features
/// iterate in sorted order.
pub fn learn(accepted: &[Constraint], parts: &[Part]) -> Vec<LearnedRule> {
    let mut groups: BTreeMap<ConstraintType, Vec<&Constraint>> = BTreeMap::new();
    for c in accepted {
        groups.entry(c.kind).or_default().push(c);
    }

    let mut learned = Vec::new();
    for (kind, group) in groups {
        if group.len() < MIN_SAMPLES {
            continue;
        }

        let mut samples: BTreeMap<(FeatureKind, String), Vec<String>> = BTreeMap::new();
        for c in &group {
            let name_a = part_name(parts, c.part_a);
            let name_b = part_name(parts, c.part_b);
            // One sample per constraint per feature, regardless of which
            // of the two names carried it.
            let mut features = features_of(name_a);
            features.extend(features_of(name_b));
            features.sort();
            features.dedup();
            for feature in features {
                samples
                    .entry(feature)
                    .or_default()
                    .push(format!("{name_a} + {name_b}"));
            }
        }

        for ((feature_kind, feature), examples) in samples {
            let count = examples.len();
            if count < MIN_SAMPLES {
                continue;
            }
            learned.push(LearnedRule {
                constraint_type: kind,
                feature,
                kind: feature_kind,
                sample_count: count,
                confidence: (0.5 + 0.1 * count as f64).min(0.95),
                examples: examples.into_iter().take(3).collect(),
            });
        }
    }

    if !learned.is_empty() {
        tracing::info!(count = learned.len(), "learned rules from accepted constraints");
    }
    learned
}

/// Convert one operator-accepted constraint directly into a rule draft.
///
/// Prefers the most specific condition the parts support: a shared
/// semantic type, then a shared name feature, then the literal pair,
/// then an unconditional rule.
pub fn rule_from_constraint(c: &Constraint, parts: &[Part]) -> RuleDraft {
    let a = parts.iter().find(|p| p.id == c.part_a);
    let b = parts.iter().find(|p| p.id == c.part_b);

    let condition = match (a, b) {
        (Some(a), Some(b)) => {
            let shared_type = match (&a.semantic_type, &b.semantic_type) {
                (Some(ta), Some(tb)) if ta == tb => Some(ta.clone()),
                _ => None,
            };
            if let Some(value) = shared_type {
                ConditionSpec::Both {
                    field: PartField::SemanticType,
                    value,
                    mode: MatchMode::Contains,
                }
            } else if let Some((_, feature)) = features_of(&a.display_name)
                .into_iter()
                .find(|f| features_of(&b.display_name).contains(f))
            {
                ConditionSpec::NameContains {
                    field: PartField::Name,
                    value: feature,
                }
            } else {
                ConditionSpec::SpecificPair {
                    part_a: a.display_name.clone(),
                    part_b: b.display_name.clone(),
                }
            }
        }
        _ => ConditionSpec::Always,
    };

    RuleDraft {
        name: format!("accepted: {} constraint", c.kind),
        priority: ((c.confidence * 100.0).round() as i32).max(1),
        origin: RuleOrigin::Learned,
        condition,
        action: ActionTemplate {
            constraint_type: c.kind,
            parameters: c
                .parameters
                .iter()
                .map(|(k, v)| (k.clone(), crate::rule::ParamTemplate::Fixed(v.clone())))
                .collect(),
        },
    }
}
