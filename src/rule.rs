//! Rules: condition/action pairs that derive a constraint from a part pair.
//!
//! Conditions and actions are closed tagged unions, exhaustively matched at
//! compile time — there is no runtime expression language. Rules are created
//! by configuration (authored) or by the learner (learned) and are immutable
//! once matched against; only their usage counters change, and only through
//! the owning rule store.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::constraint::ConstraintType;
use crate::part::{Part, PartField, ThreadSpec};

/// Store-assigned rule handle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RuleId(pub u64);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleOrigin {
    Authored,
    Learned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    Equals,
    Contains,
}

/// Closed set of condition shapes a rule may test against a part pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionSpec {
    /// Both parts' `field` matches `value`.
    Both {
        field: PartField,
        value: String,
        mode: MatchMode,
    },
    /// Both parts carry identical non-empty threads. When `required` is set,
    /// the shared designation must also contain that substring.
    ThreadMatch {
        #[serde(default)]
        required: Option<String>,
    },
    /// One part is a bolt and the other a nut, in either order.
    BoltNutPair { require_same_thread: bool },
    /// Either part's `field` contains `value`.
    NameContains { field: PartField, value: String },
    /// Exactly these two parts by display name, in either order.
    SpecificPair { part_a: String, part_b: String },
    /// Unconditional match. Used as a last-resort conversion target.
    Always,
}

fn field_matches(part: &Part, field: PartField, value: &str, mode: MatchMode) -> bool {
    match part.field(field) {
        Some(actual) => match mode {
            MatchMode::Equals => actual == value,
            MatchMode::Contains => actual.contains(value),
        },
        None => false,
    }
}

fn is_bolt(part: &Part) -> bool {
    part.semantic_type
        .as_deref()
        .is_some_and(|t| t.contains("螺栓") || t.to_lowercase().contains("bolt"))
}

fn is_nut(part: &Part) -> bool {
    part.semantic_type
        .as_deref()
        .is_some_and(|t| t.contains("螺母") || t.to_lowercase().contains("nut"))
}

fn threads_match(a: &Part, b: &Part) -> bool {
    match (&a.thread, &b.thread) {
        (Some(ta), Some(tb)) => ta.compatible(tb),
        _ => false,
    }
}

impl ConditionSpec {
    /// Evaluate the condition against an unordered part pair.
    pub fn matches(&self, a: &Part, b: &Part) -> bool {
        match self {
            Self::Both { field, value, mode } => {
                field_matches(a, *field, value, *mode) && field_matches(b, *field, value, *mode)
            }
            Self::ThreadMatch { required } => {
                threads_match(a, b)
                    && required.as_deref().is_none_or(|needle| {
                        a.thread.as_ref().is_some_and(|t| t.raw.contains(needle))
                    })
            }
            Self::BoltNutPair { require_same_thread } => {
                let paired = (is_bolt(a) && is_nut(b)) || (is_nut(a) && is_bolt(b));
                paired && (!require_same_thread || threads_match(a, b))
            }
            Self::NameContains { field, value } => {
                field_matches(a, *field, value, MatchMode::Contains)
                    || field_matches(b, *field, value, MatchMode::Contains)
            }
            Self::SpecificPair { part_a, part_b } => {
                (a.display_name == *part_a && b.display_name == *part_b)
                    || (a.display_name == *part_b && b.display_name == *part_a)
            }
            Self::Always => true,
        }
    }
}

/// One parameter slot of an action template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ParamTemplate {
    /// A literal value copied into the constraint.
    Fixed(serde_json::Value),
    /// Resolved at instantiation time from either part's thread pitch.
    ThreadPitch,
}

/// What a matched rule produces: a constraint type plus parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionTemplate {
    pub constraint_type: ConstraintType,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamTemplate>,
}

impl ActionTemplate {
    /// Bare action with no parameters.
    pub fn bare(constraint_type: ConstraintType) -> Self {
        Self {
            constraint_type,
            parameters: BTreeMap::new(),
        }
    }

    /// Instantiate the template into concrete parameters for a pair.
    pub fn instantiate(&self, a: &Part, b: &Part) -> BTreeMap<String, serde_json::Value> {
        self.parameters
            .iter()
            .map(|(key, template)| {
                let value = match template {
                    ParamTemplate::Fixed(v) => v.clone(),
                    ParamTemplate::ThreadPitch => {
                        let pitch = a
                            .thread
                            .as_ref()
                            .or(b.thread.as_ref())
                            .map(ThreadSpec::pitch_or_default)
                            .unwrap_or(ThreadSpec::DEFAULT_PITCH);
                        json!(pitch)
                    }
                };
                (key.clone(), value)
            })
            .collect()
    }
}

/// A condition/action pair with a priority and usage statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    /// Higher priorities are evaluated first; ties break on id.
    pub priority: i32,
    pub origin: RuleOrigin,
    pub condition: ConditionSpec,
    pub action: ActionTemplate,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// A rule awaiting insertion: everything but the store-assigned id.
#[derive(Debug, Clone)]
pub struct RuleDraft {
    pub name: String,
    pub priority: i32,
    pub origin: RuleOrigin,
    pub condition: ConditionSpec,
    pub action: ActionTemplate,
}

/// The authored seed rule base, mirroring the hand-written rules the
/// engine ships with before any learning has happened.
pub fn seed_rules() -> Vec<Rule> {
    let rule = |id: u64, name: &str, priority: i32, condition: ConditionSpec, action: ActionTemplate| Rule {
        id: RuleId(id),
        name: name.to_string(),
        priority,
        origin: RuleOrigin::Authored,
        condition,
        action,
        usage_count: 0,
        success_count: 0,
        active: true,
    };

    let fixed = |v: serde_json::Value| ParamTemplate::Fixed(v);

    vec![
        rule(
            1,
            "VCR fitting concentric mate",
            10,
            ConditionSpec::Both {
                field: PartField::SemanticType,
                value: "VCR接头".into(),
                mode: MatchMode::Equals,
            },
            ActionTemplate {
                constraint_type: ConstraintType::Concentric,
                parameters: BTreeMap::from([("alignment".into(), fixed(json!("ALIGNED")))]),
            },
        ),
        rule(
            2,
            "bolt/nut screw pair",
            10,
            ConditionSpec::BoltNutPair {
                require_same_thread: true,
            },
            ActionTemplate {
                constraint_type: ConstraintType::Screw,
                parameters: BTreeMap::from([
                    ("pitch".into(), ParamTemplate::ThreadPitch),
                    ("revolutions".into(), fixed(json!(8))),
                ]),
            },
        ),
        rule(
            3,
            "compatible thread screw mate",
            9,
            ConditionSpec::ThreadMatch { required: None },
            ActionTemplate {
                constraint_type: ConstraintType::Screw,
                parameters: BTreeMap::from([
                    ("pitch".into(), ParamTemplate::ThreadPitch),
                    ("revolutions".into(), fixed(json!(5))),
                    ("direction".into(), fixed(json!("RIGHT_HAND"))),
                ]),
            },
        ),
        rule(
            4,
            "ferrule fitting concentric mate",
            9,
            ConditionSpec::Both {
                field: PartField::SemanticType,
                value: "卡套".into(),
                mode: MatchMode::Contains,
            },
            ActionTemplate {
                constraint_type: ConstraintType::Concentric,
                parameters: BTreeMap::from([("alignment".into(), fixed(json!("ALIGNED")))]),
            },
        ),
        rule(
            5,
            "flange face coincident mate",
            8,
            ConditionSpec::Both {
                field: PartField::SemanticType,
                value: "法兰".into(),
                mode: MatchMode::Contains,
            },
            ActionTemplate {
                constraint_type: ConstraintType::Coincident,
                parameters: BTreeMap::from([
                    ("alignment".into(), fixed(json!("ALIGNED"))),
                    ("flip".into(), fixed(json!(false))),
                ]),
            },
        ),
    ]
}
