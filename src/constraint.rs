//! Constraint model: typed mating relationships between two parts.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::part::PartId;
use crate::rule::RuleId;

/// Unique constraint handle within one inference task.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct ConstraintId(pub u64);

impl fmt::Display for ConstraintId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "constraint:{}", self.0)
    }
}

/// Monotonic allocator for constraint ids, shared across pipeline stages.
#[derive(Debug)]
pub struct ConstraintIdGen {
    next: AtomicU64,
}

impl ConstraintIdGen {
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
        }
    }

    pub fn next_id(&self) -> ConstraintId {
        ConstraintId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConstraintIdGen {
    fn default() -> Self {
        Self::new()
    }
}

/// Closed set of mate types understood by the engine.
///
/// The wire form is the external solver's uppercase vocabulary
/// (`CONCENTRIC`, `SCREW`, `ANGLE_90`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintType {
    Concentric,
    Screw,
    Coincident,
    Parallel,
    Perpendicular,
    Distance,
    Angle(u16),
    HoleSpacing,
    AxisAlign,
    /// Explicit install-order dependency with no geometric meaning.
    Dependency,
}

impl ConstraintType {
    /// Wire token, matching the external solver's vocabulary.
    pub fn token(&self) -> String {
        match self {
            Self::Concentric => "CONCENTRIC".into(),
            Self::Screw => "SCREW".into(),
            Self::Coincident => "COINCIDENT".into(),
            Self::Parallel => "PARALLEL".into(),
            Self::Perpendicular => "PERPENDICULAR".into(),
            Self::Distance => "DISTANCE".into(),
            Self::Angle(deg) => format!("ANGLE_{deg}"),
            Self::HoleSpacing => "HOLE_SPACING".into(),
            Self::AxisAlign => "AXIS_ALIGN".into(),
            Self::Dependency => "DEPENDENCY".into(),
        }
    }

    /// Parse a wire token, case-insensitively.
    pub fn parse_token(token: &str) -> Option<Self> {
        let token = token.trim().to_uppercase();
        if let Some(deg) = token.strip_prefix("ANGLE_") {
            return deg.parse().ok().map(Self::Angle);
        }
        match token.as_str() {
            "CONCENTRIC" => Some(Self::Concentric),
            "SCREW" => Some(Self::Screw),
            "COINCIDENT" => Some(Self::Coincident),
            "PARALLEL" => Some(Self::Parallel),
            "PERPENDICULAR" => Some(Self::Perpendicular),
            "DISTANCE" => Some(Self::Distance),
            "HOLE_SPACING" => Some(Self::HoleSpacing),
            "AXIS_ALIGN" => Some(Self::AxisAlign),
            "DEPENDENCY" => Some(Self::Dependency),
            _ => None,
        }
    }

    /// Whether this mate implies an install-order dependency: the first
    /// part must be seated before the second.
    pub fn implies_dependency(&self) -> bool {
        matches!(self, Self::Screw | Self::Dependency)
    }
}

impl fmt::Display for ConstraintType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

impl Serialize for ConstraintType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.token())
    }
}

impl<'de> Deserialize<'de> for ConstraintType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Self::parse_token(&token)
            .ok_or_else(|| D::Error::custom(format!("unknown constraint type `{token}`")))
    }
}

/// Where a constraint came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConstraintOrigin {
    /// Derived by the rule matcher.
    Rule,
    /// Extracted by the external 3D geometry analyzer.
    ExternalGeometry,
}

/// A typed mating relationship between two parts. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraint {
    pub id: ConstraintId,
    #[serde(rename = "type")]
    pub kind: ConstraintType,
    pub part_a: PartId,
    pub part_b: PartId,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    /// Heuristic trust score in [0, 1].
    pub confidence: f64,
    /// Human-readable derivation note for operator audits.
    pub reasoning: String,
    pub source_rule: Option<RuleId>,
    pub origin: ConstraintOrigin,
}

/// A conflict reported by the external validator, surfaced verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub message: String,
    #[serde(default)]
    pub constraint_ids: Vec<u64>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}
