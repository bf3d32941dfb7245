//! Part model: the normalized, matchable representation of a physical part.
//!
//! A [`Part`] is what the matcher sees: a display name and part number as
//! supplied by the caller, plus the semantic attributes (type, thread,
//! sealing, material) filled in during normalization. Identity is the
//! (part_number, display_name) pair; the [`PartId`] is a dense per-task
//! handle allocated in parts-list order.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Dense per-task part handle, allocated in parts-list order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PartId(pub u32);

impl fmt::Display for PartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "part:{}", self.0)
    }
}

static RE_METRIC_THREAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"M(\d+)(?:[xX×]([0-9]+(?:\.[0-9]+)?))?").expect("metric thread regex")
});

/// A thread designation such as `M8x1.25` or `1/4"NPT`.
///
/// Metric designations are decomposed into major diameter and pitch; anything
/// else is kept as an opaque string. Compatibility is exact-match on the raw
/// designation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSpec {
    /// The designation as written on the parts list.
    pub raw: String,
    /// Major diameter in millimetres for metric threads.
    pub major: Option<u32>,
    /// Pitch in millimetres, when explicit in the designation.
    pub pitch: Option<f64>,
}

impl ThreadSpec {
    /// Pitch assumed when the designation omits one.
    pub const DEFAULT_PITCH: f64 = 1.5;

    /// Parse a designation, extracting major diameter and pitch when metric.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim().to_string();
        match RE_METRIC_THREAD.captures(&raw) {
            Some(caps) => Self {
                major: caps.get(1).and_then(|m| m.as_str().parse().ok()),
                pitch: caps.get(2).and_then(|m| m.as_str().parse().ok()),
                raw,
            },
            None => Self {
                raw,
                major: None,
                pitch: None,
            },
        }
    }

    /// Pitch, falling back to [`Self::DEFAULT_PITCH`].
    pub fn pitch_or_default(&self) -> f64 {
        self.pitch.unwrap_or(Self::DEFAULT_PITCH)
    }

    /// Whether two threads can mate. Exact-match on the raw designation.
    pub fn compatible(&self, other: &ThreadSpec) -> bool {
        !self.raw.is_empty() && self.raw == other.raw
    }
}

impl fmt::Display for ThreadSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Closed set of part fields a rule condition may reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartField {
    Name,
    PartNumber,
    SemanticType,
    Thread,
    Sealing,
    Material,
}

/// A normalized part, scoped to one inference task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    pub id: PartId,
    /// Name as supplied by the caller, e.g. `螺栓M8`.
    pub display_name: String,
    /// Catalog or drawing number, possibly empty.
    pub part_number: String,
    /// Semantic type, e.g. `螺栓` (bolt) or `VCR接头` (VCR fitting).
    pub semantic_type: Option<String>,
    pub thread: Option<ThreadSpec>,
    pub sealing: Option<String>,
    pub material: Option<String>,
    /// True when blank fields were filled by the external enrichment service.
    /// Lowers the confidence of constraints derived from this part.
    pub enriched: bool,
}

impl Part {
    /// Read a condition-referenced field as a string, `None` when unset.
    pub fn field(&self, field: PartField) -> Option<&str> {
        match field {
            PartField::Name => Some(&self.display_name),
            PartField::PartNumber => {
                (!self.part_number.is_empty()).then_some(self.part_number.as_str())
            }
            PartField::SemanticType => self.semantic_type.as_deref(),
            PartField::Thread => self.thread.as_ref().map(|t| t.raw.as_str()),
            PartField::Sealing => self.sealing.as_deref(),
            PartField::Material => self.material.as_deref(),
        }
    }
}

/// A part record as supplied by the external parts-list parser or geometry
/// extractor, before normalization. Blank fields are filled in (never
/// overwritten) by the normalizer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPart {
    pub name: String,
    #[serde(default)]
    pub part_number: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub semantic_type: Option<String>,
    #[serde(default)]
    pub thread: Option<String>,
    #[serde(default)]
    pub sealing: Option<String>,
    #[serde(default)]
    pub material: Option<String>,
}

impl RawPart {
    /// Convenience constructor for a name-only record.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}
