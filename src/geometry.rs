//! Geometry-derived constraints from the external 3D model analyzer.
//!
//! The analyzer speaks in part names, not ids. Resolution maps its
//! constraints onto the normalized parts of the current task; anything
//! referencing an unknown part is dropped with a warning rather than
//! failing the run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::constraint::{Constraint, ConstraintIdGen, ConstraintOrigin, ConstraintType};
use crate::part::{Part, RawPart};

/// Payload from the external geometry analyzer: the parts it saw in the
/// model plus the constraints it extracted between them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeometryExtraction {
    #[serde(default)]
    pub parts: Vec<RawPart>,
    #[serde(default)]
    pub constraints: Vec<GeoConstraint>,
}

/// One analyzer-extracted constraint, referencing parts by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConstraint {
    #[serde(rename = "type")]
    pub kind: ConstraintType,
    pub part_a: String,
    pub part_b: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default = "default_geo_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

fn default_geo_confidence() -> f64 {
    0.9
}

fn find_part<'a>(parts: &'a [Part], name: &str) -> Option<&'a Part> {
    parts
        .iter()
        .find(|p| p.display_name == name || (!p.part_number.is_empty() && p.part_number == name))
}

/// Resolve analyzer constraints against the task's normalized parts.
///
/// Unresolvable references are dropped with a warning. Confidence is
/// clamped to [0, 1].
pub fn resolve_geometry(
    geo: &GeometryExtraction,
    parts: &[Part],
    ids: &ConstraintIdGen,
) -> Vec<Constraint> {
    let mut resolved = Vec::with_capacity(geo.constraints.len());
    for gc in &geo.constraints {
        let (Some(a), Some(b)) = (find_part(parts, &gc.part_a), find_part(parts, &gc.part_b))
        else {
            tracing::warn!(
                part_a = %gc.part_a,
                part_b = %gc.part_b,
                kind = %gc.kind,
                "geometry constraint references unknown part, dropping"
            );
            continue;
        };
        resolved.push(Constraint {
            id: ids.next_id(),
            kind: gc.kind,
            part_a: a.id,
            part_b: b.id,
            parameters: gc.parameters.clone(),
            confidence: gc.confidence.clamp(0.0, 1.0),
            reasoning: if gc.reasoning.is_empty() {
                format!("extracted from 3D model geometry ({} / {})", a.display_name, b.display_name)
            } else {
                gc.reasoning.clone()
            },
            source_rule: None,
            origin: ConstraintOrigin::ExternalGeometry,
        });
    }
    resolved
}
