//! Part normalization: turn heterogeneous part records into matchable parts.
//!
//! Normalization runs three passes over each record: semantic-type detection
//! from the name and description, thread extraction, and a lookup in a small
//! static standard-parts dictionary. Parts still missing a type or thread can
//! then be delegated to an external text-enrichment collaborator, which only
//! fills blank fields and never overwrites caller-supplied values.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::NormalizeError;
use crate::part::{Part, PartId, RawPart, ThreadSpec};

static RE_BOLT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)螺栓|bolt|screw\b").expect("bolt regex"));
static RE_NUT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)螺母|nut\b").expect("nut regex"));
static RE_FLANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)法兰|flange").expect("flange regex"));
static RE_FITTING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)接头|connector|fitting").expect("fitting regex"));
static RE_GASKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)垫片|gasket|washer").expect("gasket regex"));
static RE_VALVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)阀门|阀|valve").expect("valve regex"));
static RE_THREAD_IN_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"M\d+(?:[xX×][0-9]+(?:\.[0-9]+)?)?").expect("thread regex"));

/// Detect a semantic type from free-text name and description.
///
/// Canonical type labels follow the standard-parts vocabulary (Chinese), so
/// detected types and dictionary types compare equal in rule conditions.
pub fn detect_semantic_type(name: &str, description: &str) -> Option<&'static str> {
    let haystack = format!("{name} {description}");
    if RE_BOLT.is_match(&haystack) {
        Some("螺栓")
    } else if RE_NUT.is_match(&haystack) {
        Some("螺母")
    } else if RE_FLANGE.is_match(&haystack) {
        Some("法兰")
    } else if RE_FITTING.is_match(&haystack) {
        Some("接头")
    } else if RE_GASKET.is_match(&haystack) {
        Some("垫片")
    } else if RE_VALVE.is_match(&haystack) {
        Some("阀门")
    } else {
        None
    }
}

/// Extract the first thread designation found in free text.
pub fn extract_thread(text: &str) -> Option<ThreadSpec> {
    RE_THREAD_IN_TEXT
        .find(text)
        .map(|m| ThreadSpec::parse(m.as_str()))
}

/// One entry of the static standard-parts dictionary.
#[derive(Debug, Clone)]
pub struct StandardPart {
    pub semantic_type: &'static str,
    pub thread: Option<&'static str>,
    pub sealing: Option<&'static str>,
}

static STANDARD_PARTS: LazyLock<Vec<(&'static str, StandardPart)>> = LazyLock::new(|| {
    vec![
        (
            "VCR-4-VS-2",
            StandardPart {
                semantic_type: "VCR接头",
                thread: Some("M12x1.5"),
                sealing: Some("VCR金属密封"),
            },
        ),
        (
            "VCR-6-VS-6",
            StandardPart {
                semantic_type: "VCR接头",
                thread: Some("M16x2.0"),
                sealing: Some("VCR金属密封"),
            },
        ),
        (
            "SS-4-TA-7",
            StandardPart {
                semantic_type: "卡套接头",
                thread: Some("1/4\"NPT"),
                sealing: Some("卡套密封"),
            },
        ),
        (
            "GB/T 70.1-M8",
            StandardPart {
                semantic_type: "六角头螺栓",
                thread: Some("M8x1.25"),
                sealing: None,
            },
        ),
        (
            "GB/T 6170-M8",
            StandardPart {
                semantic_type: "六角螺母",
                thread: Some("M8x1.25"),
                sealing: None,
            },
        ),
    ]
});

/// Look up a part number in the standard-parts dictionary.
///
/// Tries an exact match first, then falls back to matching the manufacturer
/// prefix (the segment before the first `-`).
pub fn lookup_standard_part(part_number: &str) -> Option<&'static StandardPart> {
    if part_number.is_empty() {
        return None;
    }
    if let Some((_, entry)) = STANDARD_PARTS.iter().find(|(key, _)| *key == part_number) {
        return Some(entry);
    }
    STANDARD_PARTS.iter().find_map(|(key, entry)| {
        let prefix = key.split('-').next().unwrap_or(key);
        part_number.starts_with(prefix).then_some(entry)
    })
}

// ---------------------------------------------------------------------------
// Enrichment collaborator
// ---------------------------------------------------------------------------

/// Best-guess fields returned by the enrichment service for one part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrichment {
    pub part: PartId,
    #[serde(default)]
    pub semantic_type: Option<String>,
    #[serde(default)]
    pub thread: Option<String>,
    #[serde(default)]
    pub sealing: Option<String>,
}

/// External text-completion collaborator that proposes values for blank
/// part fields. Implementations must be side-effect free on the parts.
pub trait PartEnricher: Send + Sync {
    fn enrich(&self, parts: &[Part]) -> Result<Vec<Enrichment>, NormalizeError>;
}

/// No-op enricher for setups without a text-completion service.
pub struct NoEnrichment;

impl PartEnricher for NoEnrichment {
    fn enrich(&self, _parts: &[Part]) -> Result<Vec<Enrichment>, NormalizeError> {
        Ok(Vec::new())
    }
}

/// HTTP enricher posting unresolved parts to an external service.
pub struct HttpEnricher {
    url: String,
    timeout: Duration,
}

impl HttpEnricher {
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}

#[derive(Serialize)]
struct EnrichRequest<'a> {
    parts: &'a [Part],
}

#[derive(Deserialize)]
struct EnrichResponse {
    #[serde(default)]
    enrichments: Vec<Enrichment>,
}

impl PartEnricher for HttpEnricher {
    fn enrich(&self, parts: &[Part]) -> Result<Vec<Enrichment>, NormalizeError> {
        let response = ureq::post(&self.url)
            .timeout(self.timeout)
            .send_json(&EnrichRequest { parts })
            .map_err(|e| NormalizeError::Enrichment {
                message: e.to_string(),
            })?;
        let body: EnrichResponse =
            response
                .into_json()
                .map_err(|e| NormalizeError::Enrichment {
                    message: format!("invalid enrichment response: {e}"),
                })?;
        Ok(body.enrichments)
    }
}

// ---------------------------------------------------------------------------
// Normalizer
// ---------------------------------------------------------------------------

/// Normalize raw part records into matchable [`Part`]s.
///
/// Never fails: an unavailable enrichment service is a logged soft failure
/// and the affected parts keep their blank fields.
pub fn normalize_parts(raw: &[RawPart], enricher: &dyn PartEnricher) -> Vec<Part> {
    let mut parts: Vec<Part> = raw
        .iter()
        .enumerate()
        .map(|(i, r)| normalize_one(PartId(i as u32), r))
        .collect();

    let unresolved: Vec<Part> = parts
        .iter()
        .filter(|p| p.semantic_type.is_none() || p.thread.is_none())
        .cloned()
        .collect();

    if !unresolved.is_empty() {
        match enricher.enrich(&unresolved) {
            Ok(enrichments) => apply_enrichments(&mut parts, &enrichments),
            Err(err) => {
                tracing::warn!(
                    unresolved = unresolved.len(),
                    error = %err,
                    "enrichment unavailable; continuing with blank fields"
                );
            }
        }
    }

    let typed = parts.iter().filter(|p| p.semantic_type.is_some()).count();
    tracing::info!(
        parts = parts.len(),
        typed,
        enriched = parts.iter().filter(|p| p.enriched).count(),
        "normalized parts"
    );
    parts
}

fn normalize_one(id: PartId, raw: &RawPart) -> Part {
    let semantic_type = raw
        .semantic_type
        .clone()
        .or_else(|| detect_semantic_type(&raw.name, &raw.description).map(str::to_string));

    let thread = raw
        .thread
        .as_deref()
        .filter(|t| !t.is_empty())
        .map(ThreadSpec::parse)
        .or_else(|| extract_thread(&format!("{} {}", raw.name, raw.description)));

    let mut part = Part {
        id,
        display_name: raw.name.clone(),
        part_number: raw.part_number.clone(),
        semantic_type,
        thread,
        sealing: raw.sealing.clone(),
        material: raw.material.clone(),
        enriched: false,
    };

    // The dictionary only fills what detection left blank.
    if let Some(standard) = lookup_standard_part(&part.part_number) {
        if part.semantic_type.is_none() {
            part.semantic_type = Some(standard.semantic_type.to_string());
        }
        if part.thread.is_none() {
            part.thread = standard.thread.map(ThreadSpec::parse);
        }
        if part.sealing.is_none() {
            part.sealing = standard.sealing.map(str::to_string);
        }
    }

    part
}

/// Merge enrichment results into the part list, filling blanks only.
fn apply_enrichments(parts: &mut [Part], enrichments: &[Enrichment]) {
    for enrichment in enrichments {
        let Some(part) = parts.iter_mut().find(|p| p.id == enrichment.part) else {
            tracing::warn!(part = %enrichment.part, "enrichment for unknown part id");
            continue;
        };
        let mut touched = false;
        if part.semantic_type.is_none() {
            if let Some(ty) = &enrichment.semantic_type {
                part.semantic_type = Some(ty.clone());
                touched = true;
            }
        }
        if part.thread.is_none() {
            if let Some(thread) = &enrichment.thread {
                part.thread = Some(ThreadSpec::parse(thread));
                touched = true;
            }
        }
        if part.sealing.is_none() {
            if let Some(sealing) = &enrichment.sealing {
                part.sealing = Some(sealing.clone());
                touched = true;
            }
        }
        if touched {
            part.enriched = true;
        }
    }
}
