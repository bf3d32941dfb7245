//! End-to-end pipeline tests against the in-memory engine.

use std::sync::Arc;

use matewright::config::EngineConfig;
use matewright::constraint::{Conflict, Constraint, ConstraintType};
use matewright::geometry::{GeoConstraint, GeometryExtraction};
use matewright::normalize::NoEnrichment;
use matewright::part::{PartId, RawPart};
use matewright::rule::RuleId;
use matewright::error::StoreError;
use matewright::store::{ConstraintSink, MemoryConstraintSink, MemoryRuleStore};
use matewright::task::{MateEngine, TaskStatus};
use matewright::validate::{ConflictValidator, NoValidator, Verdict};

fn engine_with(
    config: EngineConfig,
    store: Arc<MemoryRuleStore>,
    validator: Arc<dyn ConflictValidator>,
    sink: Arc<MemoryConstraintSink>,
) -> MateEngine {
    MateEngine::new(config, store, validator, Arc::new(NoEnrichment), sink)
}

fn default_engine() -> (MateEngine, Arc<MemoryRuleStore>, Arc<MemoryConstraintSink>) {
    let store = Arc::new(MemoryRuleStore::with_seed_rules());
    let sink = Arc::new(MemoryConstraintSink::new());
    let engine = engine_with(
        EngineConfig::default(),
        store.clone(),
        Arc::new(NoValidator),
        sink.clone(),
    );
    (engine, store, sink)
}

fn bolt_and_nut() -> Vec<RawPart> {
    vec![RawPart::named("六角头螺栓M8x1.25"), RawPart::named("六角螺母M8x1.25")]
}

#[test]
fn bolt_nut_list_derives_screw_constraint() {
    let (engine, _, sink) = default_engine();
    let result = engine.run_inference(bolt_and_nut(), None).unwrap();

    assert_eq!(result.status, TaskStatus::Completed);
    assert_eq!(result.constraints.len(), 1);

    let c = &result.constraints[0];
    assert_eq!(c.kind, ConstraintType::Screw);
    assert_eq!(c.confidence, 1.0);
    assert_eq!(c.parameters["pitch"], serde_json::json!(1.25));

    // Screw implies install order: bolt before nut.
    assert_eq!(result.sequence.order, vec![PartId(0), PartId(1)]);
    assert!(result.sequence.omitted.is_empty());

    // Accepted constraints reached the sink.
    assert_eq!(sink.constraints_for(result.task_id).len(), 1);
    assert!(result.failure.is_none());
}

#[test]
fn empty_parts_list_fails_fast() {
    let (engine, _, _) = default_engine();
    assert!(engine.run_inference(Vec::new(), None).is_err());
}

#[test]
fn unvalidated_verdict_does_not_fail_the_task() {
    let (engine, _, _) = default_engine();
    let result = engine.run_inference(bolt_and_nut(), None).unwrap();
    assert_eq!(result.status, TaskStatus::Completed);
    assert!(matches!(result.validation, Verdict::Unvalidated { .. }));
    assert!(result.conflicts.is_empty());
}

struct InfeasibleValidator;

impl ConflictValidator for InfeasibleValidator {
    fn validate(&self, constraints: &[Constraint]) -> Verdict {
        Verdict::Infeasible {
            conflicts: vec![Conflict {
                message: "parts interpenetrate".into(),
                constraint_ids: constraints.iter().map(|c| c.id.0).collect(),
                detail: None,
            }],
        }
    }
}

#[test]
fn infeasible_verdict_fails_task_and_persists_nothing() {
    let store = Arc::new(MemoryRuleStore::with_seed_rules());
    let sink = Arc::new(MemoryConstraintSink::new());
    let engine = engine_with(
        EngineConfig::default(),
        store.clone(),
        Arc::new(InfeasibleValidator),
        sink.clone(),
    );

    let result = engine.run_inference(bolt_and_nut(), None).unwrap();
    assert_eq!(result.status, TaskStatus::Failed);
    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.conflicts[0].message, "parts interpenetrate");
    assert!(result.failure.is_some());

    // Nothing persisted, nothing learned, no sequence computed.
    assert_eq!(sink.chunk_count(), 0);
    assert!(result.learned_rules.is_empty());
    assert!(result.sequence.order.is_empty());
    assert_eq!(store.len(), 5);
}

#[test]
fn geometry_constraints_merge_with_rule_constraints() {
    let (engine, _, _) = default_engine();
    let geometry = GeometryExtraction {
        parts: vec![],
        constraints: vec![GeoConstraint {
            kind: ConstraintType::Coincident,
            part_a: "六角头螺栓M8x1.25".into(),
            part_b: "六角螺母M8x1.25".into(),
            parameters: Default::default(),
            confidence: 0.9,
            reasoning: "face contact detected".into(),
        }],
    };

    let result = engine.run_inference(bolt_and_nut(), Some(geometry)).unwrap();
    assert_eq!(result.status, TaskStatus::Completed);
    // The screw from the rules plus the coincident from geometry.
    assert_eq!(result.constraints.len(), 2);
    assert!(result.constraints.iter().any(|c| c.kind == ConstraintType::Coincident));
}

#[test]
fn duplicate_geometry_constraint_keeps_higher_confidence() {
    let (engine, _, _) = default_engine();
    // The rules derive SCREW at confidence 1.0; geometry proposes the same
    // pair and type at 0.9 and must lose.
    let geometry = GeometryExtraction {
        parts: vec![],
        constraints: vec![GeoConstraint {
            kind: ConstraintType::Screw,
            part_a: "六角螺母M8x1.25".into(),
            part_b: "六角头螺栓M8x1.25".into(),
            parameters: Default::default(),
            confidence: 0.9,
            reasoning: String::new(),
        }],
    };

    let result = engine.run_inference(bolt_and_nut(), Some(geometry)).unwrap();
    assert_eq!(result.constraints.len(), 1);
    assert_eq!(result.constraints[0].confidence, 1.0);
    assert!(result.constraints[0].source_rule.is_some());
}

#[test]
fn repeated_patterns_grow_the_rule_base() {
    let store = Arc::new(MemoryRuleStore::with_seed_rules());
    let sink = Arc::new(MemoryConstraintSink::new());
    let engine = engine_with(
        EngineConfig::default(),
        store.clone(),
        Arc::new(NoValidator),
        sink,
    );

    // Every pair shares the M8 thread, so all six pairs yield a screw
    // constraint (bolt/nut pairs via the pairing rule, same-kind pairs via
    // the thread rule).
    let parts = vec![
        RawPart::named("六角头螺栓M8甲"),
        RawPart::named("六角螺母M8甲"),
        RawPart::named("六角头螺栓M8乙"),
        RawPart::named("六角螺母M8乙"),
    ];
    let result = engine.run_inference(parts, None).unwrap();

    assert_eq!(result.status, TaskStatus::Completed);
    assert!(!result.learned_rules.is_empty());
    assert!(store.len() > 5);

    let m8 = result
        .learned_rules
        .iter()
        .find(|l| l.feature == "M8")
        .expect("M8 pattern learned");
    assert_eq!(m8.sample_count, 6);
    assert_eq!(m8.confidence, 0.95);
    assert_eq!(result.metadata.learned_rules_count, result.learned_rules.len());
}

struct FailingSink;

impl ConstraintSink for FailingSink {
    fn persist(&self, _task: matewright::TaskId, _chunk: &[Constraint]) -> Result<(), StoreError> {
        Err(StoreError::Persist {
            message: "database unavailable".into(),
        })
    }
}

#[test]
fn persistence_failure_fails_task_but_keeps_results() {
    let store = Arc::new(MemoryRuleStore::with_seed_rules());
    let engine = MateEngine::new(
        EngineConfig::default(),
        store.clone(),
        Arc::new(NoValidator),
        Arc::new(NoEnrichment),
        Arc::new(FailingSink),
    );

    let result = engine.run_inference(bolt_and_nut(), None).unwrap();
    assert_eq!(result.status, TaskStatus::Failed);
    assert!(result.failure.as_deref().unwrap().contains("persistence"));
    // In-memory results stay visible for diagnostics.
    assert_eq!(result.constraints.len(), 1);
    assert!(!result.sequence.order.is_empty());
    // Learning never ran.
    assert!(result.learned_rules.is_empty());
    assert_eq!(store.len(), 5);
}

#[test]
fn usage_counters_reflect_first_match_wins() {
    let (engine, store, _) = default_engine();
    engine.run_inference(bolt_and_nut(), None).unwrap();

    // The priority-10 bolt/nut rule fired; the priority-9 thread rule,
    // although its condition also holds, never got the pair.
    assert_eq!(store.get(RuleId(2)).unwrap().usage_count, 1);
    assert_eq!(store.get(RuleId(3)).unwrap().usage_count, 0);
}

#[test]
fn feedback_bumps_success_counter() {
    let (engine, store, _) = default_engine();
    let result = engine.run_inference(bolt_and_nut(), None).unwrap();
    let rule = result.constraints[0].source_rule.unwrap();

    engine.record_feedback(rule, true).unwrap();
    engine.record_feedback(rule, false).unwrap();
    assert_eq!(store.get(rule).unwrap().success_count, 1);
}

#[test]
fn explainability_covers_every_stage() {
    let (engine, _, _) = default_engine();
    let result = engine.run_inference(bolt_and_nut(), None).unwrap();

    let path = result.explainability.reasoning_path.join("\n");
    assert!(path.contains("normalized"));
    assert!(path.contains("matched"));
    assert!(path.contains("accepted"));
    assert!(path.contains("sequenced"));
    assert!(path.contains("persisted"));
    // Fired rules are reported by name for the operator audit trail.
    assert_eq!(
        result.explainability.rules_fired,
        vec!["bolt/nut screw pair".to_string()]
    );

    assert_eq!(result.metadata.parts_count, 2);
    assert_eq!(result.metadata.constraints_count, 1);
    assert_eq!(result.metadata.rules_applied, 1);
    assert!(!result.metadata.enrichment_used);
}

#[test]
fn unmatched_parts_complete_with_empty_output() {
    let (engine, _, sink) = default_engine();
    let parts = vec![RawPart::named("支架"), RawPart::named("底板")];
    let result = engine.run_inference(parts, None).unwrap();

    assert_eq!(result.status, TaskStatus::Completed);
    assert!(result.constraints.is_empty());
    // No dependencies: sequence is just the list order.
    assert_eq!(result.sequence.order, vec![PartId(0), PartId(1)]);
    assert_eq!(sink.constraints_for(result.task_id).len(), 0);
}

#[test]
fn high_threshold_rejects_weak_constraints() {
    let store = Arc::new(MemoryRuleStore::with_seed_rules());
    let engine = engine_with(
        EngineConfig {
            acceptance_threshold: 0.9,
            ..Default::default()
        },
        store,
        Arc::new(NoValidator),
        Arc::new(MemoryConstraintSink::new()),
    );

    // Flange pair scores 0.6 + 0.15 + 0.08 = 0.83, below 0.9.
    let parts = vec![RawPart::named("对焊法兰DN50"), RawPart::named("平焊法兰DN50")];
    let result = engine.run_inference(parts, None).unwrap();
    assert_eq!(result.status, TaskStatus::Completed);
    assert!(result.constraints.is_empty());
}

#[test]
fn small_chunk_size_splits_persistence() {
    let store = Arc::new(MemoryRuleStore::with_seed_rules());
    let sink = Arc::new(MemoryConstraintSink::new());
    let engine = engine_with(
        EngineConfig {
            persist_chunk_size: 1,
            ..Default::default()
        },
        store,
        Arc::new(NoValidator),
        sink.clone(),
    );

    let parts = vec![
        RawPart::named("六角头螺栓M8甲"),
        RawPart::named("六角螺母M8甲"),
        RawPart::named("六角头螺栓M8乙"),
        RawPart::named("六角螺母M8乙"),
    ];
    let result = engine.run_inference(parts, None).unwrap();
    let persisted = sink.constraints_for(result.task_id);
    assert_eq!(persisted.len(), result.constraints.len());
    assert_eq!(sink.chunk_count(), result.constraints.len());
}

#[test]
fn standard_part_numbers_resolve_without_enrichment() {
    let (engine, _, _) = default_engine();
    let parts = vec![
        RawPart {
            name: "外购件A".into(),
            part_number: "GB/T 70.1-M8".into(),
            ..Default::default()
        },
        RawPart {
            name: "外购件B".into(),
            part_number: "GB/T 6170-M8".into(),
            ..Default::default()
        },
    ];
    let result = engine.run_inference(parts, None).unwrap();
    // The dictionary supplies bolt/nut types and M8x1.25 threads.
    assert_eq!(result.constraints.len(), 1);
    assert_eq!(result.constraints[0].kind, ConstraintType::Screw);
    assert_eq!(result.constraints[0].parameters["pitch"], serde_json::json!(1.25));
}
