//! The inference task: lifecycle and the engine that drives the pipeline.
//!
//! One task covers a single parts list end to end: normalize, match,
//! merge in geometry, filter, validate, sequence, persist, learn. Tasks
//! move Pending -> Processing -> Completed | Failed; terminal states are
//! final.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::constraint::{Conflict, Constraint, ConstraintIdGen};
use crate::error::{MateResult, TaskError};
use crate::geometry::{GeometryExtraction, resolve_geometry};
use crate::learn::{LearnedRule, learn};
use crate::matcher::{filter_by_confidence, match_parts};
use crate::normalize::{PartEnricher, normalize_parts};
use crate::part::RawPart;
use crate::rule::RuleId;
use crate::sequence::{SequencePlan, sequence};
use crate::store::{ConstraintSink, RuleStore};
use crate::validate::{ConflictValidator, Verdict};

/// Engine-scoped task handle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task:{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Lifecycle record for one inference run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceTask {
    pub id: TaskId,
    pub status: TaskStatus,
}

impl InferenceTask {
    pub fn new(id: TaskId) -> Self {
        Self {
            id,
            status: TaskStatus::Pending,
        }
    }

    pub fn start(&mut self) -> Result<(), TaskError> {
        self.transition(TaskStatus::Processing)
    }

    pub fn complete(&mut self) -> Result<(), TaskError> {
        self.transition(TaskStatus::Completed)
    }

    pub fn fail(&mut self) -> Result<(), TaskError> {
        self.transition(TaskStatus::Failed)
    }

    fn transition(&mut self, next: TaskStatus) -> Result<(), TaskError> {
        if self.status.is_terminal() {
            return Err(TaskError::TerminalState {
                task_id: self.id.0,
                status: format!("{:?}", self.status).to_lowercase(),
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Stage-by-stage account of how a result was derived.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Explainability {
    /// One line per pipeline stage, in execution order.
    pub reasoning_path: Vec<String>,
    /// Names of the distinct rules that produced at least one constraint.
    pub rules_fired: Vec<String>,
}

/// Run-level counters for dashboards and audits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub parts_count: usize,
    pub constraints_count: usize,
    pub rules_applied: usize,
    pub enrichment_used: bool,
    pub learned_rules_count: usize,
}

/// Everything a completed (or failed) run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceResult {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub constraints: Vec<Constraint>,
    pub sequence: SequencePlan,
    pub learned_rules: Vec<LearnedRule>,
    pub conflicts: Vec<Conflict>,
    pub validation: Verdict,
    pub explainability: Explainability,
    pub metadata: TaskMetadata,
    /// Set when status is Failed: what went wrong, in operator terms.
    pub failure: Option<String>,
}

/// The inference engine: configuration plus pluggable collaborators.
pub struct MateEngine {
    config: EngineConfig,
    rules: Arc<dyn RuleStore>,
    validator: Arc<dyn ConflictValidator>,
    enricher: Arc<dyn PartEnricher>,
    sink: Arc<dyn ConstraintSink>,
    next_task: AtomicU64,
}

impl MateEngine {
    pub fn new(
        config: EngineConfig,
        rules: Arc<dyn RuleStore>,
        validator: Arc<dyn ConflictValidator>,
        enricher: Arc<dyn PartEnricher>,
        sink: Arc<dyn ConstraintSink>,
    ) -> Self {
        Self {
            config,
            rules,
            validator,
            enricher,
            sink,
            next_task: AtomicU64::new(1),
        }
    }

    pub fn rules(&self) -> &Arc<dyn RuleStore> {
        &self.rules
    }

    /// Run the full pipeline on one parts list.
    ///
    /// Fails fast (`Err`) only on unusable input. Downstream problems
    /// (an infeasible constraint set, a persistence error) produce an
    /// `Ok` result with status `Failed` so partial output stays visible.
    pub fn run_inference(
        &self,
        raw_parts: Vec<RawPart>,
        geometry: Option<GeometryExtraction>,
    ) -> MateResult<InferenceResult> {
        if raw_parts.is_empty() {
            return Err(TaskError::EmptyParts.into());
        }

        let mut task = InferenceTask::new(TaskId(self.next_task.fetch_add(1, Ordering::Relaxed)));
        task.start()?;
        tracing::info!(task = %task.id, parts = raw_parts.len(), "inference started");

        let mut path = Vec::new();
        let ids = ConstraintIdGen::new();

        // Normalize.
        let parts = normalize_parts(&raw_parts, self.enricher.as_ref());
        let enrichment_used = parts.iter().any(|p| p.enriched);
        path.push(format!(
            "normalized {} parts ({} typed, {} enriched)",
            parts.len(),
            parts.iter().filter(|p| p.semantic_type.is_some()).count(),
            parts.iter().filter(|p| p.enriched).count(),
        ));

        // Match.
        let rules = self.rules.snapshot();
        let rule_constraints = match_parts(&parts, &rules, &self.rules, &ids);
        path.push(format!(
            "matched {} rules against {} pairs, {} constraints derived",
            rules.len(),
            parts.len() * parts.len().saturating_sub(1) / 2,
            rule_constraints.len(),
        ));

        // Merge geometry-derived constraints. On a duplicate (same pair and
        // type, either order) the higher-confidence constraint wins.
        let mut constraints = rule_constraints;
        if let Some(geo) = &geometry {
            let geo_constraints = resolve_geometry(geo, &parts, &ids);
            let merged_in = geo_constraints.len();
            for gc in geo_constraints {
                match constraints.iter_mut().find(|c| {
                    c.kind == gc.kind
                        && ((c.part_a, c.part_b) == (gc.part_a, gc.part_b)
                            || (c.part_a, c.part_b) == (gc.part_b, gc.part_a))
                }) {
                    Some(existing) if existing.confidence < gc.confidence => *existing = gc,
                    Some(_) => {}
                    None => constraints.push(gc),
                }
            }
            path.push(format!("merged {merged_in} geometry constraints"));
        }

        // Filter.
        let before = constraints.len();
        let accepted = filter_by_confidence(constraints, self.config.acceptance_threshold);
        path.push(format!(
            "accepted {} of {} constraints at threshold {}",
            accepted.len(),
            before,
            self.config.acceptance_threshold,
        ));

        let rules_fired = {
            let mut fired: Vec<RuleId> = accepted.iter().filter_map(|c| c.source_rule).collect();
            fired.sort_unstable();
            fired.dedup();
            fired
                .iter()
                .filter_map(|id| rules.iter().find(|r| r.id == *id))
                .map(|r| r.name.clone())
                .collect::<Vec<String>>()
        };

        let metadata = TaskMetadata {
            parts_count: parts.len(),
            constraints_count: accepted.len(),
            rules_applied: rules_fired.len(),
            enrichment_used,
            learned_rules_count: 0,
        };

        // Validate.
        let verdict = self.validator.validate(&accepted);
        match &verdict {
            Verdict::Feasible => path.push("solver confirmed feasibility".into()),
            Verdict::Unvalidated { reason } => {
                path.push(format!("validation skipped: {reason}"));
            }
            Verdict::Infeasible { conflicts } => {
                path.push(format!("solver reported {} conflicts", conflicts.len()));
                task.fail()?;
                tracing::warn!(task = %task.id, conflicts = conflicts.len(), "constraint set infeasible");
                return Ok(InferenceResult {
                    task_id: task.id,
                    status: task.status,
                    constraints: accepted,
                    sequence: SequencePlan {
                        order: Vec::new(),
                        omitted: Vec::new(),
                    },
                    learned_rules: Vec::new(),
                    conflicts: conflicts.clone(),
                    validation: verdict,
                    explainability: Explainability {
                        reasoning_path: path,
                        rules_fired,
                    },
                    metadata,
                    failure: Some("constraint set is geometrically infeasible".into()),
                });
            }
        }

        // Sequence.
        let plan = sequence(&accepted, &parts);
        path.push(format!(
            "sequenced {} parts ({} omitted on cycles)",
            plan.order.len(),
            plan.omitted.len(),
        ));

        // Persist in chunks.
        let persist_failure = accepted
            .chunks(self.config.persist_chunk_size)
            .find_map(|chunk| self.sink.persist(task.id, chunk).err());
        if let Some(e) = persist_failure {
            task.fail()?;
            tracing::error!(task = %task.id, error = %e, "constraint persistence failed");
            path.push(format!("persistence failed: {e}"));
            return Ok(InferenceResult {
                task_id: task.id,
                status: task.status,
                constraints: accepted,
                sequence: plan,
                learned_rules: Vec::new(),
                conflicts: Vec::new(),
                validation: verdict,
                explainability: Explainability {
                    reasoning_path: path,
                    rules_fired,
                },
                metadata,
                failure: Some(format!("constraint persistence failed: {e}")),
            });
        }
        path.push(format!(
            "persisted {} constraints in chunks of {}",
            accepted.len(),
            self.config.persist_chunk_size,
        ));

        // Learn.
        let learned = learn(&accepted, &parts);
        if !learned.is_empty() {
            let drafts = learned.iter().map(LearnedRule::to_draft).collect();
            match self.rules.append_learned(drafts) {
                Ok(stored) => path.push(format!("stored {} learned rules", stored.len())),
                Err(e) => {
                    tracing::warn!(task = %task.id, error = %e, "learned rule storage failed");
                    path.push(format!("learned rule storage failed: {e}"));
                }
            }
        } else {
            path.push("no reusable patterns found".into());
        }

        task.complete()?;
        tracing::info!(
            task = %task.id,
            constraints = accepted.len(),
            learned = learned.len(),
            "inference completed"
        );

        Ok(InferenceResult {
            task_id: task.id,
            status: task.status,
            metadata: TaskMetadata {
                learned_rules_count: learned.len(),
                ..metadata
            },
            constraints: accepted,
            sequence: plan,
            learned_rules: learned,
            conflicts: Vec::new(),
            validation: verdict,
            explainability: Explainability {
                reasoning_path: path,
                rules_fired,
            },
            failure: None,
        })
    }

    /// Record operator feedback on a rule's output. Correct feedback bumps
    /// the success counter; either way the usage history is preserved.
    pub fn record_feedback(&self, rule: RuleId, correct: bool) -> MateResult<()> {
        if correct {
            self.rules.record_success(rule)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_happy_path() {
        let mut task = InferenceTask::new(TaskId(1));
        assert_eq!(task.status, TaskStatus::Pending);
        task.start().unwrap();
        assert_eq!(task.status, TaskStatus::Processing);
        task.complete().unwrap();
        assert!(task.status.is_terminal());
    }

    #[test]
    fn terminal_states_are_final() {
        let mut task = InferenceTask::new(TaskId(1));
        task.start().unwrap();
        task.fail().unwrap();
        assert!(matches!(
            task.start(),
            Err(TaskError::TerminalState { task_id: 1, .. })
        ));
        assert!(matches!(task.complete(), Err(TaskError::TerminalState { .. })));
    }

    #[test]
    fn status_serde_is_lowercase() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Processing).unwrap(),
            "\"processing\""
        );
    }
}
