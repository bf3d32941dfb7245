//! Geometric feasibility validation through the external solver.
//!
//! The solver is optional infrastructure. When it is unreachable, times
//! out, or returns garbage, the verdict is `Unvalidated` and the pipeline
//! proceeds; only an explicit infeasible answer fails a task.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constraint::{Conflict, Constraint};

/// Outcome of a validation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Verdict {
    /// The solver confirmed the constraint set is solvable.
    Feasible,
    /// The solver reported conflicts; the task must fail.
    Infeasible { conflicts: Vec<Conflict> },
    /// Validation could not be performed. Not a failure.
    Unvalidated { reason: String },
}

/// Validates a constraint set for geometric feasibility.
pub trait ConflictValidator: Send + Sync {
    fn validate(&self, constraints: &[Constraint]) -> Verdict;
}

/// Validator used when no solver is configured.
#[derive(Debug, Default)]
pub struct NoValidator;

impl ConflictValidator for NoValidator {
    fn validate(&self, _constraints: &[Constraint]) -> Verdict {
        Verdict::Unvalidated {
            reason: "no solver configured".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    feasible: bool,
    #[serde(default)]
    conflicts: Vec<Conflict>,
}

/// Validator backed by the external constraint solver's HTTP API.
#[derive(Debug)]
pub struct HttpValidator {
    url: String,
    timeout: Duration,
}

impl HttpValidator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }
}

impl ConflictValidator for HttpValidator {
    fn validate(&self, constraints: &[Constraint]) -> Verdict {
        let response = ureq::post(&self.url)
            .timeout(self.timeout)
            .send_json(serde_json::json!({ "constraints": constraints }));

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "solver unreachable, skipping validation");
                return Verdict::Unvalidated {
                    reason: format!("solver request failed: {e}"),
                };
            }
        };

        match response.into_json::<ValidateResponse>() {
            Ok(body) if body.feasible => Verdict::Feasible,
            Ok(body) => Verdict::Infeasible {
                conflicts: body.conflicts,
            },
            Err(e) => {
                tracing::warn!(url = %self.url, error = %e, "malformed solver response");
                Verdict::Unvalidated {
                    reason: format!("malformed solver response: {e}"),
                }
            }
        }
    }
}
