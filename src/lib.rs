//! # matewright
//!
//! A self-improving rule engine for mechanical assembly constraints.
//!
//! Given a parts list (and optionally constraints extracted from a 3D
//! model), the engine derives typed mating constraints between part pairs
//! by evaluating a priority-ordered rule base, validates the result against
//! an external geometric solver, computes a deterministic install sequence,
//! and mines the accepted constraints for new rules so the base grows with
//! every run.
//!
//! The pipeline is exposed through [`task::MateEngine::run_inference`];
//! everything external (enrichment, validation, persistence) sits behind a
//! trait with both HTTP-backed and in-memory implementations.

pub mod config;
pub mod constraint;
pub mod error;
pub mod geometry;
pub mod learn;
pub mod matcher;
pub mod normalize;
pub mod part;
pub mod rule;
pub mod sequence;
pub mod store;
pub mod task;
pub mod validate;

pub use config::EngineConfig;
pub use error::{MateError, MateResult};
pub use task::{InferenceResult, MateEngine, TaskId, TaskStatus};
