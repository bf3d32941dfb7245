//! Rich diagnostic error types for the matewright engine.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text so operators know exactly what went
//! wrong and how to fix it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the matewright engine.
///
/// Each variant wraps a subsystem-specific error, preserving the full
/// diagnostic chain (error codes, help text) through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum MateError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Task(#[from] TaskError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    #[diagnostic(
        code(matewright::config::io),
        help("Check that the config file exists and is readable.")
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    #[diagnostic(
        code(matewright::config::parse),
        help("The file must be valid TOML matching the EngineConfig fields.")
    )]
    Parse { path: String, message: String },

    #[error("acceptance threshold {value} outside [0, 1]")]
    #[diagnostic(
        code(matewright::config::threshold),
        help("Constraint confidences are clamped to [0, 1]; a threshold outside that range either accepts or rejects everything.")
    )]
    ThresholdOutOfRange { value: f64 },

    #[error("persist chunk size must be at least 1")]
    #[diagnostic(
        code(matewright::config::chunk_size),
        help("The chunk size bounds the number of rows per store write; zero would loop forever.")
    )]
    ZeroChunkSize,
}

// ---------------------------------------------------------------------------
// Normalization errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum NormalizeError {
    #[error("enrichment service request failed: {message}")]
    #[diagnostic(
        code(matewright::normalize::enrichment),
        help(
            "The external text-enrichment service could not be reached or \
             returned an invalid response. The pipeline continues with \
             un-enriched parts; type-dependent rules simply will not match them."
        )
    )]
    Enrichment { message: String },
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("rule not found: {id}")]
    #[diagnostic(
        code(matewright::store::rule_not_found),
        help(
            "A usage counter was recorded against a rule id the store does not \
             hold. The rule snapshot may be stale; re-run the task."
        )
    )]
    RuleNotFound { id: u64 },

    #[error("constraint write failed: {message}")]
    #[diagnostic(
        code(matewright::store::persist),
        help(
            "A batch write of accepted constraints failed. The task is marked \
             Failed, but the in-memory results are still returned for diagnostics."
        )
    )]
    Persist { message: String },
}

// ---------------------------------------------------------------------------
// Task errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TaskError {
    #[error("empty parts list: nothing to infer constraints for")]
    #[diagnostic(
        code(matewright::task::empty_parts),
        help(
            "Provide at least one part, either in the parts list or via the \
             external geometry extraction."
        )
    )]
    EmptyParts,

    #[error("task {task_id} is in terminal state {status}")]
    #[diagnostic(
        code(matewright::task::terminal),
        help("Completed and Failed tasks are final; re-run the inference instead.")
    )]
    TerminalState { task_id: u64, status: String },
}

/// Convenience alias for functions returning matewright results.
pub type MateResult<T> = std::result::Result<T, MateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_error_converts_to_mate_error() {
        let err = TaskError::EmptyParts;
        let mate: MateError = err.into();
        assert!(matches!(mate, MateError::Task(TaskError::EmptyParts)));
    }

    #[test]
    fn store_error_converts_to_mate_error() {
        let err = StoreError::RuleNotFound { id: 7 };
        let mate: MateError = err.into();
        assert!(matches!(mate, MateError::Store(StoreError::RuleNotFound { id: 7 })));
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        let err = ConfigError::ThresholdOutOfRange { value: 1.5 };
        let msg = format!("{err}");
        assert!(msg.contains("1.5"));
    }
}
