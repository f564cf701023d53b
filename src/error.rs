//! Error types for the redaction engine.
//!
//! One top-level [`Error`] with categorized sub-enums, mirroring the error
//! taxonomy of the review pipeline: mapping, instruction compilation, entity
//! linking, provider boundary validation, and the secure rewrite.

use std::io;
use std::result::Result as StdResult;

use thiserror::Error;

/// Custom result type for redaction engine operations
pub type Result<T> = StdResult<T, Error>;

/// Core error type for redaction engine operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Coordinate mapping error: {0}")]
    MappingError(#[from] MappingError),

    #[error("Instruction error: {0}")]
    InstructionError(#[from] InstructionError),

    #[error("Entity linking error: {0}")]
    LinkError(#[from] LinkError),

    #[error("Provider error: {0}")]
    ProviderError(#[from] ProviderError),

    #[error("Rewrite error: {0}")]
    RewriteError(#[from] RewriteError),

    #[error("Session error: {0}")]
    SessionError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("PDF error: {0}")]
    PdfError(#[from] lopdf::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

// -------------------- Sub-Error Categories --------------------

/// Offset or geometry inconsistency reported by the layout provider.
///
/// These are never silently dropped: a span the provider claims to have seen
/// but whose offsets fall outside page token coverage indicates a provider or
/// version mismatch, and review of the affected page must be blocked.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum MappingError {
    #[error("page {page}: offset range {offset}+{length} falls outside token coverage")]
    OffsetOutOfCoverage {
        page: usize,
        offset: usize,
        length: usize,
    },

    #[error("page {page}: unsupported rotation {degrees} degrees")]
    UnsupportedRotation { page: usize, degrees: i32 },

    #[error("layout result has no page at index {0}")]
    UnknownPage(usize),
}

/// Failures while validating the structured instruction parse.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum InstructionError {
    #[error("instruction references unknown entity '{reference}' (best match score {best_score:.2})")]
    UnresolvedEntity { reference: String, best_score: f64 },

    #[error("instruction references unknown category '{0}'")]
    UnknownCategory(String),

    #[error("contradictory rules on identical predicate: '{predicate}'")]
    ConflictingRules { predicate: String },

    #[error("instruction rule has an empty predicate")]
    EmptyPredicate,

    #[error("unrecognized rule effect '{0}'")]
    UnknownEffect(String),
}

/// Failures while validating coreference judgments into a partition.
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum LinkError {
    #[error(
        "span {span:?} claimed by groups '{kept}' and '{dropped}'; kept higher-confidence group"
    )]
    PartitionViolation {
        span: crate::types::SpanId,
        kept: String,
        dropped: String,
    },

    #[error("coreference group '{group}' references unknown span id {span}")]
    UnknownSpan { group: String, span: u64 },
}

/// Failures at the external collaborator boundary.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProviderError {
    #[error("layout provider failure: {0}")]
    Layout(String),

    #[error("PII detector failure: {0}")]
    Pii(String),

    #[error("LLM reasoning failure: {0}")]
    Reasoning(String),

    #[error("provider returned malformed structured output: {0}")]
    MalformedOutput(String),
}

/// Failures during the secure rewrite.
///
/// Any of these aborts the whole rewrite; the original file is left untouched.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RewriteError {
    #[error("page {page}: redaction intersects unsupported content ({what})")]
    UnsupportedContent { page: u32, what: String },

    #[error("page {page}: content stream could not be decoded: {reason}")]
    UndecodableContent { page: u32, reason: String },

    #[error("box set references page {0}, which does not exist in the document")]
    MissingPage(u32),

    #[error("output verification failed: {0}")]
    VerificationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn top_level_error_wraps_subcategories() {
        let err: Error = MappingError::UnknownPage(3).into();
        assert!(err.to_string().contains("no page at index 3"));

        let err: Error = RewriteError::MissingPage(9).into();
        assert!(err.to_string().contains("page 9"));
    }

    #[test]
    fn conflicting_rules_message_names_predicate() {
        let err = InstructionError::ConflictingRules {
            predicate: "category=Person".into(),
        };
        assert!(err.to_string().contains("category=Person"));
    }
}
