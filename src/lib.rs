//! Redaction suggestion and secure rewrite engine for PDF review.
//!
//! Provides a pipeline-based architecture for turning external detector and
//! LLM output into reviewable redaction suggestions, managing the review
//! session, and rewriting the approved result into a sanitized document.

// Configuration and shared data model
pub mod config;
pub mod error;
pub mod types;

// External collaborator boundary
pub mod providers;

// Analysis pipeline
pub mod instruction;
pub mod linker;
pub mod mapper;
pub mod matcher;
pub mod merge;
pub mod occurrence;

// Review session and the final secure rewrite
pub mod rewrite;
pub mod session;

pub use config::EngineConfig;
pub use error::{Error, Result};
pub use rewrite::{RewriteReport, SecureRewriter};
pub use session::{AnalysisReport, Providers, ReviewSession, SessionCommand, SharedSession};
pub use types::document::{DocumentText, Span, SpanId};
pub use types::geometry::{PageGeometry, Rect, Rotation};
pub use types::suggestion::{
    Category, FinalBoxSet, Inclusion, PageBox, Provenance, Suggestion, SuggestionId,
};
