// Type definitions for the redaction engine

pub mod document;
pub mod geometry;
pub mod suggestion;

pub use document::{DocumentText, PageText, Span, SpanArena, SpanId, Token};
pub use geometry::{PageGeometry, Rect, Rotation};
pub use suggestion::{
    Category, EntityGroup, EntityGroupId, FinalBoxSet, Inclusion, PageBox, Provenance, Rule,
    RuleEffect, RulePredicate, Suggestion, SuggestionId, SuggestionIdGen, SuggestionIdentity,
    UndoRecord,
};
