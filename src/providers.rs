//! External collaborator interfaces.
//!
//! The engine consumes three black-box services: a layout/OCR provider, a
//! structured PII detector, and an LLM reasoning provider. Their free-form
//! structured output enters through the raw types below and is validated at
//! the boundary into the strict types in [`crate::types`]; loosely-typed
//! data never travels deeper into the pipeline.
//!
//! Transient failures (network, timeout) are retried with bounded backoff at
//! the call boundary by the hosting application, not here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::geometry::Rect;

/// One recognized word as reported by the layout provider, offsets into the
/// page's extracted text, rectangle still in rotated display space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawToken {
    pub offset: usize,
    pub length: usize,
    pub text: String,
    pub rect: Rect,
}

/// One page of layout output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPage {
    pub index: usize,
    /// Display-space width as reported under the page's rotation
    pub width: f64,
    /// Display-space height as reported under the page's rotation
    pub height: f64,
    /// Clockwise rotation in degrees applied to the reported coordinates
    pub rotation_degrees: i32,
    pub text: String,
    pub tokens: Vec<RawToken>,
}

/// Full layout analysis result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawLayout {
    pub pages: Vec<RawPage>,
}

/// One PII entity from the structured detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPiiEntity {
    pub page: usize,
    pub category: String,
    pub offset: usize,
    pub length: usize,
    pub text: String,
    pub confidence: f64,
}

/// One subjective-content judgment from the LLM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawJudgment {
    pub page: usize,
    pub offset: usize,
    pub length: usize,
    pub text: String,
    pub rationale: String,
    pub confidence: f64,
}

/// One rule of the LLM's structured instruction parse, pre-validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawInstructionRule {
    /// "keep" or "redact"
    pub effect: String,
    /// Entity reference by name, resolved against known entity groups
    #[serde(default)]
    pub entity: Option<String>,
    /// PII category label, or the literal "subjective"
    #[serde(default)]
    pub category: Option<String>,
    /// Literal text the rule targets
    #[serde(default)]
    pub text: Option<String>,
}

/// The LLM's parse of the reviewer's free-text instructions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawInstructionParse {
    #[serde(default)]
    pub rules: Vec<RawInstructionRule>,
    /// Free-text description of subjective content to find, forwarded to
    /// the judgment pass verbatim
    #[serde(default)]
    pub sensitive_content_rule: Option<String>,
}

/// One coreference group proposed by the LLM, members are span ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCorefGroup {
    pub label: String,
    pub members: Vec<u64>,
    pub confidence: f64,
}

/// Layout/OCR provider: tokens, offsets, rectangles, page geometry
#[async_trait]
pub trait LayoutProvider: Send + Sync {
    async fn analyze(&self, document: &[u8]) -> Result<RawLayout>;
}

/// Structured PII detector over extracted page text
#[async_trait]
pub trait PiiDetector: Send + Sync {
    async fn detect(&self, pages: &[String]) -> Result<Vec<RawPiiEntity>>;
}

/// LLM reasoning provider: instruction parsing, coreference judgments, and
/// subjective-content judgments
#[async_trait]
pub trait LlmReasoner: Send + Sync {
    async fn parse_instructions(&self, free_text: &str) -> Result<RawInstructionParse>;

    async fn judge_sensitive(
        &self,
        pages: &[String],
        rule: &str,
    ) -> Result<Vec<RawJudgment>>;

    async fn link_entities(
        &self,
        context: &str,
        mentions: &[(u64, String)],
    ) -> Result<Vec<RawCorefGroup>>;
}

// -------------------- In-memory fixtures --------------------

/// Canned layout provider for tests and offline runs
#[derive(Debug, Clone, Default)]
pub struct FixtureLayoutProvider {
    pub layout: RawLayout,
}

#[async_trait]
impl LayoutProvider for FixtureLayoutProvider {
    async fn analyze(&self, _document: &[u8]) -> Result<RawLayout> {
        Ok(self.layout.clone())
    }
}

/// Canned PII detector
#[derive(Debug, Clone, Default)]
pub struct FixturePiiDetector {
    pub entities: Vec<RawPiiEntity>,
}

#[async_trait]
impl PiiDetector for FixturePiiDetector {
    async fn detect(&self, _pages: &[String]) -> Result<Vec<RawPiiEntity>> {
        Ok(self.entities.clone())
    }
}

/// Canned LLM reasoner
#[derive(Debug, Clone, Default)]
pub struct FixtureLlmReasoner {
    pub parse: RawInstructionParse,
    pub judgments: Vec<RawJudgment>,
    pub coref: Vec<RawCorefGroup>,
}

#[async_trait]
impl LlmReasoner for FixtureLlmReasoner {
    async fn parse_instructions(&self, _free_text: &str) -> Result<RawInstructionParse> {
        Ok(self.parse.clone())
    }

    async fn judge_sensitive(
        &self,
        _pages: &[String],
        _rule: &str,
    ) -> Result<Vec<RawJudgment>> {
        Ok(self.judgments.clone())
    }

    async fn link_entities(
        &self,
        _context: &str,
        _mentions: &[(u64, String)],
    ) -> Result<Vec<RawCorefGroup>> {
        Ok(self.coref.clone())
    }
}
