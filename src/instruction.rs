//! Instruction Compiler: free-text reviewer instructions to rules.
//!
//! The natural-language parse itself is delegated to the LLM collaborator;
//! this module owns validation and normalization of its structured output.
//! Entity references must resolve (exactly or by fuzzy name match) to a
//! known entity group, category references must be known PII categories or
//! the literal "subjective" marker, and self-contradictory instructions are
//! reported to the reviewer rather than silently resolved.
//!
//! Compilation is best-effort: each invalid rule is surfaced as a per-item
//! error while the valid remainder still compiles, in declaration order for
//! last-match-wins evaluation.

use tracing::{debug, instrument, warn};

use crate::config::InstructionConfig;
use crate::error::InstructionError;
use crate::matcher;
use crate::providers::{RawInstructionParse, RawInstructionRule};
use crate::types::suggestion::{Category, EntityGroup, Rule, RuleEffect, RulePredicate};

/// The "subjective" category marker instructions may reference
const SUBJECTIVE: &str = "subjective";

/// Result of one compilation pass
#[derive(Debug, Clone, Default)]
pub struct CompileOutcome {
    pub rules: Vec<Rule>,
    pub errors: Vec<InstructionError>,
}

/// Validates the LLM's structured instruction parse into [`Rule`]s
#[derive(Debug, Clone, Default)]
pub struct InstructionCompiler {
    config: InstructionConfig,
}

impl InstructionCompiler {
    pub fn new(config: InstructionConfig) -> Self {
        Self { config }
    }

    /// Compiles a structured parse against the known entity groups.
    ///
    /// Rules keep their declared order; later rules override earlier ones
    /// on conflict. Two rules with an identical predicate and opposite
    /// effects are a contradiction: both are withheld and reported.
    #[instrument(skip(self, parse, entities))]
    pub fn compile(&self, parse: &RawInstructionParse, entities: &[EntityGroup]) -> CompileOutcome {
        let mut outcome = CompileOutcome::default();

        for raw in &parse.rules {
            match self.compile_rule(raw, entities) {
                Ok(rule) => outcome.rules.push(rule),
                Err(err) => {
                    warn!(error = %err, "rejecting instruction rule");
                    outcome.errors.push(err);
                }
            }
        }

        self.reject_contradictions(&mut outcome);
        debug!(
            rules = outcome.rules.len(),
            errors = outcome.errors.len(),
            "instruction compilation complete"
        );
        outcome
    }

    fn compile_rule(
        &self,
        raw: &RawInstructionRule,
        entities: &[EntityGroup],
    ) -> Result<Rule, InstructionError> {
        let effect = match raw.effect.as_str() {
            "keep" => RuleEffect::ForceExclude,
            "redact" => RuleEffect::ForceInclude,
            other => return Err(InstructionError::UnknownEffect(other.to_string())),
        };

        let category = match raw.category.as_deref() {
            None => None,
            Some(label) if label.eq_ignore_ascii_case(SUBJECTIVE) => {
                Some(Category::SensitiveContent)
            }
            Some(label) => Some(
                Category::from_label(label)
                    .ok_or_else(|| InstructionError::UnknownCategory(label.to_string()))?,
            ),
        };

        let entity = match raw.entity.as_deref() {
            None => None,
            Some(reference) => Some(self.resolve_entity(reference, entities)?),
        };

        let mut text_aliases = Vec::new();
        if let Some(text) = raw.text.as_deref() {
            text_aliases = self.expand_aliases(text, category.as_ref());
        }
        // An entity reference also matches by name, so "keep Oliver Hughes"
        // still protects mentions the linker missed.
        if let Some(reference) = raw.entity.as_deref() {
            for alias in self.expand_aliases(reference, category.as_ref()) {
                if !text_aliases.contains(&alias) {
                    text_aliases.push(alias);
                }
            }
        }

        let predicate = RulePredicate {
            category,
            entity: entity.map(|g| g.id),
            text_aliases,
        };
        if predicate.is_empty() {
            return Err(InstructionError::EmptyPredicate);
        }
        Ok(Rule { predicate, effect })
    }

    /// Resolves an entity reference exactly, then fuzzily against group
    /// labels using the configured threshold
    fn resolve_entity<'a>(
        &self,
        reference: &str,
        entities: &'a [EntityGroup],
    ) -> Result<&'a EntityGroup, InstructionError> {
        let wanted = matcher::normalize(reference);
        if let Some(exact) = entities
            .iter()
            .find(|g| matcher::normalize(&g.label) == wanted)
        {
            return Ok(exact);
        }

        let mut best: Option<(&EntityGroup, f64)> = None;
        for group in entities {
            let score = matcher::similarity(&wanted, &matcher::normalize(&group.label));
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((group, score));
            }
        }
        match best {
            Some((group, score)) if score >= self.config.entity_match_threshold => Ok(group),
            other => Err(InstructionError::UnresolvedEntity {
                reference: reference.to_string(),
                best_score: other.map(|(_, s)| s).unwrap_or(0.0),
            }),
        }
    }

    /// A multi-word person name also matches on its leading given name, so
    /// "keep Oliver Hughes" covers bare "Oliver" mentions
    fn expand_aliases(&self, text: &str, category: Option<&Category>) -> Vec<String> {
        let normalized = matcher::normalize(text);
        let mut aliases = vec![normalized.clone()];
        if !self.config.expand_person_names {
            return aliases;
        }
        let looks_like_name = matches!(category, Some(Category::Person) | None)
            && normalized.split(' ').count() >= 2
            && normalized.chars().all(|c| c.is_alphabetic() || c == ' ');
        if looks_like_name {
            if let Some(first) = normalized.split(' ').next() {
                let first = first.to_string();
                if !aliases.contains(&first) {
                    aliases.push(first);
                }
            }
        }
        aliases
    }

    /// Identical predicates with opposite effects are never guessed at:
    /// withhold every rule involved and report the contradiction once
    fn reject_contradictions(&self, outcome: &mut CompileOutcome) {
        let mut contradicted = Vec::new();
        for (i, a) in outcome.rules.iter().enumerate() {
            for b in outcome.rules.iter().skip(i + 1) {
                if a.predicate == b.predicate && a.effect != b.effect {
                    contradicted.push(a.predicate.clone());
                }
            }
        }
        for predicate in contradicted {
            outcome.rules.retain(|r| r.predicate != predicate);
            outcome.errors.push(InstructionError::ConflictingRules {
                predicate: predicate.describe(),
            });
        }
    }
}
