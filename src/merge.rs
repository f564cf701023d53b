//! Suggestion Merger: detector findings, LLM judgments, compiled rules, and
//! reviewer state into one deduplicated suggestion list.
//!
//! Merging is deterministic for a fixed input set: categories are refined
//! first (dates of birth, schools), force-include rules synthesize coverage
//! for entity spans nothing else found, duplicates collapse with manual
//! boxes taking precedence over detector output, ids are allocated in
//! reading order, rules are applied last-match-wins, and surviving reviewer
//! decisions are carried over by span identity.

use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, instrument};

use crate::config::MergeConfig;
use crate::matcher;
use crate::types::document::{DocumentText, SpanArena, SpanId};
use crate::types::geometry::Rect;
use crate::types::suggestion::{
    Category, EntityGroup, EntityGroupId, Inclusion, Provenance, Rule, RuleEffect, Suggestion,
    SuggestionId, SuggestionIdGen, SuggestionIdentity,
};

/// Matches birth keywords that reclassify a nearby DateTime as a date of
/// birth
fn dob_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(dob|d\.o\.b\.?|date\s+of\s+birth|born)\b").expect("static pattern")
    })
}

/// Matches organization names that are really schools
fn school_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(school|academy|college|nursery)\b").expect("static pattern")
    })
}

/// One provisional finding entering the merge, already mapped to page space
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub spans: Vec<SpanId>,
    pub page: usize,
    /// Character offset into the page's extracted text; manual boxes with
    /// no text anchor use 0
    pub offset: usize,
    pub rects: Vec<Rect>,
    pub text: String,
    pub category: Category,
    pub confidence: f64,
    pub provenance: Provenance,
    pub entity: Option<EntityGroupId>,
    pub rationale: Option<String>,
}

/// Merges findings into the reviewable suggestion list
#[derive(Debug, Clone, Default)]
pub struct SuggestionMerger {
    config: MergeConfig,
}

impl SuggestionMerger {
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    /// Produces the merged suggestion list.
    ///
    /// `prior` carries reviewer decisions from a previous merge, keyed by
    /// span identity; an explicit rule match always outranks a carried-over
    /// decision.
    #[instrument(skip_all, fields(findings = findings.len(), rules = rules.len()))]
    pub fn merge(
        &self,
        doc: &DocumentText,
        findings: Vec<Finding>,
        rules: &[Rule],
        groups: &[EntityGroup],
        arena: &SpanArena,
        prior: &HashMap<SuggestionIdentity, Inclusion>,
        ids: &mut SuggestionIdGen,
    ) -> Vec<Suggestion> {
        let mut suggestions: Vec<Suggestion> = findings
            .into_iter()
            .map(|f| self.materialize(doc, f))
            .collect();

        self.synthesize_forced_coverage(&mut suggestions, rules, groups, arena);
        suggestions = self.dedup(suggestions);

        // Reading order keeps ids stable across identical re-runs.
        suggestions.sort_by(|a, b| {
            let ka = sort_key(a);
            let kb = sort_key(b);
            ka.partial_cmp(&kb).unwrap_or(std::cmp::Ordering::Equal)
        });
        for s in &mut suggestions {
            s.id = ids.next();
        }

        let forced = self.apply_rules(&mut suggestions, rules);
        for s in &mut suggestions {
            if forced.contains(&s.id) {
                continue;
            }
            if let Some(&inclusion) = prior.get(&s.identity()) {
                s.inclusion = inclusion;
            }
        }

        debug!(suggestions = suggestions.len(), "merge complete");
        suggestions
    }

    /// Builds a suggestion from a finding, refining its category from
    /// surrounding context
    fn materialize(&self, doc: &DocumentText, finding: Finding) -> Suggestion {
        let category = self.refine_category(doc, &finding);
        Suggestion {
            id: SuggestionId(0),
            spans: finding.spans,
            page: finding.page,
            rects: finding.rects,
            text: finding.text,
            category,
            confidence: finding.confidence,
            provenance: finding.provenance,
            inclusion: Inclusion::Accepted,
            entity: finding.entity,
            rationale: finding.rationale,
        }
    }

    /// A DateTime preceded by a birth keyword is a date of birth; an
    /// Organization whose name contains a school keyword is a school
    fn refine_category(&self, doc: &DocumentText, finding: &Finding) -> Category {
        match finding.category {
            Category::DateTime => {
                let context = self.preceding_context(doc, finding);
                if dob_pattern().is_match(&context) {
                    Category::DateOfBirth
                } else {
                    Category::DateTime
                }
            }
            Category::Organization => {
                if school_pattern().is_match(&finding.text) {
                    Category::School
                } else {
                    Category::Organization
                }
            }
            ref other => other.clone(),
        }
    }

    fn preceding_context(&self, doc: &DocumentText, finding: &Finding) -> String {
        let Some(page) = doc.page(finding.page) else {
            return String::new();
        };
        let mut offset = finding.offset.min(page.text.len());
        while !page.text.is_char_boundary(offset) {
            offset -= 1;
        }
        let mut start = offset.saturating_sub(self.config.dob_context_window);
        while !page.text.is_char_boundary(start) {
            start -= 1;
        }
        page.text[start..offset].to_lowercase()
    }

    /// Force-include rules targeting an entity must cover every span of that
    /// entity, including mentions no detector flagged
    fn synthesize_forced_coverage(
        &self,
        suggestions: &mut Vec<Suggestion>,
        rules: &[Rule],
        groups: &[EntityGroup],
        arena: &SpanArena,
    ) {
        let covered: BTreeSet<SpanId> = suggestions
            .iter()
            .flat_map(|s| s.spans.iter().copied())
            .collect();

        for rule in rules {
            if rule.effect != RuleEffect::ForceInclude {
                continue;
            }
            let Some(entity_id) = rule.predicate.entity else {
                continue;
            };
            let Some(group) = groups.iter().find(|g| g.id == entity_id) else {
                continue;
            };
            for &span_id in &group.spans {
                if covered.contains(&span_id) {
                    continue;
                }
                let Some(span) = arena.get(span_id) else {
                    continue;
                };
                suggestions.push(Suggestion {
                    id: SuggestionId(0),
                    spans: vec![span_id],
                    page: span.page,
                    rects: span.rects.clone(),
                    text: span.text.clone(),
                    category: rule
                        .predicate
                        .category
                        .clone()
                        .unwrap_or(Category::Person),
                    confidence: 1.0,
                    provenance: Provenance::UserManual,
                    inclusion: Inclusion::Accepted,
                    entity: Some(entity_id),
                    rationale: None,
                });
            }
        }
    }

    /// Collapses same-page, same-category suggestions whose rectangles
    /// overlap beyond the configured ratio.
    ///
    /// Within a duplicate pair the survivor is the manual suggestion when
    /// manual precedence is on, otherwise the higher-confidence one; the
    /// survivor absorbs the other's rectangles and spans.
    fn dedup(&self, mut suggestions: Vec<Suggestion>) -> Vec<Suggestion> {
        // Process in priority order so the survivor is always already kept.
        suggestions.sort_by(|a, b| {
            let pa = self.priority(a);
            let pb = self.priority(b);
            pb.partial_cmp(&pa).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut kept: Vec<Suggestion> = Vec::with_capacity(suggestions.len());
        for candidate in suggestions {
            let duplicate = kept.iter_mut().find(|k| {
                k.category == candidate.category
                    && k.overlaps(&candidate, self.config.dedup_overlap)
            });
            match duplicate {
                Some(survivor) => {
                    for rect in &candidate.rects {
                        if !survivor.rects.contains(rect) {
                            survivor.rects.push(*rect);
                        }
                    }
                    for span in &candidate.spans {
                        if !survivor.spans.contains(span) {
                            survivor.spans.push(*span);
                        }
                    }
                    survivor.confidence = survivor.confidence.max(candidate.confidence);
                }
                None => kept.push(candidate),
            }
        }
        kept
    }

    fn priority(&self, s: &Suggestion) -> (u8, f64) {
        let manual = if self.config.manual_precedence && s.provenance == Provenance::UserManual {
            1
        } else {
            0
        };
        (manual, s.confidence)
    }

    /// Applies rules in declaration order; the last matching rule decides.
    /// Returns the ids whose inclusion a rule explicitly set.
    fn apply_rules(&self, suggestions: &mut [Suggestion], rules: &[Rule]) -> BTreeSet<SuggestionId> {
        let mut forced = BTreeSet::new();
        for s in suggestions {
            let normalized = matcher::normalize(&s.text);
            let mut decided = None;
            for rule in rules {
                if rule.predicate.matches(&s.category, s.entity, &normalized) {
                    decided = Some(rule.effect);
                }
            }
            if let Some(effect) = decided {
                s.inclusion = match effect {
                    RuleEffect::ForceInclude => Inclusion::Accepted,
                    RuleEffect::ForceExclude => Inclusion::Rejected,
                };
                forced.insert(s.id);
            }
        }
        forced
    }
}

fn sort_key(s: &Suggestion) -> (usize, f64, f64, String) {
    let bounds = s.bounding_rect().unwrap_or(Rect::new(0.0, 0.0, 0.0, 0.0));
    (s.page, bounds.y0, bounds.x0, s.category.as_label().to_string())
}
