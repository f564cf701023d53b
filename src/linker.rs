//! Entity Linker: coreference judgments to a valid partition.
//!
//! The LLM collaborator proposes coreference groups over PII spans; this
//! module owns partition validity. Every PII span ends up in exactly one
//! group: spans the collaborator never mentioned become singleton groups,
//! and a span claimed by two groups is a precondition violation resolved
//! deterministically in favor of the higher-confidence group. Violations
//! are surfaced for the reviewer, never silently guessed away.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, instrument, warn};

use crate::error::LinkError;
use crate::providers::RawCorefGroup;
use crate::types::document::{Span, SpanId};
use crate::types::suggestion::{EntityGroup, EntityGroupId};

/// Result of one linking pass: a disjoint partition plus the violations
/// that were repaired to reach it
#[derive(Debug, Clone, Default)]
pub struct LinkOutcome {
    pub groups: Vec<EntityGroup>,
    pub violations: Vec<LinkError>,
}

/// Validates collaborator coreference output into disjoint entity groups
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityLinker;

impl EntityLinker {
    pub fn new() -> Self {
        Self
    }

    /// Partitions `spans` according to the collaborator's groups.
    ///
    /// Proceeds best-effort: malformed group members are skipped and
    /// reported while the remaining judgments still link.
    #[instrument(skip(self, spans, raw))]
    pub fn link(&self, spans: &[&Span], raw: &[RawCorefGroup]) -> LinkOutcome {
        let known: BTreeSet<u64> = spans.iter().map(|s| s.id.0).collect();
        let mut violations = Vec::new();

        // First pass: resolve double-claims in favor of the
        // higher-confidence group.
        let mut owner: BTreeMap<u64, usize> = BTreeMap::new();
        for (gi, group) in raw.iter().enumerate() {
            for &member in &group.members {
                if !known.contains(&member) {
                    warn!(group = %group.label, span = member, "unknown span in coref group");
                    violations.push(LinkError::UnknownSpan {
                        group: group.label.clone(),
                        span: member,
                    });
                    continue;
                }
                match owner.get(&member) {
                    None => {
                        owner.insert(member, gi);
                    }
                    Some(&prev) => {
                        let (kept, dropped) = if raw[prev].confidence >= group.confidence {
                            (prev, gi)
                        } else {
                            (gi, prev)
                        };
                        violations.push(LinkError::PartitionViolation {
                            span: SpanId(member),
                            kept: raw[kept].label.clone(),
                            dropped: raw[dropped].label.clone(),
                        });
                        owner.insert(member, kept);
                    }
                }
            }
        }

        // Second pass: materialize groups, then singletons for anything the
        // collaborator never mentioned.
        let mut groups = Vec::new();
        let mut next_id = 0u64;
        for (gi, group) in raw.iter().enumerate() {
            let members: Vec<SpanId> = group
                .members
                .iter()
                .filter(|&&m| owner.get(&m) == Some(&gi))
                .map(|&m| SpanId(m))
                .collect();
            if members.is_empty() {
                continue;
            }
            groups.push(EntityGroup {
                id: EntityGroupId(next_id),
                label: group.label.clone(),
                spans: members,
                confidence: group.confidence,
            });
            next_id += 1;
        }

        for span in spans {
            if !owner.contains_key(&span.id.0) {
                groups.push(EntityGroup {
                    id: EntityGroupId(next_id),
                    label: span.text.clone(),
                    spans: vec![span.id],
                    confidence: 1.0,
                });
                next_id += 1;
            }
        }

        debug!(
            groups = groups.len(),
            violations = violations.len(),
            "entity linking complete"
        );
        LinkOutcome { groups, violations }
    }
}

/// Lookup from span id to its owning group, derived from a partition
pub fn span_to_group(groups: &[EntityGroup]) -> BTreeMap<SpanId, EntityGroupId> {
    let mut map = BTreeMap::new();
    for group in groups {
        for &span in &group.spans {
            map.insert(span, group.id);
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::geometry::Rect;

    fn span(id: u64, text: &str) -> Span {
        Span {
            id: SpanId(id),
            page: 0,
            offset: 0,
            length: text.len(),
            text: text.into(),
            rects: vec![Rect::new(0.0, 0.0, 10.0, 10.0)],
        }
    }

    fn group(label: &str, members: &[u64], confidence: f64) -> RawCorefGroup {
        RawCorefGroup {
            label: label.into(),
            members: members.to_vec(),
            confidence,
        }
    }

    #[test]
    fn every_span_lands_in_exactly_one_group() {
        let spans = [
            span(0, "Oliver"),
            span(1, "14 March 2015"),
            span(2, "Sarah Linton"),
            span(3, "Bridgwater Primary School"),
        ];
        let refs: Vec<&Span> = spans.iter().collect();
        let raw = vec![
            group("Oliver", &[0, 1], 0.9),
            group("Sarah Linton", &[2], 0.8),
        ];

        let outcome = EntityLinker::new().link(&refs, &raw);
        assert!(outcome.violations.is_empty());
        // Span 3 was never mentioned and becomes a singleton.
        assert_eq!(outcome.groups.len(), 3);

        let mut seen = BTreeSet::new();
        for g in &outcome.groups {
            for s in &g.spans {
                assert!(seen.insert(*s), "span {s:?} appears in two groups");
            }
        }
        assert_eq!(seen.len(), spans.len());
    }

    #[test]
    fn double_claim_resolves_to_higher_confidence() {
        let spans = [span(0, "Oliver"), span(1, "the school")];
        let refs: Vec<&Span> = spans.iter().collect();
        let raw = vec![
            group("Oliver", &[0, 1], 0.6),
            group("Bridgwater Primary", &[1], 0.9),
        ];

        let outcome = EntityLinker::new().link(&refs, &raw);
        assert_eq!(outcome.violations.len(), 1);
        assert!(matches!(
            outcome.violations[0],
            LinkError::PartitionViolation { span: SpanId(1), .. }
        ));

        let owner = span_to_group(&outcome.groups);
        let winning = outcome
            .groups
            .iter()
            .find(|g| g.label == "Bridgwater Primary")
            .unwrap();
        assert_eq!(owner[&SpanId(1)], winning.id);
    }

    #[test]
    fn unknown_members_are_reported_and_skipped() {
        let spans = [span(0, "Oliver")];
        let refs: Vec<&Span> = spans.iter().collect();
        let raw = vec![group("Oliver", &[0, 99], 0.9)];

        let outcome = EntityLinker::new().link(&refs, &raw);
        assert_eq!(outcome.violations.len(), 1);
        assert!(matches!(outcome.violations[0], LinkError::UnknownSpan { span: 99, .. }));
        assert_eq!(outcome.groups.len(), 1);
        assert_eq!(outcome.groups[0].spans, vec![SpanId(0)]);
    }
}
