//! Review session: owns the suggestion list, applies reviewer commands with
//! undo, and coordinates the analysis pipeline.
//!
//! Mutation goes through [`ReviewSession::apply`] on a single serialized
//! path; every command pushes one [`UndoRecord`] so undo is strictly LIFO
//! and restores exact prior state. Re-analysis is all-or-nothing: provider
//! calls and merging complete before the session is touched, so dropping
//! the analysis future mid-flight leaves the previous state intact.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{Error, InstructionError, LinkError, MappingError, Result};
use crate::instruction::InstructionCompiler;
use crate::linker::{span_to_group, EntityLinker};
use crate::mapper::CoordinateMapper;
use crate::merge::{Finding, SuggestionMerger};
use crate::occurrence::OccurrenceFinder;
use crate::providers::{LayoutProvider, LlmReasoner, PiiDetector};
use crate::types::document::{DocumentText, SpanArena, SpanId};
use crate::types::geometry::Rect;
use crate::types::suggestion::{
    Category, EntityGroup, FinalBoxSet, Inclusion, Provenance, Suggestion, SuggestionId,
    SuggestionIdGen, UndoRecord,
};

/// The three external collaborators the analysis pipeline consumes
pub struct Providers<'a> {
    pub layout: &'a dyn LayoutProvider,
    pub pii: &'a dyn PiiDetector,
    pub llm: &'a dyn LlmReasoner,
}

/// Non-fatal diagnostics from one analysis run
#[derive(Debug, Default)]
pub struct AnalysisReport {
    pub suggestions: usize,
    pub instruction_errors: Vec<InstructionError>,
    pub link_violations: Vec<LinkError>,
    pub mapping_errors: Vec<MappingError>,
}

/// Reviewer command against the suggestion list
#[derive(Debug, Clone)]
pub enum SessionCommand {
    SetInclusion {
        id: SuggestionId,
        inclusion: Inclusion,
    },
    /// Sets inclusion on every suggestion, optionally filtered by category
    BulkSetInclusion {
        category: Option<Category>,
        inclusion: Inclusion,
    },
    AddManualBox {
        page: usize,
        rect: Rect,
        label: String,
    },
    DeleteSuggestion {
        id: SuggestionId,
    },
    /// Finds fuzzy occurrences of the given suggestion's text across the
    /// whole document and adds them as one atomic batch
    ExpandOccurrences {
        seed: SuggestionId,
    },
    Undo,
}

/// A session shared across request handlers; commands still serialize
/// through the lock
pub type SharedSession = Arc<parking_lot::Mutex<ReviewSession>>;

/// One document's review state
pub struct ReviewSession {
    id: Uuid,
    config: EngineConfig,
    doc: DocumentText,
    arena: SpanArena,
    groups: Vec<EntityGroup>,
    suggestions: Vec<Suggestion>,
    undo: Vec<UndoRecord>,
    ids: SuggestionIdGen,
}

impl ReviewSession {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            id: Uuid::new_v4(),
            config,
            doc: DocumentText::default(),
            arena: SpanArena::new(),
            groups: Vec::new(),
            suggestions: Vec::new(),
            undo: Vec::new(),
            ids: SuggestionIdGen::default(),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn document(&self) -> &DocumentText {
        &self.doc
    }

    pub fn entity_groups(&self) -> &[EntityGroup] {
        &self.groups
    }

    /// Suggestions in id order
    pub fn suggestions(&self) -> &[Suggestion] {
        &self.suggestions
    }

    pub fn suggestion(&self, id: SuggestionId) -> Option<&Suggestion> {
        self.suggestions.iter().find(|s| s.id == id)
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Runs the full analysis pipeline and replaces the session's document
    /// state with the result.
    ///
    /// Reviewer decisions on surviving suggestions carry over by span
    /// identity; manually drawn boxes always survive. The undo stack is
    /// cleared, since its records reference the replaced state.
    #[instrument(skip_all, fields(session = %self.id))]
    pub async fn run_analysis(
        &mut self,
        document: &[u8],
        instructions: &str,
        providers: &Providers<'_>,
    ) -> Result<AnalysisReport> {
        let mapper = CoordinateMapper::new(self.config.mapper.clone());

        let layout = providers.layout.analyze(document).await?;
        let mut pages = Vec::with_capacity(layout.pages.len());
        for raw in &layout.pages {
            pages.push(mapper.map_page(raw)?);
        }
        let doc = DocumentText { pages };
        let texts: Vec<String> = doc.pages.iter().map(|p| p.text.clone()).collect();

        let (entities, parse) = tokio::try_join!(
            providers.pii.detect(&texts),
            providers.llm.parse_instructions(instructions),
        )?;
        let judgments = match parse.sensitive_content_rule.as_deref() {
            Some(rule) => providers.llm.judge_sensitive(&texts, rule).await?,
            None => Vec::new(),
        };

        // Materialize detector entities as spans. A single entity with bad
        // offsets blocks review of its own range, not the whole run.
        let mut arena = SpanArena::new();
        let mut mapping_errors: Vec<MappingError> = Vec::new();
        let mut detected: Vec<(SpanId, Category, f64, usize)> = Vec::new();
        for entity in &entities {
            let Some(category) = Category::from_label(&entity.category) else {
                warn!(category = %entity.category, "skipping unknown detector category");
                continue;
            };
            let Some(page) = doc.page(entity.page) else {
                warn!(page = entity.page, "detector entity on unknown page");
                continue;
            };
            let mapped = match mapper.map_range(page, entity.offset, entity.length) {
                Ok(mapped) => mapped,
                Err(err) => {
                    warn!(
                        page = entity.page,
                        offset = entity.offset,
                        "detector entity outside token coverage"
                    );
                    mapping_errors.push(err);
                    continue;
                }
            };
            let span = arena.insert(
                entity.page,
                entity.offset,
                entity.length,
                mapped.text,
                mapped.rects,
            );
            detected.push((span, category, entity.confidence, entity.offset));
        }

        // Coreference is asked about person mentions, but every detected
        // span goes through the linker so the groups partition all of them;
        // spans the collaborator never mentions become singletons.
        let mentions: Vec<(u64, String)> = detected
            .iter()
            .filter(|(_, category, _, _)| *category == Category::Person)
            .filter_map(|(id, _, _, _)| arena.get(*id).map(|s| (s.id.0, s.text.clone())))
            .collect();
        let context = texts.join("\n");
        let coref = providers.llm.link_entities(&context, &mentions).await?;
        let detected_spans: Vec<_> = detected
            .iter()
            .filter_map(|(id, _, _, _)| arena.get(*id))
            .collect();
        let link = EntityLinker::new().link(&detected_spans, &coref);
        let owner = span_to_group(&link.groups);

        let compile =
            InstructionCompiler::new(self.config.instruction.clone()).compile(&parse, &link.groups);

        // Assemble findings: detector spans, LLM judgments, and the manual
        // boxes surviving from the previous state.
        let mut findings = Vec::new();
        for (span_id, category, confidence, offset) in &detected {
            let Some(span) = arena.get(*span_id) else {
                continue;
            };
            findings.push(Finding {
                spans: vec![*span_id],
                page: span.page,
                offset: *offset,
                rects: span.rects.clone(),
                text: span.text.clone(),
                category: category.clone(),
                confidence: *confidence,
                provenance: Provenance::PiiDetector,
                entity: owner.get(span_id).copied(),
                rationale: None,
            });
        }
        for judgment in &judgments {
            let Some(page) = doc.page(judgment.page) else {
                warn!(page = judgment.page, "judgment on unknown page");
                continue;
            };
            let mapped = match mapper.map_range(page, judgment.offset, judgment.length) {
                Ok(mapped) => mapped,
                Err(err) => {
                    warn!(
                        page = judgment.page,
                        offset = judgment.offset,
                        "judgment outside token coverage"
                    );
                    mapping_errors.push(err);
                    continue;
                }
            };
            findings.push(Finding {
                spans: vec![arena.insert(
                    judgment.page,
                    judgment.offset,
                    judgment.length,
                    mapped.text.clone(),
                    mapped.rects.clone(),
                )],
                page: judgment.page,
                offset: judgment.offset,
                rects: mapped.rects,
                text: mapped.text,
                category: Category::SensitiveContent,
                confidence: judgment.confidence,
                provenance: Provenance::LlmReasoning,
                entity: None,
                rationale: Some(judgment.rationale.clone()),
            });
        }
        for manual in self
            .suggestions
            .iter()
            .filter(|s| s.provenance == Provenance::UserManual && s.spans.is_empty())
        {
            findings.push(Finding {
                spans: vec![],
                page: manual.page,
                offset: 0,
                rects: manual.rects.clone(),
                text: manual.text.clone(),
                category: manual.category.clone(),
                confidence: manual.confidence,
                provenance: Provenance::UserManual,
                entity: None,
                rationale: None,
            });
        }

        let prior: HashMap<_, _> = self
            .suggestions
            .iter()
            .map(|s| (s.identity(), s.inclusion))
            .collect();
        let mut ids = self.ids.clone();
        let merged = SuggestionMerger::new(self.config.merge.clone()).merge(
            &doc,
            findings,
            &compile.rules,
            &link.groups,
            &arena,
            &prior,
            &mut ids,
        );

        // Commit point: everything succeeded, replace state atomically.
        self.doc = doc;
        self.arena = arena;
        self.groups = link.groups;
        self.suggestions = merged;
        self.ids = ids;
        self.undo.clear();

        let report = AnalysisReport {
            suggestions: self.suggestions.len(),
            instruction_errors: compile.errors,
            link_violations: link.violations,
            mapping_errors,
        };
        info!(
            suggestions = report.suggestions,
            instruction_errors = report.instruction_errors.len(),
            "analysis complete"
        );
        Ok(report)
    }

    /// Applies one reviewer command; every command except [`SessionCommand::Undo`]
    /// pushes an undo record
    #[instrument(skip(self, command), fields(session = %self.id))]
    pub fn apply(&mut self, command: SessionCommand) -> Result<()> {
        match command {
            SessionCommand::SetInclusion { id, inclusion } => {
                let suggestion = self.suggestion_mut(id)?;
                let mut record = UndoRecord::new("set inclusion");
                record.prior_inclusion.push((id, suggestion.inclusion));
                suggestion.inclusion = inclusion;
                self.undo.push(record);
            }
            SessionCommand::BulkSetInclusion {
                category,
                inclusion,
            } => {
                let mut record = UndoRecord::new("bulk set inclusion");
                for s in self.suggestions.iter_mut() {
                    if let Some(wanted) = &category {
                        if &s.category != wanted {
                            continue;
                        }
                    }
                    record.prior_inclusion.push((s.id, s.inclusion));
                    s.inclusion = inclusion;
                }
                self.undo.push(record);
            }
            SessionCommand::AddManualBox { page, rect, label } => {
                let id = self.ids.next();
                let mut record = UndoRecord::new("add manual box");
                record.added.push(id);
                self.suggestions.push(Suggestion {
                    id,
                    spans: vec![],
                    page,
                    rects: vec![rect],
                    text: String::new(),
                    category: Category::Manual(label),
                    confidence: 1.0,
                    provenance: Provenance::UserManual,
                    inclusion: Inclusion::Accepted,
                    entity: None,
                    rationale: None,
                });
                self.undo.push(record);
            }
            SessionCommand::DeleteSuggestion { id } => {
                let pos = self
                    .suggestions
                    .iter()
                    .position(|s| s.id == id)
                    .ok_or_else(|| unknown_suggestion(id))?;
                let mut record = UndoRecord::new("delete suggestion");
                record.removed.push(self.suggestions.remove(pos));
                self.undo.push(record);
            }
            SessionCommand::ExpandOccurrences { seed } => {
                self.expand_occurrences(seed)?;
            }
            SessionCommand::Undo => {
                self.undo_last()?;
            }
        }
        Ok(())
    }

    /// Redaction boxes for every accepted suggestion, overlaps merged.
    ///
    /// Committing consumes the undo history: the box set is a terminal
    /// export of review state, not another reversible step.
    pub fn commit(&mut self) -> FinalBoxSet {
        let mut set = FinalBoxSet::new();
        let tolerance = self.config.rewrite.box_overlap_tolerance;
        for suggestion in &self.suggestions {
            if suggestion.inclusion != Inclusion::Accepted {
                continue;
            }
            for rect in &suggestion.rects {
                set.push_merged(suggestion.page as u32, *rect, tolerance);
            }
        }
        self.undo.clear();
        debug!(boxes = set.len(), "committed final box set");
        set
    }

    fn expand_occurrences(&mut self, seed: SuggestionId) -> Result<()> {
        let seed_suggestion = self
            .suggestion(seed)
            .ok_or_else(|| unknown_suggestion(seed))?;
        let seed_text = seed_suggestion.text.clone();
        let seed_category = seed_suggestion.category.clone();
        if seed_text.trim().is_empty() {
            return Err(Error::SessionError(
                "occurrence expansion needs a text-backed suggestion".into(),
            ));
        }

        // Every span already claimed by a suggestion is off limits, which
        // also makes repeated expansion of the same seed a no-op.
        let exclude: Vec<(usize, usize, usize)> = self
            .suggestions
            .iter()
            .flat_map(|s| s.spans.iter())
            .filter_map(|id| self.arena.get(*id))
            .map(|span| (span.page, span.offset, span.length))
            .collect();
        // Manual boxes carry no spans, so accepted geometry is excluded too.
        let accepted_rects: Vec<(usize, Rect)> = self
            .suggestions
            .iter()
            .filter(|s| s.inclusion == Inclusion::Accepted)
            .flat_map(|s| s.rects.iter().map(move |r| (s.page, *r)))
            .collect();

        let matches = OccurrenceFinder::new(
            self.config.occurrence.clone(),
            self.config.mapper.clone(),
        )
        .find(&self.doc, &seed_text, &exclude);

        let mut record = UndoRecord::new("expand occurrences");
        for m in matches {
            if m.rects.iter().any(|rect| {
                accepted_rects
                    .iter()
                    .any(|(page, accepted)| *page == m.page && accepted.intersects(rect))
            }) {
                continue;
            }
            let span = self
                .arena
                .insert(m.page, m.offset, m.length, m.text.clone(), m.rects.clone());
            let id = self.ids.next();
            record.added.push(id);
            self.suggestions.push(Suggestion {
                id,
                spans: vec![span],
                page: m.page,
                rects: m.rects,
                text: m.text,
                category: seed_category.clone(),
                confidence: m.score,
                provenance: Provenance::OccurrenceExpansion,
                inclusion: Inclusion::Accepted,
                entity: None,
                rationale: None,
            });
        }
        debug!(added = record.added.len(), "occurrence expansion applied");
        // An empty batch is still a recorded (and undoable) step, so the
        // reviewer sees one undo entry per command issued.
        self.undo.push(record);
        Ok(())
    }

    fn undo_last(&mut self) -> Result<()> {
        let record = self
            .undo
            .pop()
            .ok_or_else(|| Error::SessionError("nothing to undo".into()))?;
        self.suggestions.retain(|s| !record.added.contains(&s.id));
        for suggestion in record.removed {
            self.suggestions.push(suggestion);
        }
        for (id, inclusion) in record.prior_inclusion {
            if let Some(s) = self.suggestions.iter_mut().find(|s| s.id == id) {
                s.inclusion = inclusion;
            }
        }
        self.suggestions.sort_by_key(|s| s.id);
        Ok(())
    }

    fn suggestion_mut(&mut self, id: SuggestionId) -> Result<&mut Suggestion> {
        self.suggestions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| unknown_suggestion(id))
    }
}

fn unknown_suggestion(id: SuggestionId) -> Error {
    Error::SessionError(format!("unknown suggestion id {}", id.0))
}
