//! Review-side data model: suggestions, entity groups, rules, the final
//! box set, and undo records.

use serde::{Deserialize, Serialize};

use crate::types::document::SpanId;
use crate::types::geometry::Rect;

/// Identifier of a [`Suggestion`], unique within one document session
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SuggestionId(pub u64);

/// Identifier of an [`EntityGroup`]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EntityGroupId(pub u64);

/// Monotonic suggestion id allocator owned by the session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestionIdGen {
    next: u64,
}

impl SuggestionIdGen {
    pub fn next(&mut self) -> SuggestionId {
        let id = SuggestionId(self.next);
        self.next += 1;
        id
    }
}

/// PII and content categories recognized by the pipeline.
///
/// The structured detector reports the base categories; `DateOfBirth`,
/// `Age`, and `School` are contextual refinements applied during merging,
/// `SensitiveContent` marks subjective-rule matches, and `Manual` carries
/// the reviewer's free-form label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Person,
    PhoneNumber,
    Email,
    Address,
    DateTime,
    DateOfBirth,
    Age,
    Organization,
    School,
    NationalId,
    SensitiveContent,
    Manual(String),
}

impl Category {
    pub fn as_label(&self) -> &str {
        match self {
            Category::Person => "Person",
            Category::PhoneNumber => "PhoneNumber",
            Category::Email => "Email",
            Category::Address => "Address",
            Category::DateTime => "DateTime",
            Category::DateOfBirth => "DateOfBirth",
            Category::Age => "Age",
            Category::Organization => "Organization",
            Category::School => "School",
            Category::NationalId => "NationalId",
            Category::SensitiveContent => "SensitiveContent",
            Category::Manual(label) => label.as_str(),
        }
    }

    /// Parses a detector-reported label; unknown labels are not a category
    pub fn from_label(label: &str) -> Option<Category> {
        match label {
            "Person" => Some(Category::Person),
            "PhoneNumber" => Some(Category::PhoneNumber),
            "Email" => Some(Category::Email),
            "Address" => Some(Category::Address),
            "DateTime" => Some(Category::DateTime),
            "DateOfBirth" => Some(Category::DateOfBirth),
            "Age" => Some(Category::Age),
            "Organization" => Some(Category::Organization),
            "School" => Some(Category::School),
            "UKNationalInsuranceNumber" | "UKNationalHealthNumber" | "NationalId" => {
                Some(Category::NationalId)
            }
            "SensitiveContent" => Some(Category::SensitiveContent),
            _ => None,
        }
    }

    /// The categories an instruction may reference, plus the literal
    /// "subjective" marker handled by the compiler
    pub fn known() -> &'static [Category] {
        const KNOWN: &[Category] = &[
            Category::Person,
            Category::PhoneNumber,
            Category::Email,
            Category::Address,
            Category::DateTime,
            Category::DateOfBirth,
            Category::Age,
            Category::Organization,
            Category::School,
            Category::NationalId,
            Category::SensitiveContent,
        ];
        KNOWN
    }
}

/// Where a suggestion came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    PiiDetector,
    LlmReasoning,
    UserManual,
    OccurrenceExpansion,
}

/// Reviewer inclusion state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Inclusion {
    Accepted,
    Rejected,
}

/// Candidate redaction presented to the reviewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: SuggestionId,
    /// Spans backing this suggestion; empty for manually drawn boxes
    pub spans: Vec<SpanId>,
    pub page: usize,
    /// One rectangle per visual line, page coordinate space
    pub rects: Vec<Rect>,
    pub text: String,
    pub category: Category,
    pub confidence: f64,
    pub provenance: Provenance,
    pub inclusion: Inclusion,
    pub entity: Option<EntityGroupId>,
    pub rationale: Option<String>,
}

impl Suggestion {
    /// Span-set identity used to carry reviewer decisions across re-analysis.
    ///
    /// Span-backed suggestions are identified by their sorted span set;
    /// manual boxes by page and quantized geometry.
    pub fn identity(&self) -> SuggestionIdentity {
        if self.spans.is_empty() {
            let mut rects: Vec<(i64, i64, i64, i64)> = self
                .rects
                .iter()
                .map(|r| {
                    (
                        (r.x0 * 10.0) as i64,
                        (r.y0 * 10.0) as i64,
                        (r.x1 * 10.0) as i64,
                        (r.y1 * 10.0) as i64,
                    )
                })
                .collect();
            rects.sort_unstable();
            SuggestionIdentity::Geometry {
                page: self.page,
                rects,
            }
        } else {
            let mut spans = self.spans.clone();
            spans.sort_unstable();
            SuggestionIdentity::Spans(spans)
        }
    }

    /// Union of this suggestion's line rectangles
    pub fn bounding_rect(&self) -> Option<Rect> {
        let mut iter = self.rects.iter();
        let first = *iter.next()?;
        Some(iter.fold(first, |acc, r| acc.union(r)))
    }

    pub fn overlaps(&self, other: &Suggestion, threshold: f64) -> bool {
        if self.page != other.page {
            return false;
        }
        self.rects.iter().any(|a| {
            other
                .rects
                .iter()
                .any(|b| a.overlap_ratio(b) >= threshold)
        })
    }
}

/// Identity key for prior-state carryover
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SuggestionIdentity {
    Spans(Vec<SpanId>),
    Geometry {
        page: usize,
        rects: Vec<(i64, i64, i64, i64)>,
    },
}

/// Partition class of co-referential PII spans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityGroup {
    pub id: EntityGroupId,
    /// Canonical name of the entity, usually the highest-confidence
    /// person-name mention
    pub label: String,
    pub spans: Vec<SpanId>,
    pub confidence: f64,
}

/// Compiled instruction effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleEffect {
    ForceInclude,
    ForceExclude,
}

/// Predicate over a suggestion's category, entity link, and text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulePredicate {
    pub category: Option<Category>,
    pub entity: Option<EntityGroupId>,
    /// Normalized text aliases; any alias matching the suggestion text
    /// satisfies the predicate
    pub text_aliases: Vec<String>,
}

impl RulePredicate {
    pub fn is_empty(&self) -> bool {
        self.category.is_none() && self.entity.is_none() && self.text_aliases.is_empty()
    }

    /// All present fields must match; absent fields match anything
    pub fn matches(
        &self,
        category: &Category,
        entity: Option<EntityGroupId>,
        normalized_text: &str,
    ) -> bool {
        if let Some(wanted) = &self.category {
            if wanted != category {
                return false;
            }
        }
        if let Some(wanted) = self.entity {
            if entity != Some(wanted) {
                return false;
            }
        }
        if !self.text_aliases.is_empty()
            && !self.text_aliases.iter().any(|alias| alias == normalized_text)
        {
            return false;
        }
        true
    }

    /// Stable rendering used for conflict reporting
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let Some(category) = &self.category {
            parts.push(format!("category={}", category.as_label()));
        }
        if let Some(entity) = self.entity {
            parts.push(format!("entity={}", entity.0));
        }
        if !self.text_aliases.is_empty() {
            parts.push(format!("text={}", self.text_aliases.join("|")));
        }
        parts.join(",")
    }
}

/// Compiled instruction: predicate plus effect, evaluated in declaration
/// order with last-match-wins precedence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub predicate: RulePredicate,
    pub effect: RuleEffect,
}

/// One reviewer-approved rectangle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PageBox {
    pub page: u32,
    pub rect: Rect,
}

/// The reviewer-approved rectangles consumed by the secure rewriter.
///
/// Construction merges rectangles on the same page that overlap beyond the
/// tolerance, so the set never carries unmerged duplicates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalBoxSet {
    pub boxes: Vec<PageBox>,
}

impl FinalBoxSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rectangle, merging it with any same-page rectangle it overlaps
    /// beyond `tolerance` points of intersection extent
    pub fn push_merged(&mut self, page: u32, rect: Rect, tolerance: f64) {
        let mut rect = rect;
        loop {
            let overlapping = self.boxes.iter().position(|b| {
                b.page == page
                    && b.rect
                        .intersection(&rect)
                        .map(|i| i.width().min(i.height()) > tolerance)
                        .unwrap_or(false)
            });
            match overlapping {
                Some(pos) => {
                    let existing = self.boxes.remove(pos);
                    rect = rect.union(&existing.rect);
                }
                None => break,
            }
        }
        self.boxes.push(PageBox { page, rect });
    }

    pub fn pages(&self) -> Vec<u32> {
        let mut pages: Vec<u32> = self.boxes.iter().map(|b| b.page).collect();
        pages.sort_unstable();
        pages.dedup();
        pages
    }

    pub fn boxes_for_page(&self, page: u32) -> Vec<Rect> {
        self.boxes
            .iter()
            .filter(|b| b.page == page)
            .map(|b| b.rect)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }
}

/// Atomic, reversible batch of suggestion-list mutations.
///
/// Undo is strictly LIFO and restores exact prior state: ids added by the
/// batch are removed, suggestions it removed are reinstated, and prior
/// inclusion flags are written back.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UndoRecord {
    pub label: String,
    pub added: Vec<SuggestionId>,
    pub removed: Vec<Suggestion>,
    pub prior_inclusion: Vec<(SuggestionId, Inclusion)>,
}

impl UndoRecord {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.prior_inclusion.is_empty()
    }
}
