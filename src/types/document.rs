//! Document-side data model: tokens, spans, and the per-session arenas.
//!
//! Tokens and spans are created once per document load from the layout
//! provider's output and are read-only afterwards. Cross-references between
//! suggestions, entity groups, and spans are id-based lookups into these
//! owned collections, never live references; undo snapshots stay cheap.

use serde::{Deserialize, Serialize};

use crate::types::geometry::{PageGeometry, Rect};

/// Identifier of a [`Span`] within one document session
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct SpanId(pub u64);

/// Atomic recognized text unit with a page-space rectangle.
///
/// `offset` and `length` index into the owning page's extracted text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub page: usize,
    pub offset: usize,
    pub length: usize,
    pub text: String,
    /// Rectangle in unrotated page space
    pub rect: Rect,
}

impl Token {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }

    /// Whether this token lies entirely inside the given character range
    pub fn within(&self, offset: usize, length: usize) -> bool {
        self.offset >= offset && self.end() <= offset + length
    }
}

/// Semantic text unit composed of one or more tokens.
///
/// A span owns one rectangle per visual line, so a unit wrapping across
/// lines never produces a bounding box that swallows intervening text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub id: SpanId,
    pub page: usize,
    pub offset: usize,
    pub length: usize,
    pub text: String,
    pub rects: Vec<Rect>,
}

impl Span {
    pub fn end(&self) -> usize {
        self.offset + self.length
    }
}

/// One page's extracted text, token stream, and geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageText {
    pub index: usize,
    pub geometry: PageGeometry,
    pub text: String,
    pub tokens: Vec<Token>,
}

/// The full extracted document, pages in order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentText {
    pub pages: Vec<PageText>,
}

impl DocumentText {
    pub fn page(&self, index: usize) -> Option<&PageText> {
        self.pages.get(index)
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// Owned span collection with id-based lookup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanArena {
    spans: Vec<Span>,
    next_id: u64,
}

impl SpanArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a span, assigning it the next id
    pub fn insert(
        &mut self,
        page: usize,
        offset: usize,
        length: usize,
        text: String,
        rects: Vec<Rect>,
    ) -> SpanId {
        let id = SpanId(self.next_id);
        self.next_id += 1;
        self.spans.push(Span {
            id,
            page,
            offset,
            length,
            text,
            rects,
        });
        id
    }

    pub fn get(&self, id: SpanId) -> Option<&Span> {
        // Ids are dense and allocated in insertion order.
        self.spans.get(id.0 as usize).filter(|s| s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Span> {
        self.spans.iter()
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::geometry::Rotation;

    fn rect() -> Rect {
        Rect::new(0.0, 0.0, 10.0, 10.0)
    }

    #[test]
    fn token_range_containment() {
        let token = Token {
            page: 0,
            offset: 10,
            length: 5,
            text: "hello".into(),
            rect: rect(),
        };
        assert!(token.within(10, 5));
        assert!(token.within(8, 10));
        assert!(!token.within(11, 5));
        assert!(!token.within(0, 12));
    }

    #[test]
    fn arena_assigns_dense_ids() {
        let mut arena = SpanArena::new();
        let a = arena.insert(0, 0, 4, "John".into(), vec![rect()]);
        let b = arena.insert(0, 5, 5, "Smith".into(), vec![rect()]);
        assert_ne!(a, b);
        assert_eq!(arena.get(a).unwrap().text, "John");
        assert_eq!(arena.get(b).unwrap().text, "Smith");
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn document_page_lookup() {
        let doc = DocumentText {
            pages: vec![PageText {
                index: 0,
                geometry: PageGeometry::new(612.0, 792.0, Rotation::R0),
                text: String::new(),
                tokens: vec![],
            }],
        };
        assert!(doc.page(0).is_some());
        assert!(doc.page(1).is_none());
    }
}
