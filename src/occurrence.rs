//! Whole-document occurrence expansion.
//!
//! Given a seed phrase the reviewer accepted once, finds every other place
//! the document says (approximately) the same thing: token windows are
//! scored with the normalized fuzzy similarity, pages scan in parallel, and
//! results are deterministic for a fixed document and seed.

use rayon::prelude::*;
use tracing::{debug, instrument};

use crate::config::{MapperConfig, OccurrenceConfig};
use crate::mapper::CoordinateMapper;
use crate::matcher;
use crate::types::document::{DocumentText, PageText};
use crate::types::geometry::Rect;

/// One fuzzy occurrence of the seed phrase
#[derive(Debug, Clone, PartialEq)]
pub struct OccurrenceMatch {
    pub page: usize,
    pub offset: usize,
    pub length: usize,
    pub text: String,
    pub rects: Vec<Rect>,
    pub score: f64,
}

impl OccurrenceMatch {
    fn end(&self) -> usize {
        self.offset + self.length
    }

    fn overlaps_range(&self, page: usize, offset: usize, length: usize) -> bool {
        self.page == page && self.offset < offset + length && offset < self.end()
    }
}

/// Scans the document for fuzzy occurrences of a seed phrase
#[derive(Debug, Clone, Default)]
pub struct OccurrenceFinder {
    config: OccurrenceConfig,
    mapper: CoordinateMapper,
}

impl OccurrenceFinder {
    pub fn new(config: OccurrenceConfig, mapper: MapperConfig) -> Self {
        Self {
            config,
            mapper: CoordinateMapper::new(mapper),
        }
    }

    /// Finds all non-overlapping occurrences of `seed` scoring at or above
    /// the configured threshold.
    ///
    /// Ranges listed in `exclude` (page, offset, length) are never matched
    /// again, which keeps repeated expansion of the same seed idempotent.
    /// Within a page, overlapping candidates resolve greedily by score,
    /// ties by earlier offset.
    #[instrument(skip(self, doc, exclude), fields(seed = seed))]
    pub fn find(
        &self,
        doc: &DocumentText,
        seed: &str,
        exclude: &[(usize, usize, usize)],
    ) -> Vec<OccurrenceMatch> {
        let seed_norm = matcher::normalize(seed);
        if seed_norm.is_empty() {
            return Vec::new();
        }
        let seed_tokens = seed_norm.split(' ').count();

        let mut matches: Vec<OccurrenceMatch> = doc
            .pages
            .par_iter()
            .flat_map(|page| self.scan_page(page, &seed_norm, seed_tokens))
            .collect();

        matches.retain(|m| {
            !exclude
                .iter()
                .any(|&(page, offset, length)| m.overlaps_range(page, offset, length))
        });

        let selected = self.select_non_overlapping(matches);
        debug!(matches = selected.len(), "occurrence scan complete");
        selected
    }

    /// Slides token windows of the seed's length (plus slack) across one
    /// page and scores each against the seed
    fn scan_page(&self, page: &PageText, seed_norm: &str, seed_tokens: usize) -> Vec<OccurrenceMatch> {
        let mut out = Vec::new();
        let min_window = seed_tokens.max(1);
        let max_window = seed_tokens + self.config.window_slack;

        for start in 0..page.tokens.len() {
            for window in min_window..=max_window {
                let end = start + window;
                if end > page.tokens.len() {
                    break;
                }
                let slice = &page.tokens[start..end];
                let candidate: String = slice
                    .iter()
                    .map(|t| t.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                let score = matcher::similarity(seed_norm, &matcher::normalize(&candidate));
                if score < self.config.match_threshold {
                    continue;
                }
                let offset = slice[0].offset;
                let length = slice[slice.len() - 1].end() - offset;
                let text = page
                    .text
                    .get(offset..offset + length)
                    .unwrap_or(&candidate)
                    .to_string();
                let rects = self.mapper.merge_line_rects(slice.iter().map(|t| t.rect));
                out.push(OccurrenceMatch {
                    page: page.index,
                    offset,
                    length,
                    text,
                    rects,
                    score,
                });
            }
        }
        out
    }

    /// Greedy selection: best score first, earlier offset on ties, drop
    /// anything overlapping an already-selected match
    fn select_non_overlapping(&self, mut matches: Vec<OccurrenceMatch>) -> Vec<OccurrenceMatch> {
        matches.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.page.cmp(&b.page))
                .then(a.offset.cmp(&b.offset))
        });

        let mut selected: Vec<OccurrenceMatch> = Vec::new();
        for candidate in matches {
            if !selected
                .iter()
                .any(|s| candidate.overlaps_range(s.page, s.offset, s.length))
            {
                selected.push(candidate);
            }
        }
        selected.sort_by(|a, b| a.page.cmp(&b.page).then(a.offset.cmp(&b.offset)));
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::document::Token;
    use crate::types::geometry::{PageGeometry, Rotation};

    /// Lays out `text` as one token per word, 40 points per word
    fn page(index: usize, text: &str) -> PageText {
        let mut tokens = Vec::new();
        let mut offset = 0;
        let mut x = 72.0;
        for word in text.split(' ') {
            tokens.push(Token {
                page: index,
                offset,
                length: word.len(),
                text: word.into(),
                rect: Rect::new(x, 100.0, x + 36.0, 112.0),
            });
            offset += word.len() + 1;
            x += 40.0;
        }
        PageText {
            index,
            geometry: PageGeometry::new(612.0, 792.0, Rotation::R0),
            text: text.into(),
            tokens,
        }
    }

    fn doc(pages: Vec<PageText>) -> DocumentText {
        DocumentText { pages }
    }

    #[test]
    fn finds_exact_and_fuzzy_occurrences() {
        let doc = doc(vec![
            page(0, "John Smith attended the meeting"),
            page(1, "later Jonh Smith signed the form"),
        ]);
        let matches = OccurrenceFinder::default().find(&doc, "John Smith", &[]);
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].page, 0);
        assert_eq!(matches[0].text, "John Smith");
        assert_eq!(matches[0].score, 1.0);
        assert_eq!(matches[1].page, 1);
        assert_eq!(matches[1].text, "Jonh Smith");
    }

    #[test]
    fn stays_below_threshold_for_different_names() {
        let doc = doc(vec![page(0, "Jane Smith attended the meeting")]);
        let matches = OccurrenceFinder::default().find(&doc, "John Smith", &[]);
        assert!(matches.is_empty());
    }

    #[test]
    fn excluded_ranges_are_not_rematched() {
        let doc = doc(vec![page(0, "John Smith met John Smith")]);
        let all = OccurrenceFinder::default().find(&doc, "John Smith", &[]);
        assert_eq!(all.len(), 2);

        let exclude: Vec<(usize, usize, usize)> =
            all.iter().map(|m| (m.page, m.offset, m.length)).collect();
        let again = OccurrenceFinder::default().find(&doc, "John Smith", &exclude);
        assert!(again.is_empty());
    }

    #[test]
    fn overlapping_candidates_resolve_to_best_score() {
        // "John Smith" scores higher than any window shifted by one token.
        let doc = doc(vec![page(0, "Mr John Smith Esq")]);
        let matches = OccurrenceFinder::default().find(&doc, "John Smith", &[]);
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].text, "John Smith");
    }

    #[test]
    fn results_are_deterministic() {
        let doc = doc(vec![
            page(0, "John Smith here"),
            page(1, "John Smith there"),
            page(2, "John Smith everywhere"),
        ]);
        let finder = OccurrenceFinder::default();
        let a = finder.find(&doc, "John Smith", &[]);
        let b = finder.find(&doc, "John Smith", &[]);
        assert_eq!(a, b);
        let pages: Vec<usize> = a.iter().map(|m| m.page).collect();
        assert_eq!(pages, vec![0, 1, 2]);
    }

    #[test]
    fn mapper_config_controls_match_rect_merging() {
        let doc = doc(vec![page(0, "John Smith attended")]);
        let tight = OccurrenceFinder::new(
            OccurrenceConfig::default(),
            MapperConfig {
                max_gap_ratio: 0.1,
                line_snap: 1.0,
            },
        );
        let matches = tight.find(&doc, "John Smith", &[]);
        assert_eq!(matches.len(), 1);
        // The 4-point inter-word gap exceeds 0.1 of the 12-point line
        // height, so the words keep separate rectangles.
        assert_eq!(matches[0].rects.len(), 2);

        let merged = OccurrenceFinder::default().find(&doc, "John Smith", &[]);
        assert_eq!(merged[0].rects.len(), 1);
    }

    #[test]
    fn empty_seed_matches_nothing() {
        let doc = doc(vec![page(0, "John Smith")]);
        assert!(OccurrenceFinder::default().find(&doc, "  ", &[]).is_empty());
    }
}
