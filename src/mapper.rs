//! Coordinate Mapper: provider tokens to page-space spans.
//!
//! Turns layout-provider output (character offsets plus rectangles reported
//! under the page's rotation) into rectangles in unrotated page space, so no
//! downstream consumer ever handles rotation. When a semantic unit wraps
//! across lines, one rectangle is emitted per visual line rather than one
//! bounding box, which would swallow intervening unrelated text.

use std::collections::BTreeMap;

use tracing::{debug, instrument, warn};

use crate::config::MapperConfig;
use crate::error::MappingError;
use crate::providers::RawPage;
use crate::types::document::{PageText, Token};
use crate::types::geometry::{PageGeometry, Rect, Rotation};

/// Maps provider tokens into normalized page space
#[derive(Debug, Clone, Default)]
pub struct CoordinateMapper {
    config: MapperConfig,
}

impl CoordinateMapper {
    pub fn new(config: MapperConfig) -> Self {
        Self { config }
    }

    /// Converts one raw layout page into a [`PageText`] with every token
    /// rectangle normalized to unrotated page space
    #[instrument(skip(self, raw), fields(page = raw.index))]
    pub fn map_page(&self, raw: &RawPage) -> Result<PageText, MappingError> {
        let rotation = Rotation::from_degrees(raw.rotation_degrees).ok_or(
            MappingError::UnsupportedRotation {
                page: raw.index,
                degrees: raw.rotation_degrees,
            },
        )?;

        // Provider dimensions are display-space; swap back for 90/270.
        let (width, height) = if rotation.is_swapped() {
            (raw.height, raw.width)
        } else {
            (raw.width, raw.height)
        };
        let geometry = PageGeometry::new(width, height, rotation);

        let mut tokens = Vec::with_capacity(raw.tokens.len());
        for token in &raw.tokens {
            let rect = geometry.to_unrotated_rect(&token.rect);
            if token.offset + token.length > raw.text.len() {
                return Err(MappingError::OffsetOutOfCoverage {
                    page: raw.index,
                    offset: token.offset,
                    length: token.length,
                });
            }
            tokens.push(Token {
                page: raw.index,
                offset: token.offset,
                length: token.length,
                text: token.text.clone(),
                rect,
            });
        }
        tokens.sort_by_key(|t| t.offset);

        debug!(tokens = tokens.len(), "mapped layout page");
        Ok(PageText {
            index: raw.index,
            geometry,
            text: raw.text.clone(),
            tokens,
        })
    }

    /// Resolves a character range to its covering tokens and per-line
    /// rectangles.
    ///
    /// Tokens the provider reported separately are merged when the range
    /// says they form one semantic unit. A range outside token coverage is
    /// a provider/version mismatch and is reported, never dropped.
    pub fn map_range(
        &self,
        page: &PageText,
        offset: usize,
        length: usize,
    ) -> Result<MappedRange, MappingError> {
        let end = offset + length;
        let covered: Vec<&Token> = page
            .tokens
            .iter()
            .filter(|t| t.offset < end && t.end() > offset)
            .collect();

        if covered.is_empty() || end > page.text.len() {
            warn!(
                page = page.index,
                offset, length, "offset range outside token coverage"
            );
            return Err(MappingError::OffsetOutOfCoverage {
                page: page.index,
                offset,
                length,
            });
        }

        let rects = self.merge_line_rects(covered.iter().map(|t| t.rect));
        let text = page.text[offset.min(page.text.len())..end.min(page.text.len())].to_string();
        Ok(MappedRange {
            page: page.index,
            offset,
            length,
            text,
            rects,
        })
    }

    /// Merges word rectangles into per-line run rectangles: group by
    /// baseline, then union consecutive words whose horizontal gap stays
    /// under `max_gap_ratio` of the line height
    pub fn merge_line_rects(&self, rects: impl IntoIterator<Item = Rect>) -> Vec<Rect> {
        let snap = self.config.line_snap.max(f64::EPSILON);
        let mut lines: BTreeMap<i64, Vec<Rect>> = BTreeMap::new();
        for rect in rects {
            let key = (rect.y0 / snap).round() as i64;
            lines.entry(key).or_default().push(rect);
        }

        let mut merged = Vec::new();
        for (_, mut line) in lines {
            line.sort_by(|a, b| a.x0.total_cmp(&b.x0));
            let mut run = line[0];
            for rect in line.into_iter().skip(1) {
                let max_gap = run.height() * self.config.max_gap_ratio;
                if rect.x0 - run.x1 <= max_gap {
                    run = run.union(&rect);
                } else {
                    merged.push(run);
                    run = rect;
                }
            }
            merged.push(run);
        }
        merged
    }
}

/// A resolved character range: text plus one rectangle per visual line
#[derive(Debug, Clone, PartialEq)]
pub struct MappedRange {
    pub page: usize,
    pub offset: usize,
    pub length: usize,
    pub text: String,
    pub rects: Vec<Rect>,
}
