//! Secure rewrite: reviewer-approved boxes to a sanitized output document.
//!
//! The rewrite is all-or-nothing. Content under every box is removed (not
//! covered), the document is sanitized of metadata side channels, and the
//! output is verified by re-scanning it with the same intersection detector
//! before anything reaches the destination path. File output goes through a
//! temporary sibling and an atomic rename, so a failed rewrite never leaves
//! a partially redacted document behind.

mod content;
mod metadata;

pub use content::PageStats;
pub use metadata::SanitizeStats;

use std::path::Path;

use chrono::{DateTime, Utc};
use lopdf::{Document, ObjectId};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::RewriteConfig;
use crate::error::{Error, Result, RewriteError};
use crate::types::geometry::Rect;
use crate::types::suggestion::FinalBoxSet;

use content::{media_box, to_pdf_space, PageEditor};

/// Summary of one completed rewrite
#[derive(Debug, Clone, Serialize)]
pub struct RewriteReport {
    pub pages_redacted: Vec<u32>,
    pub boxes_applied: usize,
    pub text_ops_removed: usize,
    pub images_removed: usize,
    pub invisible_text_removed: usize,
    pub annotations_removed: usize,
    pub embedded_files_removed: bool,
    pub metadata_removed: bool,
    pub objects_swept: usize,
    pub finished_at: DateTime<Utc>,
}

/// Applies a final box set to a document and sanitizes the result
#[derive(Debug, Clone, Default)]
pub struct SecureRewriter {
    config: RewriteConfig,
}

impl SecureRewriter {
    pub fn new(config: RewriteConfig) -> Self {
        Self { config }
    }

    /// Rewrites `input` in memory and returns the sanitized document bytes
    /// plus a report of what was removed
    #[instrument(skip_all, fields(boxes = boxes.len()))]
    pub fn rewrite(&self, input: &[u8], boxes: &FinalBoxSet) -> Result<(Vec<u8>, RewriteReport)> {
        let mut doc = Document::load_mem(input)?;
        let pages: Vec<ObjectId> = doc.get_pages().values().copied().collect();

        // Validate the box set against the document before touching it.
        for page in boxes.pages() {
            if page as usize >= pages.len() {
                return Err(RewriteError::MissingPage(page).into());
            }
        }

        let mut report = RewriteReport {
            pages_redacted: boxes.pages(),
            boxes_applied: boxes.len(),
            text_ops_removed: 0,
            images_removed: 0,
            invisible_text_removed: 0,
            annotations_removed: 0,
            embedded_files_removed: false,
            metadata_removed: false,
            objects_swept: 0,
            finished_at: Utc::now(),
        };

        for (index, &page_id) in pages.iter().enumerate() {
            let page_boxes = boxes.boxes_for_page(index as u32);
            if page_boxes.is_empty() && !self.config.strip_invisible_text {
                continue;
            }
            let media = media_box(&doc, page_id);
            let pdf_boxes: Vec<Rect> = page_boxes
                .iter()
                .map(|b| to_pdf_space(b, &media))
                .collect();

            let editor =
                PageEditor::new(&doc, index as u32, page_id, &pdf_boxes, &self.config);
            let stats = editor.redact(&mut doc, page_id, &pdf_boxes)?;
            report.text_ops_removed += stats.text_ops_removed;
            report.images_removed += stats.images_removed;
            report.invisible_text_removed += stats.invisible_text_removed;
        }

        let sanitized = metadata::sanitize(&mut doc, &self.config);
        report.metadata_removed = sanitized.metadata_removed;
        report.embedded_files_removed = sanitized.embedded_files_removed;
        report.annotations_removed = sanitized.annotations_removed;
        report.objects_swept = sanitized.objects_swept;

        doc.renumber_objects();
        doc.compress();
        let mut output = Vec::new();
        doc.save_to(&mut output)?;

        self.verify(&output, boxes)?;
        report.finished_at = Utc::now();
        info!(
            pages = report.pages_redacted.len(),
            text_removed = report.text_ops_removed,
            "secure rewrite complete"
        );
        Ok((output, report))
    }

    /// Rewrites `input_path` into `output_path` atomically: the output
    /// appears only after the rewritten document verified clean
    pub fn rewrite_file(
        &self,
        input_path: &Path,
        output_path: &Path,
        boxes: &FinalBoxSet,
    ) -> Result<RewriteReport> {
        let input = std::fs::read(input_path)?;
        let (output, report) = self.rewrite(&input, boxes)?;

        let temp_path = output_path.with_extension(format!("tmp-{}", Uuid::new_v4()));
        if let Err(err) = std::fs::write(&temp_path, &output) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(err.into());
        }
        if let Err(err) = std::fs::rename(&temp_path, output_path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(err.into());
        }
        Ok(report)
    }

    /// Independent check of the produced bytes: the file must reparse, no
    /// text op may still intersect a redaction rectangle, and the metadata
    /// containers must be gone
    fn verify(&self, output: &[u8], boxes: &FinalBoxSet) -> Result<()> {
        let doc = Document::load_mem(output)
            .map_err(|e| verification(format!("output does not reparse: {e}")))?;

        if doc.trailer.get(b"Info").is_ok() {
            return Err(verification("Info dictionary still present".into()));
        }
        if let Ok(catalog_id) = doc.trailer.get(b"Root").and_then(|o| o.as_reference()) {
            if let Ok(catalog) = doc.get_object(catalog_id).and_then(|o| o.as_dict()) {
                if catalog.get(b"Metadata").is_ok() {
                    return Err(verification("XMP metadata still present".into()));
                }
            }
        }

        let pages: Vec<ObjectId> = doc.get_pages().values().copied().collect();
        for page in boxes.pages() {
            let Some(&page_id) = pages.get(page as usize) else {
                return Err(verification(format!("page {page} missing from output")));
            };
            let media = media_box(&doc, page_id);
            let pdf_boxes: Vec<Rect> = boxes
                .boxes_for_page(page)
                .iter()
                .map(|b| to_pdf_space(b, &media))
                .collect();
            let editor = PageEditor::new(&doc, page, page_id, &pdf_boxes, &self.config);
            let remaining = editor.remaining_text_ops(&doc, page_id)?;
            if remaining > 0 {
                warn!(page, remaining, "redacted text still present in output");
                return Err(verification(format!(
                    "page {page}: {remaining} text operation(s) still intersect a redaction rectangle"
                )));
            }
            // A redacted image must leave the resources too, not just lose
            // its draw; an undrawn image entry on a boxed page is a leak.
            let orphaned = editor.unreferenced_images(&doc, page_id)?;
            if orphaned > 0 {
                warn!(page, orphaned, "redacted image resources still present in output");
                return Err(verification(format!(
                    "page {page}: {orphaned} image resource(s) remain with no drawing operation"
                )));
            }
        }
        Ok(())
    }
}

fn verification(reason: String) -> Error {
    RewriteError::VerificationFailed(reason).into()
}
