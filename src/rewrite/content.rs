//! Content-stream editing for one page.
//!
//! Redaction removes the underlying operations, never paints over them:
//! show-text operators whose estimated extent intersects a redaction
//! rectangle are dropped, image XObject draws inside a rectangle are
//! dropped, and content whose extent cannot be bounded (rotated or skewed
//! matrices, inline images, form XObjects) is treated as intersecting.
//! Estimation is deliberately conservative; over-redaction is acceptable,
//! under-redaction is not.

use std::collections::BTreeSet;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, trace};

use crate::config::RewriteConfig;
use crate::error::RewriteError;
use crate::types::geometry::Rect;

/// Invisible render mode (PDF text rendering mode 3), used by OCR layers
const TR_INVISIBLE: i64 = 3;

/// Average glyph width as a fraction of font size, used for the text-matrix
/// advance when the actual font metrics are unavailable
const GLYPH_WIDTH_RATIO: f64 = 0.5;

/// Upper-bound glyph width used for the intersection test, wider than any
/// common text font; a run is never judged to end short of a rectangle its
/// real glyphs could reach
const GLYPH_WIDTH_BOUND: f64 = 1.0;

/// What one page edit removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageStats {
    pub text_ops_removed: usize,
    pub images_removed: usize,
    pub invisible_text_removed: usize,
}

/// 2D affine transform in PDF row-vector convention: [a b c d e f]
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

impl Matrix {
    const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    fn from_operands(operands: &[Object]) -> Option<Matrix> {
        if operands.len() != 6 {
            return None;
        }
        Some(Matrix {
            a: number(&operands[0])?,
            b: number(&operands[1])?,
            c: number(&operands[2])?,
            d: number(&operands[3])?,
            e: number(&operands[4])?,
            f: number(&operands[5])?,
        })
    }

    /// self applied first, then other
    fn then(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// Whether the transform is axis-aligned (no rotation or skew)
    fn is_axis_aligned(&self) -> bool {
        self.b == 0.0 && self.c == 0.0
    }

    /// Axis-aligned bounding box of the transformed unit square
    fn unit_square_bounds(&self) -> Rect {
        let corners = [
            self.apply(0.0, 0.0),
            self.apply(1.0, 0.0),
            self.apply(0.0, 1.0),
            self.apply(1.0, 1.0),
        ];
        let xs = corners.iter().map(|c| c.0);
        let ys = corners.iter().map(|c| c.1);
        Rect::new(
            xs.clone().fold(f64::INFINITY, f64::min),
            ys.clone().fold(f64::INFINITY, f64::min),
            xs.fold(f64::NEG_INFINITY, f64::max),
            ys.fold(f64::NEG_INFINITY, f64::max),
        )
    }
}

/// Text state tracked across one content stream
#[derive(Debug, Clone, Copy)]
struct TextState {
    tm: Matrix,
    tlm: Matrix,
    size: f64,
    leading: f64,
    char_spacing: f64,
    word_spacing: f64,
    h_scale: f64,
    render_mode: i64,
}

impl Default for TextState {
    fn default() -> Self {
        Self {
            tm: Matrix::IDENTITY,
            tlm: Matrix::IDENTITY,
            size: 0.0,
            leading: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            h_scale: 1.0,
            render_mode: 0,
        }
    }
}

/// Kind of XObject a `Do` operand names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum XObjectKind {
    Image,
    Form,
    Other,
}

/// Edits one page's content stream against a set of redaction rectangles
/// given in PDF user space (bottom-left origin)
pub struct PageEditor<'a> {
    config: &'a RewriteConfig,
    page: u32,
    boxes: Vec<Rect>,
    xobjects: Vec<(Vec<u8>, XObjectKind)>,
}

impl<'a> PageEditor<'a> {
    pub fn new(
        doc: &Document,
        page: u32,
        page_id: ObjectId,
        boxes: &[Rect],
        config: &'a RewriteConfig,
    ) -> Self {
        // Every test uses the configured slop margin; widen once up front.
        let boxes = boxes.iter().map(|b| b.expanded(config.slop)).collect();
        Self {
            config,
            page,
            boxes,
            xobjects: xobject_kinds(doc, page_id),
        }
    }

    /// Rewrites the page content in place and appends opaque fill
    /// rectangles over the redacted areas
    pub fn redact(
        &self,
        doc: &mut Document,
        page_id: ObjectId,
        fills: &[Rect],
    ) -> Result<PageStats, RewriteError> {
        let data = doc
            .get_page_content(page_id)
            .map_err(|e| self.undecodable(e))?;
        let content = Content::decode(&data).map_err(|e| self.undecodable(e))?;

        let (mut operations, stats, removed_images) =
            self.filter_operations(content.operations)?;
        for rect in fills {
            operations.extend(fill_rect_ops(rect));
        }

        let encoded = Content { operations }
            .encode()
            .map_err(|e| self.undecodable(e))?;
        doc.change_page_content(page_id, encoded)
            .map_err(|e| self.undecodable(e))?;
        // A dropped Do is not enough: the stream itself must become
        // unreachable, or the image bytes stay recoverable from the file.
        purge_image_xobjects(doc, page_id, &removed_images);

        debug!(
            page = self.page,
            text_removed = stats.text_ops_removed,
            images_removed = stats.images_removed,
            "page content rewritten"
        );
        Ok(stats)
    }

    /// Counts the show-text operations that still intersect a redaction
    /// rectangle; used to verify a rewritten page
    pub fn remaining_text_ops(
        &self,
        doc: &Document,
        page_id: ObjectId,
    ) -> Result<usize, RewriteError> {
        let data = doc
            .get_page_content(page_id)
            .map_err(|e| self.undecodable(e))?;
        let content = Content::decode(&data).map_err(|e| self.undecodable(e))?;
        let (_, stats, _) = self.filter_operations(content.operations)?;
        Ok(stats.text_ops_removed)
    }

    /// Counts image entries in the page's resources that no operation in
    /// the content stream draws; used to verify redacted image streams left
    /// the rewritten document
    pub fn unreferenced_images(
        &self,
        doc: &Document,
        page_id: ObjectId,
    ) -> Result<usize, RewriteError> {
        let data = doc
            .get_page_content(page_id)
            .map_err(|e| self.undecodable(e))?;
        let content = Content::decode(&data).map_err(|e| self.undecodable(e))?;
        let drawn: BTreeSet<&[u8]> = content
            .operations
            .iter()
            .filter(|op| op.operator == "Do")
            .filter_map(|op| op.operands.first().and_then(|o| o.as_name().ok()))
            .collect();
        Ok(self
            .xobjects
            .iter()
            .filter(|(name, kind)| {
                *kind == XObjectKind::Image && !drawn.contains(name.as_slice())
            })
            .count())
    }

    fn undecodable(&self, cause: impl std::fmt::Display) -> RewriteError {
        RewriteError::UndecodableContent {
            page: self.page,
            reason: cause.to_string(),
        }
    }

    /// One pass over the operation list: tracks graphics and text state,
    /// drops what must go, and returns what survived plus the names of the
    /// image XObjects whose draws were removed
    fn filter_operations(
        &self,
        operations: Vec<Operation>,
    ) -> Result<(Vec<Operation>, PageStats, Vec<Vec<u8>>), RewriteError> {
        let mut stats = PageStats::default();
        let mut removed_images: Vec<Vec<u8>> = Vec::new();
        let mut out = Vec::with_capacity(operations.len());

        let mut ctm = Matrix::IDENTITY;
        let mut ctm_stack: Vec<Matrix> = Vec::new();
        let mut text = TextState::default();

        for op in operations {
            let operator = op.operator.clone();
            let operands = &op.operands;
            match operator.as_str() {
                "q" => {
                    ctm_stack.push(ctm);
                    out.push(op);
                }
                "Q" => {
                    ctm = ctm_stack.pop().unwrap_or(Matrix::IDENTITY);
                    out.push(op);
                }
                "cm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        ctm = m.then(&ctm);
                    }
                    out.push(op);
                }
                "BT" => {
                    text.tm = Matrix::IDENTITY;
                    text.tlm = Matrix::IDENTITY;
                    out.push(op);
                }
                "ET" => out.push(op),
                "Tf" => {
                    if let Some(size) = operands.get(1).and_then(number) {
                        text.size = size;
                    }
                    out.push(op);
                }
                "Tm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        text.tm = m;
                        text.tlm = m;
                    }
                    out.push(op);
                }
                "Td" => {
                    if let (Some(tx), Some(ty)) = (
                        operands.first().and_then(number),
                        operands.get(1).and_then(number),
                    ) {
                        text.tlm = translation(tx, ty).then(&text.tlm);
                        text.tm = text.tlm;
                    }
                    out.push(op);
                }
                "TD" => {
                    if let (Some(tx), Some(ty)) = (
                        operands.first().and_then(number),
                        operands.get(1).and_then(number),
                    ) {
                        text.leading = -ty;
                        text.tlm = translation(tx, ty).then(&text.tlm);
                        text.tm = text.tlm;
                    }
                    out.push(op);
                }
                "T*" => {
                    text.tlm = translation(0.0, -text.leading).then(&text.tlm);
                    text.tm = text.tlm;
                    out.push(op);
                }
                "TL" => {
                    if let Some(l) = operands.first().and_then(number) {
                        text.leading = l;
                    }
                    out.push(op);
                }
                "Tc" => {
                    if let Some(v) = operands.first().and_then(number) {
                        text.char_spacing = v;
                    }
                    out.push(op);
                }
                "Tw" => {
                    if let Some(v) = operands.first().and_then(number) {
                        text.word_spacing = v;
                    }
                    out.push(op);
                }
                "Tz" => {
                    if let Some(v) = operands.first().and_then(number) {
                        text.h_scale = v / 100.0;
                    }
                    out.push(op);
                }
                "Tr" => {
                    if let Some(v) = operands.first().and_then(number) {
                        text.render_mode = v as i64;
                    }
                    out.push(op);
                }
                "Tj" | "TJ" => {
                    let shown = shown_text(operands);
                    let keep = self.keep_show(&mut text, &ctm, &shown, &mut stats);
                    if keep {
                        out.push(op);
                    }
                }
                "'" => {
                    text.tlm = translation(0.0, -text.leading).then(&text.tlm);
                    text.tm = text.tlm;
                    let shown = shown_text(operands);
                    if self.keep_show(&mut text, &ctm, &shown, &mut stats) {
                        out.push(op);
                    } else {
                        // Keep the line advance the operator implied.
                        out.push(Operation::new("T*", vec![]));
                    }
                }
                "\"" => {
                    if let (Some(aw), Some(ac)) = (
                        operands.first().and_then(number),
                        operands.get(1).and_then(number),
                    ) {
                        text.word_spacing = aw;
                        text.char_spacing = ac;
                    }
                    text.tlm = translation(0.0, -text.leading).then(&text.tlm);
                    text.tm = text.tlm;
                    let shown = shown_text(operands.get(2..).unwrap_or(&[]));
                    if self.keep_show(&mut text, &ctm, &shown, &mut stats) {
                        out.push(op);
                    } else {
                        // Preserve the operator's state side effects.
                        out.push(Operation::new(
                            "Tw",
                            vec![Object::Real(text.word_spacing as f32)],
                        ));
                        out.push(Operation::new(
                            "Tc",
                            vec![Object::Real(text.char_spacing as f32)],
                        ));
                        out.push(Operation::new("T*", vec![]));
                    }
                }
                "Do" => {
                    if self.keep_xobject(operands, &ctm, &mut stats, &mut removed_images)? {
                        out.push(op);
                    }
                }
                "BI" => {
                    // Inline image extent depends on the image dictionary;
                    // with redaction on this page, refuse rather than guess.
                    if !self.boxes.is_empty() {
                        return Err(RewriteError::UnsupportedContent {
                            page: self.page,
                            what: "inline image on a redacted page".into(),
                        });
                    }
                    out.push(op);
                }
                _ => out.push(op),
            }
        }
        Ok((out, stats, removed_images))
    }

    /// Decides whether a show-text operation survives, advancing the text
    /// matrix either way
    fn keep_show(
        &self,
        text: &mut TextState,
        ctm: &Matrix,
        shown: &ShownText,
        stats: &mut PageStats,
    ) -> bool {
        let trm = text.tm.then(ctm);
        let extent = self.text_extent(text, &trm, shown);
        self.advance(text, shown);

        if self.config.strip_invisible_text && text.render_mode == TR_INVISIBLE {
            stats.invisible_text_removed += 1;
            stats.text_ops_removed += 1;
            trace!("dropping invisible text op");
            return false;
        }
        if self.boxes.is_empty() || shown.chars == 0 {
            return true;
        }
        let hit = match extent {
            // Unbounded extent counts as intersecting.
            None => true,
            Some(rect) => self.boxes.iter().any(|b| b.intersects(&rect)),
        };
        if hit {
            stats.text_ops_removed += 1;
        }
        !hit
    }

    /// Estimated user-space extent of a show operation, None when the
    /// render matrix is rotated or skewed
    fn text_extent(&self, text: &TextState, trm: &Matrix, shown: &ShownText) -> Option<Rect> {
        if !trm.is_axis_aligned() {
            return None;
        }
        let (x, y) = trm.apply(0.0, 0.0);
        // The hit test uses the upper-bound glyph width so a wide run
        // starting left of a rectangle is never judged to fall short of it.
        let width_ts = self.text_space_width(text, shown, GLYPH_WIDTH_BOUND);
        let (x1, y1) = trm.apply(width_ts, text.size);
        Some(Rect::new(x, y, x1, y1))
    }

    /// Estimated width of the shown text in unscaled text space
    fn text_space_width(&self, text: &TextState, shown: &ShownText, glyph_ratio: f64) -> f64 {
        let glyphs = shown.chars as f64 * glyph_ratio * text.size;
        let adjustments = -shown.tj_adjustment / 1000.0 * text.size;
        let spacing = shown.chars as f64 * text.char_spacing
            + shown.spaces as f64 * text.word_spacing;
        (glyphs + adjustments + spacing) * text.h_scale
    }

    fn advance(&self, text: &mut TextState, shown: &ShownText) {
        let width = self.text_space_width(text, shown, GLYPH_WIDTH_RATIO);
        text.tm = translation(width, 0.0).then(&text.tm);
    }

    /// Decides whether a `Do` survives; form XObjects intersecting a
    /// redaction rectangle cannot be edited and fail the rewrite
    fn keep_xobject(
        &self,
        operands: &[Object],
        ctm: &Matrix,
        stats: &mut PageStats,
        removed_images: &mut Vec<Vec<u8>>,
    ) -> Result<bool, RewriteError> {
        if self.boxes.is_empty() {
            return Ok(true);
        }
        let Some(name) = operands.first().and_then(|o| o.as_name().ok()) else {
            return Ok(true);
        };
        let kind = self
            .xobjects
            .iter()
            .find(|(n, _)| n.as_slice() == name)
            .map(|(_, k)| *k)
            .unwrap_or(XObjectKind::Other);
        if kind == XObjectKind::Other {
            return Ok(true);
        }

        let hit = if ctm.is_axis_aligned() {
            let bounds = ctm.unit_square_bounds();
            self.boxes.iter().any(|b| b.intersects(&bounds))
        } else {
            true
        };
        if !hit {
            return Ok(true);
        }
        match kind {
            XObjectKind::Image => {
                stats.images_removed += 1;
                removed_images.push(name.to_vec());
                Ok(false)
            }
            XObjectKind::Form => Err(RewriteError::UnsupportedContent {
                page: self.page,
                what: format!(
                    "form XObject /{} under a redaction rectangle",
                    String::from_utf8_lossy(name)
                ),
            }),
            XObjectKind::Other => Ok(true),
        }
    }
}

/// Character counts of one show operation
#[derive(Debug, Clone, Copy, Default)]
struct ShownText {
    chars: usize,
    spaces: usize,
    /// Sum of TJ numeric adjustments, thousandths of text space
    tj_adjustment: f64,
}

fn shown_text(operands: &[Object]) -> ShownText {
    let mut shown = ShownText::default();
    for operand in operands {
        match operand {
            Object::String(bytes, _) => {
                shown.chars += bytes.len();
                shown.spaces += bytes.iter().filter(|&&b| b == b' ').count();
            }
            Object::Array(items) => {
                let nested = shown_text(items);
                shown.chars += nested.chars;
                shown.spaces += nested.spaces;
                shown.tj_adjustment += nested.tj_adjustment;
            }
            Object::Integer(v) => shown.tj_adjustment += *v as f64,
            Object::Real(v) => shown.tj_adjustment += *v as f64,
            _ => {}
        }
    }
    shown
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(v) => Some(*v as f64),
        Object::Real(v) => Some(*v as f64),
        _ => None,
    }
}

fn translation(tx: f64, ty: f64) -> Matrix {
    Matrix {
        e: tx,
        f: ty,
        ..Matrix::IDENTITY
    }
}

/// Opaque black fill over one rectangle, state saved and restored
fn fill_rect_ops(rect: &Rect) -> Vec<Operation> {
    vec![
        Operation::new("q", vec![]),
        Operation::new(
            "rg",
            vec![Object::Real(0.0), Object::Real(0.0), Object::Real(0.0)],
        ),
        Operation::new(
            "re",
            vec![
                Object::Real(rect.x0 as f32),
                Object::Real(rect.y0 as f32),
                Object::Real(rect.width() as f32),
                Object::Real(rect.height() as f32),
            ],
        ),
        Operation::new("f", vec![]),
        Operation::new("Q", vec![]),
    ]
}

/// Removes the named entries from the page's /XObject resource dictionary,
/// leaving the dropped image streams unreachable for the sweep; returns how
/// many entries were removed
pub fn purge_image_xobjects(doc: &mut Document, page_id: ObjectId, names: &[Vec<u8>]) -> usize {
    if names.is_empty() {
        return 0;
    }
    // Walk up the page tree to the dictionary carrying /Resources.
    let mut holder = page_id;
    let resources_ref = loop {
        let Ok(dict) = doc.get_object(holder).and_then(|o| o.as_dict()) else {
            return 0;
        };
        if let Ok(resources) = dict.get(b"Resources") {
            break resources.as_reference().ok();
        }
        match dict.get(b"Parent").and_then(|o| o.as_reference()) {
            Ok(parent) => holder = parent,
            Err(_) => return 0,
        }
    };
    // The /XObject entry may itself be indirect.
    let xobject_ref = {
        let resources = match resources_ref {
            Some(id) => doc.get_object(id).ok(),
            None => doc
                .get_object(holder)
                .ok()
                .and_then(|o| o.as_dict().ok())
                .and_then(|d| d.get(b"Resources").ok()),
        };
        resources
            .and_then(|o| o.as_dict().ok())
            .and_then(|d| d.get(b"XObject").ok())
            .and_then(|o| o.as_reference().ok())
    };

    let xobjects = match (xobject_ref, resources_ref) {
        (Some(id), _) => doc
            .get_object_mut(id)
            .ok()
            .and_then(|o| o.as_dict_mut().ok()),
        (None, Some(id)) => doc
            .get_object_mut(id)
            .ok()
            .and_then(|o| o.as_dict_mut().ok())
            .and_then(|d| d.get_mut(b"XObject").ok())
            .and_then(|o| o.as_dict_mut().ok()),
        (None, None) => doc
            .get_object_mut(holder)
            .ok()
            .and_then(|o| o.as_dict_mut().ok())
            .and_then(|d| d.get_mut(b"Resources").ok())
            .and_then(|o| o.as_dict_mut().ok())
            .and_then(|d| d.get_mut(b"XObject").ok())
            .and_then(|o| o.as_dict_mut().ok()),
    };
    let Some(xobjects) = xobjects else {
        return 0;
    };
    let mut purged = 0;
    for name in names {
        if xobjects.remove(name).is_some() {
            purged += 1;
        }
    }
    purged
}

/// Classifies the XObjects reachable from the page's resources
fn xobject_kinds(doc: &Document, page_id: ObjectId) -> Vec<(Vec<u8>, XObjectKind)> {
    let mut kinds = Vec::new();
    let Some(resources) = page_resources(doc, page_id) else {
        return kinds;
    };
    let Ok(xobjects) = resources.get(b"XObject").map(|o| deref(doc, o)) else {
        return kinds;
    };
    let Ok(xobjects) = xobjects.as_dict() else {
        return kinds;
    };
    for (name, value) in xobjects.iter() {
        let kind = deref(doc, value)
            .as_stream()
            .ok()
            .and_then(|s| s.dict.get(b"Subtype").ok())
            .and_then(|s| s.as_name().ok())
            .map(|subtype| match subtype {
                b"Image" => XObjectKind::Image,
                b"Form" => XObjectKind::Form,
                _ => XObjectKind::Other,
            })
            .unwrap_or(XObjectKind::Other);
        kinds.push((name.clone(), kind));
    }
    kinds
}

/// Resolves the page's /Resources dictionary, walking up the page tree
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut current = doc.get_object(page_id).ok()?.as_dict().ok()?;
    for _ in 0..32 {
        if let Ok(resources) = current.get(b"Resources") {
            return deref(doc, resources).as_dict().ok();
        }
        let parent = current.get(b"Parent").ok()?;
        current = deref(doc, parent).as_dict().ok()?;
    }
    None
}

/// Inherited /MediaBox of a page, falling back to US Letter
pub fn media_box(doc: &Document, page_id: ObjectId) -> Rect {
    let fallback = Rect::new(0.0, 0.0, 612.0, 792.0);
    let Ok(object) = doc.get_object(page_id) else {
        return fallback;
    };
    let Ok(mut current) = object.as_dict() else {
        return fallback;
    };
    for _ in 0..32 {
        if let Ok(media) = current.get(b"MediaBox") {
            if let Ok(values) = deref(doc, media).as_array() {
                if values.len() == 4 {
                    let nums: Vec<f64> = values.iter().filter_map(number).collect();
                    if nums.len() == 4 {
                        return Rect::new(nums[0], nums[1], nums[2], nums[3]);
                    }
                }
            }
            return fallback;
        }
        let Ok(parent) = current.get(b"Parent") else {
            return fallback;
        };
        let Ok(dict) = deref(doc, parent).as_dict() else {
            return fallback;
        };
        current = dict;
    }
    fallback
}

/// Converts a page-space rectangle (top-left origin, y down) into PDF user
/// space within the given media box
pub fn to_pdf_space(rect: &Rect, media: &Rect) -> Rect {
    Rect::new(
        media.x0 + rect.x0,
        media.y1 - rect.y1,
        media.x0 + rect.x1,
        media.y1 - rect.y0,
    )
}

fn deref<'a>(doc: &'a Document, object: &'a Object) -> &'a Object {
    let mut current = object;
    for _ in 0..32 {
        match current {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(next) => current = next,
                Err(_) => return current,
            },
            _ => return current,
        }
    }
    current
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matrix_composition_order() {
        let scale = Matrix {
            a: 2.0,
            d: 2.0,
            ..Matrix::IDENTITY
        };
        let shift = translation(10.0, 0.0);
        // Scale first, then translate.
        let m = scale.then(&shift);
        assert_eq!(m.apply(1.0, 1.0), (12.0, 2.0));
    }

    #[test]
    fn unit_square_bounds_cover_flipped_axes() {
        let m = Matrix {
            a: 100.0,
            d: -50.0,
            e: 10.0,
            f: 200.0,
            ..Matrix::IDENTITY
        };
        assert_eq!(m.unit_square_bounds(), Rect::new(10.0, 150.0, 110.0, 200.0));
    }

    #[test]
    fn shown_text_counts_tj_arrays() {
        let operands = vec![Object::Array(vec![
            Object::string_literal("John "),
            Object::Integer(-250),
            Object::string_literal("Smith"),
        ])];
        let shown = shown_text(&operands);
        assert_eq!(shown.chars, 10);
        assert_eq!(shown.spaces, 1);
        assert_eq!(shown.tj_adjustment, -250.0);
    }

    #[test]
    fn page_space_converts_to_pdf_space() {
        let media = Rect::new(0.0, 0.0, 612.0, 792.0);
        // A 20-point-tall line near the top of the page lands near y=792.
        let converted = to_pdf_space(&Rect::new(70.0, 77.0, 200.0, 97.0), &media);
        assert_eq!(converted, Rect::new(70.0, 695.0, 200.0, 715.0));
    }

    #[test]
    fn drops_text_inside_box_and_keeps_text_outside() {
        let config = RewriteConfig::default();
        let editor = PageEditor {
            config: &config,
            page: 1,
            boxes: vec![Rect::new(70.0, 695.0, 200.0, 715.0).expanded(config.slop)],
            xobjects: vec![],
        };

        let ops = vec![
            Operation::new(
                "BT",
                vec![],
            ),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Real(12.0)]),
            // Inside the redaction band.
            Operation::new("Td", vec![Object::Real(72.0), Object::Real(700.0)]),
            Operation::new("Tj", vec![Object::string_literal("CONFIDENTIAL-42")]),
            // Far below it.
            Operation::new("Td", vec![Object::Real(0.0), Object::Real(-400.0)]),
            Operation::new("Tj", vec![Object::string_literal("public text")]),
            Operation::new("ET", vec![]),
        ];
        let (out, stats, _) = editor.filter_operations(ops).unwrap();
        assert_eq!(stats.text_ops_removed, 1);
        let shows: Vec<_> = out.iter().filter(|o| o.operator == "Tj").collect();
        assert_eq!(shows.len(), 1);
        assert_eq!(shows[0].operands[0].as_str().unwrap(), b"public text".as_slice());
    }

    #[test]
    fn long_run_reaching_into_a_box_is_dropped() {
        let config = RewriteConfig::default();
        let editor = PageEditor {
            config: &config,
            page: 1,
            boxes: vec![Rect::new(200.0, 695.0, 300.0, 715.0)],
            xobjects: vec![],
        };
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Real(12.0)]),
            Operation::new("Td", vec![Object::Real(72.0), Object::Real(700.0)]),
            // The run starts well left of the box; wide glyphs can still
            // carry it past x=200, so the intersection test must say hit.
            Operation::new("Tj", vec![Object::string_literal("name and birth date")]),
            Operation::new("ET", vec![]),
        ];
        let (_, stats, _) = editor.filter_operations(ops).unwrap();
        assert_eq!(stats.text_ops_removed, 1);
    }

    #[test]
    fn rotated_text_under_a_box_is_dropped_conservatively() {
        let config = RewriteConfig::default();
        let editor = PageEditor {
            config: &config,
            page: 1,
            boxes: vec![Rect::new(0.0, 0.0, 612.0, 792.0)],
            xobjects: vec![],
        };
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Real(12.0)]),
            // 30-degree rotation: extent is unbounded for the estimator.
            Operation::new(
                "Tm",
                vec![
                    Object::Real(0.866),
                    Object::Real(0.5),
                    Object::Real(-0.5),
                    Object::Real(0.866),
                    Object::Real(100.0),
                    Object::Real(100.0),
                ],
            ),
            Operation::new("Tj", vec![Object::string_literal("angled secret")]),
            Operation::new("ET", vec![]),
        ];
        let (_, stats, _) = editor.filter_operations(ops).unwrap();
        assert_eq!(stats.text_ops_removed, 1);
    }

    #[test]
    fn invisible_text_is_stripped_everywhere() {
        let config = RewriteConfig::default();
        let editor = PageEditor {
            config: &config,
            page: 1,
            boxes: vec![],
            xobjects: vec![],
        };
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Real(12.0)]),
            Operation::new("Tr", vec![Object::Integer(3)]),
            Operation::new("Tj", vec![Object::string_literal("ocr layer")]),
            Operation::new("Tr", vec![Object::Integer(0)]),
            Operation::new("Tj", vec![Object::string_literal("visible")]),
            Operation::new("ET", vec![]),
        ];
        let (out, stats, _) = editor.filter_operations(ops).unwrap();
        assert_eq!(stats.invisible_text_removed, 1);
        assert_eq!(out.iter().filter(|o| o.operator == "Tj").count(), 1);
    }

    #[test]
    fn inline_image_on_redacted_page_is_unsupported() {
        let config = RewriteConfig::default();
        let editor = PageEditor {
            config: &config,
            page: 3,
            boxes: vec![Rect::new(0.0, 0.0, 10.0, 10.0)],
            xobjects: vec![],
        };
        let err = editor
            .filter_operations(vec![Operation::new("BI", vec![])])
            .unwrap_err();
        assert!(matches!(err, RewriteError::UnsupportedContent { page: 3, .. }));
    }

    #[test]
    fn apostrophe_show_keeps_its_line_advance_when_dropped() {
        let config = RewriteConfig::default();
        let editor = PageEditor {
            config: &config,
            page: 1,
            boxes: vec![Rect::new(0.0, 0.0, 612.0, 792.0)],
            xobjects: vec![],
        };
        let ops = vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Real(12.0)]),
            Operation::new("TL", vec![Object::Real(14.0)]),
            Operation::new("Td", vec![Object::Real(72.0), Object::Real(700.0)]),
            Operation::new("'", vec![Object::string_literal("secret line")]),
            Operation::new("ET", vec![]),
        ];
        let (out, stats, _) = editor.filter_operations(ops).unwrap();
        assert_eq!(stats.text_ops_removed, 1);
        assert!(out.iter().any(|o| o.operator == "T*"));
        assert!(!out.iter().any(|o| o.operator == "'"));
    }

    #[test]
    fn purging_image_resources_unlinks_the_entry() {
        use lopdf::{dictionary, Stream};

        let mut doc = Document::with_version("1.5");
        let image = doc.add_object(Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 1,
                "Height" => 1,
            },
            vec![0u8; 4],
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Resources" => dictionary! {
                "XObject" => dictionary! { "Im0" => image },
            },
        });

        assert_eq!(purge_image_xobjects(&mut doc, page_id, &[b"Im0".to_vec()]), 1);
        let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
        let resources = page.get(b"Resources").unwrap().as_dict().unwrap();
        let xobjects = resources.get(b"XObject").unwrap().as_dict().unwrap();
        assert!(xobjects.get(b"Im0").is_err());
    }
}
