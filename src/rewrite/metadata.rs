//! Document-level sanitization.
//!
//! A redacted document must not carry side channels that restate what the
//! page content no longer shows: the Info dictionary, XMP metadata streams,
//! embedded file trees, PieceInfo private data, and annotations all go, the
//! document ID is regenerated, and every object no longer reachable from
//! the trailer is swept out of the file.

use std::collections::BTreeSet;

use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use tracing::debug;
use uuid::Uuid;

use crate::config::RewriteConfig;

/// What sanitization removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SanitizeStats {
    pub metadata_removed: bool,
    pub embedded_files_removed: bool,
    pub annotations_removed: usize,
    pub objects_swept: usize,
}

/// Strips metadata, embedded files, and annotations, then sweeps
/// unreachable objects
pub fn sanitize(doc: &mut Document, config: &RewriteConfig) -> SanitizeStats {
    let mut stats = SanitizeStats::default();

    if doc.trailer.remove(b"Info").is_some() {
        stats.metadata_removed = true;
    }

    let catalog_id = doc
        .trailer
        .get(b"Root")
        .and_then(|o| o.as_reference())
        .ok();
    if let Some(catalog_id) = catalog_id {
        stats.metadata_removed |= strip_catalog(doc, catalog_id, &mut stats);
    }

    let page_ids: Vec<ObjectId> = doc.get_pages().values().copied().collect();
    for page_id in page_ids {
        strip_page(doc, page_id, config, &mut stats);
    }

    // The previous ID pair identifies earlier revisions of the file.
    doc.trailer.set(
        "ID",
        Object::Array(vec![
            Object::String(
                Uuid::new_v4().as_bytes().to_vec(),
                StringFormat::Hexadecimal,
            ),
            Object::String(
                Uuid::new_v4().as_bytes().to_vec(),
                StringFormat::Hexadecimal,
            ),
        ]),
    );

    stats.objects_swept = sweep_unreachable(doc);
    debug!(
        metadata = stats.metadata_removed,
        annotations = stats.annotations_removed,
        swept = stats.objects_swept,
        "document sanitized"
    );
    stats
}

fn strip_catalog(doc: &mut Document, catalog_id: ObjectId, stats: &mut SanitizeStats) -> bool {
    // The /Names tree may be indirect; resolve its id before mutating.
    let names_ref = doc
        .get_object(catalog_id)
        .ok()
        .and_then(|o| o.as_dict().ok())
        .and_then(|d| d.get(b"Names").ok())
        .and_then(|o| o.as_reference().ok());

    let mut removed = false;
    if let Ok(catalog) = doc
        .get_object_mut(catalog_id)
        .and_then(|o| o.as_dict_mut())
    {
        removed |= catalog.remove(b"Metadata").is_some();
        catalog.remove(b"PieceInfo");
        if names_ref.is_none() {
            if let Ok(names) = catalog.get_mut(b"Names").and_then(|o| o.as_dict_mut()) {
                if names.remove(b"EmbeddedFiles").is_some() {
                    stats.embedded_files_removed = true;
                }
            }
        }
    }
    if let Some(names_id) = names_ref {
        if let Ok(names) = doc.get_object_mut(names_id).and_then(|o| o.as_dict_mut()) {
            if names.remove(b"EmbeddedFiles").is_some() {
                stats.embedded_files_removed = true;
            }
        }
    }
    removed
}

fn strip_page(
    doc: &mut Document,
    page_id: ObjectId,
    config: &RewriteConfig,
    stats: &mut SanitizeStats,
) {
    let annotation_count = if config.strip_annotations {
        doc.get_object(page_id)
            .ok()
            .and_then(|o| o.as_dict().ok())
            .and_then(|d| d.get(b"Annots").ok())
            .map(|annots| match annots {
                Object::Array(items) => items.len(),
                Object::Reference(id) => doc
                    .get_object(*id)
                    .ok()
                    .and_then(|o| o.as_array().ok())
                    .map(|a| a.len())
                    .unwrap_or(0),
                _ => 0,
            })
            .unwrap_or(0)
    } else {
        0
    };

    if let Ok(page) = doc.get_object_mut(page_id).and_then(|o| o.as_dict_mut()) {
        if page.remove(b"Metadata").is_some() {
            stats.metadata_removed = true;
        }
        page.remove(b"PieceInfo");
        if config.strip_annotations && page.remove(b"Annots").is_some() {
            stats.annotations_removed += annotation_count;
        }
    }
}

/// Removes every object not reachable from the trailer; returns how many
/// were dropped
fn sweep_unreachable(doc: &mut Document) -> usize {
    let mut reachable: BTreeSet<ObjectId> = BTreeSet::new();
    let mut pending: Vec<ObjectId> = Vec::new();
    collect_refs_dict(&doc.trailer, &mut pending);

    while let Some(id) = pending.pop() {
        if !reachable.insert(id) {
            continue;
        }
        if let Ok(object) = doc.get_object(id) {
            collect_refs(object, &mut pending);
        }
    }

    let before = doc.objects.len();
    doc.objects.retain(|id, _| reachable.contains(id));
    before - doc.objects.len()
}

fn collect_refs(object: &Object, out: &mut Vec<ObjectId>) {
    match object {
        Object::Reference(id) => out.push(*id),
        Object::Array(items) => {
            for item in items {
                collect_refs(item, out);
            }
        }
        Object::Dictionary(dict) => collect_refs_dict(dict, out),
        Object::Stream(stream) => collect_refs_dict(&stream.dict, out),
        _ => {}
    }
}

fn collect_refs_dict(dict: &Dictionary, out: &mut Vec<ObjectId>) {
    for (_, value) in dict.iter() {
        collect_refs(value, out);
    }
}
