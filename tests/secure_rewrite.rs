//! Secure rewrite tests against real PDF bytes: redacted text must be gone
//! from the file, not hidden, and every metadata side channel stripped.

mod common;

use common::{all_stream_bytes, contains_subslice, tainted_pdf, PdfLine};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use pdf_redact::{FinalBoxSet, Rect, SecureRewriter};

fn report_pdf() -> Vec<u8> {
    tainted_pdf(&[
        PdfLine {
            x: 72.0,
            y: 700.0,
            size: 12.0,
            text: "CONFIDENTIAL-42 Oliver Hughes",
        },
        PdfLine {
            x: 72.0,
            y: 400.0,
            size: 12.0,
            text: "general summary of the visit",
        },
    ])
}

/// Page-space band over the line at PDF y=700 on a 792-point page
fn confidential_box() -> FinalBoxSet {
    let mut set = FinalBoxSet::new();
    set.push_merged(0, Rect::new(70.0, 78.0, 320.0, 94.0), 1.0);
    set
}

#[test]
fn redacted_text_is_removed_not_covered() {
    let input = report_pdf();
    let (output, report) = SecureRewriter::default()
        .rewrite(&input, &confidential_box())
        .unwrap();
    assert_eq!(report.text_ops_removed, 1);

    // Gone from the raw content streams, not merely painted over.
    let streams = all_stream_bytes(&output);
    assert!(!contains_subslice(&streams, b"CONFIDENTIAL-42"));
    assert!(!contains_subslice(&streams, b"Oliver Hughes"));
    assert!(contains_subslice(&streams, b"general summary"));

    // And gone from extracted text.
    let extracted = pdf_extract::extract_text_from_mem(&output).unwrap();
    assert!(!extracted.contains("CONFIDENTIAL-42"));
    assert!(!extracted.contains("Oliver Hughes"));
    assert!(extracted.contains("general summary"));
}

#[test]
fn metadata_side_channels_are_stripped() {
    let input = report_pdf();

    // The input really carries them.
    assert!(contains_subslice(&input, b"case worker"));
    let (output, report) = SecureRewriter::default()
        .rewrite(&input, &confidential_box())
        .unwrap();

    assert!(report.metadata_removed);
    assert!(report.embedded_files_removed);
    assert_eq!(report.annotations_removed, 1);
    assert!(report.objects_swept > 0);

    let doc = Document::load_mem(&output).unwrap();
    assert!(doc.trailer.get(b"Info").is_err());
    let catalog_id = doc.trailer.get(b"Root").unwrap().as_reference().unwrap();
    let catalog = doc.get_object(catalog_id).unwrap().as_dict().unwrap();
    assert!(catalog.get(b"Metadata").is_err());

    let page_id = *doc.get_pages().values().next().unwrap();
    let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
    assert!(page.get(b"Annots").is_err());

    // The attachment and author strings left no trace in the file.
    assert!(!contains_subslice(&output, b"unredacted original attachment"));
    assert!(!contains_subslice(&output, b"case worker"));
    assert!(!contains_subslice(&output, b"internal reviewer note"));
}

#[test]
fn rewrite_is_idempotent_on_its_own_output() {
    let input = report_pdf();
    let rewriter = SecureRewriter::default();
    let (first, _) = rewriter.rewrite(&input, &confidential_box()).unwrap();
    let (second, report) = rewriter.rewrite(&first, &confidential_box()).unwrap();
    assert_eq!(report.text_ops_removed, 0);
    let streams = all_stream_bytes(&second);
    assert!(contains_subslice(&streams, b"general summary"));
}

#[test]
fn failed_rewrite_leaves_no_output_behind() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("report.pdf");
    let output_path = dir.path().join("report-redacted.pdf");
    std::fs::write(&input_path, report_pdf()).unwrap();

    let mut bad = FinalBoxSet::new();
    bad.push_merged(3, Rect::new(0.0, 0.0, 10.0, 10.0), 1.0);
    let result = SecureRewriter::default().rewrite_file(&input_path, &output_path, &bad);
    assert!(result.is_err());
    assert!(!output_path.exists());
    // Only the untouched input remains in the directory.
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    assert!(contains_subslice(&std::fs::read(&input_path).unwrap(), b"CONFIDENTIAL-42"));
}

/// One-page document whose sensitive region is covered by a form XObject
/// the editor cannot see inside
fn form_xobject_pdf() -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let form_ops = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec![Object::Name(b"F1".to_vec()), Object::Real(12.0)]),
        Operation::new("Td", vec![Object::Real(0.0), Object::Real(0.0)]),
        Operation::new("Tj", vec![Object::string_literal("nested secret")]),
        Operation::new("ET", vec![]),
    ];
    let form = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), 200.into(), 20.into()],
        },
        Content {
            operations: form_ops,
        }
        .encode()
        .unwrap(),
    ));
    let resources = doc.add_object(dictionary! {
        "XObject" => dictionary! { "Fm0" => form },
    });
    let page_ops = vec![
        Operation::new("q", vec![]),
        Operation::new(
            "cm",
            vec![
                Object::Real(1.0),
                Object::Real(0.0),
                Object::Real(0.0),
                Object::Real(1.0),
                Object::Real(72.0),
                Object::Real(700.0),
            ],
        ),
        Operation::new("Do", vec![Object::Name(b"Fm0".to_vec())]),
        Operation::new("Q", vec![]),
    ];
    let content = doc.add_object(Stream::new(
        dictionary! {},
        Content {
            operations: page_ops,
        }
        .encode()
        .unwrap(),
    ));
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Contents" => content,
        "Resources" => resources,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog);
    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

#[test]
fn form_xobject_under_a_box_aborts_the_rewrite() {
    let input = form_xobject_pdf();
    let err = SecureRewriter::default()
        .rewrite(&input, &confidential_box())
        .unwrap_err();
    assert!(err.to_string().contains("unsupported content"));
}
