//! Shared builders for integration tests: in-memory layout fixtures and a
//! real PDF assembled with lopdf.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};

use pdf_redact::providers::{RawLayout, RawPage, RawToken};
use pdf_redact::Rect;

/// Lays a line of text out as provider tokens, one word per token, 40
/// points of advance per word
pub fn layout_page(index: usize, text: &str) -> RawPage {
    let mut tokens = Vec::new();
    let mut offset = 0;
    let mut x = 72.0;
    for word in text.split(' ') {
        tokens.push(RawToken {
            offset,
            length: word.len(),
            text: word.into(),
            rect: Rect::new(x, 100.0, x + 36.0, 112.0),
        });
        offset += word.len() + 1;
        x += 40.0;
    }
    RawPage {
        index,
        width: 612.0,
        height: 792.0,
        rotation_degrees: 0,
        text: text.into(),
        tokens,
    }
}

pub fn layout(pages: Vec<RawPage>) -> RawLayout {
    RawLayout { pages }
}

/// Text lines for the generated PDF: (x, y, size, text) in PDF user space
pub struct PdfLine<'a> {
    pub x: f64,
    pub y: f64,
    pub size: f64,
    pub text: &'a str,
}

/// Builds a single-page PDF carrying the given text lines plus the side
/// channels a rewrite must strip: an Info dictionary, an XMP metadata
/// stream, an embedded file, and a text annotation
pub fn tainted_pdf(lines: &[PdfLine<'_>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let font = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font },
    });

    let mut operations = vec![Operation::new("BT", vec![])];
    for line in lines {
        operations.push(Operation::new(
            "Tf",
            vec![Object::Name(b"F1".to_vec()), Object::Real(line.size as f32)],
        ));
        operations.push(Operation::new(
            "Tm",
            vec![
                Object::Real(1.0),
                Object::Real(0.0),
                Object::Real(0.0),
                Object::Real(1.0),
                Object::Real(line.x as f32),
                Object::Real(line.y as f32),
            ],
        ));
        operations.push(Operation::new("Tj", vec![Object::string_literal(line.text)]));
    }
    operations.push(Operation::new("ET", vec![]));
    let content = doc.add_object(Stream::new(
        dictionary! {},
        Content { operations }.encode().unwrap(),
    ));

    let xmp = doc.add_object(Stream::new(
        dictionary! { "Type" => "Metadata", "Subtype" => "XML" },
        b"<x:xmpmeta>original author trail</x:xmpmeta>".to_vec(),
    ));
    let embedded = doc.add_object(Stream::new(
        dictionary! { "Type" => "EmbeddedFile" },
        b"unredacted original attachment".to_vec(),
    ));
    let filespec = doc.add_object(dictionary! {
        "Type" => "Filespec",
        "EF" => dictionary! { "F" => embedded },
    });
    let names = doc.add_object(dictionary! {
        "EmbeddedFiles" => dictionary! {
            "Names" => vec![Object::string_literal("original.pdf"), filespec.into()],
        },
    });
    let annot = doc.add_object(dictionary! {
        "Type" => "Annot",
        "Subtype" => "Text",
        "Contents" => Object::string_literal("internal reviewer note"),
    });

    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Contents" => content,
        "Resources" => resources,
        "Annots" => vec![annot.into()],
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
        "Metadata" => xmp,
        "Names" => names,
    });
    doc.trailer.set("Root", catalog);
    let info = doc.add_object(dictionary! {
        "Author" => Object::string_literal("case worker"),
        "Title" => Object::string_literal("safeguarding report"),
    });
    doc.trailer.set("Info", info);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

/// Every decompressed stream in the document, concatenated; lets tests
/// assert a phrase is gone from the raw file content
pub fn all_stream_bytes(bytes: &[u8]) -> Vec<u8> {
    let doc = Document::load_mem(bytes).unwrap();
    let mut out = Vec::new();
    for object in doc.objects.values() {
        if let Object::Stream(stream) = object {
            match stream.decompressed_content() {
                Ok(content) => out.extend(content),
                Err(_) => out.extend(&stream.content),
            }
        }
    }
    out
}

pub fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
