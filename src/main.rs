//! Command-line interface for the redaction engine.
//!
//! `apply` takes a reviewed box set (JSON) and rewrites the input document;
//! `inspect` reports what a document still carries before or after a
//! rewrite. The interactive review itself lives in the hosting application;
//! this binary covers the batch and verification paths.

use std::path::PathBuf;
use std::process;

use clap::{Arg, ArgAction, ArgMatches, Command};
use lopdf::Document;
use serde::Serialize;
use tracing::{error, info};

use pdf_redact::{EngineConfig, FinalBoxSet, Result, SecureRewriter};

fn main() {
    let matches = build_cli().get_matches();
    let verbosity = matches
        .get_one::<String>("verbose")
        .map(String::as_str)
        .unwrap_or("info");
    init_logging(verbosity);

    let outcome = match matches.subcommand() {
        Some(("apply", sub)) => run_apply(sub),
        Some(("inspect", sub)) => run_inspect(sub),
        _ => unreachable!("subcommand is required"),
    };

    if let Err(err) = outcome {
        error!("{err}");
        process::exit(1);
    }
}

fn build_cli() -> Command {
    Command::new("pdf-redact")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Applies reviewed redaction boxes to PDF documents and verifies the result")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .value_name("LEVEL")
                .value_parser(["error", "warn", "info", "debug", "trace"])
                .global(true)
                .help("Log verbosity"),
        )
        .subcommand(
            Command::new("apply")
                .about("Rewrite a document with the given redaction box set")
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .value_name("FILE")
                        .value_parser(clap::value_parser!(PathBuf))
                        .required(true)
                        .help("Input PDF file path"),
                )
                .arg(
                    Arg::new("boxes")
                        .short('b')
                        .long("boxes")
                        .value_name("FILE")
                        .value_parser(clap::value_parser!(PathBuf))
                        .required(true)
                        .help("Reviewed box set (JSON)"),
                )
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .value_name("FILE")
                        .value_parser(clap::value_parser!(PathBuf))
                        .required(true)
                        .help("Output PDF file path"),
                )
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("Engine configuration file (JSON)"),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Overwrite the output file if it exists"),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Rewrite and verify in memory without writing the output"),
                ),
        )
        .subcommand(
            Command::new("inspect")
                .about("Report metadata and annotation content of a document")
                .arg(
                    Arg::new("input")
                        .short('i')
                        .long("input")
                        .value_name("FILE")
                        .value_parser(clap::value_parser!(PathBuf))
                        .required(true)
                        .help("PDF file to inspect"),
                ),
        )
}

fn run_apply(matches: &ArgMatches) -> Result<()> {
    let input = matches.get_one::<PathBuf>("input").expect("required");
    let boxes_path = matches.get_one::<PathBuf>("boxes").expect("required");
    let output = matches.get_one::<PathBuf>("output").expect("required");
    let force = matches.get_flag("force");
    let dry_run = matches.get_flag("dry-run");

    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => serde_json::from_str::<EngineConfig>(&std::fs::read_to_string(path)?)?,
        None => EngineConfig::default(),
    };
    config.validate()?;

    let boxes: FinalBoxSet = serde_json::from_str(&std::fs::read_to_string(boxes_path)?)?;
    info!(
        boxes = boxes.len(),
        pages = boxes.pages().len(),
        "loaded box set"
    );

    if !dry_run && output.exists() && !force {
        return Err(pdf_redact::Error::ConfigError(format!(
            "output file {} exists; pass --force to overwrite",
            output.display()
        )));
    }

    let rewriter = SecureRewriter::new(config.rewrite);
    let report = if dry_run {
        let bytes = std::fs::read(input)?;
        let (_, report) = rewriter.rewrite(&bytes, &boxes)?;
        info!("dry run verified; no output written");
        report
    } else {
        let report = rewriter.rewrite_file(input, output, &boxes)?;
        info!(output = %output.display(), "redacted document written");
        report
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[derive(Debug, Serialize)]
struct InspectReport {
    pages: usize,
    has_info: bool,
    has_xmp_metadata: bool,
    has_embedded_files: bool,
    annotations: usize,
}

fn run_inspect(matches: &ArgMatches) -> Result<()> {
    let input = matches.get_one::<PathBuf>("input").expect("required");
    let doc = Document::load(input)?;

    let catalog = doc
        .trailer
        .get(b"Root")
        .and_then(|o| o.as_reference())
        .and_then(|id| doc.get_object(id))
        .and_then(|o| o.as_dict())
        .ok();
    let has_embedded_files = catalog
        .and_then(|c| c.get(b"Names").ok())
        .map(|names| {
            let names = match names {
                lopdf::Object::Reference(id) => doc.get_object(*id).ok(),
                other => Some(other),
            };
            names
                .and_then(|o| o.as_dict().ok())
                .map(|d| d.has(b"EmbeddedFiles"))
                .unwrap_or(false)
        })
        .unwrap_or(false);

    let mut annotations = 0;
    for page_id in doc.get_pages().values() {
        if let Ok(page) = doc.get_object(*page_id).and_then(|o| o.as_dict()) {
            if let Ok(annots) = page.get(b"Annots") {
                annotations += match annots {
                    lopdf::Object::Array(items) => items.len(),
                    lopdf::Object::Reference(id) => doc
                        .get_object(*id)
                        .ok()
                        .and_then(|o| o.as_array().ok())
                        .map(|a| a.len())
                        .unwrap_or(0),
                    _ => 0,
                };
            }
        }
    }

    let report = InspectReport {
        pages: doc.get_pages().len(),
        has_info: doc.trailer.get(b"Info").is_ok(),
        has_xmp_metadata: catalog.map(|c| c.has(b"Metadata")).unwrap_or(false),
        has_embedded_files,
        annotations,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(format!("pdf_redact={level}")))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("failed to set tracing subscriber");
}
