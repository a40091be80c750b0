//! CLI binary for edgequake-docpipe.
//!
//! A thin shim over the library crate: `convert` maps flags to
//! `ConversionOptions`, `detect` shows the classification and route, and
//! `run` drives one task end-to-end against a local object store.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_docpipe::pipeline::engine;
use edgequake_docpipe::{
    ConversionOptions, ConversionResult, Converter, ImageFormat, LocalObjectStore, MemoryRecordStore,
    RecordStore, ReturnMode, Rgba, ServiceConfig, SourceDocument, Submitter, TaskRegistry, TaskStatus,
    Worker,
};
use serde_json::{json, Map, Value};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Office document to PDF (text stays selectable)
  docpipe convert slides.pptx --mode pdf -o slides.pdf

  # Every page of a PDF as 1600px JPEGs in ./pages
  docpipe convert paper.pdf --mode files --format jpeg --max-side 1600 -o pages

  # Zip of PNG pages on a white background
  docpipe convert scan.tiff --mode archive --background white -o scan.zip

  # What would happen to this blob?
  docpipe detect mystery.bin --mode pdf

  # Run a task end-to-end against the local object store
  docpipe run doc_convert report.docx --param dpi=150 --param image_format=JPEG

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         libpdfium file or directory
  DOCPIPE_STORAGE_DIR     Root of the local object store (run)
  S3_BUCKET               Bucket name used for stored objects (run)
  RUST_LOG                Overrides -v / -q log filtering

RUNTIME TOOLS:
  PDF, Office and HTML rasterisation need pdfium. Office conversion needs
  soffice or libreoffice on PATH; HTML needs google-chrome or chromium.
"#;

/// Convert documents to page images or PDF.
#[derive(Parser, Debug)]
#[command(
    name = "docpipe",
    version,
    about = "Convert documents (PDF, Office, HTML, images) to page images or PDF",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCPIPE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCPIPE_QUIET")]
    quiet: bool,

    /// libpdfium file or directory.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert one document.
    Convert(ConvertArgs),
    /// Classify a document and show the conversion route.
    Detect(DetectArgs),
    /// Upload a file and run a named task on it.
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Input document.
    input: PathBuf,

    /// Result shape: pages, bytes, files, archive, pdf.
    #[arg(long, env = "DOCPIPE_MODE", default_value = "files", value_parser = parse_mode)]
    mode: ReturnMode,

    /// Output path: a directory for files/bytes, a file for archive/pdf.
    #[arg(short, long, env = "DOCPIPE_OUTPUT")]
    output: Option<PathBuf>,

    /// Rendering DPI.
    #[arg(long, env = "DOCPIPE_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(1..=1200))]
    dpi: u32,

    /// Cap on the longest page side, in pixels.
    #[arg(long, env = "DOCPIPE_MAX_SIDE")]
    max_side: Option<u32>,

    /// Page image format: png, jpeg, webp, tiff, bmp.
    #[arg(long, env = "DOCPIPE_FORMAT", default_value = "png", value_parser = parse_format)]
    format: ImageFormat,

    /// Background for transparent pages: white, black, #RRGGBB or r,g,b.
    #[arg(long, env = "DOCPIPE_BACKGROUND", value_parser = parse_colour)]
    background: Option<Rgba>,

    /// File name prefix for page files.
    #[arg(long, default_value = "page")]
    prefix: String,

    /// Naming hint for archive entries (e.g. report.png).
    #[arg(long)]
    archive_name: Option<String>,

    /// External converter timeout in seconds.
    #[arg(long, env = "DOCPIPE_TOOL_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// Print a JSON summary instead of a status line.
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct DetectArgs {
    /// Input document.
    input: PathBuf,

    /// Return mode to route for.
    #[arg(long, default_value = "pages", value_parser = parse_mode)]
    mode: ReturnMode,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Task name (doc_convert, to_pdf).
    task: String,

    /// Local file to upload and process.
    file: PathBuf,

    /// Owner id the upload is stored under.
    #[arg(long, env = "DOCPIPE_OWNER", default_value = "local")]
    owner: String,

    /// Task parameter as key=value; values are parsed as JSON when possible.
    #[arg(long = "param", value_parser = parse_param)]
    params: Vec<(String, Value)>,

    /// Object store root (overrides DOCPIPE_STORAGE_DIR).
    #[arg(long)]
    storage_dir: Option<PathBuf>,
}

fn parse_mode(s: &str) -> Result<ReturnMode, String> {
    s.parse().map_err(|e: edgequake_docpipe::DocPipeError| e.to_string())
}

fn parse_format(s: &str) -> Result<ImageFormat, String> {
    s.parse().map_err(|e: edgequake_docpipe::DocPipeError| e.to_string())
}

fn parse_colour(s: &str) -> Result<Rgba, String> {
    s.parse().map_err(|e: edgequake_docpipe::DocPipeError| e.to_string())
}

fn parse_param(s: &str) -> Result<(String, Value), String> {
    let (key, raw) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.trim().to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    if let Some(ref path) = cli.pdfium_lib {
        engine::set_library_path(path);
    }

    match cli.command {
        Command::Convert(ref args) => run_convert(args, cli.quiet).await,
        Command::Detect(ref args) => run_detect(args),
        Command::Run(ref args) => run_task(args, cli.quiet).await,
    }
}

// ── convert ──────────────────────────────────────────────────────────────────

async fn run_convert(args: &ConvertArgs, quiet: bool) -> Result<()> {
    let mut builder = ConversionOptions::builder()
        .dpi(args.dpi)
        .image_format(args.format)
        .return_mode(args.mode)
        .filename_prefix(args.prefix.clone())
        .tool_timeout_secs(args.timeout);
    if let Some(px) = args.max_side {
        builder = builder.max_side(px);
    }
    if let Some(bg) = args.background {
        builder = builder.background(bg);
    }
    if let Some(ref hint) = args.archive_name {
        builder = builder.archive_entry_name_hint(hint.clone());
    }
    if matches!(args.mode, ReturnMode::Files | ReturnMode::Bytes) {
        if let Some(ref dir) = args.output {
            builder = builder.output_dir(dir.clone());
        }
        builder = builder.save(args.mode == ReturnMode::Bytes && args.output.is_some());
    }
    let options = builder.build().context("Invalid configuration")?;

    let result = Converter::new()
        .convert(SourceDocument::Path(args.input.clone()), &options)
        .await
        .with_context(|| format!("Conversion of {} failed", args.input.display()))?;

    let written = match &result {
        ConversionResult::Pdf(bytes) => Some(write_output(args, "pdf", bytes)?),
        ConversionResult::Archive(bytes) => Some(write_output(args, "zip", bytes)?),
        _ => None,
    };

    if args.json {
        let mut summary = serde_json::to_value(result.summary()).context("Failed to serialise summary")?;
        if let (Some(path), Some(obj)) = (&written, summary.as_object_mut()) {
            obj.insert("output".into(), json!(path));
        }
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !quiet {
        let summary = result.summary();
        let target = match (&written, summary.files.first()) {
            (Some(path), _) => path.display().to_string(),
            (None, Some(first)) => first
                .parent()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            (None, None) => "memory".to_string(),
        };
        eprintln!(
            "{} {} {} item(s)  {}  →  {}",
            green("✔"),
            summary.mode,
            bold(&summary.items.to_string()),
            dim(&format!("{} bytes", summary.bytes)),
            bold(&target),
        );
    }
    Ok(())
}

/// Write single-blob output to `-o`, or `{stem}.{ext}` in the working
/// directory.
fn write_output(args: &ConvertArgs, ext: &str, bytes: &[u8]) -> Result<PathBuf> {
    let path = match args.output {
        Some(ref p) => p.clone(),
        None => default_output(&args.input, ext),
    };
    std::fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

fn default_output(input: &Path, ext: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    PathBuf::from(format!("{stem}.{ext}"))
}

// ── detect ───────────────────────────────────────────────────────────────────

fn run_detect(args: &DetectArgs) -> Result<()> {
    let source = SourceDocument::Path(args.input.clone());
    source.ensure_readable()?;
    let detected = edgequake_docpipe::classify(&source);
    let plan = Converter::new().plan(&source, args.mode);

    let report = json!({
        "input": args.input,
        "label": detected.label,
        "mime": detected.mime,
        "source": detected.source,
        "extension": detected.extension_hint,
        "route": plan.as_ref().ok().map(|p| format!("{:?}", p.route)),
        "error": plan.as_ref().err().map(|e| e.to_string()),
    });
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(
        handle,
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialise report")?
    )
    .context("Failed to write to stdout")?;
    Ok(())
}

// ── run ──────────────────────────────────────────────────────────────────────

async fn run_task(args: &RunArgs, quiet: bool) -> Result<()> {
    let config = ServiceConfig::from_env().context("Invalid service configuration")?;
    if let Some(ref path) = config.pdfium_lib_path {
        engine::set_library_path(path);
    }
    let root = args.storage_dir.clone().unwrap_or(config.storage_dir.clone());

    let objects = Arc::new(LocalObjectStore::new(&root, &config.s3.bucket));
    let records = Arc::new(MemoryRecordStore::new());
    let registry = Arc::new(TaskRegistry::with_defaults(None).context("Failed to build task registry")?);
    if !registry.contains(&args.task) {
        anyhow::bail!(
            "unknown task '{}' (available: {})",
            args.task,
            registry.names().join(", ")
        );
    }

    let (tx, mut rx) = mpsc::channel(1);
    let submitter = Submitter::new(objects.clone(), records.clone(), tx);
    let worker = Worker::new(registry, objects, records.clone());

    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let filename = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("Input path has no file name")?;
    let file = submitter.upload(&args.owner, &filename, bytes, None).await?;

    let params: Map<String, Value> = args.params.iter().cloned().collect();
    let runs = submitter.submit(&[file.id.clone()], &args.task, params).await?;
    drop(submitter);

    while let Some(trigger) = rx.recv().await {
        if let Err(e) = worker.run_task(&trigger.task_run_id).await {
            if !quiet {
                eprintln!("{} {}", red("✘"), e);
            }
        }
    }

    let mut report = Vec::new();
    let mut failed = false;
    for run in &runs {
        let run = records
            .get_run(&run.id)
            .await?
            .context("Task run disappeared")?;
        failed |= run.status == TaskStatus::Failed;
        let artifacts = records.list_artifacts(&run.id).await?;
        report.push(json!({ "run": run, "artifacts": artifacts }));
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialise report")?
    );

    if failed {
        anyhow::bail!("task '{}' failed", args.task);
    }
    if !quiet {
        eprintln!("{} artifacts stored under {}", green("✔"), bold(&root.display().to_string()));
    }
    Ok(())
}
