pub mod loggers;

use crate::loggers::{init_logger, LogFormat};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use examscan::config::{ExtractionConfig, Subject};
use examscan::converter::PopplerCropper;
use examscan::llm::{is_llm_available, OpenAiExtractor};
use examscan::models::{ExtractedQuestion, ScanDocument, ValidationReport};
use examscan::pipeline::{process_response, ExtractionEvent, MultiPassExtractor};
use examscan::validator::validate_questions;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract questions from scanned exam papers
    Extract(ExtractArgs),
    /// Re-run salvage, normalization and validation on a saved model response
    Normalize(NormalizeArgs),
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// Scans to read (PDF, PNG, JPEG or WebP)
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[arg(short, long, default_value_t = Subject::Math)]
    subject: Subject,

    #[arg(short, long, default_value = "12")]
    grade: String,

    /// File holding the extraction prompt
    #[arg(short, long)]
    prompt: Option<PathBuf>,

    /// Directory for cropped diagrams; cropping is skipped when absent
    #[arg(long)]
    crop_dir: Option<PathBuf>,

    /// Documents extracted at once (overrides EXAMSCAN_CONCURRENCY)
    #[arg(short, long)]
    concurrency: Option<usize>,

    #[arg(short, long, default_value = "questions.json")]
    out: String,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct NormalizeArgs {
    /// Raw model response saved to a file
    input: PathBuf,

    #[arg(short, long, default_value_t = Subject::Math)]
    subject: Subject,

    #[arg(short, long, default_value = "questions.json")]
    out: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NormalizeOutput {
    questions: Vec<ExtractedQuestion>,
    report: ValidationReport,
}

fn check_output(outfile: &str) -> Result<()> {
    if !outfile.ends_with(".json") {
        bail!("Output file must be a JSON file: {}", outfile);
    }
    Ok(())
}

fn progress_bar(len: u64) -> Result<ProgressBar> {
    let bar = ProgressBar::new(len);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.green/blue} {pos:>3}/{len:3} passes {msg}")?
            .progress_chars("█▓▒░"),
    );
    Ok(bar)
}

async fn extract(args: ExtractArgs) -> Result<()> {
    check_output(&args.out)?;
    if !is_llm_available() {
        bail!("OPENAI_API_KEY is not set");
    }

    let mut documents = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let document = ScanDocument::from_path(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        documents.push(document);
    }

    let mut config = ExtractionConfig::from_env(args.subject).with_grade(&args.grade);
    if let Some(prompt) = &args.prompt {
        let text = std::fs::read_to_string(prompt)
            .with_context(|| format!("Could not read prompt {}", prompt.display()))?;
        config = config.with_prompt(&text);
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency.max(1);
    }

    let bar = if args.verbose {
        Some(progress_bar(config.max_passes as u64 * documents.len() as u64)?)
    } else {
        None
    };
    let observer_bar = bar.clone();
    let observer = move |event: &ExtractionEvent| {
        let Some(bar) = &observer_bar else {
            return;
        };
        match event {
            ExtractionEvent::Progress { found, .. } => {
                bar.inc(1);
                bar.set_message(format!("{} found", found));
            }
            ExtractionEvent::Backoff { delay, .. } => {
                bar.set_message(format!("rate limited, waiting {}s", delay.as_secs()));
            }
            ExtractionEvent::PassCompleted { total, .. } => {
                bar.set_message(format!("{} found", total));
            }
            ExtractionEvent::PassFailed { error, .. } => {
                bar.set_message(format!("pass failed: {}", error));
            }
        }
    };

    tracing::info!(
        "Extracting {} document(s) with {}",
        documents.len(),
        examscan::llm::get_model_id()
    );
    let controller =
        MultiPassExtractor::new(OpenAiExtractor::from_env(), config).with_observer(observer);
    let controller = match &args.crop_dir {
        Some(dir) => controller.with_cropper(PopplerCropper::new(dir)),
        None => controller,
    };

    let merged = controller.extract_documents(&documents).await;
    if let Some(bar) = bar {
        bar.finish_with_message(format!("{} found", merged.questions.len()));
    }

    for summary in &merged.documents {
        tracing::info!(
            "{}: {} question(s) in {} pass(es), stopped: {}",
            summary.name,
            summary.question_count,
            summary.passes,
            summary.stop_reason
        );
    }
    if !merged.report.valid {
        tracing::warn!(
            "{} validation problem(s) left for review",
            merged.report.errors.len()
        );
    }

    let json = serde_json::to_string_pretty(&merged)?;
    std::fs::write(&args.out, json)?;
    tracing::info!("Wrote {}", args.out);
    Ok(())
}

fn normalize(args: NormalizeArgs) -> Result<()> {
    check_output(&args.out)?;
    if !Path::new(&args.input).exists() {
        bail!("File not found: {}", args.input.display());
    }
    let raw = std::fs::read_to_string(&args.input)
        .with_context(|| format!("Could not read {}", args.input.display()))?;

    let questions = process_response(&raw, args.subject);
    let report = validate_questions(&questions);
    tracing::info!(
        "Normalized {} question(s), {} validation problem(s)",
        questions.len(),
        report.errors.len()
    );

    let json = serde_json::to_string_pretty(&NormalizeOutput { questions, report })?;
    std::fs::write(&args.out, json)?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.log_format)?;

    match cli.command {
        Command::Extract(args) => extract(args).await,
        Command::Normalize(args) => normalize(args),
    }
}
