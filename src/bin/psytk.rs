//! psytk CLI - Command-line interface for psytk-extract
//!
//! Commands:
//! - extract: Aggregate a results export into one table per task
//! - tasks: List registered task parsers and their metrics

use clap::{Parser, Subcommand, ValueEnum};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use psytk_extract::resolver::DEFAULT_PARTICIPANT_ID_PREFIX;
use psytk_extract::{
    ExtractConfig, ExtractError, Extractor, FailurePolicy, RunReport, TaskRegistry,
    EXTRACT_VERSION, PRODUCER_NAME,
};

/// psytk - Extract and aggregate PsyToolkit experiment results
#[derive(Parser)]
#[command(name = "psytk")]
#[command(version = EXTRACT_VERSION)]
#[command(about = "Aggregate PsyToolkit results into per-task tables", long_about = None)]
struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate a results export into one table per task
    Extract {
        /// Results zip archive or extracted directory
        #[arg(short, long)]
        data: PathBuf,

        /// Directory receiving the per-task tables
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Participant ID variable label
        #[arg(long, default_value = DEFAULT_PARTICIPANT_ID_PREFIX)]
        participant_id_label: String,

        /// Extract the archive here instead of next to it
        #[arg(long)]
        extract_to: Option<PathBuf>,

        /// What to do when a participant's raw file cannot be parsed
        #[arg(long, value_enum, default_value = "abort")]
        on_parse_error: ParseErrorPolicy,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List registered task parsers and their metrics
    Tasks {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ParseErrorPolicy {
    /// Stop the run on the first unparseable file
    Abort,
    /// Leave that participant's cells empty and continue
    Skip,
}

impl From<ParseErrorPolicy> for FailurePolicy {
    fn from(p: ParseErrorPolicy) -> Self {
        match p {
            ParseErrorPolicy::Abort => FailurePolicy::Abort,
            ParseErrorPolicy::Skip => FailurePolicy::Skip,
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}

fn run(cli: Cli) -> Result<(), PsytkCliError> {
    match cli.command {
        Commands::Extract {
            data,
            output_dir,
            participant_id_label,
            extract_to,
            on_parse_error,
            json,
        } => {
            let config = ExtractConfig::default()
                .with_participant_id_prefix(participant_id_label)
                .with_failure_policy(on_parse_error.into());
            cmd_extract(&data, &output_dir, extract_to.as_deref(), config, json)
        }

        Commands::Tasks { json } => cmd_tasks(json),
    }
}

fn cmd_extract(
    data: &std::path::Path,
    output_dir: &std::path::Path,
    extract_to: Option<&std::path::Path>,
    config: ExtractConfig,
    json: bool,
) -> Result<(), PsytkCliError> {
    let extractor = Extractor::new(config);
    let report = extractor.run(data, output_dir, extract_to)?;

    if json {
        println!("{}", report.to_json()?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("Extraction Report");
    println!("=================");
    println!("Input:         {}", report.input_dir.display());
    println!(
        "Summary rows:  {} total, {} valid, {} dropped",
        report.summary.total_rows, report.summary.valid_rows, report.summary.dropped_rows
    );
    println!("Participants:  {}", report.participants);
    println!("Tasks:         {}", report.tasks.join(", "));

    if !report.summary.renamed_ids.is_empty() {
        println!("\nRenamed duplicate ids:");
        for renamed in &report.summary.renamed_ids {
            println!("  - {} -> {}", renamed.original, renamed.renamed);
        }
    }

    if !report.skipped.is_empty() {
        println!("\nSkipped results:");
        for skip in &report.skipped {
            println!("  - {} / {}: {}", skip.participant, skip.task, skip.error);
        }
    }

    println!("\nOutputs:");
    for output in &report.outputs {
        println!("  {}", output.display());
    }
}

fn cmd_tasks(json: bool) -> Result<(), PsytkCliError> {
    let registry = TaskRegistry::default();
    let tasks: Vec<TaskInfo> = registry
        .schemas()
        .map(|(prefix, metrics)| TaskInfo {
            prefix: prefix.to_string(),
            metrics: metrics.iter().map(|m| m.to_string()).collect(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
    } else {
        println!("{} {} task parsers", PRODUCER_NAME, EXTRACT_VERSION);
        println!();
        println!("Experiments are matched by name prefix, first match wins:");
        for task in &tasks {
            println!();
            println!("{}*", task.prefix);
            for metric in &task.metrics {
                println!("  - {}", metric);
            }
        }
    }
    Ok(())
}

// Error types

#[derive(Debug)]
enum PsytkCliError {
    Extract(ExtractError),
    Json(serde_json::Error),
}

impl From<ExtractError> for PsytkCliError {
    fn from(e: ExtractError) -> Self {
        PsytkCliError::Extract(e)
    }
}

impl From<serde_json::Error> for PsytkCliError {
    fn from(e: serde_json::Error) -> Self {
        PsytkCliError::Json(e)
    }
}

#[derive(serde::Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<PsytkCliError> for CliError {
    fn from(e: PsytkCliError) -> Self {
        let (code, hint) = match &e {
            PsytkCliError::Extract(inner) => match inner.innermost() {
                ExtractError::MalformedInput(_) => (
                    "MALFORMED_INPUT",
                    Some("Pass a PsyToolkit results .zip or its extracted directory"),
                ),
                ExtractError::UnrecognizedTask(_) => (
                    "UNRECOGNIZED_TASK",
                    Some("Run 'psytk tasks' to list supported experiments"),
                ),
                ExtractError::MissingColumn(_) => (
                    "MISSING_COLUMN",
                    Some("Check --participant-id-label and the columns of data.csv"),
                ),
                ExtractError::EmptyPartition { .. } => (
                    "EMPTY_PARTITION",
                    Some("Use --on-parse-error skip to continue without this result"),
                ),
                ExtractError::ParseError(_) | ExtractError::FileParseError { .. } => (
                    "PARSE_ERROR",
                    Some("Use --on-parse-error skip to continue without this result"),
                ),
                ExtractError::RawFileRead { .. } => (
                    "RAW_FILE_UNREADABLE",
                    Some("Check that data.csv only names files present in experiment_data/"),
                ),
                ExtractError::Participant { .. } => ("PARSE_ERROR", None),
                ExtractError::DuplicateResolution(_) => ("DUPLICATE_IDS", None),
                ExtractError::Io(_) => ("IO_ERROR", Some("Check file paths and permissions")),
                ExtractError::Csv(_) => ("CSV_ERROR", Some("Check that data.csv is comma-delimited")),
                ExtractError::Zip(_) => ("ARCHIVE_ERROR", Some("Check that the archive is a valid zip")),
                ExtractError::Json(_) => ("JSON_ERROR", None),
            },
            PsytkCliError::Json(_) => ("JSON_ERROR", None),
        };
        let message = match e {
            PsytkCliError::Extract(inner) => inner.to_string(),
            PsytkCliError::Json(inner) => inner.to_string(),
        };
        CliError {
            code: code.to_string(),
            message,
            hint: hint.map(str::to_string),
        }
    }
}

#[derive(serde::Serialize)]
struct TaskInfo {
    prefix: String,
    metrics: Vec<String>,
}
